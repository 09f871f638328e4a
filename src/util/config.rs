//! Eager parsing of engine options into typed config structs.

use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parses the options of engine `engine_id` (a `role` such as "matcher").
///
/// `null` is treated as an empty object so that every declared default
/// applies. Config structs are expected to use `#[serde(default,
/// deny_unknown_fields)]`, which turns typos into load-time errors.
pub(crate) fn parse_engine_config<T: DeserializeOwned>(
    role: &str,
    engine_id: &str,
    config: &Value,
) -> OfficialEyeResult<T> {
    let config = match config {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(config).map_err(|err| {
        OfficialEyeError::new(
            ErrorKind::InvalidConfig,
            format!("while parsing the configuration of the '{engine_id}' {role}"),
            err.to_string(),
        )
        .with_cause(err)
    })
}
