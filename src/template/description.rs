//! Declarative template schema.
//!
//! Maps of declarations (`keypoints`, `features`, `feature_classes`) are
//! deserialized into `Vec<(id, declaration)>` so that declaration order is
//! kept and repeated identifiers survive parsing and can be rejected with a
//! proper error instead of silently overwriting each other.

use crate::interpretation::InterpretationDescription;
use crate::mutator::MutatorDescription;
use crate::util::{ErrorKind, OfficialEyeError, OfficialEyeResult};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;

/// Ordered identifier → declaration pairs.
pub type Declarations<T> = Vec<(String, T)>;

fn declarations<'de, D, T>(deserializer: D) -> Result<Declarations<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct DeclarationsVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for DeclarationsVisitor<T> {
        type Value = Declarations<T>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map from identifiers to declarations")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some(entry) = access.next_entry::<String, T>()? {
                out.push(entry);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_map(DeclarationsVisitor(PhantomData))
}

/// Inclusive bounds on the number of matches a keypoint may receive.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MatchBounds {
    pub min: i64,
    pub max: i64,
}

/// A keypoint region with its match-count bounds.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct KeypointDescription {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
    pub matches: MatchBounds,
}

impl KeypointDescription {
    pub fn new(x: i64, y: i64, w: i64, h: i64, min: i64, max: i64) -> Self {
        Self {
            x,
            y,
            w,
            h,
            matches: MatchBounds { min, max },
        }
    }
}

/// A feature region with its class and mutators.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FeatureDescription {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
    #[serde(alias = "class")]
    pub feature_class: String,
    #[serde(default)]
    pub mutators: Vec<MutatorDescription>,
}

impl FeatureDescription {
    pub fn new(x: i64, y: i64, w: i64, h: i64, feature_class: impl Into<String>) -> Self {
        Self {
            x,
            y,
            w,
            h,
            feature_class: feature_class.into(),
            mutators: Vec::new(),
        }
    }

    pub fn with_mutator(mut self, mutator: MutatorDescription) -> Self {
        self.mutators.push(mutator);
        self
    }
}

/// A feature class declaration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureClassDescription {
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    pub inherits: Option<String>,
    pub meta: Map<String, Value>,
    pub interpretation: Option<InterpretationDescription>,
    pub min_width: Option<usize>,
    pub min_height: Option<usize>,
}

/// Source and target mutator lists.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MutatorsDescription {
    pub source: Vec<MutatorDescription>,
    pub target: Vec<MutatorDescription>,
}

/// Matcher engine selection.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MatchingDescription {
    pub engine: String,
    #[serde(default)]
    pub config: Value,
}

fn default_result_policy() -> String {
    "first".to_string()
}

/// Supervisor engine selection and result policy.
///
/// `config` maps engine ids to their options so that switching `engine`
/// keeps the options of the other engines around.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SupervisionDescription {
    pub engine: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default = "default_result_policy")]
    pub result: String,
}

/// The complete declarative description of a template.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplateDescription {
    pub id: String,
    pub name: String,
    pub source: PathBuf,
    #[serde(default, deserialize_with = "declarations")]
    pub keypoints: Declarations<KeypointDescription>,
    #[serde(default, deserialize_with = "declarations")]
    pub features: Declarations<FeatureDescription>,
    #[serde(default, deserialize_with = "declarations")]
    pub feature_classes: Declarations<FeatureClassDescription>,
    #[serde(default)]
    pub mutators: MutatorsDescription,
    pub matching: MatchingDescription,
    pub supervision: SupervisionDescription,
}

impl TemplateDescription {
    /// Parses a JSON template description.
    pub fn from_json(text: &str) -> OfficialEyeResult<Self> {
        serde_json::from_str(text).map_err(|err| {
            OfficialEyeError::new(
                ErrorKind::InvalidTemplate,
                "while parsing a template description",
                err.to_string(),
            )
            .with_cause(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::TemplateDescription;
    use crate::util::ErrorKind;

    const MINIMAL: &str = r#"{
        "id": "form",
        "name": "Form",
        "source": "form.png",
        "keypoints": {
            "b": {"x": 1, "y": 2, "w": 3, "h": 4, "matches": {"min": 1, "max": 2}},
            "a": {"x": 5, "y": 6, "w": 7, "h": 8, "matches": {"min": 0, "max": 0}},
            "b": {"x": 0, "y": 0, "w": 1, "h": 1, "matches": {"min": 0, "max": 1}}
        },
        "features": {
            "name": {"x": 0, "y": 0, "w": 10, "h": 5, "class": "text",
                     "mutators": [{"kind": "invert"}]}
        },
        "matching": {"engine": "zncc"},
        "supervision": {"engine": "least_squares", "config": {"least_squares": {}}}
    }"#;

    #[test]
    fn keeps_declaration_order_and_duplicates() {
        let desc = TemplateDescription::from_json(MINIMAL).unwrap();
        let ids: Vec<&str> = desc.keypoints.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "b"]);
        assert_eq!(desc.features[0].1.feature_class, "text");
        assert_eq!(desc.features[0].1.mutators[0].kind, "invert");
        assert_eq!(desc.supervision.result, "first");
        assert!(desc.feature_classes.is_empty());
    }

    #[test]
    fn rejects_unknown_fields() {
        let text = MINIMAL.replace("\"name\": \"Form\"", "\"name\": \"Form\", \"colour\": 1");
        let err = TemplateDescription::from_json(&text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTemplate);
    }
}
