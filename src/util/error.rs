//! Error types for officialeye.
//!
//! Every error carries a module tag, a numeric code, a short code text, the
//! phase it happened in ("while ...") and a description of the problem. This
//! quadruple is what the CLI and the IO drivers render, so codes must stay
//! stable once assigned.

use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Result alias for officialeye operations.
pub type Result<T> = std::result::Result<T, OfficialEyeError>;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Subsystem an error originates from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorModule {
    General,
    Template,
    Supervision,
    Mutator,
    Interpretation,
    Io,
    Internal,
}

impl ErrorModule {
    /// Returns the stable textual tag of the module.
    pub fn tag(self) -> &'static str {
        match self {
            ErrorModule::General => "general",
            ErrorModule::Template => "template",
            ErrorModule::Supervision => "supervision",
            ErrorModule::Mutator => "mutator",
            ErrorModule::Interpretation => "interpretation",
            ErrorModule::Io => "io",
            ErrorModule::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Kind of failure, mapped onto a module and a stable numeric code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An engine, mutator or policy identifier is not registered.
    InvalidIdentifier,
    /// Engine or method options failed to parse.
    InvalidConfig,
    /// An image handed to the pipeline is unusable.
    InvalidInput,
    /// Template-level data is inconsistent (duplicate template id, bad source).
    InvalidTemplate,
    /// A keypoint declaration violates its invariants.
    InvalidKeypoint,
    /// A feature declaration violates its invariants.
    InvalidFeature,
    /// A feature class declaration is inconsistent.
    InvalidFeatureClass,
    /// A keypoint received fewer or more matches than its bounds allow.
    MatchCountOutOfBounds,
    /// No geometric correspondence could be established.
    CorrespondenceNotFound,
    /// A mutator could not transform its input.
    MutatorFailed,
    /// An interpretation method failed on a feature.
    InterpretationFailed,
    /// The requested IO driver does not exist.
    InvalidDriver,
    /// The selected IO driver does not implement the requested operation.
    OperationNotSupportedByDriver,
    /// Reading or writing a file failed.
    IoFailed,
    /// An invariant of the library itself broke.
    Internal,
}

impl ErrorKind {
    /// Returns the module this kind belongs to.
    pub fn module(self) -> ErrorModule {
        match self {
            ErrorKind::InvalidIdentifier | ErrorKind::InvalidConfig | ErrorKind::InvalidInput => {
                ErrorModule::General
            }
            ErrorKind::InvalidTemplate
            | ErrorKind::InvalidKeypoint
            | ErrorKind::InvalidFeature
            | ErrorKind::InvalidFeatureClass => ErrorModule::Template,
            ErrorKind::MatchCountOutOfBounds | ErrorKind::CorrespondenceNotFound => {
                ErrorModule::Supervision
            }
            ErrorKind::MutatorFailed => ErrorModule::Mutator,
            ErrorKind::InterpretationFailed => ErrorModule::Interpretation,
            ErrorKind::InvalidDriver
            | ErrorKind::OperationNotSupportedByDriver
            | ErrorKind::IoFailed => ErrorModule::Io,
            ErrorKind::Internal => ErrorModule::Internal,
        }
    }

    /// Returns the numeric code, unique within the module.
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::InvalidIdentifier => 1,
            ErrorKind::InvalidConfig => 2,
            ErrorKind::InvalidInput => 3,
            ErrorKind::InvalidTemplate => 1,
            ErrorKind::InvalidKeypoint => 2,
            ErrorKind::InvalidFeature => 3,
            ErrorKind::InvalidFeatureClass => 4,
            ErrorKind::MatchCountOutOfBounds => 1,
            ErrorKind::CorrespondenceNotFound => 2,
            ErrorKind::MutatorFailed => 1,
            ErrorKind::InterpretationFailed => 1,
            ErrorKind::InvalidDriver => 1,
            ErrorKind::OperationNotSupportedByDriver => 2,
            ErrorKind::IoFailed => 3,
            ErrorKind::Internal => 1,
        }
    }

    /// Returns the short snake_case code text.
    pub fn code_text(self) -> &'static str {
        match self {
            ErrorKind::InvalidIdentifier => "invalid_identifier",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidTemplate => "invalid_template",
            ErrorKind::InvalidKeypoint => "invalid_keypoint",
            ErrorKind::InvalidFeature => "invalid_feature",
            ErrorKind::InvalidFeatureClass => "invalid_feature_class",
            ErrorKind::MatchCountOutOfBounds => "match_count_out_of_bounds",
            ErrorKind::CorrespondenceNotFound => "correspondence_not_found",
            ErrorKind::MutatorFailed => "mutator_failed",
            ErrorKind::InterpretationFailed => "interpretation_failed",
            ErrorKind::InvalidDriver => "invalid_driver",
            ErrorKind::OperationNotSupportedByDriver => "operation_not_supported_by_driver",
            ErrorKind::IoFailed => "io_failed",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.module(), self.code(), self.code_text())
    }
}

/// Structured error raised anywhere in the pipeline.
#[derive(Debug, Error)]
#[error("[{kind}] {while_text}: {problem}")]
pub struct OfficialEyeError {
    kind: ErrorKind,
    while_text: String,
    problem: String,
    #[source]
    cause: Option<Cause>,
}

impl OfficialEyeError {
    /// Creates an error of `kind` raised `while_text` because of `problem`.
    pub fn new(kind: ErrorKind, while_text: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            kind,
            while_text: while_text.into(),
            problem: problem.into(),
            cause: None,
        }
    }

    /// Attaches an external cause.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn module(&self) -> ErrorModule {
        self.kind.module()
    }

    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    /// Phase description, e.g. `while loading template keypoint 'a'`.
    pub fn while_text(&self) -> &str {
        &self.while_text
    }

    /// Problem description.
    pub fn problem(&self) -> &str {
        &self.problem
    }

    /// Returns the wrapped external cause, if any.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Renders the error as the JSON object emitted by the IO drivers.
    pub fn to_json(&self) -> Value {
        json!({
            "module": self.module().tag(),
            "code": self.code(),
            "code_text": self.kind.code_text(),
            "while": self.while_text,
            "problem": self.problem,
            "cause": self.cause.as_ref().map(|c| c.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ErrorModule, OfficialEyeError};

    #[test]
    fn display_contains_module_code_and_texts() {
        let err = OfficialEyeError::new(
            ErrorKind::InvalidKeypoint,
            "while loading template keypoint 'kp'",
            "bad bounds",
        );
        assert_eq!(
            err.to_string(),
            "[template:2 invalid_keypoint] while loading template keypoint 'kp': bad bounds"
        );
        assert_eq!(err.module(), ErrorModule::Template);
    }

    #[test]
    fn cause_is_exposed_as_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = OfficialEyeError::new(ErrorKind::IoFailed, "while reading", "no file")
            .with_cause(io);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "missing");
        assert_eq!(err.to_json()["cause"], "missing");
        assert_eq!(err.to_json()["module"], "io");
    }

    #[test]
    fn codes_are_unique_within_module() {
        let kinds = [
            ErrorKind::InvalidIdentifier,
            ErrorKind::InvalidConfig,
            ErrorKind::InvalidInput,
            ErrorKind::InvalidTemplate,
            ErrorKind::InvalidKeypoint,
            ErrorKind::InvalidFeature,
            ErrorKind::InvalidFeatureClass,
            ErrorKind::MatchCountOutOfBounds,
            ErrorKind::CorrespondenceNotFound,
            ErrorKind::MutatorFailed,
            ErrorKind::InterpretationFailed,
            ErrorKind::InvalidDriver,
            ErrorKind::OperationNotSupportedByDriver,
            ErrorKind::IoFailed,
            ErrorKind::Internal,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in kinds.iter().skip(i + 1) {
                assert!(a.module() != b.module() || a.code() != b.code(), "{a} vs {b}");
            }
        }
    }
}
