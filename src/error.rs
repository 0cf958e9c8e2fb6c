use thiserror::Error;

use crate::data::SectionKey;
use crate::expr::{CompareOp, Property};

/// Result alias for rule construction, validation and evaluation.
pub type RuleResult<T> = Result<T, RuleError>;

/// Result alias for catalog checks.
pub type DataResult<T> = Result<T, DataError>;

/// A rule tree that violates the structural invariants of the expression language.
///
/// These are always fatal to the evaluation call that hits them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("cannot evaluate standalone comparison '{op}' outside of a some/all quantifier")]
    StandaloneComparison { op: CompareOp },

    #[error("'{op}' is not a class-level predicate")]
    NotAPredicate { op: &'static str },

    #[error("property '{property}' cannot be compared with '{op}' against {found}")]
    TypeMismatch {
        property: Property,
        op: String,
        found: &'static str,
    },

    #[error("property '{property}' is not usable in {context}")]
    InvalidProperty {
        property: Property,
        context: &'static str,
    },

    #[error("unknown custom rule '{0}'")]
    UnknownCustomRule(String),

    #[error("invalid params for custom rule '{id}': {message}")]
    InvalidParams { id: String, message: String },

    #[error("malformed rule: {0}")]
    Malformed(String),
}

/// Inconsistent catalog data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("section {section} references unknown course '{course_code}'")]
    UnknownCourse {
        section: SectionKey,
        course_code: String,
    },

    #[error("course '{0}' appears more than once in the catalog")]
    DuplicateCourse(String),

    #[error("no section {0} in the catalog")]
    UnknownSection(SectionKey),

    #[error("section {section} is listed under course '{owner}'")]
    MisplacedSection { section: SectionKey, owner: String },

    #[error("duplicate section {0}")]
    DuplicateSection(SectionKey),

    #[error("section {section} has an invalid time block [{start}, {end})")]
    InvalidTimeBlock {
        section: SectionKey,
        start: u8,
        end: u8,
    },

    #[error("course '{0}' has no credits")]
    ZeroCredits(String),
}

/// Anything that aborts a generation or diagnostic call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Data(#[from] DataError),
}

impl ScheduleError {
    /// Short machine-readable kind, used by the HTTP layer.
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleError::Rule(_) => "invalid_rule",
            ScheduleError::Data(_) => "invalid_data",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_error_converts_into_schedule_error() {
        let err: ScheduleError = RuleError::UnknownCustomRule("nope".into()).into();
        assert_eq!(err.kind(), "invalid_rule");
        assert_eq!(err.to_string(), "unknown custom rule 'nope'");
    }

    #[test]
    fn test_data_error_display() {
        let err = DataError::UnknownCourse {
            section: SectionKey::new("MA101", "T1"),
            course_code: "MA101".into(),
        };
        assert_eq!(
            err.to_string(),
            "section MA101-T1 references unknown course 'MA101'"
        );
        assert_eq!(ScheduleError::from(err).kind(), "invalid_data");
    }
}
