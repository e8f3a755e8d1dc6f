//! Pluggable syntax/lint hook consulted before an edit is applied

use std::path::Path;

use serde::Serialize;

/// Answer from an external checker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub ok: bool,
    pub messages: Vec<String>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        ValidationResult {
            ok: true,
            messages: Vec::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ValidationResult {
            ok: false,
            messages: vec![message.into()],
        }
    }
}

/// Checks proposed content for a path. Implemented for plain closures.
pub trait EditValidator: Send + Sync {
    fn validate(&self, path: &Path, content: &str) -> ValidationResult;
}

impl<F> EditValidator for F
where
    F: Fn(&Path, &str) -> ValidationResult + Send + Sync,
{
    fn validate(&self, path: &Path, content: &str) -> ValidationResult {
        self(path, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Passed,
    /// The hook rejected the content; the edit continues with warnings unless strict.
    Failed,
    /// No hook is configured.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,
    /// Hook messages followed by compatibility warnings.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_validator() {
        let no_tabs = |_: &Path, content: &str| {
            if content.contains('\t') {
                ValidationResult::fail("tabs are not allowed")
            } else {
                ValidationResult::pass()
            }
        };
        assert!(no_tabs.validate(Path::new("a.py"), "x = 1\n").ok);
        let failed = no_tabs.validate(Path::new("a.py"), "\tx = 1\n");
        assert!(!failed.ok);
        assert_eq!(failed.messages, vec!["tabs are not allowed"]);
    }
}
