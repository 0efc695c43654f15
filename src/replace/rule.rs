//! Replacement rules
//!
//! A rule is an `{old, new}` pair applied to the text nodes of a document.
//! Rules are validated as a list before any file is touched; the first bad
//! rule fails the whole run with its index.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ReplaceError, RuleError};

/// Replace every occurrence of `old` with `new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub old: String,
    pub new: String,
}

impl Rule {
    /// Build a rule, rejecting blank search text and no-op rules.
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Result<Self, RuleError> {
        let rule = Rule {
            old: old.into(),
            new: new.into(),
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if self.old.trim().is_empty() {
            return Err(RuleError::EmptySearch);
        }
        if self.old == self.new {
            return Err(RuleError::NoOp);
        }
        Ok(())
    }
}

/// Validate every rule, reporting the first failure with its position.
pub fn validate_rules(rules: &[Rule]) -> Result<(), ReplaceError> {
    for (index, rule) in rules.iter().enumerate() {
        rule.validate()
            .map_err(|source| ReplaceError::InvalidRule { index, source })?;
    }
    Ok(())
}

/// Parse and validate a JSON list of `{"old": ..., "new": ...}` objects.
pub fn parse_rules_json(json: &str) -> anyhow::Result<Vec<Rule>> {
    let rules: Vec<Rule> = serde_json::from_str(json)?;
    validate_rules(&rules)?;
    Ok(rules)
}

/// Read a rules file from disk.
pub fn load_rules(path: &Path) -> anyhow::Result<Vec<Rule>> {
    let json = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read rules file {}: {}", path.display(), e))?;
    parse_rules_json(&json)
        .map_err(|e| anyhow::anyhow!("Invalid rules file {}: {}", path.display(), e))
}
