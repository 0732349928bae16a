//! Target identifiers and batch normalization.

use std::fmt;

use serde::Serialize;

use crate::error::{CadenceError, Result};

/// Maximum length of a canonical target identifier.
pub const MAX_TARGET_LEN: usize = 30;

/// A canonical target identifier.
///
/// Non-empty, at most [`MAX_TARGET_LEN`] characters, restricted to letters,
/// digits, `.` and `_`. Immutable once normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    fn is_valid(s: &str) -> bool {
        !s.is_empty()
            && s.len() <= MAX_TARGET_LEN
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered batch of targets.
///
/// Insertion order is processing order: earlier targets get shorter delays.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct TargetBatch(Vec<Target>);

impl TargetBatch {
    /// Normalize raw newline-separated text into a batch.
    ///
    /// Splits on newlines, trims whitespace, strips one leading `@`, drops
    /// empty lines, and filters out identifiers that fail the character-class
    /// or length rule. An empty or over-limit result rejects the whole
    /// request before any dispatch begins.
    pub fn normalize(raw: &str, max_targets: usize) -> Result<Self> {
        let targets: Vec<Target> = raw
            .lines()
            .map(str::trim)
            .map(|line| line.strip_prefix('@').unwrap_or(line))
            .filter(|line| Target::is_valid(line))
            .map(|line| Target(line.to_string()))
            .collect();

        if targets.is_empty() {
            return Err(CadenceError::Intake(
                "no valid targets after normalization".to_string(),
            ));
        }
        if targets.len() > max_targets {
            return Err(CadenceError::Intake(format!(
                "batch has {} targets, maximum is {}",
                targets.len(),
                max_targets
            )));
        }
        Ok(TargetBatch(targets))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Target> {
        self.0.iter()
    }
}
