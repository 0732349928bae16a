//! Message pools and per-step message selection.

use rand::Rng;
use serde::Serialize;

use crate::error::{CadenceError, Result};

/// Separator line between variations in raw message text.
const VARIATION_SEPARATOR: &str = "---";

/// The message content for a dispatch run: one fixed message, or a pool of
/// variations sampled per step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", content = "content", rename_all = "snake_case")]
pub enum MessagePool {
    Fixed(String),
    Variations(Vec<String>),
}

impl MessagePool {
    /// Parse raw message text.
    ///
    /// Text containing `---` separator lines becomes a variation pool, one
    /// variation per block; anything else is a single fixed message. Empty
    /// blocks are dropped; at least one non-empty variation must remain.
    pub fn parse(raw: &str) -> Result<Self> {
        let has_separator = raw.lines().any(|line| line.trim() == VARIATION_SEPARATOR);
        if !has_separator {
            let message = raw.trim();
            if message.is_empty() {
                return Err(CadenceError::Intake("message text is empty".to_string()));
            }
            return Ok(MessagePool::Fixed(message.to_string()));
        }

        let mut variations = Vec::new();
        let mut block = String::new();
        for line in raw.lines() {
            if line.trim() == VARIATION_SEPARATOR {
                if !block.trim().is_empty() {
                    variations.push(block.trim().to_string());
                }
                block.clear();
            } else {
                block.push_str(line);
                block.push('\n');
            }
        }
        if !block.trim().is_empty() {
            variations.push(block.trim().to_string());
        }

        if variations.is_empty() {
            return Err(CadenceError::Intake(
                "message pool has no non-empty variations".to_string(),
            ));
        }
        Ok(MessagePool::Variations(variations))
    }

    /// Select the message for one dispatch step.
    ///
    /// Fixed mode always returns the same text. Pool mode picks a variation
    /// uniformly at random per call, so each step may get a different one.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        match self {
            MessagePool::Fixed(message) => message,
            MessagePool::Variations(variations) => {
                &variations[rng.random_range(0..variations.len())]
            }
        }
    }

    pub fn variation_count(&self) -> usize {
        match self {
            MessagePool::Fixed(_) => 1,
            MessagePool::Variations(variations) => variations.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn fixed_mode_is_deterministic() {
        let pool = MessagePool::parse("hey, quick question").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(pool.select(&mut rng), "hey, quick question");
        }
    }

    #[test]
    fn parses_variation_pool() {
        let pool = MessagePool::parse("hi there\n---\nhello!\n---\nhey\n").unwrap();
        assert_eq!(pool.variation_count(), 3);
    }

    #[test]
    fn pool_mode_eventually_selects_every_variation() {
        let pool = MessagePool::parse("one\n---\ntwo\n---\nthree").unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let seen: HashSet<String> = (0..100).map(|_| pool.select(&mut rng).to_string()).collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn multi_line_variations_survive_parsing() {
        let pool = MessagePool::parse("line one\nline two\n---\nother").unwrap();
        match pool {
            MessagePool::Variations(ref v) => assert_eq!(v[0], "line one\nline two"),
            _ => panic!("expected variation pool"),
        }
    }

    #[test]
    fn rejects_empty_message() {
        assert!(matches!(
            MessagePool::parse("   \n  "),
            Err(CadenceError::Intake(_))
        ));
    }

    #[test]
    fn rejects_pool_of_empty_blocks() {
        assert!(matches!(
            MessagePool::parse("---\n\n---\n"),
            Err(CadenceError::Intake(_))
        ));
    }
}
