//! SQL statement validator.
//!
//! Read-only gate in front of every statement. This is a textual prefix
//! check, not a parser: `SELECT ... INTO` or a SELECT calling a function
//! with side effects is not caught.

use serde::Serialize;

use crate::errors::{AppError, AppResult};

/// Leading keywords accepted by the gate.
const READ_ONLY_PREFIXES: [&str; 2] = ["SELECT", "WITH"];

/// Validates SQL statements for read-only execution.
pub struct SqlValidator;

/// Outcome of [`SqlValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    /// Whether the statement may run.
    pub accepted: bool,
    /// Why the statement was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GateDecision {
    fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    fn reject(reason: String) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
        }
    }
}

impl SqlValidator {
    /// Classifies a statement.
    ///
    /// # Arguments
    /// * `sql` - The SQL statement to classify
    ///
    /// # Returns
    /// Accepted iff the whitespace-trimmed text starts with `SELECT` or `WITH`,
    /// compared case-insensitively. Never fails; malformed input is rejected.
    pub fn validate(sql: &str) -> GateDecision {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return GateDecision::reject("empty statement".to_string());
        }

        let accepted = READ_ONLY_PREFIXES.iter().any(|prefix| {
            trimmed
                .as_bytes()
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
        });
        if accepted {
            return GateDecision::accept();
        }

        GateDecision::reject(format!(
            "only SELECT or WITH statements are allowed, got {}",
            Self::leading_keyword(trimmed)
        ))
    }

    /// Runs [`validate`](Self::validate) and turns a rejection into an error.
    ///
    /// # Errors
    /// Returns `AppError::RejectedStatement` carrying the rejection reason.
    pub fn check(sql: &str) -> AppResult<()> {
        let decision = Self::validate(sql);
        if decision.accepted {
            Ok(())
        } else {
            Err(AppError::RejectedStatement(
                decision.reason.unwrap_or_else(|| "statement rejected".to_string()),
            ))
        }
    }

    /// First word of the statement, upper-cased, for error messages.
    fn leading_keyword(trimmed: &str) -> String {
        let word: String = trimmed
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .take(32)
            .collect();
        if word.is_empty() {
            // Starts with punctuation such as '(' or a comment marker.
            let first: String = trimmed.chars().take(8).collect();
            format!("'{}'", first)
        } else {
            word.to_uppercase()
        }
    }
}
