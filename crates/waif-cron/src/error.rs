//! Cron errors.

use thiserror::Error;

/// Errors raised while parsing or evaluating a cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    /// The expression does not have 5 or 6 whitespace-separated fields.
    #[error("expected 5 or 6 fields in cron expression '{expr}', found {found}")]
    FieldCount { expr: String, found: usize },

    /// The expression could not be parsed.
    #[error("invalid cron expression '{expr}': {message}")]
    Parse { expr: String, message: String },

    /// The expression parsed but never fires in the requested direction.
    #[error("cron expression '{0}' has no fire time in range")]
    Exhausted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_count_display() {
        let err = CronError::FieldCount {
            expr: "* *".to_string(),
            found: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("5 or 6"));
        assert!(msg.contains("found 2"));
    }

    #[test]
    fn test_parse_display_names_expression() {
        let err = CronError::Parse {
            expr: "61 * * * *".to_string(),
            message: "out of range".to_string(),
        };
        assert!(err.to_string().contains("61 * * * *"));
    }
}
