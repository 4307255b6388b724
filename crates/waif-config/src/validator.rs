//! Configuration validation.
//!
//! Validation runs over the generic document (before typed deserialisation)
//! so that every violation can be reported at once, each with a path a user
//! can locate: `jobs[2] (id:foo).schedule`, or `jobs[2].schedule` when the
//! job has no usable id.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use waif_cron::CronSchedule;

/// Keys allowed on a job entry.
const JOB_KEYS: &[&str] = &[
    "id",
    "name",
    "command",
    "schedule",
    "cwd",
    "env",
    "capture",
    "redact",
    "timeout_seconds",
    "retention",
];

const CAPTURE_VALUES: &[&str] = &["stdout", "stderr"];

static JOB_ID_RE: OnceLock<Regex> = OnceLock::new();

fn job_id_re() -> &'static Regex {
    JOB_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }
}

/// A validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a parsed configuration document.
    ///
    /// Structural checks, cron checks and id uniqueness all contribute to the
    /// same result.
    pub fn validate(document: &Value) -> ValidationResult {
        let mut result = ValidationResult::default();

        let Some(root) = document.as_object() else {
            result.add_error(ValidationError::new(
                "<root>",
                "configuration must be a mapping with a 'jobs' list",
            ));
            return result;
        };

        for key in root.keys().filter(|k| k.as_str() != "jobs") {
            result.add_error(ValidationError::new(key.as_str(), "unknown field"));
        }

        match root.get("jobs") {
            None => result.add_error(ValidationError::new("jobs", "jobs is required")),
            Some(Value::Array(jobs)) => {
                if jobs.is_empty() {
                    result.add_error(ValidationError::new(
                        "jobs",
                        "must contain at least one job",
                    ));
                }

                for (idx, job) in jobs.iter().enumerate() {
                    Self::validate_job(idx, job, &mut result);
                }

                Self::validate_schedules(jobs, &mut result);
                Self::validate_unique_ids(jobs, &mut result);
            }
            Some(_) => result.add_error(ValidationError::new("jobs", "must be a list")),
        }

        result
    }

    /// Located path of a job entry.
    pub fn job_path(idx: usize, job: &Value) -> String {
        match job.get("id").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => format!("jobs[{}] (id:{})", idx, id),
            _ => format!("jobs[{}]", idx),
        }
    }

    fn validate_job(idx: usize, job: &Value, result: &mut ValidationResult) {
        let base = Self::job_path(idx, job);

        let Some(fields) = job.as_object() else {
            result.add_error(ValidationError::new(base, "job must be a mapping"));
            return;
        };

        for key in fields.keys() {
            if !JOB_KEYS.contains(&key.as_str()) {
                result.add_error(ValidationError::new(
                    format!("{}.{}", base, key),
                    "unknown field",
                ));
            }
        }

        for field in ["id", "name", "command", "schedule"] {
            Self::validate_required_string(&base, fields, field, result);
        }

        if let Some(id) = fields.get("id").and_then(Value::as_str) {
            if !id.trim().is_empty() && !job_id_re().is_match(id) {
                result.add_error(ValidationError::new(
                    format!("{}.id", base),
                    "must match ^[A-Za-z0-9_-]+$",
                ));
            }
        }

        if let Some(cwd) = fields.get("cwd") {
            if !cwd.is_string() {
                result.add_error(ValidationError::new(
                    format!("{}.cwd", base),
                    "must be a string",
                ));
            }
        }

        if let Some(env) = fields.get("env") {
            Self::validate_env(&base, env, result);
        }

        if let Some(capture) = fields.get("capture") {
            Self::validate_capture(&base, capture, result);
        }

        if let Some(redact) = fields.get("redact") {
            if !redact.is_boolean() {
                result.add_error(ValidationError::new(
                    format!("{}.redact", base),
                    "must be a boolean",
                ));
            }
        }

        if let Some(timeout) = fields.get("timeout_seconds") {
            match timeout.as_f64() {
                Some(secs) if secs > 0.0 && secs.is_finite() => {}
                Some(_) => result.add_error(ValidationError::new(
                    format!("{}.timeout_seconds", base),
                    "must be a positive number",
                )),
                None => result.add_error(ValidationError::new(
                    format!("{}.timeout_seconds", base),
                    "must be a number",
                )),
            }
        }

        if let Some(retention) = fields.get("retention") {
            Self::validate_retention(&base, retention, result);
        }
    }

    fn validate_required_string(
        base: &str,
        fields: &Map<String, Value>,
        field: &str,
        result: &mut ValidationResult,
    ) {
        let path = format!("{}.{}", base, field);
        match fields.get(field) {
            None | Some(Value::Null) => {
                result.add_error(ValidationError::new(path, format!("{} is required", field)))
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                result.add_error(ValidationError::new(path, format!("{} is required", field)))
            }
            Some(Value::String(_)) => {}
            Some(_) => result.add_error(ValidationError::new(path, "must be a string")),
        }
    }

    fn validate_env(base: &str, env: &Value, result: &mut ValidationResult) {
        let Some(vars) = env.as_object() else {
            result.add_error(ValidationError::new(
                format!("{}.env", base),
                "must be a mapping of strings",
            ));
            return;
        };

        for (key, value) in vars {
            if !value.is_string() {
                result.add_error(ValidationError::new(
                    format!("{}.env.{}", base, key),
                    "must be a string",
                ));
            }
        }
    }

    fn validate_capture(base: &str, capture: &Value, result: &mut ValidationResult) {
        let Some(streams) = capture.as_array() else {
            result.add_error(ValidationError::new(
                format!("{}.capture", base),
                "capture must be a list containing stdout and/or stderr",
            ));
            return;
        };

        let mut seen = Vec::new();
        for (i, stream) in streams.iter().enumerate() {
            let path = format!("{}.capture[{}]", base, i);
            match stream.as_str() {
                Some(name) if CAPTURE_VALUES.contains(&name) => {
                    if seen.contains(&name) {
                        result.add_error(ValidationError::new(
                            path,
                            format!("duplicate capture stream '{}'", name),
                        ));
                    } else {
                        seen.push(name);
                    }
                }
                _ => result.add_error(ValidationError::new(
                    path,
                    format!("capture must be one of {:?}", CAPTURE_VALUES),
                )),
            }
        }
    }

    fn validate_retention(base: &str, retention: &Value, result: &mut ValidationResult) {
        let Some(fields) = retention.as_object() else {
            result.add_error(ValidationError::new(
                format!("{}.retention", base),
                "retention must be a mapping",
            ));
            return;
        };

        for key in fields.keys().filter(|k| k.as_str() != "keep_last") {
            result.add_error(ValidationError::new(
                format!("{}.retention.{}", base, key),
                "unknown field",
            ));
        }

        if let Some(keep_last) = fields.get("keep_last") {
            let path = format!("{}.retention.keep_last", base);
            let message = match keep_last {
                Value::Number(n) => match (n.as_u64(), n.as_i64()) {
                    (Some(0), _) | (None, Some(_)) => {
                        Some("keep_last must be a positive integer (>= 1)")
                    }
                    (Some(v), _) if v > u64::from(u32::MAX) => Some("keep_last is too large"),
                    (Some(_), _) => None,
                    (None, None) => Some("keep_last must be an integer"),
                },
                _ => Some("keep_last must be an integer"),
            };

            if let Some(message) = message {
                result.add_error(ValidationError::new(path, message));
            }
        }
    }

    /// Parse every non-blank schedule with the cron clock.
    fn validate_schedules(jobs: &[Value], result: &mut ValidationResult) {
        for (idx, job) in jobs.iter().enumerate() {
            let Some(schedule) = job.get("schedule").and_then(Value::as_str) else {
                continue;
            };
            if schedule.trim().is_empty() {
                continue;
            }
            if let Err(e) = CronSchedule::parse(schedule) {
                result.add_error(ValidationError::new(
                    format!("{}.schedule", Self::job_path(idx, job)),
                    e.to_string(),
                ));
            }
        }
    }

    fn validate_unique_ids(jobs: &[Value], result: &mut ValidationResult) {
        let mut first_seen: HashMap<&str, usize> = HashMap::new();

        for (idx, job) in jobs.iter().enumerate() {
            let Some(id) = job.get("id").and_then(Value::as_str) else {
                continue;
            };
            if id.trim().is_empty() {
                continue;
            }
            match first_seen.get(id) {
                Some(first) => result.add_error(ValidationError::new(
                    format!("{}.id", Self::job_path(idx, job)),
                    format!("duplicate job id '{}' (first defined at jobs[{}])", id, first),
                )),
                None => {
                    first_seen.insert(id, idx);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
