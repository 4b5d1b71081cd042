//! Structural validation of creation and callback payloads.
//!
//! Validators are pure: they take the raw JSON body and return either the
//! normalized payload or every field-level violation found (not just the first).

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::FieldViolation;
use crate::id::JobId;
use crate::job::{JobStatus, NewJob};
use crate::update::CallbackUpdate;

pub const MIN_PROGRESS: f64 = 0.0;
pub const MAX_PROGRESS: f64 = 100.0;

type Violations = Vec<FieldViolation>;

/// Validate a callback body (`status`, `progress`, `result`, `error`,
/// `completedAt`, `duration`). Unknown fields are ignored.
pub fn validate_callback(body: &Value) -> Result<CallbackUpdate, Violations> {
    let obj = as_object(body)?;
    let mut violations = Violations::new();

    let status = match obj.get("status") {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new("status", "is required"));
            None
        }
        Some(Value::String(s)) => match s.parse::<JobStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                violations.push(FieldViolation::new(
                    "status",
                    format!("unknown status '{s}' (expected one of {})", status_list()),
                ));
                None
            }
        },
        Some(_) => {
            violations.push(FieldViolation::new("status", "must be a string"));
            None
        }
    };

    let progress = optional_number(obj, "progress", &mut violations).and_then(|p| {
        if (MIN_PROGRESS..=MAX_PROGRESS).contains(&p) {
            Some(p)
        } else {
            violations.push(FieldViolation::new(
                "progress",
                format!("must be between {MIN_PROGRESS} and {MAX_PROGRESS}, got {p}"),
            ));
            None
        }
    });

    let duration = optional_number(obj, "duration", &mut violations).and_then(|d| {
        if d >= 0.0 {
            Some(d)
        } else {
            violations.push(FieldViolation::new(
                "duration",
                format!("must be non-negative, got {d}"),
            ));
            None
        }
    });

    let error = match obj.get("error") {
        None => None,
        Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(Some(s.clone())),
        Some(_) => {
            violations.push(FieldViolation::new("error", "must be a string"));
            None
        }
    };

    let completed_at = match obj.get("completedAt") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => match parse_timestamp(s) {
            Some(at) => Some(at),
            None => {
                violations.push(FieldViolation::new(
                    "completedAt",
                    format!("'{s}' is not an RFC 3339 timestamp"),
                ));
                None
            }
        },
        Some(_) => {
            violations.push(FieldViolation::new(
                "completedAt",
                "must be a timestamp string",
            ));
            None
        }
    };

    match status {
        Some(status) if violations.is_empty() => Ok(CallbackUpdate {
            status,
            progress,
            result: obj.get("result").cloned(),
            error,
            completed_at,
            duration,
        }),
        _ => Err(violations),
    }
}

/// Validate a creation body (`id`, `type`, `name`, `project`, `parameters`).
pub fn validate_new_job(body: &Value) -> Result<NewJob, Violations> {
    let obj = as_object(body)?;
    let mut violations = Violations::new();

    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => match JobId::parse(s.as_str()) {
            Ok(id) => Some(id),
            Err(e) => {
                violations.push(FieldViolation::new("id", e.to_string()));
                None
            }
        },
        Some(_) => {
            violations.push(FieldViolation::new("id", "must be a string"));
            None
        }
    };

    let job_type = required_text(obj, "type", &mut violations);
    let name = required_text(obj, "name", &mut violations);

    let project = match obj.get("project") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            violations.push(FieldViolation::new("project", "must be a string"));
            None
        }
    };

    let parameters = match obj.get("parameters") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            violations.push(FieldViolation::new("parameters", "must be an object"));
            Map::new()
        }
    };

    match (job_type, name) {
        (Some(job_type), Some(name)) if violations.is_empty() => Ok(NewJob {
            id,
            job_type,
            name,
            project,
            parameters,
        }),
        _ => Err(violations),
    }
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn as_object(body: &Value) -> Result<&Map<String, Value>, Violations> {
    body.as_object()
        .ok_or_else(|| vec![FieldViolation::new("body", "must be a JSON object")])
}

fn optional_number(obj: &Map<String, Value>, field: &str, violations: &mut Violations) -> Option<f64> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => {
            violations.push(FieldViolation::new(field, "must be a number"));
            None
        }
    }
}

fn required_text(obj: &Map<String, Value>, field: &str, violations: &mut Violations) -> Option<String> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            violations.push(FieldViolation::new(field, "must not be empty"));
            None
        }
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(field, "is required"));
            None
        }
        Some(_) => {
            violations.push(FieldViolation::new(field, "must be a string"));
            None
        }
    }
}

fn status_list() -> String {
    JobStatus::ALL
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
