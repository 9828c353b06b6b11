//! Inbound distribution message and its validation

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use super::types::RecipientEntry;

/// A validated inbound event. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionMessage {
    pub id: String,
    pub event_type: String,
    pub metadata: Map<String, Value>,
    pub payload: Value,
    pub added_at: DateTime<Utc>,
    /// Overrides the recipient's zone in job payloads only
    pub time_zone: Option<Tz>,
    pub recipients: Vec<RecipientEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Every field problem found in one message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&joined)
    }
}

impl std::error::Error for ValidationErrors {}

impl DistributionMessage {
    /// Validate a raw JSON message, collecting all field errors before failing.
    pub fn from_value(raw: &Value) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let Some(object) = raw.as_object() else {
            errors.push("message", "must be a JSON object");
            return Err(errors);
        };

        let id = match object.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(_)) => {
                errors.push("id", "should not be empty");
                None
            }
            Some(_) => {
                errors.push("id", "must be a string or a number");
                None
            }
            None => {
                errors.push("id", "is required");
                None
            }
        };

        let event_type = match object.get("type") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::String(_)) => {
                errors.push("type", "should not be empty");
                None
            }
            Some(_) => {
                errors.push("type", "must be a string");
                None
            }
            None => {
                errors.push("type", "is required");
                None
            }
        };

        let metadata = match object.get("metadata") {
            Some(Value::Object(map)) => map.clone(),
            None | Some(Value::Null) => Map::new(),
            Some(_) => {
                errors.push("metadata", "must be an object");
                Map::new()
            }
        };

        let payload = match object.get("payload") {
            Some(value @ Value::Object(_)) => Some(value.clone()),
            Some(_) => {
                errors.push("payload", "must be an object");
                None
            }
            None => {
                errors.push("payload", "is required");
                None
            }
        };

        let added_at = match object.get("addedAt") {
            Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => Some(dt.with_timezone(&Utc)),
                Err(_) => {
                    errors.push("addedAt", "must be an ISO 8601 date string");
                    None
                }
            },
            Some(_) => {
                errors.push("addedAt", "must be an ISO 8601 date string");
                None
            }
            None => {
                errors.push("addedAt", "is required");
                None
            }
        };

        let time_zone = match object.get("timeZone") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => match s.parse::<Tz>() {
                Ok(tz) => Some(tz),
                Err(_) => {
                    errors.push("timeZone", format!("'{}' is not a valid IANA time zone", s));
                    None
                }
            },
            Some(_) => {
                errors.push("timeZone", "must be a string");
                None
            }
        };

        let mut recipients = Vec::new();
        match object.get("recipients") {
            None | Some(Value::Null) => {}
            Some(Value::Array(entries)) => {
                for (index, entry) in entries.iter().enumerate() {
                    match serde_json::from_value::<RecipientEntry>(entry.clone()) {
                        Ok(parsed) => recipients.push(parsed),
                        Err(e) => errors.push(format!("recipients[{}]", index), e.to_string()),
                    }
                }
            }
            Some(_) => errors.push("recipients", "must be an array"),
        }

        match (id, event_type, payload, added_at) {
            (Some(id), Some(event_type), Some(payload), Some(added_at)) if errors.is_empty() => {
                Ok(Self {
                    id,
                    event_type,
                    metadata,
                    payload,
                    added_at,
                    time_zone,
                    recipients,
                })
            }
            _ => Err(errors),
        }
    }
}
