//! Constraint translation: from an [`EntitySchema`] to per-operation request
//! validators.
//!
//! Operation selection follows partial-patch semantics:
//! - **create**: required fields mandatory, everything else optional
//! - **update**: every field optional
//! - **read / delete**: identifier-shaped parameters only (`id`, or `ids`
//!   as a comma-separated list, each element checked individually)
//!
//! Objects are matched strictly: unrecognized request fields are rejected so
//! client typos fail loudly instead of being silently dropped. Validation
//! collects every field error rather than stopping at the first.

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::schema::{EntitySchema, FieldKind, FieldSpec};

/// One field's validation failure, as surfaced in the response envelope.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Which body shape a [`RequestValidator`] enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationTarget {
    /// Required fields mandatory.
    Create,
    /// Every field optional.
    Update,
}

/// A per-operation input validator derived from an [`EntitySchema`].
#[derive(Debug, Clone)]
pub struct RequestValidator<'a> {
    schema: &'a EntitySchema,
    target: ValidationTarget,
}

impl<'a> RequestValidator<'a> {
    #[must_use]
    pub fn for_create(schema: &'a EntitySchema) -> Self {
        Self {
            schema,
            target: ValidationTarget::Create,
        }
    }

    #[must_use]
    pub fn for_update(schema: &'a EntitySchema) -> Self {
        Self {
            schema,
            target: ValidationTarget::Update,
        }
    }

    /// Validate a request body against the schema, returning the coerced
    /// document on success.
    ///
    /// # Errors
    ///
    /// Returns every failing field: non-object bodies, unknown keys, missing
    /// required fields (create only), and per-field constraint violations.
    pub fn validate_body(&self, body: &Value) -> Result<Map<String, Value>, Vec<ValidationError>> {
        let Some(object) = body.as_object() else {
            return Err(vec![ValidationError::new("$body", "request body must be a JSON object")]);
        };

        let mut errors = Vec::new();
        let mut coerced = Map::new();

        // Closed object matching: anything outside the schema is a typo.
        for key in object.keys() {
            if self.schema.get(key).is_none() {
                errors.push(ValidationError::new(key.clone(), "unknown field"));
            }
        }

        for (name, spec) in self.schema.fields() {
            match object.get(name) {
                Some(Value::Null) | None => {
                    if self.target == ValidationTarget::Create {
                        if let Some(message) = &spec.required {
                            errors.push(ValidationError::new(name, message.clone()));
                        }
                    }
                }
                Some(value) => match check_field(name, spec, value) {
                    Ok(value) => {
                        coerced.insert(name.to_string(), value);
                    }
                    Err(err) => errors.push(err),
                },
            }
        }

        if errors.is_empty() {
            Ok(coerced)
        } else {
            Err(errors)
        }
    }
}

/// Whether a string is shaped like a record identifier.
#[must_use]
pub fn is_identifier(raw: &str) -> bool {
    Uuid::parse_str(raw).is_ok()
}

/// Validate a single identifier parameter.
///
/// # Errors
///
/// Returns a field error when the value is not identifier-shaped.
pub fn validate_identifier(field: &str, raw: &str) -> Result<(), ValidationError> {
    if is_identifier(raw) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field,
            format!("`{raw}` is not a valid identifier"),
        ))
    }
}

/// Validate a delimiter-separated identifier list, checking each element
/// individually.
///
/// # Errors
///
/// Returns one error per malformed element, or a single error when the list
/// is empty.
pub fn validate_identifier_list(field: &str, raw: &str) -> Result<Vec<String>, Vec<ValidationError>> {
    let ids: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .collect();

    if ids.is_empty() {
        return Err(vec![ValidationError::new(field, "at least one identifier is required")]);
    }

    let errors: Vec<ValidationError> = ids
        .iter()
        .filter_map(|id| validate_identifier(field, id).err())
        .collect();

    if errors.is_empty() {
        Ok(ids)
    } else {
        Err(errors)
    }
}

/// Check one value against one field spec, returning the coerced value.
///
/// Dispatch is an explicit match over [`FieldKind`]; constraints apply in
/// declaration order (type, then pattern, then length, then range).
///
/// # Errors
///
/// Returns the first violated constraint for this field.
pub fn check_field(name: &str, spec: &FieldSpec, value: &Value) -> Result<Value, ValidationError> {
    match spec.kind {
        FieldKind::String => {
            let Some(text) = value.as_str() else {
                return Err(type_error(name, spec, value));
            };
            if let Some(rule) = &spec.pattern {
                if !rule.regex.is_match(text) {
                    return Err(ValidationError::new(name, rule.message.clone()));
                }
            }
            if let Some(min) = spec.min_length {
                if text.chars().count() < min {
                    return Err(ValidationError::new(
                        name,
                        format!("must be at least {min} characters"),
                    ));
                }
            }
            if let Some(max) = spec.max_length {
                if text.chars().count() > max {
                    return Err(ValidationError::new(
                        name,
                        format!("must be at most {max} characters"),
                    ));
                }
            }
            Ok(value.clone())
        }
        FieldKind::Number => {
            // Numeric strings are coerced, matching query-parameter behaviour.
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            let Some(number) = number else {
                return Err(type_error(name, spec, value));
            };
            if let Some(min) = spec.min {
                if number < min {
                    return Err(ValidationError::new(name, format!("must be at least {min}")));
                }
            }
            if let Some(max) = spec.max {
                if number > max {
                    return Err(ValidationError::new(name, format!("must be at most {max}")));
                }
            }
            Ok(serde_json::Number::from_f64(number).map_or_else(|| value.clone(), Value::Number))
        }
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(type_error(name, spec, value)),
        },
        FieldKind::Date => {
            let Some(text) = value.as_str() else {
                return Err(type_error(name, spec, value));
            };
            if chrono::DateTime::parse_from_rfc3339(text).is_err() {
                return Err(ValidationError::new(name, "must be an RFC 3339 date"));
            }
            Ok(value.clone())
        }
        FieldKind::Reference => {
            let Some(text) = value.as_str() else {
                return Err(type_error(name, spec, value));
            };
            validate_identifier(name, text)?;
            Ok(value.clone())
        }
        FieldKind::StringArray => {
            // Per-element rules are overridden: a non-empty array of strings
            // is the whole contract.
            let Some(items) = value.as_array() else {
                return Err(type_error(name, spec, value));
            };
            if items.is_empty() {
                return Err(ValidationError::new(name, "must be a non-empty array of strings"));
            }
            if items.iter().any(|item| !item.is_string()) {
                return Err(ValidationError::new(name, "every element must be a string"));
            }
            Ok(value.clone())
        }
        FieldKind::Any => Ok(value.clone()),
    }
}

fn type_error(name: &str, spec: &FieldSpec, value: &Value) -> ValidationError {
    ValidationError::new(
        name,
        format!("expected {}, got {}", spec.kind.type_name(), json_type_name(value)),
    )
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
