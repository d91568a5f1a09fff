//! ---
//! warden_section: "06-security-access-control"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Input validation errors carrying per-field detail."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::fmt;

use serde::Serialize;

/// Problems found with a single request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field_name: String,
    pub errors: Vec<String>,
}

/// Malformed input. Either a free-form message or one or more field errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    pub field_errors: Vec<FieldError>,
    pub message: Option<String>,
}

impl ValidationError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            field_errors: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn field(field_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::default().with_field(field_name, error)
    }

    pub fn required(field_name: &str) -> Self {
        Self::field(field_name, "is required")
    }

    pub fn with_field(mut self, field_name: impl Into<String>, error: impl Into<String>) -> Self {
        let field_name = field_name.into();
        let error = error.into();
        match self
            .field_errors
            .iter_mut()
            .find(|f| f.field_name == field_name)
        {
            Some(existing) => existing.errors.push(error),
            None => self.field_errors.push(FieldError {
                field_name,
                errors: vec![error],
            }),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.field_errors.is_empty() && self.message.is_none()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(message) = &self.message {
            return f.write_str(message);
        }
        f.write_str("validation failed: ")?;
        for (i, field) in self.field_errors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.field_name, field.errors.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

pub const MAX_NAME_LENGTH: usize = 256;

/// Names are 1 to 256 characters of `[A-Za-z0-9-_.@]`.
pub fn validate_name(field_name: &str, value: &str) -> Result<(), ValidationError> {
    let length = value.chars().count();
    if length == 0 {
        return Err(ValidationError::required(field_name));
    }
    if length > MAX_NAME_LENGTH {
        return Err(ValidationError::field(
            field_name,
            format!("length of string ({length}) must be no more than {MAX_NAME_LENGTH}"),
        ));
    }
    for (position, c) in value.chars().enumerate() {
        if !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@')) {
            return Err(ValidationError::field(
                field_name,
                format!("character '{c}' at position {position} is not allowed"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_is_reported_with_position() {
        let err = validate_name("name", "this-name-should-not-contain-slash/").unwrap_err();
        assert_eq!(
            err.field_errors,
            vec![FieldError {
                field_name: "name".into(),
                errors: vec!["character '/' at position 34 is not allowed".into()],
            }]
        );
        assert_eq!(
            err.to_string(),
            "validation failed: name: character '/' at position 34 is not allowed"
        );
    }

    #[test]
    fn accepts_email_like_names() {
        assert!(validate_name("name", "ops.bot@example.com").is_ok());
        assert!(validate_name("name", "").is_err());
        assert!(validate_name("name", &"a".repeat(257)).is_err());
    }

    #[test]
    fn field_errors_group_by_field() {
        let err = ValidationError::field("ttl", "too short").with_field("ttl", "too long");
        assert_eq!(err.field_errors.len(), 1);
        assert_eq!(err.field_errors[0].errors.len(), 2);
    }

    #[test]
    fn field_error_serializes_camel_case() {
        let err = ValidationError::required("issuedFor");
        let json = serde_json::to_value(&err.field_errors).unwrap();
        assert_eq!(json[0]["fieldName"], "issuedFor");
    }
}
