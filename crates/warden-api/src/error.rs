//! ---
//! warden_section: "05-networking-external-interfaces"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Mapping of core errors onto HTTP status codes and the error body."
//! warden_version: "v0.1.0"
//! warden_owner: "tbd"
//! ---
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use semver::Version;
use serde::Serialize;
use tracing::error;
use warden_security::{
    AccessError, AccessKeyError, DataError, ErrorKind, FieldError, GrantError, ValidationError,
};
use warden_versioning::VersionError;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldError>,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub field_errors: Vec<FieldError>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field_errors: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn gone(version: &Version) -> Self {
        Self::new(StatusCode::GONE, format!("removed in version {version}"))
    }

    /// Log the cause and hide it from the client.
    pub fn internal(err: impl fmt::Display) -> Self {
        error!(error = %err, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    fn from_kind(kind: ErrorKind, err: &dyn fmt::Display) -> Self {
        match kind {
            ErrorKind::Validation => Self::bad_request(err.to_string()),
            kind if kind.is_credential_failure() => Self::unauthorized(),
            ErrorKind::NoActiveIdentity => Self::unauthorized(),
            ErrorKind::NotAuthorized => Self::new(StatusCode::FORBIDDEN, err.to_string()),
            ErrorKind::NotFound => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            ErrorKind::Conflict => Self::new(StatusCode::CONFLICT, err.to_string()),
            _ => Self::internal(err),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            code: self.status.as_u16(),
            message: self.message,
            field_errors: self.field_errors,
        });
        (self.status, body).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let message = match &err.message {
            Some(message) => message.clone(),
            None => err.to_string(),
        };
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
            field_errors: err.field_errors,
        }
    }
}

impl From<VersionError> for ApiError {
    fn from(err: VersionError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        Self::from_kind(err.kind(), &err)
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        Self::from_kind(err.kind(), &err)
    }
}

impl From<AccessKeyError> for ApiError {
    fn from(err: AccessKeyError) -> Self {
        match err {
            AccessKeyError::Validation(err) => err.into(),
            err => Self::from_kind(err.kind(), &err),
        }
    }
}

impl From<GrantError> for ApiError {
    fn from(err: GrantError) -> Self {
        match err {
            GrantError::Validation(err) => err.into(),
            GrantError::Store(err) => err.into(),
        }
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for ApiError {
    fn from(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = err.path().to_string();
        let inner = err.into_inner();
        if path.is_empty() || path == "." {
            Self::bad_request(format!("invalid request: {inner}"))
        } else {
            ValidationError::field(path, inner.to_string()).into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_security::AuthorizationError;

    #[test]
    fn kinds_map_to_statuses() {
        let status = |err: ApiError| err.status;
        assert_eq!(
            status(DataError::NotFound("grant").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(DataError::Conflict("name".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(DataError::TransactionClosed.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(AccessKeyError::Expired.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status(AccessError::NoIdentity.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(VersionError::Missing.into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn authorization_message_reaches_the_client() {
        let err: ApiError = AccessError::Authorization(AuthorizationError {
            resource: "grants".into(),
            operation: "create".into(),
            required_roles: vec!["admin".into()],
        })
        .into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(
            err.message,
            "you do not have permission to create grants, requires role admin"
        );
    }

    #[test]
    fn internal_errors_are_masked() {
        let err: ApiError = DataError::Unexpected(anyhow::anyhow!("disk on fire")).into();
        assert_eq!(err.message, "internal server error");
    }

    #[test]
    fn field_errors_are_serialized_camel_case() {
        let err: ApiError =
            ValidationError::field("name", "character '/' at position 3 is not allowed").into();
        let body = serde_json::to_value(ErrorResponse {
            code: err.status.as_u16(),
            message: err.message,
            field_errors: err.field_errors,
        })
        .unwrap();
        assert_eq!(body["code"], 400);
        assert_eq!(body["fieldErrors"][0]["fieldName"], "name");
        assert_eq!(
            body["fieldErrors"][0]["errors"][0],
            "character '/' at position 3 is not allowed"
        );
    }
}
