use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use serde_json::json;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::DuplicateUsername
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DatabaseError::ConnectionError(err.to_string()),
            _ => DatabaseError::QueryError(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseError(DatabaseError::QueryError(err.to_string()))
    }
}

// Add conversion from std::io::Error
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

// Verification failures keep their kind; everything structural is Malformed.
impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            JwtErrorKind::InvalidSignature => AuthError::InvalidSignature,
            JwtErrorKind::InvalidAlgorithm | JwtErrorKind::InvalidAlgorithmName => {
                AuthError::UnexpectedAlgorithm
            }
            _ => AuthError::Malformed,
        }
    }
}

impl From<tokio::time::error::Elapsed> for AuthError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AuthError::Timeout
    }
}

impl AppError {
    /// Message safe to return to clients; server-side detail is logged instead.
    pub fn public_message(&self) -> String {
        match self {
            AppError::AuthError(AuthError::StoreUnavailable(detail)) => {
                error!("Responding 503: credential store unavailable: {}", detail);
                "Credential store unavailable".to_string()
            }
            AppError::DatabaseError(_) | AppError::ConfigError(_) | AppError::InternalError(_) => {
                error!("Responding {}: {}", self.status_code().as_u16(), self);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

// Implement actix_web::ResponseError for AppError
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = self.public_message();
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(e) => match e {
                AuthError::DuplicateUsername => StatusCode::CONFLICT,
                AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                AuthError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                AuthError::InvalidCredentials
                | AuthError::Malformed
                | AuthError::InvalidSignature
                | AuthError::UnexpectedAlgorithm
                | AuthError::Expired
                | AuthError::Revoked => StatusCode::UNAUTHORIZED,
            },
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(DatabaseError::DuplicateUsername) => StatusCode::CONFLICT,
            AppError::DatabaseError(DatabaseError::ConnectionError(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Username already taken")]
    DuplicateUsername,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Unexpected token signing algorithm")]
    UnexpectedAlgorithm,

    #[error("Token expired")]
    Expired,

    #[error("Token revoked")]
    Revoked,

    #[error("Operation timed out")]
    Timeout,

    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AuthError {
    /// Infrastructure failures the caller may retry, as opposed to rejections.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Timeout | AuthError::StoreUnavailable(_))
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate username")]
    DuplicateUsername,
}

impl From<DatabaseError> for AuthError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::DuplicateUsername => AuthError::DuplicateUsername,
            other => AuthError::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_conversion() {
        // Test IO error conversion
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        // Test config error conversion
        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        // Test database error conversion
        let db_err = sqlx::Error::RowNotFound;
        let app_err: AppError = db_err.into();
        assert!(matches!(app_err, AppError::DatabaseError(DatabaseError::NotFound)));

        let db_err = sqlx::Error::PoolTimedOut;
        let app_err: AppError = db_err.into();
        assert!(matches!(app_err, AppError::DatabaseError(DatabaseError::ConnectionError(_))));
    }

    #[test]
    fn test_jwt_error_kinds() {
        let kind = |k: JwtErrorKind| AuthError::from(jsonwebtoken::errors::Error::from(k));

        assert_eq!(kind(JwtErrorKind::InvalidSignature), AuthError::InvalidSignature);
        assert_eq!(kind(JwtErrorKind::InvalidAlgorithm), AuthError::UnexpectedAlgorithm);
        assert_eq!(kind(JwtErrorKind::InvalidToken), AuthError::Malformed);
    }

    #[test]
    fn test_store_errors_become_auth_errors() {
        assert_eq!(AuthError::from(DatabaseError::DuplicateUsername), AuthError::DuplicateUsername);

        let err = AuthError::from(DatabaseError::ConnectionError("refused".into()));
        assert!(matches!(err, AuthError::StoreUnavailable(_)));
        assert!(err.is_transient());
        assert!(!AuthError::Revoked.is_transient());
    }

    #[test]
    fn test_error_status_codes() {
        for rejection in [
            AuthError::InvalidCredentials,
            AuthError::Malformed,
            AuthError::InvalidSignature,
            AuthError::UnexpectedAlgorithm,
            AuthError::Expired,
            AuthError::Revoked,
        ] {
            assert_eq!(AppError::AuthError(rejection).status_code(), StatusCode::UNAUTHORIZED);
        }

        let err = AppError::AuthError(AuthError::DuplicateUsername);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        // Outages must not look like bad credentials
        let err = AppError::AuthError(AuthError::StoreUnavailable("down".into()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::AuthError(AuthError::Timeout);
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let err = AppError::ValidationError("invalid input".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_server_errors_hide_detail() {
        let err = AppError::InternalError("stored password hash is malformed: bad".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::DatabaseError(DatabaseError::QueryError("relation users".into()));
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::AuthError(AuthError::StoreUnavailable("10.0.0.5 refused".into()));
        assert_eq!(err.public_message(), "Credential store unavailable");

        let err = AppError::AuthError(AuthError::Revoked);
        assert_eq!(err.public_message(), "Authentication error: Token revoked");
    }

    #[actix_web::test]
    async fn test_error_response_body_is_generic() {
        let err = AppError::InternalError("stored password hash is malformed: bad".into());
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["message"], "Internal server error");
        assert_eq!(body["error"]["status"], 500);
    }

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("test error".to_string());
        assert_eq!(err.to_string(), "Validation error: test error");

        let err = AppError::AuthError(AuthError::InvalidCredentials);
        assert_eq!(err.to_string(), "Authentication error: Invalid credentials");

        let err = AppError::DatabaseError(DatabaseError::NotFound);
        assert_eq!(err.to_string(), "Database error: Record not found");
    }
}
