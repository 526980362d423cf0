use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::state::calls::InvalidTransition;

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A call was requested while a non-terminal call already exists.
    #[error("user is already in a call")]
    AlreadyInCall,
    /// The user has no current call to act on.
    #[error("no active call found")]
    NoActiveCall,
    /// The referenced call id is unknown.
    #[error("call `{0}` not found")]
    CallNotFound(Uuid),
    /// The user is not a participant of the call they are acting on.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The user id has never been registered with the presence registry.
    #[error("unknown user `{0}`")]
    UnknownUser(Uuid),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current call state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl ServiceError {
    /// Machine-readable reason code carried in error responses.
    pub fn reason(&self) -> &'static str {
        match self {
            ServiceError::AlreadyInCall => "already_in_call",
            ServiceError::NoActiveCall => "no_active_call",
            ServiceError::CallNotFound(_) => "call_not_found",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::UnknownUser(_) => "unknown_user",
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::InvalidState(_) => "invalid_state",
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest {
            reason: "invalid_input",
            message: format!("validation failed: {}", err),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {message}")]
    BadRequest {
        /// Machine-readable reason code.
        reason: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Unauthorized access attempt.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Machine-readable reason code.
        reason: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Requested resource not found.
    #[error("not found: {message}")]
    NotFound {
        /// Machine-readable reason code.
        reason: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Conflict with current state.
    #[error("conflict: {message}")]
    Conflict {
        /// Machine-readable reason code.
        reason: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Internal server error.
    #[error("internal error: {message}")]
    Internal {
        /// Machine-readable reason code.
        reason: &'static str,
        /// Human-readable description.
        message: String,
    },
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let reason = err.reason();
        let message = err.to_string();
        match err {
            ServiceError::AlreadyInCall | ServiceError::InvalidState(_) => {
                AppError::Conflict { reason, message }
            }
            ServiceError::NoActiveCall | ServiceError::InvalidInput(_) => {
                AppError::BadRequest { reason, message }
            }
            ServiceError::CallNotFound(_) | ServiceError::UnknownUser(_) => {
                AppError::NotFound { reason, message }
            }
            ServiceError::Unauthorized(_) => AppError::Unauthorized { reason, message },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    reason: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let (reason, message) = match &self {
            AppError::BadRequest { reason, message }
            | AppError::Unauthorized { reason, message }
            | AppError::NotFound { reason, message }
            | AppError::Conflict { reason, message }
            | AppError::Internal { reason, message } => (*reason, message.clone()),
        };

        let payload = Json(ErrorBody { reason, message });

        (status, payload).into_response()
    }
}
