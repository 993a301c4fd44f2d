use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Phone already registered")]
    PhoneAlreadyRegistered,

    #[error("User not found")]
    NoResource,

    #[error("{0}")]
    PasswordHashError(#[from] password_hash::Error),

    #[error("{0}")]
    DatabaseError(#[from] mongodb::error::Error),

    #[error("{0}")]
    Unauthorized(UnauthorizedType),
}

#[derive(Debug, thiserror::Error)]
pub enum UnauthorizedType {
    #[error("Invalid phone number")]
    UnknownPhone,

    #[error("Incorrect password")]
    WrongPassword,
}

/// Wire shape for error responses. The registration conflict is reported
/// under `message`, everything else under `error` (the contract the
/// frontend already depends on).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Error> for ErrorJson {
    fn from(err: &Error) -> Self {
        match err {
            Error::PhoneAlreadyRegistered => Self {
                message: Some(err.to_string()),
                error: None,
            },
            _ => Self {
                message: None,
                error: Some(err.to_string()),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("error: {:?}", self);
        let status = match self {
            Self::PhoneAlreadyRegistered => StatusCode::BAD_REQUEST,
            Self::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            Self::NoResource => StatusCode::NOT_FOUND,
            Self::PasswordHashError(..) | Self::DatabaseError(..) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorJson::from(&self);

        (status, Json(body)).into_response()
    }
}
