use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// 4xx/5xx 响应体统一为 `{"message": ...}`。
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;
        use domain::{DomainError, RepositoryError};

        match &error {
            AppErr::Domain(DomainError::InvalidArgument { .. })
            | AppErr::Domain(DomainError::InvalidAddressing) => {
                ApiError::bad_request(error.to_string())
            }
            // 唯一约束竞争（注册预检查之后被抢先插入）也算重复
            AppErr::Domain(DomainError::UserAlreadyExists)
            | AppErr::Repository(RepositoryError::Conflict) => {
                ApiError::new(StatusCode::CONFLICT, "user already exists")
            }
            AppErr::Domain(DomainError::UserNotFound)
            | AppErr::Domain(DomainError::MessageNotFound)
            | AppErr::RecipientNotFound(_)
            | AppErr::Repository(RepositoryError::NotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, error.to_string())
            }
            AppErr::Authentication => ApiError::unauthorized("authentication failed"),
            AppErr::Repository(_) | AppErr::Password(_) | AppErr::DuplicateSession(_) => {
                tracing::error!(error = %error, "internal error");
                ApiError::internal_server_error("internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
