use domain::{DomainError, RepositoryError, SessionId, UserId};
use thiserror::Error;

use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    /// 同一连接句柄被注册两次。正确的传输层行为下不应发生。
    #[error("duplicate session: {0}")]
    DuplicateSession(SessionId),
    #[error("recipient not found: {0}")]
    RecipientNotFound(UserId),
    #[error("authentication failed")]
    Authentication,
}

impl ApplicationError {
    /// 映射到客户端可见的错误码。
    pub fn wire_code(&self) -> &'static str {
        match self {
            ApplicationError::Domain(DomainError::InvalidArgument { .. })
            | ApplicationError::Domain(DomainError::InvalidAddressing) => "VALIDATION_ERROR",
            ApplicationError::Domain(DomainError::UserNotFound)
            | ApplicationError::Domain(DomainError::MessageNotFound)
            | ApplicationError::RecipientNotFound(_) => "NOT_FOUND",
            ApplicationError::Domain(DomainError::UserAlreadyExists) => "CONFLICT",
            ApplicationError::Repository(RepositoryError::NotFound) => "NOT_FOUND",
            ApplicationError::Repository(_) => "STORE_ERROR",
            ApplicationError::Password(_) => "INTERNAL_ERROR",
            ApplicationError::DuplicateSession(_) => "DUPLICATE_SESSION",
            ApplicationError::Authentication => "AUTH_ERROR",
        }
    }
}
