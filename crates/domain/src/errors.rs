//! 领域模型错误定义

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 输入验证错误
    #[error("验证失败: {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 用户已存在
    #[error("用户已存在")]
    UserAlreadyExists,

    /// 用户不存在
    #[error("用户不存在")]
    UserNotFound,

    /// 消息不存在
    #[error("消息不存在")]
    MessageNotFound,

    /// 消息必须且只能指定房间或接收者之一
    #[error("消息寻址无效: 必须恰好设置房间或接收者之一")]
    InvalidAddressing,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 存储层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("资源不存在")]
    NotFound,

    #[error("资源冲突")]
    Conflict,

    #[error("存储错误: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
