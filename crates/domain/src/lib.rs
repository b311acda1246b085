//! 聊天系统核心领域模型
//!
//! 包含用户、消息等核心实体，以及存储接口定义。

pub mod errors;
pub mod message;
pub mod repository;
pub mod user;
pub mod value_objects;

pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::Message;
pub use repository::{MessageRepository, UserRepository};
pub use user::{Identity, User};
pub use value_objects::{
    MessageId, MessageText, RoomName, SessionId, Timestamp, UserId, Username,
};
