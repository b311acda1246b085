//! 应用层实现。
//!
//! 这里提供两个核心模块：在线状态注册表（Presence Registry）和
//! 实时会话协议服务（Realtime Session Protocol），以及围绕它们的
//! 事件词汇、DTO 和对外部适配器（密码哈希、存储）的抽象。

pub mod clock;
pub mod dto;
pub mod error;
pub mod events;
pub mod password;
pub mod presence;
pub mod repository;
pub mod sequencer;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use dto::{MessageDto, PresenceEntry, UserDto, UserView};
pub use error::ApplicationError;
pub use events::{ClientEvent, ServerEvent};
pub use password::{PasswordHasher, PasswordHasherError};
pub use presence::{NewSession, PresenceRegistry, UnregisteredSession};
pub use sequencer::RoomSequencer;
pub use services::{
    AuthenticateUserRequest, RealtimeService, RealtimeServiceDependencies, RegisterUserRequest,
    UserService, UserServiceDependencies,
};
