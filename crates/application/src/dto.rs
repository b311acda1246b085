//! 对外传输对象。
//!
//! WebSocket 事件与 HTTP 接口共用的 JSON 形状，字段名统一 camelCase。

use domain::{Message, Timestamp, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: Uuid::from(user.id),
            username: user.username.as_str().to_owned(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Uuid,
    pub room: Option<String>,
    pub from: UserView,
    pub to: Option<Uuid>,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
    pub read_by: Vec<Uuid>,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: Uuid::from(message.id),
            room: message.room.as_ref().map(|r| r.as_str().to_owned()),
            from: UserView {
                id: Uuid::from(message.sender.id),
                username: message.sender.username.as_str().to_owned(),
            },
            to: message.recipient.map(Uuid::from),
            text: message.text.as_str().to_owned(),
            created_at: message.created_at,
            read_by: message.read_by.iter().copied().map(Uuid::from).collect(),
        }
    }
}

/// 在线列表中的一项。connectionHandle 即会话标识。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: Uuid,
    pub username: String,
    pub connection_handle: Uuid,
}
