//! 实时会话协议的事件词汇。
//!
//! 线格式为 `{"event": "...", "data": {...}}`，payload 字段 camelCase。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::{MessageDto, PresenceEntry};

/// 客户端发往服务器的事件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "room:join")]
    RoomJoin { room: String },

    #[serde(rename = "room:leave")]
    RoomLeave { room: String },

    #[serde(rename = "room:message")]
    RoomMessage { room: String, text: String },

    #[serde(rename = "private:message", rename_all = "camelCase")]
    PrivateMessage { to_user_id: Uuid, text: String },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { room: String, is_typing: bool },

    #[serde(rename = "message:read", rename_all = "camelCase")]
    MessageRead { message_id: Uuid },
}

/// 服务器发往客户端的事件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "room:history")]
    RoomHistory {
        room: String,
        history: Vec<MessageDto>,
    },

    #[serde(rename = "room:message")]
    RoomMessage { room: String, message: MessageDto },

    #[serde(rename = "private:message")]
    PrivateMessage(MessageDto),

    #[serde(rename = "presence:update")]
    PresenceUpdate(Vec<PresenceEntry>),

    #[serde(rename = "notification")]
    Notification { message: String },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing {
        username: String,
        room: String,
        is_typing: bool,
    },

    #[serde(rename = "message:read", rename_all = "camelCase")]
    MessageRead { message_id: Uuid, user_id: Uuid },

    /// 事件级失败回显给发起方，连接保持 Active。
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_use_colon_names_and_camel_case() {
        let id = Uuid::new_v4();
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "private:message",
            "data": { "toUserId": id, "text": "hi" }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::PrivateMessage {
                to_user_id: id,
                text: "hi".to_owned()
            }
        );

        let event: ClientEvent = serde_json::from_value(json!({
            "event": "typing",
            "data": { "room": "global", "isTyping": true }
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Typing {
                room: "global".to_owned(),
                is_typing: true
            }
        );
    }

    #[test]
    fn server_typing_serializes_expected_shape() {
        let event = ServerEvent::Typing {
            username: "alice".to_owned(),
            room: "global".to_owned(),
            is_typing: true,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "typing",
                "data": { "username": "alice", "room": "global", "isTyping": true }
            })
        );
    }

    #[test]
    fn presence_update_carries_array_payload() {
        let entry = PresenceEntry {
            user_id: Uuid::new_v4(),
            username: "bob".to_owned(),
            connection_handle: Uuid::new_v4(),
        };
        let value = serde_json::to_value(ServerEvent::PresenceUpdate(vec![entry.clone()])).unwrap();
        assert_eq!(value["event"], "presence:update");
        assert_eq!(value["data"][0]["userId"], json!(entry.user_id));
        assert_eq!(value["data"][0]["connectionHandle"], json!(entry.connection_handle));
    }

    #[test]
    fn message_read_round_trips() {
        let event = ServerEvent::MessageRead {
            message_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
