use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::user::Identity;
use crate::value_objects::{MessageId, MessageText, RoomName, Timestamp, UserId};

/// 聊天消息。
///
/// `room` 与 `recipient` 恰好设置一个：房间广播消息设置 `room`，
/// 私聊消息设置 `recipient`。该不变量由构造函数保证，持久化之前
/// 不可能构造出两者同时为空或同时存在的消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room: Option<RoomName>,
    pub sender: Identity,
    pub recipient: Option<UserId>,
    pub text: MessageText,
    pub created_at: Timestamp,
    /// 已读用户集合，仅追加、无重复。创建时以发送者自身播种。
    pub read_by: Vec<UserId>,
}

impl Message {
    /// 创建房间广播消息。
    pub fn room_message(
        id: MessageId,
        room: RoomName,
        sender: Identity,
        text: MessageText,
        created_at: Timestamp,
    ) -> Self {
        let read_by = vec![sender.id];
        Self {
            id,
            room: Some(room),
            sender,
            recipient: None,
            text,
            created_at,
            read_by,
        }
    }

    /// 创建私聊消息。
    pub fn private_message(
        id: MessageId,
        sender: Identity,
        recipient: UserId,
        text: MessageText,
        created_at: Timestamp,
    ) -> Self {
        let read_by = vec![sender.id];
        Self {
            id,
            room: None,
            sender,
            recipient: Some(recipient),
            text,
            created_at,
            read_by,
        }
    }

    /// 从存储行重建消息，校验寻址不变量。
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: MessageId,
        room: Option<RoomName>,
        sender: Identity,
        recipient: Option<UserId>,
        text: MessageText,
        created_at: Timestamp,
        read_by: Vec<UserId>,
    ) -> Result<Self, DomainError> {
        if room.is_some() == recipient.is_some() {
            return Err(DomainError::InvalidAddressing);
        }
        Ok(Self {
            id,
            room,
            sender,
            recipient,
            text,
            created_at,
            read_by,
        })
    }

    pub fn is_private(&self) -> bool {
        self.recipient.is_some()
    }

    /// 记录一次已读。集合语义：重复已读返回 false 且不产生追加。
    pub fn mark_read(&mut self, reader: UserId) -> bool {
        if self.read_by.contains(&reader) {
            return false;
        }
        self.read_by.push(reader);
        true
    }

    pub fn is_read_by(&self, reader: UserId) -> bool {
        self.read_by.contains(&reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Username;
    use uuid::Uuid;

    fn sender() -> Identity {
        Identity {
            id: UserId::new(Uuid::new_v4()),
            username: Username::parse("alice").unwrap(),
        }
    }

    fn text() -> MessageText {
        MessageText::parse("hello").unwrap()
    }

    #[test]
    fn room_message_seeds_read_by_with_sender() {
        let sender = sender();
        let msg = Message::room_message(
            MessageId::new(Uuid::new_v4()),
            RoomName::global(),
            sender.clone(),
            text(),
            Timestamp::now_utc(),
        );
        assert_eq!(msg.read_by, vec![sender.id]);
        assert!(!msg.is_private());
    }

    #[test]
    fn mark_read_is_idempotent() {
        let mut msg = Message::room_message(
            MessageId::new(Uuid::new_v4()),
            RoomName::global(),
            sender(),
            text(),
            Timestamp::now_utc(),
        );
        let reader = UserId::new(Uuid::new_v4());
        assert!(msg.mark_read(reader));
        assert!(!msg.mark_read(reader));
        assert_eq!(msg.read_by.len(), 2);
    }

    #[test]
    fn from_parts_rejects_ambiguous_addressing() {
        let s = sender();
        let id = MessageId::new(Uuid::new_v4());
        let now = Timestamp::now_utc();

        // 两者都设置
        let both = Message::from_parts(
            id,
            Some(RoomName::global()),
            s.clone(),
            Some(UserId::new(Uuid::new_v4())),
            text(),
            now,
            vec![],
        );
        assert_eq!(both.unwrap_err(), DomainError::InvalidAddressing);

        // 两者都为空
        let neither = Message::from_parts(id, None, s, None, text(), now, vec![]);
        assert_eq!(neither.unwrap_err(), DomainError::InvalidAddressing);
    }
}
