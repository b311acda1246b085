//! 消息Repository实现

use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use domain::{
    Identity, Message, MessageId, MessageRepository, MessageText, RepositoryError, RoomName,
    UserId, Username,
};

use super::map_sqlx_error;
use crate::db::DbPool;

/// 数据库消息行
#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    pub id: Uuid,
    pub room: Option<String>,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub recipient_id: Option<Uuid>,
    pub text: String,
    pub created_at: OffsetDateTime,
    pub read_by: Vec<Uuid>,
}

impl DbMessage {
    fn into_message(self) -> Result<Message, RepositoryError> {
        let room = self
            .room
            .map(RoomName::parse)
            .transpose()
            .map_err(|err| RepositoryError::storage(err.to_string()))?;
        let sender = Identity {
            id: UserId::new(self.sender_id),
            username: Username::parse(self.sender_username)
                .map_err(|err| RepositoryError::storage(err.to_string()))?,
        };
        let text = MessageText::parse(self.text)
            .map_err(|err| RepositoryError::storage(err.to_string()))?;
        Message::from_parts(
            MessageId::new(self.id),
            room,
            sender,
            self.recipient_id.map(UserId::new),
            text,
            self.created_at,
            self.read_by.into_iter().map(UserId::new).collect(),
        )
        .map_err(|err| RepositoryError::storage(err.to_string()))
    }
}

const SELECT_COLUMNS: &str =
    "id, room, sender_id, sender_username, recipient_id, text, created_at, read_by";

pub struct PgMessageRepository {
    pool: DbPool,
}

impl PgMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: Message) -> Result<MessageId, RepositoryError> {
        sqlx::query(
            "INSERT INTO messages \
             (id, room, sender_id, sender_username, recipient_id, text, created_at, read_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::from(message.id))
        .bind(message.room.as_ref().map(|r| r.as_str().to_owned()))
        .bind(Uuid::from(message.sender.id))
        .bind(message.sender.username.as_str())
        .bind(message.recipient.map(Uuid::from))
        .bind(message.text.as_str())
        .bind(message.created_at)
        .bind(
            message
                .read_by
                .iter()
                .copied()
                .map(Uuid::from)
                .collect::<Vec<Uuid>>(),
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(message.id)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let row: Option<DbMessage> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(DbMessage::into_message).transpose()
    }

    async fn list_room(&self, room: &RoomName, limit: u32) -> Result<Vec<Message>, RepositoryError> {
        // 取最近 limit 条，再按创建时间升序返回
        let rows: Vec<DbMessage> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM ( \
                 SELECT {SELECT_COLUMNS} FROM messages \
                 WHERE room = $1 \
                 ORDER BY created_at DESC, id DESC \
                 LIMIT $2 \
             ) AS recent ORDER BY created_at ASC, id ASC"
        ))
        .bind(room.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(DbMessage::into_message).collect()
    }

    async fn list_between(&self, a: UserId, b: UserId) -> Result<Vec<Message>, RepositoryError> {
        let rows: Vec<DbMessage> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM messages \
             WHERE (sender_id = $1 AND recipient_id = $2) \
                OR (sender_id = $2 AND recipient_id = $1) \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(DbMessage::into_message).collect()
    }

    async fn mark_read(&self, id: MessageId, reader: UserId) -> Result<bool, RepositoryError> {
        // 集合语义在 SQL 层保证：已包含时不追加
        let result = sqlx::query(
            "UPDATE messages SET read_by = array_append(read_by, $2) \
             WHERE id = $1 AND NOT ($2 = ANY(read_by))",
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(reader))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // 零行可能是重复已读，也可能是消息不存在
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM messages WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        match exists {
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_row_converts_to_domain_message() {
        let sender = Uuid::new_v4();
        let row = DbMessage {
            id: Uuid::new_v4(),
            room: Some("global".to_owned()),
            sender_id: sender,
            sender_username: "alice".to_owned(),
            recipient_id: None,
            text: "hello".to_owned(),
            created_at: OffsetDateTime::now_utc(),
            read_by: vec![sender],
        };
        let message = row.into_message().unwrap();
        assert_eq!(message.room, Some(RoomName::global()));
        assert_eq!(message.read_by, vec![UserId::new(sender)]);
        assert!(!message.is_private());
    }

    #[test]
    fn db_row_with_both_targets_is_rejected() {
        let row = DbMessage {
            id: Uuid::new_v4(),
            room: Some("global".to_owned()),
            sender_id: Uuid::new_v4(),
            sender_username: "alice".to_owned(),
            recipient_id: Some(Uuid::new_v4()),
            text: "hello".to_owned(),
            created_at: OffsetDateTime::now_utc(),
            read_by: vec![],
        };
        assert!(row.into_message().is_err());
    }
}
