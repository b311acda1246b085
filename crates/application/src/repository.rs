//! 内存实现的存储（用于测试）。
//!
//! 生产环境使用 infrastructure 提供的 Postgres 实现。

pub mod memory {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tokio::sync::RwLock;

    use domain::{
        Message, MessageId, MessageRepository, RepositoryError, RoomName, User, UserId,
        UserRepository,
    };

    #[derive(Default)]
    pub struct MemoryUserRepository {
        users: RwLock<HashMap<UserId, User>>,
    }

    impl MemoryUserRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl UserRepository for MemoryUserRepository {
        async fn create(&self, user: User) -> Result<User, RepositoryError> {
            let mut users = self.users.write().await;
            let duplicate = users
                .values()
                .any(|existing| existing.username == user.username);
            if duplicate || users.contains_key(&user.id) {
                return Err(RepositoryError::Conflict);
            }
            users.insert(user.id, user.clone());
            Ok(user)
        }

        async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
            Ok(self.users.read().await.get(&id).cloned())
        }

        async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
            Ok(self
                .users
                .read()
                .await
                .values()
                .find(|user| user.username.as_str() == username)
                .cloned())
        }
    }

    /// 追加式内存消息存储，插入顺序即创建顺序。
    #[derive(Default)]
    pub struct MemoryMessageRepository {
        messages: RwLock<Vec<Message>>,
    }

    impl MemoryMessageRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl MessageRepository for MemoryMessageRepository {
        async fn append(&self, message: Message) -> Result<MessageId, RepositoryError> {
            let mut messages = self.messages.write().await;
            let id = message.id;
            messages.push(message);
            Ok(id)
        }

        async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
            Ok(self
                .messages
                .read()
                .await
                .iter()
                .find(|message| message.id == id)
                .cloned())
        }

        async fn list_room(
            &self,
            room: &RoomName,
            limit: u32,
        ) -> Result<Vec<Message>, RepositoryError> {
            let messages = self.messages.read().await;
            let matching: Vec<Message> = messages
                .iter()
                .filter(|message| message.room.as_ref() == Some(room))
                .cloned()
                .collect();
            let skip = matching.len().saturating_sub(limit as usize);
            Ok(matching.into_iter().skip(skip).collect())
        }

        async fn list_between(
            &self,
            a: UserId,
            b: UserId,
        ) -> Result<Vec<Message>, RepositoryError> {
            Ok(self
                .messages
                .read()
                .await
                .iter()
                .filter(|message| {
                    matches!(message.recipient, Some(recipient)
                        if (message.sender.id == a && recipient == b)
                            || (message.sender.id == b && recipient == a))
                })
                .cloned()
                .collect())
        }

        async fn mark_read(
            &self,
            id: MessageId,
            reader: UserId,
        ) -> Result<bool, RepositoryError> {
            let mut messages = self.messages.write().await;
            let message = messages
                .iter_mut()
                .find(|message| message.id == id)
                .ok_or(RepositoryError::NotFound)?;
            Ok(message.mark_read(reader))
        }
    }
}
