use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::message::Message;
use crate::user::User;
use crate::value_objects::{MessageId, RoomName, UserId};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> RepositoryResult<User>;
    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 追加一条消息，立即持久化。
    async fn append(&self, message: Message) -> RepositoryResult<MessageId>;

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>>;

    /// 获取房间最近的 limit 条消息，按创建时间升序返回。
    async fn list_room(&self, room: &RoomName, limit: u32) -> RepositoryResult<Vec<Message>>;

    /// 获取两个用户之间的私聊消息，按创建时间升序返回。
    async fn list_between(&self, a: UserId, b: UserId) -> RepositoryResult<Vec<Message>>;

    /// 向消息的已读集合追加一个用户。重复追加是无操作，返回 false。
    async fn mark_read(&self, id: MessageId, reader: UserId) -> RepositoryResult<bool>;
}
