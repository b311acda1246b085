use serde::{Deserialize, Serialize};

use crate::value_objects::{Timestamp, UserId, Username};

/// 已认证连接携带的身份信息，在连接生命周期内不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: Username,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password_hash: String,
    pub created_at: Timestamp,
}

impl User {
    pub fn register(
        id: UserId,
        username: Username,
        password_hash: String,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            username,
            password_hash,
            created_at: now,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            username: self.username.clone(),
        }
    }
}
