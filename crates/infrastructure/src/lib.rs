//! 基础设施层：Postgres 存储实现和密码哈希。

pub mod db;
pub mod password;

pub use db::repositories::{PgMessageRepository, PgUserRepository};
pub use db::{create_pg_pool, DbPool};
pub use password::BcryptPasswordHasher;
