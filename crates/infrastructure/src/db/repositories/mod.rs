mod message_repository_impl;
mod user_repository_impl;

pub use message_repository_impl::PgMessageRepository;
pub use user_repository_impl::PgUserRepository;

use domain::RepositoryError;

/// sqlx 错误到存储层错误的统一映射。
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}
