//! 服务入口：装配各层依赖并启动 HTTP/WebSocket 服务。

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use application::{
    PresenceRegistry, RealtimeService, RealtimeServiceDependencies, SystemClock, UserService,
    UserServiceDependencies,
};
use config::AppConfig;
use domain::{MessageRepository, UserRepository};
use infrastructure::{create_pg_pool, BcryptPasswordHasher, PgMessageRepository, PgUserRepository};
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env_with_defaults();

    let pool = create_pg_pool(&config.database.url, config.database.max_connections)
        .await
        .context("数据库连接失败")?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("数据库迁移失败")?;

    let user_repository: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let message_repository: Arc<dyn MessageRepository> =
        Arc::new(PgMessageRepository::new(pool));
    let password_hasher = Arc::new(
        config
            .server
            .bcrypt_cost
            .map(BcryptPasswordHasher::new)
            .unwrap_or_default(),
    );
    let clock = Arc::new(SystemClock);

    let user_service = Arc::new(UserService::new(UserServiceDependencies {
        user_repository: user_repository.clone(),
        password_hasher,
        clock: clock.clone(),
    }));
    let realtime = Arc::new(RealtimeService::new(RealtimeServiceDependencies {
        message_repository: message_repository.clone(),
        user_repository,
        registry: Arc::new(PresenceRegistry::new()),
        clock,
        history_limit: config.realtime.history_limit,
    }));
    let jwt_service = Arc::new(JwtService::new(&config.jwt));

    let state = AppState {
        user_service,
        realtime,
        message_repository,
        jwt_service,
        history_limit: config.realtime.history_limit,
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {addr}"))?;
    tracing::info!(%addr, "chatline 服务已启动");

    axum::serve(listener, router(state))
        .await
        .context("服务运行出错")?;

    Ok(())
}
