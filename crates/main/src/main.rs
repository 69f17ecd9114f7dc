//! 主应用程序入口
//!
//! 装配全部依赖并启动 Axum Web API 服务。

use std::sync::Arc;

use application::{
    Clock, ConversationService, ConversationServiceDependencies, FriendService,
    FriendServiceDependencies, MessageService, MessageServiceDependencies, NotificationService,
    NotificationServiceDependencies, SystemClock,
};
use config::AppConfig;
use infrastructure::{create_pg_pool, PgStorage, RoomRegistry};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database = %config.database.url.split('@').next_back().unwrap_or("unknown"),
        "连接数据库"
    );

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    let storage = PgStorage::new(pg_pool);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let conversation_service = Arc::new(ConversationService::new(
        ConversationServiceDependencies {
            conversation_repository: storage.conversation_repository.clone(),
            message_repository: storage.message_repository.clone(),
            user_repository: storage.user_repository.clone(),
            clock: clock.clone(),
        },
    ));
    let friend_service = Arc::new(FriendService::new(FriendServiceDependencies {
        user_repository: storage.user_repository.clone(),
        friend_request_repository: storage.friend_request_repository.clone(),
        conversation_service: conversation_service.clone(),
        clock: clock.clone(),
    }));
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        message_repository: storage.message_repository.clone(),
        user_repository: storage.user_repository.clone(),
        conversation_service: conversation_service.clone(),
        clock,
    }));
    let notification_service = Arc::new(NotificationService::new(
        NotificationServiceDependencies {
            message_repository: storage.message_repository.clone(),
            conversation_repository: storage.conversation_repository.clone(),
            user_repository: storage.user_repository.clone(),
        },
    ));

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let registry = Arc::new(RoomRegistry::new());

    let state = AppState::new(
        friend_service,
        conversation_service,
        message_service,
        notification_service,
        registry,
        jwt_service,
    );

    let app = router(state);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, "私聊服务已启动");
    axum::serve(listener, app).await?;

    Ok(())
}
