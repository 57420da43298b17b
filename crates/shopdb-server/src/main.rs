mod api;
mod middleware;
mod scheduler;

use std::{net::SocketAddr, sync::Arc};

use shopdb_assistant::{Assistant, AssistantConfig, Indexer};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(shopdb_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = shopdb_db::PoolConfig::from_app_config(&config);
    let pool = shopdb_db::connect_pool(&config.database_url, pool_config).await?;
    shopdb_db::run_migrations(&pool).await?;

    let locales = Arc::new(shopdb_core::load_locales_or_builtin(
        &config.locales_path,
        &config.catalog_language,
    )?);
    let assistant_config = AssistantConfig::from_app_config(&config);
    let assistant = Arc::new(Assistant::from_config(&assistant_config, locales)?);
    let indexer = Arc::new(Indexer::from_config(&assistant_config)?);

    let _scheduler =
        scheduler::build_scheduler(pool.clone(), Arc::clone(&indexer), &config.reindex_cron)
            .await?;

    let auth = AuthState::from_env(matches!(config.env, shopdb_core::Environment::Development))?;
    let state = AppState {
        pool,
        assistant,
        indexer,
        history_turns: i64::try_from(config.history_turns).unwrap_or(i64::MAX),
    };
    let rate_limit =
        default_rate_limit_state().trusting_forwarded_for(config.trust_forwarded_for);
    let app = build_app(state, auth, rate_limit);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "shopdb-server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
