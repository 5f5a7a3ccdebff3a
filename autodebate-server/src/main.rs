use std::sync::Arc;

use anyhow::{Context, Result};
use autodebate_engine::{Controller, TranscriptStore};
use autodebate_server::config::ServerConfig;
use autodebate_server::web::{AppState, router};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (AUTODEBATE_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("AUTODEBATE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("autodebate_server=info".parse()?)
        .add_directive("autodebate_engine=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let config = ServerConfig::parse();

    let store = TranscriptStore::open(&config.db_path)
        .with_context(|| format!("Failed to open transcript store at {}", config.db_path.display()))?;
    let profile = config.profile_store();
    let controller = Controller::new(
        Arc::new(store),
        config.generator_source(),
        config.controller_config(),
    )
    .with_profile(profile.clone());

    let state = Arc::new(AppState { controller, profile });
    let app = router(state, config.web_static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!(
        "autodebate server listening on {} (provider {}, db {})",
        config.listen_addr,
        config.provider,
        config.db_path.display()
    );
    axum::serve(listener, app).await?;

    Ok(())
}
