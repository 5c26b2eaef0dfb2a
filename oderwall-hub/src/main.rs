use oderwall_hub::{Config, HubServer, HubState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    oderwall_hub::logger::init_logger_with_file(
        std::env::var("LOG_LEVEL").ok().as_deref(),
        config.log_dir.as_deref(),
    );

    tracing::info!("OderWall hub starting...");

    let state = Arc::new(HubState::load(&config.data_dir, config.history_limit)?);
    let server = HubServer::new(config, state);

    // Ctrl-C triggers a graceful shutdown
    let shutdown = server.shutdown_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
