mod bot;
mod config;
mod rules;
mod server;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use bot::{Bot, BotOptions, LineClient, MessageLog};
use config::Config;
use server::AppState;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "recallbot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = tracing_appender::rolling::never(&log_dir, "recallbot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting recallbot...");
    info!("Loaded config from {config_path}");
    if config.rules.is_empty() {
        warn!("No reply rules configured; only unsend quoting is active");
    }

    let opened = if config.persist_message_log {
        MessageLog::open(&config.database_path(), config.message_log_capacity)
    } else {
        info!("Message log is in-memory; it will be empty after a restart");
        MessageLog::in_memory(config.message_log_capacity)
    };
    let log = match opened {
        Ok(log) => log,
        Err(e) => {
            error!("Failed to open message log: {e}");
            std::process::exit(1);
        }
    };

    info!("Message log capacity: {}", log.capacity());
    if log.is_empty().unwrap_or(true) {
        info!("Message log is empty; unsends are quoted from here on");
    }

    let Config {
        channel_access_token,
        channel_secret,
        listen_addr,
        notification_disabled,
        unsend_template,
        rules,
        ..
    } = config;

    let options = BotOptions {
        unsend_template,
        notification_disabled,
    };
    let bot = Bot::new(log, rules, LineClient::new(channel_access_token), options);
    let state = Arc::new(AppState { channel_secret, bot });
    let app = server::router(state);

    let listener = match tokio::net::TcpListener::bind(listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {listen_addr}: {e}");
            std::process::exit(1);
        }
    };
    info!("Listening on {listen_addr}");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
    }
    info!("Shut down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
