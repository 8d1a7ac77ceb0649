use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tg_channel_worker::config::{self, Config};
use tg_channel_worker::source::TelegramSource;
use tg_channel_worker::store::RedisStore;
use tg_channel_worker::worker::Scheduler;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(critical = true, "Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting Telegram stats worker");

    let config = Config::from_env().context("Configuration error")?;
    config.validate().context("Invalid configuration")?;

    info!(
        channel = %config.channel_username,
        interval_secs = config.update_interval.as_secs(),
        posts = config.posts_count,
        "Configuration loaded"
    );

    let source = TelegramSource::new(&config);
    let store = RedisStore::new(&config.redis_url);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        signal_token.cancel();
    });

    let mut scheduler = Scheduler::new(source, store, config.worker_settings(), shutdown);
    scheduler.run().await?;

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing() -> Result<()> {
    // RUST_LOG wins; otherwise LOG_LEVEL picks the verbosity.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_default();
        let level = config::tracing_level(&level).unwrap_or("info");
        EnvFilter::new(format!("warn,tg_channel_worker={level},tg_worker={level}"))
    });

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
