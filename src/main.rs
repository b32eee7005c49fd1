//! Burrow - SSH Tunneling Client
//!
//! This is the main entry point for the Burrow application.

use anyhow::Result;
use burrow::config::{load_config, Config};
use burrow::forward::ForwardMode;
use burrow::session::Session;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Burrow - SSH tunneling client with local, remote and dynamic forwarding
#[derive(Parser, Debug)]
#[command(name = "burrow")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = load_config(&args.config)?;

    info!("Burrow v{}", burrow::VERSION);
    info!("Configuration loaded from: {:?}", args.config);
    info!("Connecting to: {}", config.session.host);

    let session = build_session(&config)?;
    session.establish().await?;

    for forward in &config.forwards {
        let id = match forward.mode {
            ForwardMode::Local => {
                let target = forward.target.as_deref().unwrap_or_default();
                session.start_local(&forward.bind, target).await?
            }
            ForwardMode::Remote => {
                let target = forward.target.as_deref().unwrap_or_default();
                session.start_remote(&forward.bind, target).await?
            }
            ForwardMode::Dynamic => session.start_dynamic(&forward.bind).await?,
        };
        info!("Forward {} active", id);
    }

    wait_for_shutdown().await;

    session.close().await?;
    info!("Burrow stopped");
    Ok(())
}

/// Build the session from configuration, including proxy setup
fn build_session(config: &Config) -> Result<Session> {
    let settings = &config.session;

    let session = match (&settings.password, &settings.key_file) {
        (Some(password), _) => {
            Session::with_password(&settings.host, &settings.username, password)
        }
        (None, Some(key_file)) => {
            let pem = std::fs::read_to_string(key_file)?;
            Session::with_key(&settings.host, &settings.username, &pem)?
        }
        (None, None) => anyhow::bail!("session needs either a password or a key_file"),
    };

    if let Some(proxy) = &settings.proxy {
        session.set_proxy(proxy)?;
        info!("Using proxy: {}", session.proxy().map(|p| p.to_string()).unwrap_or_default());
    }

    Ok(session)
}

/// Block until Ctrl+C or SIGTERM (cross-platform)
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!("Failed to setup SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        // On Windows, only handle Ctrl+C
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down...");
    }
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
