//! Application entry point for the `wh31e` exporter.
//!
//! `wh31e serve [--config PATH]` runs the full startup sequence:
//! - Loading `.env` and initializing structured logging/tracing
//! - Loading configuration from the config file and environment
//! - Building the aggregation store from the sensor name table
//! - Launching the UDP syslog listener in the background
//! - Binding the Axum HTTP server and serving `/metrics` until Ctrl-C
//!
//! `wh31e version` prints the crate version.
//!
//! # Environment Variables
//! - `WH31E_CONFIG` (optional) – config file path when `--config` is absent
//! - `WH31E_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `WH31E_SPAN_EVENTS` (optional) – span event mode for tracing
//! - see `config::load` for the remaining settings
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing::info_span;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use wh31e::{config, routes, Ingestor, Listener, Store, SystemClock, Validator};

// ---

/// Serve metrics from WH31E sensors.
#[derive(Parser, Debug)]
#[command(name = "wh31e", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the syslog listener and the metrics web server
    Serve {
        /// YAML or JSON config file (defaults to $WH31E_CONFIG, then ./wh31e.conf)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the version of wh31e
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    match Cli::parse().command {
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Serve { config } => {
            // .env may carry WH31E_LOG_LEVEL or RUST_LOG
            dotenv().ok();
            init_tracing();
            serve(config).await
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    // ---
    let cfg = config::load(config_path.as_deref())?;
    cfg.log_config();

    let validator = Arc::new(
        Validator::new().map_err(|e| anyhow!("Failed to compile metric validators: {}", e))?,
    );
    for name in cfg.sensor_names.values() {
        if !validator.is_valid_text(name) {
            tracing::warn!(
                "sensor name '{}' contains characters not allowed in metrics; \
                 /metrics will fail until it is renamed",
                name
            );
        }
    }

    let identity = Arc::new(cfg.identity());
    let store = Arc::new(Store::new(
        &identity,
        cfg.store_config(),
        Arc::new(SystemClock),
        info_span!("wh31e.store"),
    ));

    let listener = Listener::bind(
        &cfg.syslog_host,
        cfg.syslog_port,
        Ingestor::new(Arc::clone(&identity), Arc::clone(&store)),
        info_span!("wh31e.listener"),
    )
    .await?;
    tokio::spawn(listener.run());

    // Build app from routes gateway
    let app = routes::router(store, validator, info_span!("wh31e.server"));

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("binding metrics server to {}", addr);

    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow!("Failed to bind metrics server to {}: {}", addr, e))?;
    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("metrics server stopped");
    Ok(())
}

async fn shutdown_signal() {
    // ---
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `WH31E_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, else the `WH31E_LOG_LEVEL` env var
///
/// Components never touch this subscriber directly; each one is handed a
/// span at construction and logs inside it.
fn init_tracing() {
    // ---
    let span_events = match env::var("WH31E_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to WH31E_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("WH31E_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(level)
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
