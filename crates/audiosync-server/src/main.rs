//! AudioSync broadcast server entry point.
//!
//! Loads the configuration, applies command-line overrides, starts the
//! server and keeps it running until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config() + CLI overrides
//!  └─ AudioSyncServer::new()      -- spawns the event loop
//!  └─ server.start()              -- listener + audio source
//!  └─ roster logger               -- logs every published status change
//!  └─ ctrl_c ──► server.stop()
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use audiosync_server::infrastructure::storage::config::{
    load_config, load_config_from, save_config, AppConfig,
};
use audiosync_server::{AudioSyncServer, ServerError, ServerStatus};

/// Stream one audio source to any number of TCP listeners.
#[derive(Debug, Parser)]
#[command(name = "audiosync-server", version, about)]
struct Cli {
    /// TCP port to listen on.
    #[arg(short, long, env = "AUDIOSYNC_PORT")]
    port: Option<u16>,

    /// Address to bind the listener to.
    #[arg(short, long, env = "AUDIOSYNC_BIND")]
    bind: Option<IpAddr>,

    /// Stream a 440 Hz test tone instead of the default input device.
    #[arg(short, long)]
    test_mode: bool,

    /// Log level when `RUST_LOG` is not set (error, warn, info, debug, trace).
    #[arg(long, env = "AUDIOSYNC_LOG")]
    log_level: Option<String>,

    /// Read configuration from this file instead of the platform config dir.
    #[arg(short, long, env = "AUDIOSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Write the effective configuration to the platform config dir and exit.
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(port) = self.port {
            cfg.network.port = port;
        }
        if let Some(bind) = self.bind {
            cfg.network.bind_address = bind.to_string();
        }
        if self.test_mode {
            cfg.server.start_in_test_mode = true;
        }
        if let Some(level) = &self.log_level {
            cfg.server.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut app_config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => load_config().context("loading config")?,
    };
    cli.apply(&mut app_config);

    // Initialise structured logging.  `RUST_LOG` wins over the config value.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&app_config.server.log_level)),
        )
        .init();

    if cli.save_config {
        let path = save_config(&app_config).context("saving config")?;
        info!("configuration written to {}", path.display());
        return Ok(());
    }

    let config = app_config
        .to_server_config()
        .context("invalid configuration")?;
    info!(
        "AudioSync server starting on {} (test mode: {})",
        config.socket_addr(),
        config.start_in_test_mode
    );

    let server = AudioSyncServer::new(config);

    // ── Roster logger ─────────────────────────────────────────────────────────
    let mut status_rx = server.subscribe();
    tokio::spawn(async move {
        let mut last = ServerStatus::default();
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            log_changes(&last, &status);
            last = status;
        }
    });

    match server.start().await {
        Ok(()) => {}
        // The listener is up; clients can still connect and test mode can be
        // toggled on later.
        Err(ServerError::AudioSource(e)) => warn!("audio source unavailable: {e}"),
        Err(e) => return Err(e).context("starting server"),
    }

    info!("AudioSync server ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("shutdown signal received");

    server.stop().await.context("stopping server")?;
    info!("AudioSync server stopped");
    Ok(())
}

fn log_changes(last: &ServerStatus, now: &ServerStatus) {
    if last.clients.len() != now.clients.len() {
        let names: Vec<&str> = now.clients.iter().map(|c| c.name.as_str()).collect();
        info!("{} client(s) connected: {names:?}", now.clients.len());
    }
    if last.is_capturing != now.is_capturing {
        info!("capturing: {}", now.is_capturing);
    }
    if last.listener != now.listener {
        info!("listener: {:?}", now.listener);
    }
}
