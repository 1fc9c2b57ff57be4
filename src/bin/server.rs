//! The Watchtower control plane server binary.

use clap::Parser;
use tracing::{error, info};

use watchtower_core::platform::config::AuthMode;
use watchtower_core::{ControlPlaneConfig, Platform};

#[derive(Debug, Parser)]
#[command(name = "watchtower-server", about = "Fleet monitoring control plane")]
struct Cli {
    /// Path to a TOML config file (overrides configs/watchtower.toml)
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// API bind address, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<String>,

    /// Log filter, e.g. info or watchtower_core=debug
    #[arg(long)]
    log_level: Option<String>,

    /// Agent credential verification mode
    #[arg(long, value_enum)]
    auth_mode: Option<AuthMode>,

    /// Metrics listener port (0 disables)
    #[arg(long)]
    metrics_port: Option<u16>,
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match ControlPlaneConfig::load_from_path(cli.config.as_ref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            std::process::exit(2);
        }
    };

    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if let Some(mode) = cli.auth_mode {
        config.auth.mode = mode;
    }
    if let Some(port) = cli.metrics_port {
        config.observability.enable_metrics = port != 0;
        config.observability.metrics_port = port;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("runtime startup failed: {err}");
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(async move {
        let platform = match Platform::new(config).start().await {
            Ok(platform) => platform,
            Err(err) => {
                error!(error = %err, "control plane failed to start");
                eprintln!("startup error: {err:#}");
                return 1;
            }
        };

        info!("control plane running; ctrl-c to stop");
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");

        match platform.shutdown().await {
            Ok(()) => 0,
            Err(err) => {
                error!(error = %err, "shutdown did not complete cleanly");
                1
            }
        }
    });

    std::process::exit(exit_code);
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
