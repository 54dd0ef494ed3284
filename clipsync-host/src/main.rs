use std::path::PathBuf;

use clap::Parser;
use clipsync_host::{
    ConfigStore, Host, HostOptions, TrayController, TrayMenuItem, TrayOutcome, build_router,
    default_config_dir, logging::init_logging,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::oneshot,
};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "clipsync-host")]
struct HostArgs {
    #[arg(long, default_value = "127.0.0.1:7878")]
    bind_address: String,
    #[arg(long, env = "CLIPSYNC_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
    #[arg(long, env = "CLIPSYNC_LOG_DIR")]
    log_dir: Option<PathBuf>,
    /// Write logs to the log folder instead of stderr.
    #[arg(long)]
    log_file: bool,
}

#[tokio::main]
async fn main() {
    let args = HostArgs::parse();
    let config_dir = args.config_dir.unwrap_or_else(default_config_dir);
    let log_dir = args.log_dir.unwrap_or_else(|| config_dir.join("logs"));
    init_logging(&log_dir, args.log_file);

    let host = Host::new(HostOptions {
        store: Some(ConfigStore::in_dir(&config_dir)),
        log_dir,
        ..HostOptions::default()
    });

    let listener = match tokio::net::TcpListener::bind(&args.bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {}: {}", args.bind_address, err);
            std::process::exit(1);
        }
    };

    host.start().await;
    host.log("INFO", "Host started").await;

    let (quit_tx, quit_rx) = oneshot::channel::<()>();
    tokio::spawn(run_tray(host.clone(), quit_tx));

    info!("host starting on {}", args.bind_address);
    let server = axum::serve(listener, build_router(host)).with_graceful_shutdown(async {
        tokio::select! {
            _ = quit_rx => info!("quit requested from tray"),
            _ = tokio::signal::ctrl_c() => info!("interrupted"),
        }
    });
    if let Err(err) = server.await {
        warn!("host server exited: {}", err);
    }
}

/// Headless tray: menu item ids arrive one per line on stdin.
async fn run_tray(host: Host, quit_tx: oneshot::Sender<()>) {
    let mut tray = TrayController::attach(host).await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            alive = tray.pump() => {
                if !alive {
                    break;
                }
                info!(tooltip = %tray.tooltip(), icon = ?tray.icon(), "tray updated");
            }
            line = lines.next_line(), if stdin_open => {
                let Ok(Some(line)) = line else {
                    stdin_open = false;
                    continue;
                };
                let Some(item) = TrayMenuItem::from_id(line.trim()) else {
                    warn!("unknown tray item {:?}", line.trim());
                    continue;
                };
                match tray.select(item).await {
                    TrayOutcome::Handled => {}
                    TrayOutcome::OpenWindow(label) => {
                        info!(label = %label, "open-or-focus requested; windows attach over /ws");
                    }
                    TrayOutcome::Quit => {
                        let _ = quit_tx.send(());
                        return;
                    }
                }
            }
        }
    }
}
