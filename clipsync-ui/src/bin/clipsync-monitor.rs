use std::{sync::Arc, time::Duration};

use clap::Parser;
use clipsync_core::{BackendClient, WindowLabel};
use clipsync_ui::{FrontEnd, HeadlessWindows, MainView, WindowExit, WsTransport};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "clipsync-monitor")]
struct MonitorArgs {
    #[arg(long, default_value = "ws://127.0.0.1:7878/ws")]
    url: String,
    /// Log lines echoed from the host's tail when the view first loads.
    #[arg(long, default_value_t = 20)]
    log_lines: usize,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = MonitorArgs::parse();
    let transport = match WsTransport::connect(&args.url).await {
        Ok(transport) => transport,
        Err(err) => {
            error!("cannot reach host at {}: {}", args.url, err);
            std::process::exit(1);
        }
    };

    let client = BackendClient::new(Arc::new(transport));
    let (front, mut exits) = FrontEnd::new(client, HeadlessWindows::new());
    if let Err(err) = front.open_or_focus(WindowLabel::Main) {
        error!("cannot open main window: {}", err);
        std::process::exit(1);
    }
    let Some(main) = front.main() else {
        error!("main window did not start");
        std::process::exit(1);
    };

    let mut view = main.view;
    let mut echoed = false;
    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                if !echoed && !current.loading {
                    for line in tail(&current, args.log_lines) {
                        info!("{line}");
                    }
                    echoed = true;
                }
                render(&current);
                if echoed && !current.attached {
                    warn!("host went away");
                    break;
                }
            }
            exit = exits.recv() => {
                if let Some((WindowLabel::Main, WindowExit::Quit)) | None = exit {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = main.intents.send(clipsync_ui::MainIntent::Close);
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn tail(view: &MainView, count: usize) -> impl Iterator<Item = &String> {
    view.logs.iter().skip(view.logs.len().saturating_sub(count))
}

fn render(view: &MainView) {
    info!(
        mode = view.mode_badge(),
        sync = view.pause_badge(),
        state = view.state.as_deref().unwrap_or("-"),
        status = %view.status,
        peers = view.peers.len(),
        peer_panel = view.peer_panel_visible,
        "view"
    );
    if let Some(notice) = &view.notice {
        warn!("{notice}");
    }
}
