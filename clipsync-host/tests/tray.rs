use std::time::Duration;

use clipsync_core::{ConfigSnapshot, ConnectionMode, PeerEntry, Topic, WindowLabel};
use clipsync_host::{Host, HostOptions, TrayController, TrayIcon, TrayMenuItem, TrayOutcome};
use futures::StreamExt;
use tokio::time::timeout;

fn lan_config() -> ConfigSnapshot {
    ConfigSnapshot {
        connection_mode: ConnectionMode::Lan,
        lan_device_name: "desk".to_owned(),
        ..ConfigSnapshot::default()
    }
}

/// Pumps the tray until `done` holds or two seconds pass.
async fn pump_until(tray: &mut TrayController, done: impl Fn(&TrayController) -> bool) {
    timeout(Duration::from_secs(2), async {
        while !done(tray) {
            assert!(tray.pump().await, "bus closed");
        }
    })
    .await
    .expect("tray reached expected state");
}

#[test]
fn menu_ids_round_trip() {
    for item in TrayMenuItem::ALL {
        assert_eq!(TrayMenuItem::from_id(item.id()), Some(item));
    }
    assert_eq!(TrayMenuItem::from_id("bogus"), None);
}

#[tokio::test]
async fn tooltip_follows_pushed_state() {
    let host = Host::new(HostOptions::default());
    let mut tray = TrayController::attach(host.clone()).await;
    assert_eq!(tray.tooltip(), "ClipSync | Idle | peers=0");
    assert_eq!(tray.toggle_item(), TrayMenuItem::Resume);

    host.start().await;
    pump_until(&mut tray, |t| t.tooltip() == "ClipSync | Connected | peers=0").await;
    assert_eq!(tray.toggle_item(), TrayMenuItem::Pause);
    assert_eq!(tray.icon(), TrayIcon::Green);
}

#[tokio::test]
async fn peer_count_tracks_roster_and_mode() {
    let host = Host::new(HostOptions::default());
    host.save_settings(lan_config()).await.unwrap();
    let mut tray = TrayController::attach(host.clone()).await;

    let peers = ["a", "b", "c"]
        .iter()
        .map(|id| PeerEntry {
            device_id: (*id).to_owned(),
            device_name: (*id).to_owned(),
            addr: "10.0.0.2".to_owned(),
            tcp_port: 0,
            last_seen: 0,
        })
        .collect();
    host.set_lan_peers(peers).await;
    pump_until(&mut tray, |t| t.view().peers == 3).await;

    let server = ConfigSnapshot {
        token: "t".to_owned(),
        ..ConfigSnapshot::default()
    };
    host.save_settings(server).await.unwrap();
    pump_until(&mut tray, |t| t.view().peers == 0).await;
}

#[tokio::test]
async fn menu_signals_reach_the_host_and_windows() {
    let host = Host::new(HostOptions::default());
    host.start().await;
    let mut tray = TrayController::attach(host.clone()).await;
    let mut pause_signals = host.bus().subscribe(Topic::Pause);

    assert_eq!(tray.select(TrayMenuItem::Pause).await, TrayOutcome::Handled);
    assert!(host.phase().await.is_paused());
    assert!(
        timeout(Duration::from_secs(2), pause_signals.next())
            .await
            .unwrap()
            .is_some()
    );
    pump_until(&mut tray, |t| t.toggle_item() == TrayMenuItem::Resume).await;

    assert_eq!(tray.select(TrayMenuItem::Resume).await, TrayOutcome::Handled);
    assert!(!host.phase().await.is_paused());

    assert_eq!(
        tray.select(TrayMenuItem::Settings).await,
        TrayOutcome::OpenWindow(WindowLabel::Settings)
    );
    assert_eq!(
        tray.select(TrayMenuItem::Show).await,
        TrayOutcome::OpenWindow(WindowLabel::Main)
    );
    assert_eq!(tray.select(TrayMenuItem::Quit).await, TrayOutcome::Quit);
}

#[tokio::test]
async fn sync_republishes_current_state() {
    let host = Host::new(HostOptions::default());
    let mut configs = host.bus().subscribe(Topic::ConfigChanged);
    let mut tray = TrayController::attach(host.clone()).await;

    tray.select(TrayMenuItem::Sync).await;

    assert!(
        timeout(Duration::from_secs(2), configs.next())
            .await
            .unwrap()
            .is_some()
    );
}
