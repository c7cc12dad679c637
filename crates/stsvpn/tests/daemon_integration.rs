#![cfg(unix)]
#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! End-to-end test of the tunnel lifecycle against a fake `strongswan` CLI.
//!
//! Verifies that SyncOrchestrator correctly wires together:
//! - Database on disk
//! - ConfigWriter targeting a temp directory
//! - DaemonController spawning a real process through ProcessRunner
//!
//! Everything runs in one test so no other test thread forks while the
//! script is being written.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use stsvpn::control::{DaemonController, DaemonError, DownOutcome, ProcessRunner, UpOutcome};
use stsvpn::form::{DEFAULT_ESP, TunnelForm};
use stsvpn::storage::{Database, StartMode};
use stsvpn::sync::{SyncOrchestrator, Teardown};
use stsvpn::writer::ConfigWriter;

/// Keeps an "installed" marker file per tunnel and logs every invocation.
const FAKE_DAEMON: &str = r#"#!/bin/sh
echo "$*" >> "@DIR@/calls.log"
case "$1" in
  start|reload|rereadsecrets)
    exit 0
    ;;
  stop)
    echo "Stopping strongSwan IPsec..." >&2
    echo "charon is not running" >&2
    exit 7
    ;;
  status)
    if [ -f "@DIR@/$2.up" ]; then
      echo "Security Associations (1 up, 0 connecting):"
      echo "    $2[1]: ESTABLISHED 3 seconds ago, 10.0.0.1[$2]...10.1.0.1[$2]"
      echo "    $2{4}:  INSTALLED, TUNNEL, reqid 1, ESP SPIs: c0ffee01_i c0ffee02_o"
      echo "    $2{4}:   10.0.0.0/24 === 10.1.0.0/24"
    else
      echo "Security Associations (0 up, 0 connecting):"
      echo "  none"
    fi
    ;;
  statusall)
    echo "Security Associations (1 up, 0 connecting):"
    echo "    $2{4}:  INSTALLED, TUNNEL, reqid 1, ESP SPIs: c0ffee01_i c0ffee02_o"
    echo "    $2{4}:  AES_CBC_128/HMAC_SHA1_96, 840 bytes_i (10 pkts, 0s ago), 1260 bytes_o (15 pkts, 1s ago), rekeying in 44 minutes"
    echo "    $2{4}:   10.0.0.0/24 === 10.1.0.0/24"
    ;;
  up)
    touch "@DIR@/$2.up"
    echo "initiating IKE_SA $2[1] to 10.1.0.1"
    echo "connection '$2' established successfully"
    ;;
  down)
    name="${2%%\{*}"
    rm -f "@DIR@/$name.up"
    echo "closing CHILD_SA $2 with SPIs c0ffee01_i (840 bytes) c0ffee02_o (1260 bytes)"
    echo "CHILD_SA $2 closed successfully"
    ;;
esac
"#;

fn install_fake_daemon(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("strongswan");
    let script = FAKE_DAEMON.replace("@DIR@", &dir.display().to_string());
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(ToString::to_string)
        .collect()
}

fn branch_a() -> TunnelForm {
    TunnelForm {
        name: "branch-a".into(),
        psk: "s3cr3t".into(),
        start_mode: StartMode::Add,
        esp: DEFAULT_ESP.into(),
        local_ip: "10.0.0.1".into(),
        local_subnet: "10.0.0.0/24".into(),
        remote_ip: "10.1.0.1".into(),
        remote_subnet: "10.1.0.0/24".into(),
    }
}

#[tokio::test]
async fn test_full_tunnel_lifecycle() {
    let dir = tempfile::TempDir::new().unwrap();
    let etc = dir.path().join("etc");
    std::fs::create_dir(&etc).unwrap();
    let binary = install_fake_daemon(dir.path());

    let db = Database::open(&dir.path().join("tunnels.db")).await.unwrap();
    let writer = ConfigWriter::new(etc.join("ipsec.conf"), etc.join("ipsec.secrets"));
    let controller =
        DaemonController::new(ProcessRunner::new(binary, Duration::from_secs(10)));
    let sync = SyncOrchestrator::new(db, writer, controller);

    // Save: one record, both files rendered, daemon reloaded.
    let tunnel = sync.save(None, &branch_a()).await.unwrap();
    assert_eq!(tunnel.rules.leftid, "branch-a");
    assert_eq!(tunnel.rules.rightid, "branch-a");

    let conf = std::fs::read_to_string(etc.join("ipsec.conf")).unwrap();
    let secrets = std::fs::read_to_string(etc.join("ipsec.secrets")).unwrap();
    assert_eq!(conf.matches("conn branch-a\n").count(), 1);
    assert!(conf.contains("\tauto=add\n"));
    assert_eq!(secrets.matches("branch-a branch-a : PSK \"s3cr3t\"").count(), 1);
    assert_eq!(calls(dir.path()), ["reload", "rereadsecrets"]);

    // Freshly loaded tunnel is down.
    let views = sync.get_tunnels(None, true).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].status, Some(false));

    // Up, then up again is a no-op.
    let (_, outcome) = sync.tunnel_up(tunnel.id).await.unwrap();
    assert_eq!(outcome, UpOutcome::Established);
    let (_, outcome) = sync.tunnel_up(tunnel.id).await.unwrap();
    assert_eq!(outcome, UpOutcome::AlreadyUp);
    assert_eq!(
        calls(dir.path())
            .iter()
            .filter(|c| c.starts_with("up"))
            .count(),
        1
    );

    // Traffic: inbound fresh, outbound fresh (1s < 2s).
    let (_, sample) = sync.tunnel_traffic(tunnel.id).await.unwrap();
    assert_eq!((sample.rx, sample.tx), (10, 15));

    // Down uses the instance-qualified name.
    let (_, outcome) = sync.tunnel_down(tunnel.id).await.unwrap();
    assert_eq!(outcome, DownOutcome::Closed);
    assert!(calls(dir.path()).contains(&"down branch-a{4}".to_string()));
    assert_eq!(sync.get_tunnels(Some(tunnel.id), true).await.unwrap()[0].status, Some(false));

    // Deleting a live tunnel tears it down before removing the row.
    sync.tunnel_up(tunnel.id).await.unwrap();
    let report = sync.delete(tunnel.id).await.unwrap();
    assert_eq!(report.teardown, Teardown::Closed);
    assert!(sync.get_tunnels(None, false).await.unwrap().is_empty());
    let conf = std::fs::read_to_string(etc.join("ipsec.conf")).unwrap();
    assert!(!conf.contains("conn branch-a"));

    let log = calls(dir.path());
    let down_at = log.iter().rposition(|c| c == "down branch-a{4}").unwrap();
    let reload_at = log.iter().rposition(|c| c == "reload").unwrap();
    assert!(down_at < reload_at);

    // A failing service command surfaces its last stderr line.
    let err = sync.controller().stop().await.unwrap_err();
    match err {
        DaemonError::Failed { reason, .. } => assert_eq!(reason, "charon is not running"),
        other => panic!("unexpected error: {other:?}"),
    }
}
