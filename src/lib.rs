use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod discovery;
pub mod error;
pub mod pin;
pub mod transfer;

pub use config::AppConfig;
pub use discovery::{DiscoveryService, PeerInfo};
pub use error::TransferError;
pub use transfer::sender::TransferRequest;
pub use transfer::server::ListenSession;

/// Commands from the caller (the GUI equivalent) to the core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Bind the transfer port and wait for exactly one file.
    StartListening {
        port: u16,
        expected_pin: String,
        /// Defaults to the configured download directory.
        dest_dir: Option<PathBuf>,
    },
    /// Unbind the port and drop any in-progress accept.
    StopListening,
    /// Send one file to a peer.
    SendFile {
        target_ip: IpAddr,
        pin: String,
        source: PathBuf,
    },
    /// Abort the in-flight send, if any.
    CancelSend,
    /// Generate a fresh PIN and announce it from now on.
    RefreshPin,
    /// Ask for a snapshot of discovered peers.
    ListPeers,
}

/// Which side of a transfer an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Send,
    Receive,
}

/// Reports from the core to the caller. Every failure arrives here as a
/// structured event; nothing is swallowed.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Status(String),
    /// The PIN this instance currently expects and announces.
    PinGenerated(String),
    Listening {
        addr: SocketAddr,
    },
    ListenStopped,
    /// A peer announced itself. Repeats are expected; display idempotently.
    PeerDiscovered {
        ip: IpAddr,
        pin: String,
    },
    Peers(Vec<PeerInfo>),
    /// A connection presented a wrong PIN; the listen session continues.
    PinRejected {
        from: SocketAddr,
    },
    TransferProgress {
        file_name: String,
        bytes_done: u64,
        bytes_total: u64,
        speed: String,
        is_sending: bool,
    },
    TransferCompleted {
        file_name: String,
        bytes: u64,
        elapsed: Duration,
        direction: TransferDirection,
    },
    /// A failure from the error taxonomy: stable kind plus rendered message.
    TransferFailed {
        kind: &'static str,
        message: String,
    },
}

/// Run the core until the command channel closes.
///
/// Three concurrent activities live here: the one-shot listen session (while
/// started), at most one in-flight send, and the discovery pair. None of
/// them ever blocks this loop; they report through `event_tx` and stop
/// through cancellation tokens.
pub async fn run_backend(
    config: AppConfig,
    mut cmd_rx: mpsc::Receiver<AppCommand>,
    event_tx: mpsc::Sender<AppEvent>,
) {
    let local_ip = match local_ip_address::local_ip() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::warn!("cannot determine local IP: {}", e);
            IpAddr::from([127, 0, 0, 1])
        }
    };

    let (pin_tx, pin_rx) = watch::channel(pin::generate_pin());
    let initial_pin = pin_tx.borrow().clone();
    let _ = event_tx
        .send(AppEvent::PinGenerated(initial_pin))
        .await;
    let _ = event_tx
        .send(AppEvent::Status(format!("Local IP: {}", local_ip)))
        .await;

    // Discovery is advisory: if its port is taken we run without it rather
    // than failing the whole backend.
    let discovery = match DiscoveryService::new(config.discovery_port).await {
        Ok(service) => {
            service.start_broadcasting(local_ip, pin_rx.clone());
            service.start_listening(local_ip, event_tx.clone());
            Some(service)
        }
        Err(e) => {
            tracing::error!(
                "cannot bind discovery port {}: {}",
                config.discovery_port,
                e
            );
            let _ = event_tx
                .send(AppEvent::Status(format!(
                    "Discovery disabled: cannot bind port {}: {}",
                    config.discovery_port, e
                )))
                .await;
            None
        }
    };

    let mut listen_session: Option<ListenSession> = None;
    let mut send_cancel: Option<CancellationToken> = None;

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            AppCommand::StartListening {
                port,
                expected_pin,
                dest_dir,
            } => {
                if let Some(session) = &listen_session {
                    if !session.is_finished() {
                        let _ = event_tx
                            .send(AppEvent::TransferFailed {
                                kind: "BindError",
                                message: format!(
                                    "port {} is owned by the current listen session",
                                    session.local_addr().port()
                                ),
                            })
                            .await;
                        continue;
                    }
                }

                let dest_dir = dest_dir.unwrap_or_else(|| config.download_dir.clone());
                match transfer::start_listening(
                    port,
                    expected_pin,
                    dest_dir,
                    config.transfer_timeout,
                    event_tx.clone(),
                )
                .await
                {
                    Ok(session) => listen_session = Some(session),
                    Err(e) => {
                        let _ = event_tx
                            .send(AppEvent::TransferFailed {
                                kind: e.kind(),
                                message: e.to_string(),
                            })
                            .await;
                    }
                }
            }
            AppCommand::StopListening => {
                if let Some(session) = &listen_session {
                    session.stop();
                }
            }
            AppCommand::SendFile {
                target_ip,
                pin,
                source,
            } => {
                let request = TransferRequest {
                    source,
                    target: target_ip,
                    port: config.transfer_port,
                    pin,
                };
                let cancel = CancellationToken::new();
                send_cancel = Some(cancel.clone());

                let evt = event_tx.clone();
                let cfg = config.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            // Dropping the send future closes the connection.
                            let _ = evt.send(AppEvent::Status("Send cancelled".to_string())).await;
                        }
                        res = transfer::send_file(request, &cfg, evt.clone()) => {
                            if let Err(e) = res {
                                let _ = evt
                                    .send(AppEvent::TransferFailed {
                                        kind: e.kind(),
                                        message: e.to_string(),
                                    })
                                    .await;
                            }
                        }
                    }
                });
            }
            AppCommand::CancelSend => {
                if let Some(cancel) = send_cancel.take() {
                    cancel.cancel();
                }
            }
            AppCommand::RefreshPin => {
                let fresh = pin::generate_pin();
                let _ = pin_tx.send(fresh.clone());
                let _ = event_tx.send(AppEvent::PinGenerated(fresh)).await;
            }
            AppCommand::ListPeers => {
                let peers = discovery
                    .as_ref()
                    .map(|d| d.discovered_peers())
                    .unwrap_or_default();
                let _ = event_tx.send(AppEvent::Peers(peers)).await;
            }
        }
    }

    // Caller hung up: release the ports and stop every background loop.
    if let Some(service) = &discovery {
        service.shutdown();
    }
    if let Some(session) = &listen_session {
        session.stop();
    }
    if let Some(cancel) = &send_cancel {
        cancel.cancel();
    }
}
