use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::constants::HANDSHAKE_TIMEOUT;
use super::protocol::{TransferMsg, recv_msg};
use super::receiver::receive_file;
use crate::error::{Result, TransferError};
use crate::{AppEvent, TransferDirection, pin};

/// Handle to a live one-shot listen session.
///
/// The session accepts connections until one of them passes the PIN gate,
/// then receives exactly one file and ends. Successfully or not, it must be
/// restarted explicitly to accept another. Wrong-PIN attempts are rejected
/// without ending the session.
#[derive(Debug)]
pub struct ListenSession {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl ListenSession {
    /// Address the listener actually bound (a requested port of 0 resolves
    /// here).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True once the session has ended (transfer done, failed, or stopped).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Unbind the port and abort any pending accept or read. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session to end.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Bind the transfer port and start a one-shot listen session.
///
/// Binding errors come back synchronously; everything after that is
/// reported through `event_tx`. The caller stays responsive: the accept
/// loop runs in its own task.
pub async fn start_listening(
    port: u16,
    expected_pin: String,
    dest_dir: PathBuf,
    transfer_timeout: Duration,
    event_tx: mpsc::Sender<AppEvent>,
) -> Result<ListenSession> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.map_err(TransferError::Bind)?;
    let local_addr = listener.local_addr().map_err(TransferError::Bind)?;

    tracing::info!("listening for one transfer on {}", local_addr);

    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        run_session(
            listener,
            local_addr,
            expected_pin,
            dest_dir,
            transfer_timeout,
            event_tx,
            loop_cancel,
        )
        .await;
    });

    Ok(ListenSession {
        local_addr,
        cancel,
        handle,
    })
}

/// Accept loop. Connections are handled strictly one at a time so two
/// simultaneous senders can never interleave; whoever loses the race waits
/// in the OS accept backlog.
async fn run_session(
    listener: TcpListener,
    local_addr: SocketAddr,
    expected_pin: String,
    dest_dir: PathBuf,
    transfer_timeout: Duration,
    event_tx: mpsc::Sender<AppEvent>,
    cancel: CancellationToken,
) {
    let _ = event_tx.send(AppEvent::Listening { addr: local_addr }).await;

    loop {
        let (mut stream, remote) = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = event_tx.send(AppEvent::ListenStopped).await;
                return;
            }
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
            },
        };

        tracing::info!("connection from {}", remote);

        // PIN gate. Nothing reaches disk before this passes, and no failure
        // here ends the session: the legitimate sender may still be on its
        // way.
        let verified = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = event_tx.send(AppEvent::ListenStopped).await;
                return;
            }
            res = verify_handshake(&mut stream, &expected_pin) => res,
        };
        match verified {
            Ok(()) => {}
            Err(TransferError::PinMismatch) => {
                tracing::warn!("rejected PIN from {}", remote);
                let _ = event_tx.send(AppEvent::PinRejected { from: remote }).await;
                continue;
            }
            Err(e) => {
                tracing::warn!("handshake with {} failed: {}", remote, e);
                continue;
            }
        }

        let _ = event_tx
            .send(AppEvent::Status(format!("PIN accepted from {}", remote)))
            .await;

        // One file, then the session is over either way.
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = event_tx.send(AppEvent::ListenStopped).await;
                return;
            }
            res = receive_file(&mut stream, &dest_dir, transfer_timeout, &event_tx) => res,
        };

        match outcome {
            Ok(received) => {
                tracing::info!(
                    "received {} ({} bytes in {:?})",
                    received.path.display(),
                    received.bytes,
                    received.elapsed
                );
                let _ = event_tx
                    .send(AppEvent::TransferCompleted {
                        file_name: received.file_name,
                        bytes: received.bytes,
                        elapsed: received.elapsed,
                        direction: TransferDirection::Receive,
                    })
                    .await;
            }
            Err(e) => {
                let _ = event_tx
                    .send(AppEvent::TransferFailed {
                        kind: e.kind(),
                        message: e.to_string(),
                    })
                    .await;
            }
        }
        return;
    }
}

/// Read the PIN frame and check it against the expected PIN. The connection
/// gets [`HANDSHAKE_TIMEOUT`] to present one.
async fn verify_handshake<R>(stream: &mut R, expected_pin: &str) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let presented = match tokio::time::timeout(HANDSHAKE_TIMEOUT, recv_msg(stream)).await {
        Ok(Ok(TransferMsg::Pin { pin })) => pin,
        Ok(Ok(other)) => {
            return Err(TransferError::Protocol(format!(
                "expected Pin frame, got {:?}",
                other
            )));
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => return Err(TransferError::Protocol("handshake timed out".to_string())),
    };

    if pin::verify_pin(&presented, expected_pin) {
        Ok(())
    } else {
        Err(TransferError::PinMismatch)
    }
}
