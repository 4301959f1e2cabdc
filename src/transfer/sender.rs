use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::constants::BUFFER_SIZE;
use super::protocol::{TransferMsg, send_msg};
use super::utils::format_transfer_speed;
use crate::config::AppConfig;
use crate::error::{Result, TransferError};
use crate::{AppEvent, TransferDirection};

/// Everything needed for one send attempt. Immutable for its duration.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source: PathBuf,
    pub target: IpAddr,
    pub port: u16,
    pub pin: String,
}

/// Connect to the peer, present the PIN, stream one file.
///
/// The whole operation runs under `config.transfer_timeout`; when the cap
/// is exceeded the connection is dropped and `TransferTimeout` returned.
/// There is no application-level acknowledgment and no automatic retry: a
/// receiver that rejects the PIN simply closes the connection, which the
/// sender only notices as an early close.
pub async fn send_file(
    request: TransferRequest,
    config: &AppConfig,
    event_tx: mpsc::Sender<AppEvent>,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + config.transfer_timeout;
    let target = SocketAddr::new(request.target, request.port);

    let op = async {
        let _ = event_tx
            .send(AppEvent::Status(format!("Connecting to {}", target)))
            .await;

        let mut stream =
            match tokio::time::timeout(config.connect_timeout, TcpStream::connect(target)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    return Err(TransferError::ConnectionRefused(target));
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(TransferError::ConnectTimeout(target, config.connect_timeout));
                }
            };

        send_msg(
            &mut stream,
            &TransferMsg::Pin {
                pin: request.pin.clone(),
            },
        )
        .await?;

        // The size is stat'ed once and the stream loop is held to it; a file
        // that grows or shrinks underneath us aborts the attempt.
        let mut file = tokio::fs::File::open(&request.source).await?;
        let declared = file.metadata().await?.len();
        let file_name = request
            .source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::Protocol("source path has no file name".to_string()))?
            .to_string();

        send_msg(
            &mut stream,
            &TransferMsg::FileHeader {
                name: file_name.clone(),
                size: declared,
            },
        )
        .await?;

        let _ = event_tx
            .send(AppEvent::Status(format!(
                "Sending {} ({} bytes)",
                file_name, declared
            )))
            .await;

        let mut sent: u64 = 0;
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let start = Instant::now();

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            if sent + n as u64 > declared {
                return Err(TransferError::SizeMismatch {
                    declared,
                    actual: sent + n as u64,
                });
            }
            stream.write_all(&buffer[..n]).await?;
            sent += n as u64;

            if sent == declared || sent % (BUFFER_SIZE as u64 * 16) == 0 {
                let _ = event_tx
                    .send(AppEvent::TransferProgress {
                        file_name: file_name.clone(),
                        bytes_done: sent,
                        bytes_total: declared,
                        speed: format_transfer_speed(sent, start.elapsed().as_secs_f64()),
                        is_sending: true,
                    })
                    .await;
            }
        }
        if sent != declared {
            return Err(TransferError::SizeMismatch {
                declared,
                actual: sent,
            });
        }

        stream.flush().await?;
        stream.shutdown().await?;

        // Best effort: watch for the peer closing its side. A reset here is
        // not a failure (there is no acknowledgment in the protocol), but
        // waiting keeps the common case of a clean close observable.
        let mut probe = [0u8; 1];
        if let Err(e) = stream.read(&mut probe).await {
            tracing::debug!("peer did not close cleanly: {}", e);
        }

        let _ = event_tx
            .send(AppEvent::TransferCompleted {
                file_name,
                bytes: sent,
                elapsed: start.elapsed(),
                direction: TransferDirection::Send,
            })
            .await;
        Ok(())
    };

    match tokio::time::timeout_at(deadline, op).await {
        Ok(res) => res,
        Err(_) => Err(TransferError::TransferTimeout(config.transfer_timeout)),
    }
}
