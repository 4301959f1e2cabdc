use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout_at;

use super::constants::BUFFER_SIZE;
use super::protocol::{TransferMsg, recv_msg};
use super::utils::{format_transfer_speed, sanitize_file_name, unique_dest_path};
use crate::AppEvent;
use crate::error::{Result, TransferError};

/// Outcome of a completed receive.
#[derive(Debug)]
pub struct ReceivedFile {
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Read the file header and payload from an already PIN-verified connection.
///
/// The payload streams into a fresh file under `dest_dir` (existing names
/// get a counter suffix, never appended to). On a short read, a read error
/// or the `cap` expiring, the partial file is removed before the error is
/// returned.
pub async fn receive_file<R>(
    stream: &mut R,
    dest_dir: &Path,
    cap: Duration,
    event_tx: &mpsc::Sender<AppEvent>,
) -> Result<ReceivedFile>
where
    R: AsyncRead + Unpin,
{
    let deadline = tokio::time::Instant::now() + cap;

    let header = match timeout_at(deadline, recv_msg(stream)).await {
        Ok(res) => res?,
        Err(_) => return Err(TransferError::TransferTimeout(cap)),
    };
    let (name, size) = match header {
        TransferMsg::FileHeader { name, size } => (name, size),
        other => {
            return Err(TransferError::Protocol(format!(
                "expected FileHeader, got {:?}",
                other
            )));
        }
    };

    let file_name = sanitize_file_name(&name);
    tokio::fs::create_dir_all(dest_dir).await?;
    let dest_path = unique_dest_path(dest_dir, &file_name);
    // The final name may differ from the announced one after a collision.
    let file_name = dest_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&file_name)
        .to_string();

    let _ = event_tx
        .send(AppEvent::Status(format!(
            "Receiving {} ({} bytes)",
            file_name, size
        )))
        .await;

    let start = std::time::Instant::now();
    let mut file = tokio::fs::File::create(&dest_path).await?;

    let mut received: u64 = 0;
    let mut buffer = vec![0u8; BUFFER_SIZE];

    while received < size {
        let want = std::cmp::min(BUFFER_SIZE as u64, size - received) as usize;
        let n = match timeout_at(deadline, stream.read(&mut buffer[..want])).await {
            Ok(Ok(0)) => {
                return fail_partial(
                    file,
                    &dest_path,
                    TransferError::IncompleteTransfer {
                        received,
                        expected: size,
                    },
                )
                .await;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::debug!("stream read failed mid-transfer: {}", e);
                return fail_partial(
                    file,
                    &dest_path,
                    TransferError::IncompleteTransfer {
                        received,
                        expected: size,
                    },
                )
                .await;
            }
            Err(_) => {
                return fail_partial(file, &dest_path, TransferError::TransferTimeout(cap)).await;
            }
        };

        if let Err(e) = file.write_all(&buffer[..n]).await {
            return fail_partial(file, &dest_path, e.into()).await;
        }
        received += n as u64;

        if received == size || received % (BUFFER_SIZE as u64 * 16) == 0 {
            let _ = event_tx
                .send(AppEvent::TransferProgress {
                    file_name: file_name.clone(),
                    bytes_done: received,
                    bytes_total: size,
                    speed: format_transfer_speed(received, start.elapsed().as_secs_f64()),
                    is_sending: false,
                })
                .await;
        }
    }

    file.flush().await?;

    Ok(ReceivedFile {
        file_name,
        path: dest_path,
        bytes: received,
        elapsed: start.elapsed(),
    })
}

/// Remove the partial output before surfacing the error; nothing half
/// written may be left looking complete.
async fn fail_partial(
    file: tokio::fs::File,
    path: &Path,
    err: TransferError,
) -> Result<ReceivedFile> {
    drop(file);
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("cannot remove partial file {}: {}", path.display(), e);
    }
    Err(err)
}
