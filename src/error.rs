use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Everything that can go wrong around a transfer.
///
/// `PinMismatch` is the only kind that leaves a listen session running;
/// `Bind` is the only kind that prevents one from starting at all.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("cannot bind transfer port: {0}")]
    Bind(#[source] std::io::Error),

    #[error("connection refused by {0} (is the receiver listening?)")]
    ConnectionRefused(SocketAddr),

    #[error("no answer from {0} within {1:?}")]
    ConnectTimeout(SocketAddr, Duration),

    #[error("presented PIN does not match the expected PIN")]
    PinMismatch,

    #[error("connection closed after {received} of {expected} bytes")]
    IncompleteTransfer { received: u64, expected: u64 },

    #[error("source file size changed during send: declared {declared}, read {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("transfer exceeded the {0:?} limit")]
    TransferTimeout(Duration),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Stable machine-readable name, paired with the rendered message in
    /// failure events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bind(_) => "BindError",
            Self::ConnectionRefused(_) => "ConnectionRefused",
            Self::ConnectTimeout(..) => "Timeout",
            Self::PinMismatch => "PinMismatch",
            Self::IncompleteTransfer { .. } => "IncompleteTransfer",
            Self::SizeMismatch { .. } => "SizeMismatch",
            Self::TransferTimeout(_) => "TransferTimeout",
            Self::Protocol(_) => "Protocol",
            Self::Io(_) => "Io",
        }
    }
}
