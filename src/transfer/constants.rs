use std::time::Duration;

/// Default TCP port for file transfer.
pub const TRANSFER_PORT: u16 = 12345;

/// Chunk size for streaming file data (64 KiB).
pub const BUFFER_SIZE: usize = 64 * 1024;

/// How long the sender waits for the TCP connect to complete.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard cap on a whole transfer (5 minutes).
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

/// How long the receiver waits for the PIN frame after accepting.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on a single control frame.
pub const MAX_FRAME_LEN: usize = 4 * 1024;

/// Upper bound on a received file name, in bytes.
pub const MAX_FILENAME_LENGTH: usize = 255;
