use std::path::PathBuf;
use std::time::Duration;

use crate::discovery::DISCOVERY_PORT;
use crate::transfer::constants::{CONNECT_TIMEOUT, DEFAULT_TRANSFER_TIMEOUT, TRANSFER_PORT};

/// Runtime configuration for the backend.
///
/// Owned by the caller and handed to `run_backend`; there is no ambient
/// process-wide state.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// TCP port for file transfers.
    pub transfer_port: u16,
    /// UDP port for presence announcements.
    pub discovery_port: u16,
    /// How long the sender waits for the TCP connect to complete.
    pub connect_timeout: Duration,
    /// Hard cap on a whole send or receive operation.
    pub transfer_timeout: Duration,
    /// Where received files are written when the caller gives no directory.
    pub download_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transfer_port: TRANSFER_PORT,
            discovery_port: DISCOVERY_PORT,
            connect_timeout: CONNECT_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            download_dir: default_download_dir(),
        }
    }
}

/// Platform download directory, falling back to the current directory.
pub fn default_download_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_wellknown_ports() {
        let config = AppConfig::default();
        assert_eq!(config.transfer_port, 12345);
        assert_eq!(config.discovery_port, 12346);
        assert_eq!(config.transfer_timeout, Duration::from_secs(300));
    }
}
