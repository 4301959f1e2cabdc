//! TCP file transfer: one PIN-gated file per connection.
//!
//! This module provides:
//! - The wire codec shared by both ends (`protocol`)
//! - The one-shot listen session that accepts, verifies and receives
//!   (`server`, `receiver`)
//! - The initiator that connects, presents a PIN and streams a file
//!   (`sender`)

pub mod constants;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod utils;

// Re-export public API
pub use constants::TRANSFER_PORT;
pub use sender::{TransferRequest, send_file};
pub use server::{ListenSession, start_listening};
