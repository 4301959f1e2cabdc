//! UDP broadcast peer discovery.
//!
//! Best-effort presence announcements on the LAN: every few seconds an
//! instance broadcasts its IP and current PIN, and concurrently listens for
//! announcements from peers. Discovery is advisory only; it never gates a
//! transfer, and nothing here is persisted.
//!
//! Wire format: one UTF-8 datagram per announcement, `DISCOVERY:<ip>:<pin>`,
//! e.g. `DISCOVERY:192.168.1.50:123456`. Anything that does not parse is
//! dropped without comment, since the broadcast port sees arbitrary traffic.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::AppEvent;

/// Default UDP port for presence announcements.
pub const DISCOVERY_PORT: u16 = 12346;

/// Seconds between two announcements.
pub const DISCOVERY_INTERVAL_SECS: u64 = 5;

/// Prefix identifying our datagrams among other broadcast traffic.
const ANNOUNCE_PREFIX: &str = "DISCOVERY:";

/// A peer seen on the LAN, keyed by its announced address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub ip: IpAddr,
    pub pin: String,
}

/// One presence announcement as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryAnnouncement {
    pub ip: IpAddr,
    pub pin: String,
}

impl DiscoveryAnnouncement {
    pub fn encode(&self) -> String {
        format!("{}{}:{}", ANNOUNCE_PREFIX, self.ip, self.pin)
    }

    /// Parse a datagram. `None` for anything malformed.
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(datagram).ok()?;
        let rest = text.strip_prefix(ANNOUNCE_PREFIX)?;
        // The address may itself contain ':' (IPv6), so split the PIN off
        // the end.
        let (ip_str, pin) = rest.rsplit_once(':')?;
        let ip: IpAddr = ip_str.parse().ok()?;
        if pin.is_empty() || !pin.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            ip,
            pin: pin.to_string(),
        })
    }
}

/// Broadcaster and listener sharing one socket bound to the discovery port.
///
/// The two halves run as independent background tasks and can be stopped
/// independently or together; stopping is prompt even while a receive is
/// pending.
pub struct DiscoveryService {
    socket: Arc<UdpSocket>,
    port: u16,
    peers: Arc<Mutex<HashMap<IpAddr, String>>>,
    broadcast_cancel: CancellationToken,
    listen_cancel: CancellationToken,
}

impl DiscoveryService {
    pub async fn new(port: u16) -> Result<Self, std::io::Error> {
        // Bind to 0.0.0.0 to hear announcements on all interfaces.
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let socket = UdpSocket::bind(addr).await?;
        socket.set_broadcast(true)?;
        let port = socket.local_addr()?.port();

        Ok(Self {
            socket: Arc::new(socket),
            port,
            peers: Arc::new(Mutex::new(HashMap::new())),
            broadcast_cancel: CancellationToken::new(),
            listen_cancel: CancellationToken::new(),
        })
    }

    /// Address the socket actually bound (a requested port of 0 resolves
    /// here).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Announce our presence every [`DISCOVERY_INTERVAL_SECS`], always with
    /// the current PIN from `pin_rx`. The first announcement goes out
    /// immediately.
    pub fn start_broadcasting(&self, local_ip: IpAddr, pin_rx: watch::Receiver<String>) {
        let socket = self.socket.clone();
        let cancel = self.broadcast_cancel.clone();
        let target = SocketAddr::from(([255, 255, 255, 255], self.port));

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(DISCOVERY_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let announcement = DiscoveryAnnouncement {
                            ip: local_ip,
                            pin: pin_rx.borrow().clone(),
                        };
                        if let Err(e) = socket
                            .send_to(announcement.encode().as_bytes(), target)
                            .await
                        {
                            tracing::debug!("discovery broadcast failed: {}", e);
                        }
                    }
                }
            }
        });
    }

    /// Receive announcements, skip our own echoed broadcasts, record the
    /// peer and surface a `PeerDiscovered` event per datagram. Repeated
    /// announcements produce repeated events; consumers must treat them as
    /// idempotent.
    pub fn start_listening(&self, local_ip: IpAddr, event_tx: mpsc::Sender<AppEvent>) {
        let socket = self.socket.clone();
        let cancel = self.listen_cancel.clone();
        let peers = self.peers.clone();

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                let (len, addr) = tokio::select! {
                    _ = cancel.cancelled() => break,
                    res = socket.recv_from(&mut buf) => match res {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::debug!("discovery recv error: {}", e);
                            break;
                        }
                    },
                };

                let Some(announcement) = DiscoveryAnnouncement::parse(&buf[..len]) else {
                    tracing::trace!("ignoring unparseable datagram from {}", addr);
                    continue;
                };
                if announcement.ip == local_ip {
                    continue;
                }

                peers
                    .lock()
                    .unwrap()
                    .insert(announcement.ip, announcement.pin.clone());

                let _ = event_tx
                    .send(AppEvent::PeerDiscovered {
                        ip: announcement.ip,
                        pin: announcement.pin,
                    })
                    .await;
            }
        });
    }

    /// Snapshot of every peer seen so far. A re-announcement with a fresh
    /// PIN replaces the stored PIN for that address.
    pub fn discovered_peers(&self) -> Vec<PeerInfo> {
        let peers = self.peers.lock().unwrap();
        let mut list: Vec<PeerInfo> = peers
            .iter()
            .map(|(ip, pin)| PeerInfo {
                ip: *ip,
                pin: pin.clone(),
            })
            .collect();
        list.sort_by_key(|p| p.ip);
        list
    }

    /// Stop only the announcement loop.
    pub fn stop_broadcasting(&self) {
        self.broadcast_cancel.cancel();
    }

    /// Stop only the receive loop.
    pub fn stop_listening(&self) {
        self.listen_cancel.cancel();
    }

    /// Stop both halves. Idempotent.
    pub fn shutdown(&self) {
        self.broadcast_cancel.cancel();
        self.listen_cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_round_trip() {
        let a = DiscoveryAnnouncement {
            ip: "192.168.1.50".parse().unwrap(),
            pin: "123456".to_string(),
        };
        assert_eq!(a.encode(), "DISCOVERY:192.168.1.50:123456");
        assert_eq!(DiscoveryAnnouncement::parse(a.encode().as_bytes()), Some(a));
    }

    #[test]
    fn ipv6_announcement_parses() {
        let a = DiscoveryAnnouncement {
            ip: "fe80::1".parse().unwrap(),
            pin: "000042".to_string(),
        };
        let parsed = DiscoveryAnnouncement::parse(a.encode().as_bytes()).unwrap();
        assert_eq!(parsed.ip, a.ip);
        assert_eq!(parsed.pin, "000042");
    }

    #[test]
    fn malformed_datagrams_are_rejected() {
        let cases: [&[u8]; 7] = [
            b"HELLO:1.2.3.4:123456",
            b"DISCOVERY:",
            b"DISCOVERY:1.2.3.4",
            b"DISCOVERY:not-an-ip:123456",
            b"DISCOVERY:1.2.3.4:12ab56",
            b"DISCOVERY:1.2.3.4:",
            b"\xff\xfe",
        ];
        for bad in cases {
            assert_eq!(DiscoveryAnnouncement::parse(bad), None, "{:?}", bad);
        }
    }
}
