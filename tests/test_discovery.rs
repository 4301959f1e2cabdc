//! Discovery listener behavior. Datagrams are unicast straight at the bound
//! discovery socket: OS support for receiving your own broadcast varies by
//! environment, the parsing and event path does not.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use lancat::AppEvent;
use lancat::discovery::DiscoveryService;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

const OUR_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10));

async fn start_service() -> (DiscoveryService, mpsc::Receiver<AppEvent>, u16) {
    let service = DiscoveryService::new(0).await.expect("bind discovery socket");
    let port = service.local_addr().unwrap().port();
    let (event_tx, event_rx) = mpsc::channel(100);
    service.start_listening(OUR_IP, event_tx);
    (service, event_rx, port)
}

async fn inject(port: u16, payload: &[u8]) {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sock.send_to(payload, ("127.0.0.1", port)).await.unwrap();
}

async fn next_peer(rx: &mut mpsc::Receiver<AppEvent>) -> Option<(IpAddr, String)> {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(AppEvent::PeerDiscovered { ip, pin })) => return Some((ip, pin)),
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => return None,
        }
    }
}

#[tokio::test]
async fn announcement_reaches_listener() {
    let (service, mut rx, port) = start_service().await;

    inject(port, b"DISCOVERY:192.168.1.50:123456").await;

    let (ip, pin) = next_peer(&mut rx).await.expect("no event surfaced");
    assert_eq!(ip, "192.168.1.50".parse::<IpAddr>().unwrap());
    assert_eq!(pin, "123456");

    let peers = service.discovered_peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].pin, "123456");

    service.shutdown();
}

#[tokio::test]
async fn duplicate_announcements_are_idempotent() {
    let (service, mut rx, port) = start_service().await;

    inject(port, b"DISCOVERY:192.168.1.50:123456").await;
    inject(port, b"DISCOVERY:192.168.1.50:123456").await;

    // One event per datagram, identical payloads.
    let first = next_peer(&mut rx).await.expect("first event");
    let second = next_peer(&mut rx).await.expect("second event");
    assert_eq!(first, second);

    // The map holds the peer once.
    assert_eq!(service.discovered_peers().len(), 1);

    service.shutdown();
}

#[tokio::test]
async fn reannouncement_with_new_pin_replaces_old() {
    let (service, mut rx, port) = start_service().await;

    inject(port, b"DISCOVERY:192.168.1.50:111111").await;
    next_peer(&mut rx).await.expect("first event");

    inject(port, b"DISCOVERY:192.168.1.50:222222").await;
    let (_, pin) = next_peer(&mut rx).await.expect("second event");
    assert_eq!(pin, "222222");

    let peers = service.discovered_peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].pin, "222222");

    service.shutdown();
}

#[tokio::test]
async fn own_announcements_are_filtered() {
    let (service, mut rx, port) = start_service().await;

    inject(port, format!("DISCOVERY:{}:123456", OUR_IP).as_bytes()).await;

    match tokio::time::timeout(Duration::from_millis(300), rx.recv()).await {
        Err(_) => {} // nothing surfaced, as it should be
        Ok(Some(ev)) => panic!("self-announcement surfaced as {:?}", ev),
        Ok(None) => panic!("event channel closed"),
    }
    assert!(service.discovered_peers().is_empty());

    service.shutdown();
}

#[tokio::test]
async fn halves_stop_independently() {
    let (service, mut rx, port) = start_service().await;

    let (pin_tx, pin_rx) = tokio::sync::watch::channel("123456".to_string());
    service.start_broadcasting(OUR_IP, pin_rx);

    service.stop_listening();
    tokio::time::sleep(Duration::from_millis(100)).await;

    inject(port, b"DISCOVERY:192.168.1.50:123456").await;
    match tokio::time::timeout(Duration::from_millis(300), rx.recv()).await {
        Err(_) => {}      // nothing surfaced
        Ok(None) => {}    // the listener loop exited and dropped its sender
        Ok(Some(ev)) => panic!("stopped listener surfaced {:?}", ev),
    }

    service.stop_broadcasting();
    drop(pin_tx);
    service.shutdown();
}

#[tokio::test]
async fn malformed_datagrams_do_not_kill_the_listener() {
    let (service, mut rx, port) = start_service().await;

    inject(port, b"complete garbage").await;
    inject(port, b"DISCOVERY:not-an-ip:123456").await;
    inject(port, b"\xff\xfe\xfd").await;
    inject(port, b"DISCOVERY:192.168.1.77:654321").await;

    // Only the valid announcement surfaces, proving the loop survived the
    // junk before it.
    let (ip, pin) = next_peer(&mut rx).await.expect("listener died on junk");
    assert_eq!(ip, "192.168.1.77".parse::<IpAddr>().unwrap());
    assert_eq!(pin, "654321");
    assert_eq!(service.discovered_peers().len(), 1);

    service.shutdown();
}
