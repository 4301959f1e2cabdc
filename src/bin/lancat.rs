//! Headless front end for the transfer core.
//!
//! Run with: cargo run --bin lancat
//!
//! Commands on stdin:
//!   pin                       generate a new PIN
//!   listen <pin> [dir]        wait for one file
//!   stop                      stop listening
//!   send <ip> <pin> <file>    send a file to a peer
//!   cancel                    abort the in-flight send
//!   peers                     list discovered peers
//!   quit

use std::path::PathBuf;

use lancat::{AppCommand, AppConfig, AppEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let config = AppConfig::default();
    println!(
        "lancat: transfer port {}, discovery port {}, downloads to {}",
        config.transfer_port,
        config.discovery_port,
        config.download_dir.display()
    );

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut event_rx) = mpsc::channel(64);

    let backend = tokio::spawn(lancat::run_backend(config.clone(), cmd_rx, event_tx));

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = match parts.as_slice() {
            ["pin"] => AppCommand::RefreshPin,
            ["peers"] => AppCommand::ListPeers,
            ["stop"] => AppCommand::StopListening,
            ["cancel"] => AppCommand::CancelSend,
            ["listen", pin] => AppCommand::StartListening {
                port: config.transfer_port,
                expected_pin: (*pin).to_string(),
                dest_dir: None,
            },
            ["listen", pin, dir] => AppCommand::StartListening {
                port: config.transfer_port,
                expected_pin: (*pin).to_string(),
                dest_dir: Some(PathBuf::from(dir)),
            },
            ["send", ip, pin, file] => match ip.parse() {
                Ok(target_ip) => AppCommand::SendFile {
                    target_ip,
                    pin: (*pin).to_string(),
                    source: PathBuf::from(file),
                },
                Err(e) => {
                    eprintln!("bad IP address {:?}: {}", ip, e);
                    continue;
                }
            },
            ["quit"] | ["exit"] => break,
            [] => continue,
            _ => {
                eprintln!("unknown command: {}", line);
                continue;
            }
        };
        if cmd_tx.send(cmd).await.is_err() {
            break;
        }
    }

    drop(cmd_tx);
    let _ = backend.await;
    Ok(())
}

fn print_event(event: AppEvent) {
    match event {
        AppEvent::Status(msg) => println!("[status] {}", msg),
        AppEvent::PinGenerated(pin) => println!("[pin] {}", pin),
        AppEvent::Listening { addr } => println!("[listen] waiting on {}", addr),
        AppEvent::ListenStopped => println!("[listen] stopped"),
        AppEvent::PeerDiscovered { ip, pin } => println!("[peer] {} (PIN {})", ip, pin),
        AppEvent::Peers(peers) => {
            if peers.is_empty() {
                println!("[peers] none discovered yet");
            }
            for p in peers {
                println!("[peer] {} (PIN {})", p.ip, p.pin);
            }
        }
        AppEvent::PinRejected { from } => println!("[reject] wrong PIN from {}", from),
        AppEvent::TransferProgress {
            file_name,
            bytes_done,
            bytes_total,
            speed,
            is_sending,
        } => {
            let arrow = if is_sending { "->" } else { "<-" };
            println!(
                "[{}] {} {}/{} bytes ({})",
                arrow, file_name, bytes_done, bytes_total, speed
            );
        }
        AppEvent::TransferCompleted {
            file_name,
            bytes,
            elapsed,
            ..
        } => println!("[done] {} ({} bytes in {:?})", file_name, bytes, elapsed),
        AppEvent::TransferFailed { kind, message } => println!("[{}] {}", kind, message),
    }
}
