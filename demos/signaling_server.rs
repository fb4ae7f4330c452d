//! Signaling server example
//!
//! Run with: cargo run --example signaling_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example signaling_server                  # binds to 0.0.0.0:3000
//!   cargo run --example signaling_server localhost        # binds to 127.0.0.1:3000
//!   cargo run --example signaling_server 127.0.0.1:3001   # binds to 127.0.0.1:3001
//!
//! Any WebSocket client can talk to it, e.g. with websocat:
//!   websocat ws://localhost:3000
//!   {"type":"create-room","roomId":"R1","displayName":"Alice"}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rendezvous_rs::{ServerConfig, SignalingServer};

const DEFAULT_PORT: u16 = 3000;

/// Parse bind address from command line argument.
///
/// Accepts "localhost", "IP" or "IP:PORT".
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: signaling_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:{})", DEFAULT_PORT);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => ServerConfig::with_addr(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rendezvous_rs=debug".parse()?)
                .add_directive("signaling_server=debug".parse()?),
        )
        .init();

    println!("Starting signaling server on {}", config.bind_addr);

    let server = Arc::new(SignalingServer::new(config));

    // Periodic stats, like a dashboard would poll them
    let stats_server = Arc::clone(&server);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = stats_server.stats().snapshot();
            let registry = stats_server.registry();
            let rooms = registry.room_count().await;
            let members = registry.member_count().await;
            tracing::info!(
                connections = stats.active_connections,
                rooms = rooms,
                members = members,
                relayed = stats.signals_relayed,
                "Stats"
            );
        }
    });

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}
