//! Loopback relay demo
//!
//! Run with: cargo run --example loopback_relay -- [OPTIONS]
//!
//! Loads the TLS credentials, starts the relay and drives one publisher and a
//! few viewers through an in-memory transport, so the whole path from
//! session-open request to viewer datagram can be watched in the logs without
//! a QUIC stack.
//!
//! Examples:
//!   cargo run --example loopback_relay -- --cert cert.crt --key key.key
//!   cargo run --example loopback_relay -- --channel s1 --viewers 3 --datagrams 10
//!
//! Set `RUST_LOG=wt_relay=trace` to see every datagram.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;

use wt_relay::protocol::constants::{DEFAULT_PORT, H3_ALPN};
use wt_relay::protocol::Route;
use wt_relay::server::{ConnectionHandle, SessionRequest, Transport, TransportEvent};
use wt_relay::{ChannelRegistry, RelayServer, ServerConfig, SessionId};

#[derive(Parser, Debug)]
#[command(name = "loopback_relay", about = "Drive the datagram relay over an in-memory transport")]
struct Args {
    /// Address the relay would listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// PEM certificate
    #[arg(long, default_value = "cert.crt")]
    cert: PathBuf,

    /// PEM private key
    #[arg(long, default_value = "key.key")]
    key: PathBuf,

    /// Channel to publish on
    #[arg(long, default_value = "demo")]
    channel: String,

    /// Number of viewer sessions
    #[arg(long, default_value_t = 2)]
    viewers: u64,

    /// Number of datagrams to publish
    #[arg(long, default_value_t = 5)]
    datagrams: u64,
}

/// Transport that keeps per-session receive counters instead of a socket
#[derive(Default)]
struct LoopbackTransport {
    name: &'static str,
    received: Mutex<HashMap<SessionId, u64>>,
    bytes: AtomicU64,
}

impl LoopbackTransport {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    fn received(&self, session_id: SessionId) -> u64 {
        self.received
            .lock()
            .map(|m| m.get(&session_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn accept_session(
        &self,
        session_id: SessionId,
        status: u16,
        headers: &[(&str, &str)],
    ) -> io::Result<()> {
        println!("[{}] session {} accepted: {} {:?}", self.name, session_id, status, headers);
        Ok(())
    }

    async fn reject_session(&self, session_id: SessionId, status: u16) -> io::Result<()> {
        println!("[{}] session {} rejected: {}", self.name, session_id, status);
        Ok(())
    }

    async fn send_datagram(&self, session_id: SessionId, payload: Bytes) -> io::Result<()> {
        self.bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
        if let Ok(mut received) = self.received.lock() {
            *received.entry(session_id).or_default() += 1;
        }
        tracing::trace!(transport = self.name, session_id, size = payload.len(), "Loopback datagram");
        Ok(())
    }

    async fn close_session(&self, session_id: SessionId) -> io::Result<()> {
        println!("[{}] session {} closed by relay", self.name, session_id);
        Ok(())
    }

    async fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

async fn open(conn: &ConnectionHandle, session_id: SessionId, route: Route) -> anyhow::Result<()> {
    let request = SessionRequest::webtransport(session_id, route.path());
    anyhow::ensure!(
        conn.send(TransportEvent::SessionRequest(request)).await,
        "connection {} closed",
        conn.id()
    );
    Ok(())
}

/// Wait until the channel has its publisher and `viewers` viewers
async fn wait_for(registry: &ChannelRegistry, channel: &str, viewers: usize) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(stats) = registry.stats(channel).await {
                if stats.has_publisher() && stats.viewer_count == viewers {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .context("sessions did not register in time")
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = ServerConfig::default()
        .bind(SocketAddr::new(args.host, args.port))
        .credentials(&args.cert, &args.key);

    let server = match RelayServer::bind(config) {
        Ok(server) => server,
        Err(e) if e.is_fatal() => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
        Err(e) => return Err(e.into()),
    };
    server.log_banner();

    let pub_transport = Arc::new(LoopbackTransport::new("publisher"));
    let view_transport = Arc::new(LoopbackTransport::new("viewers"));
    let publisher = server.open_connection(pub_transport.clone())?;
    let viewers = server.open_connection(view_transport.clone())?;

    for conn in [&publisher, &viewers] {
        conn.send(TransportEvent::ProtocolNegotiated {
            alpn: H3_ALPN.to_string(),
        })
        .await;
    }

    open(&publisher, 0, Route::publish(args.channel.as_str())).await?;
    // Client-initiated bidirectional stream IDs
    let viewer_ids: Vec<SessionId> = (0..args.viewers).map(|i| i * 4).collect();
    for id in &viewer_ids {
        open(&viewers, *id, Route::watch(args.channel.as_str())).await?;
    }
    wait_for(server.registry(), &args.channel, viewer_ids.len()).await?;

    for seq in 0..args.datagrams {
        let payload = Bytes::from(format!("datagram {}", seq));
        publisher
            .send(TransportEvent::Datagram {
                session_id: 0,
                payload,
            })
            .await;
    }

    // The publisher's pump relays everything queued before the close
    publisher.close().await;

    if let Some(stats) = server.registry().stats(&args.channel).await {
        println!(
            "Channel '{}': {} datagrams / {} bytes relayed, {} viewers",
            stats.name, stats.datagrams_relayed, stats.bytes_relayed, stats.viewer_count
        );
    }
    for id in &viewer_ids {
        println!("  viewer {}: {} datagrams", id, view_transport.received(*id));
    }
    println!(
        "  total: {} bytes",
        view_transport.bytes.load(Ordering::Relaxed)
    );

    viewers.close().await;

    let totals = server.registry().snapshot().await;
    println!("Channels left: {}", totals.channel_count);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wt_relay=debug".parse()?),
        )
        .init();

    run(args).await
}
