//! Roomcast server binary.
//!
//! # Usage
//!
//! ```bash
//! # Serve two rooms on the default port
//! roomcast-server --room lobby --room general
//!
//! # Custom bind address
//! roomcast-server --bind 0.0.0.0:9000 --room lobby
//! ```
//!
//! Application messages routed to a resolved room are fanned out to the
//! room's other members; unrouted messages stay with the sender's hook only.

use clap::Parser;
use roomcast_server::{RouterConfig, Server, ServerNotification, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Roomcast publish/subscribe server
#[derive(Parser, Debug)]
#[command(name = "roomcast-server")]
#[command(about = "Room-based publish/subscribe server over WebSocket")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:9000")]
    bind: String,

    /// Room to create at startup (repeatable)
    #[arg(short, long = "room")]
    rooms: Vec<String>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Roomcast server starting");

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        router: RouterConfig { max_connections: args.max_connections },
    };

    let (server, mut notifications) = Server::bind(config).await?;
    let handle = server.handle();

    for name in &args.rooms {
        let info = handle.create_room(name).await;
        tracing::info!("room '{}' ready", info.name);
    }

    // Fan routed application messages out to the room's other members.
    let fanout = server.handle();
    tokio::spawn(async move {
        while let Some(event) = notifications.recv().await {
            if let ServerNotification::Message { connection_id, payload, room: Some(room) } =
                event
            {
                if let Err(e) = fanout.broadcast(&room.name, &payload, Some(connection_id)).await
                {
                    tracing::warn!("fan-out to '{}' failed: {e}", room.name);
                }
            }
        }
    });

    server.run().await?;

    Ok(())
}
