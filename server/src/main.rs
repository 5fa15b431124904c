use clap::Parser;
use log::{error, info};
use server::config::RelayConfig;
use server::network::Server;
use shared::DEFAULT_PORT;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "WebSocket relay for the shared whiteboard", long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(short, long, default_value = "0")]
    max_connections: usize,

    /// Frames buffered per connection before it is considered too slow
    #[arg(long, default_value = "64")]
    queue_capacity: usize,

    /// Handshake and per-write timeout in milliseconds
    #[arg(long, default_value = "5000")]
    write_timeout_ms: u64,

    /// Largest accepted message in bytes
    #[arg(long, default_value = "65536")]
    max_message_size: usize,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            max_connections: self.max_connections,
            queue_capacity: self.queue_capacity,
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            max_message_size: self.max_message_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    info!("Starting relay with {:?}", config);

    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
