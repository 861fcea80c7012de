//! Collab room server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin collab-server
//! cargo run --bin collab-server -- --host 0.0.0.0 --port 3000 --history-limit 200
//! ```

use clap::Parser;

use collab_server::{Server, domain::DEFAULT_HISTORY_LIMIT};
use collab_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "collab-server")]
#[command(about = "Room server for Collab realtime chat and presence", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Messages kept per room
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    history_limit: usize,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let server = Server::in_memory(args.history_limit);
    if let Err(e) = server.run(&args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
