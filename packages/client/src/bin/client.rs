//! Terminal client for a Collab room.
//!
//! Joins a repository room and lets you chat from stdin. Unset flags fall back to the
//! `COLLAB_MODE`, `COLLAB_BASE_URL` and `COLLAB_SKIP_AUTH` environment variables.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin collab-client -- --room repo-1 --user alice --skip-auth
//! cargo run --bin collab-client -- -r repo-1 -u bob -n "Bob" --token s3cret --mode production
//! ```

use clap::Parser;

use collab_client::{
    Participant, PresenceStore, SocketSession,
    config::{ENV_BASE_URL, ENV_MODE, ENV_SKIP_AUTH, resolve_from_vars},
    run_client,
};
use collab_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "collab-client")]
#[command(about = "Join a Collab repository room and chat from the terminal", long_about = None)]
struct Args {
    /// Repository (room) to join
    #[arg(short = 'r', long)]
    room: String,

    /// User ID
    #[arg(short = 'u', long)]
    user: String,

    /// Display name (defaults to the user ID)
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Auth token sent with the connection
    #[arg(short = 't', long)]
    token: Option<String>,

    /// Deployment mode: development or production
    #[arg(short = 'm', long)]
    mode: Option<String>,

    /// Base URL of the backend, e.g. http://localhost:8080
    #[arg(short = 'b', long)]
    base_url: Option<String>,

    /// Connect without an auth token
    #[arg(long)]
    skip_auth: bool,
}

#[tokio::main]
async fn main() {
    setup_logger(env!("CARGO_BIN_NAME"), "warn");

    let args = Args::parse();

    let config = match resolve_from_vars(|key| match key {
        ENV_MODE => args.mode.clone().or_else(|| std::env::var(key).ok()),
        ENV_BASE_URL => args.base_url.clone().or_else(|| std::env::var(key).ok()),
        ENV_SKIP_AUTH if args.skip_auth => Some("true".to_string()),
        _ => std::env::var(key).ok(),
    }) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let name = args.name.clone().unwrap_or_else(|| args.user.clone());
    let (presence, _reader) = PresenceStore::new();
    let session = SocketSession::websocket(config, Participant::new(args.user, name), presence);

    if let Err(e) = run_client(session, args.room, args.token).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
