//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use collab_shared::time::{Clock, SystemClock};

use crate::{
    domain::{MessagePusher, RoomRepository},
    infrastructure::{message_pusher::WebSocketMessagePusher, repository::InMemoryRoomRepository},
    usecase::{GetRoomDetailUseCase, JoinRoomUseCase, LeaveRoomUseCase, PostMessageUseCase},
};

use super::{
    handler::{get_room_detail, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Collab room server
///
/// # Example
///
/// ```ignore
/// let server = Server::in_memory(1000);
/// server.run("127.0.0.1", 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    /// Wire the use cases on top of the given repository, pusher and clock.
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = AppState {
            join_room_usecase: Arc::new(JoinRoomUseCase::new(
                repository.clone(),
                message_pusher.clone(),
                clock.clone(),
            )),
            leave_room_usecase: Arc::new(LeaveRoomUseCase::new(
                repository.clone(),
                message_pusher.clone(),
            )),
            post_message_usecase: Arc::new(PostMessageUseCase::new(
                repository.clone(),
                message_pusher,
                clock,
            )),
            get_room_detail_usecase: Arc::new(GetRoomDetailUseCase::new(repository)),
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// In-memory rooms and WebSocket delivery, keeping `history_limit` messages per room.
    pub fn in_memory(history_limit: usize) -> Self {
        Self::new(
            Arc::new(InMemoryRoomRepository::new(history_limit)),
            Arc::new(WebSocketMessagePusher::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/rooms/{room_id}", get(get_room_detail))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind to `host:port` and serve until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or while serving.
    pub async fn run(self, host: &str, port: u16) -> Result<(), std::io::Error> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Collab server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
