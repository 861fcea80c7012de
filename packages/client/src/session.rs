//! Socket session: one logical connection to a room channel.
//!
//! A session owns at most one physical connection at a time. `connect` spawns a driver
//! task that opens the transport, pumps frames in both directions, and reconnects with
//! exponential backoff when the connection drops unexpectedly.
//!
//! Every state change goes through the session's control lock, which also holds the
//! connection epoch. `connect` and `disconnect` bump the epoch, so a driver from a
//! superseded connection can never publish a state, touch presence, or write to the log.

use std::sync::Arc;

use collab_shared::{
    protocol::{ClientFrame, CodeReference, ServerFrame},
    time::now_millis,
};
use tokio::{
    sync::{Mutex, RwLock, broadcast, mpsc, watch},
    task::JoinHandle,
};
use url::Url;
use uuid::Uuid;

use crate::{
    config::ConnectionConfig,
    error::{ClientError, TerminalConnectionError, TransportError},
    message_log::{ChatMessage, DEFAULT_LOG_CAPACITY, MessageLog},
    presence::{Participant, PresenceStore, PresenceWriter},
    reconnect::ReconnectPolicy,
    state::SessionState,
    transport::{Connector, Transport, WebSocketConnector},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications published by a session, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// A chat message was appended to or reconciled in the log.
    Message(ChatMessage),
    /// Reconnect attempts are exhausted. Published once per failure.
    TerminalError(TerminalConnectionError),
}

/// A chat message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub body: String,
    pub code_reference: Option<CodeReference>,
}

impl OutgoingMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            code_reference: None,
        }
    }

    #[must_use]
    pub fn with_code_reference(mut self, code_reference: CodeReference) -> Self {
        self.code_reference = Some(code_reference);
        self
    }
}

/// Mutable connection bookkeeping, guarded by one lock.
#[derive(Default)]
struct Control {
    epoch: u64,
    room_id: Option<String>,
    auth_token: Option<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    driver: Option<JoinHandle<()>>,
}

struct Inner {
    config: ConnectionConfig,
    policy: ReconnectPolicy,
    user: Participant,
    connector: Arc<dyn Connector>,
    presence: PresenceWriter,
    log: RwLock<MessageLog>,
    state_tx: watch::Sender<SessionState>,
    events_tx: broadcast::Sender<SessionEvent>,
    control: Mutex<Control>,
}

/// Realtime connection to one room at a time.
///
/// # Example
///
/// ```ignore
/// let config = collab_client::config::resolve_from_env()?;
/// let (writer, presence) = PresenceStore::new();
/// let session = SocketSession::websocket(config, Participant::new("alice", "Alice"), writer);
///
/// session.connect("repo-42", Some("token")).await?;
/// session.send(OutgoingMessage::text("hello")).await?;
/// ```
pub struct SocketSession {
    inner: Arc<Inner>,
}

impl SocketSession {
    /// Create a session that reaches the network through `connector`.
    ///
    /// # Arguments
    ///
    /// * `config` - Resolved endpoint and reconnect parameters
    /// * `user` - The participant this client acts as
    /// * `connector` - Opens physical connections
    /// * `presence` - The single writer of the application's presence store
    pub fn new(
        config: ConnectionConfig,
        user: Participant,
        connector: Arc<dyn Connector>,
        presence: PresenceWriter,
    ) -> Self {
        Self::with_log_capacity(config, user, connector, presence, DEFAULT_LOG_CAPACITY)
    }

    pub fn with_log_capacity(
        config: ConnectionConfig,
        user: Participant,
        connector: Arc<dyn Connector>,
        presence: PresenceWriter,
        log_capacity: usize,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                policy: ReconnectPolicy::from_config(&config),
                config,
                user,
                connector,
                presence,
                log: RwLock::new(MessageLog::with_capacity(log_capacity)),
                state_tx,
                events_tx,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// Create a session using real WebSocket connections.
    pub fn websocket(config: ConnectionConfig, user: Participant, presence: PresenceWriter) -> Self {
        Self::new(config, user, Arc::new(WebSocketConnector), presence)
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Receiver always holding the latest state.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Receiver of every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Reader of the presence store this session writes to.
    pub fn presence(&self) -> PresenceStore {
        self.inner.presence.reader()
    }

    pub fn user(&self) -> &Participant {
        &self.inner.user
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub async fn room_id(&self) -> Option<String> {
        self.inner.control.lock().await.room_id.clone()
    }

    /// Current contents of the message log, oldest first.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.inner.log.read().await.snapshot()
    }

    /// Scroll-back page of at most `limit` messages older than `before`.
    pub async fn page_before(&self, before: Option<u64>, limit: usize) -> Vec<ChatMessage> {
        self.inner.log.read().await.page_before(before, limit)
    }

    pub async fn search(&self, term: &str) -> Vec<ChatMessage> {
        self.inner.log.read().await.search(term).cloned().collect()
    }

    /// Join `room_id`.
    ///
    /// Does nothing if the session is already live on the same room. Otherwise any
    /// existing connection is torn down first. Returns once the driver is started; watch
    /// the state to learn when the socket opens.
    ///
    /// # Errors
    ///
    /// * `ClientError::InvalidRoomId` - `room_id` is blank
    /// * `ClientError::AuthTokenRequired` - the configuration requires a token and none was given
    pub async fn connect(&self, room_id: &str, auth_token: Option<&str>) -> Result<(), ClientError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(ClientError::InvalidRoomId);
        }
        let auth_token = auth_token.map(str::trim).filter(|t| !t.is_empty());
        if self.inner.config.auth_required() && auth_token.is_none() {
            return Err(ClientError::AuthTokenRequired(room_id.to_string()));
        }

        let mut control = self.inner.control.lock().await;
        if control.room_id.as_deref() == Some(room_id) && self.state().is_live() {
            tracing::debug!("Already connected to room '{}', ignoring connect", room_id);
            return Ok(());
        }

        self.inner.teardown(&mut control).await;
        if control.room_id.as_deref() != Some(room_id) {
            self.inner.log.write().await.clear();
        }

        control.epoch += 1;
        control.room_id = Some(room_id.to_string());
        control.auth_token = auth_token.map(str::to_string);
        let epoch = control.epoch;

        self.inner.presence.set_current_user(self.inner.user.clone());
        self.inner.publish_state(SessionState::Connecting);

        let url = self
            .inner
            .config
            .room_url(room_id, &self.inner.user, auth_token);
        tracing::info!(
            "Connecting to room '{}' as '{}' (epoch {})",
            room_id,
            self.inner.user.id,
            epoch
        );
        control.driver = Some(tokio::spawn(drive(
            Arc::clone(&self.inner),
            epoch,
            room_id.to_string(),
            url,
        )));

        Ok(())
    }

    /// Join the last room again, e.g. after a terminal failure.
    pub async fn retry(&self) -> Result<(), ClientError> {
        let (room_id, auth_token) = {
            let control = self.inner.control.lock().await;
            match &control.room_id {
                Some(room_id) => (room_id.clone(), control.auth_token.clone()),
                None => return Err(ClientError::NothingToRetry),
            }
        };
        self.connect(&room_id, auth_token.as_deref()).await
    }

    /// Send a chat message to the current room.
    ///
    /// The message is appended to the log as pending and framed for the transport; the
    /// call does not wait for the server's acknowledgement.
    ///
    /// # Errors
    ///
    /// * `ClientError::NotConnected` - the session is not `Connected`; nothing is logged
    /// * `ClientError::EmptyMessage` - the body is blank
    pub async fn send(&self, message: OutgoingMessage) -> Result<ChatMessage, ClientError> {
        let control = self.inner.control.lock().await;
        let (Some(outbound), Some(room_id)) = (control.outbound.as_ref(), control.room_id.as_ref())
        else {
            return Err(ClientError::NotConnected);
        };
        if self.state() != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        if message.body.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let client_temp_id = Uuid::new_v4().to_string();
        let frame = ClientFrame::Chat {
            repository_id: room_id.clone(),
            message: message.body.clone(),
            code_reference: message.code_reference.clone(),
            client_temp_id: Some(client_temp_id.clone()),
        };
        let json = serde_json::to_string(&frame)?;
        outbound
            .send(json)
            .map_err(|_| ClientError::NotConnected)?;

        let mut pending = ChatMessage::pending(
            client_temp_id,
            room_id.clone(),
            self.inner.user.id.clone(),
            message.body,
            message.code_reference,
            now_millis(),
        );
        pending.local_seq = self.inner.log.write().await.append(pending.clone());
        tracing::debug!("Queued message {:?} for room '{}'", pending.id, room_id);

        Ok(pending)
    }

    /// Leave the room. Cancels pending reconnects and releases the connection.
    pub async fn disconnect(&self) {
        let mut control = self.inner.control.lock().await;
        control.epoch += 1;
        self.inner.teardown(&mut control).await;
        self.inner.publish_state(SessionState::Disconnected);
        tracing::info!("Session disconnected (epoch {})", control.epoch);
    }
}

impl Drop for SocketSession {
    fn drop(&mut self) {
        if let Ok(mut control) = self.inner.control.try_lock()
            && let Some(driver) = control.driver.take()
        {
            driver.abort();
        }
    }
}

impl Inner {
    /// Stop the driver and wait until it has released its connection.
    async fn teardown(&self, control: &mut Control) {
        control.outbound = None;
        if let Some(driver) = control.driver.take() {
            driver.abort();
            if let Err(e) = driver.await
                && !e.is_cancelled()
            {
                tracing::debug!("Connection driver ended abnormally: {}", e);
            }
            self.publish_state(SessionState::Disconnected);
        }
    }

    /// Publish `next` unless the session already is in that state.
    fn publish_state(&self, next: SessionState) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if !changed {
            return;
        }

        tracing::debug!("Session state -> {}", next);
        match next {
            SessionState::Connected => self.presence.set_connection_status(true),
            _ => {
                self.presence.set_connection_status(false);
                self.presence.clear_others();
            }
        }
        let _ = self.events_tx.send(SessionEvent::StateChanged(next));
    }

    async fn transition(&self, epoch: u64, next: SessionState) -> bool {
        let mut control = self.control.lock().await;
        if control.epoch != epoch {
            return false;
        }
        if next != SessionState::Connected {
            control.outbound = None;
        }
        self.publish_state(next);
        true
    }

    async fn mark_connected(&self, epoch: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut control = self.control.lock().await;
        if control.epoch != epoch {
            return false;
        }
        control.outbound = Some(outbound);
        self.publish_state(SessionState::Connected);
        true
    }

    async fn mark_failed(&self, epoch: u64, error: TerminalConnectionError) {
        let mut control = self.control.lock().await;
        if control.epoch != epoch {
            return;
        }
        control.outbound = None;
        self.publish_state(SessionState::Failed);
        tracing::error!("{}", error);
        let _ = self.events_tx.send(SessionEvent::TerminalError(error));
    }

    /// Apply one inbound frame.
    async fn handle_frame(&self, epoch: u64, room_id: &str, text: &str) {
        let frame = match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Ignoring unparsable frame: {} ({})", e, text);
                return;
            }
        };

        let control = self.control.lock().await;
        if control.epoch != epoch {
            return;
        }

        match frame {
            ServerFrame::RoomSnapshot {
                room_id: frame_room,
                participants,
            } => {
                if frame_room != room_id {
                    tracing::warn!("Snapshot for unexpected room '{}'", frame_room);
                    return;
                }
                tracing::info!("Room '{}' has {} participants", room_id, participants.len());
                self.presence
                    .replace_participants(participants.into_iter().map(Participant::from).collect());
            }
            ServerFrame::ParticipantJoined {
                room_id: frame_room,
                participant,
            } => {
                if frame_room != room_id {
                    tracing::warn!("Join announcement for unexpected room '{}'", frame_room);
                    return;
                }
                tracing::debug!("Participant '{}' joined", participant.id);
                self.presence.add_user(participant.into());
            }
            ServerFrame::ParticipantLeft {
                room_id: frame_room,
                participant_id,
            } => {
                if frame_room != room_id {
                    tracing::warn!("Leave announcement for unexpected room '{}'", frame_room);
                    return;
                }
                tracing::debug!("Participant '{}' left", participant_id);
                self.presence.remove_user(&participant_id);
            }
            ServerFrame::Chat {
                sequence_id,
                room_id: frame_room,
                author_id,
                body,
                timestamp,
                code_reference,
                client_temp_id,
            } => {
                if frame_room != room_id {
                    tracing::warn!("Chat message for unexpected room '{}'", frame_room);
                    return;
                }
                let message = ChatMessage::delivered(
                    sequence_id,
                    frame_room,
                    author_id,
                    body,
                    code_reference,
                    timestamp,
                );
                let mut log = self.log.write().await;

                let reconciled = client_temp_id
                    .as_deref()
                    .is_some_and(|temp_id| log.reconcile(temp_id, message.clone()));
                let logged = if reconciled {
                    log.iter().find(|m| m.id == message.id).cloned()
                } else if log.contains(&message.id) {
                    tracing::debug!("Duplicate message {:?} ignored", message.id);
                    None
                } else {
                    let mut message = message;
                    message.local_seq = log.append(message.clone());
                    Some(message)
                };

                if let Some(message) = logged {
                    let _ = self.events_tx.send(SessionEvent::Message(message));
                }
            }
            ServerFrame::Error { message } => {
                tracing::warn!("Server reported an error: {}", message);
            }
        }
    }
}

enum PumpOutcome {
    /// The outbound side was dropped; the session released this connection.
    Released,
    Lost(TransportError),
}

/// Connection driver for one epoch: connect, pump, reconnect, give up.
async fn drive(inner: Arc<Inner>, epoch: u64, room_id: String, url: Url) {
    let mut attempt: u32 = 0;

    loop {
        match inner.connector.connect(&url).await {
            Ok(mut transport) => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                if !inner.mark_connected(epoch, outbound_tx).await {
                    transport.close().await;
                    return;
                }
                if attempt > 0 {
                    tracing::info!("Reconnected to room '{}' after {} attempt(s)", room_id, attempt);
                } else {
                    tracing::info!("Connected to room '{}'", room_id);
                }
                attempt = 0;

                match pump(&inner, epoch, &room_id, transport.as_mut(), outbound_rx).await {
                    PumpOutcome::Released => {
                        transport.close().await;
                        return;
                    }
                    PumpOutcome::Lost(e) => {
                        tracing::warn!("{}", ClientError::TransientConnection(e));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Connection attempt {} to room '{}' failed: {}",
                    attempt,
                    room_id,
                    ClientError::TransientConnection(e)
                );
            }
        }

        attempt += 1;
        let Some(delay) = inner.policy.delay_for(attempt) else {
            inner
                .mark_failed(
                    epoch,
                    TerminalConnectionError {
                        room_id: room_id.clone(),
                        attempts: inner.policy.max_attempts(),
                    },
                )
                .await;
            return;
        };
        if !inner.transition(epoch, SessionState::Reconnecting).await {
            return;
        }

        tracing::info!(
            "Reconnecting in {:?}... (attempt {}/{})",
            delay,
            attempt,
            inner.policy.max_attempts()
        );
        tokio::time::sleep(delay).await;
    }
}

/// Move frames between the transport and the session until the connection ends.
async fn pump(
    inner: &Inner,
    epoch: u64,
    room_id: &str,
    transport: &mut dyn Transport,
    mut outbound: mpsc::UnboundedReceiver<String>,
) -> PumpOutcome {
    loop {
        tokio::select! {
            inbound = transport.next_text() => match inbound {
                Some(Ok(text)) => inner.handle_frame(epoch, room_id, &text).await,
                Some(Err(e)) => return PumpOutcome::Lost(e),
                None => return PumpOutcome::Lost(TransportError::Closed),
            },
            queued = outbound.recv() => match queued {
                Some(text) => {
                    if let Err(e) = transport.send_text(text).await {
                        return PumpOutcome::Lost(e);
                    }
                }
                None => return PumpOutcome::Released,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{DeploymentMode, resolve},
        message_log::MessageId,
    };
    use collab_shared::protocol::ParticipantInfo;
    use std::{collections::VecDeque, time::Duration};
    use tokio::time::Instant;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - SocketSession の状態遷移（connect / disconnect / 再接続 / 失敗）
    // - 再接続の待ち時間（initial * factor^(n-1)）
    // - send の前提条件と MessageLog への反映
    // - 受信フレームによる Presence / MessageLog の更新
    //
    // 【どのようにテストするか】
    // - ScriptedConnector で接続の成否を事前に指定する
    // - 接続成功ごとに ServerSide ハンドルを受け取り、サーバー側として振る舞う
    // - start_paused で仮想時間を使い、バックオフを即座に進める
    // ========================================

    /// Server end of one scripted connection.
    struct ServerSide {
        inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
        outbound: mpsc::UnboundedReceiver<String>,
    }

    impl ServerSide {
        fn push(&self, frame: &ServerFrame) {
            self.inbound
                .send(Ok(serde_json::to_string(frame).unwrap()))
                .unwrap();
        }

        /// Abrupt close as seen by the client.
        fn drop_connection(self) {}
    }

    struct ScriptedTransport {
        inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
        outbound: mpsc::UnboundedSender<String>,
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.outbound
                .send(text)
                .map_err(|_| TransportError::Io("peer gone".to_string()))
        }

        async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
            self.inbound.recv().await
        }

        async fn close(&mut self) {
            self.inbound.close();
        }
    }

    struct ScriptedConnector {
        script: std::sync::Mutex<VecDeque<bool>>,
        attempts: std::sync::Mutex<Vec<(Instant, Url)>>,
        opened: mpsc::UnboundedSender<ServerSide>,
    }

    impl ScriptedConnector {
        /// `true` opens a connection, `false` fails the attempt.
        fn new(script: &[bool]) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
            let (opened, opened_rx) = mpsc::unbounded_channel();
            let connector = Arc::new(Self {
                script: std::sync::Mutex::new(script.iter().copied().collect()),
                attempts: std::sync::Mutex::new(Vec::new()),
                opened,
            });
            (connector, opened_rx)
        }

        fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }

        fn attempt_count(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
            self.attempts
                .lock()
                .unwrap()
                .push((Instant::now(), url.clone()));
            let succeed = self.script.lock().unwrap().pop_front().unwrap_or(false);
            if !succeed {
                return Err(TransportError::Connect("connection refused".to_string()));
            }

            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let _ = self.opened.send(ServerSide {
                inbound: inbound_tx,
                outbound: outbound_rx,
            });
            Ok(Box::new(ScriptedTransport {
                inbound: inbound_rx,
                outbound: outbound_tx,
            }))
        }
    }

    fn test_config() -> ConnectionConfig {
        resolve(DeploymentMode::Development, None, true).unwrap()
    }

    fn create_session(connector: Arc<ScriptedConnector>) -> (SocketSession, PresenceStore) {
        let (writer, store) = PresenceStore::new();
        let session = SocketSession::new(
            test_config(),
            Participant::new("alice", "Alice"),
            connector,
            writer,
        );
        (session, store)
    }

    async fn wait_for_state(session: &SocketSession, expected: SessionState) {
        let mut rx = session.watch_state();
        tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|s| *s == expected))
            .await
            .expect("timed out waiting for state")
            .expect("session dropped");
    }

    fn drain_states(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionState> {
        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        states
    }

    fn chat_ack(sequence_id: &str, author: &str, body: &str, temp: Option<&str>) -> ServerFrame {
        ServerFrame::Chat {
            sequence_id: sequence_id.to_string(),
            room_id: "room-1".to_string(),
            author_id: author.to_string(),
            body: body.to_string(),
            timestamp: 5000,
            code_reference: None,
            client_temp_id: temp.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_send_before_connect_fails_without_logging() {
        // テスト項目: 接続前の send は NotConnected になり、ログは変化しない
        // given (前提条件):
        let (connector, _opened) = ScriptedConnector::new(&[]);
        let (session, _presence) = create_session(connector);

        // when (操作):
        let result = session.send(OutgoingMessage::text("hello")).await;

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::NotConnected)));
        assert!(session.messages().await.is_empty());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_requires_token_when_auth_required() {
        // テスト項目: 認証が必要な設定でトークンなしの connect はエラーになる
        // given (前提条件):
        let (connector, _opened) = ScriptedConnector::new(&[true]);
        let (writer, _store) = PresenceStore::new();
        let config = resolve(DeploymentMode::Development, None, false).unwrap();
        let session = SocketSession::new(config, Participant::new("alice", "Alice"), connector, writer);

        // when (操作):
        let result = session.connect("room-1", None).await;

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::AuthTokenRequired(room)) if room == "room-1"));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_rejects_blank_room() {
        // テスト項目: 空のルーム ID は拒否される
        // given (前提条件):
        let (connector, _opened) = ScriptedConnector::new(&[true]);
        let (session, _presence) = create_session(connector);

        // when (操作):
        let result = session.connect("   ", None).await;

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::InvalidRoomId)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abrupt_close_then_successful_retry() {
        // テスト項目: 切断後に再接続が成功すると Connecting, Connected, Reconnecting, Connected の順に遷移する
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true, true]);
        let (session, presence) = create_session(connector.clone());
        let mut events = session.subscribe();

        // when (操作):
        session.connect("room-1", None).await.unwrap();
        let first = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;
        first.drop_connection();
        let _second = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;

        // then (期待する結果):
        assert_eq!(
            drain_states(&mut events),
            vec![
                SessionState::Connecting,
                SessionState::Connected,
                SessionState::Reconnecting,
                SessionState::Connected,
            ]
        );
        assert_eq!(connector.attempt_count(), 2);
        assert!(presence.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_fail_once_with_backoff() {
        // テスト項目: 再接続が全て失敗すると 1000/1500/2250ms の間隔で試行し、Failed になる
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true, false, false, false]);
        let (session, presence) = create_session(connector.clone());
        let mut events = session.subscribe();

        // when (操作):
        session.connect("room-1", None).await.unwrap();
        let server = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;
        server.drop_connection();
        wait_for_state(&session, SessionState::Failed).await;

        // then (期待する結果):
        let mut states = Vec::new();
        let mut terminal_errors = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::StateChanged(state) => states.push(state),
                SessionEvent::TerminalError(error) => terminal_errors.push(error),
                SessionEvent::Message(_) => {}
            }
        }
        assert_eq!(
            states,
            vec![
                SessionState::Connecting,
                SessionState::Connected,
                SessionState::Reconnecting,
                SessionState::Failed,
            ]
        );
        assert_eq!(
            terminal_errors,
            vec![TerminalConnectionError {
                room_id: "room-1".to_string(),
                attempts: 3,
            }]
        );

        let times = connector.attempt_times();
        assert_eq!(times.len(), 4);
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        for (gap, expected) in gaps.iter().zip([1000u64, 1500, 2250]) {
            let expected = Duration::from_millis(expected);
            assert!(
                *gap >= expected && *gap < expected + Duration::from_millis(5),
                "gap {:?} should be about {:?}",
                gap,
                expected
            );
        }
        assert!(!presence.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_open_enters_reconnecting() {
        // テスト項目: 最初の接続に失敗した場合も再接続ポリシーに従う
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[false, true]);
        let (session, _presence) = create_session(connector.clone());
        let mut events = session.subscribe();

        // when (操作):
        session.connect("room-1", None).await.unwrap();
        let _server = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;

        // then (期待する結果):
        assert_eq!(
            drain_states(&mut events),
            vec![
                SessionState::Connecting,
                SessionState::Reconnecting,
                SessionState::Connected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        // テスト項目: 再接続待ちの間に disconnect すると以後の接続試行は行われない
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true, true]);
        let (session, _presence) = create_session(connector.clone());

        session.connect("room-1", None).await.unwrap();
        let server = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;
        server.drop_connection();
        wait_for_state(&session, SessionState::Reconnecting).await;

        // when (操作):
        session.disconnect().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        // then (期待する結果):
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(connector.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        // テスト項目: disconnect は何度呼んでも Disconnected で終わる
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true]);
        let (session, presence) = create_session(connector);
        session.connect("room-1", None).await.unwrap();
        let server = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;

        // when (操作):
        session.disconnect().await;
        session.disconnect().await;

        // then (期待する結果):
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!presence.is_connected());
        // The transport was released together with the driver task
        assert!(server.inbound.is_closed());
    }

    #[tokio::test]
    async fn test_connect_same_room_is_idempotent() {
        // テスト項目: 同じルームへの connect は接続を張り直さない
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true, true]);
        let (session, _presence) = create_session(connector.clone());
        session.connect("room-1", None).await.unwrap();
        let _server = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;

        // when (操作):
        session.connect("room-1", None).await.unwrap();

        // then (期待する結果):
        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_other_room_tears_down_previous_connection() {
        // テスト項目: 別のルームに connect すると以前の接続は解放されてから新しい接続が張られる
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true, true]);
        let (session, _presence) = create_session(connector.clone());
        session.connect("room-1", None).await.unwrap();
        let first = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;

        // when (操作):
        session.connect("room-2", None).await.unwrap();

        // then (期待する結果):
        assert!(first.inbound.is_closed());
        let _second = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;
        assert_eq!(session.room_id().await.as_deref(), Some("room-2"));
        let attempts = connector.attempts.lock().unwrap();
        assert!(attempts[1].1.query().unwrap().contains("room_id=room-2"));
    }

    #[tokio::test]
    async fn test_superseded_connection_cannot_touch_new_room() {
        // テスト項目: 別のルームに切り替えた後、古い接続の世代からの更新は状態・Presence・ログに反映されない
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true, true]);
        let (session, presence) = create_session(connector);
        session.connect("room-1", None).await.unwrap();
        let _first = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;
        let stale_epoch = session.inner.control.lock().await.epoch;

        session.connect("room-2", None).await.unwrap();
        let _second = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;

        // when (操作): 古い世代として room-1 のフレームと状態遷移を適用しようとする
        let stale_chat = serde_json::to_string(&chat_ack("1", "bob", "old room", None)).unwrap();
        let stale_join = serde_json::to_string(&ServerFrame::ParticipantJoined {
            room_id: "room-1".to_string(),
            participant: ParticipantInfo {
                id: "bob".to_string(),
                display_name: "Bob".to_string(),
            },
        })
        .unwrap();
        session.inner.handle_frame(stale_epoch, "room-1", &stale_chat).await;
        session.inner.handle_frame(stale_epoch, "room-1", &stale_join).await;
        let transitioned = session
            .inner
            .transition(stale_epoch, SessionState::Reconnecting)
            .await;
        session
            .inner
            .mark_failed(
                stale_epoch,
                TerminalConnectionError {
                    room_id: "room-1".to_string(),
                    attempts: 3,
                },
            )
            .await;

        // then (期待する結果):
        assert!(!transitioned);
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.messages().await.is_empty());
        assert!(presence.snapshot().participant("bob").is_none());
        assert_eq!(session.room_id().await.as_deref(), Some("room-2"));
    }

    #[tokio::test]
    async fn test_frames_for_other_rooms_are_ignored() {
        // テスト項目: 接続中のルーム以外を宛先とするフレームはログにも Presence にも反映されない
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true]);
        let (session, presence) = create_session(connector);
        let mut events = session.subscribe();
        session.connect("room-1", None).await.unwrap();
        let server = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;

        // when (操作):
        server.push(&ServerFrame::Chat {
            sequence_id: "7".to_string(),
            room_id: "room-9".to_string(),
            author_id: "bob".to_string(),
            body: "elsewhere".to_string(),
            timestamp: 0,
            code_reference: None,
            client_temp_id: None,
        });
        server.push(&ServerFrame::ParticipantJoined {
            room_id: "room-9".to_string(),
            participant: ParticipantInfo {
                id: "bob".to_string(),
                display_name: "Bob".to_string(),
            },
        });
        server.push(&chat_ack("1", "carol", "here", None));
        let delivered = loop {
            if let SessionEvent::Message(message) = events.recv().await.unwrap() {
                break message;
            }
        };

        // then (期待する結果): 同じ接続で後から届いた room-1 のメッセージだけが残る
        assert_eq!(delivered.body, "here");
        let bodies: Vec<String> = session.messages().await.into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["here".to_string()]);
        assert!(presence.snapshot().participant("bob").is_none());
    }

    #[tokio::test]
    async fn test_send_then_acknowledge_reconciles_log() {
        // テスト項目: 送信したメッセージは保留として記録され、サーバーの応答で確定版に置き換わる
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true]);
        let (session, _presence) = create_session(connector);
        let mut events = session.subscribe();
        session.connect("room-1", None).await.unwrap();
        let mut server = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;

        // when (操作):
        let reference = CodeReference::new("src/lib.rs", 3, 7).unwrap();
        let pending = session
            .send(OutgoingMessage::text("look").with_code_reference(reference.clone()))
            .await
            .unwrap();
        let sent = server.outbound.recv().await.unwrap();

        // then (期待する結果):
        let frame: ClientFrame = serde_json::from_str(&sent).unwrap();
        let ClientFrame::Chat {
            repository_id,
            message,
            code_reference,
            client_temp_id,
        } = frame;
        assert_eq!(repository_id, "room-1");
        assert_eq!(message, "look");
        assert_eq!(code_reference, Some(reference));
        assert_eq!(client_temp_id.as_deref(), pending.client_temp_id());
        assert!(session.messages().await[0].is_pending());

        server.push(&chat_ack("1", "alice", "look", client_temp_id.as_deref()));
        loop {
            if let SessionEvent::Message(message) = events.recv().await.unwrap() {
                assert_eq!(message.id, MessageId::Server("1".to_string()));
                break;
            }
        }
        let messages = session.messages().await;
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].is_pending());
        assert_eq!(messages[0].local_seq, pending.local_seq);
    }

    #[tokio::test]
    async fn test_inbound_messages_are_logged_in_arrival_order() {
        // テスト項目: 受信したメッセージは到着順に記録され、重複は無視される
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true]);
        let (session, _presence) = create_session(connector);
        let mut events = session.subscribe();
        session.connect("room-1", None).await.unwrap();
        let server = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;

        // when (操作):
        server.push(&chat_ack("1", "bob", "A", None));
        server.push(&chat_ack("1", "bob", "A", None));
        server.push(&chat_ack("2", "carol", "B", None));
        let mut received = 0;
        while received < 2 {
            if let SessionEvent::Message(_) = events.recv().await.unwrap() {
                received += 1;
            }
        }

        // then (期待する結果):
        let bodies: Vec<String> = session.messages().await.into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_presence_follows_server_frames() {
        // テスト項目: スナップショット・参加・退出フレームで Presence が更新される
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[true]);
        let (session, presence) = create_session(connector);
        let mut presence_rx = presence.subscribe();
        session.connect("room-1", None).await.unwrap();
        let server = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;

        // when (操作):
        server.push(&ServerFrame::RoomSnapshot {
            room_id: "room-1".to_string(),
            participants: vec![
                ParticipantInfo {
                    id: "alice".to_string(),
                    display_name: "Alice".to_string(),
                },
                ParticipantInfo {
                    id: "bob".to_string(),
                    display_name: "Bob".to_string(),
                },
            ],
        });
        server.push(&ServerFrame::ParticipantJoined {
            room_id: "room-1".to_string(),
            participant: ParticipantInfo {
                id: "carol".to_string(),
                display_name: "Carol".to_string(),
            },
        });
        server.push(&ServerFrame::ParticipantLeft {
            room_id: "room-1".to_string(),
            participant_id: "bob".to_string(),
        });
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            presence_rx.wait_for(|s| s.participant("carol").is_some() && s.participant("bob").is_none()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();

        // then (期待する結果):
        let ids: Vec<&str> = snapshot.participants.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "carol"]);
        assert!(snapshot.connected);
        assert_eq!(snapshot.current_user.unwrap().id, "alice");
        assert!(snapshot.participants.iter().all(|p| p.color_tag.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_failure_reconnects() {
        // テスト項目: Failed の後に retry すると同じルームに再接続できる
        // given (前提条件):
        let (connector, mut opened) = ScriptedConnector::new(&[false, false, false, false, true]);
        let (session, _presence) = create_session(connector);
        session.connect("room-1", None).await.unwrap();
        wait_for_state(&session, SessionState::Failed).await;

        // when (操作):
        session.retry().await.unwrap();

        // then (期待する結果):
        let _server = opened.recv().await.unwrap();
        wait_for_state(&session, SessionState::Connected).await;
        assert_eq!(session.room_id().await.as_deref(), Some("room-1"));
    }

    #[tokio::test]
    async fn test_retry_without_previous_room() {
        // テスト項目: 一度も接続していない状態での retry はエラーになる
        // given (前提条件):
        let (connector, _opened) = ScriptedConnector::new(&[]);
        let (session, _presence) = create_session(connector);

        // when (操作):
        let result = session.retry().await;

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::NothingToRetry)));
    }
}
