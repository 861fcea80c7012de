//! MessagePusher trait 定義
//!
//! 接続中のクライアントへのメッセージ通知を抽象化する。
//! 宛先は接続単位（ConnectionId）で指定する。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ConnectionId, MessagePushError};

/// クライアントへの送信チャンネル
pub type PusherChannel = mpsc::UnboundedSender<String>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// 接続を登録する
    async fn register(&self, connection_id: ConnectionId, sender: PusherChannel);

    /// 接続の登録を解除する。送信チャンネルが破棄され、接続の送信ループが終了する。
    async fn unregister(&self, connection_id: ConnectionId);

    /// 特定の接続に送信する
    async fn push_to(
        &self,
        connection_id: ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError>;

    /// 複数の接続に送信する。一部の失敗は許容する。
    async fn broadcast(
        &self,
        targets: Vec<ConnectionId>,
        content: &str,
    ) -> Result<(), MessagePushError>;
}
