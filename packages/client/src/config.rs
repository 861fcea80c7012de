//! Connection configuration resolved from the deployment mode.
//!
//! [`resolve`] is a pure function; [`resolve_from_env`] is the only place that reads the
//! process environment.

use std::{fmt, str::FromStr, time::Duration};

use thiserror::Error;
use url::Url;

use crate::presence::Participant;

pub const ENV_MODE: &str = "COLLAB_MODE";
pub const ENV_BASE_URL: &str = "COLLAB_BASE_URL";
pub const ENV_SKIP_AUTH: &str = "COLLAB_SKIP_AUTH";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

const WEBSOCKET_PATH: &str = "/ws";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("unsupported URL scheme '{0}', expected http, https, ws or wss")]
    UnsupportedScheme(String),

    #[error("base URL '{0}' has no host")]
    MissingHost(String),

    #[error("unknown deployment mode '{0}', expected development or production")]
    UnknownMode(String),
}

/// Deployment mode of the client; decides between `ws` and `wss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentMode {
    #[default]
    Development,
    Production,
}

impl DeploymentMode {
    fn websocket_scheme(self) -> &'static str {
        match self {
            DeploymentMode::Development => "ws",
            DeploymentMode::Production => "wss",
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(DeploymentMode::Development),
            "production" | "prod" => Ok(DeploymentMode::Production),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentMode::Development => write!(f, "development"),
            DeploymentMode::Production => write!(f, "production"),
        }
    }
}

/// Resolved endpoint and reconnect parameters for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    endpoint_url: Url,
    max_attempts: u32,
    initial_delay: Duration,
    backoff_factor: f64,
    auth_required: bool,
}

impl ConnectionConfig {
    pub fn endpoint_url(&self) -> &Url {
        &self.endpoint_url
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Factors below 1.0 (or not finite) are clamped to 1.0.
    #[must_use]
    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = if backoff_factor.is_finite() && backoff_factor >= 1.0 {
            backoff_factor
        } else {
            1.0
        };
        self
    }

    #[must_use]
    pub fn with_auth_required(mut self, auth_required: bool) -> Self {
        self.auth_required = auth_required;
        self
    }

    /// URL of a room channel for the given user.
    pub fn room_url(&self, room_id: &str, user: &Participant, token: Option<&str>) -> Url {
        let mut url = self.endpoint_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("room_id", room_id)
                .append_pair("user_id", &user.id)
                .append_pair("display_name", &user.display_name);
            if let Some(token) = token {
                query.append_pair("token", token);
            }
        }
        url
    }
}

/// Resolve the connection configuration for a deployment mode.
///
/// # Arguments
///
/// * `mode` - Deployment mode; picks the `ws` or `wss` scheme
/// * `base_url` - Optional base URL override (`http`, `https`, `ws` or `wss`)
/// * `skip_auth` - When `true`, rooms can be joined without a token
///
/// # Errors
///
/// Returns a [`ConfigError`] when the base URL is malformed.
pub fn resolve(
    mode: DeploymentMode,
    base_url: Option<&str>,
    skip_auth: bool,
) -> Result<ConnectionConfig, ConfigError> {
    let raw = base_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(DEFAULT_BASE_URL);

    let mut url = Url::parse(raw).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
        return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::MissingHost(raw.to_string()));
    }

    url.set_scheme(mode.websocket_scheme())
        .map_err(|_| ConfigError::UnsupportedScheme(url.scheme().to_string()))?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(WEBSOCKET_PATH);
    }
    url.set_query(None);
    url.set_fragment(None);

    Ok(ConnectionConfig {
        endpoint_url: url,
        max_attempts: DEFAULT_MAX_ATTEMPTS,
        initial_delay: DEFAULT_INITIAL_DELAY,
        backoff_factor: DEFAULT_BACKOFF_FACTOR,
        auth_required: !skip_auth,
    })
}

/// Resolve the configuration from a variable lookup (environment or overrides).
pub fn resolve_from_vars<F>(lookup: F) -> Result<ConnectionConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mode = match lookup(ENV_MODE) {
        Some(mode) if !mode.trim().is_empty() => mode.parse()?,
        _ => DeploymentMode::default(),
    };
    let base_url = lookup(ENV_BASE_URL);
    let skip_auth = lookup(ENV_SKIP_AUTH).is_some_and(|value| is_truthy(&value));

    resolve(mode, base_url.as_deref(), skip_auth)
}

/// Resolve the configuration from `COLLAB_MODE`, `COLLAB_BASE_URL` and `COLLAB_SKIP_AUTH`.
pub fn resolve_from_env() -> Result<ConnectionConfig, ConfigError> {
    resolve_from_vars(|key| std::env::var(key).ok())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn alice() -> Participant {
        Participant::new("alice", "Alice Liddell")
    }

    #[test]
    fn test_resolve_development_defaults() {
        // テスト項目: 開発モードでは既定の URL と再接続パラメータが使われる
        // given (前提条件):
        let mode = DeploymentMode::Development;

        // when (操作):
        let config = resolve(mode, None, false).unwrap();

        // then (期待する結果):
        assert_eq!(config.endpoint_url().as_str(), "ws://localhost:8080/ws");
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.initial_delay(), Duration::from_millis(1000));
        assert_eq!(config.backoff_factor(), 1.5);
        assert!(config.auth_required());
    }

    #[test]
    fn test_resolve_production_uses_secure_scheme() {
        // テスト項目: 本番モードでは https の URL が wss に変換される
        // given (前提条件):
        let base_url = "https://ide.example.com";

        // when (操作):
        let config = resolve(DeploymentMode::Production, Some(base_url), false).unwrap();

        // then (期待する結果):
        assert_eq!(config.endpoint_url().as_str(), "wss://ide.example.com/ws");
    }

    #[test]
    fn test_resolve_keeps_explicit_path() {
        // テスト項目: ベース URL にパスがある場合はそのまま維持される
        // given (前提条件):
        let base_url = "http://127.0.0.1:9000/realtime?debug=1";

        // when (操作):
        let config = resolve(DeploymentMode::Development, Some(base_url), true).unwrap();

        // then (期待する結果):
        assert_eq!(
            config.endpoint_url().as_str(),
            "ws://127.0.0.1:9000/realtime"
        );
        assert!(!config.auth_required());
    }

    #[test]
    fn test_resolve_rejects_malformed_url() {
        // テスト項目: 不正な URL は ConfigError になる
        // given (前提条件):
        let base_url = "http://";

        // when (操作):
        let result = resolve(DeploymentMode::Development, Some(base_url), false);

        // then (期待する結果):
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_resolve_rejects_unsupported_scheme() {
        // テスト項目: http/https/ws/wss 以外のスキームは拒否される
        // given (前提条件):
        let base_url = "ftp://files.example.com";

        // when (操作):
        let result = resolve(DeploymentMode::Development, Some(base_url), false);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ConfigError::UnsupportedScheme("ftp".to_string()))
        );
    }

    #[test]
    fn test_deployment_mode_parse() {
        // テスト項目: デプロイモードの文字列が大文字小文字を問わず解析される
        // given (前提条件):
        let inputs = ["PROD", "development", "bogus"];

        // when (操作):
        let results: Vec<_> = inputs
            .iter()
            .map(|s| s.parse::<DeploymentMode>())
            .collect();

        // then (期待する結果):
        assert_eq!(results[0], Ok(DeploymentMode::Production));
        assert_eq!(results[1], Ok(DeploymentMode::Development));
        assert_eq!(
            results[2],
            Err(ConfigError::UnknownMode("bogus".to_string()))
        );
    }

    #[test]
    fn test_resolve_from_vars() {
        // テスト項目: 環境変数相当の値から設定が解決される
        // given (前提条件):
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_MODE, "production"),
            (ENV_BASE_URL, "https://collab.example.org"),
            (ENV_SKIP_AUTH, "true"),
        ]);

        // when (操作):
        let config = resolve_from_vars(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        // then (期待する結果):
        assert_eq!(
            config.endpoint_url().as_str(),
            "wss://collab.example.org/ws"
        );
        assert!(!config.auth_required());
    }

    #[test]
    fn test_room_url_carries_room_user_and_token() {
        // テスト項目: ルーム URL にルーム ID・ユーザー・トークンがクエリとして含まれる
        // given (前提条件):
        let config = resolve(DeploymentMode::Development, None, false).unwrap();

        // when (操作):
        let url = config.room_url("repo 42", &alice(), Some("secret"));

        // then (期待する結果):
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["room_id"], "repo 42");
        assert_eq!(pairs["user_id"], "alice");
        assert_eq!(pairs["display_name"], "Alice Liddell");
        assert_eq!(pairs["token"], "secret");
    }

    #[test]
    fn test_room_url_omits_missing_token() {
        // テスト項目: トークンがない場合は token パラメータを付与しない
        // given (前提条件):
        let config = resolve(DeploymentMode::Development, None, true).unwrap();

        // when (操作):
        let url = config.room_url("repo-1", &alice(), None);

        // then (期待する結果):
        assert!(!url.query_pairs().any(|(key, _)| key == "token"));
    }

    #[test]
    fn test_backoff_factor_is_clamped() {
        // テスト項目: 1.0 未満のバックオフ係数は 1.0 に丸められる
        // given (前提条件):
        let config = resolve(DeploymentMode::Development, None, true).unwrap();

        // when (操作):
        let config = config.with_backoff_factor(0.5);

        // then (期待する結果):
        assert_eq!(config.backoff_factor(), 1.0);
    }
}
