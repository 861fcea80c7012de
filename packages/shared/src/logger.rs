//! Logging setup shared by the Collab binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose log output is enabled by default.
const WORKSPACE_CRATES: [&str; 3] = ["collab_shared", "collab_client", "collab_server"];

/// Build the default filter directive for the workspace crates and the binary.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "collab-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info")
pub fn default_directive(binary_name: &str, default_log_level: &str) -> String {
    let mut targets: Vec<String> = WORKSPACE_CRATES
        .iter()
        .map(|name| format!("{}={}", name, default_log_level))
        .collect();

    let binary_target = binary_name.replace('-', "_");
    if !WORKSPACE_CRATES.contains(&binary_target.as_str()) {
        targets.push(format!("{}={}", binary_target, default_log_level));
    }

    targets.join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Examples
///
/// ```no_run
/// use collab_shared::logger::setup_logger;
///
/// setup_logger("collab-server", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
