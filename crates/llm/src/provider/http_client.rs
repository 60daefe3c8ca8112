use std::time::Duration;

use reqwest::Client;

/// Builds the shared upstream HTTP client, pooling connections across requests the
/// same way the rest of this codebase's HTTP clients are built.
pub(crate) fn build_http_client(timeout: Duration) -> reqwest::Client {
    Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .build()
        .expect("failed to build upstream HTTP client")
}
