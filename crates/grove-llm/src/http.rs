use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Covers a whole streamed answer, not just the first byte.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Client shared by every backend. Falls back to reqwest defaults if the
/// builder is rejected.
pub(crate) fn default_client() -> reqwest::Client {
    let builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .pool_idle_timeout(IDLE_TIMEOUT)
        .user_agent(concat!("grove/", env!("CARGO_PKG_VERSION")));
    match builder.build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "using default HTTP client");
            reqwest::Client::new()
        }
    }
}
