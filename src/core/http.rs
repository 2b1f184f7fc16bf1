use std::time::Duration;

use reqwest::Client;

const APP_USER_AGENT: &str = "mp-companion/0.1.0";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default whole-request bound. The original relied on the HTTP stack's
/// defaults; a bound avoids indefinite hangs on dead mirrors. Generous
/// because release archives download through the same client.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub fn build_http_client() -> Result<Client, reqwest::Error> {
    build_http_client_with_timeout(DEFAULT_TIMEOUT)
}

pub fn build_http_client_with_timeout(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
}
