//! HTTP probing

use std::time::Instant;

use async_trait::async_trait;

use super::types::{Endpoint, Outcome};

const USER_AGENT: &str = concat!("pingwatch/", env!("CARGO_PKG_VERSION"), " (Website Monitor)");

/// Performs a single availability check.
///
/// Implementations never fail: anything that prevents a usable response is
/// reported as an unsuccessful [`Outcome`].
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint) -> Outcome;
}

/// Probes endpoints with a GET request, following redirects
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &Endpoint) -> Outcome {
        let started = Instant::now();
        let result = self
            .client
            .get(&endpoint.url)
            .timeout(endpoint.timeout)
            .send()
            .await;
        let observed_at = chrono::Utc::now();
        let elapsed = started.elapsed();

        match result {
            Ok(response) => {
                let code = response.status().as_u16();
                let outcome = if endpoint.accepts(code) {
                    Outcome::up(code, observed_at)
                } else {
                    Outcome::down(format!("Unexpected status code: {}", code), observed_at)
                        .with_status_code(code)
                };
                outcome.with_response_time(elapsed)
            }
            Err(e) => {
                tracing::debug!(url = %endpoint.url, error = %e, "Probe request failed");
                Outcome::down(describe_error(endpoint, &e), observed_at).with_response_time(elapsed)
            }
        }
    }
}

fn describe_error(endpoint: &Endpoint, error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("Request timeout after {}s", endpoint.timeout.as_secs_f64())
    } else if error.is_connect() {
        format!("Connection error: {}", error)
    } else if error.is_redirect() {
        format!("Redirect error: {}", error)
    } else {
        format!("Request error: {}", error)
    }
}
