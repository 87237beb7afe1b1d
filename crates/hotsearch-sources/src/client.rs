use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use hotsearch::FetchError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Shared HTTP client for every site fetcher.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct HttpClient {
    http: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and return the body as text.
    pub async fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        debug!(url = %url, "GET request");

        let mut req = self.http.get(url);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }

        let resp = req.send().await.map_err(|e| self.request_error(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| self.request_error(url, e))
    }

    /// GET `url` and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let body = self.get_text(url, headers).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Parse(format!("{}: {}", url, e)))
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}
