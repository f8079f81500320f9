use std::time::Duration;

use cleanflux_core::error::{CleanfluxError, Result};
use cleanflux_core::tabular::{BackendClient, TabularResult};
use tracing::warn;

use crate::decode::decode_single_result;

/// Default per-request timeout (`timeout = 60` in `request_handler.py`).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default number of retries for connection-level failures, mirroring
/// `robustify_influxdb_client`'s `self._retries` default.
pub const DEFAULT_RETRIES: u32 = 3;

/// Talks to a single InfluxDB-compatible backend over HTTP.
///
/// Builds a fresh [`reqwest::blocking::Client`] on every retry attempt —
/// the original swaps in a fresh `requests.Session()` after a
/// `ConnectionError` rather than reusing the one that just failed, and
/// this keeps the same behavior without a mutable client held across
/// calls.
pub struct ReqwestBackendClient {
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl ReqwestBackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        ReqwestBackendClient {
            base_url: base_url.into(),
            timeout,
            max_retries,
        }
    }

    pub fn from_host_port(host: &str, port: u16) -> Self {
        ReqwestBackendClient::new(format!("http://{host}:{port}"), DEFAULT_TIMEOUT, DEFAULT_RETRIES)
    }
}

impl ReqwestBackendClient {
    /// Issue a query and return its raw JSON response, bypassing the
    /// numeric-valued `TabularResult` decode — used for admin `SHOW ...`
    /// queries at startup (`SHOW DATABASES`, `SHOW RETENTION POLICIES`,
    /// `SHOW CONTINUOUS QUERIES`), whose columns are names and durations,
    /// not measurement fields.
    pub fn execute_raw(&self, schema: &str, user: &str, password: &str, query: &str) -> Result<serde_json::Value> {
        let response = self.send_with_retries(schema, user, password, query)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(CleanfluxError::BackendServer { status: status.as_u16() });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CleanfluxError::BackendClient { status: status.as_u16(), body });
        }
        response.json().map_err(|e| CleanfluxError::BackendDecode(e.to_string()))
    }

    fn send_with_retries(&self, schema: &str, user: &str, password: &str, query: &str) -> Result<reqwest::blocking::Response> {
        let url = format!("{}/query", self.base_url);
        let mut params = vec![("db", schema), ("q", query), ("epoch", "ns")];
        if !user.is_empty() {
            params.push(("u", user));
            params.push(("p", password));
        }

        let mut last_err: Option<CleanfluxError> = None;
        for attempt in 0..=self.max_retries {
            let client = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| CleanfluxError::BackendTransient(e.to_string()))?;

            match client.get(&url).query(&params).send() {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(attempt, error = %e, "backend connection failed, retrying with a fresh client");
                    last_err = Some(CleanfluxError::BackendTransient(e.to_string()));
                }
                Err(e) => return Err(CleanfluxError::BackendTransient(e.to_string())),
            }
        }
        Err(last_err.unwrap_or(CleanfluxError::BackendTransient("exhausted retries".into())))
    }
}

impl BackendClient for ReqwestBackendClient {
    fn execute(&self, schema: &str, user: &str, password: &str, query: &str) -> Result<TabularResult> {
        let response = self.send_with_retries(schema, user, password, query)?;
        handle_response(response)
    }
}

fn handle_response(response: reqwest::blocking::Response) -> Result<TabularResult> {
    let status = response.status();
    if status.is_server_error() {
        return Err(CleanfluxError::BackendServer { status: status.as_u16() });
    }
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(CleanfluxError::BackendClient {
            status: status.as_u16(),
            body,
        });
    }
    let body: serde_json::Value = response
        .json()
        .map_err(|e| CleanfluxError::BackendDecode(e.to_string()))?;
    decode_single_result(&body)
}
