//! [`HttpLogSink`] – posts records to the logging endpoint.
//!
//! Every record is sent as one JSON body with `POST`.  There is exactly one
//! attempt per record: connection errors, timeouts and non-2xx statuses all
//! come back as [`TurntableError::SubmissionFailure`] and nothing is queued
//! for later.
//!
//! # Example
//!
//! ```rust,no_run
//! use turntable_middleware::http_sink::HttpLogSink;
//!
//! # fn main() -> Result<(), turntable_types::TurntableError> {
//! let sink = HttpLogSink::new("http://localhost:8000/log")?;
//! assert_eq!(sink.endpoint(), "http://localhost:8000/log");
//! // Requires a running logging server – skipped in unit tests.
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use turntable_types::{LogRecord, TurntableError};

use crate::adapter::LogSink;

/// Upper bound on a single submission.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-over-HTTP [`LogSink`].
pub struct HttpLogSink {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpLogSink {
    /// Create a sink posting to `endpoint` with the default timeout.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TurntableError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Fails when `endpoint` is not an http(s) URL or the HTTP client
    /// cannot be built.  The timeout is never silently dropped.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TurntableError> {
        let endpoint = endpoint.into();
        let url = reqwest::Url::parse(&endpoint)
            .map_err(|e| TurntableError::SubmissionFailure(format!("invalid log endpoint {endpoint}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TurntableError::SubmissionFailure(format!(
                "log endpoint {endpoint} must use http or https"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TurntableError::SubmissionFailure(format!("HTTP client: {e}")))?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    async fn submit(&self, record: &LogRecord) -> Result<(), TurntableError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(|e| TurntableError::SubmissionFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TurntableError::SubmissionFailure(format!(
                "{} answered {status}",
                self.endpoint
            )));
        }
        debug!(kind = ?record.kind(), %status, "record posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use turntable_types::{Angles, BaselineRecord};

    fn baseline() -> LogRecord {
        LogRecord::Baseline(BaselineRecord::new(
            "1700000000000-42",
            "Set_1_orig_matte_0.glb",
            Angles { yaw: 15.0, pitch: 30.0 },
        ))
    }

    /// Accept one connection, read the whole request and answer with
    /// `status_line`.  Resolves to the request body.
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/log", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!("{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            let text = String::from_utf8_lossy(&buf).to_string();
            text.split_once("\r\n\r\n")
                .map(|(_, body)| body.to_string())
                .unwrap_or_default()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn posts_wire_json() {
        let (url, server) = one_shot_server("HTTP/1.1 200 OK").await;
        let sink = HttpLogSink::new(url).unwrap();
        sink.submit(&baseline()).await.unwrap();

        let body: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(body["actionId"], -1);
        assert_eq!(body["sessionId"], "1700000000000-42");
        assert_eq!(body["initialAngles"]["yaw"], 15.0);
    }

    #[tokio::test]
    async fn non_success_status_is_a_submission_failure() {
        let (url, server) = one_shot_server("HTTP/1.1 500 Internal Server Error").await;
        let sink = HttpLogSink::new(url).unwrap();
        let err = sink.submit(&baseline()).await.unwrap_err();
        assert!(matches!(err, TurntableError::SubmissionFailure(ref m) if m.contains("500")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_submission_failure() {
        let sink = HttpLogSink::with_timeout("http://127.0.0.1:9/log", Duration::from_secs(2)).unwrap();
        let err = sink.submit(&baseline()).await.unwrap_err();
        assert!(matches!(err, TurntableError::SubmissionFailure(_)));
    }

    #[test]
    fn malformed_endpoint_is_rejected_at_construction() {
        let err = HttpLogSink::new("not a url").err().unwrap();
        assert!(matches!(err, TurntableError::SubmissionFailure(ref m) if m.contains("invalid log endpoint")));

        let err = HttpLogSink::new("ftp://example.org/log").err().unwrap();
        assert!(matches!(err, TurntableError::SubmissionFailure(ref m) if m.contains("http or https")));
    }

    #[test]
    fn configured_timeout_builds_a_client() {
        let sink = HttpLogSink::with_timeout("https://example.org/log", Duration::from_millis(250)).unwrap();
        assert_eq!(sink.endpoint(), "https://example.org/log");
    }
}
