//! Endpoint probe
//!
//! Polls a freshly deployed function until it answers `200` with a non-empty
//! body or the attempt budget runs out. New deployments often return 5xx or
//! refuse connections for a while, so every failure mode is retried.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::HarnessError;
use crate::http::{HttpClient, HttpError};
use crate::utils::RetryPolicy;

/// Longest body excerpt carried into error messages
const BODY_EXCERPT_LEN: usize = 200;

/// Outcome of a probe run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub url: String,
    pub succeeded: bool,
    pub last_status_code: Option<u16>,
    #[serde(with = "lossy_body")]
    pub last_body: Vec<u8>,
    pub last_error: Option<String>,
    pub attempts_used: u32,
    pub elapsed_ms: u64,
}

impl ProbeResult {
    /// `Ok` when the probe succeeded, else a probe error describing the last
    /// attempt
    pub fn into_result(self) -> Result<ProbeResult, HarnessError> {
        if self.succeeded {
            return Ok(self);
        }

        let last = match (&self.last_error, self.last_status_code) {
            (Some(err), _) => format!("last error: {err}"),
            (None, Some(status)) => format!(
                "last status {status}, body {:?}",
                excerpt(&self.last_body)
            ),
            (None, None) => "no response".to_string(),
        };

        Err(HarnessError::Probe(format!(
            "{} did not return 200 with a body after {} attempt(s); {}",
            self.url, self.attempts_used, last
        )))
    }
}

/// First characters of the body, decoded lossily
fn excerpt(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(BODY_EXCERPT_LEN)
        .collect()
}

/// Bodies are stored as bytes and rendered as text in reports
mod lossy_body {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        String::deserialize(deserializer).map(String::into_bytes)
    }
}

/// Retrying HTTP probe
#[derive(Clone, Debug)]
pub struct HttpProbe {
    client: HttpClient,
}

impl HttpProbe {
    pub fn new(request_timeout_secs: u64) -> Result<Self, HttpError> {
        Ok(Self {
            client: HttpClient::with_timeout(request_timeout_secs)?,
        })
    }

    /// GET `url` until it answers or `policy` runs out of attempts
    pub async fn probe(&self, url: &str, policy: &RetryPolicy) -> ProbeResult {
        info!(
            "Probing {} (up to {} attempts, at most {:?} between them in total)",
            url,
            policy.max_attempts,
            policy.worst_case_wait()
        );
        let start = Instant::now();
        let mut result = ProbeResult {
            url: url.to_string(),
            ..Default::default()
        };

        loop {
            result.attempts_used += 1;
            let attempt = result.attempts_used;

            match self.client.get(url).await {
                Ok(resp) => {
                    let ready = resp.is_ok() && resp.has_body();
                    debug!(
                        "Probe attempt {} got status {} with {} byte body in {}ms",
                        attempt,
                        resp.status_code,
                        resp.body.len(),
                        resp.duration_ms
                    );
                    result.last_status_code = Some(resp.status_code);
                    result.last_error = None;
                    result.last_body = resp.body;

                    if ready {
                        result.succeeded = true;
                        info!("Probe of {} succeeded on attempt {}", url, attempt);
                        break;
                    }
                }
                Err(e) => {
                    debug!("Probe attempt {} failed: {}", attempt, e);
                    result.last_error = Some(e.to_string());
                }
            }

            if !policy.allows_another(attempt) {
                warn!("Probe of {} gave up after {} attempts", url, attempt);
                break;
            }

            let delay = policy.delay_after(attempt);
            warn!(
                "Probe attempt {}/{} of {} not ready; retrying in {:?}",
                attempt, policy.max_attempts, url, delay
            );
            sleep(delay).await;
        }

        result.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use std::sync::Arc;
    use std::thread;
    use tiny_http::{Response, Server};

    /// Serves `responses` in order, one per request, then stops
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicU32>, thread::JoinHandle<()>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", server.server_addr().to_ip().unwrap());
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();

        let handle = thread::spawn(move || {
            for (status, body) in responses {
                let request = match server.recv() {
                    Ok(r) => r,
                    Err(_) => return,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = request.respond(Response::from_string(body).with_status_code(status));
            }
        });

        (url, hits, handle)
    }

    fn fixed(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_errors() {
        let (url, hits, handle) = serve(vec![
            (503, "unavailable"),
            (503, "unavailable"),
            (200, "Hello World!"),
        ]);

        let probe = HttpProbe::new(5).unwrap();
        let result = probe.probe(&url, &fixed(5)).await;
        handle.join().unwrap();

        assert!(result.succeeded);
        assert_eq!(result.attempts_used, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(result.last_status_code, Some(200));
        assert_eq!(result.last_body, b"Hello World!");
        assert!(result.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_last_response() {
        let (url, _hits, handle) = serve(vec![(500, "boom"), (502, "bad gateway")]);

        let probe = HttpProbe::new(5).unwrap();
        let result = probe.probe(&url, &fixed(2)).await;
        handle.join().unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.attempts_used, 2);
        assert_eq!(result.last_status_code, Some(502));

        let err = result.into_result().unwrap_err();
        assert!(matches!(err, HarnessError::Probe(_)));
        let msg = err.to_string();
        assert!(msg.contains("502"));
        assert!(msg.contains("bad gateway"));
        assert!(msg.contains("2 attempt"));
    }

    #[tokio::test]
    async fn test_empty_body_is_not_success() {
        let (url, _hits, handle) = serve(vec![(200, ""), (200, "ok")]);

        let probe = HttpProbe::new(5).unwrap();
        let result = probe.probe(&url, &fixed(3)).await;
        handle.join().unwrap();

        assert!(result.succeeded);
        assert_eq!(result.attempts_used, 2);
    }

    #[tokio::test]
    async fn test_transport_error_is_retried_and_reported() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{port}/");

        let probe = HttpProbe::new(2).unwrap();
        let result = probe.probe(&url, &fixed(2)).await;

        assert!(!result.succeeded);
        assert_eq!(result.attempts_used, 2);
        assert!(result.last_status_code.is_none());
        assert!(result.last_error.is_some());
        assert!(result.into_result().unwrap_err().to_string().contains("last error"));
    }

    #[tokio::test]
    async fn test_binary_body_is_kept_verbatim() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", server.server_addr().to_ip().unwrap());
        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let _ = request.respond(Response::from_data(vec![0xff, 0xfe, b'o', b'k']));
            }
        });

        let probe = HttpProbe::new(5).unwrap();
        let result = probe.probe(&url, &fixed(1)).await;
        handle.join().unwrap();

        assert!(result.succeeded);
        assert_eq!(result.last_body, vec![0xff, 0xfe, b'o', b'k']);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["last_body"], "\u{fffd}\u{fffd}ok");
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let long = "é".repeat(BODY_EXCERPT_LEN + 10);
        assert_eq!(excerpt(long.as_bytes()).chars().count(), BODY_EXCERPT_LEN);
        assert_eq!(excerpt(b"short"), "short");
        assert_eq!(excerpt(&[b'a', 0xff]), "a\u{fffd}");
    }
}
