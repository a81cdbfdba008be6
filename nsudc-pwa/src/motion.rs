//! Debate motion generation.
//!
//! Asks the site's AI proxy for a motion, retrying timeouts and server
//! errors with a short linear backoff. When the proxy cannot help, callers
//! fall back to [`pick_static`] over the bundled motion list.

use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::SiteConfig;
use crate::network::{resolve_url, HttpClient, HttpRequest, NetworkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionSource {
    Ai,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motion {
    pub motion: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub source: Option<MotionSource>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MotionError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("motion service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("undecodable motion response: {0}")]
    Decode(String),

    #[error("invalid response from server")]
    Rejected,

    #[error("no motion available from the service or the static list")]
    Unavailable,
}

#[derive(Serialize)]
struct MotionRequest<'a> {
    topic: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
struct MotionReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    motion: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Deserialize)]
struct ErrorReply {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthReply {
    #[serde(default)]
    status: String,
    #[serde(default)]
    gemini_available: bool,
}

pub struct MotionClient<C> {
    client: C,
    origin: String,
    endpoint: String,
    health_endpoint: String,
    timeout: Duration,
    max_retries: u32,
    sleep: fn(Duration),
}

impl<C: HttpClient> MotionClient<C> {
    pub fn new(client: C, config: &SiteConfig) -> Self {
        Self {
            client,
            origin: config.origin.clone(),
            endpoint: config.motion.endpoint.clone(),
            health_endpoint: config.motion.health_endpoint.clone(),
            timeout: Duration::from_secs(config.motion.timeout_secs),
            max_retries: config.motion.max_retries,
            sleep: std::thread::sleep,
        }
    }

    /// Replace the backoff sleep (tests pass a no-op).
    pub fn with_sleeper(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    fn attempt(&self, topic: &str, format: &str) -> Result<Motion, MotionError> {
        let url = resolve_url(&self.origin, &self.endpoint)
            .map_err(|e| NetworkError::Other(format!("bad endpoint {}: {e}", self.endpoint)))?;
        let body = serde_json::to_vec(&MotionRequest { topic, format })
            .map_err(|e| MotionError::Decode(e.to_string()))?;
        let request = HttpRequest::post(url.as_str(), "application/json", body)
            .with_timeout(self.timeout);

        let response = self.client.fetch(&request)?;
        if !response.ok() {
            let message = serde_json::from_slice::<ErrorReply>(&response.body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            return Err(MotionError::Status {
                status: response.status,
                message,
            });
        }

        let reply: MotionReply = serde_json::from_slice(&response.body)
            .map_err(|e| MotionError::Decode(e.to_string()))?;
        let motion = match reply.motion {
            Some(m) if reply.success && !m.is_empty() => m,
            _ => return Err(MotionError::Rejected),
        };
        Ok(Motion {
            motion,
            topic: reply.topic.or_else(|| Some(topic.to_string())),
            format: reply.format.or_else(|| Some(format.to_string())),
            source: Some(MotionSource::Ai),
            timestamp: Some(
                reply
                    .timestamp
                    .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
            ),
        })
    }

    /// Generate a motion, or `None` when the caller should use the static
    /// list.
    ///
    /// Timeouts retry after 1s, 2s, ...; server-side failures retry after
    /// 0.5s, 1s, ...; an unreachable network gives up at once.
    pub fn generate(&self, topic: &str, format: &str) -> Option<Motion> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.attempt(topic, format) {
                Ok(motion) => return Some(motion),
                Err(MotionError::Network(NetworkError::Timeout)) => {
                    warn!("motion: timeout (attempt {})", attempt + 1);
                    last_error = Some(MotionError::Network(NetworkError::Timeout));
                    if attempt == self.max_retries {
                        break;
                    }
                    (self.sleep)(Duration::from_millis(1000 * (attempt as u64 + 1)));
                }
                Err(e @ MotionError::Network(_)) => {
                    warn!("motion: network error, falling back to static motions: {e}");
                    last_error = Some(e);
                    break;
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        debug!("motion: retrying (attempt {})", attempt + 2);
                        (self.sleep)(Duration::from_millis(500 * (attempt as u64 + 1)));
                    }
                }
            }
        }
        if let Some(e) = last_error {
            warn!("motion: generation failed: {e}");
        }
        None
    }

    /// Whether the proxy is up and has its AI backend configured.
    pub fn health(&self) -> bool {
        let Ok(url) = resolve_url(&self.origin, &self.health_endpoint) else {
            return false;
        };
        let request = HttpRequest::get(url.as_str()).with_header("Cache-Control", "no-cache");
        match self.client.fetch(&request) {
            Ok(response) if response.ok() => serde_json::from_slice::<HealthReply>(&response.body)
                .map(|h| h.status == "ok" && h.gemini_available)
                .unwrap_or(false),
            Ok(_) => false,
            Err(e) => {
                warn!("motion: health check failed: {e}");
                false
            }
        }
    }
}

/// Parse the bundled static motion list.
pub fn parse_static(json: &str) -> Result<Vec<Motion>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Choose a static motion, preferring ones whose topic contains `topic`
/// (case-insensitive). `seed` selects among the candidates.
pub fn pick_static(motions: &[Motion], topic: Option<&str>, seed: u64) -> Option<Motion> {
    if motions.is_empty() {
        return None;
    }
    let wanted = topic.filter(|t| !t.is_empty()).map(str::to_lowercase);
    let matching: Vec<&Motion> = match &wanted {
        Some(wanted) => motions
            .iter()
            .filter(|m| {
                m.topic
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(wanted.as_str()))
            })
            .collect(),
        None => Vec::new(),
    };
    let pool: Vec<&Motion> = if matching.is_empty() {
        motions.iter().collect()
    } else {
        matching
    };
    let mut chosen = pool[(seed % pool.len() as u64) as usize].clone();
    chosen.source = Some(MotionSource::Static);
    Some(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::network::HttpResponse;

    struct Replies(RefCell<Vec<Result<HttpResponse, NetworkError>>>, RefCell<usize>);

    impl Replies {
        fn new(mut replies: Vec<Result<HttpResponse, NetworkError>>) -> Self {
            replies.reverse();
            Self(RefCell::new(replies), RefCell::new(0))
        }

        fn calls(&self) -> usize {
            *self.1.borrow()
        }
    }

    impl HttpClient for Replies {
        fn fetch(&self, _request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
            *self.1.borrow_mut() += 1;
            self.0
                .borrow_mut()
                .pop()
                .unwrap_or(Err(NetworkError::Other("script exhausted".into())))
        }
    }

    fn no_sleep(_: Duration) {}

    fn client(replies: Vec<Result<HttpResponse, NetworkError>>) -> MotionClient<Replies> {
        MotionClient::new(Replies::new(replies), &SiteConfig::default()).with_sleeper(no_sleep)
    }

    fn good() -> Result<HttpResponse, NetworkError> {
        Ok(HttpResponse::new(
            200,
            r#"{"success":true,"motion":"THBT social media does more harm than good","format":"BP"}"#,
        ))
    }

    #[test]
    fn success_is_tagged_ai() {
        let c = client(vec![good()]);
        let m = c.generate("Technology", "BP").unwrap();
        assert_eq!(m.source, Some(MotionSource::Ai));
        assert_eq!(m.topic.as_deref(), Some("Technology"));
        assert_eq!(m.format.as_deref(), Some("BP"));
        assert!(m.timestamp.is_some());
    }

    #[test]
    fn timeouts_retry_then_succeed() {
        let c = client(vec![Err(NetworkError::Timeout), Err(NetworkError::Timeout), good()]);
        assert!(c.generate("x", "BP").is_some());
        assert_eq!(c.client.calls(), 3);
    }

    #[test]
    fn offline_gives_up_immediately() {
        let c = client(vec![Err(NetworkError::Offline), good()]);
        assert_eq!(c.generate("x", "BP"), None);
        assert_eq!(c.client.calls(), 1);
    }

    #[test]
    fn server_errors_exhaust_retries() {
        let c = client(vec![
            Ok(HttpResponse::new(500, r#"{"error":"quota"}"#)),
            Ok(HttpResponse::new(502, "")),
            Ok(HttpResponse::new(200, r#"{"success":false}"#)),
            good(),
        ]);
        assert_eq!(c.generate("x", "BP"), None);
        assert_eq!(c.client.calls(), 3);
    }

    #[test]
    fn health_requires_backend() {
        let ok = client(vec![Ok(HttpResponse::new(
            200,
            r#"{"status":"ok","geminiAvailable":true}"#,
        ))]);
        assert!(ok.health());
        let missing = client(vec![Ok(HttpResponse::new(
            200,
            r#"{"status":"ok","geminiAvailable":false}"#,
        ))]);
        assert!(!missing.health());
        assert!(!client(vec![Err(NetworkError::Offline)]).health());
    }

    #[test]
    fn static_pick_prefers_topic() {
        let motions = parse_static(
            r#"[
                {"motion": "THW ban zoos", "topic": "Environment"},
                {"motion": "THW tax AI labs", "topic": "Technology & Economy"},
                {"motion": "THW abolish exams", "topic": "Education"}
            ]"#,
        )
        .unwrap();
        for seed in 0..5 {
            let m = pick_static(&motions, Some("technology"), seed).unwrap();
            assert_eq!(m.motion, "THW tax AI labs");
            assert_eq!(m.source, Some(MotionSource::Static));
        }
        let any = pick_static(&motions, Some("sports"), 2).unwrap();
        assert_eq!(any.motion, "THW abolish exams");
        assert_eq!(pick_static(&[], None, 0), None);
    }
}
