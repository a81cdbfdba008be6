//! Outbound HTTP capability.
//!
//! The pipeline never talks to a socket itself. Hosts hand it an
//! [`HttpClient`]; the CLI wires a real client, tests wire scripted ones.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Types ───────────────────────────────────────────────────

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the requester intends to do with the response (`Request.destination`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestDestination {
    /// Top-level navigation.
    Document,
    Script,
    Style,
    Image,
    Font,
    /// `fetch()` / XHR and anything else.
    #[default]
    Empty,
}

/// Response tainting, as seen by a service worker (`Response.type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseType {
    /// Same-origin, fully readable.
    #[default]
    Basic,
    /// Cross-origin with CORS headers.
    Cors,
    /// Cross-origin without CORS; body and status hidden.
    Opaque,
}

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub destination: RequestDestination,
    /// Per-request deadline. `None` means the client's own default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            destination: RequestDestination::Empty,
            timeout: None,
        }
    }

    /// A top-level navigation to `url`.
    pub fn navigate(url: impl Into<String>) -> Self {
        Self::get(url).with_destination(RequestDestination::Document)
    }

    pub fn post(url: impl Into<String>, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body: Some(body),
            destination: RequestDestination::Empty,
            timeout: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response as returned by the network or the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub response_type: ResponseType,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// `Response.ok`: status in 200..=299.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Transport-level failure: no response was received at all.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("network unreachable (offline)")]
    Offline,

    #[error("request timed out")]
    Timeout,

    #[error("DNS lookup failed for {host}")]
    Dns { host: String },

    #[error("network error: {0}")]
    Other(String),
}

/// Why a submission was not delivered. Either variant routes the payload
/// into the offline queue.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("server responded with HTTP {0}")]
    Status(u16),
}

/// The host's `fetch()`.
pub trait HttpClient {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError>;
}

impl<T: HttpClient + ?Sized> HttpClient for &T {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        (**self).fetch(request)
    }
}

impl<T: HttpClient + ?Sized> HttpClient for std::rc::Rc<T> {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        (**self).fetch(request)
    }
}

/// Send `request` and treat anything outside 2xx as a delivery failure.
pub fn deliver<C: HttpClient + ?Sized>(
    client: &C,
    request: &HttpRequest,
) -> Result<HttpResponse, DeliveryError> {
    let response = client.fetch(request)?;
    if response.ok() {
        Ok(response)
    } else {
        Err(DeliveryError::Status(response.status))
    }
}

/// Resolve `path` (absolute URL or site-relative path) against `origin`.
pub fn resolve_url(origin: &str, path: &str) -> Result<url::Url, url::ParseError> {
    match url::Url::parse(path) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => url::Url::parse(origin)?.join(path),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<HttpResponse, NetworkError>);

    impl HttpClient for Fixed {
        fn fetch(&self, _request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
            self.0.clone()
        }
    }

    #[test]
    fn ok_is_2xx_only() {
        assert!(HttpResponse::new(200, "").ok());
        assert!(HttpResponse::new(204, "").ok());
        assert!(!HttpResponse::new(304, "").ok());
        assert!(!HttpResponse::new(500, "").ok());
    }

    #[test]
    fn deliver_maps_status_to_error() {
        let client = Fixed(Ok(HttpResponse::new(503, "busy")));
        let err = deliver(&client, &HttpRequest::get("http://x/")).unwrap_err();
        assert_eq!(err, DeliveryError::Status(503));
    }

    #[test]
    fn deliver_maps_transport_error() {
        let client = Fixed(Err(NetworkError::Offline));
        let err = deliver(&client, &HttpRequest::get("http://x/")).unwrap_err();
        assert_eq!(err, DeliveryError::Network(NetworkError::Offline));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = HttpRequest::post("http://x/register", "text/plain", Vec::new());
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn resolve_relative_and_absolute() {
        let origin = "http://localhost:3000";
        assert_eq!(
            resolve_url(origin, "/index.html").unwrap().as_str(),
            "http://localhost:3000/index.html"
        );
        assert_eq!(
            resolve_url(origin, "https://cdn.tailwindcss.com/3.3.0")
                .unwrap()
                .as_str(),
            "https://cdn.tailwindcss.com/3.3.0"
        );
    }
}
