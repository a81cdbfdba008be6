//! `HttpClient` over a blocking reqwest client.

use std::time::Duration;

use log::debug;
use nsudc_pwa::network::{
    HttpClient, HttpRequest, HttpResponse, Method, NetworkError, ResponseType,
};
use url::Url;

pub struct ReqwestClient {
    inner: reqwest::blocking::Client,
    site: Option<Url>,
}

impl ReqwestClient {
    /// `site_origin` decides which responses count as same-origin.
    pub fn new(site_origin: &str, default_timeout: Duration) -> Result<Self, NetworkError> {
        let inner = reqwest::blocking::Client::builder()
            .timeout(default_timeout)
            .build()
            .map_err(|e| NetworkError::Other(e.to_string()))?;
        Ok(Self {
            inner,
            site: Url::parse(site_origin).ok(),
        })
    }
}

/// `Basic` for the site's own origin, `Cors` for anything else.
fn response_type(site: Option<&Url>, request_url: &str) -> ResponseType {
    let same_origin = match (site, Url::parse(request_url)) {
        (Some(site), Ok(url)) => site.origin() == url.origin(),
        _ => false,
    };
    if same_origin {
        ResponseType::Basic
    } else {
        ResponseType::Cors
    }
}

fn method(m: Method) -> reqwest::Method {
    match m {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn classify(e: reqwest::Error) -> NetworkError {
    if e.is_timeout() {
        NetworkError::Timeout
    } else if e.is_connect() {
        NetworkError::Offline
    } else {
        NetworkError::Other(e.to_string())
    }
}

impl HttpClient for ReqwestClient {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        debug!("http: {} {}", request.method, request.url);
        let mut builder = self.inner.request(method(request.method), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().map_err(classify)?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
            response_type: response_type(self.site.as_ref(), &request.url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_methods() {
        assert_eq!(method(Method::Post), reqwest::Method::POST);
        assert_eq!(method(Method::Get), reqwest::Method::GET);
    }

    #[test]
    fn cross_origin_responses_are_cors() {
        let site = Url::parse("http://localhost:3000").unwrap();
        assert_eq!(
            response_type(Some(&site), "http://localhost:3000/data/social.json"),
            ResponseType::Basic
        );
        assert_eq!(
            response_type(Some(&site), "https://fonts.googleapis.com/css2?family=Inter"),
            ResponseType::Cors
        );
        assert_eq!(response_type(Some(&site), "http://localhost:4000/"), ResponseType::Cors);
        assert_eq!(response_type(None, "http://localhost:3000/"), ResponseType::Cors);
    }
}
