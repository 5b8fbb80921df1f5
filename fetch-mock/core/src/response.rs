use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::pattern::{ResponseBody, ResponsePattern};

/// Mirrors the Fetch response types this library can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    Basic,
    OpaqueRedirect,
}

/// The response handed back to callers of the facade or a server.
#[derive(Clone, Debug)]
pub struct MockResponse {
    kind: ResponseKind,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: Option<Url>,
    redirected: bool,
}

impl MockResponse {
    /// Builds a response from a resolved pattern, suspending for the
    /// pattern's delay first. A caller-supplied `content-type` header
    /// overrides the default derived from the body variant.
    pub async fn from_pattern(pattern: &ResponsePattern, url: &Url) -> Self {
        if let Some(delay) = pattern.delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }

        let (body, default_type) = match &pattern.body {
            None => (Bytes::new(), None),
            Some(ResponseBody::Text(text)) => {
                (Bytes::copy_from_slice(text.as_bytes()), Some("text/plain"))
            }
            Some(ResponseBody::Json(value)) => (
                Bytes::from(serde_json::to_vec(value).expect("JSON body should serialize")),
                Some("application/json"),
            ),
            Some(ResponseBody::Bytes(bytes)) => (bytes.clone(), Some("application/octet-stream")),
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &pattern.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<HeaderName>(),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        if let Some(default_type) = default_type {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(default_type));
            }
        }

        Self {
            kind: ResponseKind::Basic,
            status: pattern.status,
            headers,
            body,
            url: Some(url.clone()),
            redirected: false,
        }
    }

    /// The response returned for `redirect: manual`: type `opaqueredirect`,
    /// status reported as 0, no headers or body, original request URL.
    pub fn opaque_redirect(url: &Url) -> Self {
        Self {
            kind: ResponseKind::OpaqueRedirect,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            url: Some(url.clone()),
            redirected: false,
        }
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    /// The status code, with 0 standing in for an opaque redirect.
    pub fn status(&self) -> u16 {
        match self.kind {
            ResponseKind::OpaqueRedirect => 0,
            ResponseKind::Basic => self.status.as_u16(),
        }
    }

    /// The standard reason phrase for the status.
    pub fn status_text(&self) -> &'static str {
        match self.kind {
            ResponseKind::OpaqueRedirect => "",
            ResponseKind::Basic => self.status.canonical_reason().unwrap_or(""),
        }
    }

    pub fn ok(&self) -> bool {
        self.kind == ResponseKind::Basic && self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn redirected(&self) -> bool {
        self.redirected
    }

    pub fn set_redirected(&mut self, redirected: bool) {
        self.redirected = redirected;
    }

    pub fn set_url(&mut self, url: Url) {
        self.url = Some(url);
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// True for the redirect statuses the redirect engine follows.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status(), 301 | 302 | 303 | 307 | 308)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::ResponsePattern;
    use std::time::Duration;
    use tokio::time::Instant;

    fn url() -> Url {
        Url::parse("https://api.example.com/hello").unwrap()
    }

    #[tokio::test]
    async fn text_body_defaults_to_text_plain() {
        let pattern = ResponsePattern::new(200).unwrap().set_body("Hello world!");
        let response = MockResponse::from_pattern(&pattern, &url()).await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.status_text(), "OK");
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.text(), "Hello world!");
    }

    #[tokio::test]
    async fn json_body_defaults_to_application_json() {
        let pattern = ResponsePattern::new(200)
            .unwrap()
            .set_body(serde_json::json!({"ok": true}));
        let response = MockResponse::from_pattern(&pattern, &url()).await;
        assert_eq!(response.header("content-type"), Some("application/json"));
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn byte_body_defaults_to_octet_stream() {
        let pattern = ResponsePattern::new(200).unwrap().set_body(vec![1u8, 2, 3]);
        let response = MockResponse::from_pattern(&pattern, &url()).await;
        assert_eq!(
            response.header("content-type"),
            Some("application/octet-stream")
        );
        assert_eq!(response.body().as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn explicit_content_type_wins() {
        let pattern = ResponsePattern::new(200)
            .unwrap()
            .set_header("content-type", "text/markdown")
            .set_body("# hi");
        let response = MockResponse::from_pattern(&pattern, &url()).await;
        assert_eq!(response.header("content-type"), Some("text/markdown"));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_suspends_before_returning() {
        let pattern = ResponsePattern::new(200)
            .unwrap()
            .set_delay(Duration::from_millis(250));
        let started = Instant::now();
        let _response = MockResponse::from_pattern(&pattern, &url()).await;
        // Virtual time: the paused clock advances only via the sleep.
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn opaque_redirect_reports_status_zero() {
        let response = MockResponse::opaque_redirect(&url());
        assert_eq!(response.status(), 0);
        assert_eq!(response.kind(), ResponseKind::OpaqueRedirect);
        assert!(!response.ok());
        assert_eq!(response.url(), Some(&url()));
    }
}
