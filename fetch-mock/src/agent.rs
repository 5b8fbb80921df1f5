use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use tracing::debug;
use url::Url;

use fetch_mock_core::{MatchTrace, MockResponse, MockServer, ReceivedRequest, RequestPattern};

use crate::error::{ConfigError, FetchError, NoRouteMatchedError};
use crate::request::AbortSignal;

/// A request body as dispatcher callers hand it over: raw bytes, text,
/// pre-chunked stream contents, or any JSON-serializable value as a
/// fallback.
#[derive(Clone, Debug)]
pub enum DispatchBody {
    Bytes(Bytes),
    Text(String),
    Chunks(Vec<Bytes>),
    Json(serde_json::Value),
}

impl DispatchBody {
    fn into_bytes(self) -> Bytes {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Text(text) => Bytes::from(text.into_bytes()),
            Self::Chunks(chunks) => {
                let mut joined = Vec::new();
                for chunk in chunks {
                    joined.extend_from_slice(&chunk);
                }
                Bytes::from(joined)
            }
            Self::Json(value) => {
                Bytes::from(serde_json::to_vec(&value).expect("JSON body should serialize"))
            }
        }
    }
}

impl From<&str> for DispatchBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for DispatchBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for DispatchBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<serde_json::Value> for DispatchBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

#[derive(Clone, Debug)]
pub enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

/// Headers as dispatcher callers pass them: a name→value(s) map or a flat
/// `[name, value, name, value, …]` list.
#[derive(Clone, Debug)]
pub enum DispatchHeaders {
    Map(Vec<(String, HeaderValues)>),
    Flat(Vec<String>),
}

impl DispatchHeaders {
    fn into_header_map(self) -> Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::new();
        let mut append = |name: &str, value: &str| -> Result<(), FetchError> {
            let name: HeaderName = name
                .parse()
                .map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FetchError::InvalidHeader(value.to_string()))?;
            headers.append(name, value);
            Ok(())
        };

        match self {
            Self::Map(entries) => {
                for (name, values) in entries {
                    match values {
                        HeaderValues::One(value) => append(&name, &value)?,
                        HeaderValues::Many(values) => {
                            for value in values {
                                append(&name, &value)?;
                            }
                        }
                    }
                }
            }
            Self::Flat(flat) => {
                if flat.len() % 2 != 0 {
                    return Err(FetchError::InvalidHeader(
                        "flat header list has an odd number of entries".to_string(),
                    ));
                }
                for pair in flat.chunks(2) {
                    append(&pair[0], &pair[1])?;
                }
            }
        }
        Ok(headers)
    }
}

/// One dispatcher call: origin + path identify the URL; everything else is
/// optional.
#[derive(Debug)]
pub struct DispatchOptions {
    pub origin: String,
    pub path: String,
    pub method: Method,
    pub body: Option<DispatchBody>,
    pub headers: Option<DispatchHeaders>,
}

impl DispatchOptions {
    pub fn new(origin: impl Into<String>, path: impl Into<String>, method: Method) -> Self {
        Self {
            origin: origin.into(),
            path: path.into(),
            method,
            body: None,
            headers: None,
        }
    }

    pub fn set_body(mut self, body: impl Into<DispatchBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn set_headers(mut self, headers: DispatchHeaders) -> Self {
        self.headers = Some(headers);
        self
    }
}

/// The callback bundle a dispatch delivers to. Every callback has an empty
/// default so callers implement only what they observe.
pub trait DispatchHandler: Send + 'static {
    fn on_connect(&mut self, _abort: &AbortSignal) {}

    /// Status, a flattened header list, and a resume hook kept for
    /// interface parity (responses are delivered whole).
    fn on_headers(&mut self, _status: u16, _headers: &[(String, String)], _resume: &dyn Fn()) {}

    /// The entire response body, delivered once.
    fn on_data(&mut self, _chunk: Bytes) {}

    fn on_complete(&mut self, _trailers: Vec<String>) {}

    fn on_error(&mut self, _error: FetchError) {}
}

/// The dispatcher adapter: translates the callback protocol Node-style
/// HTTP clients use into the same server-dispatch pipeline the facade
/// runs, minus CORS and credentials.
pub struct MockAgent {
    servers: Vec<Arc<MockServer>>,
    closed: Arc<AtomicBool>,
}

impl MockAgent {
    pub fn new(servers: Vec<Arc<MockServer>>) -> Result<Self, ConfigError> {
        if servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        Ok(Self {
            servers,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Fire-and-forget: the return value reports only whether processing
    /// started; every outcome, including errors, flows through the
    /// handler. Requires a Tokio runtime.
    pub fn dispatch(&self, options: DispatchOptions, mut handler: impl DispatchHandler) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            handler.on_error(FetchError::AgentClosed);
            return false;
        }

        let servers = self.servers.clone();
        tokio::spawn(async move {
            match process(servers, options).await {
                Ok(response) => deliver(&mut handler, &response),
                Err(error) => handler.on_error(error),
            }
        });
        true
    }

    /// Marks the agent closed; subsequent dispatches fail synchronously.
    /// Idempotent; the promise form exists for interface parity.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn destroy(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// See [`MockServer::called`]; aggregated across servers.
    ///
    /// # Panics
    ///
    /// Panics when no server has a route the pattern describes.
    pub fn called(&self, pattern: impl Into<RequestPattern>) -> bool {
        let probe = pattern.into();
        let mut any = false;
        let mut matched = false;
        for server in &self.servers {
            if let Some(served) = server.check_called(&probe) {
                any = true;
                matched |= served;
            }
        }
        if !any {
            panic!(
                "pattern {} {} does not match any registered route on any server",
                probe.method.clone().unwrap_or(Method::GET),
                probe.url,
            );
        }
        matched
    }

    pub fn all_routes_called(&self) -> bool {
        self.servers.iter().all(|server| server.all_routes_called())
    }

    pub fn uncalled_routes(&self) -> Vec<String> {
        self.servers
            .iter()
            .flat_map(|server| server.uncalled_routes())
            .collect()
    }

    /// # Panics
    ///
    /// Panics when any route on any server is uncalled, listing them.
    pub fn assert_all_routes_called(&self) {
        let uncalled = self.uncalled_routes();
        if !uncalled.is_empty() {
            panic!(
                "expected all routes to be called; uncalled:\n{}",
                uncalled.join("\n")
            );
        }
    }
}

async fn process(
    servers: Vec<Arc<MockServer>>,
    options: DispatchOptions,
) -> Result<MockResponse, FetchError> {
    let base = Url::parse(&options.origin)
        .map_err(|_| FetchError::InvalidUrl(options.origin.clone()))?;
    let url = base
        .join(&options.path)
        .map_err(|_| FetchError::InvalidUrl(options.path.clone()))?;
    let headers = match options.headers {
        Some(headers) => headers.into_header_map()?,
        None => HeaderMap::new(),
    };
    let body = options.body.map(DispatchBody::into_bytes);

    debug!(%url, method = %options.method, "agent dispatch");

    let mut partial: Vec<MatchTrace> = Vec::new();
    for server in &servers {
        let received =
            ReceivedRequest::from_parts(options.method.clone(), url.clone(), headers.clone(), body.clone())
                .map_err(|error| FetchError::Dispatch(anyhow::Error::new(error)))?;
        let (response, traces) = server.trace_receive(&received).await?;
        if let Some(response) = response {
            return Ok(response);
        }
        partial.extend(traces.into_iter().filter(MatchTrace::is_partial_match));
    }

    let dump = ReceivedRequest::from_parts(options.method, url, headers, body)
        .map_err(|error| FetchError::Dispatch(anyhow::Error::new(error)))?
        .dump();
    Err(NoRouteMatchedError {
        request: dump,
        traces: partial,
    }
    .into())
}

fn deliver(handler: &mut impl DispatchHandler, response: &MockResponse) {
    handler.on_connect(&AbortSignal::new());

    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    handler.on_headers(response.status(), &headers, &|| {});

    if !response.body().is_empty() {
        handler.on_data(response.body().clone());
    }
    handler.on_complete(Vec::new());
}
