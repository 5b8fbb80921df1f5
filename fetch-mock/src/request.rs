use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;
use uuid::Uuid;

use crate::error::FetchError;

/// How cookies accompany a request, mirroring the Fetch credentials modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CredentialsMode {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RedirectMode {
    #[default]
    Follow,
    Error,
    Manual,
}

/// A cancellation flag shared between a caller and an in-flight fetch.
///
/// The pipeline consults it at entry, after CORS/preflight work, and after
/// server dispatch; in-flight response delays are not interruptible.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// The decorated request the pipeline works with: a standard Fetch-style
/// request plus a stable identifier. Clones share the identifier, and the
/// declared credentials mode is always honored.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    id: Uuid,
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub credentials: CredentialsMode,
    pub redirect: RedirectMode,
    pub signal: Option<AbortSignal>,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            credentials: CredentialsMode::default(),
            redirect: RedirectMode::default(),
            signal: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Stable across clones; fresh per constructed request.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn check_abort(&self) -> Result<(), FetchError> {
        match &self.signal {
            Some(signal) if signal.is_aborted() => Err(FetchError::Aborted),
            _ => Ok(()),
        }
    }
}

/// Per-call options, mirroring the second argument of Fetch.
#[derive(Debug, Default)]
pub struct RequestInit {
    pub method: Option<Method>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub credentials: Option<CredentialsMode>,
    pub redirect: Option<RedirectMode>,
    pub signal: Option<AbortSignal>,
}

impl RequestInit {
    pub fn set_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn set_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn set_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn set_json(mut self, value: &serde_json::Value) -> Self {
        self.body = Some(Bytes::from(
            serde_json::to_vec(value).expect("JSON body should serialize"),
        ));
        self.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        self
    }

    pub fn set_credentials(mut self, credentials: CredentialsMode) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn set_redirect(mut self, redirect: RedirectMode) -> Self {
        self.redirect = Some(redirect);
        self
    }

    pub fn set_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub(crate) fn apply(self, url: Url) -> Result<FetchRequest, FetchError> {
        let mut request = FetchRequest::new(self.method.unwrap_or(Method::GET), url);
        for (name, value) in self.headers {
            let name: HeaderName = name
                .parse()
                .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            let value =
                HeaderValue::from_str(&value).map_err(|_| FetchError::InvalidHeader(value))?;
            request.headers.append(name, value);
        }
        request.body = self.body;
        if let Some(credentials) = self.credentials {
            request.credentials = credentials;
        }
        if let Some(redirect) = self.redirect {
            request.redirect = redirect;
        }
        request.signal = self.signal;
        Ok(request)
    }
}

/// What `fetch` accepts: a URL string (absolute or relative to the
/// configured base URL), a parsed URL, or a prepared request.
pub enum FetchInput {
    Text(String),
    Parsed(Url),
    Request(Box<FetchRequest>),
}

impl From<&str> for FetchInput {
    fn from(input: &str) -> Self {
        Self::Text(input.to_string())
    }
}

impl From<String> for FetchInput {
    fn from(input: String) -> Self {
        Self::Text(input)
    }
}

impl From<Url> for FetchInput {
    fn from(input: Url) -> Self {
        Self::Parsed(input)
    }
}

impl From<FetchRequest> for FetchInput {
    fn from(input: FetchRequest) -> Self {
        Self::Request(Box::new(input))
    }
}

impl FetchInput {
    /// Resolves the input to a request, joining relative strings against
    /// the base URL when one is configured.
    pub(crate) fn resolve(
        self,
        init: RequestInit,
        base_url: Option<&Url>,
    ) -> Result<FetchRequest, FetchError> {
        match self {
            Self::Parsed(url) => init.apply(url),
            Self::Request(request) => Ok(*request),
            Self::Text(text) => match Url::parse(&text) {
                Ok(url) => init.apply(url),
                Err(url::ParseError::RelativeUrlWithoutBase) => {
                    let base = base_url
                        .ok_or_else(|| FetchError::RelativeUrlWithoutBase(text.clone()))?;
                    let url = base
                        .join(&text)
                        .map_err(|_| FetchError::InvalidUrl(text.clone()))?;
                    init.apply(url)
                }
                Err(_) => Err(FetchError::InvalidUrl(text)),
            },
        }
    }
}
