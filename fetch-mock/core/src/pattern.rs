use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::request::ReceivedRequest;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidRequestPattern {
    #[error("request pattern must have a URL")]
    MissingUrl,

    #[error("request pattern must have a method")]
    MissingMethod,

    #[error("{0} already names a method; use route() to register it")]
    MethodNotAllowed(Method),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidResponsePattern {
    #[error("{0} is not a recognized HTTP status code")]
    UnknownStatus(u16),
}

/// The body a route expects, compared per variant:
///
/// * `Text`: exact string equality.
/// * `Form`: every expected pair must be present in the actual form data;
///   extra actual fields are ignored.
/// * `Bytes`: byte-for-byte equality, length included.
/// * `Json`: recursive structural subset. Every expected key must be
///   present with the same value; nested objects recurse; scalars and
///   arrays compare strictly.
#[derive(Clone, Debug, PartialEq)]
pub enum BodyPattern {
    Text(String),
    Form(Vec<(String, String)>),
    Bytes(Bytes),
    Json(Value),
}

impl BodyPattern {
    pub(crate) fn summary(&self) -> String {
        match self {
            Self::Text(text) => format!("text {text:?}"),
            Self::Form(fields) => format!("form data with {} field(s)", fields.len()),
            Self::Bytes(bytes) => format!("{} byte(s)", bytes.len()),
            Self::Json(value) => format!("JSON {value}"),
        }
    }
}

impl From<&str> for BodyPattern {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for BodyPattern {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for BodyPattern {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Bytes> for BodyPattern {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for BodyPattern {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

/// What a route declares about the requests it accepts.
///
/// `url` may be an absolute URL or a path template with `:name` variables,
/// resolved against the owning server's base URL. All other criteria are
/// optional; absent criteria always pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestPattern {
    pub method: Option<Method>,
    pub url: String,
    pub headers: Option<Vec<(String, String)>>,
    pub query: Option<Vec<(String, String)>>,
    pub params: Option<Vec<(String, String)>>,
    pub body: Option<BodyPattern>,
}

impl RequestPattern {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn set_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn set_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn set_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn set_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn set_body(mut self, body: impl Into<BodyPattern>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), InvalidRequestPattern> {
        if self.url.is_empty() {
            return Err(InvalidRequestPattern::MissingUrl);
        }
        if self.method.is_none() {
            return Err(InvalidRequestPattern::MissingMethod);
        }
        Ok(())
    }
}

impl From<&str> for RequestPattern {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for RequestPattern {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Text(String),
    Json(Value),
    Bytes(Bytes),
}

impl From<&str> for ResponseBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for ResponseBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

/// What a route produces literally: a validated status plus optional
/// headers, body, and delivery delay.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponsePattern {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Option<ResponseBody>,
    pub delay: Option<Duration>,
}

impl ResponsePattern {
    /// Builds a pattern, rejecting status codes outside the registered set.
    pub fn new(status: u16) -> Result<Self, InvalidResponsePattern> {
        let status = StatusCode::from_u16(status)
            .ok()
            .filter(|s| s.canonical_reason().is_some())
            .ok_or(InvalidResponsePattern::UnknownStatus(status))?;
        Ok(Self {
            status,
            headers: Vec::new(),
            body: None,
            delay: None,
        })
    }

    pub fn set_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn set_body(mut self, body: impl Into<ResponseBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn set_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Context handed to response creators alongside the request.
#[derive(Clone, Debug, Default)]
pub struct ResponseContext {
    /// `name=value` pairs from the request's `Cookie` header.
    pub cookies: Vec<(String, String)>,
    /// Bindings extracted by the route's URL template.
    pub params: HashMap<String, String>,
    /// The request's parsed query pairs.
    pub query: Vec<(String, String)>,
}

type CreatorFn = dyn Fn(ReceivedRequest, ResponseContext) -> BoxFuture<'static, anyhow::Result<ResponsePattern>>
    + Send
    + Sync;

/// A response specification: either a literal pattern or a creator function
/// invoked per match (to support stateful responses).
#[derive(Clone)]
pub enum ResponseProducer {
    Literal(ResponsePattern),
    Creator(Arc<CreatorFn>),
}

impl ResponseProducer {
    /// Wraps a synchronous creator returning a pattern or bare status.
    pub fn from_fn<F, R>(creator: F) -> Self
    where
        F: Fn(ReceivedRequest, ResponseContext) -> R + Send + Sync + 'static,
        R: IntoResponsePattern,
    {
        Self::Creator(Arc::new(move |request, context| {
            let pattern = creator(request, context).into_response_pattern();
            async move { pattern.map_err(Into::into) }.boxed()
        }))
    }

    /// Wraps an asynchronous creator returning a pattern or bare status.
    pub fn from_async_fn<F, Fut, R>(creator: F) -> Self
    where
        F: Fn(ReceivedRequest, ResponseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponsePattern,
    {
        Self::Creator(Arc::new(move |request, context| {
            let fut = creator(request, context);
            async move { fut.await.into_response_pattern().map_err(Into::into) }.boxed()
        }))
    }

    /// The literal pattern, when one was declared (used for reporting).
    pub fn literal(&self) -> Option<&ResponsePattern> {
        match self {
            Self::Literal(pattern) => Some(pattern),
            Self::Creator(_) => None,
        }
    }

    pub(crate) async fn resolve(
        &self,
        request: ReceivedRequest,
        context: ResponseContext,
    ) -> anyhow::Result<ResponsePattern> {
        match self {
            Self::Literal(pattern) => Ok(pattern.clone()),
            Self::Creator(creator) => creator(request, context).await,
        }
    }
}

impl fmt::Debug for ResponseProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(pattern) => f.debug_tuple("Literal").field(pattern).finish(),
            Self::Creator(_) => f.debug_tuple("Creator").finish(),
        }
    }
}

/// Conversion into a literal [`ResponsePattern`]; implemented for bare
/// status codes so creators may return either form.
pub trait IntoResponsePattern {
    fn into_response_pattern(self) -> Result<ResponsePattern, InvalidResponsePattern>;
}

impl IntoResponsePattern for ResponsePattern {
    fn into_response_pattern(self) -> Result<ResponsePattern, InvalidResponsePattern> {
        Ok(self)
    }
}

impl IntoResponsePattern for u16 {
    fn into_response_pattern(self) -> Result<ResponsePattern, InvalidResponsePattern> {
        ResponsePattern::new(self)
    }
}

impl IntoResponsePattern for StatusCode {
    fn into_response_pattern(self) -> Result<ResponsePattern, InvalidResponsePattern> {
        ResponsePattern::new(self.as_u16())
    }
}

/// Conversion into a [`ResponseProducer`], accepted anywhere a route
/// response is declared.
pub trait IntoResponseProducer {
    fn into_producer(self) -> Result<ResponseProducer, InvalidResponsePattern>;
}

impl IntoResponseProducer for ResponseProducer {
    fn into_producer(self) -> Result<ResponseProducer, InvalidResponsePattern> {
        Ok(self)
    }
}

impl IntoResponseProducer for ResponsePattern {
    fn into_producer(self) -> Result<ResponseProducer, InvalidResponsePattern> {
        Ok(ResponseProducer::Literal(self))
    }
}

impl IntoResponseProducer for u16 {
    fn into_producer(self) -> Result<ResponseProducer, InvalidResponsePattern> {
        Ok(ResponseProducer::Literal(self.into_response_pattern()?))
    }
}

impl IntoResponseProducer for StatusCode {
    fn into_producer(self) -> Result<ResponseProducer, InvalidResponsePattern> {
        Ok(ResponseProducer::Literal(self.into_response_pattern()?))
    }
}
