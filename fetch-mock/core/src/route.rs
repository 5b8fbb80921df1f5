use thiserror::Error;
use url::Url;

use crate::matcher::RequestMatcher;
use crate::pattern::{
    InvalidRequestPattern, InvalidResponsePattern, RequestPattern, ResponseContext,
    ResponsePattern, ResponseProducer,
};
use crate::request::ReceivedRequest;
use crate::response::MockResponse;
use crate::template::TemplateError;
use crate::trace::MatchTrace;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error(transparent)]
    Request(#[from] InvalidRequestPattern),

    #[error(transparent)]
    Response(#[from] InvalidResponsePattern),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// A request pattern paired with a response producer.
///
/// A route's lifecycle begins at registration and ends only when the owning
/// server is cleared. Its `matched` flag is set on the first successful
/// dispatch and never cleared except by `clear()` (one-shot semantics).
#[derive(Clone, Debug)]
pub struct Route {
    pattern: RequestPattern,
    /// The literal response pattern when one was declared, kept for
    /// reporting; creators have no literal form.
    response: Option<ResponsePattern>,
    producer: ResponseProducer,
    matcher: RequestMatcher,
    matched: bool,
}

impl Route {
    pub(crate) fn new(
        pattern: RequestPattern,
        producer: ResponseProducer,
        base: &Url,
    ) -> Result<Self, RegistrationError> {
        pattern.validate()?;
        let matcher = RequestMatcher::new(pattern.clone(), base)?;
        let response = producer.literal().cloned();
        Ok(Self {
            pattern,
            response,
            producer,
            matcher,
            matched: false,
        })
    }

    pub fn pattern(&self) -> &RequestPattern {
        &self.pattern
    }

    /// The declared literal response, when the route was not registered
    /// with a creator function.
    pub fn response(&self) -> Option<&ResponsePattern> {
        self.response.as_ref()
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    pub(crate) fn set_matched(&mut self) {
        self.matched = true;
    }

    pub fn title(&self) -> &str {
        self.matcher.title()
    }

    pub fn matches(&self, request: &ReceivedRequest) -> bool {
        self.matcher.matches(request)
    }

    pub fn trace_matches(&self, request: &ReceivedRequest) -> MatchTrace {
        self.matcher.trace(request)
    }

    pub(crate) fn matcher(&self) -> &RequestMatcher {
        &self.matcher
    }

    /// Resolves the producer and builds the response. The context carries
    /// the bindings the winning trace extracted.
    pub async fn create_response(
        &self,
        request: &ReceivedRequest,
        context: ResponseContext,
    ) -> anyhow::Result<MockResponse> {
        let pattern = self.producer.resolve(request.clone(), context).await?;
        Ok(MockResponse::from_pattern(&pattern, &request.url).await)
    }
}
