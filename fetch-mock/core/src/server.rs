use http::Method;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::pattern::{
    InvalidRequestPattern, IntoResponseProducer, RequestPattern, ResponseContext,
};
use crate::request::ReceivedRequest;
use crate::response::MockResponse;
use crate::route::{RegistrationError, Route};
use crate::trace::MatchTrace;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServerError {
    #[error("base URL {0:?} is not a valid absolute URL")]
    InvalidBaseUrl(String),
}

/// A mock server scoped to one base URL.
///
/// Routes are evaluated in declaration order and are one-shot: once a route
/// has produced a response it is skipped until [`MockServer::clear`].
/// Registration and dispatch take `&self`; the route table lives behind a
/// mutex so servers can be shared between a facade and an agent.
#[derive(Debug)]
pub struct MockServer {
    base_url: Url,
    routes: Mutex<Vec<Route>>,
}

impl MockServer {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ServerError> {
        let raw = base_url.as_ref();
        let base_url = Url::parse(raw)
            .ok()
            .filter(|url| url.has_host())
            .ok_or_else(|| ServerError::InvalidBaseUrl(raw.to_string()))?;
        Ok(Self {
            base_url,
            routes: Mutex::new(Vec::new()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Registers a route from a full pattern (which must name a method).
    pub fn route(
        &self,
        pattern: impl Into<RequestPattern>,
        response: impl IntoResponseProducer,
    ) -> Result<(), RegistrationError> {
        let pattern = pattern.into();
        let producer = response.into_producer()?;
        let route = Route::new(pattern, producer, &self.base_url)?;
        debug!(route = route.title(), "registered");
        self.routes.lock().push(route);
        Ok(())
    }

    fn verb(
        &self,
        method: Method,
        pattern: impl Into<RequestPattern>,
        response: impl IntoResponseProducer,
    ) -> Result<(), RegistrationError> {
        let pattern = pattern.into();
        if let Some(declared) = pattern.method {
            return Err(InvalidRequestPattern::MethodNotAllowed(declared).into());
        }
        self.route(pattern.set_method(method), response)
    }

    pub fn get(
        &self,
        pattern: impl Into<RequestPattern>,
        response: impl IntoResponseProducer,
    ) -> Result<(), RegistrationError> {
        self.verb(Method::GET, pattern, response)
    }

    pub fn post(
        &self,
        pattern: impl Into<RequestPattern>,
        response: impl IntoResponseProducer,
    ) -> Result<(), RegistrationError> {
        self.verb(Method::POST, pattern, response)
    }

    pub fn put(
        &self,
        pattern: impl Into<RequestPattern>,
        response: impl IntoResponseProducer,
    ) -> Result<(), RegistrationError> {
        self.verb(Method::PUT, pattern, response)
    }

    pub fn delete(
        &self,
        pattern: impl Into<RequestPattern>,
        response: impl IntoResponseProducer,
    ) -> Result<(), RegistrationError> {
        self.verb(Method::DELETE, pattern, response)
    }

    pub fn patch(
        &self,
        pattern: impl Into<RequestPattern>,
        response: impl IntoResponseProducer,
    ) -> Result<(), RegistrationError> {
        self.verb(Method::PATCH, pattern, response)
    }

    pub fn head(
        &self,
        pattern: impl Into<RequestPattern>,
        response: impl IntoResponseProducer,
    ) -> Result<(), RegistrationError> {
        self.verb(Method::HEAD, pattern, response)
    }

    pub fn options(
        &self,
        pattern: impl Into<RequestPattern>,
        response: impl IntoResponseProducer,
    ) -> Result<(), RegistrationError> {
        self.verb(Method::OPTIONS, pattern, response)
    }

    /// Dispatches a request: the first unmatched route that accepts it is
    /// consumed and produces the response. `None` when nothing matches.
    pub async fn receive(
        &self,
        request: &ReceivedRequest,
    ) -> anyhow::Result<Option<MockResponse>> {
        let (response, _traces) = self.dispatch(request, false).await?;
        Ok(response)
    }

    /// Same walk as [`MockServer::receive`], but reports a trace for every
    /// unmatched route considered; on a miss, already-consumed routes are
    /// traced too, each ending with an explicit already-called message, so
    /// "why didn't this match?" stays answerable after one-shot
    /// consumption.
    pub async fn trace_receive(
        &self,
        request: &ReceivedRequest,
    ) -> anyhow::Result<(Option<MockResponse>, Vec<MatchTrace>)> {
        self.dispatch(request, true).await
    }

    async fn dispatch(
        &self,
        request: &ReceivedRequest,
        traced: bool,
    ) -> anyhow::Result<(Option<MockResponse>, Vec<MatchTrace>)> {
        let mut traces = Vec::new();
        let matched = {
            let mut routes = self.routes.lock();
            let mut winner = None;
            for route in routes.iter_mut().filter(|r| !r.matched()) {
                let trace = route.trace_matches(request);
                if trace.matches {
                    route.set_matched();
                    winner = Some((route.clone(), trace));
                    break;
                }
                debug!(route = route.title(), "no match");
                if traced {
                    traces.push(trace);
                }
            }

            if winner.is_none() && traced {
                for route in routes.iter().filter(|r| r.matched()) {
                    let mut trace = route.trace_matches(request);
                    trace.matches = false;
                    trace.fail("❌ Route was already called.");
                    traces.push(trace);
                }
            }
            winner
        };

        let (route, trace) = match matched {
            Some(found) => found,
            None => return Ok((None, traces)),
        };

        debug!(route = route.title(), "matched");
        let context = ResponseContext {
            cookies: request.cookies(),
            params: trace.params,
            query: trace.query,
        };
        let response = route.create_response(request, context).await?;
        Ok((Some(response), traces))
    }

    /// Whether a request described by the pattern was already served.
    ///
    /// # Panics
    ///
    /// Panics when the pattern matches no registered route at all; that is
    /// a test-authoring mistake, not a legitimate "false".
    pub fn called(&self, pattern: impl Into<RequestPattern>) -> bool {
        let probe = pattern.into();
        match self.check_called(&probe) {
            Some(matched) => matched,
            None => panic!(
                "pattern {} {} does not match any registered route",
                probe.method.clone().unwrap_or(Method::GET),
                probe.url,
            ),
        }
    }

    /// Like [`MockServer::called`], but reports `None` instead of
    /// panicking when the pattern matches no registered route. The facade
    /// uses this to aggregate across servers.
    pub fn check_called(&self, probe: &RequestPattern) -> Option<bool> {
        let routes = self.routes.lock();
        let mut any = false;
        let mut matched = false;
        for route in routes.iter() {
            if route.matcher().accepts_pattern(probe, &self.base_url) {
                any = true;
                matched |= route.matched();
            }
        }
        any.then_some(matched)
    }

    pub fn all_routes_called(&self) -> bool {
        self.routes.lock().iter().all(Route::matched)
    }

    /// Display strings for routes that have not yet produced a response.
    pub fn uncalled_routes(&self) -> Vec<String> {
        self.routes
            .lock()
            .iter()
            .filter(|r| !r.matched())
            .map(|r| r.title().to_string())
            .collect()
    }

    /// # Panics
    ///
    /// Panics when any route is uncalled, listing them.
    pub fn assert_all_routes_called(&self) {
        let uncalled = self.uncalled_routes();
        if !uncalled.is_empty() {
            panic!("expected all routes to be called; uncalled:\n{}", uncalled.join("\n"));
        }
    }

    /// Removes all routes and their bookkeeping.
    pub fn clear(&self) {
        self.routes.lock().clear();
    }
}
