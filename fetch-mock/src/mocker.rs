use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use http::header::{HeaderName, HeaderValue, COOKIE, ORIGIN};
use http::Method;
use tracing::debug;
use url::Url;

use fetch_mock_core::cors::{self, CorsViolation};
use fetch_mock_core::{
    CookieJar, CorsPreflightData, MatchTrace, MockResponse, MockServer, ReceivedRequest,
    RequestPattern,
};

use crate::error::{ConfigError, CorsError, CorsPreflightError, FetchError, NoRouteMatchedError};
use crate::global;
use crate::preflight::PreflightCache;
use crate::redirect;
use crate::request::{CredentialsMode, FetchInput, FetchRequest, RedirectMode, RequestInit};

const ACCESS_CONTROL_REQUEST_METHOD: HeaderName =
    HeaderName::from_static("access-control-request-method");
const ACCESS_CONTROL_REQUEST_HEADERS: HeaderName =
    HeaderName::from_static("access-control-request-headers");

/// The fetch facade: composes servers, base-URL resolution, credential
/// attachment, CORS validation, preflight caching, and redirect following
/// into one pipeline mimicking browser fetch semantics.
///
/// Servers are shared, not owned; the preflight cache is exclusively this
/// mocker's.
#[derive(Debug)]
pub struct FetchMocker {
    servers: Vec<Arc<MockServer>>,
    base_url: Option<Url>,
    credentials: Option<Arc<CookieJar>>,
    preflight: PreflightCache,
}

#[derive(Default)]
pub struct FetchMockerBuilder {
    servers: Vec<Arc<MockServer>>,
    base_url: Option<String>,
    credentials: Option<Arc<CookieJar>>,
}

impl FetchMockerBuilder {
    pub fn server(mut self, server: Arc<MockServer>) -> Self {
        self.servers.push(server);
        self
    }

    pub fn servers(mut self, servers: impl IntoIterator<Item = Arc<MockServer>>) -> Self {
        self.servers.extend(servers);
        self
    }

    /// The client-side origin (and optional path prefix) relative requests
    /// resolve against. Required when credentials are provided.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn credentials(mut self, credentials: Arc<CookieJar>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn build(self) -> Result<FetchMocker, ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        let base_url = self
            .base_url
            .map(|raw| {
                Url::parse(&raw)
                    .ok()
                    .filter(|url| url.has_host())
                    .ok_or(ConfigError::InvalidBaseUrl(raw))
            })
            .transpose()?;
        if self.credentials.is_some() && base_url.is_none() {
            return Err(ConfigError::CredentialsWithoutBaseUrl);
        }
        Ok(FetchMocker {
            servers: self.servers,
            base_url,
            credentials: self.credentials,
            preflight: PreflightCache::default(),
        })
    }
}

impl FetchMocker {
    pub fn builder() -> FetchMockerBuilder {
        FetchMockerBuilder::default()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn credentials(&self) -> Option<&Arc<CookieJar>> {
        self.credentials.as_ref()
    }

    /// Callable interchangeably with the platform's fetch.
    pub async fn fetch(
        &self,
        input: impl Into<FetchInput>,
    ) -> Result<MockResponse, FetchError> {
        self.fetch_with(input, RequestInit::default()).await
    }

    pub async fn fetch_with(
        &self,
        input: impl Into<FetchInput>,
        init: RequestInit,
    ) -> Result<MockResponse, FetchError> {
        let request = input.into().resolve(init, self.base_url.as_ref())?;
        self.fetch_request(request).await
    }

    pub async fn fetch_request(&self, request: FetchRequest) -> Result<MockResponse, FetchError> {
        let mut chain = Vec::new();
        self.run(request, &mut chain, false).await
    }

    fn run<'a>(
        &'a self,
        mut request: FetchRequest,
        chain: &'a mut Vec<Url>,
        redirected: bool,
    ) -> BoxFuture<'a, Result<MockResponse, FetchError>> {
        async move {
            request.check_abort()?;

            let origin = self
                .base_url
                .as_ref()
                .map(|base| base.origin().ascii_serialization());
            let cross_origin = self
                .base_url
                .as_ref()
                .map(|base| base.origin() != request.url.origin())
                .unwrap_or(false);

            if cross_origin {
                let origin = origin.as_deref().expect("cross-origin implies a base URL");
                self.apply_cors_request_policy(&mut request, origin).await?;
            } else if request.credentials != CredentialsMode::Omit {
                self.attach_credentials(&mut request, None)?;
            }
            request.check_abort()?;

            let mut response = self.dispatch(&request).await?;
            request.check_abort()?;

            if cross_origin {
                let origin = origin.as_deref().expect("cross-origin implies a base URL");
                cors::validate_allow_origin(response.headers(), origin)
                    .map_err(|violation| CorsError::new(&request.url, origin, violation))?;
                if request.credentials == CredentialsMode::Include {
                    cors::validate_credentialed_response(response.headers())
                        .map_err(|violation| CorsError::new(&request.url, origin, violation))?;
                }
                cors::filter_response_headers(response.headers_mut());
            }

            if response.is_redirect() {
                match request.redirect {
                    RedirectMode::Manual => {
                        return Ok(MockResponse::opaque_redirect(&request.url));
                    }
                    RedirectMode::Error => {
                        return Err(FetchError::RedirectNotAllowed(request.url.clone()));
                    }
                    RedirectMode::Follow => {
                        if let Some(follow_up) =
                            redirect::next_request(&request, &response, chain)?
                        {
                            debug!(from = %request.url, to = %follow_up.url, "redirect");
                            return self.run(follow_up, chain, true).await;
                        }
                    }
                }
            }

            response.set_url(request.url.clone());
            response.set_redirected(redirected);
            Ok(response)
        }
        .boxed()
    }

    /// Cross-origin request-side policy: forbidden method/header checks,
    /// simple-vs-preflighted classification, credential attachment, and the
    /// `Origin` header.
    async fn apply_cors_request_policy(
        &self,
        request: &mut FetchRequest,
        origin: &str,
    ) -> Result<(), FetchError> {
        if cors::is_forbidden_method(&request.method) {
            return Err(CorsError::new(
                &request.url,
                origin,
                CorsViolation::ForbiddenMethod(request.method.to_string()),
            )
            .into());
        }
        for (name, value) in &request.headers {
            if cors::is_forbidden_request_header(name.as_str(), value.to_str().unwrap_or("")) {
                return Err(CorsError::new(
                    &request.url,
                    origin,
                    CorsViolation::ForbiddenHeader(name.to_string()),
                )
                .into());
            }
        }

        if cors::is_simple_request(&request.method, &request.headers) {
            if request.credentials != CredentialsMode::Omit {
                self.attach_credentials(request, Some(origin))?;
            }
        } else {
            let data = match self.preflight.get(&request.url) {
                Some(data) => data,
                None => self.preflight_fetch(request, origin).await?,
            };
            data.validate(&request.method, &request.headers)
                .map_err(|violation| CorsError::new(&request.url, origin, violation))?;
            if request.credentials == CredentialsMode::Include && !data.allow_credentials {
                return Err(CorsError::new(
                    &request.url,
                    origin,
                    CorsViolation::AllowCredentialsRequired(String::new()),
                )
                .into());
            }
            if request.credentials != CredentialsMode::Omit {
                self.attach_credentials(request, Some(origin))?;
            }
        }

        request.headers.insert(ORIGIN, header_value(origin)?);
        Ok(())
    }

    /// An OPTIONS probe through the same server pipeline; grants are
    /// cached per absolute URL until explicitly cleared.
    async fn preflight_fetch(
        &self,
        request: &FetchRequest,
        origin: &str,
    ) -> Result<CorsPreflightData, FetchError> {
        debug!(url = %request.url, "preflight");

        let mut probe = FetchRequest::new(Method::OPTIONS, request.url.clone());
        probe.headers.insert(ORIGIN, header_value(origin)?);
        probe.headers.insert(
            ACCESS_CONTROL_REQUEST_METHOD,
            header_value(request.method.as_str())?,
        );
        let requested = cors::non_simple_headers(&request.headers);
        if !requested.is_empty() {
            probe.headers.insert(
                ACCESS_CONTROL_REQUEST_HEADERS,
                header_value(&requested.join(","))?,
            );
        }

        let response = self.dispatch(&probe).await?;
        if !response.ok() {
            return Err(CorsPreflightError::new(
                &request.url,
                origin,
                "It does not have HTTP ok status.",
            )
            .into());
        }
        cors::validate_allow_origin(response.headers(), origin).map_err(|violation| {
            CorsPreflightError::new(&request.url, origin, violation.to_string())
        })?;

        let data = CorsPreflightData::from_response_headers(response.headers());
        self.preflight.insert(&request.url, data.clone());
        Ok(data)
    }

    /// Walks the servers in order; each gets its own view of the request
    /// so every server may read the body. A miss collects the
    /// partial-match traces into the error.
    async fn dispatch(&self, request: &FetchRequest) -> Result<MockResponse, FetchError> {
        let mut partial: Vec<MatchTrace> = Vec::new();
        for server in &self.servers {
            let received = self.received_view(request)?;
            let (response, traces) = server.trace_receive(&received).await?;
            if let Some(response) = response {
                debug!(url = %request.url, server = %server.base_url(), "matched");
                return Ok(response);
            }
            partial.extend(traces.into_iter().filter(MatchTrace::is_partial_match));
        }

        let dump = self.received_view(request)?.dump();
        Err(NoRouteMatchedError {
            request: dump,
            traces: partial,
        }
        .into())
    }

    fn received_view(&self, request: &FetchRequest) -> Result<ReceivedRequest, FetchError> {
        ReceivedRequest::from_parts(
            request.method.clone(),
            request.url.clone(),
            request.headers.clone(),
            request.body.clone(),
        )
        .map_err(|error| FetchError::Dispatch(anyhow::Error::new(error)))
    }

    /// Adds the `Cookie` header the jar assembles for this request. The
    /// origin is the value the request will carry in its `Origin` header,
    /// which drives the SameSite filter.
    fn attach_credentials(
        &self,
        request: &mut FetchRequest,
        origin: Option<&str>,
    ) -> Result<(), FetchError> {
        let jar = match &self.credentials {
            Some(jar) => jar,
            None => return Ok(()),
        };
        let existing = request
            .headers
            .get(ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let origin = origin.or(existing.as_deref());
        if let Some(header) = jar.header_for_request(&request.method, &request.url, origin) {
            request.headers.insert(COOKIE, header_value(&header)?);
        }
        Ok(())
    }

    /// Whether a request described by the pattern was served by any
    /// server.
    ///
    /// # Panics
    ///
    /// Panics when no server has a route the pattern describes, which is a
    /// test-authoring mistake.
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

    pub fn clear_preflight_cache(&self) {
        self.preflight.clear();
    }

    /// Clears every server's routes, the preflight cache, and the cookie
    /// jar.
    pub fn clear_all(&self) {
        for server in &self.servers {
            server.clear();
        }
        self.preflight.clear();
        if let Some(jar) = &self.credentials {
            jar.clear();
        }
    }

    /// Installs this mocker as the process-global fetch.
    pub fn mock_global(self: &Arc<Self>) {
        global::install(Arc::clone(self));
    }

    /// Restores whatever the global fetch was before the matching
    /// [`FetchMocker::mock_global`].
    pub fn unmock_global(&self) {
        global::uninstall();
    }
}

fn header_value(value: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(value).map_err(|_| FetchError::InvalidHeader(value.to_string()))
}
