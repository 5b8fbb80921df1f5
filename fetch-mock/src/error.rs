use std::fmt;

use fetch_mock_core::cors::CorsViolation;
use fetch_mock_core::MatchTrace;
use thiserror::Error;
use url::Url;

/// No registered route accepted the request. The message embeds a full
/// request dump plus every partial-match trace (traces that passed at
/// least one check), the library's primary diagnostic surface.
#[derive(Debug)]
pub struct NoRouteMatchedError {
    pub request: String,
    pub traces: Vec<MatchTrace>,
}

impl std::error::Error for NoRouteMatchedError {}

impl fmt::Display for NoRouteMatchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "No route matched this request.")?;
        writeln!(f)?;
        writeln!(f, "Full request:")?;
        writeln!(f)?;
        writeln!(f, "{}", self.request.trim_end())?;
        if !self.traces.is_empty() {
            writeln!(f)?;
            writeln!(f, "Partial matches:")?;
            for trace in &self.traces {
                writeln!(f)?;
                write!(f, "{trace}")?;
            }
        }
        Ok(())
    }
}

/// A cross-origin request was blocked, with the browser-style message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Access to fetch at '{url}' from origin '{origin}' has been blocked by CORS policy: {reason}")]
pub struct CorsError {
    pub url: Url,
    pub origin: String,
    pub reason: String,
}

impl CorsError {
    pub(crate) fn new(url: &Url, origin: &str, violation: CorsViolation) -> Self {
        Self {
            url: url.clone(),
            origin: origin.to_string(),
            reason: violation.to_string(),
        }
    }
}

/// The OPTIONS probe preceding a non-simple request failed its access
/// control check.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Access to fetch at '{url}' from origin '{origin}' has been blocked by CORS policy: Response to preflight request doesn't pass access control check: {reason}")]
pub struct CorsPreflightError {
    pub url: Url,
    pub origin: String,
    pub reason: String,
}

impl CorsPreflightError {
    pub(crate) fn new(url: &Url, origin: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.clone(),
            origin: origin.to_string(),
            reason: reason.into(),
        }
    }
}

pub(crate) const MAX_REDIRECTS: usize = 20;

/// Everything a fetch through the mocker can fail with. Configuration and
/// registration problems surface synchronously from their own APIs; these
/// are the per-call failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    NoRouteMatched(#[from] NoRouteMatchedError),

    #[error(transparent)]
    Cors(#[from] CorsError),

    #[error(transparent)]
    CorsPreflight(#[from] CorsPreflightError),

    #[error("redirect loop detected at {0}")]
    RedirectLoop(Url),

    #[error("exceeded the limit of {MAX_REDIRECTS} redirects")]
    TooManyRedirects,

    #[error("cross-origin redirect to {0} cannot carry credentials")]
    CredentialedCrossOriginRedirect(Url),

    #[error("redirect mode is 'error' but {0} responded with a redirect")]
    RedirectNotAllowed(Url),

    #[error("request was aborted")]
    Aborted,

    #[error("relative URL {0:?} requires a base URL")]
    RelativeUrlWithoutBase(String),

    #[error("invalid URL {0:?}")]
    InvalidUrl(String),

    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    #[error("agent is closed")]
    AgentClosed,

    #[error("no global fetch mocker is installed")]
    GlobalNotInstalled,

    #[error(transparent)]
    Dispatch(#[from] anyhow::Error),
}

/// Construction-time misconfiguration of a mocker or agent.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one server is required")]
    NoServers,

    #[error("credentials require a base URL")]
    CredentialsWithoutBaseUrl,

    #[error("base URL {0:?} is not a valid absolute URL")]
    InvalidBaseUrl(String),
}
