//! Request-to-route resolution engine for mocked Fetch clients.
//!
//! A [`MockServer`] owns an ordered, one-shot route table scoped to a base
//! URL. Each [`Route`] pairs a [`RequestPattern`] with a response producer;
//! the matcher emits a per-criterion [`MatchTrace`] for every evaluation so
//! callers can explain near-misses. CORS and cookie policy primitives live
//! here as well; orchestration (the fetch facade and the dispatcher adapter)
//! is layered on top by the `fetch-mock` crate.

pub mod cookies;
pub mod cors;
pub mod matcher;
pub mod pattern;
pub mod request;
pub mod response;
pub mod route;
pub mod server;
pub mod template;
pub mod trace;

pub use http::{
    header::{HeaderName, HeaderValue},
    HeaderMap, Method, StatusCode,
};
pub use url::Url;

pub use self::cookies::{Cookie, CookieJar, SameSite};
pub use self::cors::CorsPreflightData;
pub use self::pattern::{
    BodyPattern, RequestPattern, ResponseBody, ResponseContext, ResponsePattern, ResponseProducer,
};
pub use self::request::{ParsedBody, ReceivedRequest};
pub use self::response::{MockResponse, ResponseKind};
pub use self::route::Route;
pub use self::server::MockServer;
pub use self::trace::MatchTrace;
