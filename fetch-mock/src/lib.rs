//! A request-mocking library for Fetch-style HTTP clients.
//!
//! Register [`MockServer`]s scoped to base URLs, declare routes pairing
//! request patterns with responses, then fetch through a [`FetchMocker`]
//! that enforces browser semantics: base-URL resolution, CORS with
//! preflight caching, cookie credentials, and redirect following. A
//! [`MockAgent`] exposes the same pipeline through a Node-style dispatcher
//! callback protocol.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use fetch_mock::{FetchMocker, MockServer};
//!
//! let server = Arc::new(MockServer::new("https://api.example.com")?);
//! server.get("/hello", 200)?;
//!
//! let mocker = FetchMocker::builder().server(server).build()?;
//! let response = mocker.fetch("https://api.example.com/hello").await?;
//! assert_eq!(response.status(), 200);
//! mocker.assert_all_routes_called();
//! # Ok(())
//! # }
//! ```

pub use fetch_mock_core as core;

pub mod agent;
pub mod error;
pub mod global;
mod mocker;
mod preflight;
mod redirect;
mod request;

pub use self::agent::{
    DispatchBody, DispatchHandler, DispatchHeaders, DispatchOptions, HeaderValues, MockAgent,
};
pub use self::error::{
    ConfigError, CorsError, CorsPreflightError, FetchError, NoRouteMatchedError,
};
pub use self::mocker::{FetchMocker, FetchMockerBuilder};
pub use self::request::{
    AbortSignal, CredentialsMode, FetchInput, FetchRequest, RedirectMode, RequestInit,
};

pub use fetch_mock_core::{
    BodyPattern, Cookie, CookieJar, MatchTrace, MockResponse, MockServer, RequestPattern,
    ResponseBody, ResponsePattern, ResponseProducer, SameSite,
};
