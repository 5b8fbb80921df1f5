use std::fmt;
use std::str::FromStr;

use http::Method;
use parking_lot::Mutex;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use thiserror::Error;
use url::Url;

const VALID_DOMAIN_REGEX: &str = r"^[a-zA-Z0-9_-]+(\.[a-zA-Z0-9_-]+)*\.[a-zA-Z]{2,}$";

/// `encodeURIComponent`-compatible escaping for cookie names and values.
const COOKIE_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CookieError {
    #[error("cookie must have a name and a value")]
    MissingNameOrValue,

    #[error("cookie domain is required (no bound domain to default to)")]
    MissingDomain,

    #[error("cookie domain {0:?} must be a plain domain name, without scheme or path")]
    InvalidDomain(String),

    #[error("cookie domain {cookie:?} must end with the bound domain {bound:?}")]
    DomainMismatch { cookie: String, bound: String },

    #[error("sameSite=none cookies must also be secure")]
    InsecureSameSiteNone,

    #[error("cookie {0} is already set; delete it first")]
    Duplicate(String),

    #[error("cookie {0} is not set")]
    Unknown(String),

    #[error("credentials base URL {0} has no host")]
    InvalidBaseUrl(Url),

    #[error("{0:?} is not a sameSite value (expected strict, lax, or none)")]
    InvalidSameSite(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl FromStr for SameSite {
    type Err = CookieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            other => Err(CookieError::InvalidSameSite(other.to_string())),
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("strict"),
            Self::Lax => f.write_str("lax"),
            Self::None => f.write_str("none"),
        }
    }
}

/// A cookie as the credential store keeps it.
///
/// Uniqueness is the fingerprint `(name, domain, path, secure)`; two
/// cookies differing in any component coexist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Defaults to the jar's bound domain when absent.
    pub domain: Option<String>,
    /// Defaults to the jar's base path.
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            secure: false,
            http_only: false,
            same_site: SameSite::default(),
        }
    }

    pub fn set_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn set_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn set_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn set_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn set_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }
}

/// A fully-resolved cookie held by a jar. `http_only` is accepted on
/// [`Cookie`] for completeness but carries no weight here: it gates script
/// access to a cookie, not whether the cookie joins a request.
#[derive(Clone, Debug, PartialEq, Eq)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    secure: bool,
    same_site: SameSite,
}

impl StoredCookie {
    fn fingerprint(&self) -> (&str, &str, &str, bool) {
        (&self.name, &self.domain, &self.path, self.secure)
    }

    fn describe(&self) -> String {
        format!("{} ({}; {})", self.name, self.domain, self.path)
    }

    /// Domain, path, and Secure inclusion; the SameSite filter runs after.
    fn matches_url(&self, url: &Url) -> bool {
        let host = match url.host_str() {
            Some(host) => host,
            None => return false,
        };
        if !host.ends_with(&self.domain) {
            return false;
        }
        if !url.path().starts_with(&self.path) {
            return false;
        }
        if self.secure && url.scheme() != "https" {
            return false;
        }
        true
    }

    /// `Strict` drops the cookie whenever a differing `Origin` accompanies
    /// the request; `Lax` only when the method is also non-GET.
    fn passes_same_site(&self, method: &Method, url: &Url, origin: Option<&str>) -> bool {
        let cross_origin = origin
            .map(|origin| origin != url.origin().ascii_serialization())
            .unwrap_or(false);
        match self.same_site {
            SameSite::Strict => !cross_origin,
            SameSite::Lax => !(cross_origin && *method != Method::GET),
            SameSite::None => true,
        }
    }
}

/// The credential store: decides which cookies accompany a request, per
/// domain, path, Secure, and SameSite rules.
#[derive(Debug)]
pub struct CookieJar {
    domain: Option<String>,
    base_path: String,
    cookies: Mutex<Vec<StoredCookie>>,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieJar {
    pub fn new() -> Self {
        Self {
            domain: None,
            base_path: "/".to_string(),
            cookies: Mutex::new(Vec::new()),
        }
    }

    /// A jar bound to a base URL: its host becomes the default (and
    /// required suffix) for cookie domains, its path the default path.
    pub fn bound_to(base: &Url) -> Result<Self, CookieError> {
        let host = base
            .host_str()
            .ok_or_else(|| CookieError::InvalidBaseUrl(base.clone()))?;
        Ok(Self {
            domain: Some(host.to_string()),
            base_path: base.path().to_string(),
            cookies: Mutex::new(Vec::new()),
        })
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Stores a cookie. Rejects fingerprint duplicates and, for a bound
    /// jar, domains that do not end with the bound domain.
    pub fn set_cookie(&self, cookie: Cookie) -> Result<(), CookieError> {
        let stored = self.resolve(cookie)?;

        let mut cookies = self.cookies.lock();
        if cookies
            .iter()
            .any(|existing| existing.fingerprint() == stored.fingerprint())
        {
            return Err(CookieError::Duplicate(stored.describe()));
        }
        cookies.push(stored);
        Ok(())
    }

    /// Removes the cookie with the same fingerprint; errors when absent.
    pub fn delete_cookie(&self, cookie: Cookie) -> Result<(), CookieError> {
        let stored = self.resolve(cookie)?;
        let mut cookies = self.cookies.lock();
        let position = cookies
            .iter()
            .position(|existing| existing.fingerprint() == stored.fingerprint())
            .ok_or_else(|| CookieError::Unknown(stored.describe()))?;
        cookies.remove(position);
        Ok(())
    }

    pub fn clear(&self) {
        self.cookies.lock().clear();
    }

    fn resolve(&self, cookie: Cookie) -> Result<StoredCookie, CookieError> {
        if cookie.name.is_empty() || cookie.value.is_empty() {
            return Err(CookieError::MissingNameOrValue);
        }

        let domain = cookie
            .domain
            .or_else(|| self.domain.clone())
            .ok_or(CookieError::MissingDomain)?;
        let pattern = Regex::new(VALID_DOMAIN_REGEX).expect("domain regex should compile");
        if !pattern.is_match(&domain) {
            return Err(CookieError::InvalidDomain(domain));
        }
        if let Some(bound) = &self.domain {
            if !domain.ends_with(bound.as_str()) {
                return Err(CookieError::DomainMismatch {
                    cookie: domain,
                    bound: bound.clone(),
                });
            }
        }

        if cookie.same_site == SameSite::None && !cookie.secure {
            return Err(CookieError::InsecureSameSiteNone);
        }

        Ok(StoredCookie {
            name: cookie.name,
            value: cookie.value,
            domain,
            path: cookie.path.unwrap_or_else(|| self.base_path.clone()),
            secure: cookie.secure,
            same_site: cookie.same_site,
        })
    }

    /// The `name=value` pairs that accompany a request, in insertion
    /// order. `origin` is the request's `Origin` header, if any.
    pub fn pairs_for_request(
        &self,
        method: &Method,
        url: &Url,
        origin: Option<&str>,
    ) -> Vec<(String, String)> {
        self.cookies
            .lock()
            .iter()
            .filter(|cookie| cookie.matches_url(url))
            .filter(|cookie| cookie.passes_same_site(method, url, origin))
            .map(|cookie| (cookie.name.clone(), cookie.value.clone()))
            .collect()
    }

    /// The assembled `Cookie` header value, when any cookie applies.
    pub fn header_for_request(
        &self,
        method: &Method,
        url: &Url,
        origin: Option<&str>,
    ) -> Option<String> {
        let pairs = self.pairs_for_request(method, url, origin);
        if pairs.is_empty() {
            return None;
        }
        let header = pairs
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(name, COOKIE_ENCODE),
                    utf8_percent_encode(value, COOKIE_ENCODE),
                )
            })
            .collect::<Vec<_>>()
            .join("; ");
        Some(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar() -> CookieJar {
        CookieJar::bound_to(&Url::parse("https://example.com").unwrap()).unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn bound_jar_defaults_cookie_domain() {
        let jar = jar();
        jar.set_cookie(Cookie::new("session", "123")).unwrap();
        let header = jar
            .header_for_request(&Method::GET, &url("https://example.com/"), None)
            .unwrap();
        assert_eq!(header, "session=123");
    }

    #[test]
    fn domain_must_look_like_a_domain() {
        let jar = CookieJar::new();
        let err = jar
            .set_cookie(Cookie::new("a", "b").set_domain("https://example.com"))
            .unwrap_err();
        assert!(matches!(err, CookieError::InvalidDomain(_)));

        let err = jar
            .set_cookie(Cookie::new("a", "b").set_domain("localhost"))
            .unwrap_err();
        assert!(matches!(err, CookieError::InvalidDomain(_)));
    }

    #[test]
    fn foreign_domain_is_rejected_by_bound_jar() {
        let jar = jar();
        let err = jar
            .set_cookie(Cookie::new("a", "b").set_domain("other.org"))
            .unwrap_err();
        assert!(matches!(err, CookieError::DomainMismatch { .. }));

        jar.set_cookie(Cookie::new("a", "b").set_domain("sub.example.com"))
            .unwrap();
    }

    #[test]
    fn same_site_none_requires_secure() {
        let jar = jar();
        let err = jar
            .set_cookie(Cookie::new("a", "b").set_same_site(SameSite::None))
            .unwrap_err();
        assert_eq!(err, CookieError::InsecureSameSiteNone);

        jar.set_cookie(
            Cookie::new("a", "b")
                .set_same_site(SameSite::None)
                .set_secure(true),
        )
        .unwrap();
    }

    #[test]
    fn fingerprint_is_a_strict_equivalence() {
        let jar = jar();
        jar.set_cookie(Cookie::new("session", "1")).unwrap();

        let err = jar.set_cookie(Cookie::new("session", "2")).unwrap_err();
        assert!(matches!(err, CookieError::Duplicate(_)));

        // Any differing fingerprint component coexists.
        jar.set_cookie(Cookie::new("session", "2").set_path("/app"))
            .unwrap();
        jar.set_cookie(Cookie::new("session", "2").set_domain("sub.example.com"))
            .unwrap();
        jar.set_cookie(Cookie::new("session", "2").set_secure(true))
            .unwrap();
    }

    #[test]
    fn delete_requires_an_existing_fingerprint() {
        let jar = jar();
        jar.set_cookie(Cookie::new("session", "1")).unwrap();
        jar.delete_cookie(Cookie::new("session", "1")).unwrap();
        let err = jar.delete_cookie(Cookie::new("session", "1")).unwrap_err();
        assert!(matches!(err, CookieError::Unknown(_)));
    }

    #[test]
    fn secure_cookies_require_https() {
        let jar = jar();
        jar.set_cookie(Cookie::new("token", "x").set_secure(true))
            .unwrap();
        assert!(jar
            .header_for_request(&Method::GET, &url("http://example.com/"), None)
            .is_none());
        assert!(jar
            .header_for_request(&Method::GET, &url("https://example.com/"), None)
            .is_some());
    }

    #[test]
    fn path_prefix_gates_inclusion() {
        let jar = jar();
        jar.set_cookie(Cookie::new("scoped", "1").set_path("/app"))
            .unwrap();
        assert!(jar
            .header_for_request(&Method::GET, &url("https://example.com/"), None)
            .is_none());
        assert!(jar
            .header_for_request(&Method::GET, &url("https://example.com/app/page"), None)
            .is_some());
    }

    #[test]
    fn subdomain_host_matches_parent_domain() {
        let jar = jar();
        jar.set_cookie(Cookie::new("shared", "1")).unwrap();
        assert!(jar
            .header_for_request(&Method::GET, &url("https://sub.example.com/"), None)
            .is_some());
        assert!(jar
            .header_for_request(&Method::GET, &url("https://examplexcom.net/"), None)
            .is_none());
    }

    #[test]
    fn lax_cookie_crosses_origins_only_for_get() {
        let jar = jar();
        jar.set_cookie(Cookie::new("session", "123").set_same_site(SameSite::Lax))
            .unwrap();

        let target = url("https://example.com/");
        let foreign = "https://different-origin.com";
        assert!(jar
            .header_for_request(&Method::GET, &target, Some(foreign))
            .is_some());
        assert!(jar
            .header_for_request(&Method::POST, &target, Some(foreign))
            .is_none());
    }

    #[test]
    fn strict_cookie_never_crosses_origins() {
        let jar = jar();
        jar.set_cookie(Cookie::new("session", "123").set_same_site(SameSite::Strict))
            .unwrap();

        let target = url("https://example.com/");
        assert!(jar
            .header_for_request(&Method::GET, &target, Some("https://different-origin.com"))
            .is_none());
        assert!(jar
            .header_for_request(&Method::GET, &target, Some("https://example.com"))
            .is_some());
    }

    #[test]
    fn header_values_are_percent_encoded() {
        let jar = jar();
        jar.set_cookie(Cookie::new("greeting", "hello world"))
            .unwrap();
        let header = jar
            .header_for_request(&Method::GET, &url("https://example.com/"), None)
            .unwrap();
        assert_eq!(header, "greeting=hello%20world");
    }
}
