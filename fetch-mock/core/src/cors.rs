use http::header::{HeaderMap, HeaderName};
use http::Method;
use thiserror::Error;

/// Methods that never require a preflight.
const SIMPLE_METHODS: &[&str] = &["GET", "HEAD", "POST"];

/// Methods a CORS client may never issue.
const FORBIDDEN_METHODS: &[&str] = &["CONNECT", "TRACE", "TRACK"];

/// Request headers a simple request may carry (subject to value checks for
/// `content-type` and `range`).
const SAFELISTED_REQUEST_HEADERS: &[&str] = &[
    "accept",
    "accept-language",
    "content-language",
    "content-type",
    "range",
];

/// Header names the client controls; user code may never set these.
const FORBIDDEN_REQUEST_HEADERS: &[&str] = &[
    "accept-charset",
    "accept-encoding",
    "access-control-request-headers",
    "access-control-request-method",
    "connection",
    "content-length",
    "cookie",
    "cookie2",
    "date",
    "dnt",
    "expect",
    "host",
    "keep-alive",
    "origin",
    "referer",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "via",
];

/// Headers that smuggle a method; forbidden when they name a forbidden one.
const METHOD_OVERRIDE_HEADERS: &[&str] =
    &["x-http-method", "x-http-method-override", "x-method-override"];

/// Response headers every cross-origin caller may read.
const SAFELISTED_RESPONSE_HEADERS: &[&str] = &[
    "cache-control",
    "content-language",
    "content-type",
    "expires",
    "last-modified",
    "pragma",
];

/// Response headers never exposed cross-origin.
const FORBIDDEN_RESPONSE_HEADERS: &[&str] = &["set-cookie", "set-cookie2"];

const SIMPLE_CONTENT_TYPES: &[&str] = &[
    "application/x-www-form-urlencoded",
    "multipart/form-data",
    "text/plain",
];

const EXPOSE_HEADERS: &str = "access-control-expose-headers";

/// Why a CORS check failed; rendered into the facade's error message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CorsViolation {
    #[error("Method {0} is not allowed.")]
    ForbiddenMethod(String),

    #[error("Header {0} is not allowed.")]
    ForbiddenHeader(String),

    #[error("No 'Access-Control-Allow-Origin' header is present on the requested resource.")]
    MissingAllowOrigin,

    #[error("The 'Access-Control-Allow-Origin' header contains multiple values '{0}', but only one is allowed.")]
    MultipleAllowOrigin(String),

    #[error("The 'Access-Control-Allow-Origin' header has a value '{0}' that is not equal to the supplied origin.")]
    AllowOriginMismatch(String),

    #[error("The value of the 'Access-Control-Allow-Credentials' header in the response is '{0}' which must be 'true' when the request's credentials mode is 'include'.")]
    AllowCredentialsRequired(String),

    #[error("The '{0}' header has a wildcard value which is not allowed when the request's credentials mode is 'include'.")]
    WildcardWithCredentials(&'static str),

    #[error("Method {0} is not allowed by Access-Control-Allow-Methods in preflight response.")]
    MethodNotPreflighted(String),

    #[error("Request header field {0} is not allowed by Access-Control-Allow-Headers in preflight response.")]
    HeaderNotPreflighted(String),
}

pub fn is_simple_method(method: &Method) -> bool {
    SIMPLE_METHODS.contains(&method.as_str())
}

pub fn is_forbidden_method(method: &Method) -> bool {
    FORBIDDEN_METHODS
        .iter()
        .any(|m| method.as_str().eq_ignore_ascii_case(m))
}

/// A single `bytes=` range: `N-M`, `N-`, or `-M`.
pub fn is_simple_range(value: &str) -> bool {
    let Some(spec) = value.strip_prefix("bytes=") else {
        return false;
    };
    let Some((start, end)) = spec.split_once('-') else {
        return false;
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match (start.is_empty(), end.is_empty()) {
        (true, true) => false,
        (true, false) => digits(end),
        (false, true) => digits(start),
        (false, false) => digits(start) && digits(end),
    }
}

/// Whether a request header is CORS-safelisted, value included:
/// `content-type` only with a simple essence, `range` only with a single
/// `bytes=` range.
pub fn is_safelisted_request_header(name: &str, value: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if !SAFELISTED_REQUEST_HEADERS.contains(&name.as_str()) {
        return false;
    }
    match name.as_str() {
        "content-type" => {
            let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            SIMPLE_CONTENT_TYPES.contains(&essence.as_str())
        }
        "range" => is_simple_range(value),
        _ => true,
    }
}

/// Whether the header may not be set by user code at all: the fixed
/// forbidden set, any `proxy-`/`sec-` prefix, and method-override headers
/// naming a forbidden method.
pub fn is_forbidden_request_header(name: &str, value: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if FORBIDDEN_REQUEST_HEADERS.contains(&name.as_str()) {
        return true;
    }
    if name.starts_with("proxy-") || name.starts_with("sec-") {
        return true;
    }
    if METHOD_OVERRIDE_HEADERS.contains(&name.as_str()) {
        let named = value.trim();
        return FORBIDDEN_METHODS
            .iter()
            .any(|m| named.eq_ignore_ascii_case(m));
    }
    false
}

/// A request is simple iff its method is simple and every header is
/// safelisted (value checks included); simple requests skip preflight.
pub fn is_simple_request(method: &Method, headers: &HeaderMap) -> bool {
    if !is_simple_method(method) {
        return false;
    }
    headers.iter().all(|(name, value)| {
        value
            .to_str()
            .map(|value| is_safelisted_request_header(name.as_str(), value))
            .unwrap_or(false)
    })
}

/// The header names that force a preflight, lowercase and sorted, for
/// `Access-Control-Request-Headers`.
pub fn non_simple_headers(headers: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = headers
        .iter()
        .filter(|(name, value)| {
            !value
                .to_str()
                .map(|value| is_safelisted_request_header(name.as_str(), value))
                .unwrap_or(false)
        })
        .map(|(name, _)| name.as_str().to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// The response must name the caller's origin (or `*`), exactly once.
pub fn validate_allow_origin(headers: &HeaderMap, origin: &str) -> Result<(), CorsViolation> {
    let value = headers
        .get("access-control-allow-origin")
        .and_then(|v| v.to_str().ok())
        .ok_or(CorsViolation::MissingAllowOrigin)?;
    if value.contains(',') {
        return Err(CorsViolation::MultipleAllowOrigin(value.to_string()));
    }
    if value != "*" && value != origin {
        return Err(CorsViolation::AllowOriginMismatch(value.to_string()));
    }
    Ok(())
}

/// Credentialed responses must opt in explicitly and may not hide behind
/// wildcards.
pub fn validate_credentialed_response(headers: &HeaderMap) -> Result<(), CorsViolation> {
    let credentials = headers
        .get("access-control-allow-credentials")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if credentials != "true" {
        return Err(CorsViolation::AllowCredentialsRequired(
            credentials.to_string(),
        ));
    }

    for name in [
        "access-control-allow-origin",
        "access-control-allow-headers",
        "access-control-allow-methods",
        "access-control-expose-headers",
    ] {
        let value = headers.get(name).and_then(|v| v.to_str().ok());
        if value == Some("*") {
            let header = match name {
                "access-control-allow-origin" => "Access-Control-Allow-Origin",
                "access-control-allow-headers" => "Access-Control-Allow-Headers",
                "access-control-allow-methods" => "Access-Control-Allow-Methods",
                _ => "Access-Control-Expose-Headers",
            };
            return Err(CorsViolation::WildcardWithCredentials(header));
        }
    }
    Ok(())
}

/// Strips a cross-origin response down to what the caller may read: the
/// safelist plus anything in `Access-Control-Expose-Headers` (which itself
/// survives, keeping the filter idempotent). Forbidden response headers
/// are always dropped.
pub fn filter_response_headers(headers: &mut HeaderMap) {
    let exposed: Vec<String> = headers
        .get(EXPOSE_HEADERS)
        .and_then(|v| v.to_str().ok())
        .map(|list| {
            list.split(',')
                .map(|name| name.trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let keep: Vec<HeaderName> = headers
        .keys()
        .filter(|name| {
            let name = name.as_str();
            if FORBIDDEN_RESPONSE_HEADERS.contains(&name) {
                return false;
            }
            name == EXPOSE_HEADERS
                || SAFELISTED_RESPONSE_HEADERS.contains(&name)
                || exposed.iter().any(|exposed| exposed == name)
        })
        .cloned()
        .collect();

    let mut filtered = HeaderMap::new();
    for name in keep {
        for value in headers.get_all(&name) {
            filtered.append(name.clone(), value.clone());
        }
    }
    *headers = filtered;
}

/// What an OPTIONS probe granted, parsed from its response headers and
/// cached per request URL by the facade.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsPreflightData {
    pub allowed_methods: Vec<String>,
    pub allow_all_methods: bool,
    pub allowed_headers: Vec<String>,
    pub allow_all_headers: bool,
    pub allow_credentials: bool,
    /// `None` means unbounded; `Access-Control-Max-Age` that fails to
    /// parse defaults to unbounded.
    pub max_age: Option<u64>,
}

impl CorsPreflightData {
    pub fn from_response_headers(headers: &HeaderMap) -> Self {
        let list = |name: &str| -> Vec<String> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|value| {
                    value
                        .split(',')
                        .map(|item| item.trim().to_string())
                        .filter(|item| !item.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };

        let allowed_methods: Vec<String> = list("access-control-allow-methods")
            .into_iter()
            .map(|m| m.to_ascii_uppercase())
            .collect();
        let allow_all_methods = allowed_methods.iter().any(|m| m == "*");
        let allowed_headers: Vec<String> = list("access-control-allow-headers")
            .into_iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        let allow_all_headers = allowed_headers.iter().any(|h| h == "*");
        let allow_credentials = headers
            .get("access-control-allow-credentials")
            .and_then(|v| v.to_str().ok())
            == Some("true");
        let max_age = headers
            .get("access-control-max-age")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());

        Self {
            allowed_methods,
            allow_all_methods,
            allowed_headers,
            allow_all_headers,
            allow_credentials,
            max_age,
        }
    }

    /// Validates the actual request against what the preflight granted.
    /// `authorization` is never covered by a wildcard.
    pub fn validate(&self, method: &Method, headers: &HeaderMap) -> Result<(), CorsViolation> {
        if !is_simple_method(method)
            && !self.allow_all_methods
            && !self
                .allowed_methods
                .iter()
                .any(|m| m == method.as_str())
        {
            return Err(CorsViolation::MethodNotPreflighted(
                method.as_str().to_string(),
            ));
        }

        for (name, value) in headers {
            let name = name.as_str();
            if matches!(name, "accept" | "accept-language" | "content-language") {
                continue;
            }
            let listed = self.allowed_headers.iter().any(|h| h == name);
            if name == "authorization" {
                if !listed {
                    return Err(CorsViolation::HeaderNotPreflighted(name.to_string()));
                }
                continue;
            }
            if value
                .to_str()
                .map(|value| is_safelisted_request_header(name, value))
                .unwrap_or(false)
            {
                continue;
            }
            if !listed && !self.allow_all_headers {
                return Err(CorsViolation::HeaderNotPreflighted(name.to_string()));
            }
        }
        Ok(())
    }
}
