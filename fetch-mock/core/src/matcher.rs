use http::Method;
use url::Url;

use crate::pattern::{BodyPattern, RequestPattern};
use crate::request::{ParsedBody, ReceivedRequest};
use crate::template::{TemplateError, UrlTemplate};
use crate::trace::MatchTrace;

/// Decides whether a candidate request satisfies a route's pattern,
/// emitting a per-criterion trace.
///
/// Checks run in a fixed order: URL, method, query, params, headers, body.
/// The URL runs first so a request for a path that simply does not exist
/// produces a single-message trace instead of a noisy one. The first
/// failure halts evaluation.
#[derive(Clone, Debug)]
pub struct RequestMatcher {
    method: Method,
    template: UrlTemplate,
    pattern: RequestPattern,
    title: String,
}

impl RequestMatcher {
    /// Compiles the pattern's URL template against the server base URL.
    /// The pattern must have survived [`RequestPattern::validate`].
    pub fn new(pattern: RequestPattern, base: &Url) -> Result<Self, TemplateError> {
        let method = pattern.method.clone().expect("pattern method is validated");
        let template = UrlTemplate::compile(&pattern.url, base)?;
        let title = format!("{} {}", method, template.resolved());
        Ok(Self {
            method,
            template,
            pattern,
            title,
        })
    }

    /// Display title, `METHOD resolved-url`.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn resolved_url(&self) -> &str {
        self.template.resolved()
    }

    pub fn matches(&self, request: &ReceivedRequest) -> bool {
        self.trace(request).matches
    }

    pub fn trace(&self, request: &ReceivedRequest) -> MatchTrace {
        let mut trace = MatchTrace::new(&self.title);

        // URL
        let params = match self.template.matches(&request.url) {
            Some(params) => {
                trace.pass("✅ URL matches.");
                params
            }
            None => {
                trace.fail(format!(
                    "❌ URL does not match. Expected {} but received {}.",
                    self.template.resolved(),
                    &request.url[..url::Position::AfterPath],
                ));
                return trace;
            }
        };

        // Method
        if self.method != request.method {
            trace.fail(format!(
                "❌ Method does not match. Expected {} but received {}.",
                self.method, request.method,
            ));
            return trace;
        }
        trace.pass("✅ Method matches.");

        // Query
        let query = request.query();
        if let Some(expected) = &self.pattern.query {
            for (name, value) in expected {
                let actual = query.iter().find(|(k, _)| k == name).map(|(_, v)| v);
                if actual.map(String::as_str) != Some(value.as_str()) {
                    trace.fail(format!(
                        "❌ Query string does not match. Expected {name}={value} but received {}.",
                        actual.map(|v| format!("{name}={v}")).unwrap_or_else(|| "nothing".to_string()),
                    ));
                    return trace;
                }
            }
            trace.pass("✅ Query string matches.");
        }

        // Params
        if let Some(expected) = &self.pattern.params {
            for (name, value) in expected {
                let actual = params.get(name);
                if actual.map(String::as_str) != Some(value.as_str()) {
                    trace.fail(format!(
                        "❌ URL parameters do not match. Expected {name}={value} but received {}.",
                        actual.map(|v| format!("{name}={v}")).unwrap_or_else(|| "nothing".to_string()),
                    ));
                    return trace;
                }
            }
            trace.pass("✅ URL parameters match.");
        }

        // Headers
        if let Some(expected) = &self.pattern.headers {
            for (name, value) in expected {
                let actual = request
                    .headers
                    .get(name.to_ascii_lowercase())
                    .and_then(|v| v.to_str().ok());
                if actual != Some(value.as_str()) {
                    trace.fail(format!(
                        "❌ Headers do not match. Expected {name}={value} but received {}.",
                        actual.map(|v| format!("{name}={v}")).unwrap_or_else(|| "nothing".to_string()),
                    ));
                    return trace;
                }
            }
            trace.pass("✅ Headers match.");
        }

        // Body
        if let Some(expected) = &self.pattern.body {
            if !body_matches(expected, &request.body) {
                trace.fail(format!(
                    "❌ Body does not match. Expected {} but received {}.",
                    expected.summary(),
                    request.body.summary(),
                ));
                return trace;
            }
            trace.pass("✅ Body matches.");
        }

        trace.matches = true;
        trace.params = params;
        trace.query = query;
        trace
    }

    /// Whether a request described by `probe` would satisfy this matcher.
    ///
    /// Used by after-the-fact `called()` assertions: the probe's fields are
    /// treated as the request's actual properties, with a GET default
    /// method. A probe URL equal to the route's template text also counts
    /// as a URL match, so callers may assert with the original template.
    pub fn accepts_pattern(&self, probe: &RequestPattern, base: &Url) -> bool {
        let method = probe.method.clone().unwrap_or(Method::GET);
        if method != self.method {
            return false;
        }

        let resolved = match UrlTemplate::compile(&probe.url, base) {
            Ok(template) => template.resolved().to_string(),
            Err(_) => return false,
        };
        let probe_params = if resolved == self.template.resolved() {
            probe
                .params
                .clone()
                .unwrap_or_default()
                .into_iter()
                .collect()
        } else {
            match Url::parse(&resolved).ok().and_then(|u| self.template.matches(&u)) {
                Some(extracted) => extracted,
                None => return false,
            }
        };

        if let Some(expected) = &self.pattern.params {
            if !expected
                .iter()
                .all(|(k, v)| probe_params.get(k).map(String::as_str) == Some(v.as_str()))
            {
                return false;
            }
        }

        if let Some(expected) = &self.pattern.query {
            let probe_query = probe.query.clone().unwrap_or_default();
            if !expected.iter().all(|(k, v)| {
                probe_query
                    .iter()
                    .any(|(pk, pv)| pk == k && pv == v)
            }) {
                return false;
            }
        }

        if let Some(expected) = &self.pattern.headers {
            let probe_headers = probe.headers.clone().unwrap_or_default();
            if !expected.iter().all(|(k, v)| {
                probe_headers
                    .iter()
                    .any(|(pk, pv)| pk.eq_ignore_ascii_case(k) && pv == v)
            }) {
                return false;
            }
        }

        if let Some(expected) = &self.pattern.body {
            let probe_body = match &probe.body {
                Some(body) => body,
                None => return false,
            };
            if !body_pattern_matches(expected, probe_body) {
                return false;
            }
        }

        true
    }
}

fn body_matches(expected: &BodyPattern, actual: &ParsedBody) -> bool {
    match (expected, actual) {
        (BodyPattern::Text(expected), ParsedBody::Text(actual)) => expected == actual,
        (BodyPattern::Text(expected), ParsedBody::Bytes(actual)) => {
            expected.as_bytes() == actual.as_ref()
        }
        (BodyPattern::Bytes(expected), ParsedBody::Bytes(actual)) => expected == actual,
        (BodyPattern::Bytes(expected), ParsedBody::Text(actual)) => {
            expected.as_ref() == actual.as_bytes()
        }
        (BodyPattern::Form(expected), ParsedBody::Form(actual)) => expected
            .iter()
            .all(|(k, v)| actual.iter().any(|(ak, av)| ak == k && av == v)),
        (BodyPattern::Json(expected), ParsedBody::Json(actual)) => json_subset(expected, actual),
        _ => false,
    }
}

fn body_pattern_matches(expected: &BodyPattern, probe: &BodyPattern) -> bool {
    match (expected, probe) {
        (BodyPattern::Form(expected), BodyPattern::Form(probe)) => expected
            .iter()
            .all(|(k, v)| probe.iter().any(|(pk, pv)| pk == k && pv == v)),
        (BodyPattern::Json(expected), BodyPattern::Json(probe)) => json_subset(expected, probe),
        (expected, probe) => expected == probe,
    }
}

/// Recursive structural subset: every key in `expected` must be present in
/// `actual` with the same value; nested objects recurse; scalars and arrays
/// compare strictly.
fn json_subset(expected: &serde_json::Value, actual: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => expected.iter().all(|(key, value)| {
            actual
                .get(key)
                .map(|actual| json_subset(value, actual))
                .unwrap_or(false)
        }),
        (expected, actual) => expected == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use serde_json::json;

    fn base() -> Url {
        Url::parse("https://api.example.com").unwrap()
    }

    fn matcher(pattern: RequestPattern) -> RequestMatcher {
        RequestMatcher::new(pattern, &base()).unwrap()
    }

    fn get(url: &str) -> ReceivedRequest {
        crate::request::tests::request("GET", url)
    }

    #[test]
    fn trace_and_matches_agree() {
        let matcher = matcher(RequestPattern::new("/hello").set_method(Method::GET));
        let hit = get("https://api.example.com/hello");
        let miss = get("https://api.example.com/goodbye");
        assert_eq!(matcher.matches(&hit), matcher.trace(&hit).matches);
        assert_eq!(matcher.matches(&miss), matcher.trace(&miss).matches);
        assert!(matcher.matches(&hit));
        assert!(!matcher.matches(&miss));
    }

    #[test]
    fn url_miss_produces_single_message_trace() {
        let matcher = matcher(RequestPattern::new("/hello").set_method(Method::GET));
        let trace = matcher.trace(&get("https://api.example.com/nope"));
        assert_eq!(trace.messages.len(), 1);
        assert!(trace.messages[0].starts_with("❌ URL does not match."));
        assert!(!trace.is_partial_match());
    }

    #[test]
    fn method_mismatch_reports_both_methods() {
        let matcher = matcher(RequestPattern::new("/hello").set_method(Method::GET));
        let request = crate::request::tests::request("POST", "https://api.example.com/hello");
        let trace = matcher.trace(&request);
        assert_eq!(trace.messages[0], "✅ URL matches.");
        assert_eq!(
            trace.messages[1],
            "❌ Method does not match. Expected GET but received POST."
        );
        assert!(trace.is_partial_match());
    }

    #[test]
    fn query_subset_allows_extra_actual_parameters() {
        let matcher = matcher(
            RequestPattern::new("/search")
                .set_method(Method::GET)
                .set_query("q", "rust"),
        );
        let request = get("https://api.example.com/search?q=rust&page=2");
        assert!(matcher.matches(&request));
    }

    #[test]
    fn missing_query_parameter_fails_with_reason() {
        let matcher = matcher(
            RequestPattern::new("/user/settings")
                .set_method(Method::GET)
                .set_query("page", "profile"),
        );
        let trace = matcher.trace(&get("https://api.example.com/user/settings"));
        assert!(!trace.matches);
        assert!(trace
            .messages
            .last()
            .unwrap()
            .contains("Expected page=profile"));
    }

    #[test]
    fn params_are_extracted_and_compared() {
        let matcher = matcher(
            RequestPattern::new("/user/:id")
                .set_method(Method::GET)
                .set_param("id", "1"),
        );
        assert!(matcher.matches(&get("https://api.example.com/user/1")));

        let trace = matcher.trace(&get("https://api.example.com/user/2"));
        assert!(!trace.matches);
        assert!(trace
            .messages
            .last()
            .unwrap()
            .contains("Expected id=1 but received id=2"));
    }

    #[test]
    fn winning_trace_carries_params_and_query() {
        let matcher = matcher(RequestPattern::new("/user/:id").set_method(Method::GET));
        let trace = matcher.trace(&get("https://api.example.com/user/7?tab=posts"));
        assert!(trace.matches);
        assert_eq!(trace.params["id"], "7");
        assert_eq!(trace.query, vec![("tab".to_string(), "posts".to_string())]);
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let matcher = matcher(
            RequestPattern::new("/hello")
                .set_method(Method::GET)
                .set_header("X-Api-Key", "secret"),
        );
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        let request = ReceivedRequest::from_parts(
            Method::GET,
            Url::parse("https://api.example.com/hello").unwrap(),
            headers,
            None,
        )
        .unwrap();
        assert!(matcher.matches(&request));
    }

    #[test]
    fn text_body_requires_exact_equality() {
        let matcher = matcher(
            RequestPattern::new("/submit")
                .set_method(Method::POST)
                .set_body("exact"),
        );
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let request = ReceivedRequest::from_parts(
            Method::POST,
            Url::parse("https://api.example.com/submit").unwrap(),
            headers.clone(),
            Some(Bytes::from_static(b"exact")),
        )
        .unwrap();
        assert!(matcher.matches(&request));

        let request = ReceivedRequest::from_parts(
            Method::POST,
            Url::parse("https://api.example.com/submit").unwrap(),
            headers,
            Some(Bytes::from_static(b"different")),
        )
        .unwrap();
        assert!(!matcher.matches(&request));
    }

    #[test]
    fn json_body_is_a_structural_subset() {
        let matcher = matcher(
            RequestPattern::new("/submit")
                .set_method(Method::POST)
                .set_body(json!({"user": {"name": "Ada"}})),
        );
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let request = ReceivedRequest::from_parts(
            Method::POST,
            Url::parse("https://api.example.com/submit").unwrap(),
            headers,
            Some(Bytes::from_static(
                br#"{"user": {"name": "Ada", "age": 36}, "extra": 1}"#,
            )),
        )
        .unwrap();
        assert!(matcher.matches(&request));
    }

    #[test]
    fn json_scalar_mismatch_fails() {
        assert!(!json_subset(&json!({"a": 1}), &json!({"a": 2})));
        assert!(!json_subset(&json!([1, 2]), &json!([1, 2, 3])));
        assert!(json_subset(&json!([1, 2]), &json!([1, 2])));
    }

    #[test]
    fn byte_body_compares_length_and_content() {
        let matcher = matcher(
            RequestPattern::new("/upload")
                .set_method(Method::POST)
                .set_body(vec![1u8, 2, 3]),
        );
        let request = ReceivedRequest::from_parts(
            Method::POST,
            Url::parse("https://api.example.com/upload").unwrap(),
            HeaderMap::new(),
            Some(Bytes::from_static(&[1, 2, 3, 4])),
        )
        .unwrap();
        assert!(!matcher.matches(&request));
    }

    #[test]
    fn accepts_pattern_with_concrete_url() {
        let matcher = matcher(
            RequestPattern::new("/user/:id")
                .set_method(Method::GET)
                .set_param("id", "1"),
        );
        assert!(matcher.accepts_pattern(&RequestPattern::new("/user/1"), &base()));
        assert!(!matcher.accepts_pattern(&RequestPattern::new("/user/2"), &base()));
    }

    #[test]
    fn accepts_pattern_with_template_text() {
        let matcher = matcher(RequestPattern::new("/user/:id").set_method(Method::GET));
        assert!(matcher.accepts_pattern(&RequestPattern::new("/user/:id"), &base()));
    }

    #[test]
    fn accepts_pattern_defaults_to_get() {
        let matcher = matcher(RequestPattern::new("/hello").set_method(Method::POST));
        assert!(!matcher.accepts_pattern(&RequestPattern::new("/hello"), &base()));
    }
}
