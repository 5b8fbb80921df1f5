use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method};
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum BodyReadError {
    #[error("request body declared {0:?} but is not valid JSON: {1}")]
    InvalidJson(String, serde_json::Error),

    #[error("multipart request body is missing a boundary")]
    MissingBoundary,
}

/// A request body decoded according to its `content-type`.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum ParsedBody {
    #[default]
    None,
    Text(String),
    Json(Value),
    Form(Vec<(String, String)>),
    Bytes(Bytes),
}

impl ParsedBody {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub(crate) fn summary(&self) -> String {
        match self {
            Self::None => "no body".to_string(),
            Self::Text(text) => format!("text {text:?}"),
            Self::Json(value) => format!("JSON {value}"),
            Self::Form(fields) => format!("form data with {} field(s)", fields.len()),
            Self::Bytes(bytes) => format!("{} byte(s)", bytes.len()),
        }
    }
}

/// An incoming request as the matching engine sees it: method, absolute
/// URL, headers, and the decoded body.
#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: ParsedBody,
}

impl ReceivedRequest {
    /// Decodes the raw body per the request's `content-type`:
    /// `text/*` as text, `application/json` as JSON,
    /// `application/x-www-form-urlencoded` and `multipart/form-data` as
    /// form fields, anything else as raw bytes.
    pub fn from_parts(
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Self, BodyReadError> {
        let body = match body.filter(|b| !b.is_empty()) {
            None => ParsedBody::None,
            Some(raw) => {
                let content_type = headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let essence = content_type
                    .split(';')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_ascii_lowercase();

                if essence.starts_with("text/") {
                    ParsedBody::Text(String::from_utf8_lossy(&raw).into_owned())
                } else if essence == "application/json" {
                    let value = serde_json::from_slice(&raw)
                        .map_err(|e| BodyReadError::InvalidJson(essence.clone(), e))?;
                    ParsedBody::Json(value)
                } else if essence == "application/x-www-form-urlencoded" {
                    let fields = form_urlencoded::parse(&raw)
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect();
                    ParsedBody::Form(fields)
                } else if essence == "multipart/form-data" {
                    let boundary = boundary_param(&content_type)
                        .ok_or(BodyReadError::MissingBoundary)?;
                    ParsedBody::Form(parse_multipart(&raw, &boundary))
                } else {
                    ParsedBody::Bytes(raw)
                }
            }
        };

        Ok(Self {
            method,
            url,
            headers,
            body,
        })
    }

    /// Parsed query pairs, decoded from the URL.
    pub fn query(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// `name=value` pairs from the request's `Cookie` header.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get(http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(|value| {
                value
                    .split(';')
                    .filter_map(|pair| {
                        let (name, value) = pair.trim().split_once('=')?;
                        Some((name.to_string(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A multi-line dump of the request for diagnostic messages.
    pub fn dump(&self) -> String {
        let mut out = format!("{} {}\n", self.method, self.url);
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\n", name, value.to_str().unwrap_or("?")));
        }
        if !self.body.is_none() {
            out.push('\n');
            out.push_str(&self.body.summary());
            out.push('\n');
        }
        out
    }
}

fn boundary_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if name.trim() != "boundary" {
            return None;
        }
        Some(value.trim().trim_matches('"').to_string())
    })
}

/// Minimal `multipart/form-data` field extraction: text fields only, per
/// the boundary grammar. Parts without a `name` are skipped.
fn parse_multipart(raw: &[u8], boundary: &str) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(raw);
    let delimiter = format!("--{boundary}");

    text.split(delimiter.as_str())
        .filter_map(|part| {
            let part = part.strip_prefix("\r\n").unwrap_or(part);
            if part.is_empty() || part.starts_with("--") {
                return None;
            }
            let (head, value) = part.split_once("\r\n\r\n")?;
            let name = head.lines().find_map(|line| {
                let (header, rest) = line.split_once(':')?;
                if !header.eq_ignore_ascii_case("content-disposition") {
                    return None;
                }
                rest.split(';').find_map(|param| {
                    let (key, value) = param.trim().split_once('=')?;
                    (key.trim() == "name").then(|| value.trim().trim_matches('"').to_string())
                })
            })?;
            let value = value.strip_suffix("\r\n").unwrap_or(value);
            Some((name, value.to_string()))
        })
        .collect()
}
