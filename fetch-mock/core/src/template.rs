use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;
use url::Url;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("URL template must not be empty")]
    Empty,

    #[error("URL template variable names must be non-empty and alphanumeric: {0:?}")]
    BadVariable(String),

    #[error("URL template declares variable {0:?} more than once")]
    DuplicateVariable(String),

    #[error("URL template {0:?} cannot be resolved against {1}: {2}")]
    Unresolvable(String, Url, url::ParseError),
}

/// A compiled `/users/:id` style URL template, resolved against a server's
/// base URL.
///
/// A leading slash on the template is stripped and the base URL is made to
/// end with a slash, so the template always joins as a relative path. An
/// absolute template URL bypasses the base entirely.
#[derive(Clone, Debug)]
pub struct UrlTemplate {
    /// The resolved URL with `:name` variables intact, used for display.
    resolved: String,
    regex: Regex,
    names: Vec<String>,
}

impl UrlTemplate {
    pub fn compile(template: &str, base: &Url) -> Result<Self, TemplateError> {
        if template.is_empty() {
            return Err(TemplateError::Empty);
        }

        let resolved = resolve(template, base)?;
        let (pattern, names) = to_regex(&resolved)?;
        let regex = Regex::new(&pattern).expect("template regex should compile");

        Ok(Self {
            resolved,
            regex,
            names,
        })
    }

    /// The resolved template URL, with variables intact.
    pub fn resolved(&self) -> &str {
        &self.resolved
    }

    pub fn has_variables(&self) -> bool {
        !self.names.is_empty()
    }

    /// Matches a candidate URL (scheme, host, and path; query and fragment
    /// are ignored) and extracts the variable bindings.
    pub fn matches(&self, url: &Url) -> Option<HashMap<String, String>> {
        let target = url[..url::Position::AfterPath].to_string();
        let captures = self.regex.captures(&target)?;
        let params = self
            .names
            .iter()
            .map(|name| {
                let value = captures
                    .name(name)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                (name.clone(), value)
            })
            .collect();
        Some(params)
    }
}

fn resolve(template: &str, base: &Url) -> Result<String, TemplateError> {
    if let Ok(absolute) = Url::parse(template) {
        if absolute.has_host() {
            return Ok(absolute[..url::Position::AfterPath].to_string());
        }
    }

    let relative = template.strip_prefix('/').unwrap_or(template);
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    let resolved = base
        .join(relative)
        .map_err(|source| TemplateError::Unresolvable(template.to_string(), base.clone(), source))?;
    Ok(resolved[..url::Position::AfterPath].to_string())
}

/// Translates the resolved template into an anchored regex, turning each
/// `:name` path segment into a named capture group.
fn to_regex(resolved: &str) -> Result<(String, Vec<String>), TemplateError> {
    let mut pattern = String::from("^");
    let mut names = Vec::new();
    let mut rest = resolved;

    while let Some(at) = rest.find(':') {
        let (literal, tail) = rest.split_at(at);
        pattern.push_str(&regex::escape(literal));

        let tail = &tail[1..];
        let end = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(tail.len());
        let name = &tail[..end];
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(TemplateError::BadVariable(resolved.to_string()));
        }
        if names.iter().any(|n| n == name) {
            return Err(TemplateError::DuplicateVariable(name.to_string()));
        }
        names.push(name.to_string());
        pattern.push_str(&format!("(?P<{name}>[^/]+)"));
        rest = &tail[end..];
    }

    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Ok((pattern, names))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://api.example.com").unwrap()
    }

    #[test]
    fn joins_relative_template_against_base() {
        let template = UrlTemplate::compile("/hello", &base()).unwrap();
        assert_eq!(template.resolved(), "https://api.example.com/hello");
    }

    #[test]
    fn joins_against_base_with_path_prefix() {
        let base = Url::parse("https://api.example.com/v1").unwrap();
        let template = UrlTemplate::compile("/hello", &base).unwrap();
        assert_eq!(template.resolved(), "https://api.example.com/v1/hello");
    }

    #[test]
    fn absolute_template_ignores_base() {
        let template = UrlTemplate::compile("https://other.example.com/x", &base()).unwrap();
        assert_eq!(template.resolved(), "https://other.example.com/x");
    }

    #[test]
    fn extracts_named_parameters() {
        let template = UrlTemplate::compile("/users/:id/posts/:post", &base()).unwrap();
        let url = Url::parse("https://api.example.com/users/42/posts/7").unwrap();
        let params = template.matches(&url).unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params["post"], "7");
    }

    #[test]
    fn parameter_does_not_cross_segments() {
        let template = UrlTemplate::compile("/users/:id", &base()).unwrap();
        let url = Url::parse("https://api.example.com/users/42/extra").unwrap();
        assert!(template.matches(&url).is_none());
    }

    #[test]
    fn query_is_ignored_when_matching() {
        let template = UrlTemplate::compile("/search", &base()).unwrap();
        let url = Url::parse("https://api.example.com/search?q=rust").unwrap();
        assert!(template.matches(&url).is_some());
    }

    #[test]
    fn literal_dots_are_escaped() {
        let template = UrlTemplate::compile("/file.json", &base()).unwrap();
        let url = Url::parse("https://api.example.com/fileXjson").unwrap();
        assert!(template.matches(&url).is_none());
    }

    #[test]
    fn duplicate_variables_are_rejected() {
        let err = UrlTemplate::compile("/:id/:id", &base()).unwrap_err();
        assert_eq!(err, TemplateError::DuplicateVariable("id".to_string()));
    }

    #[test]
    fn empty_variable_name_is_rejected() {
        let err = UrlTemplate::compile("/users/:/posts", &base()).unwrap_err();
        assert!(matches!(err, TemplateError::BadVariable(_)));
    }
}
