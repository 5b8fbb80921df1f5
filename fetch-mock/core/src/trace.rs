use std::collections::HashMap;
use std::fmt;

/// The outcome of evaluating one route against one request.
///
/// Messages are ordered by check (URL, method, query, params, headers,
/// body). Evaluation halts at the first failed check, so a trace contains at
/// most one failure message and it is always the last entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchTrace {
    /// Display title of the route, e.g. `GET https://api.example.com/users/:id`.
    pub title: String,
    pub messages: Vec<String>,
    pub matches: bool,
    /// Parameter bindings extracted by the URL template, when the URL matched.
    pub params: HashMap<String, String>,
    /// The request's parsed query pairs, recorded for response creators.
    pub query: Vec<(String, String)>,
}

impl MatchTrace {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            messages: Vec::new(),
            matches: false,
            params: HashMap::new(),
            query: Vec::new(),
        }
    }

    pub fn pass(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
        self.matches = false;
    }

    /// A trace with a single message failed its very first check; such
    /// traces carry no diagnostic value beyond "wrong URL".
    pub fn is_partial_match(&self) -> bool {
        self.messages.len() > 1
    }
}

impl fmt::Display for MatchTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.title)?;
        for message in &self.messages {
            writeln!(f, "  {message}")?;
        }
        Ok(())
    }
}
