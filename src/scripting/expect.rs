//! Fluent assertions over a value and an optional response
//!
//! ```ignore
//! expect_response(&response).to().have().status(200)?;
//! expect(body["count"].clone()).to().be().below(10)?;
//! ```

use serde_json::Value;

use super::pattern::Pattern;
use crate::error::AssertionError;
use crate::http::HttpResponse;

/// Start an assertion chain on a value
pub fn expect(actual: impl Into<Value>) -> Expectation<'static> {
    Expectation {
        actual: actual.into(),
        response: None,
    }
}

/// Start an assertion chain on a response
pub fn expect_response(response: &HttpResponse) -> Expectation<'_> {
    Expectation {
        actual: response.to_script_value(),
        response: Some(response),
    }
}

/// Assertion chain state
#[derive(Debug, Clone)]
pub struct Expectation<'a> {
    actual: Value,
    response: Option<&'a HttpResponse>,
}

impl<'a> Expectation<'a> {
    /// Assert on `actual` with `response` available to status and header checks
    pub fn with_response(actual: impl Into<Value>, response: &'a HttpResponse) -> Self {
        Self {
            actual: actual.into(),
            response: Some(response),
        }
    }

    pub fn actual(&self) -> &Value {
        &self.actual
    }

    pub fn to(&self) -> &Self {
        self
    }

    pub fn be(&self) -> &Self {
        self
    }

    pub fn have(&self) -> &Self {
        self
    }

    /// Status code equality
    pub fn status(&self, expected: u16) -> Result<(), AssertionError> {
        let actual = match self.response {
            Some(response) => Value::from(response.status),
            None => match &self.actual {
                Value::Object(map) => map.get("status").cloned().unwrap_or(Value::Null),
                other => other.clone(),
            },
        };

        if actual.as_u64() == Some(u64::from(expected)) {
            Ok(())
        } else {
            Err(AssertionError::mismatch("have status", expected, actual))
        }
    }

    /// Header presence, name compared case-insensitively
    pub fn header(&self, name: &str) -> Result<(), AssertionError> {
        let names: Vec<String> = match self.response {
            Some(response) => response.headers.iter().map(|(k, _)| k.to_string()).collect(),
            None => match self.actual.get("headers").unwrap_or(&self.actual) {
                Value::Object(map) => map.keys().cloned().collect(),
                _ => Vec::new(),
            },
        };

        if names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            Ok(())
        } else {
            Err(AssertionError::mismatch("have header", name, names))
        }
    }

    /// Substring inclusion, both sides compared as text
    pub fn include(&self, needle: impl Into<Value>) -> Result<(), AssertionError> {
        let needle = needle.into();
        let haystack = as_text(&self.actual);

        if haystack.contains(&as_text(&needle)) {
            Ok(())
        } else {
            Err(AssertionError::mismatch("include", needle, self.actual.clone()))
        }
    }

    /// Deep equality
    pub fn eql(&self, expected: impl Into<Value>) -> Result<(), AssertionError> {
        let expected = expected.into();
        if self.actual == expected {
            Ok(())
        } else {
            Err(AssertionError::mismatch("deeply equal", expected, self.actual.clone()))
        }
    }

    /// Regular expression match against the text of the value
    pub fn matches(&self, pattern: impl Into<Pattern>) -> Result<(), AssertionError> {
        let pattern = pattern.into();
        let regex = pattern.compile()?;

        if regex.is_match(&as_text(&self.actual)) {
            Ok(())
        } else {
            Err(AssertionError::mismatch("match", pattern.as_str(), self.actual.clone()))
        }
    }

    /// Numeric less-than
    pub fn below(&self, limit: impl Into<Value>) -> Result<(), AssertionError> {
        let limit = limit.into();
        match (self.actual.as_f64(), limit.as_f64()) {
            (Some(actual), Some(max)) if actual < max => Ok(()),
            _ => Err(AssertionError::mismatch("be below", limit, self.actual.clone())),
        }
    }

    /// Presence of a key in an object value
    pub fn key(&self, name: &str) -> Result<(), AssertionError> {
        match &self.actual {
            Value::Object(map) if map.contains_key(name) => Ok(()),
            _ => Err(AssertionError::mismatch("have key", name, self.actual.clone())),
        }
    }
}

/// Text form of a value: strings as is, everything else as JSON
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
