//! HTTP request types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Ordered header list.
///
/// Lookup is case-insensitive, names keep the caller's casing and
/// repeated names are kept as separate entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an entry, keeping existing entries with the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Replace every entry named `name` with a single entry at the first position
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.0.iter().position(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(pos) => {
                self.0[pos] = (name.clone(), value);
                let mut index = 0;
                self.0.retain(|(k, _)| {
                    let keep = index <= pos || !k.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
            }
            None => self.0.push((name, value)),
        }
    }

    /// First value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for a header, in order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove every entry with this name
    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Request body variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum RequestBody {
    /// No body
    #[default]
    None,

    /// Raw bytes, sent as-is with the caller's Content-Type
    Raw(Vec<u8>),

    /// URL-encoded key/value pairs
    UrlEncoded(Vec<(String, String)>),

    /// Multipart form fields and file parts
    Multipart(Vec<MultipartField>),
}

impl RequestBody {
    pub fn is_none(&self) -> bool {
        matches!(self, RequestBody::None)
    }

    /// Serialize URL-encoded pairs with standard percent-encoding
    pub fn encode_urlencoded(pairs: &[(String, String)]) -> String {
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// One multipart form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipartField {
    /// Field name
    pub name: String,

    /// Field content
    pub value: PartValue,
}

/// Content of a multipart field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PartValue {
    Text {
        value: String,
    },
    File {
        path: PathBuf,
        file_name: Option<String>,
        content_type: Option<String>,
    },
}

impl MultipartField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: PartValue::Text { value: value.into() },
        }
    }

    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            value: PartValue::File {
                path: path.into(),
                file_name: None,
                content_type: None,
            },
        }
    }
}

/// One intended HTTP call.
///
/// Built once per call. The redirect resolver derives a new value per hop
/// and never mutates the caller's request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedRequest {
    /// Unique request ID
    pub id: String,

    /// HTTP method
    pub method: String,

    /// Request URL
    pub url: String,

    /// Request headers
    pub headers: HeaderList,

    /// Request body
    pub body: RequestBody,

    /// Follow redirects
    pub follow_redirects: bool,

    /// Publish engine events for this call
    pub emit_events: bool,
}

impl Default for PreparedRequest {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method: "GET".to_string(),
            url: String::new(),
            headers: HeaderList::new(),
            body: RequestBody::None,
            follow_redirects: true,
            emit_events: false,
        }
    }
}

impl PreparedRequest {
    /// Create a new request
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Create a builder for constructing requests
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }
}

/// Builder for constructing requests
#[derive(Debug, Default)]
pub struct RequestBuilder {
    request: PreparedRequest,
}

impl RequestBuilder {
    /// Set the request method
    pub fn method(mut self, method: &str) -> Self {
        self.request.method = method.to_uppercase();
        self
    }

    /// Set the request URL
    pub fn url(mut self, url: &str) -> Self {
        self.request.url = url.to_string();
        self
    }

    /// Add a header
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.request.headers.append(key, value);
        self
    }

    /// Set a raw text body
    pub fn body(mut self, body: &str) -> Self {
        self.request.body = RequestBody::Raw(body.as_bytes().to_vec());
        self
    }

    /// Set a raw binary body
    pub fn bytes(mut self, body: Vec<u8>) -> Self {
        self.request.body = RequestBody::Raw(body);
        self
    }

    /// Set JSON body
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(body) {
            self.request.body = RequestBody::Raw(bytes);
        }
        self.request.headers.set("Content-Type", "application/json");
        self
    }

    /// Add a URL-encoded pair, switching the body to URL-encoded mode
    pub fn form(mut self, key: &str, value: &str) -> Self {
        let pair = (key.to_string(), value.to_string());
        match &mut self.request.body {
            RequestBody::UrlEncoded(pairs) => pairs.push(pair),
            body => *body = RequestBody::UrlEncoded(vec![pair]),
        }
        self
    }

    /// Add a multipart field, switching the body to multipart mode
    pub fn part(mut self, field: MultipartField) -> Self {
        match &mut self.request.body {
            RequestBody::Multipart(fields) => fields.push(field),
            body => *body = RequestBody::Multipart(vec![field]),
        }
        self
    }

    /// Set follow redirects
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.request.follow_redirects = follow;
        self
    }

    /// Set event emission
    pub fn emit_events(mut self, emit: bool) -> Self {
        self.request.emit_events = emit;
        self
    }

    /// Build the request
    pub fn build(self) -> PreparedRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = PreparedRequest::builder()
            .method("post")
            .url("https://api.example.com/users")
            .header("X-Custom", "value")
            .body(r#"{"name": "test"}"#)
            .build();

        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "https://api.example.com/users");
        assert_eq!(req.headers.get("x-custom"), Some("value"));
        assert_eq!(req.body, RequestBody::Raw(br#"{"name": "test"}"#.to_vec()));
        assert!(req.follow_redirects);
        assert!(!req.emit_events);
    }

    #[test]
    fn test_header_list_preserves_case_and_order() {
        let mut headers = HeaderList::new();
        headers.append("X-First", "1");
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");

        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["X-First", "Set-Cookie", "set-cookie"]);
        assert_eq!(headers.get_all("SET-COOKIE").collect::<Vec<_>>(), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_header_set_replaces_all() {
        let mut headers = HeaderList::new();
        headers.append("Accept", "text/html");
        headers.append("X-Other", "1");
        headers.append("accept", "application/xml");
        headers.set("ACCEPT", "application/json");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("accept"), Some("application/json"));
        assert_eq!(headers.iter().next(), Some(("ACCEPT", "application/json")));
    }

    #[test]
    fn test_header_remove_is_case_insensitive() {
        let mut headers: HeaderList = vec![("Content-Type", "text/plain"), ("Host", "a")]
            .into_iter()
            .collect();
        headers.remove("content-type");
        assert!(!headers.contains("Content-Type"));
        assert!(headers.contains("host"));
    }

    #[test]
    fn test_urlencoded_encoding() {
        let pairs = vec![
            ("name".to_string(), "John Doe".to_string()),
            ("q".to_string(), "a&b=c".to_string()),
        ];
        assert_eq!(
            RequestBody::encode_urlencoded(&pairs),
            "name=John%20Doe&q=a%26b%3Dc"
        );
    }

    #[test]
    fn test_form_and_part_builders() {
        let req = PreparedRequest::builder()
            .form("a", "1")
            .form("b", "2")
            .build();
        assert_eq!(
            req.body,
            RequestBody::UrlEncoded(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ])
        );

        let req = PreparedRequest::builder()
            .part(MultipartField::text("field", "value"))
            .part(MultipartField::file("upload", "/tmp/report.pdf"))
            .build();
        match req.body {
            RequestBody::Multipart(fields) => assert_eq!(fields.len(), 2),
            other => panic!("unexpected body: {:?}", other),
        }
    }
}
