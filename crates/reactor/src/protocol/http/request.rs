use std::collections::HashMap;

use bytes::Bytes;
use http::HeaderMap;

use super::Method;

/// A fully parsed HTTP/1.1 request.
///
/// Header names are lowercase. The path has its query string stripped, the
/// query parameters live in [`HttpRequest::params`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) version: String,
    pub(crate) headers: HeaderMap,
    pub(crate) params: HashMap<String, String>,
    pub(crate) body: Bytes,
}

impl HttpRequest {
    /// A request with no headers, parameters or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            version: String::from("HTTP/1.1"),
            headers: HeaderMap::new(),
            params: HashMap::new(),
            body: Bytes::new(),
        }
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of header `key` that is valid visible ASCII.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|value| value.to_str().ok())
    }

    #[inline]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    #[inline]
    pub fn params_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Splits `raw` at `?` and fills the parameter map from the query part.
    ///
    /// Pairs are separated by `&`, a pair without `=` is skipped and the first
    /// occurrence of a key wins.
    pub(crate) fn set_target(&mut self, raw: &str) {
        let (path, query) = raw.split_once('?').unwrap_or((raw, ""));
        self.path = path.to_owned();
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                self.params.entry(key.to_owned()).or_insert_with(|| value.to_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_without_query() {
        let mut request = HttpRequest::new(Method::Get, "");
        request.set_target("/index.html");
        assert_eq!(request.path(), "/index.html");
        assert!(request.params().is_empty());
    }

    #[test]
    fn target_with_malformed_pairs() {
        let mut request = HttpRequest::new(Method::Get, "");
        request.set_target("/users?a=b&c=d&e=&malformed&=f&a=second");
        assert_eq!(request.path(), "/users");
        assert_eq!(request.params().len(), 4);
        assert_eq!(request.param("a"), Some("b"));
        assert_eq!(request.param("c"), Some("d"));
        assert_eq!(request.param("e"), Some(""));
        assert_eq!(request.param(""), Some("f"));
        assert_eq!(request.param("malformed"), None);
    }

    #[test]
    fn value_keeps_later_equals_signs() {
        let mut request = HttpRequest::new(Method::Get, "");
        request.set_target("/q?expr=a=b");
        assert_eq!(request.param("expr"), Some("a=b"));
    }
}
