use std::fmt::{self, Display};
use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use thiserror::Error;

use crate::buffer::BufferWriter;
use crate::config::DEFAULT_SERVER_NAME;

use super::Method;
use super::status::reason_phrase;

/// Initial capacity reserved for the status line and headers.
const INIT_HEADER_SIZE: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("unknown status code: {0}")]
    UnknownStatus(u16),
}

/// An HTTP/1.1 response under construction.
///
/// A fresh response is `200 OK` with `Server`, `Content-Type: text/plain` and
/// `Date` set. `Content-Length` is always computed from the body when the
/// response is encoded.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    reason: &'static str,
    headers: HeaderMap,
    body: BytesMut,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::with_server_name(DEFAULT_SERVER_NAME)
    }

    /// A `200 OK` response announcing `server_name` in its `Server` header.
    pub fn with_server_name(server_name: &str) -> Self {
        let mut headers = HeaderMap::with_capacity(4);
        if let Ok(value) = HeaderValue::from_str(server_name) {
            headers.insert(header::SERVER, value);
        }
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let mut response = Self { status: StatusCode::OK, reason: "OK", headers, body: BytesMut::new() };
        response.set_date_to_now();
        response
    }

    pub fn with_status(code: u16) -> Result<Self, ResponseError> {
        let mut response = Self::new();
        response.set_status(code)?;
        Ok(response)
    }

    /// `101` without a content type, the start of every protocol switch.
    pub fn switching_protocols(server_name: &str) -> Self {
        let mut response = Self::with_server_name(server_name);
        response.status = StatusCode::SWITCHING_PROTOCOLS;
        response.reason = "Switching Protocols";
        response.headers.remove(header::CONTENT_TYPE);
        response
    }

    /// `404` naming the path nobody serves.
    pub fn not_found(path: &str) -> Self {
        let mut response = Self::new();
        response.status = StatusCode::NOT_FOUND;
        response.reason = "Not Found";
        response.write_body(format!("controller at path \"{path}\" not found"));
        response
    }

    /// `405` for a path that exists but does not serve `method`.
    pub fn method_not_allowed(method: Method, path: &str) -> Self {
        let mut response = Self::new();
        response.status = StatusCode::METHOD_NOT_ALLOWED;
        response.reason = "Method Not Allowed";
        response.write_body(format!("controller at path \"{path}\" does not accept method {method}"));
        response
    }

    /// `500` carrying the failure of the controller serving `path`.
    pub fn internal_error(path: &str, cause: &dyn Display) -> Self {
        let mut response = Self::new();
        response.status = StatusCode::INTERNAL_SERVER_ERROR;
        response.reason = "Internal Server Error";
        response.write_body(format!("controller at path \"{path}\" failed the response promise with error : \r\n{cause}"));
        response
    }

    /// Sets the status, rejecting codes without a known reason phrase.
    pub fn set_status(&mut self, code: u16) -> Result<(), ResponseError> {
        let reason = reason_phrase(code).ok_or(ResponseError::UnknownStatus(code))?;
        self.status = StatusCode::from_u16(code).map_err(|_invalid| ResponseError::UnknownStatus(code))?;
        self.reason = reason;
        Ok(())
    }

    /// Replaces the `Date` header with the current time.
    pub fn set_date_to_now(&mut self) {
        let now = httpdate::fmt_http_date(SystemTime::now());
        if let Ok(value) = HeaderValue::from_str(&now) {
            self.headers.insert(header::DATE, value);
        }
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn reason(&self) -> &'static str {
        self.reason
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body stream, usable with `write!` through [`fmt::Write`].
    #[inline]
    pub fn body_mut(&mut self) -> &mut BytesMut {
        &mut self.body
    }

    pub fn write_body(&mut self, bytes: impl AsRef<[u8]>) {
        self.body.extend_from_slice(bytes.as_ref());
    }

    /// Writes the wire form: status line, headers, `Content-Length`, blank line, body.
    ///
    /// `Content-Length` is left out of informational and `204` responses.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(INIT_HEADER_SIZE + self.body.len());
        dst.put_slice(b"HTTP/1.1 ");
        dst.put_slice(self.status.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(self.reason.as_bytes());
        dst.put_slice(b"\r\n");

        for (name, value) in &self.headers {
            if name == header::CONTENT_LENGTH {
                continue;
            }
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }

        if !self.status.is_informational() && self.status != StatusCode::NO_CONTENT {
            dst.put_slice(b"content-length: ");
            dst.put_slice(self.body.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        dst.put_slice(&self.body);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode(&mut dst);
        dst.freeze()
    }

    /// Serializes the response straight into a session buffer.
    pub fn serialize_to(&self, writer: &mut BufferWriter<'_>) {
        writer.write(&self.to_bytes());
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for HttpResponse {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.body.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use indoc::indoc;

    use super::*;
    use crate::buffer::{Buffer, BufferReader};

    fn wire(response: &HttpResponse) -> String {
        String::from_utf8(response.to_bytes().to_vec()).unwrap()
    }

    fn without_date(mut response: HttpResponse) -> HttpResponse {
        response.headers_mut().remove(header::DATE);
        response
    }

    #[test]
    fn default_headers() {
        let response = HttpResponse::new();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::SERVER], "micro-reactor");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");

        let date = response.headers()[header::DATE].to_str().unwrap();
        assert!(date.ends_with(" GMT"));
        httpdate::parse_http_date(date).unwrap();
    }

    #[test]
    fn encode_wire_form() {
        let mut response = without_date(HttpResponse::with_server_name("demo"));
        write!(response, "hello {}", "world").unwrap();

        let expected = indoc! {"
            HTTP/1.1 200 OK\r
            server: demo\r
            content-type: text/plain\r
            content-length: 11\r
            \r
            hello world"};
        assert_eq!(wire(&response), expected);
    }

    #[test]
    fn content_length_is_recomputed() {
        let mut response = without_date(HttpResponse::new());
        response.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("999"));
        response.write_body("abc");
        let wire = wire(&response);
        assert!(wire.contains("content-length: 3\r\n"));
        assert!(!wire.contains("999"));
    }

    #[test]
    fn encode_appends_after_existing_bytes() {
        let mut response = without_date(HttpResponse::with_status(204).unwrap());
        response.headers_mut().remove(header::CONTENT_TYPE);
        let mut dst = BytesMut::from(&b"previous"[..]);
        response.encode(&mut dst);
        assert_eq!(&dst[..], b"previousHTTP/1.1 204 No Content\r\nserver: micro-reactor\r\n\r\n");

        let mut response = without_date(HttpResponse::new());
        response.write_body(vec![b'x'; 12_345]);
        let wire = wire(&response);
        assert!(wire.contains("\r\ncontent-length: 12345\r\n\r\nxxx"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut response = HttpResponse::new();
        assert_eq!(response.set_status(418), Err(ResponseError::UnknownStatus(418)));
        assert_eq!(response.status(), StatusCode::OK);

        response.set_status(413).unwrap();
        assert!(wire(&response).starts_with("HTTP/1.1 413 Content Too Large\r\n"));
    }

    #[test]
    fn switching_protocols_has_no_length() {
        let response = HttpResponse::with_status(101).unwrap();
        let wire = wire(&response);
        assert!(wire.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(!wire.contains("content-length"));
    }

    #[test]
    fn error_response_bodies() {
        let response = HttpResponse::not_found("/missing");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), b"controller at path \"/missing\" not found");

        let response = HttpResponse::method_not_allowed(Method::Delete, "/users");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.body(), b"controller at path \"/users\" does not accept method DELETE");

        let response = HttpResponse::internal_error("/boom", &"database down");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.body(),
            b"controller at path \"/boom\" failed the response promise with error : \r\ndatabase down"
        );
    }

    #[test]
    fn serialize_into_buffer() {
        let response = HttpResponse::new();
        let mut buffer = Buffer::with_chunk_size(16);
        response.serialize_to(&mut BufferWriter::new(&mut buffer));

        let mut out = vec![0u8; buffer.len()];
        BufferReader::new(&mut buffer).get_bytes(&mut out);
        assert_eq!(out, response.to_bytes());
    }
}
