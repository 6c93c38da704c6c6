//! HTTP message types
//!
//! Requests are what the provisioning server receives and what the uploader
//! sends (head only, the multipart body is streamed separately). Responses
//! are what the provisioning server sends back.

use super::{Error, Headers, Result, CRLF};
use std::fmt;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    /// Parse a method token (case-sensitive, as on the wire)
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
}

impl Version {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            _ => Err(Error::InvalidVersion(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status code sent by the provisioning server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    pub const OK: Status = Status { code: 200 };
    pub const BAD_REQUEST: Status = Status { code: 400 };
    pub const PAYLOAD_TOO_LARGE: Status = Status { code: 413 };
    pub const HEADER_FIELDS_TOO_LARGE: Status = Status { code: 431 };
    pub const INTERNAL_SERVER_ERROR: Status = Status { code: 500 };

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self.code {
            200 => "OK",
            400 => "Bad Request",
            413 => "Payload Too Large",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// Status reported by the upload backend
///
/// `Unparsable` stands for a status line that did not have the expected
/// shape, including a missing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    Code(u16),
    Unparsable,
}

impl ResponseStatus {
    pub fn code(&self) -> Option<u16> {
        match self {
            ResponseStatus::Code(code) => Some(*code),
            ResponseStatus::Unparsable => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseStatus::Code(code) if (200..300).contains(code))
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStatus::Code(code) => write!(f, "{}", code),
            ResponseStatus::Unparsable => f.write_str("unparsable"),
        }
    }
}

/// HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    target: String,
    version: Version,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpRequest {
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Request target as sent, including any query string
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Target without the query string
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// Query string after '?', if any
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Request line, headers and the blank line
    pub fn head_to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.target.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.version.as_str().as_bytes());
        buf.extend_from_slice(CRLF.as_bytes());

        self.headers.write_wire(&mut buf);
        buf.extend_from_slice(CRLF.as_bytes());

        buf
    }

    /// Full request in wire format
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = self.head_to_wire();
        buf.extend_from_slice(&self.body);
        buf
    }
}

/// Builder for HTTP requests
#[derive(Debug, Default)]
pub struct HttpRequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Option<Version>,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpRequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> HttpRequest {
        HttpRequest {
            method: self.method.unwrap_or(Method::Get),
            target: self.target.unwrap_or_else(|| "/".to_string()),
            version: self.version.unwrap_or_default(),
            headers: self.headers,
            body: self.body,
        }
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: Status,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn builder() -> HttpResponseBuilder {
        HttpResponseBuilder::default()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Convert the response to wire format
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + self.body.len());

        buf.extend_from_slice(Version::Http11.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.status.code().to_string().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.status.reason_phrase().as_bytes());
        buf.extend_from_slice(CRLF.as_bytes());

        self.headers.write_wire(&mut buf);
        buf.extend_from_slice(CRLF.as_bytes());

        buf.extend_from_slice(&self.body);
        buf
    }
}

/// Builder for HTTP responses
#[derive(Debug, Default)]
pub struct HttpResponseBuilder {
    status: Option<Status>,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpResponseBuilder {
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Build the response, adding `Content-Length` when it is missing
    pub fn build(mut self) -> HttpResponse {
        if !self.headers.contains("Content-Length") {
            self.headers
                .insert("Content-Length", self.body.len().to_string());
        }
        HttpResponse {
            status: self.status.unwrap_or(Status::OK),
            headers: self.headers,
            body: self.body,
        }
    }
}
