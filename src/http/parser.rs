//! HTTP message parsing
//!
//! `RequestParser` is used by the provisioning server. It moves through
//! explicit stages (request line, headers, body) and rejects input that does
//! not fit the grammar of the stage it is in, instead of pulling substrings
//! out of whatever arrived.
//!
//! `ResponseReader` is used by the uploader. It is deliberately forgiving:
//! the only things the uploader needs from a response are the status code
//! and the body, and a response it cannot make sense of must still produce
//! an outcome.

use super::{
    Error, Headers, HttpRequest, Method, ResponseStatus, Result, Version, MAX_BODY_BYTES,
    MAX_HEAD_BYTES,
};

/// Status line prefix the backend is expected to send
pub const STATUS_LINE_PREFIX: &str = "HTTP/1.1 ";

/// Parse HTTP request line
///
/// Format: METHOD SP TARGET SP VERSION
/// Example: POST /save HTTP/1.1
pub fn parse_request_line(line: &str) -> Result<(Method, String, Version)> {
    let parts: Vec<&str> = line.split(' ').collect();

    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::Parse(format!("Invalid request line: {:?}", line)));
    }

    let method = Method::parse(parts[0])?;
    let target = parts[1];
    if !target.starts_with('/') {
        return Err(Error::Parse(format!("Invalid request target: {:?}", target)));
    }
    let version = Version::parse(parts[2])?;

    Ok((method, target.to_string(), version))
}

/// Parse a response status line
///
/// The code is the three digits right after the literal `HTTP/1.1 `
/// prefix. Anything else is `Unparsable`.
pub fn parse_status_line(line: &str) -> ResponseStatus {
    let Some(rest) = line.strip_prefix(STATUS_LINE_PREFIX) else {
        return ResponseStatus::Unparsable;
    };

    match rest.get(..3) {
        Some(digits) if digits.bytes().all(|b| b.is_ascii_digit()) => digits
            .parse::<u16>()
            .map(ResponseStatus::Code)
            .unwrap_or(ResponseStatus::Unparsable),
        _ => ResponseStatus::Unparsable,
    }
}

/// Line content without the trailing CR
fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestStage {
    RequestLine,
    Headers,
    Body,
    Complete,
}

/// Staged HTTP request parser
///
/// Lines end with LF; a preceding CR is dropped. Only a POST carries a body,
/// sized by its `Content-Length`.
pub struct RequestParser {
    stage: RequestStage,
    line: Vec<u8>,
    head_bytes: usize,
    method: Option<Method>,
    target: Option<String>,
    version: Option<Version>,
    headers: Headers,
    body: Vec<u8>,
    body_len: usize,
}

impl RequestParser {
    pub fn new() -> Self {
        RequestParser {
            stage: RequestStage::RequestLine,
            line: Vec::new(),
            head_bytes: 0,
            method: None,
            target: None,
            version: None,
            headers: Headers::new(),
            body: Vec::new(),
            body_len: 0,
        }
    }

    /// Feed data to the parser
    ///
    /// Returns Ok(Some(request)) once the request is complete, Ok(None) if
    /// more data is needed, or Err when the input breaks the grammar.
    /// Bytes past the end of the request are ignored.
    pub fn parse(&mut self, data: &[u8]) -> Result<Option<HttpRequest>> {
        for &byte in data {
            match self.stage {
                RequestStage::RequestLine | RequestStage::Headers => {
                    self.head_bytes += 1;
                    if self.head_bytes > MAX_HEAD_BYTES {
                        return Err(Error::HeadTooLarge(MAX_HEAD_BYTES));
                    }
                    if byte == b'\n' {
                        let line = std::mem::take(&mut self.line);
                        self.end_of_line(trim_cr(&line))?;
                    } else {
                        self.line.push(byte);
                    }
                }
                RequestStage::Body => {
                    self.body.push(byte);
                    if self.body.len() == self.body_len {
                        self.stage = RequestStage::Complete;
                    }
                }
                RequestStage::Complete => break,
            }

            if self.stage == RequestStage::Complete {
                break;
            }
        }

        if self.stage == RequestStage::Complete {
            Ok(Some(self.take_request()))
        } else {
            Ok(None)
        }
    }

    /// Body bytes still expected; non-zero only while reading the body
    pub fn body_remaining(&self) -> usize {
        match self.stage {
            RequestStage::Body => self.body_len - self.body.len(),
            _ => 0,
        }
    }

    /// Whether the request line has been seen
    pub fn started(&self) -> bool {
        self.stage != RequestStage::RequestLine || !self.line.is_empty()
    }

    fn end_of_line(&mut self, line: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(line);

        match self.stage {
            RequestStage::RequestLine => {
                // Tolerate stray blank lines before the request line
                if line.is_empty() {
                    return Ok(());
                }
                let (method, target, version) = parse_request_line(&line)?;
                self.method = Some(method);
                self.target = Some(target);
                self.version = Some(version);
                self.stage = RequestStage::Headers;
            }
            RequestStage::Headers => {
                if line.is_empty() {
                    self.end_of_headers()?;
                } else {
                    let (name, value) = Headers::parse_header_line(&line)?;
                    self.headers.try_insert(name, value)?;
                }
            }
            RequestStage::Body | RequestStage::Complete => {}
        }

        Ok(())
    }

    fn end_of_headers(&mut self) -> Result<()> {
        let declared = if self.method == Some(Method::Post) {
            self.headers.content_length()?.unwrap_or(0)
        } else {
            0
        };

        if declared > MAX_BODY_BYTES {
            return Err(Error::BodyTooLarge(declared));
        }

        if declared > 0 {
            self.body_len = declared;
            self.body = Vec::with_capacity(declared);
            self.stage = RequestStage::Body;
        } else {
            self.stage = RequestStage::Complete;
        }
        Ok(())
    }

    fn take_request(&mut self) -> HttpRequest {
        HttpRequest::builder()
            .method(self.method.unwrap_or(Method::Get))
            .target(self.target.take().unwrap_or_else(|| "/".to_string()))
            .version(self.version.unwrap_or_default())
            .headers(std::mem::take(&mut self.headers))
            .body(std::mem::take(&mut self.body))
            .build()
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseStage {
    StatusLine,
    Headers,
    Body,
    Done,
}

/// What the uploader keeps of a response
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub status: ResponseStatus,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// Body was cut at the reader's limit
    pub truncated: bool,
}

/// Lenient response reader
///
/// Header lines that do not parse are skipped. The body is collected until
/// the declared `Content-Length` is reached, the limit is hit, or the caller
/// stops feeding (peer closed or went quiet). A status line plus headers
/// longer than `MAX_HEAD_BYTES` ends the response with whatever was parsed.
pub struct ResponseReader {
    stage: ResponseStage,
    line: Vec<u8>,
    head_bytes: usize,
    status: ResponseStatus,
    headers: Headers,
    body: Vec<u8>,
    expected: Option<usize>,
    body_limit: usize,
    truncated: bool,
}

impl ResponseReader {
    pub fn new(body_limit: usize) -> Self {
        ResponseReader {
            stage: ResponseStage::StatusLine,
            line: Vec::new(),
            head_bytes: 0,
            status: ResponseStatus::Unparsable,
            headers: Headers::new(),
            body: Vec::new(),
            expected: None,
            body_limit,
            truncated: false,
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            match self.stage {
                ResponseStage::StatusLine | ResponseStage::Headers => {
                    self.head_bytes += 1;
                    if self.head_bytes > MAX_HEAD_BYTES {
                        log::debug!("Response head exceeds {} bytes", MAX_HEAD_BYTES);
                        self.line.clear();
                        self.stage = ResponseStage::Done;
                        break;
                    }
                    if byte == b'\n' {
                        let line = std::mem::take(&mut self.line);
                        self.end_of_line(trim_cr(&line));
                    } else {
                        self.line.push(byte);
                    }
                }
                ResponseStage::Body => {
                    if self.body.len() >= self.body_limit {
                        self.truncated = true;
                        self.stage = ResponseStage::Done;
                        break;
                    }
                    self.body.push(byte);
                    if Some(self.body.len()) == self.expected {
                        self.stage = ResponseStage::Done;
                    }
                }
                ResponseStage::Done => break,
            }
        }
    }

    /// Status line and headers have been consumed
    pub fn in_body(&self) -> bool {
        matches!(self.stage, ResponseStage::Body | ResponseStage::Done)
    }

    /// Nothing more will be accepted
    pub fn is_done(&self) -> bool {
        self.stage == ResponseStage::Done
    }

    pub fn finish(mut self) -> ParsedResponse {
        // A status line cut short by the peer still counts
        if self.stage == ResponseStage::StatusLine && !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.status = parse_status_line(&String::from_utf8_lossy(trim_cr(&line)));
        }

        ParsedResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
            truncated: self.truncated,
        }
    }

    fn end_of_line(&mut self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);

        match self.stage {
            ResponseStage::StatusLine => {
                self.status = parse_status_line(&line);
                self.stage = ResponseStage::Headers;
            }
            ResponseStage::Headers => {
                if line.is_empty() {
                    self.expected = self.headers.content_length().ok().flatten();
                    self.stage = if self.expected == Some(0) {
                        ResponseStage::Done
                    } else {
                        ResponseStage::Body
                    };
                } else {
                    match Headers::parse_header_line(&line) {
                        Ok((name, value)) => self.headers.insert(name, value),
                        Err(e) => log::debug!("Skipping response header: {}", e),
                    }
                }
            }
            ResponseStage::Body | ResponseStage::Done => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MAX_HEADERS;

    fn parse_all(data: &[u8]) -> Result<Option<HttpRequest>> {
        let mut parser = RequestParser::new();
        // Byte at a time, the way the server reads
        for &b in data {
            if let Some(req) = parser.parse(&[b])? {
                return Ok(Some(req));
            }
        }
        Ok(None)
    }

    #[test]
    fn test_parse_request_line() {
        let (method, target, version) = parse_request_line("GET /save?a=1 HTTP/1.1").unwrap();
        assert_eq!(method, Method::Get);
        assert_eq!(target, "/save?a=1");
        assert_eq!(version, Version::Http11);

        assert!(parse_request_line("GET /").is_err());
        assert!(parse_request_line("GET  / HTTP/1.1").is_err());
        assert!(parse_request_line("GET save HTTP/1.1").is_err());
        assert!(parse_request_line("GET / HTTP/2").is_err());
    }

    #[test]
    fn test_parse_status_line() {
        assert_eq!(parse_status_line("HTTP/1.1 200 OK"), ResponseStatus::Code(200));
        assert_eq!(parse_status_line("HTTP/1.1 404"), ResponseStatus::Code(404));
        assert_eq!(parse_status_line("HTTP/1.0 200 OK"), ResponseStatus::Unparsable);
        assert_eq!(parse_status_line("HTTP/1.1 2x0 OK"), ResponseStatus::Unparsable);
        assert_eq!(parse_status_line("HTTP/1.1 20"), ResponseStatus::Unparsable);
        assert_eq!(parse_status_line("garbage"), ResponseStatus::Unparsable);
        assert_eq!(parse_status_line(""), ResponseStatus::Unparsable);
    }

    #[test]
    fn test_get_request() {
        let req = parse_all(b"GET /save?ssid=x HTTP/1.1\r\nHost: 192.168.4.1\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.path(), "/save");
        assert_eq!(req.query(), Some("ssid=x"));
        assert_eq!(req.headers().get("Host"), Some("192.168.4.1"));
        assert!(req.body().is_empty());
    }

    #[test]
    fn test_post_body() {
        let req = parse_all(b"POST /save HTTP/1.1\r\nContent-Length: 7\r\n\r\nssid=ab")
            .unwrap()
            .unwrap();
        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.body(), b"ssid=ab");
    }

    #[test]
    fn test_bare_lf_lines() {
        let req = parse_all(b"GET / HTTP/1.0\nHost: h\n\n").unwrap().unwrap();
        assert_eq!(req.version(), Version::Http10);
        assert_eq!(req.headers().get("host"), Some("h"));
    }

    #[test]
    fn test_post_without_length_has_no_body() {
        let req = parse_all(b"POST /save HTTP/1.1\r\n\r\n").unwrap().unwrap();
        assert!(req.body().is_empty());
    }

    #[test]
    fn test_body_remaining() {
        let mut parser = RequestParser::new();
        assert!(parser
            .parse(b"POST /save HTTP/1.1\r\nContent-Length: 5\r\n\r\nab")
            .unwrap()
            .is_none());
        assert_eq!(parser.body_remaining(), 3);
        let req = parser.parse(b"cde").unwrap().unwrap();
        assert_eq!(req.body(), b"abcde");
    }

    #[test]
    fn test_rejects_bad_header() {
        let err = parse_all(b"GET / HTTP/1.1\r\nno colon here\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
    }

    #[test]
    fn test_rejects_large_head() {
        let mut data = b"GET / HTTP/1.1\r\nX-Fill: ".to_vec();
        data.extend(std::iter::repeat(b'a').take(MAX_HEAD_BYTES));
        let err = parse_all(&data).unwrap_err();
        assert!(matches!(err, Error::HeadTooLarge(_)));
    }

    #[test]
    fn test_rejects_too_many_headers() {
        let mut data = b"POST /save HTTP/1.1\r\n".to_vec();
        for i in 0..MAX_HEADERS {
            data.extend_from_slice(format!("X-H{}: v\r\n", i).as_bytes());
        }
        data.extend_from_slice(b"Content-Length: 11\r\n\r\nsession=abc");
        assert!(data.len() < MAX_HEAD_BYTES);

        let err = parse_all(&data).unwrap_err();
        assert!(matches!(err, Error::TooManyHeaders(_)));
    }

    #[test]
    fn test_accepts_headers_up_to_limit() {
        let mut data = b"POST /save HTTP/1.1\r\n".to_vec();
        for i in 0..MAX_HEADERS - 1 {
            data.extend_from_slice(format!("X-H{}: v\r\n", i).as_bytes());
        }
        data.extend_from_slice(b"Content-Length: 11\r\n\r\nsession=abc");

        let req = parse_all(&data).unwrap().unwrap();
        assert_eq!(req.body(), b"session=abc");
    }

    #[test]
    fn test_rejects_large_body() {
        let data = format!(
            "POST /save HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_BYTES + 1
        );
        let err = parse_all(data.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::BodyTooLarge(_)));
    }

    #[test]
    fn test_response_reader_with_length() {
        let mut reader = ResponseReader::new(1024);
        reader.feed(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n");
        assert!(!reader.in_body());
        reader.feed(b"Content-Length: 2\r\n\r\n{}");
        assert!(reader.is_done());

        let resp = reader.finish();
        assert_eq!(resp.status, ResponseStatus::Code(200));
        assert_eq!(resp.headers.get("content-type"), Some("application/json"));
        assert_eq!(resp.body, b"{}");
        assert!(!resp.truncated);
    }

    #[test]
    fn test_response_reader_until_close() {
        let mut reader = ResponseReader::new(1024);
        reader.feed(b"HTTP/1.1 500 Internal Server Error\r\nbroken header\r\n\r\npartial");
        assert!(reader.in_body());
        assert!(!reader.is_done());

        let resp = reader.finish();
        assert_eq!(resp.status, ResponseStatus::Code(500));
        assert_eq!(resp.body, b"partial");
    }

    #[test]
    fn test_response_reader_limit() {
        let mut reader = ResponseReader::new(4);
        reader.feed(b"HTTP/1.1 200 OK\r\n\r\n0123456789");
        assert!(reader.is_done());
        let resp = reader.finish();
        assert_eq!(resp.body, b"0123");
        assert!(resp.truncated);
    }

    #[test]
    fn test_response_reader_truncated_status() {
        let mut reader = ResponseReader::new(16);
        reader.feed(b"HTTP/1.1 204");
        assert_eq!(reader.finish().status, ResponseStatus::Code(204));

        let reader = ResponseReader::new(16);
        assert_eq!(reader.finish().status, ResponseStatus::Unparsable);
    }
    #[test]
    fn test_response_reader_endless_header() {
        let mut reader = ResponseReader::new(1024);
        reader.feed(b"HTTP/1.1 200 OK\r\nX-Junk: ");
        let junk = vec![b'a'; 1024];
        for _ in 0..64 {
            reader.feed(&junk);
            if reader.is_done() {
                break;
            }
        }
        assert!(reader.is_done());

        let resp = reader.finish();
        assert_eq!(resp.status, ResponseStatus::Code(200));
        assert!(resp.headers.is_empty());
        assert!(resp.body.is_empty());
    }

    #[test]
    fn test_response_reader_endless_status_line() {
        let mut reader = ResponseReader::new(1024);
        reader.feed(&vec![b'H'; MAX_HEAD_BYTES + 1]);
        assert!(reader.is_done());
        assert_eq!(reader.finish().status, ResponseStatus::Unparsable);
    }
}
