//! HTTP header map
//!
//! Headers keep their insertion order and are looked up case-insensitively.
//! Both peers of this crate send a handful of headers at most, so a vector
//! is all the structure needed.

use super::{Error, Result, CRLF, MAX_HEADERS};

#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers {
            headers: Vec::new(),
        }
    }

    /// Append a header, failing once `MAX_HEADERS` are held
    pub fn try_insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        if self.headers.len() >= MAX_HEADERS {
            return Err(Error::TooManyHeaders(MAX_HEADERS));
        }
        self.headers.push((name.into(), value.into()));
        Ok(())
    }

    /// Append a header
    ///
    /// Headers beyond `MAX_HEADERS` are dropped.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if self.headers.len() >= MAX_HEADERS {
            log::debug!("Header limit reached, dropping header");
            return;
        }
        self.headers.push((name.into(), value.into()));
    }

    /// First value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Declared body length, if any
    pub fn content_length(&self) -> Result<Option<usize>> {
        match self.get("Content-Length") {
            Some(value) => value
                .parse::<usize>()
                .map(Some)
                .map_err(|_| Error::Parse(format!("Invalid Content-Length: {}", value))),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Append the headers in wire format, one `Name: value\r\n` per entry
    pub fn write_wire(&self, buf: &mut Vec<u8>) {
        for (name, value) in self.iter() {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(CRLF.as_bytes());
        }
    }

    /// Split a header line into name and value
    pub fn parse_header_line(line: &str) -> Result<(String, String)> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeader(format!("No colon in header: {}", line)))?;

        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(Error::InvalidHeader(format!("Bad header name: {:?}", name)));
        }

        Ok((name.to_string(), value.trim().to_string()))
    }
}
