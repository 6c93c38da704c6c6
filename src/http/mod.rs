//! HTTP/1.1 wire layer
//!
//! Both engines of this crate speak just enough HTTP/1.1 to talk to their
//! one known peer, and they do it by hand on top of a socket. This module
//! holds the pieces they share.
//!
//! # Architecture
//!
//! I/O goes through a session operations abstraction so that the same code
//! runs over plain TCP and TLS:
//!
//! - `SessionOps` defines the transport operations (poll, read, write, close)
//! - `HttpSession` wraps a transport and applies a poll timeout to every
//!   read and write
//! - `FdSessionOps` and `tls::TlsSessionOps` are the two transports
//!
//! On top of that sit the message model (`HttpRequest`, `HttpResponse`), the
//! staged `RequestParser` used by the provisioning server, the
//! `ResponseReader` used by the uploader, and form decoding.
//!
//! # Examples
//!
//! ```no_run
//! use camlink::http::{HttpResponse, Status};
//!
//! let response = HttpResponse::builder()
//!     .status(Status::OK)
//!     .header("Content-Type", "text/html")
//!     .header("Connection", "close")
//!     .body(b"<p>hello</p>".to_vec())
//!     .build();
//! let wire = response.to_wire();
//! assert!(wire.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! ```

pub mod form;
pub mod headers;
pub mod message;
pub mod parser;
pub mod session;
pub mod tls;

pub use form::FormParams;
pub use headers::Headers;
pub use message::{HttpRequest, HttpResponse, Method, ResponseStatus, Status, Version};
pub use parser::{RequestParser, ResponseReader};
pub use session::{FdSessionOps, HttpSession, PollEvents, SessionOps};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] tls::TlsError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("More than {0} headers")]
    TooManyHeaders(usize),

    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("Request body of {0} bytes exceeds the limit")]
    BodyTooLarge(usize),

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,
}

/// Maximum number of headers per message
pub const MAX_HEADERS: usize = 64;

/// Maximum size of a request line plus headers
pub const MAX_HEAD_BYTES: usize = 8192;

/// Maximum accepted request body
pub const MAX_BODY_BYTES: usize = 4096;

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
