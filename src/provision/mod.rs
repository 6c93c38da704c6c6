//! Provisioning HTTP server
//!
//! While the device is being set up it serves a single configuration page.
//! Connections are handled strictly one after another on the calling
//! thread:
//!
//! ```text
//! Listening --accept--> ReadingRequest --parsed--> Dispatching --+--> Listening
//!     ^                      |                                   |
//!     +------ bad input -----+                   accepted save --+--> Done (one-shot)
//! ```
//!
//! Requests are read one byte at a time through [`RequestParser`]; a POST
//! body is then read in full. A `/save` submission is applied only when its
//! `session` field matches the token generated when the server started.

pub mod page;
pub mod submission;

use crate::config::{ConfigRecord, ConfigStore};
use crate::http::form::FormParams;
use crate::http::{
    Error, FdSessionOps, HttpRequest, HttpResponse, HttpSession, Method, RequestParser, Status,
};
use crate::net;
use crate::token::SessionToken;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

/// Path prefix of a configuration submission
pub const SAVE_PATH: &str = "/save";

const LINGER_TIMEOUT: Duration = Duration::from_millis(200);
const LINGER_MAX_BYTES: usize = 64 * 1024;

/// When the accept loop stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServeMode {
    /// Stop after the first accepted save
    #[default]
    OneShot,
    /// Keep serving after saves
    Persistent,
}

/// Server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub mode: ServeMode,
    /// Bound on each read of a request; `None` blocks indefinitely
    pub read_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], crate::http::DEFAULT_HTTP_PORT)),
            mode: ServeMode::OneShot,
            read_timeout: None,
        }
    }
}

/// Accept loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Listening,
    ReadingRequest,
    Dispatching,
    Done,
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Net(#[from] net::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Single-connection configuration server
pub struct ConfigHttpServer<S: ConfigStore> {
    listener: TcpListener,
    store: S,
    record: ConfigRecord,
    token: SessionToken,
    mode: ServeMode,
    read_timeout: Option<Duration>,
    state: ServerState,
}

impl<S: ConfigStore> ConfigHttpServer<S> {
    /// Bind `config.bind` and load the current record from `store`
    pub fn bind(config: ServerConfig, store: S) -> Result<Self, ServerError> {
        let listener = net::listen(config.bind)?;
        Ok(Self::with_listener(listener, config, store))
    }

    /// Serve on an already bound listener; `config.bind` is ignored
    pub fn with_listener(listener: TcpListener, config: ServerConfig, store: S) -> Self {
        let record = match store.load() {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Could not load configuration, using defaults: {}", e);
                ConfigRecord::default()
            }
        };

        ConfigHttpServer {
            listener,
            store,
            record,
            token: SessionToken::generate(),
            mode: config.mode,
            read_timeout: config.read_timeout,
            state: ServerState::Listening,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token a submission has to echo
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Record currently served in the form
    pub fn record(&self) -> &ConfigRecord {
        &self.record
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Serve until a save is accepted (one-shot) or forever (persistent)
    pub fn run(&mut self) -> Result<(), ServerError> {
        log::info!(
            "Provisioning server listening on {} ({:?})",
            self.listener.local_addr()?,
            self.mode
        );

        while self.state != ServerState::Done {
            self.serve_one()?;
        }

        log::info!("Provisioning finished");
        Ok(())
    }

    /// Accept and handle a single connection
    pub fn serve_one(&mut self) -> Result<(), ServerError> {
        if self.state == ServerState::Done {
            return Ok(());
        }
        self.state = ServerState::Listening;

        let (stream, peer) = match self.listener.accept() {
            Ok(conn) => conn,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionAborted | io::ErrorKind::Interrupted
                ) =>
            {
                log::debug!("accept: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        log::info!("Client connected: {}", peer);
        self.handle_connection(stream);
        Ok(())
    }

    fn handle_connection(&mut self, stream: TcpStream) {
        self.state = ServerState::ReadingRequest;

        let mut session = HttpSession::new(FdSessionOps::new(stream));
        session.set_timeout(self.read_timeout);

        let response = match read_request(&mut session) {
            Ok(request) => {
                log::debug!("{} {}", request.method(), request.target());
                self.state = ServerState::Dispatching;
                Some(self.dispatch(&request))
            }
            Err(e) => {
                log::warn!("Rejecting request: {}", e);
                error_status(&e).map(plain_response)
            }
        };

        if let Some(response) = response {
            if let Err(e) = session.write_all(&response.to_wire()) {
                log::warn!("Failed to send response: {}", e);
            }
            linger(&mut session);
        }
        let _ = session.close();

        if self.state != ServerState::Done {
            self.state = ServerState::Listening;
        }
    }

    fn dispatch(&mut self, request: &HttpRequest) -> HttpResponse {
        if !request.target().starts_with(SAVE_PATH) {
            return self.form_response(Status::OK, false);
        }

        let encoded = match request.method() {
            Method::Post => String::from_utf8_lossy(request.body()).into_owned(),
            Method::Get => request.query().unwrap_or("").to_string(),
            _ => String::new(),
        };
        let params = FormParams::parse(&encoded);
        if params.is_empty() {
            return self.form_response(Status::OK, false);
        }

        if !self.token.matches(params.get("session")) {
            log::warn!("Submission with stale or missing session ignored");
            return self.form_response(Status::OK, false);
        }

        let record = submission::record_from_params(&params);
        match self.store.save(&record) {
            Ok(()) => {
                log::info!(
                    "Saved configuration: ssid={} upload_url={} resolution={} interval={}ms",
                    record.ssid,
                    record.upload_url,
                    record.resolution.tag(),
                    record.capture_interval_ms
                );
                self.record = record;
                if self.mode == ServeMode::OneShot {
                    self.state = ServerState::Done;
                }
                self.form_response(Status::OK, true)
            }
            Err(e) => {
                log::error!("Failed to save configuration: {}", e);
                self.form_response(Status::INTERNAL_SERVER_ERROR, false)
            }
        }
    }

    fn form_response(&self, status: Status, saved: bool) -> HttpResponse {
        HttpResponse::builder()
            .status(status)
            .header("Content-Type", "text/html; charset=utf-8")
            .header("Connection", "close")
            .body(page::render(&self.record, &self.token, saved).into_bytes())
            .build()
    }
}

/// Read one request, a byte at a time up to the body
fn read_request(session: &mut HttpSession<FdSessionOps>) -> crate::http::Result<HttpRequest> {
    let mut parser = RequestParser::new();
    let mut byte = [0u8; 1];

    loop {
        let remaining = parser.body_remaining();
        let parsed = if remaining > 0 {
            let body = session.read_exact(remaining)?;
            parser.parse(&body)?
        } else {
            if session.read(&mut byte)? == 0 {
                return Err(Error::ConnectionClosed);
            }
            parser.parse(&byte)?
        };

        if let Some(request) = parsed {
            return Ok(request);
        }
    }
}

/// Half-close, then discard leftover input until the peer closes
///
/// Closing with unread input would reset the connection before the client
/// has read the response.
fn linger(session: &mut HttpSession<FdSessionOps>) {
    let _ = session.get_ref().stream().shutdown(Shutdown::Write);
    session.set_timeout(Some(LINGER_TIMEOUT));

    let mut buf = [0u8; 512];
    let mut drained = 0;
    while drained < LINGER_MAX_BYTES {
        match session.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => drained += n,
        }
    }
}

/// Status to answer a failed read with; `None` drops the connection silently
fn error_status(err: &Error) -> Option<Status> {
    match err {
        Error::HeadTooLarge(_) | Error::TooManyHeaders(_) => {
            Some(Status::HEADER_FIELDS_TOO_LARGE)
        }
        Error::BodyTooLarge(_) => Some(Status::PAYLOAD_TOO_LARGE),
        Error::Parse(_)
        | Error::InvalidVersion(_)
        | Error::InvalidMethod(_)
        | Error::InvalidHeader(_) => Some(Status::BAD_REQUEST),
        _ => None,
    }
}

fn plain_response(status: Status) -> HttpResponse {
    HttpResponse::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .header("Connection", "close")
        .body(format!("{}\n", status.reason_phrase()).into_bytes())
        .build()
}
