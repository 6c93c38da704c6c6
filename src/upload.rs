//! Multipart image uploader
//!
//! Sends one captured frame to the detector as a `multipart/form-data` POST
//! and reads back the detector's verdict. The request is assembled by hand:
//! headers and the multipart envelope are built up front so the declared
//! `Content-Length` is exact, then the image is streamed in bounded chunks
//! between the envelope's head and tail.
//!
//! Every network wait is bounded: the connect, each write (through the
//! session timeout) and the response (an inactivity timeout on the body).
//! Whatever happens, the frame handed to [`MultipartUploader::upload`] is
//! released before the call returns.

use crate::capture::{Frame, FrameSource};
use crate::clock::{Clock, SystemClock};
use crate::detection::DetectionResult;
use crate::http::parser::ParsedResponse;
use crate::http::tls::{TlsConfig, TlsError, TlsSessionOps};
use crate::http::{
    Error, FdSessionOps, HttpRequest, HttpSession, Method, ResponseReader, ResponseStatus,
    SessionOps,
};
use crate::net;
use crate::url::Url;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::time::{Duration, Instant};

/// Multipart boundary, fixed for every request
pub const BOUNDARY: &str = "----esp32_boundary";

/// Form field the image is sent under
pub const IMAGE_FIELD: &str = "image";

/// Default size of each image write
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default cap on the response body kept in memory
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024;

/// Uploader tuning
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Bound on each TCP connect attempt
    ///
    /// Host name resolution happens before this timer starts and is not
    /// bounded by it; a stalled resolver blocks for as long as the system
    /// resolver takes.
    pub connect_timeout: Duration,
    /// Bound on each write, the TLS handshake and the wait for the status line
    pub io_timeout: Duration,
    /// Inactivity bound while collecting the response body
    ///
    /// Reading the whole response is also capped at `io_timeout +
    /// response_timeout` in total.
    pub response_timeout: Duration,
    pub chunk_size: usize,
    pub body_limit: usize,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        UploaderConfig {
            connect_timeout: Duration::from_secs(8),
            io_timeout: Duration::from_secs(8),
            response_timeout: Duration::from_secs(5),
            chunk_size: DEFAULT_CHUNK_SIZE,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

/// Multipart envelope around one image
#[derive(Debug, Clone)]
pub struct UploadRequest {
    boundary: &'static str,
    head: Bytes,
    tail: Bytes,
    body_length: usize,
}

impl UploadRequest {
    /// Build the envelope for an image of `image_len` bytes
    pub fn new(filename: &str, image_len: usize) -> Self {
        let boundary = BOUNDARY;

        let mut head = BytesMut::with_capacity(160 + filename.len());
        head.put_slice(b"--");
        head.put_slice(boundary.as_bytes());
        head.put_slice(b"\r\n");
        head.put_slice(b"Content-Disposition: form-data; name=\"");
        head.put_slice(IMAGE_FIELD.as_bytes());
        head.put_slice(b"\"; filename=\"");
        head.put_slice(filename.as_bytes());
        head.put_slice(b"\"\r\n");
        head.put_slice(b"Content-Type: image/jpeg\r\n\r\n");

        let mut tail = BytesMut::with_capacity(8 + boundary.len());
        tail.put_slice(b"\r\n--");
        tail.put_slice(boundary.as_bytes());
        tail.put_slice(b"--\r\n");

        let (head, tail) = (head.freeze(), tail.freeze());
        let body_length = head.len() + image_len + tail.len();

        UploadRequest {
            boundary,
            head,
            tail,
            body_length,
        }
    }

    pub fn boundary(&self) -> &str {
        self.boundary
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn tail(&self) -> &[u8] {
        &self.tail
    }

    /// Length of head + image + tail
    pub fn body_length(&self) -> usize {
        self.body_length
    }

    /// Request line and headers for posting to `url`
    pub fn http_head(&self, url: &Url) -> HttpRequest {
        HttpRequest::builder()
            .method(Method::Post)
            .target(url.path())
            .header("Host", url.host())
            .header("Connection", "close")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", self.boundary),
            )
            .header("Content-Length", self.body_length.to_string())
            .build()
    }
}

/// Cosmetic file name for the multipart part
///
/// Uses local time when the clock knows it, otherwise the boot counter so
/// names stay unique.
pub fn capture_filename<C: Clock + ?Sized>(clock: &C) -> String {
    match clock.wall_clock() {
        Some(now) => format!("capture_{}.jpg", now.format("%Y%m%d_%H%M%S")),
        None => {
            log::warn!("Local time unavailable for image filename");
            format!("capture_unknown_{}.jpg", clock.millis_since_boot())
        }
    }
}

/// Result category of one upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The camera produced no frame
    CaptureUnavailable,
    ConnectFailed,
    /// Writing the request failed part way
    SendFailed,
    /// A response arrived; its status may be unparsable
    HttpStatus(ResponseStatus),
}

impl UploadOutcome {
    /// Integer code as reported by the device firmware
    ///
    /// -1 no frame, -2 connect, -3 send, -4 unparsable status, otherwise the
    /// HTTP status code.
    pub fn legacy_code(&self) -> i32 {
        match self {
            UploadOutcome::CaptureUnavailable => -1,
            UploadOutcome::ConnectFailed => -2,
            UploadOutcome::SendFailed => -3,
            UploadOutcome::HttpStatus(ResponseStatus::Unparsable) => -4,
            UploadOutcome::HttpStatus(ResponseStatus::Code(code)) => i32::from(*code),
        }
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::CaptureUnavailable => f.write_str("capture unavailable"),
            UploadOutcome::ConnectFailed => f.write_str("connect failed"),
            UploadOutcome::SendFailed => f.write_str("send failed"),
            UploadOutcome::HttpStatus(status) => write!(f, "HTTP {}", status),
        }
    }
}

/// Outcome plus whatever detection result could be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub outcome: UploadOutcome,
    pub detection: DetectionResult,
}

impl UploadReport {
    fn without_response(outcome: UploadOutcome) -> Self {
        UploadReport {
            outcome,
            detection: DetectionResult::default(),
        }
    }
}

/// Why a connection could not be opened
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Net(#[from] net::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

enum Connection {
    Plain(HttpSession<FdSessionOps>),
    Tls(HttpSession<TlsSessionOps>),
}

/// Multipart upload client
pub struct MultipartUploader<C: Clock = SystemClock> {
    config: UploaderConfig,
    clock: C,
}

impl MultipartUploader<SystemClock> {
    pub fn new(config: UploaderConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }
}

impl<C: Clock> MultipartUploader<C> {
    pub fn with_clock(config: UploaderConfig, clock: C) -> Self {
        MultipartUploader { config, clock }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Capture a frame from `source` and upload it
    pub fn capture_and_upload(&self, source: &mut dyn FrameSource, url: &str) -> UploadReport {
        match source.capture() {
            Some(frame) => self.upload(url, frame),
            None => {
                log::warn!("No frame available from camera");
                UploadReport::without_response(UploadOutcome::CaptureUnavailable)
            }
        }
    }

    /// Upload `frame` to `url`
    ///
    /// The frame is consumed and released before this returns, on every
    /// path.
    pub fn upload(&self, url: &str, frame: Frame) -> UploadReport {
        let started = Instant::now();
        let filename = capture_filename(&self.clock);
        let request = UploadRequest::new(&filename, frame.len());
        let url = Url::parse(url);

        log::info!(
            "Uploading {} ({} bytes) to {}",
            filename,
            frame.len(),
            url
        );

        let report = match self.open(&url) {
            Ok(Connection::Plain(mut session)) => {
                exchange(&mut session, &url, &request, frame.data(), &self.config)
            }
            Ok(Connection::Tls(mut session)) => {
                exchange(&mut session, &url, &request, frame.data(), &self.config)
            }
            Err(e) => {
                log::warn!("Connect to {} failed: {}", url, e);
                UploadReport::without_response(UploadOutcome::ConnectFailed)
            }
        };

        // Hand the buffer back to the camera
        drop(frame);

        log::info!(
            "Upload finished: {} in {:.3}s",
            report.outcome,
            started.elapsed().as_secs_f32()
        );
        report
    }

    fn open(&self, url: &Url) -> Result<Connection, ConnectError> {
        let stream = net::connect(url.host(), url.port(), self.config.connect_timeout)?;

        if !url.is_secure() {
            return Ok(Connection::Plain(HttpSession::new(FdSessionOps::new(stream))));
        }

        // Bound the blocking handshake
        stream.set_read_timeout(Some(self.config.io_timeout))?;
        stream.set_write_timeout(Some(self.config.io_timeout))?;

        let tls = TlsConfig::client()?.verify_peer(false).build();
        let session = tls.connect(stream, url.host())?;
        Ok(Connection::Tls(HttpSession::new(session)))
    }
}

/// Send the request and read the response over an open session
fn exchange<S: SessionOps>(
    session: &mut HttpSession<S>,
    url: &Url,
    request: &UploadRequest,
    image: &[u8],
    config: &UploaderConfig,
) -> UploadReport {
    session.set_timeout(Some(config.io_timeout));

    let sent_at = Instant::now();
    match send_upload(session, url, request, image, config.chunk_size) {
        Ok(written) => log::debug!(
            "Sent {} body bytes in {:.3}s",
            written,
            sent_at.elapsed().as_secs_f32()
        ),
        Err(e) => {
            log::warn!("Upload aborted: {}", e);
            let _ = session.close();
            return UploadReport::without_response(UploadOutcome::SendFailed);
        }
    }

    let response = read_response(session, config);
    let _ = session.close();

    if response.truncated {
        log::warn!("Response body cut at {} bytes", config.body_limit);
    }

    let detection = if response.body.is_empty() {
        log::debug!("Response has no body");
        DetectionResult::default()
    } else {
        DetectionResult::from_body_lossy(&response.body)
    };

    UploadReport {
        outcome: UploadOutcome::HttpStatus(response.status),
        detection,
    }
}

/// Write the request head, envelope and image
///
/// Returns the number of body bytes written, which equals the declared
/// `Content-Length` on success. A zero-byte write aborts with
/// `Error::ConnectionClosed`.
pub fn send_upload<S: SessionOps>(
    session: &mut HttpSession<S>,
    url: &Url,
    request: &UploadRequest,
    image: &[u8],
    chunk_size: usize,
) -> crate::http::Result<usize> {
    session.write_all(&request.http_head(url).head_to_wire())?;

    session.write_all(request.head())?;
    let mut written = request.head().len();

    for chunk in image.chunks(chunk_size.max(1)) {
        session.write_all(chunk)?;
        written += chunk.len();
    }

    session.write_all(request.tail())?;
    written += request.tail().len();

    Ok(written)
}

/// Collect the response until close, inactivity, the declared length or
/// the body limit
fn read_response<S: SessionOps>(
    session: &mut HttpSession<S>,
    config: &UploaderConfig,
) -> ParsedResponse {
    let mut reader = ResponseReader::new(config.body_limit);
    let mut buf = [0u8; 1024];
    // A peer that keeps trickling bytes never trips the per-read timeouts
    let deadline = Instant::now() + config.io_timeout + config.response_timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            log::debug!("Response not complete by deadline, using what arrived");
            break;
        }
        let timeout = if reader.in_body() {
            config.response_timeout
        } else {
            config.io_timeout
        }
        .min(remaining);
        session.set_timeout(Some(timeout));

        match session.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                reader.feed(&buf[..n]);
                if reader.is_done() {
                    break;
                }
            }
            Err(Error::Timeout) => {
                log::debug!("Response read timed out after {:?}", timeout);
                break;
            }
            Err(e) => {
                log::debug!("Response read ended: {}", e);
                break;
            }
        }
    }

    reader.finish()
}
