//! Integration tests for the multipart uploader
//!
//! Each test runs a throwaway backend on a loopback listener and checks what
//! actually went over the wire.

use camlink::capture::Frame;
use camlink::clock::FixedClock;
use camlink::http::tls::TlsConfig;
use camlink::http::{FdSessionOps, HttpSession, ResponseStatus, SessionOps};
use camlink::upload::{MultipartUploader, UploadOutcome, UploadRequest, UploaderConfig};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

const DETECTION_JSON: &str = concat!(
    r#"{"circles":[{"radius":12,"status":"filled","x":40,"y":61},"#,
    r#"{"radius":9,"status":"empty","x":100,"y":20}],"#,
    r#""message":"Image capture_unknown_42.jpg uploaded successfully"}"#
);

fn uploader() -> MultipartUploader<FixedClock> {
    let config = UploaderConfig {
        connect_timeout: Duration::from_secs(2),
        io_timeout: Duration::from_secs(2),
        response_timeout: Duration::from_secs(2),
        ..UploaderConfig::default()
    };
    MultipartUploader::with_clock(
        config,
        FixedClock {
            wall: None,
            millis: 42,
        },
    )
}

fn counted_frame(data: Vec<u8>) -> (Frame, Arc<AtomicUsize>) {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let frame = Frame::with_release(data, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (frame, released)
}

fn test_image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one upload request: head text and exactly Content-Length body bytes
fn receive_upload<S: SessionOps>(session: &mut HttpSession<S>) -> (String, Vec<u8>) {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = find(&raw, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = session.read(&mut buf).unwrap();
        assert!(n > 0, "client closed before end of headers");
        raw.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8(raw[..head_end].to_vec()).unwrap();
    let length: usize = head
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    let mut body = raw[head_end..].to_vec();
    if body.len() < length {
        body.extend(session.read_exact(length - body.len()).unwrap());
    }
    assert_eq!(body.len(), length);
    (head, body)
}

/// Plain backend answering one upload with `response`
fn spawn_backend(response: Vec<u8>) -> (SocketAddr, thread::JoinHandle<(String, Vec<u8>)>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut session = HttpSession::new(FdSessionOps::new(stream));
        let received = receive_upload(&mut session);
        session.write_all(&response).unwrap();
        session.close().unwrap();
        received
    });

    (addr, handle)
}

fn json_response(status_line: &str, body: &str) -> Vec<u8> {
    format!(
        "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    )
    .into_bytes()
}

#[test]
fn test_upload_plain_http() {
    let (addr, backend) = spawn_backend(json_response("HTTP/1.1 200 OK", DETECTION_JSON));
    let image = test_image(20_000);
    let (frame, released) = counted_frame(image.clone());

    let url = format!("http://{}/upload", addr);
    let report = uploader().upload(&url, frame);

    assert_eq!(report.outcome, UploadOutcome::HttpStatus(ResponseStatus::Code(200)));
    assert_eq!(report.detection.detections.len(), 2);
    assert_eq!(report.detection.detections[1].status, "empty");
    assert_eq!(report.detection.detections[0].x, 40);
    assert!(report.detection.message.contains("uploaded successfully"));
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let (head, body) = backend.join().unwrap();
    assert!(head.starts_with("POST /upload HTTP/1.1\r\n"));
    assert!(head.contains("Host: 127.0.0.1\r\n"));
    assert!(head.contains("Content-Type: multipart/form-data; boundary=----esp32_boundary\r\n"));

    // Declared length matches what was sent, and the envelope wraps the image
    let envelope = UploadRequest::new("capture_unknown_42.jpg", image.len());
    assert_eq!(body.len(), envelope.body_length());
    assert!(body.starts_with(envelope.head()));
    assert!(body.ends_with(envelope.tail()));
    assert_eq!(
        &body[envelope.head().len()..body.len() - envelope.tail().len()],
        &image[..]
    );
}

#[test]
fn test_upload_over_tls() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server_tls = TlsConfig::server().unwrap().build().unwrap();

    let backend = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let tls = server_tls.accept(stream).unwrap();
        let mut session = HttpSession::new(tls);
        let (_, body) = receive_upload(&mut session);
        session
            .write_all(&json_response("HTTP/1.1 201 Created", DETECTION_JSON))
            .unwrap();
        let _ = session.close();
        body.len()
    });

    let (frame, released) = counted_frame(test_image(9_000));
    let report = uploader().upload(&format!("https://{}/api/upload", addr), frame);

    assert_eq!(report.outcome, UploadOutcome::HttpStatus(ResponseStatus::Code(201)));
    assert_eq!(report.outcome.legacy_code(), 201);
    assert_eq!(report.detection.detections.len(), 2);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let body_len = backend.join().unwrap();
    assert_eq!(
        body_len,
        UploadRequest::new("capture_unknown_42.jpg", 9_000).body_length()
    );
}

#[test]
fn test_non_json_body_keeps_status() {
    let response =
        b"HTTP/1.1 500 Internal Server Error\r\nConnection: close\r\n\r\nsomething broke".to_vec();
    let (addr, backend) = spawn_backend(response);
    let (frame, released) = counted_frame(test_image(100));

    let report = uploader().upload(&format!("http://{}/upload", addr), frame);

    assert_eq!(report.outcome, UploadOutcome::HttpStatus(ResponseStatus::Code(500)));
    assert!(report.detection.is_empty());
    assert_eq!(released.load(Ordering::SeqCst), 1);
    backend.join().unwrap();
}

#[test]
fn test_unparsable_status_line() {
    let (addr, backend) = spawn_backend(json_response("HTTP/1.0 200 OK", "{}"));
    let (frame, _) = counted_frame(test_image(10));

    let report = uploader().upload(&format!("http://{}/upload", addr), frame);

    assert_eq!(report.outcome, UploadOutcome::HttpStatus(ResponseStatus::Unparsable));
    assert_eq!(report.outcome.legacy_code(), -4);
    backend.join().unwrap();
}

#[test]
fn test_connect_failure_releases_frame() {
    // Grab a free port, then close it again
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let (frame, released) = counted_frame(test_image(10));

    let report = uploader().upload(&format!("http://{}/upload", addr), frame);

    assert_eq!(report.outcome, UploadOutcome::ConnectFailed);
    assert_eq!(report.outcome.legacy_code(), -2);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unresolvable_host() {
    let (frame, released) = counted_frame(test_image(10));
    let report = uploader().upload("http:///upload", frame);

    assert_eq!(report.outcome, UploadOutcome::ConnectFailed);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stalled_backend_is_send_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    // Accept but never read, so the socket buffers fill up
    let backend = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let _ = done_rx.recv();
        drop(stream);
    });

    let config = UploaderConfig {
        io_timeout: Duration::from_millis(300),
        ..UploaderConfig::default()
    };
    let uploader = MultipartUploader::with_clock(
        config,
        FixedClock {
            wall: None,
            millis: 0,
        },
    );
    let (frame, released) = counted_frame(vec![0x5a; 64 * 1024 * 1024]);

    let report = uploader.upload(&format!("http://{}/upload", addr), frame);

    assert_eq!(report.outcome, UploadOutcome::SendFailed);
    assert_eq!(report.outcome.legacy_code(), -3);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    done_tx.send(()).unwrap();
    backend.join().unwrap();
}

#[test]
fn test_body_read_until_close() {
    // No Content-Length: the body ends when the backend closes
    let response =
        format!("HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n{}", DETECTION_JSON).into_bytes();
    let (addr, backend) = spawn_backend(response);
    let (frame, _) = counted_frame(test_image(5_000));

    let report = uploader().upload(&format!("http://{}/upload", addr), frame);

    assert_eq!(report.outcome, UploadOutcome::HttpStatus(ResponseStatus::Code(200)));
    assert_eq!(report.detection.detections.len(), 2);
    backend.join().unwrap();
}

#[test]
fn test_trickling_backend_is_cut_off() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    // Status line, then a header that never ends, one byte per 100 ms
    let backend = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut session = HttpSession::new(FdSessionOps::new(stream));
        receive_upload(&mut session);
        session.write_all(b"HTTP/1.1 200 OK\r\nX-Slow: ").unwrap();
        for _ in 0..100 {
            thread::sleep(Duration::from_millis(100));
            if session.write_all(b"a").is_err() {
                break;
            }
        }
    });

    let config = UploaderConfig {
        connect_timeout: Duration::from_secs(2),
        io_timeout: Duration::from_millis(400),
        response_timeout: Duration::from_millis(400),
        ..UploaderConfig::default()
    };
    let uploader = MultipartUploader::with_clock(
        config,
        FixedClock {
            wall: None,
            millis: 0,
        },
    );
    let (frame, released) = counted_frame(test_image(1_000));

    let started = Instant::now();
    let report = uploader.upload(&format!("http://{}/upload", addr), frame);

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.outcome, UploadOutcome::HttpStatus(ResponseStatus::Code(200)));
    assert!(report.detection.is_empty());
    assert_eq!(released.load(Ordering::SeqCst), 1);
    backend.join().unwrap();
}
