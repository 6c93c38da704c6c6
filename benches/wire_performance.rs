//! Wire-level benchmarks
//!
//! Measures the hand-rolled HTTP paths without a network:
//! - Multipart envelope and request head construction
//! - Streaming an image through the session layer at different chunk sizes
//! - Byte-at-a-time request parsing as done by the provisioning server
//! - Form decoding and response reading
//!
//! Run with: cargo bench --bench wire_performance

use camlink::http::form::FormParams;
use camlink::http::{HttpSession, PollEvents, RequestParser, ResponseReader, SessionOps};
use camlink::upload::{send_upload, UploadRequest};
use camlink::url::Url;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

/// Transport that accepts and discards everything
struct Sink {
    written: usize,
}

impl SessionOps for Sink {
    fn poll(
        &self,
        _events: PollEvents,
        _timeout: Option<Duration>,
    ) -> camlink::http::Result<bool> {
        Ok(true)
    }

    fn read(&mut self, _buf: &mut [u8]) -> camlink::http::Result<usize> {
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> camlink::http::Result<usize> {
        self.written += buf.len();
        Ok(buf.len())
    }

    fn close(&mut self) -> camlink::http::Result<()> {
        Ok(())
    }
}

fn bench_request_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_construction");
    let url = Url::parse("https://detector.example:8443/api/v1/upload");

    group.bench_function("envelope", |b| {
        b.iter(|| {
            let request =
                UploadRequest::new(black_box("capture_20250101_120000.jpg"), black_box(48_213));
            black_box(request);
        });
    });

    group.bench_function("envelope_and_head", |b| {
        b.iter(|| {
            let request = UploadRequest::new("capture_20250101_120000.jpg", 48_213);
            black_box(request.http_head(black_box(&url)).head_to_wire());
        });
    });

    group.bench_function("url_parse", |b| {
        b.iter(|| black_box(Url::parse(black_box("https://detector.example:8443/api/v1/upload"))));
    });

    group.finish();
}

fn bench_image_streaming(c: &mut Criterion) {
    let mut group = c.benchmark_group("image_streaming");
    let url = Url::parse("http://detector.local/upload");

    for size in [32 * 1024, 256 * 1024, 1024 * 1024] {
        let image = vec![0xa5u8; size];
        let request = UploadRequest::new("capture.jpg", size);
        group.throughput(Throughput::Bytes(size as u64));

        for chunk in [1024usize, 4096, 16384] {
            group.bench_with_input(
                BenchmarkId::new(format!("chunk_{}", chunk), size),
                &image,
                |b, image| {
                    b.iter(|| {
                        let mut session = HttpSession::new(Sink { written: 0 });
                        let n = send_upload(&mut session, &url, &request, image, chunk).unwrap();
                        black_box(n);
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_request_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parsing");

    let body = "session=0123456789abcdef&ssid=Home+WiFi&password=s%26cret\
                &upload_base=http%3A%2F%2F192.168.1.20%3A5000&upload_endpoint=upload\
                &interval=2000&res=vga&vflip=0&bright=0&sat=0";
    let raw = format!(
        "POST /save HTTP/1.1\r\nHost: 192.168.4.1\r\nUser-Agent: Mozilla/5.0\r\n\
         Accept: text/html\r\nContent-Type: application/x-www-form-urlencoded\r\n\
         Content-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    group.throughput(Throughput::Bytes(raw.len() as u64));

    group.bench_function("byte_at_a_time", |b| {
        b.iter(|| {
            let mut parser = RequestParser::new();
            for byte in raw.as_bytes() {
                if let Some(request) = parser.parse(std::slice::from_ref(byte)).unwrap() {
                    black_box(request);
                    break;
                }
            }
        });
    });

    group.bench_function("whole_buffer", |b| {
        b.iter(|| {
            let mut parser = RequestParser::new();
            black_box(parser.parse(black_box(raw.as_bytes())).unwrap());
        });
    });

    group.bench_function("form_decode", |b| {
        b.iter(|| black_box(FormParams::parse(black_box(body))));
    });

    group.finish();
}

fn bench_response_reading(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_reading");

    let json = concat!(
        r#"{"circles":[{"radius":12,"status":"filled","x":40,"y":61},"#,
        r#"{"radius":9,"status":"empty","x":100,"y":20}],"message":"ok"}"#
    );
    let raw = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        json.len(),
        json
    );

    group.bench_function("status_headers_body", |b| {
        b.iter(|| {
            let mut reader = ResponseReader::new(16 * 1024);
            reader.feed(black_box(raw.as_bytes()));
            black_box(reader.finish());
        });
    });

    group.finish();
}

criterion_group! {
    name = construction;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(500);
    targets = bench_request_construction
}

criterion_group! {
    name = streaming;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets = bench_image_streaming
}

criterion_group! {
    name = parsing;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(500);
    targets =
        bench_request_parsing,
        bench_response_reading
}

criterion_main!(construction, streaming, parsing);
