//! # camlink command-line entry point
//!
//! Thin wrapper over the library:
//!
//! ```bash
//! camlink upload --url http://detector.local:5000/upload --image frame.jpg
//! camlink provision --config config.json --bind 0.0.0.0:8080
//! camlink run --config config.json --images ./frames
//! ```

use anyhow::{bail, Context};
use camlink::capture::{DirectorySource, Frame};
use camlink::config::{ConfigStore, JsonFileStore};
use camlink::provision::{ConfigHttpServer, ServeMode, ServerConfig};
use camlink::upload::{MultipartUploader, UploadReport, UploaderConfig};
use clap::{Args, Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload one JPEG file and print the detector's answer
    Upload {
        /// Detector endpoint, e.g. https://detector.local/upload
        #[arg(short, long)]
        url: String,

        /// JPEG file to send
        #[arg(short, long)]
        image: PathBuf,

        #[command(flatten)]
        tuning: UploadTuning,
    },

    /// Serve the configuration page until a configuration is saved
    Provision {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long, default_value = "0.0.0.0:80")]
        bind: SocketAddr,

        /// Keep serving after a save
        #[arg(long)]
        persistent: bool,

        /// Bound on each request read, in milliseconds
        #[arg(long)]
        read_timeout_ms: Option<u64>,
    },

    /// Capture and upload periodically using the stored configuration
    Run {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Directory of JPEG files standing in for the camera
        #[arg(short, long)]
        images: PathBuf,

        /// Stop after this many uploads
        #[arg(long)]
        count: Option<u64>,

        #[command(flatten)]
        tuning: UploadTuning,
    },
}

#[derive(Args, Debug)]
struct UploadTuning {
    #[arg(long, default_value_t = 8000)]
    connect_timeout_ms: u64,

    #[arg(long, default_value_t = 8000)]
    io_timeout_ms: u64,

    /// Inactivity bound while reading the response body
    #[arg(long, default_value_t = 5000)]
    response_timeout_ms: u64,

    #[arg(long, default_value_t = camlink::upload::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

impl UploadTuning {
    fn to_config(&self) -> UploaderConfig {
        UploaderConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            chunk_size: self.chunk_size,
            ..UploaderConfig::default()
        }
    }
}

/// Timestamped logger; `RUST_LOG` overrides the default INFO level
fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn report(report: &UploadReport) {
    log::info!(
        "Outcome: {} (code {})",
        report.outcome,
        report.outcome.legacy_code()
    );
    if !report.detection.message.is_empty() {
        log::info!("Message: {}", report.detection.message);
    }
    report.detection.log_summary();
}

fn upload(url: &str, image: PathBuf, tuning: &UploadTuning) -> anyhow::Result<()> {
    let data = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
    let uploader = MultipartUploader::new(tuning.to_config());

    let result = uploader.upload(url, Frame::new(data));
    report(&result);
    Ok(())
}

fn provision(
    config: PathBuf,
    bind: SocketAddr,
    persistent: bool,
    read_timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let server_config = ServerConfig {
        bind,
        mode: if persistent {
            ServeMode::Persistent
        } else {
            ServeMode::OneShot
        },
        read_timeout: read_timeout_ms.map(Duration::from_millis),
    };

    let mut server = ConfigHttpServer::bind(server_config, JsonFileStore::new(config))
        .with_context(|| format!("binding {}", bind))?;
    log::info!("Session token: {}", server.token());
    server.run()?;
    Ok(())
}

fn run(
    config: PathBuf,
    images: PathBuf,
    count: Option<u64>,
    tuning: &UploadTuning,
) -> anyhow::Result<()> {
    let record = JsonFileStore::new(&config)
        .load()
        .with_context(|| format!("loading {}", config.display()))?;
    if record.upload_url.is_empty() {
        bail!("{} has no upload URL; run `camlink provision` first", config.display());
    }

    let mut source = DirectorySource::open(&images)
        .with_context(|| format!("opening {}", images.display()))?;
    if source.is_empty() {
        log::warn!("No JPEG files in {}", images.display());
    }
    let uploader = MultipartUploader::new(tuning.to_config());
    let interval = Duration::from_millis(u64::from(record.capture_interval_ms));

    log::info!(
        "Uploading to {} every {:?} at {}",
        record.upload_url,
        interval,
        record.resolution
    );

    let mut sent = 0u64;
    while count.map_or(true, |n| sent < n) {
        let result = uploader.capture_and_upload(&mut source, &record.upload_url);
        report(&result);
        sent += 1;
        thread::sleep(interval);
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();

    match cli.command {
        Command::Upload { url, image, tuning } => upload(&url, image, &tuning),
        Command::Provision {
            config,
            bind,
            persistent,
            read_timeout_ms,
        } => provision(config, bind, persistent, read_timeout_ms),
        Command::Run {
            config,
            images,
            count,
            tuning,
        } => run(config, images, count, &tuning),
    }
}
