//! camlink - camera upload link and provisioning server
//!
//! This crate provides the two HTTP/1.1 engines of a periodic-capture camera
//! device, written directly on raw sockets: a multipart image uploader that
//! talks to a remote detector, and a single-connection configuration server
//! used while the device is being provisioned.

pub mod capture;
pub mod clock;
pub mod config;
pub mod detection;
pub mod http;
pub mod net;
pub mod provision;
pub mod token;
pub mod upload;
pub mod url;

pub use capture::{Frame, FrameSource};
pub use config::{ConfigRecord, ConfigStore, JsonFileStore, Resolution};
pub use detection::{Circle, DetectionResult};
pub use provision::{ConfigHttpServer, ServeMode, ServerConfig};
pub use token::SessionToken;
pub use upload::{MultipartUploader, UploadOutcome, UploadReport, UploaderConfig};
pub use url::Url;
