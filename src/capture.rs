//! Captured image buffers
//!
//! A camera driver lends out one frame buffer at a time and must be told when
//! the buffer can be reused. `Frame` owns the bytes together with that
//! notification, and fires it exactly once when dropped, so every code path
//! that gives up a frame hands the buffer back.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Source of captured frames
pub trait FrameSource {
    /// Capture one frame, or `None` when the camera has nothing to give
    fn capture(&mut self) -> Option<Frame>;
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// An exclusively owned JPEG buffer
pub struct Frame {
    data: Vec<u8>,
    on_release: Option<ReleaseHook>,
}

impl Frame {
    /// Wrap bytes that need no release notification
    pub fn new(data: Vec<u8>) -> Self {
        Frame {
            data,
            on_release: None,
        }
    }

    /// Wrap bytes and run `on_release` once the frame is dropped
    pub fn with_release<F>(data: Vec<u8>, on_release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Frame {
            data,
            on_release: Some(Box::new(on_release)),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("has_release", &self.on_release.is_some())
            .finish()
    }
}

/// Frame source cycling through the `.jpg`/`.jpeg` files of a directory
///
/// Stands in for the camera when running on a host.
pub struct DirectorySource {
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn open<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_jpeg = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
                .unwrap_or(false);
            if is_jpeg && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(DirectorySource { files, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn capture(&mut self) -> Option<Frame> {
        if self.files.is_empty() {
            return None;
        }
        let path = &self.files[self.next % self.files.len()];
        self.next = self.next.wrapping_add(1);

        match fs::read(path) {
            Ok(data) => Some(Frame::new(data)),
            Err(e) => {
                log::warn!("Failed to read frame {}: {}", path.display(), e);
                None
            }
        }
    }
}
