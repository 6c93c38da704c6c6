//! Time sources for the uploader

use chrono::{DateTime, Local, NaiveDateTime};
use std::time::Instant;

/// Clock collaborator
///
/// The wall clock is only available once it has been synchronised, so it is
/// optional; the boot counter always works.
pub trait Clock {
    /// Local wall-clock time, if known
    fn wall_clock(&self) -> Option<NaiveDateTime>;

    /// Milliseconds since the device (or process) started
    fn millis_since_boot(&self) -> u64;
}

/// Host clock backed by the system time
pub struct SystemClock {
    boot: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            boot: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_clock(&self) -> Option<NaiveDateTime> {
        let now: DateTime<Local> = Local::now();
        Some(now.naive_local())
    }

    fn millis_since_boot(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }
}

/// Clock with fixed readings, for tests and replay
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub wall: Option<NaiveDateTime>,
    pub millis: u64,
}

impl Clock for FixedClock {
    fn wall_clock(&self) -> Option<NaiveDateTime> {
        self.wall
    }

    fn millis_since_boot(&self) -> u64 {
        self.millis
    }
}
