//! Real platform implementation using operating system time sources.

use std::time::{Duration, Instant};

use cpu_time::ThreadTime;

use crate::pal::abstractions::Platform;

/// Real implementation of the platform abstraction.
///
/// Wall time is measured from the moment the platform was created.
#[derive(Clone, Debug)]
pub(crate) struct RealPlatform {
    origin: Instant,
}

impl RealPlatform {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Platform for RealPlatform {
    fn wall_time(&self) -> Duration {
        self.origin.elapsed()
    }

    fn thread_time(&self) -> Duration {
        ThreadTime::now().as_duration()
    }
}
