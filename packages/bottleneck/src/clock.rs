use std::time::Duration;

use derive_more::Display;

use crate::pal::{Platform, PlatformFacade};

/// Which time source a [`Clock`] reads.
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ClockKind {
    /// Monotonic wall-clock time. Time passes even while the thread is blocked.
    #[default]
    #[display("wall")]
    Wall,

    /// Processor time consumed by the current thread. Time does not pass while
    /// the thread is blocked in the operating system.
    #[display("thread processor")]
    ThreadProcessor,
}

/// Monotonic time reader used by the profilers to timestamp events.
///
/// Timestamps are offsets from an origin that is fixed per clock, so only timestamps
/// from clones of the same clock can be compared with each other.
#[derive(Clone, Debug)]
pub struct Clock {
    kind: ClockKind,
    platform: PlatformFacade,
}

impl Clock {
    /// Creates a clock that reads the given time source.
    #[must_use]
    pub fn new(kind: ClockKind) -> Self {
        Self::with_platform(kind, PlatformFacade::real())
    }

    pub(crate) fn with_platform(kind: ClockKind, platform: PlatformFacade) -> Self {
        Self { kind, platform }
    }

    /// The time source this clock reads.
    #[must_use]
    pub fn kind(&self) -> ClockKind {
        self.kind
    }

    /// The current timestamp.
    #[must_use]
    pub fn now(&self) -> Duration {
        match self.kind {
            ClockKind::Wall => self.platform.wall_time(),
            ClockKind::ThreadProcessor => self.platform.thread_time(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use super::*;
    use crate::pal::FakePlatform;

    #[test]
    fn wall_clock_sees_idle_time() {
        let platform = FakePlatform::new();
        let clock = Clock::with_platform(ClockKind::Wall, PlatformFacade::fake(platform.clone()));

        platform.advance(Duration::from_millis(5));
        platform.advance_idle(Duration::from_millis(20));

        assert_eq!(clock.now(), Duration::from_millis(25));
    }

    #[test]
    fn thread_processor_clock_ignores_idle_time() {
        let platform = FakePlatform::new();
        let clock = Clock::with_platform(
            ClockKind::ThreadProcessor,
            PlatformFacade::fake(platform.clone()),
        );

        platform.advance(Duration::from_millis(5));
        platform.advance_idle(Duration::from_millis(20));

        assert_eq!(clock.now(), Duration::from_millis(5));
    }

    #[test]
    fn kind_is_displayed_in_words() {
        assert_eq!(ClockKind::Wall.to_string(), "wall");
        assert_eq!(ClockKind::ThreadProcessor.to_string(), "thread processor");
    }

    #[test]
    #[cfg(not(miri))] // Miri cannot talk to the real platform.
    fn real_clock_moves_forward() {
        let clock = Clock::new(ClockKind::Wall);

        let first = clock.now();
        thread::sleep(Duration::from_millis(2));

        assert!(clock.now() > first);
    }
}
