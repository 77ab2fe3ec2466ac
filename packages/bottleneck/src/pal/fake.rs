//! Fake platform implementation for testing.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::pal::abstractions::Platform;

/// Fake implementation of the platform abstraction for testing.
///
/// Time never moves on its own. Clones share the same readings, so a test can keep
/// one clone and move time forward while a profiler holds another.
#[derive(Clone, Debug)]
pub(crate) struct FakePlatform {
    wall: Rc<Cell<Duration>>,
    thread: Rc<Cell<Duration>>,
}

impl FakePlatform {
    /// Creates a new fake platform with both readings at zero.
    pub(crate) fn new() -> Self {
        Self {
            wall: Rc::new(Cell::new(Duration::ZERO)),
            thread: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Simulates the current thread being busy for `duration`.
    ///
    /// Both the wall clock and the thread processor time move forward.
    pub(crate) fn advance(&self, duration: Duration) {
        self.wall.set(self.wall.get().saturating_add(duration));
        self.thread.set(self.thread.get().saturating_add(duration));
    }

    /// Simulates the thread being idle for `duration`.
    ///
    /// Only the wall clock moves forward.
    pub(crate) fn advance_idle(&self, duration: Duration) {
        self.wall.set(self.wall.get().saturating_add(duration));
    }
}

impl Platform for FakePlatform {
    fn wall_time(&self) -> Duration {
        self.wall.get()
    }

    fn thread_time(&self) -> Duration {
        self.thread.get()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn initializes_with_zero_time() {
        let platform = FakePlatform::new();
        assert_eq!(platform.wall_time(), Duration::ZERO);
        assert_eq!(platform.thread_time(), Duration::ZERO);
    }

    #[test]
    fn advance_moves_both_readings() {
        let platform = FakePlatform::new();
        platform.advance(Duration::from_millis(150));

        assert_eq!(platform.wall_time(), Duration::from_millis(150));
        assert_eq!(platform.thread_time(), Duration::from_millis(150));
    }

    #[test]
    fn advance_idle_moves_only_wall_time() {
        let platform = FakePlatform::new();
        platform.advance(Duration::from_millis(10));
        platform.advance_idle(Duration::from_millis(90));

        assert_eq!(platform.wall_time(), Duration::from_millis(100));
        assert_eq!(platform.thread_time(), Duration::from_millis(10));
    }

    #[test]
    fn shared_state_between_clones() {
        let platform1 = FakePlatform::new();
        let platform2 = platform1.clone();

        platform1.advance(Duration::from_millis(100));
        assert_eq!(platform2.wall_time(), Duration::from_millis(100));

        platform2.advance_idle(Duration::from_millis(200));
        assert_eq!(platform1.wall_time(), Duration::from_millis(300));
    }
}
