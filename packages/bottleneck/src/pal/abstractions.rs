//! Platform abstraction trait definitions.

use std::fmt::Debug;
use std::time::Duration;

/// Provides the raw time readings that clocks are built from.
///
/// Both readings are monotonic offsets from an arbitrary origin that stays fixed
/// for the lifetime of the platform instance.
pub(crate) trait Platform: Debug + 'static {
    /// Gets the elapsed wall-clock time.
    fn wall_time(&self) -> Duration;

    /// Gets the processor time consumed by the current thread.
    fn thread_time(&self) -> Duration;
}
