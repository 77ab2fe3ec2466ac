use derive_more::Display;

/// Opaque handle of a cooperatively scheduled task.
///
/// Task identities are allocated by the host. [`TaskId::ROOT`] stands for the
/// scheduler itself (or the main flow of control before any task is started),
/// which is where control returns between task activations.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("task#{_0}")]
pub struct TaskId(u64);

impl TaskId {
    /// The scheduler or main flow of control.
    pub const ROOT: Self = Self(0);

    /// Creates a task identity from a raw value chosen by the host.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value of this task identity.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn root_is_zero() {
        assert_eq!(TaskId::ROOT.get(), 0);
        assert_eq!(TaskId::new(0), TaskId::ROOT);
    }

    #[test]
    fn display_includes_raw_value() {
        assert_eq!(TaskId::new(42).to_string(), "task#42");
    }

    static_assertions::assert_impl_all!(TaskId: Send, Sync, Copy);
}
