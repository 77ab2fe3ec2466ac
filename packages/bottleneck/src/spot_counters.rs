use std::time::Duration;

use crate::step_counters::mean;

/// Time and call statistics of one spot or one stack.
///
/// Depending on how the [`StackProfiler`](crate::StackProfiler) is configured,
/// `seconds` is either exclusive time or exclusive time plus the time of all callees.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SpotCounters {
    seconds: Duration,
    calls: u64,
}

impl SpotCounters {
    pub(crate) fn add_seconds(&mut self, elapsed: Duration) {
        self.seconds = self.seconds.checked_add(elapsed).expect(
            "spot time accumulation overflows Duration - this indicates an unrealistic scenario",
        );
    }

    pub(crate) fn add_call(&mut self) {
        self.calls = self
            .calls
            .checked_add(1)
            .expect("spot call count overflows u64 - this indicates an unrealistic scenario");
    }

    pub(crate) fn merge_from(&mut self, other: &Self) {
        self.add_seconds(other.seconds);
        self.calls = self
            .calls
            .checked_add(other.calls)
            .expect("spot call count overflows u64 - this indicates an unrealistic scenario");
    }

    /// Total time attributed.
    #[must_use]
    pub fn seconds(&self) -> Duration {
        self.seconds
    }

    /// Number of calls observed.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Time per call, or zero if no calls were observed.
    #[must_use]
    pub fn mean(&self) -> Duration {
        mean(self.seconds, self.calls)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn mean_is_zero_without_calls() {
        let mut counters = SpotCounters::default();
        counters.add_seconds(Duration::from_secs(2));

        assert_eq!(counters.mean(), Duration::ZERO);
    }

    #[test]
    fn mean_divides_by_calls() {
        let mut counters = SpotCounters::default();
        counters.add_call();
        counters.add_call();
        counters.add_seconds(Duration::from_millis(300));

        assert_eq!(counters.mean(), Duration::from_millis(150));
    }

    #[test]
    fn merge_adds_everything() {
        let mut a = SpotCounters::default();
        a.add_call();
        a.add_seconds(Duration::from_millis(10));

        let mut b = SpotCounters::default();
        b.add_call();
        b.add_seconds(Duration::from_millis(30));

        a.merge_from(&b);

        assert_eq!(a.calls(), 2);
        assert_eq!(a.seconds(), Duration::from_millis(40));
    }
}
