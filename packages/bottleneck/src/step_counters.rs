use std::time::Duration;

/// Exclusive time statistics of one step.
///
/// `calls` counts how many times the step was closed. `switches` counts how many
/// times a task was suspended while the step was active on it, so a step can have
/// switches recorded before it has been closed even once.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StepCounters {
    sum: Duration,
    min: Duration,
    max: Duration,
    calls: u64,
    switches: u64,
}

impl StepCounters {
    /// Records one closed occurrence of the step that held the processor for `exclusive`.
    pub(crate) fn record(&mut self, exclusive: Duration) {
        if self.calls == 0 {
            self.min = exclusive;
            self.max = exclusive;
        } else {
            self.min = self.min.min(exclusive);
            self.max = self.max.max(exclusive);
        }

        self.sum = self.sum.checked_add(exclusive).expect(
            "step time accumulation overflows Duration - this indicates an unrealistic scenario",
        );
        self.calls = self
            .calls
            .checked_add(1)
            .expect("step call count overflows u64 - this indicates an unrealistic scenario");
    }

    /// Records one suspension of a task while the step was active on it.
    pub(crate) fn record_switch(&mut self) {
        self.switches = self
            .switches
            .checked_add(1)
            .expect("switch count overflows u64 - this indicates an unrealistic scenario");
    }

    /// Folds `other` into `self` as if all its occurrences had been recorded here.
    pub(crate) fn merge_from(&mut self, other: &Self) {
        if other.calls != 0 {
            if self.calls == 0 {
                self.min = other.min;
                self.max = other.max;
            } else {
                self.min = self.min.min(other.min);
                self.max = self.max.max(other.max);
            }
        }

        self.sum = self.sum.checked_add(other.sum).expect(
            "step time accumulation overflows Duration - this indicates an unrealistic scenario",
        );
        self.calls = self
            .calls
            .checked_add(other.calls)
            .expect("step call count overflows u64 - this indicates an unrealistic scenario");
        self.switches = self
            .switches
            .checked_add(other.switches)
            .expect("switch count overflows u64 - this indicates an unrealistic scenario");
    }

    /// Total exclusive time of all closed occurrences.
    #[must_use]
    pub fn sum(&self) -> Duration {
        self.sum
    }

    /// Shortest closed occurrence, zero if there were none.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Longest closed occurrence, zero if there were none.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Mean exclusive time per closed occurrence, zero if there were none.
    #[must_use]
    pub fn mean(&self) -> Duration {
        mean(self.sum, self.calls)
    }

    /// How many times the step was closed.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// How many times a task was switched out while the step was active.
    #[must_use]
    pub fn switches(&self) -> u64 {
        self.switches
    }
}

/// Wall-clock statistics of one step, folded from wall anchors.
///
/// Independent of [`StepCounters`]: `count` is the number of wall intervals folded,
/// not the number of times the step was closed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WallCounters {
    sum: Duration,
    min: Duration,
    max: Duration,
    count: u64,
}

impl WallCounters {
    /// Records one wall-clock interval.
    pub(crate) fn record(&mut self, elapsed: Duration) {
        if self.count == 0 {
            self.min = elapsed;
            self.max = elapsed;
        } else {
            self.min = self.min.min(elapsed);
            self.max = self.max.max(elapsed);
        }

        self.sum = self.sum.checked_add(elapsed).expect(
            "wall time accumulation overflows Duration - this indicates an unrealistic scenario",
        );
        self.count = self
            .count
            .checked_add(1)
            .expect("wall interval count overflows u64 - this indicates an unrealistic scenario");
    }

    pub(crate) fn merge_from(&mut self, other: &Self) {
        if other.count != 0 {
            if self.count == 0 {
                self.min = other.min;
                self.max = other.max;
            } else {
                self.min = self.min.min(other.min);
                self.max = self.max.max(other.max);
            }
        }

        self.sum = self.sum.checked_add(other.sum).expect(
            "wall time accumulation overflows Duration - this indicates an unrealistic scenario",
        );
        self.count = self
            .count
            .checked_add(other.count)
            .expect("wall interval count overflows u64 - this indicates an unrealistic scenario");
    }

    /// Total wall-clock time of all folded intervals.
    #[must_use]
    pub fn sum(&self) -> Duration {
        self.sum
    }

    /// Shortest folded interval, zero if there were none.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Longest folded interval, zero if there were none.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Mean folded interval, zero if there were none.
    #[must_use]
    pub fn mean(&self) -> Duration {
        mean(self.sum, self.count)
    }

    /// How many wall intervals were folded.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }
}

pub(crate) fn mean(sum: Duration, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(
            sum.as_nanos()
                .checked_div(u128::from(count))
                .expect("guarded by if condition")
                .try_into()
                .expect("all realistic values fit in u64"),
        )
    }
}
