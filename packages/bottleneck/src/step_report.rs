//! Snapshots of step counters and their text rendering.

use std::fmt;
use std::iter;

use foldhash::HashMap;

use crate::template::{Template, Value};
use crate::{Result, StepCounters, StepName, WallCounters};

const STEP_FIELDS: &[&str] = &[
    "step", "sum", "min", "avg", "max", "wall_sum", "wall_min", "wall_avg", "wall_max", "calls",
    "switches",
];

const DEFAULT_STEP_FORMAT: &str = "{step}: {sum:.6f}:{min:.6f}..{avg:.6f}..{max:.6f} \
    wall={wall_sum:.6f}:{wall_min:.6f}..{wall_avg:.6f}..{wall_max:.6f} \
    calls={calls} switches={switches}";

/// Counters drained from a [`StepProfiler`](crate::StepProfiler) for one reporting interval.
///
/// Steps are ordered by descending total exclusive time.
///
/// # Examples
///
/// ```
/// use bottleneck::{StepProfiler, TaskHost};
///
/// let host = TaskHost::new();
/// let profiler = StepProfiler::builder().build();
/// profiler.attach(&host).unwrap();
///
/// profiler.begin_step("work");
/// profiler.end_scope();
///
/// let report = profiler.take_report();
/// for entry in report.steps() {
///     println!(
///         "{} ran {} times, {:?} in total",
///         entry.name(),
///         entry.counters().calls(),
///         entry.counters().sum()
///     );
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct StepReport {
    entries: Vec<StepEntry>,
}

/// Counters of one step in a [`StepReport`].
#[derive(Clone, Debug)]
pub struct StepEntry {
    name: StepName,
    counters: StepCounters,
    wall: WallCounters,
}

impl StepReport {
    pub(crate) fn from_counters(
        mut steps: HashMap<StepName, StepCounters>,
        walls: HashMap<StepName, WallCounters>,
    ) -> Self {
        let mut entries: Vec<StepEntry> = walls
            .into_iter()
            .map(|(name, wall)| {
                let counters = steps.remove(&name).unwrap_or_default();
                StepEntry {
                    name,
                    counters,
                    wall,
                }
            })
            .collect();

        entries.extend(steps.into_iter().map(|(name, counters)| StepEntry {
            name,
            counters,
            wall: WallCounters::default(),
        }));

        entries.sort_by(|a, b| {
            b.counters
                .sum()
                .cmp(&a.counters.sum())
                .then_with(|| a.name.cmp(&b.name))
        });

        Self { entries }
    }

    /// The steps in the report, ordered by descending total exclusive time.
    pub fn steps(&self) -> impl Iterator<Item = &StepEntry> {
        self.entries.iter()
    }

    /// Looks up the counters of one step.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Number of steps in the report.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recorded during the interval.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregates every step into one pseudo-step with the given name.
    ///
    /// Sums are added up, the minimum is the smallest minimum of any step that was
    /// closed at least once and the maximum is the largest such maximum.
    #[must_use]
    pub fn total(&self, name: impl Into<StepName>) -> StepEntry {
        let mut total = StepEntry {
            name: name.into(),
            counters: StepCounters::default(),
            wall: WallCounters::default(),
        };

        for entry in &self.entries {
            total.counters.merge_from(&entry.counters);
            total.wall.merge_from(&entry.wall);
        }

        total
    }

    /// Renders the report as text, the aggregate pseudo-step first.
    ///
    /// An empty report renders as an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`](crate::Error::InvalidTemplate) if the step
    /// format is malformed, even if the report is empty.
    pub fn render(&self, format: &StepReportFormat) -> Result<String> {
        let template = Template::parse(&format.step_format, STEP_FIELDS)?;

        let mut out = String::new();
        if self.is_empty() {
            return Ok(out);
        }

        let total = self.total(format.sum_step.clone());

        for (index, entry) in iter::once(&total).chain(&self.entries).enumerate() {
            if index > 0 {
                out.push_str(&format.steps_separator);
            }

            entry.render_into(&template, &mut out);
        }

        Ok(out)
    }

    /// Prints the report to stdout in the default format.
    ///
    /// Prints nothing if the report is empty.
    #[cfg_attr(test, mutants::skip)] // Too difficult to test stdout output reliably - manually tested.
    pub fn print_to_stdout(&self) {
        if self.is_empty() {
            return;
        }
        println!("{self}");
    }
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .render(&StepReportFormat::default())
            .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl StepEntry {
    /// Name of the step.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exclusive time statistics of the step.
    #[must_use]
    pub fn counters(&self) -> &StepCounters {
        &self.counters
    }

    /// Wall-clock statistics folded into the step through wall anchors.
    #[must_use]
    pub fn wall(&self) -> &WallCounters {
        &self.wall
    }

    fn render_into(&self, template: &Template, out: &mut String) {
        template.render(
            &[
                Value::Text(&self.name),
                Value::Seconds(self.counters.sum()),
                Value::Seconds(self.counters.min()),
                Value::Seconds(self.counters.mean()),
                Value::Seconds(self.counters.max()),
                Value::Seconds(self.wall.sum()),
                Value::Seconds(self.wall.min()),
                Value::Seconds(self.wall.mean()),
                Value::Seconds(self.wall.max()),
                Value::Count(self.counters.calls()),
                Value::Count(self.counters.switches()),
            ],
            out,
        );
    }
}

/// How a [`StepReport`] is rendered as text.
///
/// The step format accepts the placeholders `step`, `sum`, `min`, `avg`, `max`,
/// `wall_sum`, `wall_min`, `wall_avg`, `wall_max`, `calls` and `switches`. Times
/// are in seconds and take an optional precision, as in `{sum:.6f}`.
#[derive(Clone, Debug)]
#[must_use]
pub struct StepReportFormat {
    step_format: String,
    steps_separator: String,
    sum_step: StepName,
}

impl StepReportFormat {
    /// Sets the template of one step's line.
    pub fn step_format(self, step_format: impl Into<String>) -> Self {
        Self {
            step_format: step_format.into(),
            ..self
        }
    }

    /// Sets the text placed between two steps. Defaults to `", "`.
    pub fn steps_separator(self, steps_separator: impl Into<String>) -> Self {
        Self {
            steps_separator: steps_separator.into(),
            ..self
        }
    }

    /// Sets the name of the pseudo-step that aggregates all steps. Defaults to `"SUM"`.
    pub fn sum_step(self, sum_step: impl Into<StepName>) -> Self {
        Self {
            sum_step: sum_step.into(),
            ..self
        }
    }
}

impl Default for StepReportFormat {
    fn default() -> Self {
        Self {
            step_format: DEFAULT_STEP_FORMAT.to_string(),
            steps_separator: ", ".to_string(),
            sum_step: StepName::Borrowed("SUM"),
        }
    }
}
