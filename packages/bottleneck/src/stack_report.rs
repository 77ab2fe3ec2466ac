//! Snapshots of spot and stack counters and their text rendering.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::process;

use foldhash::HashMap;

use crate::template::{Template, Value};
use crate::{Result, Spot, SpotCounters};

const COUNTER_FIELDS: &[&str] = &["seconds", "calls", "avg"];
const SPOT_FIELDS: &[&str] = &["file", "line", "func"];
const PATH_FIELDS: &[&str] = &["pid"];

/// Counters drained from a [`StackProfiler`](crate::StackProfiler) for one reporting interval.
///
/// Spots and stacks are ordered by descending time.
///
/// # Examples
///
/// ```
/// use bottleneck::{StackProfiler, TaskHost, spot};
///
/// let host = TaskHost::new();
/// let profiler = StackProfiler::builder().build();
/// profiler.attach(&host).unwrap();
///
/// host.call(spot!("handle_request"), || {
///     host.call(spot!("parse_body"), || std::hint::black_box(42));
/// });
///
/// let report = profiler.take_report();
/// for entry in report.spots() {
///     println!("{}: {} calls", entry.spot(), entry.counters().calls());
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct StackReport {
    spots: Vec<SpotEntry>,
    stacks: Vec<StackEntry>,
    cumulative: bool,
}

/// Counters of one spot in a [`StackReport`].
#[derive(Clone, Debug)]
pub struct SpotEntry {
    spot: Spot,
    counters: SpotCounters,
}

/// Counters of one full call stack in a [`StackReport`].
///
/// The stack is ordered outermost first.
#[derive(Clone, Debug)]
pub struct StackEntry {
    stack: Box<[Spot]>,
    counters: SpotCounters,
}

impl StackReport {
    pub(crate) fn from_counters(
        spots: HashMap<Spot, SpotCounters>,
        stacks: HashMap<Box<[Spot]>, SpotCounters>,
        cumulative: bool,
    ) -> Self {
        let mut spots: Vec<SpotEntry> = spots
            .into_iter()
            .map(|(spot, counters)| SpotEntry { spot, counters })
            .collect();
        spots.sort_by(|a, b| {
            b.counters
                .seconds()
                .cmp(&a.counters.seconds())
                .then_with(|| a.spot.cmp(&b.spot))
        });

        let mut stacks: Vec<StackEntry> = stacks
            .into_iter()
            .map(|(stack, counters)| StackEntry { stack, counters })
            .collect();
        stacks.sort_by(|a, b| {
            b.counters
                .seconds()
                .cmp(&a.counters.seconds())
                .then_with(|| a.stack.cmp(&b.stack))
        });

        Self {
            spots,
            stacks,
            cumulative,
        }
    }

    /// The spots in the report, ordered by descending time.
    pub fn spots(&self) -> impl Iterator<Item = &SpotEntry> {
        self.spots.iter()
    }

    /// Looks up the counters of one spot.
    #[must_use]
    pub fn spot(&self, spot: &Spot) -> Option<&SpotCounters> {
        self.spots
            .iter()
            .find(|entry| entry.spot == *spot)
            .map(|entry| &entry.counters)
    }

    /// The counted stacks, ordered by descending time.
    ///
    /// Empty unless the profiler counts stacks.
    pub fn stacks(&self) -> impl Iterator<Item = &StackEntry> {
        self.stacks.iter()
    }

    /// Looks up the counters of one stack, given outermost first.
    #[must_use]
    pub fn stack(&self, stack: &[Spot]) -> Option<&SpotCounters> {
        self.stacks
            .iter()
            .find(|entry| *entry.stack == *stack)
            .map(|entry| &entry.counters)
    }

    /// The counted stacks whose innermost spot is `spot`, ordered by descending time.
    pub fn stacks_ending_at<'a>(&'a self, spot: &'a Spot) -> impl Iterator<Item = &'a StackEntry> {
        self.stacks
            .iter()
            .filter(move |entry| entry.stack.last() == Some(spot))
    }

    /// Whether nothing was recorded during the interval.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    /// Whether spot times include the time of their callees.
    #[must_use]
    pub fn is_cumulative(&self) -> bool {
        self.cumulative
    }

    /// Sum of all spot counters.
    ///
    /// `None` for cumulative reports, where the same time is attributed to several
    /// spots and adding them up would count it more than once.
    #[must_use]
    pub fn total(&self) -> Option<SpotCounters> {
        if self.cumulative {
            return None;
        }

        let mut total = SpotCounters::default();
        for entry in &self.spots {
            total.merge_from(&entry.counters);
        }

        Some(total)
    }

    /// Renders the report as text, one line per spot.
    ///
    /// Non-cumulative reports start with the total. If stacks were counted, the top
    /// stacks of each top spot follow that spot's line, innermost spot first,
    /// and each such group ends with an empty line.
    ///
    /// An empty report renders as an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`](crate::Error::InvalidTemplate) if a template
    /// of `format` is malformed, even if the report is empty.
    pub fn render(&self, format: &StackReportFormat) -> Result<String> {
        let counters_template = Template::parse(&format.counters_format, COUNTER_FIELDS)?;
        let spot_template = Template::parse(&format.spot_format, SPOT_FIELDS)?;

        if self.is_empty() {
            return Ok(String::new());
        }

        let render_spot = |spot: &Spot, out: &mut String| {
            let file = format
                .strip_prefix
                .as_deref()
                .and_then(|prefix| spot.file().strip_prefix(prefix))
                .unwrap_or(spot.file());

            spot_template.render(
                &[
                    Value::Text(file),
                    Value::Count(u64::from(spot.line())),
                    Value::Text(spot.function()),
                ],
                out,
            );
        };

        let mut lines = Vec::new();

        if let Some(total) = self.total() {
            let mut line = render_counters(&counters_template, &total);
            line.push_str(&format.total);
            lines.push(line);
        }

        let count_stacks = !self.stacks.is_empty();

        for (index, entry) in self.spots.iter().enumerate() {
            let mut line = render_counters(&counters_template, &entry.counters);
            render_spot(&entry.spot, &mut line);
            lines.push(line);

            if !count_stacks || index >= format.stacks_for_top_spots {
                continue;
            }

            for stack in self
                .stacks_ending_at(&entry.spot)
                .take(format.stacks_per_spot)
            {
                let mut line = format.stack_indent.clone();
                counters_template.render(&counter_values(&stack.counters), &mut line);

                for (position, spot) in stack.stack.iter().rev().enumerate() {
                    if position > 0 {
                        line.push_str(&format.stack_separator);
                    }
                    render_spot(spot, &mut line);
                }

                lines.push(line);
            }

            lines.push(String::new());
        }

        Ok(lines.join(&format.lines_separator))
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

fn counter_values(counters: &SpotCounters) -> [Value<'static>; 3] {
    [
        Value::Seconds(counters.seconds()),
        Value::Count(counters.calls()),
        Value::Seconds(counters.mean()),
    ]
}

fn render_counters(template: &Template, counters: &SpotCounters) -> String {
    template.render_to_string(&counter_values(counters))
}

impl fmt::Display for StackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .render(&StackReportFormat::default())
            .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl SpotEntry {
    /// The call site.
    #[must_use]
    pub fn spot(&self) -> &Spot {
        &self.spot
    }

    /// Statistics of the call site.
    #[must_use]
    pub fn counters(&self) -> &SpotCounters {
        &self.counters
    }
}

impl StackEntry {
    /// The call stack, outermost spot first.
    #[must_use]
    pub fn stack(&self) -> &[Spot] {
        &self.stack
    }

    /// Statistics of the call stack.
    #[must_use]
    pub fn counters(&self) -> &SpotCounters {
        &self.counters
    }
}

/// How a [`StackReport`] is rendered as text and where it is written to.
///
/// The counters format accepts the placeholders `seconds`, `calls` and `avg`. The spot
/// format accepts `file`, `line` and `func`. The path format accepts `pid`.
#[derive(Clone, Debug)]
#[must_use]
pub struct StackReportFormat {
    path_format: String,
    total: String,
    counters_format: String,
    spot_format: String,
    lines_separator: String,
    stack_indent: String,
    stack_separator: String,
    stacks_for_top_spots: usize,
    stacks_per_spot: usize,
    strip_prefix: Option<Cow<'static, str>>,
}

impl StackReportFormat {
    /// Sets the path of the report file. `{pid}` is replaced with the process identifier.
    ///
    /// Defaults to `/tmp/{pid}.bottleneck`.
    pub fn path_format(self, path_format: impl Into<String>) -> Self {
        Self {
            path_format: path_format.into(),
            ..self
        }
    }

    /// Sets the name of the line that sums up all spots. Defaults to `"TOTAL"`.
    pub fn total(self, total: impl Into<String>) -> Self {
        Self {
            total: total.into(),
            ..self
        }
    }

    /// Sets the template of the counters that start every line.
    pub fn counters_format(self, counters_format: impl Into<String>) -> Self {
        Self {
            counters_format: counters_format.into(),
            ..self
        }
    }

    /// Sets the template of one spot.
    pub fn spot_format(self, spot_format: impl Into<String>) -> Self {
        Self {
            spot_format: spot_format.into(),
            ..self
        }
    }

    /// Sets the text placed between two lines. Defaults to a newline.
    pub fn lines_separator(self, lines_separator: impl Into<String>) -> Self {
        Self {
            lines_separator: lines_separator.into(),
            ..self
        }
    }

    /// Sets the indent of stack lines. Defaults to four spaces.
    pub fn stack_indent(self, stack_indent: impl Into<String>) -> Self {
        Self {
            stack_indent: stack_indent.into(),
            ..self
        }
    }

    /// Sets the text placed between two spots of a stack. Defaults to `" < "`.
    pub fn stack_separator(self, stack_separator: impl Into<String>) -> Self {
        Self {
            stack_separator: stack_separator.into(),
            ..self
        }
    }

    /// Sets how many of the top spots get their stacks listed. Defaults to 20.
    pub fn stacks_for_top_spots(self, stacks_for_top_spots: usize) -> Self {
        Self {
            stacks_for_top_spots,
            ..self
        }
    }

    /// Sets how many stacks are listed per spot. Defaults to 10.
    pub fn stacks_per_spot(self, stacks_per_spot: usize) -> Self {
        Self {
            stacks_per_spot,
            ..self
        }
    }

    /// Sets a prefix that is removed from the file of every spot, such as the
    /// directory that dependencies are built from. Defaults to none.
    pub fn strip_prefix(self, strip_prefix: impl Into<Cow<'static, str>>) -> Self {
        Self {
            strip_prefix: Some(strip_prefix.into()),
            ..self
        }
    }

    /// The report file path for the current process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`](crate::Error::InvalidTemplate) if the path
    /// format is malformed.
    pub fn report_path(&self) -> Result<PathBuf> {
        let template = Template::parse(&self.path_format, PATH_FIELDS)?;

        Ok(PathBuf::from(template.render_to_string(&[Value::Count(
            u64::from(process::id()),
        )])))
    }
}

impl Default for StackReportFormat {
    fn default() -> Self {
        Self {
            path_format: "/tmp/{pid}.bottleneck".to_string(),
            total: "TOTAL".to_string(),
            counters_format: "{seconds:.6f}/{calls}={avg:.6f} ".to_string(),
            spot_format: "{file}:{line} {func}".to_string(),
            lines_separator: "\n".to_string(),
            stack_indent: " ".repeat(4),
            stack_separator: " < ".to_string(),
            stacks_for_top_spots: 20,
            stacks_per_spot: 10,
            strip_prefix: None,
        }
    }
}
