//! Call-stack time attribution.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::mem;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use foldhash::{HashMap, HashMapExt};
use tracing::{debug, trace};

use crate::pal::PlatformFacade;
use crate::{
    CallEvent, CallKind, Clock, ClockKind, Error, HookId, Host, Result, Spot, SpotCounters,
    StackReport, StackReportFormat, SwitchEvent, TaskId,
};

/// Attributes processor time to the functions on each task's call stack.
///
/// Time between two consecutive call, return or switch events of a task is charged
/// to the spot at the top of that task's stack. Time that a task spends suspended is
/// not charged to anything. Optionally the time is also charged to every full
/// stack, to every caller on the stack, or only to stacks that pass through one
/// particular spot.
///
/// The host must report function calls and returns, for example through
/// [`TaskHost::enter`](crate::TaskHost::enter).
///
/// # Examples
///
/// ```
/// use bottleneck::{StackProfiler, StackReportFormat, TaskHost, spot};
///
/// let host = TaskHost::new();
/// let profiler = StackProfiler::builder().count_stacks(true).build();
/// profiler.attach(&host).unwrap();
///
/// host.call(spot!("main_loop"), || {
///     host.call(spot!("handle"), || std::hint::black_box(7));
/// });
///
/// let report = profiler.report_and_reset(&StackReportFormat::default()).unwrap();
/// assert!(report.contains("handle < "));
/// ```
#[derive(Clone, Debug)]
pub struct StackProfiler {
    inner: Rc<RefCell<StackState>>,
}

#[derive(Debug)]
struct StackState {
    clock: Clock,
    policy: Policy,
    attachment: Option<Attachment>,

    // An entry exists only while the task's stack is not empty.
    tasks: HashMap<TaskId, TaskFrames>,

    totals: Totals,
}

#[derive(Debug)]
struct Policy {
    count_stacks: bool,
    cumulative: bool,
    grep: Option<Spot>,
}

#[derive(Debug)]
struct TaskFrames {
    // Innermost spot last.
    stack: Vec<Spot>,
    started_at: Duration,
}

#[derive(Debug, Default)]
struct Totals {
    spots: HashMap<Spot, SpotCounters>,
    stacks: HashMap<Box<[Spot]>, SpotCounters>,
}

struct Attachment {
    host: Rc<dyn Host>,
    switch_hook: HookId,
    call_hook: HookId,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("switch_hook", &self.switch_hook)
            .field("call_hook", &self.call_hook)
            .finish_non_exhaustive()
    }
}

impl StackProfiler {
    /// Starts configuring a new stack profiler.
    #[must_use]
    pub fn builder() -> StackProfilerBuilder {
        StackProfilerBuilder::new()
    }

    /// Starts observing task switches and function calls of `host`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyAttached`] if the profiler is already attached, or
    /// the host's error if it refuses either hook. If the call hook is refused, the
    /// already registered switch hook is unregistered again.
    pub fn attach<H>(&self, host: &H) -> Result<()>
    where
        H: Host + Clone + 'static,
    {
        if self.is_attached() {
            return Err(Error::AlreadyAttached { profiler: "stack" });
        }

        let state = Rc::downgrade(&self.inner);
        let switch_hook = host.register_switch_hook(Rc::new(move |event: &SwitchEvent| {
            if let Some(state) = state.upgrade() {
                state.borrow_mut().on_switch(event);
            }
        }))?;

        let state = Rc::downgrade(&self.inner);
        let call_hook = match host.register_call_hook(Rc::new(move |event: &CallEvent| {
            if let Some(state) = state.upgrade() {
                state.borrow_mut().on_call(event);
            }
        })) {
            Ok(call_hook) => call_hook,
            Err(error) => {
                host.unregister_switch_hook(switch_hook);
                return Err(error);
            }
        };

        let mut state = self.inner.borrow_mut();
        state.attachment = Some(Attachment {
            host: Rc::new(host.clone()),
            switch_hook,
            call_hook,
        });

        debug!(
            clock = %state.clock.kind(),
            count_stacks = state.policy.count_stacks,
            cumulative = state.policy.cumulative,
            grep = ?state.policy.grep,
            "stack profiler attached"
        );
        Ok(())
    }

    /// Stops observing the host. Counters accrued so far are kept until the next report.
    ///
    /// The call stacks seen so far are forgotten, so returns from functions that
    /// were entered before detaching are not accounted after a later attach.
    pub fn detach(&self) {
        let mut state = self.inner.borrow_mut();
        let Some(attachment) = state.attachment.take() else {
            return;
        };
        state.tasks.clear();
        drop(state);

        attachment
            .host
            .unregister_switch_hook(attachment.switch_hook);
        attachment.host.unregister_call_hook(attachment.call_hook);

        debug!("stack profiler detached");
    }

    /// Whether the profiler is attached to a host.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.borrow().attachment.is_some()
    }

    /// Drains all counters into a report. Call stacks of running tasks are kept.
    #[must_use]
    pub fn take_report(&self) -> StackReport {
        let mut state = self.inner.borrow_mut();
        let totals = mem::take(&mut state.totals);
        let cumulative = state.policy.cumulative;
        drop(state);

        let report = StackReport::from_counters(totals.spots, totals.stacks, cumulative);
        debug!(
            spots = report.spots().count(),
            stacks = report.stacks().count(),
            "stack counters drained"
        );
        report
    }

    /// Drains all counters and renders them.
    ///
    /// The counters are reset even if rendering fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] if a template of `format` is malformed.
    pub fn report_and_reset(&self, format: &StackReportFormat) -> Result<String> {
        self.take_report().render(format)
    }

    /// Drains all counters and writes them to the file named by the path format,
    /// replacing any previous content.
    ///
    /// The counters are reset before the file is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] if a template of `format` is malformed or
    /// [`Error::WriteReport`] if the file cannot be written.
    pub fn write_report(&self, format: &StackReportFormat) -> Result<PathBuf> {
        let text = self.report_and_reset(format)?;
        let path = format.report_path()?;

        fs::write(&path, text).map_err(|source| Error::WriteReport {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "stack report written");
        Ok(path)
    }
}

impl StackState {
    fn on_call(&mut self, event: &CallEvent) {
        let now = self.clock.now();
        let task = event.task();

        match event.kind() {
            CallKind::Call(spot) => {
                let frames = self.tasks.entry(task).or_insert_with(|| TaskFrames {
                    stack: Vec::new(),
                    started_at: now,
                });

                if !frames.stack.is_empty() {
                    self.totals.save_seconds(
                        &self.policy,
                        &frames.stack,
                        now.saturating_sub(frames.started_at),
                    );
                }

                frames.stack.push(spot);
                if self.policy.admits(&frames.stack) {
                    self.totals.save_call(&self.policy, &frames.stack);
                }

                frames.started_at = now;
            }
            CallKind::Return => {
                let Some(frames) = self.tasks.get_mut(&task) else {
                    trace!(%task, "return without a matching call ignored");
                    return;
                };

                self.totals.save_seconds(
                    &self.policy,
                    &frames.stack,
                    now.saturating_sub(frames.started_at),
                );

                frames.stack.pop();
                frames.started_at = now;

                if frames.stack.is_empty() {
                    self.tasks.remove(&task);
                }
            }
        }
    }

    fn on_switch(&mut self, event: &SwitchEvent) {
        let now = self.clock.now();

        if let Some(frames) = self.tasks.get(&event.origin()) {
            self.totals.save_seconds(
                &self.policy,
                &frames.stack,
                now.saturating_sub(frames.started_at),
            );
        }

        if let Some(frames) = self.tasks.get_mut(&event.target()) {
            frames.started_at = now;
        }
    }
}

impl Policy {
    fn admits(&self, stack: &[Spot]) -> bool {
        self.grep.is_none_or(|grep| stack.contains(&grep))
    }
}

impl Totals {
    fn save_seconds(&mut self, policy: &Policy, stack: &[Spot], elapsed: Duration) {
        if !policy.admits(stack) {
            return;
        }

        let Some(innermost) = stack.last() else {
            return;
        };

        if policy.cumulative {
            // Recursive spots appear more than once but are charged once.
            for (index, spot) in stack.iter().enumerate() {
                if !stack.iter().take(index).any(|outer| outer == spot) {
                    self.spots.entry(*spot).or_default().add_seconds(elapsed);
                }
            }
        } else {
            self.spots.entry(*innermost).or_default().add_seconds(elapsed);
        }

        if !policy.count_stacks {
            return;
        }

        if policy.cumulative {
            for prefix in (1..=stack.len()).filter_map(|len| stack.get(..len)) {
                stack_counters_mut(&mut self.stacks, prefix).add_seconds(elapsed);
            }
        } else {
            stack_counters_mut(&mut self.stacks, stack).add_seconds(elapsed);
        }
    }

    fn save_call(&mut self, policy: &Policy, stack: &[Spot]) {
        let Some(innermost) = stack.last() else {
            return;
        };

        self.spots.entry(*innermost).or_default().add_call();

        if policy.count_stacks {
            stack_counters_mut(&mut self.stacks, stack).add_call();
        }
    }
}

// Looks up by slice first so that known stacks are not copied.
fn stack_counters_mut<'m>(
    stacks: &'m mut HashMap<Box<[Spot]>, SpotCounters>,
    stack: &[Spot],
) -> &'m mut SpotCounters {
    if !stacks.contains_key(stack) {
        stacks.insert(stack.into(), SpotCounters::default());
    }

    stacks
        .get_mut(stack)
        .expect("entry was inserted above if it did not exist")
}

/// Configures and creates a [`StackProfiler`].
///
/// Use `StackProfiler::builder()` to create a new instance of this builder.
#[derive(Debug)]
#[must_use]
pub struct StackProfilerBuilder {
    clock: ClockKind,
    count_stacks: bool,
    cumulative: bool,
    grep: Option<Spot>,
    platform: Option<PlatformFacade>,
}

impl StackProfilerBuilder {
    fn new() -> Self {
        Self {
            clock: ClockKind::ThreadProcessor,
            count_stacks: false,
            cumulative: false,
            grep: None,
            platform: None,
        }
    }

    /// Sets the time source. Defaults to [`ClockKind::ThreadProcessor`].
    pub fn clock(self, clock: ClockKind) -> Self {
        Self { clock, ..self }
    }

    /// Whether to also keep counters for every full call stack. Defaults to `false`.
    pub fn count_stacks(self, count_stacks: bool) -> Self {
        Self {
            count_stacks,
            ..self
        }
    }

    /// Whether to also charge time to every caller on the stack, so that the time
    /// of a spot includes the time of its callees. Defaults to `false`.
    pub fn cumulative(self, cumulative: bool) -> Self {
        Self { cumulative, ..self }
    }

    /// Restricts accounting to call stacks that contain `spot`. Defaults to none.
    pub fn grep(self, spot: Spot) -> Self {
        Self {
            grep: Some(spot),
            ..self
        }
    }

    #[cfg(test)]
    pub(crate) fn platform(self, platform: PlatformFacade) -> Self {
        Self {
            platform: Some(platform),
            ..self
        }
    }

    /// Creates the profiler. It starts out detached with empty counters.
    #[must_use]
    pub fn build(self) -> StackProfiler {
        let platform = self.platform.unwrap_or_else(PlatformFacade::real);

        StackProfiler {
            inner: Rc::new(RefCell::new(StackState {
                clock: Clock::with_platform(self.clock, platform),
                policy: Policy {
                    count_stacks: self.count_stacks,
                    cumulative: self.cumulative,
                    grep: self.grep,
                },
                attachment: None,
                tasks: HashMap::new(),
                totals: Totals::default(),
            })),
        }
    }
}
