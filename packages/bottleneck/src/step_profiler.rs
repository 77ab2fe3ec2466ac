//! Named-step time attribution.

use std::any::type_name;
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::time::Duration;

use foldhash::{HashMap, HashMapExt};
use tracing::debug;

use crate::pal::PlatformFacade;
use crate::{
    Clock, ClockKind, Error, HookId, Host, Result, StepCounters, StepReport, StepReportFormat,
    SwitchEvent, TaskId, WallCounters,
};

/// The name of a step, used for display and keying purposes.
///
/// Typically step names are `&'static str` but for rare cases when the exact
/// set of steps is not known in advance, we also support owned strings via `Cow`.
pub type StepName = Cow<'static, str>;

const DEFAULT_UNTRACKED_STEP: &str = "OTHER";

/// Attributes processor time to named steps of cooperatively scheduled tasks.
///
/// Each task has at most one active step. The step's clock keeps running only while
/// its task holds the processor: a switch away from the task pauses it and a switch
/// back resumes it, so a step's exclusive time never includes time that other
/// tasks ran. Time of tasks without an active step is attributed to the untracked
/// pseudo-step (`"OTHER"` by default).
///
/// Clones share the same counters. While detached, marking does nothing.
///
/// # Examples
///
/// ```
/// use bottleneck::{StepProfiler, StepReportFormat, TaskHost};
///
/// let host = TaskHost::new();
/// let profiler = StepProfiler::builder().build();
/// profiler.attach(&host).unwrap();
///
/// profiler.begin_step("load");
/// // Load something.
/// profiler.begin_step("parse");
/// // Parse it.
/// profiler.end_scope();
///
/// let report = profiler.report_and_reset(&StepReportFormat::default()).unwrap();
/// assert!(report.contains("load: "));
/// assert!(report.contains("parse: "));
/// ```
#[derive(Clone, Debug)]
pub struct StepProfiler {
    inner: Rc<RefCell<StepState>>,
}

/// Anchor for measuring wall-clock time across several steps.
///
/// Returned by every mark that starts a step. Passing it to a later mark folds the
/// wall-clock time since the anchor into the anchor step's wall counters, however
/// many other steps and suspensions happened in between.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WallAnchor {
    step: StepName,
    started_at: Duration,
}

impl WallAnchor {
    /// The step whose wall counters this anchor feeds.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    /// When the anchor step was started, as read from the profiler's clock.
    #[must_use]
    pub fn started_at(&self) -> Duration {
        self.started_at
    }
}

#[derive(Debug)]
struct StepState {
    clock: Clock,
    untracked_step: StepName,
    attachment: Option<Attachment>,

    // Per-task auxiliary state. An entry exists only while the task has an active step.
    active: HashMap<TaskId, ActiveStep>,

    // Set while the running task has no active step.
    untracked_since: Option<Duration>,

    steps: HashMap<StepName, StepCounters>,
    walls: HashMap<StepName, WallCounters>,
}

#[derive(Debug)]
struct ActiveStep {
    step: StepName,
    started_at: Duration,

    // Time already spent in this step before the most recent resume.
    accrued: Duration,
}

struct Attachment {
    host: Rc<dyn Host>,
    switch_hook: HookId,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("switch_hook", &self.switch_hook)
            .finish_non_exhaustive()
    }
}

impl StepProfiler {
    /// Starts configuring a new step profiler.
    #[must_use]
    pub fn builder() -> StepProfilerBuilder {
        StepProfilerBuilder::new()
    }

    /// Starts observing task switches of `host`.
    ///
    /// If the task running at attach time has no active step, its time from now on
    /// is attributed to the untracked pseudo-step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyAttached`] if the profiler is already attached, or
    /// the host's error if it refuses the switch hook.
    pub fn attach<H>(&self, host: &H) -> Result<()>
    where
        H: Host + Clone + 'static,
    {
        if self.is_attached() {
            return Err(Error::AlreadyAttached { profiler: "step" });
        }

        let state = Rc::downgrade(&self.inner);
        let switch_hook = host.register_switch_hook(Rc::new(move |event: &SwitchEvent| {
            if let Some(state) = state.upgrade() {
                state.borrow_mut().on_switch(event);
            }
        }))?;

        let host: Rc<dyn Host> = Rc::new(host.clone());
        let current = host.current_task();

        let mut state = self.inner.borrow_mut();
        let now = state.clock.now();
        if !state.active.contains_key(&current) {
            state.untracked_since = Some(now);
        }
        state.attachment = Some(Attachment { host, switch_hook });

        debug!(clock = %state.clock.kind(), "step profiler attached");
        Ok(())
    }

    /// Stops observing the host. Counters accrued so far are kept until the next report.
    ///
    /// Steps that are still active are abandoned without being counted.
    /// Does nothing if the profiler is not attached.
    pub fn detach(&self) {
        let mut state = self.inner.borrow_mut();
        let Some(attachment) = state.attachment.take() else {
            return;
        };
        state.active.clear();
        state.untracked_since = None;
        drop(state);

        attachment
            .host
            .unregister_switch_hook(attachment.switch_hook);

        debug!("step profiler detached");
    }

    /// Whether the profiler is attached to a host.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.borrow().attachment.is_some()
    }

    /// Closes the current task's active step, if any, and optionally starts a new one.
    ///
    /// If `wall` is given, the wall-clock time since the anchor is folded into the
    /// anchor step's wall counters. If `new_step` is given, it becomes the task's
    /// active step and a fresh anchor for it is returned.
    ///
    /// Does nothing and returns `None` while the profiler is detached.
    pub fn mark(&self, new_step: Option<StepName>, wall: Option<WallAnchor>) -> Option<WallAnchor> {
        let mut state = self.inner.borrow_mut();
        let task = state.attachment.as_ref()?.host.current_task();
        let now = state.clock.now();

        state.mark(task, now, new_step, wall)
    }

    /// Closes the current task's active step, if any, and starts `step`.
    pub fn begin_step(&self, step: impl Into<StepName>) -> Option<WallAnchor> {
        self.mark(Some(step.into()), None)
    }

    /// Like [`begin_step()`](Self::begin_step) but also folds the wall-clock time since `wall`.
    pub fn begin_step_with_wall(
        &self,
        step: impl Into<StepName>,
        wall: WallAnchor,
    ) -> Option<WallAnchor> {
        self.mark(Some(step.into()), Some(wall))
    }

    /// Closes the current task's active step, if any. The task's time is untracked
    /// until its next step begins.
    pub fn end_scope(&self) {
        self.mark(None, None);
    }

    /// Like [`end_scope()`](Self::end_scope) but also folds the wall-clock time since `wall`.
    pub fn end_scope_with_wall(&self, wall: WallAnchor) {
        self.mark(None, Some(wall));
    }

    /// Begins `step` and ends it when the returned guard is dropped.
    ///
    /// Steps do not nest: beginning another step on the same task while the
    /// guard is alive closes this one, and dropping the guard then ends that one.
    pub fn scope(&self, step: impl Into<StepName>) -> StepScope {
        self.begin_step(step);
        StepScope {
            profiler: self.clone(),
        }
    }

    /// The active step of the currently executing task.
    #[must_use]
    pub fn current_step(&self) -> Option<StepName> {
        let state = self.inner.borrow();
        let task = state.attachment.as_ref()?.host.current_task();

        state.active.get(&task).map(|active| active.step.clone())
    }

    /// Drains all counters into a report. Active steps keep running.
    #[must_use]
    pub fn take_report(&self) -> StepReport {
        let mut state = self.inner.borrow_mut();
        let steps = mem::take(&mut state.steps);
        let walls = mem::take(&mut state.walls);
        drop(state);

        let report = StepReport::from_counters(steps, walls);
        debug!(steps = report.len(), "step counters drained");
        report
    }

    /// Drains all counters and renders them.
    ///
    /// The counters are reset even if rendering fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] if a template of `format` is malformed.
    pub fn report_and_reset(&self, format: &StepReportFormat) -> Result<String> {
        self.take_report().render(format)
    }
}

impl StepState {
    fn on_switch(&mut self, event: &SwitchEvent) {
        let now = self.clock.now();

        // Pause counting for the task being suspended.
        let paused = match self.active.get_mut(&event.origin()) {
            Some(active) => {
                active.accrued = active
                    .accrued
                    .saturating_add(now.saturating_sub(active.started_at));
                counters_mut(&mut self.steps, &active.step)
            }
            None => {
                let counters = counters_mut(&mut self.steps, &self.untracked_step);
                if let Some(since) = self.untracked_since.take() {
                    counters.record(now.saturating_sub(since));
                }
                counters
            }
        };
        paused.record_switch();

        // Continue counting for the task being resumed.
        match self.active.get_mut(&event.target()) {
            Some(active) => active.started_at = now,
            None => self.untracked_since = Some(now),
        }
    }

    fn mark(
        &mut self,
        task: TaskId,
        now: Duration,
        new_step: Option<StepName>,
        wall: Option<WallAnchor>,
    ) -> Option<WallAnchor> {
        if let Some(active) = self.active.get(&task) {
            let exclusive = active
                .accrued
                .saturating_add(now.saturating_sub(active.started_at));
            counters_mut(&mut self.steps, &active.step).record(exclusive);

            if new_step.is_none() {
                self.active.remove(&task);
                self.untracked_since = Some(now);
            }
        } else if new_step.is_some() {
            if let Some(since) = self.untracked_since.take() {
                counters_mut(&mut self.steps, &self.untracked_step)
                    .record(now.saturating_sub(since));
            }
        }

        if let Some(anchor) = wall {
            counters_mut(&mut self.walls, &anchor.step)
                .record(now.saturating_sub(anchor.started_at));
        }

        let step = new_step?;
        self.active.insert(
            task,
            ActiveStep {
                step: step.clone(),
                started_at: now,
                accrued: Duration::ZERO,
            },
        );

        Some(WallAnchor {
            step,
            started_at: now,
        })
    }
}

// Looks up by `&str` first so that the hot path does not clone owned step names.
fn counters_mut<'m, V>(map: &'m mut HashMap<StepName, V>, step: &StepName) -> &'m mut V
where
    V: Default,
{
    if !map.contains_key(step.as_ref()) {
        map.insert(step.clone(), V::default());
    }

    map.get_mut(step.as_ref())
        .expect("entry was inserted above if it did not exist")
}

/// Ends the step it was created for when dropped.
///
/// Created by [`StepProfiler::scope`].
#[derive(Debug)]
#[must_use = "the step ends when the scope is dropped"]
pub struct StepScope {
    profiler: StepProfiler,
}

impl Drop for StepScope {
    fn drop(&mut self) {
        self.profiler.end_scope();
    }
}

/// Configures and creates a [`StepProfiler`].
///
/// Use `StepProfiler::builder()` to create a new instance of this builder.
#[derive(Debug)]
#[must_use]
pub struct StepProfilerBuilder {
    clock: ClockKind,
    untracked_step: StepName,
    platform: Option<PlatformFacade>,
}

impl StepProfilerBuilder {
    fn new() -> Self {
        Self {
            clock: ClockKind::Wall,
            untracked_step: Cow::Borrowed(DEFAULT_UNTRACKED_STEP),
            platform: None,
        }
    }

    /// Sets the time source. Defaults to [`ClockKind::Wall`].
    pub fn clock(self, clock: ClockKind) -> Self {
        Self { clock, ..self }
    }

    /// Sets the name of the pseudo-step that collects time of tasks without an
    /// active step. Defaults to `"OTHER"`.
    pub fn untracked_step(self, untracked_step: impl Into<StepName>) -> Self {
        Self {
            untracked_step: untracked_step.into(),
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
    pub fn build(self) -> StepProfiler {
        let platform = self.platform.unwrap_or_else(PlatformFacade::real);

        StepProfiler {
            inner: Rc::new(RefCell::new(StepState {
                clock: Clock::with_platform(self.clock, platform),
                untracked_step: self.untracked_step,
                attachment: None,
                active: HashMap::new(),
                untracked_since: None,
                steps: HashMap::new(),
                walls: HashMap::new(),
            })),
        }
    }
}
