//! A single-threaded host that drives the registration boundary.
//!
//! [`TaskHost`] turns ordinary code into a source of switch and call events:
//! futures wrapped by [`TaskHost::instrument`] become cooperative tasks whose
//! every poll is a switch in and out of the task, [`TaskHost::switch_to`] drives
//! manually scheduled green threads, and [`TaskHost::enter`] marks function
//! entry and exit for the stack profiler.

use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tracing::debug;

use crate::{
    CallEvent, CallHook, Error, HookId, HookKind, HookRegistry, Result, Spot, SwitchEvent,
    SwitchHook, SwitchKind, TaskId, TaskIdentity,
};

/// Reference host for cooperatively scheduled tasks on one thread.
///
/// Clones share the same state. The host starts out executing [`TaskId::ROOT`].
///
/// # Examples
///
/// ```
/// use bottleneck::{StepProfiler, TaskHost, TaskId};
///
/// let host = TaskHost::new();
/// let profiler = StepProfiler::builder().build();
/// profiler.attach(&host).unwrap();
///
/// let worker = host.new_task();
/// host.switch_to(worker);
/// profiler.begin_step("work");
/// host.switch_to(TaskId::ROOT);
/// host.switch_to(worker);
/// profiler.end_scope();
///
/// let report = profiler.take_report();
/// assert_eq!(report.step("work").unwrap().counters().calls(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct TaskHost {
    inner: Rc<HostInner>,
}

struct HostInner {
    current: Cell<TaskId>,
    next_task: Cell<u64>,
    next_hook: Cell<u64>,
    shut_down: Cell<bool>,
    switch_hooks: RefCell<Vec<(HookId, SwitchHook)>>,
    call_hooks: RefCell<Vec<(HookId, CallHook)>>,
}

impl fmt::Debug for HostInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("current", &self.current.get())
            .field("shut_down", &self.shut_down.get())
            .field("switch_hook_count", &self.switch_hooks.borrow().len())
            .field("call_hook_count", &self.call_hooks.borrow().len())
            .finish_non_exhaustive()
    }
}

impl TaskHost {
    /// Creates a host that is executing [`TaskId::ROOT`] and has no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(HostInner {
                current: Cell::new(TaskId::ROOT),
                next_task: Cell::new(1),
                next_hook: Cell::new(1),
                shut_down: Cell::new(false),
                switch_hooks: RefCell::new(Vec::new()),
                call_hooks: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Allocates the identity of a new task.
    #[must_use]
    pub fn new_task(&self) -> TaskId {
        let raw = self.inner.next_task.get();
        self.inner.next_task.set(
            raw.checked_add(1)
                .expect("task identities exhausted - this indicates an unrealistic scenario"),
        );
        TaskId::new(raw)
    }

    /// Transfers control from the current task to `target`, notifying switch hooks first.
    ///
    /// Switching to the task that is already current does nothing.
    pub fn switch_to(&self, target: TaskId) {
        self.transfer(SwitchKind::Switch, target);
    }

    /// Transfers control to `target` in order to raise an error in it.
    ///
    /// Accounted exactly like [`switch_to()`](Self::switch_to).
    pub fn throw_to(&self, target: TaskId) {
        self.transfer(SwitchKind::Throw, target);
    }

    fn transfer(&self, kind: SwitchKind, target: TaskId) {
        let origin = self.inner.current.get();
        if origin == target {
            return;
        }

        self.inner.notify_switch(&SwitchEvent::new(kind, origin, target));
        self.inner.current.set(target);
    }

    /// Wraps a future so that it runs as its own cooperative task.
    ///
    /// Every poll of the returned future is a switch into the task and every
    /// return from a poll is a switch back to whichever task was polling it.
    pub fn instrument<F>(&self, future: F) -> Instrumented<F>
    where
        F: Future,
    {
        Instrumented {
            host: self.clone(),
            task: self.new_task(),
            future: Some(Box::pin(future)),
        }
    }

    /// Notifies call hooks that the current task entered the function at `spot`.
    ///
    /// The returned guard notifies the matching return when dropped.
    pub fn enter(&self, spot: Spot) -> CallGuard {
        let task = self.inner.current.get();
        self.inner.notify_call(&CallEvent::call(task, spot));

        CallGuard {
            host: self.clone(),
            task,
        }
    }

    /// Runs `f` as a call of the function at `spot`.
    pub fn call<R>(&self, spot: Spot, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter(spot);
        f()
    }

    /// Drops all hooks and refuses any further registrations.
    pub fn shut_down(&self) {
        self.inner.shut_down.set(true);
        self.inner.switch_hooks.borrow_mut().clear();
        self.inner.call_hooks.borrow_mut().clear();

        debug!("task host shut down");
    }

    fn allocate_hook_id(&self) -> HookId {
        let raw = self.inner.next_hook.get();
        self.inner.next_hook.set(
            raw.checked_add(1)
                .expect("hook identities exhausted - this indicates an unrealistic scenario"),
        );
        HookId::new(raw)
    }

    fn ensure_open(&self, hook: HookKind) -> Result<()> {
        if self.inner.shut_down.get() {
            return Err(Error::HookUnavailable {
                hook,
                reason: "the host has been shut down".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for TaskHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostInner {
    // Hooks are notified from a snapshot taken before the first one runs, so a hook
    // may register or unregister hooks without affecting delivery of this event.
    fn notify_switch(&self, event: &SwitchEvent) {
        let hooks: Vec<SwitchHook> = self
            .switch_hooks
            .borrow()
            .iter()
            .map(|(_, hook)| Rc::clone(hook))
            .collect();

        for hook in hooks {
            hook(event);
        }
    }

    fn notify_call(&self, event: &CallEvent) {
        let hooks: Vec<CallHook> = self
            .call_hooks
            .borrow()
            .iter()
            .map(|(_, hook)| Rc::clone(hook))
            .collect();

        for hook in hooks {
            hook(event);
        }
    }
}

impl TaskIdentity for TaskHost {
    fn current_task(&self) -> TaskId {
        self.inner.current.get()
    }
}

impl HookRegistry for TaskHost {
    fn register_switch_hook(&self, hook: SwitchHook) -> Result<HookId> {
        self.ensure_open(HookKind::Switch)?;

        let mut hooks = self.inner.switch_hooks.borrow_mut();
        if hooks.iter().any(|(_, existing)| Rc::ptr_eq(existing, &hook)) {
            return Err(Error::DuplicateHook {
                hook: HookKind::Switch,
            });
        }

        let id = self.allocate_hook_id();
        hooks.push((id, hook));
        Ok(id)
    }

    fn unregister_switch_hook(&self, id: HookId) {
        self.inner
            .switch_hooks
            .borrow_mut()
            .retain(|(existing, _)| *existing != id);
    }

    fn register_call_hook(&self, hook: CallHook) -> Result<HookId> {
        self.ensure_open(HookKind::Call)?;

        let mut hooks = self.inner.call_hooks.borrow_mut();
        if hooks.iter().any(|(_, existing)| Rc::ptr_eq(existing, &hook)) {
            return Err(Error::DuplicateHook {
                hook: HookKind::Call,
            });
        }

        let id = self.allocate_hook_id();
        hooks.push((id, hook));
        Ok(id)
    }

    fn unregister_call_hook(&self, id: HookId) {
        self.inner
            .call_hooks
            .borrow_mut()
            .retain(|(existing, _)| *existing != id);
    }
}

/// A future running as its own cooperative task of a [`TaskHost`].
///
/// Created by [`TaskHost::instrument`]. Dropping it before completion drops the
/// wrapped future inside its own task, so guards held across a suspension point
/// are released by the task that created them.
#[must_use = "futures do nothing unless polled"]
pub struct Instrumented<F> {
    host: TaskHost,
    task: TaskId,

    // `None` once the future has completed and been dropped.
    future: Option<Pin<Box<F>>>,
}

impl<F> Instrumented<F> {
    /// The identity of the task this future runs as.
    #[must_use]
    pub fn task(&self) -> TaskId {
        self.task
    }
}

impl<F> fmt::Debug for Instrumented<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

impl<F> Future for Instrumented<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let future = this
            .future
            .as_mut()
            .expect("instrumented future polled after completion");

        let resumed_by = this.host.current_task();
        this.host.switch_to(this.task);

        let poll = future.as_mut().poll(cx);
        if poll.is_ready() {
            this.future = None;
        }

        this.host.switch_to(resumed_by);
        poll
    }
}

impl<F> Drop for Instrumented<F> {
    fn drop(&mut self) {
        let Some(future) = self.future.take() else {
            return;
        };

        let dropped_by = self.host.current_task();
        self.host.switch_to(self.task);
        drop(future);
        self.host.switch_to(dropped_by);
    }
}

/// Notifies the matching return event when dropped.
///
/// Created by [`TaskHost::enter`].
#[derive(Debug)]
#[must_use = "the return is notified when the guard is dropped"]
pub struct CallGuard {
    host: TaskHost,
    task: TaskId,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.host.inner.notify_call(&CallEvent::ret(self.task));
    }
}
