//! The registration boundary between the profilers and the host scheduler.
//!
//! The host must deliver every event synchronously, before control actually
//! transfers, and must never suspend or re-enter a hook while it runs. The
//! profilers' accounting is only correct under that contract.

use std::rc::Rc;

use derive_more::Display;

use crate::{Result, Spot, TaskId};

/// How control was transferred between two tasks.
///
/// Both kinds are accounted identically by the profilers.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SwitchKind {
    /// Regular transfer of control.
    #[display("switch")]
    Switch,

    /// Transfer of control that raises an error in the target task.
    #[display("throw")]
    Throw,
}

/// Notification that control is about to move from one task to another.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SwitchEvent {
    kind: SwitchKind,
    origin: TaskId,
    target: TaskId,
}

impl SwitchEvent {
    /// Creates a switch event.
    #[must_use]
    pub const fn new(kind: SwitchKind, origin: TaskId, target: TaskId) -> Self {
        Self {
            kind,
            origin,
            target,
        }
    }

    /// How control is being transferred.
    #[must_use]
    pub const fn kind(&self) -> SwitchKind {
        self.kind
    }

    /// The task that is being suspended.
    #[must_use]
    pub const fn origin(&self) -> TaskId {
        self.origin
    }

    /// The task that is being resumed.
    #[must_use]
    pub const fn target(&self) -> TaskId {
        self.target
    }
}

/// Whether a function was entered or exited.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CallKind {
    /// The function at the given spot was entered.
    Call(Spot),

    /// The innermost function of the task returned.
    Return,
}

/// Notification that a task entered or exited a function.
///
/// For any one task, calls and returns form a well-nested sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CallEvent {
    task: TaskId,
    kind: CallKind,
}

impl CallEvent {
    /// Creates an event for `task` entering the function at `spot`.
    #[must_use]
    pub const fn call(task: TaskId, spot: Spot) -> Self {
        Self {
            task,
            kind: CallKind::Call(spot),
        }
    }

    /// Creates an event for the innermost function of `task` returning.
    #[must_use]
    pub const fn ret(task: TaskId) -> Self {
        Self {
            task,
            kind: CallKind::Return,
        }
    }

    /// The task that entered or exited the function.
    #[must_use]
    pub const fn task(&self) -> TaskId {
        self.task
    }

    /// Whether a function was entered or exited.
    #[must_use]
    pub const fn kind(&self) -> CallKind {
        self.kind
    }
}

/// The kinds of hooks a host accepts.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum HookKind {
    /// Notified on every task switch.
    #[display("switch")]
    Switch,

    /// Notified on every function call and return.
    #[display("call")]
    Call,
}

/// Identifies a registered hook so it can be unregistered again.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[display("hook#{_0}")]
pub struct HookId(u64);

impl HookId {
    /// Creates a hook identity from a raw value chosen by the host.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Receives switch events.
pub type SwitchHook = Rc<dyn Fn(&SwitchEvent)>;

/// Receives call and return events.
pub type CallHook = Rc<dyn Fn(&CallEvent)>;

/// Tells which task is currently executing.
pub trait TaskIdentity {
    /// The task that is executing right now.
    fn current_task(&self) -> TaskId;
}

/// Accepts the hooks through which the profilers observe the host.
pub trait HookRegistry {
    /// Starts delivering switch events to `hook`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot deliver switch events or if the
    /// same hook is already registered.
    fn register_switch_hook(&self, hook: SwitchHook) -> Result<HookId>;

    /// Stops delivering switch events to the hook. Unknown identities are ignored.
    fn unregister_switch_hook(&self, id: HookId);

    /// Starts delivering call and return events to `hook`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot deliver call events or if the
    /// same hook is already registered.
    fn register_call_hook(&self, hook: CallHook) -> Result<HookId>;

    /// Stops delivering call and return events to the hook. Unknown identities are ignored.
    fn unregister_call_hook(&self, id: HookId);
}

/// A host scheduler that profilers can be attached to.
///
/// Implemented automatically for every type that is both a [`TaskIdentity`]
/// and a [`HookRegistry`].
pub trait Host: TaskIdentity + HookRegistry {}

impl<T> Host for T where T: TaskIdentity + HookRegistry + ?Sized {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn switch_event_exposes_parts() {
        let event = SwitchEvent::new(SwitchKind::Throw, TaskId::ROOT, TaskId::new(3));

        assert_eq!(event.kind(), SwitchKind::Throw);
        assert_eq!(event.origin(), TaskId::ROOT);
        assert_eq!(event.target(), TaskId::new(3));
    }

    #[test]
    fn call_event_constructors() {
        let spot = Spot::new("lib.rs", 1, "f");

        let call = CallEvent::call(TaskId::new(1), spot);
        assert_eq!(call.task(), TaskId::new(1));
        assert_eq!(call.kind(), CallKind::Call(spot));

        let ret = CallEvent::ret(TaskId::new(1));
        assert_eq!(ret.kind(), CallKind::Return);
    }

    #[test]
    fn kinds_display_in_lowercase() {
        assert_eq!(SwitchKind::Switch.to_string(), "switch");
        assert_eq!(HookKind::Call.to_string(), "call");
        assert_eq!(HookId::new(7).to_string(), "hook#7");
    }
}
