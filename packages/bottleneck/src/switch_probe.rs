use std::any::type_name;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::{HookId, Host, Result, SwitchEvent, TaskId};

/// Detects whether the current task gave up the processor during a stretch of code.
///
/// The probe watches the task that was current when it began. It stops watching when
/// dropped.
///
/// # Examples
///
/// ```
/// use bottleneck::{SwitchProbe, TaskHost, TaskId};
///
/// let host = TaskHost::new();
/// let worker = host.new_task();
/// host.switch_to(worker);
///
/// let probe = SwitchProbe::begin(&host).unwrap();
/// assert!(!probe.switched());
///
/// host.switch_to(TaskId::ROOT);
/// host.switch_to(worker);
/// assert!(probe.switched());
/// ```
pub struct SwitchProbe {
    host: Rc<dyn Host>,
    hook: HookId,
    task: TaskId,
    switched: Rc<Cell<bool>>,
}

impl SwitchProbe {
    /// Starts watching the current task of `host`.
    ///
    /// # Errors
    ///
    /// Returns the host's error if it refuses the switch hook.
    pub fn begin<H>(host: &H) -> Result<Self>
    where
        H: Host + Clone + 'static,
    {
        let task = host.current_task();
        let switched = Rc::new(Cell::new(false));

        let flag = Rc::clone(&switched);
        let hook = host.register_switch_hook(Rc::new(move |event: &SwitchEvent| {
            if event.origin() == task {
                flag.set(true);
            }
        }))?;

        Ok(Self {
            host: Rc::new(host.clone()),
            hook,
            task,
            switched,
        })
    }

    /// Whether the watched task has been switched away from since the probe began.
    #[must_use]
    pub fn switched(&self) -> bool {
        self.switched.get()
    }

    /// The watched task.
    #[must_use]
    pub fn task(&self) -> TaskId {
        self.task
    }
}

impl fmt::Debug for SwitchProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("hook", &self.hook)
            .field("task", &self.task)
            .field("switched", &self.switched.get())
            .finish_non_exhaustive()
    }
}

impl Drop for SwitchProbe {
    fn drop(&mut self) {
        self.host.unregister_switch_hook(self.hook);
    }
}
