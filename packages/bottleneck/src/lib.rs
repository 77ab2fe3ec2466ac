#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![allow(
    clippy::literal_string_with_formatting_args,
    reason = "report templates use the same placeholder syntax as format strings"
)]

//! Processor time attribution for cooperatively scheduled tasks.
//!
//! When many tasks share one thread and hand the processor to each other at explicit
//! switch points, ordinary timers measure the wrong thing: a timer started in one task
//! keeps running while other tasks execute. This package attributes time only to the
//! task that actually holds the processor, in one of two ways:
//!
//! - [`StepProfiler`] - the code marks named steps. Each step gets its exclusive time,
//!   excluding every interval during which its task was suspended.
//! - [`StackProfiler`] - the host reports function calls and returns. Each call site
//!   ([`Spot`]) and optionally each full call stack gets its time.
//!
//! Both profilers observe a host scheduler through the [`Host`] traits. [`TaskHost`]
//! is a host for single-threaded code: manually scheduled green threads via
//! [`TaskHost::switch_to`] and futures wrapped with [`TaskHost::instrument`].
//!
//! Counters accumulate until a report drains them, so every report covers the
//! interval since the previous one.
//!
//! # Steps
//!
//! ```
//! use bottleneck::{StepProfiler, StepReportFormat, TaskHost, TaskId};
//!
//! let host = TaskHost::new();
//! let profiler = StepProfiler::builder().build();
//! profiler.attach(&host).unwrap();
//!
//! let worker = host.new_task();
//! host.switch_to(worker);
//!
//! let wall = profiler.begin_step("fetch").unwrap();
//! // The worker waits for I/O, so the scheduler runs something else meanwhile.
//! host.switch_to(TaskId::ROOT);
//! host.switch_to(worker);
//! profiler.begin_step_with_wall("decode", wall);
//! profiler.end_scope();
//!
//! // "fetch" has its exclusive time and, separately, its wall-clock time.
//! let report = profiler.take_report();
//! let fetch = report.step("fetch").unwrap();
//! assert_eq!(fetch.counters().switches(), 1);
//! assert_eq!(fetch.wall().count(), 1);
//!
//! println!("{}", report.render(&StepReportFormat::default()).unwrap());
//! ```
//!
//! # Call stacks
//!
//! ```
//! use bottleneck::{StackProfiler, TaskHost, spot};
//!
//! fn parse(host: &TaskHost) {
//!     let _call = host.enter(spot!());
//!     std::hint::black_box(42);
//! }
//!
//! let host = TaskHost::new();
//! let profiler = StackProfiler::builder()
//!     .count_stacks(true)
//!     .cumulative(true)
//!     .build();
//! profiler.attach(&host).unwrap();
//!
//! host.call(spot!("request"), || parse(&host));
//!
//! let report = profiler.take_report();
//! assert_eq!(report.spots().count(), 2);
//! assert_eq!(report.stacks().count(), 2);
//! ```
//!
//! # Periodic reports
//!
//! [`StepProfiler::report_every`], [`StackProfiler::report_every`] and
//! [`StackProfiler::write_report_every`] are never-ending futures that report once per
//! interval. Run them as tasks of the profiled program to get a report stream.
//!
//! # Threading
//!
//! Profilers and hosts are single-threaded types. Each thread that runs a scheduler
//! needs its own host and profilers.

mod clock;
mod error;
mod hooks;
mod host;
mod pal;
mod periodic;
mod spot;
mod spot_counters;
mod stack_profiler;
mod stack_report;
mod step_counters;
mod step_profiler;
mod step_report;
mod switch_probe;
mod task;
mod template;

pub use clock::{Clock, ClockKind};
pub use error::{Error, Result};
pub use hooks::{
    CallEvent, CallHook, CallKind, HookId, HookKind, HookRegistry, Host, SwitchEvent,
    SwitchHook, SwitchKind, TaskIdentity,
};
pub use host::{CallGuard, Instrumented, TaskHost};
pub use spot::Spot;
#[doc(hidden)]
pub use spot::function_name_from_marker;
pub use spot_counters::SpotCounters;
pub use stack_profiler::{StackProfiler, StackProfilerBuilder};
pub use stack_report::{SpotEntry, StackEntry, StackReport, StackReportFormat};
pub use step_counters::{StepCounters, WallCounters};
pub use step_profiler::{StepName, StepProfiler, StepProfilerBuilder, StepScope, WallAnchor};
pub use step_report::{StepEntry, StepReport, StepReportFormat};
pub use switch_probe::SwitchProbe;
pub use task::TaskId;
