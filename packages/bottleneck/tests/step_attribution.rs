//! Integration tests for step attribution against the real platform.
//!
//! Tasks are futures on a `tokio` local task set, wrapped by the task host so that
//! every poll is a switch into the task.

use std::cell::RefCell;
use std::hint::black_box;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use bottleneck::{ClockKind, StepProfiler, StepReportFormat, TaskHost, TaskId};
use tokio::task::{LocalSet, yield_now};
use tokio::time::sleep;

/// Keeps the processor busy for at least `duration` of wall-clock time.
fn spin(duration: Duration) {
    let start = Instant::now();
    let mut accumulator = 0_u64;

    while start.elapsed() < duration {
        accumulator = accumulator.wrapping_mul(31).wrapping_add(7);
        black_box(accumulator);
    }
}

async fn work_in_slices(profiler: StepProfiler, step: &'static str, slices: u32) {
    profiler.begin_step(step);

    for _ in 0..slices {
        spin(Duration::from_millis(2));
        yield_now().await;
    }

    profiler.end_scope();
}

#[tokio::test]
#[cfg_attr(miri, ignore)] // Miri cannot use the real operating system APIs.
async fn interleaved_steps_share_time_without_overlap() {
    let started = Instant::now();

    let host = TaskHost::new();
    let profiler = StepProfiler::builder().build();
    profiler.attach(&host).unwrap();

    let local = LocalSet::new();
    local.spawn_local(host.instrument(work_in_slices(profiler.clone(), "alpha", 5)));
    local.spawn_local(host.instrument(work_in_slices(profiler.clone(), "beta", 5)));
    local.await;

    let elapsed = started.elapsed();
    let report = profiler.take_report();

    let alpha = report.step("alpha").unwrap().counters();
    let beta = report.step("beta").unwrap().counters();

    assert_eq!(alpha.calls(), 1);
    assert_eq!(beta.calls(), 1);
    assert_eq!(alpha.switches(), 5);
    assert_eq!(beta.switches(), 5);

    assert!(alpha.sum() >= Duration::from_millis(10));
    assert!(beta.sum() >= Duration::from_millis(10));

    let untracked = report
        .step("OTHER")
        .map_or(Duration::ZERO, |other| other.counters().sum());
    let accounted = alpha
        .sum()
        .checked_add(beta.sum())
        .unwrap()
        .checked_add(untracked)
        .unwrap();
    assert!(accounted <= elapsed);
}

#[test]
#[cfg_attr(miri, ignore)] // Miri cannot use the real operating system APIs.
fn processor_clock_does_not_count_sleep() {
    let host = TaskHost::new();
    let profiler = StepProfiler::builder()
        .clock(ClockKind::ThreadProcessor)
        .build();
    profiler.attach(&host).unwrap();

    profiler.begin_step("nap");
    thread::sleep(Duration::from_millis(100));
    profiler.end_scope();

    let report = profiler.take_report();
    assert!(report.step("nap").unwrap().counters().sum() < Duration::from_millis(50));
}

#[test]
#[cfg_attr(miri, ignore)] // Miri cannot use the real operating system APIs.
fn wall_anchor_measures_across_suspension() {
    let host = TaskHost::new();
    let profiler = StepProfiler::builder().build();
    profiler.attach(&host).unwrap();

    let worker = host.new_task();
    host.switch_to(worker);

    let wall = profiler.begin_step("request").unwrap();
    host.switch_to(TaskId::ROOT);
    spin(Duration::from_millis(20));
    host.switch_to(worker);
    profiler.end_scope_with_wall(wall);

    let report = profiler.take_report();
    let request = report.step("request").unwrap();

    assert!(request.wall().sum() >= Duration::from_millis(20));
    assert!(request.counters().sum() < request.wall().sum());
}

#[test]
#[cfg_attr(miri, ignore)] // Miri cannot use the real operating system APIs.
fn second_report_is_empty() {
    let host = TaskHost::new();
    let profiler = StepProfiler::builder().build();
    profiler.attach(&host).unwrap();

    profiler.begin_step("once");
    profiler.end_scope();

    let format = StepReportFormat::default();
    let first = profiler.report_and_reset(&format).unwrap();
    profiler.detach();
    let second = profiler.report_and_reset(&format).unwrap();

    assert!(first.starts_with("SUM: "));
    assert!(first.contains("once: "));
    assert_eq!(second, "");
}

#[tokio::test(start_paused = true)]
async fn reporting_loop_runs_as_a_task() {
    let host = TaskHost::new();
    let profiler = StepProfiler::builder().build();
    profiler.attach(&host).unwrap();

    let reports = Rc::new(RefCell::new(Vec::new()));

    let local = LocalSet::new();

    let sink = Rc::clone(&reports);
    let reporter_profiler = profiler.clone();
    local.spawn_local(host.instrument(async move {
        reporter_profiler
            .report_every(
                Duration::from_secs(10),
                StepReportFormat::default().step_format("{step}={calls}"),
                |report| sink.borrow_mut().push(report.unwrap()),
            )
            .await
    }));

    let worker_profiler = profiler.clone();
    local.spawn_local(host.instrument(async move {
        worker_profiler.begin_step("work");
        sleep(Duration::from_secs(1)).await;
        worker_profiler.end_scope();
    }));

    local.run_until(sleep(Duration::from_secs(25))).await;

    let reports = reports.borrow();
    assert_eq!(reports.len(), 2);
    assert!(reports[0].contains("work=1"));
    assert!(!reports[1].contains("work"));
}
