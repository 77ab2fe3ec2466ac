//! Integration tests for call-stack attribution against the real platform.

use std::fs;
use std::hint::black_box;
use std::time::{Duration, Instant};

use bottleneck::{ClockKind, Error, StackProfiler, StackReportFormat, TaskHost, spot};
use tokio::task::{LocalSet, yield_now};

fn spin(duration: Duration) {
    let start = Instant::now();
    let mut accumulator = 0_u64;

    while start.elapsed() < duration {
        accumulator = accumulator.wrapping_mul(31).wrapping_add(7);
        black_box(accumulator);
    }
}

fn leaf(host: &TaskHost) {
    let _call = host.enter(spot!());
    spin(Duration::from_millis(5));
}

fn branch(host: &TaskHost) {
    let _call = host.enter(spot!());
    spin(Duration::from_millis(5));
    leaf(host);
}

#[test]
#[cfg_attr(miri, ignore)] // Miri cannot use the real operating system APIs.
fn spot_macro_names_enclosing_function() {
    let host = TaskHost::new();
    let profiler = StackProfiler::builder()
        .clock(ClockKind::Wall)
        .count_stacks(true)
        .build();
    profiler.attach(&host).unwrap();

    branch(&host);

    let report = profiler.take_report();
    let names: Vec<_> = report
        .spots()
        .map(|entry| entry.spot().function())
        .collect();

    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|name| name.ends_with("::leaf")));
    assert!(names.iter().any(|name| name.ends_with("::branch")));

    for entry in report.spots() {
        assert!(entry.counters().seconds() >= Duration::from_millis(4));
        assert_eq!(entry.counters().calls(), 1);
    }
}

#[tokio::test]
#[cfg_attr(miri, ignore)] // Miri cannot use the real operating system APIs.
async fn calls_held_across_suspension_are_per_task() {
    let host = TaskHost::new();
    let profiler = StackProfiler::builder()
        .clock(ClockKind::Wall)
        .count_stacks(true)
        .build();
    profiler.attach(&host).unwrap();

    let outer = spot!("outer");
    let inner = spot!("inner");

    let local = LocalSet::new();
    for _ in 0..2 {
        let host_for_task = host.clone();
        local.spawn_local(host.instrument(async move {
            let _outer = host_for_task.enter(outer);
            yield_now().await;
            let _inner = host_for_task.enter(inner);
            spin(Duration::from_millis(3));
            yield_now().await;
        }));
    }
    local.await;

    let report = profiler.take_report();

    assert_eq!(report.spot(&outer).unwrap().calls(), 2);
    assert_eq!(report.spot(&inner).unwrap().calls(), 2);
    assert_eq!(report.stack(&[outer, inner]).unwrap().calls(), 2);
    assert!(report.stack(&[inner]).is_none());
    assert!(report.spot(&inner).unwrap().seconds() >= Duration::from_millis(6));
}

#[test]
#[cfg_attr(miri, ignore)] // Miri cannot write files to the real file system.
fn report_is_written_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let format = StackReportFormat::default()
        .path_format(format!("{}/{{pid}}.stacks", dir.path().display()))
        .spot_format("{func}");

    let host = TaskHost::new();
    let profiler = StackProfiler::builder().build();
    profiler.attach(&host).unwrap();

    host.call(spot!("busy"), || spin(Duration::from_millis(1)));

    let path = profiler.write_report(&format).unwrap();
    let content = fs::read_to_string(&path).unwrap();

    assert!(path.starts_with(dir.path()));
    assert!(content.contains(" TOTAL\n"));
    assert!(content.ends_with(" busy"));
    assert!(profiler.take_report().is_empty());
}

#[test]
#[cfg_attr(miri, ignore)] // Miri cannot write files to the real file system.
fn write_failure_still_resets_counters() {
    let dir = tempfile::tempdir().unwrap();
    let format = StackReportFormat::default()
        .path_format(format!("{}/absent/{{pid}}.stacks", dir.path().display()));

    let host = TaskHost::new();
    let profiler = StackProfiler::builder().build();
    profiler.attach(&host).unwrap();

    host.call(spot!("busy"), || black_box(1));

    let result = profiler.write_report(&format);

    assert!(matches!(result, Err(Error::WriteReport { .. })));
    assert!(profiler.take_report().is_empty());
}
