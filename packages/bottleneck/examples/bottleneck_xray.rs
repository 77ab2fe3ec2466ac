//! Attributes time to the call stacks of cooperative tasks and writes the report to a file.
//!
//! Run with: `cargo run --example bottleneck_xray`.

use std::hint::black_box;
use std::time::{Duration, Instant};

use bottleneck::{StackProfiler, StackReportFormat, TaskHost, spot};
use tokio::task::{LocalSet, yield_now};
use tracing::Level;

fn burn(duration: Duration) {
    let start = Instant::now();
    let mut accumulator = 0_u64;

    while start.elapsed() < duration {
        accumulator = accumulator.wrapping_mul(31).wrapping_add(7);
        black_box(accumulator);
    }
}

fn checksum(host: &TaskHost) {
    let _call = host.enter(spot!());
    burn(Duration::from_millis(2));
}

fn decode(host: &TaskHost) {
    let _call = host.enter(spot!());
    burn(Duration::from_millis(1));
    checksum(host);
}

async fn worker(host: TaskHost, rounds: u32) {
    let _call = host.enter(spot!("worker"));

    for _ in 0..rounds {
        decode(&host);
        yield_now().await;
        checksum(&host);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let host = TaskHost::new();
    let profiler = StackProfiler::builder().count_stacks(true).build();
    profiler
        .attach(&host)
        .expect("a fresh host accepts the switch and call hooks");

    let local = LocalSet::new();
    for rounds in [5, 10, 15, 20] {
        local.spawn_local(host.instrument(worker(host.clone(), rounds)));
    }
    local.await;

    let format =
        StackReportFormat::default().strip_prefix(concat!(env!("CARGO_MANIFEST_DIR"), "/"));

    match profiler.write_report(&format) {
        Ok(path) => println!("Report written to {}", path.display()),
        Err(error) => eprintln!("{error}"),
    }
}
