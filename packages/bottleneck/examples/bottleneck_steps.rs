//! Finds the slow step of a request handler that shares its thread with other requests.
//!
//! Each simulated request loads, computes and renders. Loading waits on a timer, so the
//! other requests run meanwhile. The periodic report shows how much processor time each
//! step took on its own and how long loading took on the wall clock.
//!
//! Run with: `cargo run --example bottleneck_steps`.

use std::hint::black_box;
use std::time::{Duration, Instant};

use bottleneck::{StepProfiler, StepReportFormat, TaskHost};
use tokio::task::{LocalSet, spawn_local};
use tokio::time::sleep;
use tracing::Level;

const REQUESTS: u64 = 20;

fn burn(duration: Duration) {
    let start = Instant::now();
    let mut accumulator = 0_u64;

    while start.elapsed() < duration {
        accumulator = accumulator.wrapping_mul(31).wrapping_add(7);
        black_box(accumulator);
    }
}

async fn handle_request(profiler: StepProfiler, request: u64) {
    let wall = profiler.begin_step("load");
    sleep(Duration::from_millis(request.wrapping_mul(3).wrapping_add(10))).await;

    profiler.begin_step("compute");
    burn(Duration::from_millis(4));

    if let Some(wall) = wall {
        profiler.begin_step_with_wall("render", wall);
    }
    burn(Duration::from_millis(1));

    profiler.end_scope();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let host = TaskHost::new();
    let profiler = StepProfiler::builder().build();
    profiler
        .attach(&host)
        .expect("a fresh host accepts the switch hook");

    let local = LocalSet::new();

    let reporter = profiler.clone();
    local.spawn_local(host.instrument(async move {
        reporter
            .report_every(
                Duration::from_millis(50),
                StepReportFormat::default().steps_separator("\n"),
                |report| match report {
                    Ok(text) if !text.is_empty() => println!("{text}\n"),
                    Ok(_) => {}
                    Err(error) => eprintln!("{error}"),
                },
            )
            .await
    }));

    local
        .run_until(async {
            let mut requests = Vec::new();
            for request in 0..REQUESTS {
                requests.push(spawn_local(
                    host.instrument(handle_request(profiler.clone(), request)),
                ));
            }

            for request in requests {
                request.await.expect("request handlers do not panic");
            }
        })
        .await;

    profiler.detach();
    println!("{}", profiler.take_report());
}
