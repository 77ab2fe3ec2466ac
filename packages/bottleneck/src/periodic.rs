//! Reporting loops that run as cooperative tasks of the profiled program.
//!
//! The loops sleep through `tokio` timers, so they must be driven by a `tokio` runtime.
//! Wrapping a loop with [`TaskHost::instrument`](crate::TaskHost::instrument) makes it
//! a task of its own, whose sleeps are then visible to the profilers like any other
//! suspension.

use std::convert::Infallible;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::{Result, StackProfiler, StackReportFormat, StepProfiler, StepReportFormat};

impl StepProfiler {
    /// Every `interval`, drains the counters and hands the rendered report to `sink`.
    ///
    /// Never completes. Drop the future to stop reporting.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use bottleneck::{StepProfiler, StepReportFormat, TaskHost};
    ///
    /// # #[tokio::main(flavor = "current_thread", start_paused = true)]
    /// # async fn main() {
    /// let host = TaskHost::new();
    /// let profiler = StepProfiler::builder().build();
    /// profiler.attach(&host).unwrap();
    ///
    /// let reporting = host.instrument(profiler.report_every(
    ///     Duration::from_secs(60),
    ///     StepReportFormat::default(),
    ///     |report| match report {
    ///         Ok(text) => println!("{text}"),
    ///         Err(error) => eprintln!("{error}"),
    ///     },
    /// ));
    ///
    /// tokio::time::timeout(Duration::from_secs(120), reporting)
    ///     .await
    ///     .unwrap_err();
    /// # }
    /// ```
    pub async fn report_every<S>(
        &self,
        interval: Duration,
        format: StepReportFormat,
        mut sink: S,
    ) -> Infallible
    where
        S: FnMut(Result<String>),
    {
        loop {
            sleep(interval).await;
            sink(self.report_and_reset(&format));
        }
    }
}

impl StackProfiler {
    /// Every `interval`, drains the counters and hands the rendered report to `sink`.
    ///
    /// Never completes. Drop the future to stop reporting.
    pub async fn report_every<S>(
        &self,
        interval: Duration,
        format: StackReportFormat,
        mut sink: S,
    ) -> Infallible
    where
        S: FnMut(Result<String>),
    {
        loop {
            sleep(interval).await;
            sink(self.report_and_reset(&format));
        }
    }

    /// Every `interval`, drains the counters and writes them to the file named by
    /// the path format, replacing its previous content.
    ///
    /// Failures are logged and do not stop the loop. Never completes. Drop the future
    /// to stop reporting.
    pub async fn write_report_every(
        &self,
        interval: Duration,
        format: StackReportFormat,
    ) -> Infallible {
        loop {
            sleep(interval).await;

            if let Err(error) = self.write_report(&format) {
                warn!(%error, "periodic stack report was not written");
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fs;

    use tokio::time::timeout;

    use super::*;
    use crate::pal::{FakePlatform, PlatformFacade};
    use crate::{Error, Spot, TaskHost};

    const WORK: Spot = Spot::new("work.rs", 3, "work");

    #[tokio::test(start_paused = true)]
    async fn step_reports_are_delivered_each_interval() {
        let host = TaskHost::new();
        let platform = FakePlatform::new();
        let profiler = StepProfiler::builder()
            .platform(PlatformFacade::fake(platform.clone()))
            .build();
        profiler.attach(&host).unwrap();

        profiler.begin_step("warmup");
        platform.advance(Duration::from_millis(1));
        profiler.end_scope();

        let mut reports = Vec::new();
        timeout(
            Duration::from_secs(35),
            profiler.report_every(
                Duration::from_secs(10),
                StepReportFormat::default().step_format("{step}={calls}"),
                |report| reports.push(report.unwrap()),
            ),
        )
        .await
        .unwrap_err();

        assert_eq!(reports, ["SUM=2, warmup=1, OTHER=1", "", ""]);
    }

    #[tokio::test(start_paused = true)]
    async fn step_report_errors_reach_sink() {
        let profiler = StepProfiler::builder().build();

        let mut failures = 0_usize;
        timeout(
            Duration::from_secs(25),
            profiler.report_every(
                Duration::from_secs(10),
                StepReportFormat::default().step_format("{bogus}"),
                |report| {
                    assert!(matches!(report, Err(Error::InvalidTemplate { .. })));
                    failures = failures.saturating_add(1);
                },
            ),
        )
        .await
        .unwrap_err();

        assert_eq!(failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stack_reports_are_delivered_each_interval() {
        let host = TaskHost::new();
        let platform = FakePlatform::new();
        let profiler = StackProfiler::builder()
            .platform(PlatformFacade::fake(platform.clone()))
            .build();
        profiler.attach(&host).unwrap();

        host.call(WORK, || platform.advance(Duration::from_millis(250)));

        let mut reports = Vec::new();
        timeout(
            Duration::from_secs(15),
            profiler.report_every(
                Duration::from_secs(10),
                StackReportFormat::default().spot_format("{func}"),
                |report| reports.push(report.unwrap()),
            ),
        )
        .await
        .unwrap_err();

        assert_eq!(
            reports,
            ["0.250000/1=0.250000 TOTAL\n0.250000/1=0.250000 work"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stack_report_file_is_overwritten_each_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path_format = format!("{}/{{pid}}.report", dir.path().display());
        let format = StackReportFormat::default()
            .path_format(path_format)
            .spot_format("{func}");
        let expected_path = format.report_path().unwrap();

        let host = TaskHost::new();
        let platform = FakePlatform::new();
        let profiler = StackProfiler::builder()
            .platform(PlatformFacade::fake(platform.clone()))
            .build();
        profiler.attach(&host).unwrap();

        host.call(WORK, || platform.advance(Duration::from_millis(500)));

        timeout(
            Duration::from_secs(15),
            profiler.write_report_every(Duration::from_secs(10), format.clone()),
        )
        .await
        .unwrap_err();

        let first = fs::read_to_string(&expected_path).unwrap();
        assert!(first.ends_with(" work"));

        timeout(
            Duration::from_secs(15),
            profiler.write_report_every(Duration::from_secs(10), format),
        )
        .await
        .unwrap_err();

        let second = fs::read_to_string(&expected_path).unwrap();
        assert_eq!(second, "");
    }

    #[tokio::test(start_paused = true)]
    async fn unwritable_report_does_not_stop_loop() {
        let dir = tempfile::tempdir().unwrap();
        let format = StackReportFormat::default().path_format(format!(
            "{}/missing/{{pid}}.report",
            dir.path().display()
        ));

        let profiler = StackProfiler::builder().build();

        timeout(
            Duration::from_secs(35),
            profiler.write_report_every(Duration::from_secs(10), format),
        )
        .await
        .unwrap_err();

        assert!(!dir.path().join("missing").exists());
    }
}
