//! Interval loop around the reconciler.
//!
//! A stop request is cooperative: it prevents the next cycle from starting
//! and cuts the wait between cycles short, but an in-flight pass always runs
//! to completion.

use chrono::Local;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::sync::{EventSink, PassReport, Reconciler};

/// Granularity of the between-cycle wait.
const STOP_POLL: Duration = Duration::from_millis(100);

/// Command that ends the loop when typed on stdin.
pub const QUIT_COMMAND: &str = "QUIT";

/// Shared stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs a reconciliation pass every `interval` until stopped.
pub struct Scheduler {
    interval: Duration,
    stop: StopHandle,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop: StopHandle::new(),
        }
    }

    /// Handle for requesting a stop from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run a single cycle, framed by start and completion banners.
    pub fn run_cycle(
        &self,
        reconciler: &Reconciler,
        sink: &dyn EventSink,
        source: &Path,
        replica: &Path,
    ) -> PassReport {
        sink.append_line(&format!("\n[BACKUP] {} - Starting backup...", timestamp()));

        let start = Instant::now();
        let report = reconciler.run(source, replica);
        let elapsed = start.elapsed().as_millis();

        let outcome = if report.is_clean() {
            "Backup completed successfully.".to_string()
        } else {
            format!("Backup completed with {} error(s).", report.failures.len())
        };
        sink.append_line(&format!(
            "\n[BACKUP] {} - {} Time taken: {} ms.",
            timestamp(),
            outcome,
            elapsed
        ));

        tracing::info!(
            changes = report.changes(),
            failures = report.failures.len(),
            elapsed_ms = elapsed as u64,
            "cycle complete"
        );
        report
    }

    /// Loop until stopped, handing each cycle's report to `on_report`.
    ///
    /// Returns the number of cycles run.
    pub fn run<F>(
        &self,
        reconciler: &Reconciler,
        sink: &dyn EventSink,
        source: &Path,
        replica: &Path,
        mut on_report: F,
    ) -> usize
    where
        F: FnMut(&PassReport),
    {
        let mut cycles = 0;

        while !self.stop.is_stopped() {
            let report = self.run_cycle(reconciler, sink, source, replica);
            cycles += 1;
            on_report(&report);
            self.wait();
        }

        tracing::info!(cycles, "backup loop stopped");
        cycles
    }

    /// Sleep for one interval, waking early if a stop is requested.
    fn wait(&self) {
        let deadline = Instant::now() + self.interval;
        while !self.stop.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Read lines until one is `QUIT` (case-insensitive), then request a stop.
///
/// Returns when the quit command is seen or the input ends.
pub fn listen_for_quit<R: BufRead>(reader: R, stop: &StopHandle) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().eq_ignore_ascii_case(QUIT_COMMAND) {
            println!("[BACKUP] - Stopping backup process...");
            stop.stop();
            return;
        }
    }
}

/// Watch stdin for the quit command on a background thread.
pub fn spawn_quit_listener(stop: StopHandle) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("treemirror-quit".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            listen_for_quit(stdin.lock(), &stop);
        })
}
