//! Destinations for change events and log lines.
//!
//! Reconciliation tasks run on many threads at once but the log file is a
//! single append-only target. [`LogSink`] owns the file on one writer thread
//! and every producer hands it lines over a channel, so partial writes can
//! never interleave.

use anyhow::{Context, Result};
use colored::Colorize;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crate::sync::event::{ChangeEvent, ChangeKind, ItemFailure};

/// Capacity of the writer queue before producers start to wait.
const QUEUE_CAPACITY: usize = 1024;

/// Receiver of everything a pass wants to tell the outside world.
pub trait EventSink: Send + Sync {
    /// Record one change applied to the replica.
    fn emit(&self, event: &ChangeEvent);

    /// Append a raw text line (cycle banners and the like).
    fn append_line(&self, line: &str);

    /// Report a per-item failure. Failures are diagnostics, not changes.
    fn report_failure(&self, _failure: &ItemFailure) {}
}

enum Message {
    Event(ChangeEvent),
    Line(String),
    Flush(Sender<()>),
}

/// Appends change lines to a log file from a dedicated writer thread.
pub struct LogSink {
    path: PathBuf,
    tx: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl LogSink {
    /// Open (or create) `path` for appending.
    ///
    /// With `console` set, every line is also echoed to stdout.
    pub fn open(path: &Path, console: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        let (tx, rx) = bounded::<Message>(QUEUE_CAPACITY);
        let worker_path = path.to_path_buf();
        let worker = thread::Builder::new()
            .name("treemirror-log".to_string())
            .spawn(move || write_loop(file, rx, &worker_path, console))
            .context("Failed to spawn log writer thread")?;

        Ok(Self {
            path: path.to_path_buf(),
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until every line queued so far has reached the file.
    pub fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(Message::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    fn send(&self, message: Message) {
        if let Some(tx) = &self.tx {
            if tx.send(message).is_err() {
                tracing::warn!(log = %self.path.display(), "log writer has stopped; line dropped");
            }
        }
    }
}

impl EventSink for LogSink {
    fn emit(&self, event: &ChangeEvent) {
        self.send(Message::Event(event.clone()));
    }

    fn append_line(&self, line: &str) {
        self.send(Message::Line(line.to_string()));
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        // Closing the channel ends the writer loop once the queue is drained.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn write_loop(file: File, rx: Receiver<Message>, path: &Path, console: bool) {
    let mut writer = BufWriter::new(file);

    while let Ok(first) = rx.recv() {
        let mut pending = Some(first);
        // Drain whatever else is queued before paying for a flush.
        while let Some(message) = pending.take().or_else(|| rx.try_recv().ok()) {
            let line = match message {
                Message::Event(event) => {
                    if console {
                        println!("{}", colorize(&event));
                    }
                    event.to_string()
                }
                Message::Line(line) => {
                    if console {
                        println!("{}", line);
                    }
                    line
                }
                Message::Flush(ack) => {
                    if let Err(e) = writer.flush() {
                        tracing::warn!(log = %path.display(), error = %e, "failed to flush log file");
                    }
                    let _ = ack.send(());
                    continue;
                }
            };

            if let Err(e) = writeln!(writer, "{}", line) {
                tracing::warn!(log = %path.display(), error = %e, "failed to append to log file");
            }
        }

        if let Err(e) = writer.flush() {
            tracing::warn!(log = %path.display(), error = %e, "failed to flush log file");
        }
    }
}

fn colorize(event: &ChangeEvent) -> colored::ColoredString {
    let line = event.to_string();
    match event.kind {
        ChangeKind::FileCreated => line.green(),
        ChangeKind::FileUpdated => line.yellow(),
        ChangeKind::FileDeleted | ChangeKind::DirectoryDeleted => line.red(),
    }
}

/// Collects everything in memory. Useful for embedding and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ChangeEvent>>,
    lines: Mutex<Vec<String>>,
    failures: Mutex<Vec<(PathBuf, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events emitted so far, in arrival order.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Remove and return the events emitted so far.
    pub fn take_events(&self) -> Vec<ChangeEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Reported failures as (relative path, message).
    pub fn failures(&self) -> Vec<(PathBuf, String)> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &ChangeEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }

    fn append_line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }

    fn report_failure(&self, failure: &ItemFailure) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((failure.path.clone(), failure.error.to_string()));
        }
    }
}
