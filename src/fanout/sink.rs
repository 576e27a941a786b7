//! Thread-safe destination for command outcomes.
//!
//! Every host task reports into one shared [`ResultSink`]. Console blocks and log
//! records are each written under their own mutex, so output from different hosts
//! never interleaves inside a block or a record.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossterm::style::{Color, Stylize};
use tracing::{info, warn};

use super::error::FanoutError;
use super::types::{CommandOutcome, RunSummary};

type SharedWriter = Box<dyn Write + Send>;

pub struct ResultSink {
    console: Mutex<SharedWriter>,
    log: Mutex<Option<SharedWriter>>,
    colored: bool,
    hosts: AtomicUsize,
    hosts_failed: AtomicUsize,
    commands_succeeded: AtomicUsize,
    commands_failed: AtomicUsize,
    cancelled: AtomicBool,
}

impl ResultSink {
    /// Sink printing to stdout, logging to `log_path` when given.
    ///
    /// An existing log file is truncated.
    pub fn stdout(log_path: Option<&Path>, colored: bool) -> Result<Self, FanoutError> {
        let log = match log_path {
            Some(path) => {
                let file = File::create(path).map_err(|e| {
                    FanoutError::Config(format!(
                        "failed to create log file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!(path = %path.display(), "writing command log");
                Some(Box::new(BufWriter::new(file)) as SharedWriter)
            }
            None => None,
        };
        Ok(Self::with_writers(Box::new(io::stdout()), log, colored))
    }

    pub fn with_writers(console: SharedWriter, log: Option<SharedWriter>, colored: bool) -> Self {
        Self {
            console: Mutex::new(console),
            log: Mutex::new(log),
            colored,
            hosts: AtomicUsize::new(0),
            hosts_failed: AtomicUsize::new(0),
            commands_succeeded: AtomicUsize::new(0),
            commands_failed: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.colored {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn print(&self, block: &str) {
        let mut console = lock(&self.console);
        if let Err(e) = console.write_all(block.as_bytes()).and_then(|_| console.flush()) {
            warn!("failed to write to console: {}", e);
        }
    }

    /// Announce that a connection to `host` is being opened.
    pub fn connecting(&self, host: &str) {
        self.print(&format!(
            "{}\n",
            self.paint(&format!("Connecting to {}...", host), Color::Blue)
        ));
    }

    /// Report that `host` was dropped by an interrupt before it ran anything.
    pub fn cancelled(&self, host: &str) {
        self.print(&format!(
            "{}\n",
            self.paint(&format!("Cancelled connection to {}", host), Color::Yellow)
        ));
    }

    /// Print one outcome and append it to the log.
    pub fn record(&self, outcome: &CommandOutcome) {
        let output = outcome.output_text();

        let block = match &outcome.error {
            None => {
                self.commands_succeeded.fetch_add(1, Ordering::Relaxed);
                format!(
                    "{}\n{}\n",
                    self.paint(&format!("Output from {}:", outcome.host), Color::Green),
                    output
                )
            }
            Some(error) => {
                self.commands_failed.fetch_add(1, Ordering::Relaxed);
                let header = self.paint(
                    &format!("Error on {} running '{}': {}", outcome.host, outcome.command, error),
                    Color::Red,
                );
                if output.is_empty() {
                    format!("{}\n", header)
                } else {
                    format!("{}\n{}\n", header, output)
                }
            }
        };
        self.print(&block);

        let mut log = lock(&self.log);
        if let Some(writer) = log.as_mut() {
            let record = format!("[{}] {}\n{}\n", outcome.host, outcome.command, output);
            if let Err(e) = writer
                .write_all(record.as_bytes())
                .and_then(|_| writer.flush())
            {
                warn!(host = %outcome.host, "failed to write log record: {}", e);
            }
        }
    }

    /// Print a failure that abandoned a whole host. Not written to the log.
    pub fn record_host_failure(&self, host: &str, error: &FanoutError) {
        self.hosts_failed.fetch_add(1, Ordering::Relaxed);
        self.print(&format!(
            "{}\n",
            self.paint(&format!("Error on {}: {}", host, error), Color::Red)
        ));
    }

    pub fn set_hosts(&self, hosts: usize) {
        self.hosts.store(hosts, Ordering::Relaxed);
    }

    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            hosts: self.hosts.load(Ordering::Relaxed),
            hosts_failed: self.hosts_failed.load(Ordering::Relaxed),
            commands_succeeded: self.commands_succeeded.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Flush and release the log. Safe to call more than once.
    pub fn close(&self) {
        if let Some(mut writer) = lock(&self.log).take()
            && let Err(e) = writer.flush()
        {
            warn!("failed to flush log: {}", e);
        }
        let _ = lock(&self.console).flush();
    }
}

impl Drop for ResultSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
