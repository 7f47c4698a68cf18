use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::orchestrator::{BatchReport, Orchestrator};

/// Runs batches against one source directory, on demand or per trigger.
pub struct BatchRunner {
    source: PathBuf,
    orchestrator: Arc<Orchestrator>,
}

impl BatchRunner {
    pub fn new(source: impl Into<PathBuf>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            source: source.into(),
            orchestrator,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn run_now(&self) -> Result<BatchReport> {
        self.orchestrator.run_batch(&self.source)
    }

    /// One batch per received trigger until the sender hangs up. Returns the number of
    /// completed runs; only a fatal error ends the loop early.
    pub fn run_on_triggers(&self, triggers: Receiver<()>) -> Result<usize> {
        let mut runs = 0;
        for () in triggers {
            match self.run_now() {
                Ok(report) => {
                    runs += 1;
                    info!(run = runs, "{}", report.summary());
                }
                Err(e) if e.is_fatal() => {
                    error!(dir = %self.source.display(), error = %e, "batch aborted");
                    return Err(e);
                }
                Err(e) => warn!(dir = %self.source.display(), error = %e, "batch failed"),
            }
        }
        Ok(runs)
    }
}

/// Sends a trigger every `interval` until stopped or until the receiver is dropped.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn start(interval: Duration) -> (Self, Receiver<()>) {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let step = interval.min(Duration::from_millis(100));
                let mut waited = Duration::ZERO;
                while !stop.load(Ordering::SeqCst) {
                    std::thread::sleep(step);
                    waited += step;
                    if waited < interval {
                        continue;
                    }
                    waited = Duration::ZERO;
                    if tx.send(()).is_err() {
                        break;
                    }
                }
            })
        };

        (
            Self {
                stop,
                thread: Some(thread),
            },
            rx,
        )
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.halt();
    }
}
