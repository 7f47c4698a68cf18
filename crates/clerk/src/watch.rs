//! Filesystem watcher feeding new files into the orchestrator's event path.
//!
//! Observer callbacks only enqueue events; a single dispatch thread drains the queue,
//! so a stop request always lands between two dispatches.

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backup::is_backup_location;
use crate::error::Result;
use crate::orchestrator::{MoveOutcome, Orchestrator};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Dispatching,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    FileCreated(PathBuf),
    DirCreated(PathBuf),
}

/// Map an observer event onto creation messages. Everything else is dropped.
pub fn translate(event: &Event) -> Vec<WatchEvent> {
    let created = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    );
    if !created {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .map(|path| match event.kind {
            EventKind::Create(CreateKind::Folder) => WatchEvent::DirCreated(path.clone()),
            EventKind::Create(CreateKind::File) => WatchEvent::FileCreated(path.clone()),
            _ if path.is_dir() => WatchEvent::DirCreated(path.clone()),
            _ => WatchEvent::FileCreated(path.clone()),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub dispatched: usize,
    pub failed: usize,
    /// Set when a fatal error ended the watch on its own.
    pub fault: Option<String>,
}

pub struct WatchService {
    root: PathBuf,
    orchestrator: Arc<Orchestrator>,
    settle: Duration,
    recursive: bool,
}

impl WatchService {
    pub fn new(root: impl Into<PathBuf>, orchestrator: Arc<Orchestrator>) -> Self {
        let watch = &orchestrator.settings().watch;
        let (settle, recursive) = (Duration::from_millis(watch.settle_ms), watch.recursive);
        let root = root.into();
        Self {
            root: fs::canonicalize(&root).unwrap_or(root),
            orchestrator,
            settle,
            recursive,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths the engine produced itself or that are still being written.
    pub fn should_ignore(&self, path: &Path) -> bool {
        if self.orchestrator.is_protected(path) {
            return true;
        }

        let path = canonical(path);
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        let parents: Vec<&str> = relative
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .filter_map(|c| match c {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .collect();

        let settings = self.orchestrator.settings();
        parents
            .first()
            .is_some_and(|first| settings.is_category_dir_name(first))
            || parents
                .iter()
                .any(|name| name.starts_with('.') || is_backup_location(Path::new(name)))
    }

    /// Handle one message. `None` means the event needed no work.
    pub fn dispatch(&self, event: WatchEvent) -> Option<Result<MoveOutcome>> {
        let path = match event {
            WatchEvent::DirCreated(path) => {
                debug!(dir = %path.display(), "directory created, nothing to do");
                return None;
            }
            WatchEvent::FileCreated(path) => path,
        };

        if self.should_ignore(&path) {
            debug!(path = %path.display(), "ignored");
            return None;
        }

        std::thread::sleep(self.settle);
        if !path.is_file() {
            debug!(path = %path.display(), "file vanished before dispatch");
            return None;
        }

        Some(self.orchestrator.run_one(&self.root, &path))
    }

    /// Begin watching on a background thread.
    pub fn start(self) -> anyhow::Result<WatchHandle> {
        let state = Arc::new(Mutex::new(WatchState::Idle));
        let fault = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
        let mode = match self.recursive {
            true => RecursiveMode::Recursive,
            false => RecursiveMode::NonRecursive,
        };
        watcher.watch(&self.root, mode)?;
        *state.lock() = WatchState::Watching;
        info!(root = %self.root.display(), "watching");

        let thread = {
            let (state, fault, stop) = (Arc::clone(&state), Arc::clone(&fault), Arc::clone(&stop));
            std::thread::spawn(move || self.run(rx, &state, &fault, &stop))
        };

        Ok(WatchHandle {
            state,
            fault,
            stop,
            watcher: Some(watcher),
            thread: Some(thread),
        })
    }

    fn run(
        &self,
        rx: mpsc::Receiver<notify::Result<Event>>,
        state: &Mutex<WatchState>,
        fault: &Mutex<Option<String>>,
        stop: &AtomicBool,
    ) -> WatchStats {
        let mut stats = WatchStats::default();

        while !stop.load(Ordering::SeqCst) {
            let event = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    warn!(error = %e, "watch error");
                    continue;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            };

            for message in translate(&event) {
                *state.lock() = WatchState::Dispatching;
                let result = self.dispatch(message);
                *state.lock() = WatchState::Watching;

                match result {
                    None => {}
                    Some(Ok(outcome)) => {
                        stats.dispatched += 1;
                        debug!(to = %outcome.destination.display(), "dispatched");
                    }
                    Some(Err(e)) if e.is_fatal() => {
                        error!(error = %e, "stopping watch");
                        stats.failed += 1;
                        stats.fault = Some(e.to_string());
                        *fault.lock() = stats.fault.clone();
                        *state.lock() = WatchState::Stopped;
                        return stats;
                    }
                    Some(Err(e)) => {
                        stats.failed += 1;
                        warn!(error = %e, "dispatch failed");
                    }
                }
            }
        }

        *state.lock() = WatchState::Stopped;
        info!(
            dispatched = stats.dispatched,
            failed = stats.failed,
            "watch stopped"
        );
        stats
    }
}

/// Resolve symlinks and `..` so event paths compare against the resolved root.
/// A path that no longer exists keeps its resolved parent.
fn canonical(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

pub struct WatchHandle {
    state: Arc<Mutex<WatchState>>,
    fault: Arc<Mutex<Option<String>>>,
    stop: Arc<AtomicBool>,
    watcher: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<WatchStats>>,
}

impl WatchHandle {
    pub fn state(&self) -> WatchState {
        *self.state.lock()
    }

    /// The fatal error that stopped the dispatch thread, if any.
    pub fn fault(&self) -> Option<String> {
        self.fault.lock().clone()
    }

    /// Let the in-flight dispatch finish, release the observer and join the thread.
    pub fn stop(mut self) -> (WatchState, WatchStats) {
        let stats = self.shutdown();
        (self.state(), stats)
    }

    fn shutdown(&mut self) -> WatchStats {
        self.stop.store(true, Ordering::SeqCst);
        self.watcher.take();

        let stats = match self.thread.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                error!("watch thread panicked");
                WatchStats::default()
            }
            None => WatchStats::default(),
        };
        *self.state.lock() = WatchState::Stopped;
        stats
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}
