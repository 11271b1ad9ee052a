//! Watch mode: rebuild on source changes and reload the browser.
//!
//! Every watch group's directory (and the literal base of every reload-only
//! glob) is watched recursively through a debounced watcher. Each debounced
//! batch runs the matching groups once, in declaration order, on the
//! watching thread; events arriving meanwhile queue in the channel.

use crate::build::{
    BuildPlan, BuildResult, BuildStatus, Notifier, ReloadWatch, Runner, TaskContext, TaskError,
    WatchGroup,
};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch {}: {source}", .path.display())]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    /// A reload glob did not parse
    #[error(transparent)]
    Plan(#[from] TaskError),
}

/// Something that tells connected browsers to reload.
pub trait ReloadSignal {
    /// Request a reload.
    fn reload(&self);
}

/// Tracks files with errors across rebuilds for recovery detection.
///
/// Entries are keyed by task, so a rebuild that does not run a task leaves
/// that task's error in place.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    files_with_errors: BTreeMap<String, PathBuf>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Update tracker with a run result, returns the files that were fixed
    pub fn update(&mut self, result: &BuildResult) -> Vec<PathBuf> {
        let mut fixed = Vec::new();
        for task in &result.tasks {
            let errored = matches!(task.status, BuildStatus::Failed(_) | BuildStatus::Ended(_));
            match (&task.error_file, errored) {
                (Some(file), true) => {
                    self.files_with_errors.insert(task.task.clone(), file.clone());
                }
                (_, false) => {
                    if let Some(file) = self.files_with_errors.remove(&task.task) {
                        fixed.push(file);
                    }
                }
                (None, true) => {}
            }
        }
        fixed
    }

    /// Check if there are any tracked errors
    pub fn has_errors(&self) -> bool {
        !self.files_with_errors.is_empty()
    }

    /// Get the number of files with errors
    pub fn error_count(&self) -> usize {
        self.files_with_errors.len()
    }
}

/// What one debounced batch of changes did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Watch groups that ran, in order
    pub groups_run: Vec<String>,
    /// Number of reload signals sent
    pub reloads: usize,
    /// Files whose earlier errors are gone
    pub fixed: Vec<PathBuf>,
}

/// The watch loop state.
pub struct WatchLoop<'a> {
    ctx: &'a TaskContext,
    notifier: &'a dyn Notifier,
    signal: &'a dyn ReloadSignal,
    groups: Vec<WatchGroup>,
    reloads: Vec<ReloadWatch>,
    tracker: ErrorTracker,
}

impl<'a> WatchLoop<'a> {
    /// Build the loop from the context's watch groups and reload globs.
    pub fn new(
        ctx: &'a TaskContext,
        notifier: &'a dyn Notifier,
        signal: &'a dyn ReloadSignal,
    ) -> Result<Self, WatchError> {
        let plan = BuildPlan::new(ctx);
        Ok(Self {
            ctx,
            notifier,
            signal,
            groups: plan.watch_groups(),
            reloads: plan.reload_watches()?,
            tracker: ErrorTracker::new(),
        })
    }

    /// Directories to watch, with nested duplicates removed.
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        let all: BTreeSet<PathBuf> = self
            .groups
            .iter()
            .map(|g| g.dir.clone())
            .chain(self.reloads.iter().map(|r| r.dir.clone()))
            .collect();
        outermost(all)
    }

    /// Directories handed to the watcher. A directory missing at startup is
    /// replaced by its nearest existing ancestor inside the project, so
    /// changes are seen once it is created.
    pub fn watch_targets(&self) -> Vec<PathBuf> {
        let root = self.ctx.project_root();
        let targets: BTreeSet<PathBuf> = self
            .watch_dirs()
            .into_iter()
            .filter_map(|dir| {
                let target = existing_ancestor(&dir, root);
                match &target {
                    Some(found) if found != &dir => {
                        info!("{} does not exist yet; watching {}", dir.display(), found.display())
                    }
                    None => warn!("not watching {}: no existing directory in the project", dir.display()),
                    _ => {}
                }
                target
            })
            .collect();
        outermost(targets)
    }

    /// Seed the error tracker with an earlier run (the initial build).
    pub fn record(&mut self, result: &BuildResult) {
        self.tracker.update(result);
    }

    /// Handle one debounced batch of changed paths.
    pub fn handle_batch(&mut self, paths: &[PathBuf]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        let triggered: Vec<&WatchGroup> =
            self.groups.iter().filter(|g| paths.iter().any(|p| g.matches(p))).collect();
        let reload_only = paths.iter().any(|p| self.reloads.iter().any(|r| r.matches(p)));

        if (!triggered.is_empty() || reload_only) && self.ctx.config().watch.clear_screen {
            clear_screen();
        }

        let runner = Runner::new(self.ctx, self.notifier);
        for group in triggered {
            for path in paths.iter().filter(|p| group.matches(p)) {
                info!(group = %group.name, "changed: {}", display_name(path));
            }

            let result = runner.run(&group.step);
            for file in self.tracker.update(&result) {
                info!("fixed: {}", display_name(&file));
                outcome.fixed.push(file);
            }
            outcome.groups_run.push(group.name.clone());

            if result.is_success() {
                info!(group = %group.name, "rebuilt in {}", format_duration(result.total_duration));
                self.signal.reload();
                outcome.reloads += 1;
            } else {
                error!(group = %group.name, "{}", result.summary());
            }
        }

        if reload_only {
            debug!("reload-only change");
            self.signal.reload();
            outcome.reloads += 1;
        }
        outcome
    }

    /// Watch for changes until the event channel closes.
    ///
    /// This blocks the calling thread.
    pub fn run(mut self) -> Result<(), WatchError> {
        let (tx, rx) = channel();
        let debounce = Duration::from_millis(u64::from(self.ctx.config().watch.debounce_ms));
        let mut debouncer = new_debouncer(debounce, tx).map_err(WatchError::WatcherInit)?;

        for dir in self.watch_targets() {
            debouncer
                .watcher()
                .watch(&dir, RecursiveMode::Recursive)
                .map_err(|source| WatchError::WatchPath { path: dir.clone(), source })?;
            info!("watching {}", dir.display());
        }

        while let Ok(event) = rx.recv() {
            match event {
                Ok(events) => {
                    let paths: BTreeSet<PathBuf> = events
                        .into_iter()
                        .filter(|e| {
                            matches!(e.kind, DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous)
                        })
                        .map(|e| e.path)
                        .collect();
                    if paths.is_empty() {
                        continue;
                    }
                    let paths: Vec<PathBuf> = paths.into_iter().collect();
                    self.handle_batch(&paths);
                }
                Err(e) => warn!("watch error: {:?}; continuing", e),
            }
        }

        debug!("watch channel closed");
        Ok(())
    }
}

/// Drop directories nested inside another one of the set.
fn outermost(all: BTreeSet<PathBuf>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in all {
        if !dirs.iter().any(|kept| dir.starts_with(kept)) {
            dirs.push(dir);
        }
    }
    dirs
}

/// `dir` itself or its closest existing ancestor, if that lies under `root`.
fn existing_ancestor(dir: &Path, root: &Path) -> Option<PathBuf> {
    dir.ancestors().find(|a| a.is_dir()).filter(|a| a.starts_with(root)).map(Path::to_path_buf)
}

/// Clear the terminal screen
fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}

/// Format duration for display
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
