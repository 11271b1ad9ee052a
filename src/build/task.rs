//! The task abstraction shared by every asset step.
//!
//! A task is a named unit of work that turns matched source files into
//! destination files. How a failure is surfaced depends on its
//! [`ErrorPolicy`].

use crate::build::TaskContext;
use crate::env::EnvError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How the runner treats a task error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Fail the task; an enclosing series stops
    Propagate,
    /// Fail the task and raise a developer notification
    Notify,
    /// End the task early without failing; an enclosing series continues
    Swallow,
}

/// Error raised by a task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Reading or writing a file failed
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A glob pattern did not parse
    #[error("Invalid glob pattern '{0}': {1}")]
    Pattern(String, glob::PatternError),
    /// A required source file is missing
    #[error("Source file not found: {}", .0.display())]
    MissingSource(PathBuf),
    /// The transformation of a single file failed
    #[error("{}: {message}", .file.display())]
    Transform { file: PathBuf, message: String },
    /// The clean target is not a safe directory to empty
    #[error("Refusing to clean {}: {reason}", .path.display())]
    UnsafeClean { path: PathBuf, reason: String },
    /// Environment lookup failed
    #[error(transparent)]
    Env(#[from] EnvError),
}

impl TaskError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TaskError::Io { path: path.into(), source }
    }

    /// A transformation failure for one file.
    pub fn transform(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        TaskError::Transform { file: file.into(), message: message.into() }
    }

    /// The source file this error points at, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            TaskError::Io { path, .. } => Some(path),
            TaskError::MissingSource(path) => Some(path),
            TaskError::Transform { file, .. } => Some(file),
            _ => None,
        }
    }
}

/// What a successful task run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    /// Files written (or removed, for clean)
    pub outputs: Vec<PathBuf>,
    /// Non-fatal messages
    pub warnings: Vec<String>,
    /// Set when the task decided it had nothing to do
    pub skipped: Option<String>,
}

impl TaskOutput {
    /// Output listing the written files.
    pub fn files(outputs: Vec<PathBuf>) -> Self {
        Self { outputs, ..Self::default() }
    }

    /// Output for a task that did not apply to this run.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self { skipped: Some(reason.into()), ..Self::default() }
    }

    /// Attach a warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// A named unit of work.
pub trait Task: Send + Sync {
    /// Task name used in logs and results.
    fn name(&self) -> &str;

    /// How errors from this task are handled.
    fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::Propagate
    }

    /// Run the task once over all of its matched sources.
    fn run(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError>;
}

/// Write a file, creating parent directories as needed.
pub fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| TaskError::io(path, e))
}

/// Read a UTF-8 source file.
pub fn read_source(path: &Path) -> Result<String, TaskError> {
    if !path.exists() {
        return Err(TaskError::MissingSource(path.to_path_buf()));
    }
    std::fs::read_to_string(path).map_err(|e| TaskError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_task_error_file() {
        let err = TaskError::transform("src/a.scss", "expected ';'");
        assert_eq!(err.file(), Some(Path::new("src/a.scss")));
        assert_eq!(err.to_string(), "src/a.scss: expected ';'");

        let err = TaskError::MissingSource(PathBuf::from("src/x.js"));
        assert_eq!(err.file(), Some(Path::new("src/x.js")));

        let err = TaskError::UnsafeClean { path: PathBuf::from("/"), reason: "root".to_string() };
        assert_eq!(err.file(), None);
    }

    #[test]
    fn test_task_output_builders() {
        let out = TaskOutput::files(vec![PathBuf::from("a.css")]).with_warning("slow");
        assert_eq!(out.outputs.len(), 1);
        assert_eq!(out.warnings, vec!["slow".to_string()]);
        assert!(out.skipped.is_none());

        let skipped = TaskOutput::skipped("development build");
        assert_eq!(skipped.skipped.as_deref(), Some("development build"));
    }

    #[test]
    fn test_write_output_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dist/assets/css/style.css");

        write_output(&path, "a{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a{}");
    }

    #[test]
    fn test_read_source_missing() {
        let temp = TempDir::new().unwrap();
        let err = read_source(&temp.path().join("nope.scss")).unwrap_err();
        assert!(matches!(err, TaskError::MissingSource(_)));
    }
}
