//! Output root cleaning.

use crate::build::{Task, TaskContext, TaskError, TaskOutput};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Delete everything inside the clean root, keeping the directory itself.
#[derive(Debug, Default)]
pub struct CleanTask;

impl Task for CleanTask {
    fn name(&self) -> &str {
        "clean"
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let target = ctx.clean_root()?;
        if !target.exists() {
            return Ok(TaskOutput::skipped(format!("{} does not exist", target.display())));
        }

        let target = canonical(&target)?;
        check_target(&target, &canonical(ctx.project_root())?, &ctx.src_dir())?;

        let mut removed = Vec::new();
        let entries = std::fs::read_dir(&target).map_err(|e| TaskError::io(&target, e))?;
        for entry in entries {
            let path = entry.map_err(|e| TaskError::io(&target, e))?.path();
            let result = if path.is_dir() && !path.is_symlink() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            result.map_err(|e| TaskError::io(&path, e))?;
            debug!(path = %path.display(), "removed");
            removed.push(path);
        }
        removed.sort();
        Ok(TaskOutput::files(removed))
    }
}

fn canonical(path: &Path) -> Result<PathBuf, TaskError> {
    path.canonicalize().map_err(|e| TaskError::io(path, e))
}

/// The clean root must sit strictly inside the project and must not hold
/// the sources.
fn check_target(target: &Path, project_root: &Path, src_dir: &Path) -> Result<(), TaskError> {
    let unsafe_clean = |reason: &str| TaskError::UnsafeClean {
        path: target.to_path_buf(),
        reason: reason.to_string(),
    };

    if target == project_root {
        return Err(unsafe_clean("it is the project root"));
    }
    if !target.starts_with(project_root) {
        return Err(unsafe_clean("it is outside the project root"));
    }
    if let Ok(src) = src_dir.canonicalize() {
        if src.starts_with(target) {
            return Err(unsafe_clean("it contains the source directory"));
        }
    }
    Ok(())
}
