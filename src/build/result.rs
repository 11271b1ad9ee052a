//! Build result types.
//!
//! Contains types for representing the outcome of task runs.

use std::path::PathBuf;
use std::time::Duration;

/// Status of a single task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Task succeeded
    Success,
    /// Task had nothing to do in this run
    Skipped(String),
    /// Task stopped early on a swallowed error
    Ended(String),
    /// Task failed with error
    Failed(String),
}

impl BuildStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        !self.is_failure()
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed(_))
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Skipped(reason) => write!(f, "skipped: {}", reason),
            BuildStatus::Ended(reason) => write!(f, "ended early: {}", reason),
            BuildStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of running a single task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task that ran
    pub task: String,
    /// Run status
    pub status: BuildStatus,
    /// Output files produced
    pub outputs: Vec<PathBuf>,
    /// Run duration
    pub duration: Duration,
    /// Warning messages (if any)
    pub warnings: Vec<String>,
    /// Source file the error points at (if any)
    pub error_file: Option<PathBuf>,
}

impl TaskResult {
    /// Create a successful result.
    pub fn success(task: String, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self {
            task,
            status: BuildStatus::Success,
            outputs,
            duration,
            warnings: vec![],
            error_file: None,
        }
    }

    /// Create a skipped result.
    pub fn skipped(task: String, reason: String) -> Self {
        Self {
            task,
            status: BuildStatus::Skipped(reason),
            outputs: vec![],
            duration: Duration::ZERO,
            warnings: vec![],
            error_file: None,
        }
    }

    /// Create a result for a task that ended early.
    pub fn ended(task: String, reason: String, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self {
            task,
            status: BuildStatus::Ended(reason),
            outputs,
            duration,
            warnings: vec![],
            error_file: None,
        }
    }

    /// Create a failed result.
    pub fn failed(task: String, error: String, duration: Duration) -> Self {
        Self {
            task,
            status: BuildStatus::Failed(error),
            outputs: vec![],
            duration,
            warnings: vec![],
            error_file: None,
        }
    }

    /// Add warnings to the result.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Record the source file an error points at.
    pub fn with_error_file(mut self, file: Option<PathBuf>) -> Self {
        self.error_file = file;
        self
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of running a composition.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Results for each task that ran, in declaration order
    pub tasks: Vec<TaskResult>,
    /// Total duration
    pub total_duration: Duration,
}

impl BuildResult {
    /// Create a new empty build result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task result.
    pub fn add_result(&mut self, result: TaskResult) {
        self.tasks.push(result);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Look up the result of a task by name.
    pub fn task(&self, name: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|r| r.task == name)
    }

    /// Names of the tasks that ran, in order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|r| r.task.as_str()).collect()
    }

    /// Get the number of successful tasks.
    pub fn success_count(&self) -> usize {
        self.tasks.iter().filter(|r| matches!(r.status, BuildStatus::Success)).count()
    }

    /// Get the number of skipped tasks.
    pub fn skipped_count(&self) -> usize {
        self.tasks.iter().filter(|r| matches!(r.status, BuildStatus::Skipped(_))).count()
    }

    /// Get the number of tasks that ended early.
    pub fn ended_count(&self) -> usize {
        self.tasks.iter().filter(|r| matches!(r.status, BuildStatus::Ended(_))).count()
    }

    /// Get the number of failed tasks.
    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Check if the overall run succeeded (no failures).
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Get all outputs produced.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.tasks.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    /// Get all warnings.
    pub fn all_warnings(&self) -> Vec<&String> {
        self.tasks.iter().flat_map(|r| r.warnings.iter()).collect()
    }

    /// Get failed task results.
    pub fn failures(&self) -> Vec<&TaskResult> {
        self.tasks.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Format a summary of the run.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let skipped = self.skipped_count();
        let ended = self.ended_count();
        let failed = self.failed_count();
        let total = self.tasks.len();

        if failed > 0 {
            lines.push(format!(
                "Build failed: {} succeeded, {} skipped, {} failed ({} total)",
                success, skipped, failed, total
            ));
            for task in self.failures() {
                lines.push(format!("  - {}: {}", task.task, task.status));
            }
        } else {
            lines.push(format!(
                "Build succeeded: {} ran, {} skipped ({} total), {} files in {:?}",
                success,
                skipped,
                total,
                self.all_outputs().len(),
                self.total_duration
            ));
        }

        if ended > 0 {
            for task in self.tasks.iter().filter(|r| matches!(r.status, BuildStatus::Ended(_))) {
                lines.push(format!("  - {}: {}", task.task, task.status));
            }
        }

        let warnings = self.all_warnings();
        if !warnings.is_empty() {
            lines.push(format!("Warnings ({}): ", warnings.len()));
            for warning in warnings.iter().take(5) {
                lines.push(format!("  - {}", warning));
            }
            if warnings.len() > 5 {
                lines.push(format!("  ... and {} more", warnings.len() - 5));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_status_display() {
        assert_eq!(BuildStatus::Success.to_string(), "success");
        assert_eq!(BuildStatus::Skipped("dev".to_string()).to_string(), "skipped: dev");
        assert_eq!(BuildStatus::Ended("bad tag".to_string()).to_string(), "ended early: bad tag");
        assert_eq!(BuildStatus::Failed("error".to_string()).to_string(), "failed: error");
    }

    #[test]
    fn test_build_status_is_success() {
        assert!(BuildStatus::Success.is_success());
        assert!(BuildStatus::Skipped(String::new()).is_success());
        assert!(BuildStatus::Ended(String::new()).is_success());
        assert!(!BuildStatus::Failed("error".to_string()).is_success());
    }

    #[test]
    fn test_task_result_failed() {
        let result = TaskResult::failed(
            "bundle".to_string(),
            "File not found".to_string(),
            Duration::from_millis(50),
        )
        .with_error_file(Some(PathBuf::from("src/assets/js/script.js")));

        assert!(!result.is_success());
        assert!(result.outputs.is_empty());
        assert_eq!(result.error_file, Some(PathBuf::from("src/assets/js/script.js")));
    }

    #[test]
    fn test_build_result_counts() {
        let mut result = BuildResult::new();
        result.add_result(TaskResult::success("scss".to_string(), vec![], Duration::ZERO));
        result.add_result(TaskResult::skipped("includes".to_string(), "dev".to_string()));
        result.add_result(TaskResult::ended(
            "markup".to_string(),
            "bad tag".to_string(),
            vec![],
            Duration::ZERO,
        ));
        result.add_result(TaskResult::failed(
            "bundle".to_string(),
            "error".to_string(),
            Duration::ZERO,
        ));

        assert_eq!(result.success_count(), 1);
        assert_eq!(result.skipped_count(), 1);
        assert_eq!(result.ended_count(), 1);
        assert_eq!(result.failed_count(), 1);
        assert!(!result.is_success());
        assert_eq!(result.task_names(), vec!["scss", "includes", "markup", "bundle"]);
        assert!(result.task("markup").is_some());
    }

    #[test]
    fn test_build_result_all_outputs() {
        let mut result = BuildResult::new();
        result.add_result(TaskResult::success(
            "scss".to_string(),
            vec![PathBuf::from("style.css")],
            Duration::ZERO,
        ));
        result.add_result(TaskResult::success(
            "images".to_string(),
            vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")],
            Duration::ZERO,
        ));

        assert_eq!(result.all_outputs().len(), 3);
    }

    #[test]
    fn test_build_result_summary() {
        let mut result = BuildResult::new();
        result.add_result(TaskResult::success(
            "scss".to_string(),
            vec![PathBuf::from("style.css")],
            Duration::from_millis(100),
        ));

        let summary = result.with_duration(Duration::from_millis(100)).summary();
        assert!(summary.contains("Build succeeded"));
        assert!(summary.contains("1 ran"));
        assert!(summary.contains("1 files"));
    }

    #[test]
    fn test_build_result_summary_failure() {
        let mut result = BuildResult::new();
        result.add_result(TaskResult::failed(
            "minjs".to_string(),
            "unexpected token".to_string(),
            Duration::ZERO,
        ));

        let summary = result.summary();
        assert!(summary.contains("Build failed"));
        assert!(summary.contains("minjs: failed: unexpected token"));
    }
}
