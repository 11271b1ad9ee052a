//! Series and parallel composition of tasks.
//!
//! A [`Step`] tree describes which tasks run and in what order. The
//! [`Runner`] walks the tree: series children run one after another and
//! stop after the first failure, parallel children run on the rayon pool
//! and always all run.

use crate::build::{BuildResult, ErrorPolicy, Notifier, Task, TaskContext, TaskResult};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// A node of a composition.
#[derive(Clone)]
pub enum Step {
    /// A single task
    Task(Arc<dyn Task>),
    /// Children run in order; a failing child stops the rest
    Series(Vec<Step>),
    /// Children run concurrently
    Parallel(Vec<Step>),
}

impl Step {
    /// Wrap a task.
    pub fn task(task: impl Task + 'static) -> Self {
        Step::Task(Arc::new(task))
    }

    /// Build a series step.
    pub fn series(steps: Vec<Step>) -> Self {
        Step::Series(steps)
    }

    /// Build a parallel step.
    pub fn parallel(steps: Vec<Step>) -> Self {
        Step::Parallel(steps)
    }

    /// Names of every task in the tree, depth first.
    pub fn task_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names(&self, names: &mut Vec<String>) {
        match self {
            Step::Task(task) => names.push(task.name().to_string()),
            Step::Series(steps) | Step::Parallel(steps) => {
                for step in steps {
                    step.collect_names(names);
                }
            }
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Task(task) => write!(f, "{}", task.name()),
            Step::Series(steps) => f.debug_tuple("series").field(steps).finish(),
            Step::Parallel(steps) => f.debug_tuple("parallel").field(steps).finish(),
        }
    }
}

/// Executes step trees against a task context.
pub struct Runner<'a> {
    ctx: &'a TaskContext,
    notifier: &'a dyn Notifier,
}

impl<'a> Runner<'a> {
    /// Create a runner.
    pub fn new(ctx: &'a TaskContext, notifier: &'a dyn Notifier) -> Self {
        Self { ctx, notifier }
    }

    /// Run a step tree to completion.
    pub fn run(&self, step: &Step) -> BuildResult {
        let start = Instant::now();
        let (results, _) = self.run_step(step);

        let mut result = BuildResult::new();
        for task_result in results {
            result.add_result(task_result);
        }
        result.with_duration(start.elapsed())
    }

    /// Returns the task results in declaration order and whether any failed.
    fn run_step(&self, step: &Step) -> (Vec<TaskResult>, bool) {
        match step {
            Step::Task(task) => {
                let result = self.run_task(task.as_ref());
                let failed = result.status.is_failure();
                (vec![result], failed)
            }
            Step::Series(steps) => {
                let mut results = Vec::new();
                for child in steps {
                    let (child_results, failed) = self.run_step(child);
                    results.extend(child_results);
                    if failed {
                        return (results, true);
                    }
                }
                (results, false)
            }
            Step::Parallel(steps) => {
                let branches: Vec<(Vec<TaskResult>, bool)> =
                    steps.par_iter().map(|child| self.run_step(child)).collect();

                let mut results = Vec::new();
                let mut failed = false;
                for (child_results, child_failed) in branches {
                    results.extend(child_results);
                    failed |= child_failed;
                }
                (results, failed)
            }
        }
    }

    fn run_task(&self, task: &dyn Task) -> TaskResult {
        let name = task.name().to_string();
        let start = Instant::now();
        debug!(task = %name, "starting");

        match task.run(self.ctx) {
            Ok(output) => {
                if let Some(reason) = output.skipped {
                    debug!(task = %name, "skipped: {}", reason);
                    return TaskResult::skipped(name, reason);
                }
                let duration = start.elapsed();
                info!(task = %name, files = output.outputs.len(), "finished in {:?}", duration);
                for warning in &output.warnings {
                    warn!(task = %name, "{}", warning);
                }
                TaskResult::success(name, output.outputs, duration).with_warnings(output.warnings)
            }
            Err(err) => {
                let duration = start.elapsed();
                let file = err.file().map(|f| f.to_path_buf());
                match task.error_policy() {
                    ErrorPolicy::Swallow => {
                        warn!(task = %name, "ended early: {}", err);
                        TaskResult::ended(name, err.to_string(), vec![], duration)
                            .with_error_file(file)
                    }
                    ErrorPolicy::Notify => {
                        self.notifier.notify(&name, file.as_deref(), &err.to_string());
                        TaskResult::failed(name, err.to_string(), duration).with_error_file(file)
                    }
                    ErrorPolicy::Propagate => {
                        error!(task = %name, "{}", err);
                        TaskResult::failed(name, err.to_string(), duration).with_error_file(file)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::notice::testing::RecordingNotifier;
    use crate::build::{BuildStatus, TaskError, TaskOutput};
    use crate::config::{default_config, Variant};
    use crate::env::select_environment;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeTask {
        name: &'static str,
        policy: ErrorPolicy,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Task for FakeTask {
        fn name(&self) -> &str {
            self.name
        }

        fn error_policy(&self) -> ErrorPolicy {
            self.policy
        }

        fn run(&self, _ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(TaskError::transform(format!("{}.src", self.name), "broken"))
            } else {
                Ok(TaskOutput::files(vec![PathBuf::from(format!("{}.out", self.name))]))
            }
        }
    }

    fn context() -> TaskContext {
        let config = default_config(Variant::Static);
        let env = select_environment(&config, Some("development")).unwrap();
        TaskContext::new(config, PathBuf::from("/project"), env)
    }

    fn fake(
        name: &'static str,
        policy: ErrorPolicy,
        fail: bool,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Step {
        Step::task(FakeTask { name, policy, fail, log: Arc::clone(log) })
    }

    #[test]
    fn test_series_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = Step::series(vec![
            fake("a", ErrorPolicy::Propagate, false, &log),
            fake("b", ErrorPolicy::Propagate, false, &log),
            fake("c", ErrorPolicy::Propagate, false, &log),
        ]);
        let ctx = context();
        let notifier = RecordingNotifier::default();
        let result = Runner::new(&ctx, &notifier).run(&step);

        assert!(result.is_success());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(result.all_outputs().len(), 3);
    }

    #[test]
    fn test_series_halts_after_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = Step::series(vec![
            fake("bundle", ErrorPolicy::Propagate, true, &log),
            fake("minjs", ErrorPolicy::Propagate, false, &log),
        ]);
        let ctx = context();
        let notifier = RecordingNotifier::default();
        let result = Runner::new(&ctx, &notifier).run(&step);

        assert!(!result.is_success());
        assert_eq!(*log.lock().unwrap(), vec!["bundle"]);
        assert_eq!(result.task_names(), vec!["bundle"]);
        assert_eq!(
            result.task("bundle").unwrap().error_file,
            Some(PathBuf::from("bundle.src"))
        );
    }

    #[test]
    fn test_parallel_siblings_still_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = Step::parallel(vec![
            Step::series(vec![
                fake("scss", ErrorPolicy::Propagate, true, &log),
                fake("css", ErrorPolicy::Propagate, false, &log),
            ]),
            fake("json", ErrorPolicy::Propagate, false, &log),
            fake("images", ErrorPolicy::Propagate, false, &log),
        ]);
        let ctx = context();
        let notifier = RecordingNotifier::default();
        let result = Runner::new(&ctx, &notifier).run(&step);

        assert_eq!(result.failed_count(), 1);
        assert_eq!(result.success_count(), 2);
        // Declaration order, regardless of completion order.
        assert_eq!(result.task_names(), vec!["scss", "json", "images"]);
        assert!(!log.lock().unwrap().contains(&"css"));
    }

    #[test]
    fn test_swallowed_error_lets_series_continue() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = Step::series(vec![
            fake("markup", ErrorPolicy::Swallow, true, &log),
            fake("includes", ErrorPolicy::Swallow, false, &log),
        ]);
        let ctx = context();
        let notifier = RecordingNotifier::default();
        let result = Runner::new(&ctx, &notifier).run(&step);

        assert!(result.is_success());
        assert!(matches!(result.task("markup").unwrap().status, BuildStatus::Ended(_)));
        assert_eq!(result.task("includes").unwrap().status, BuildStatus::Success);
        assert!(notifier.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_notify_policy_reports_and_fails() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = Step::series(vec![
            fake("scss", ErrorPolicy::Notify, true, &log),
            fake("css", ErrorPolicy::Propagate, false, &log),
        ]);
        let ctx = context();
        let notifier = RecordingNotifier::default();
        let result = Runner::new(&ctx, &notifier).run(&step);

        assert_eq!(result.failed_count(), 1);
        let seen = notifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "scss");
        assert!(seen[0].1.contains("broken"));
    }

    #[test]
    fn test_skipped_task_does_not_halt_series() {
        struct Skipper(Arc<AtomicUsize>);
        impl Task for Skipper {
            fn name(&self) -> &str {
                "includes"
            }
            fn run(&self, _ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(TaskOutput::skipped("development build"))
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));
        let step = Step::series(vec![
            Step::task(Skipper(Arc::clone(&count))),
            fake("after", ErrorPolicy::Propagate, false, &log),
        ]);
        let ctx = context();
        let notifier = RecordingNotifier::default();
        let result = Runner::new(&ctx, &notifier).run(&step);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(result.skipped_count(), 1);
        assert_eq!(result.success_count(), 1);
    }

    #[test]
    fn test_step_task_names() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = Step::series(vec![
            fake("clean", ErrorPolicy::Propagate, false, &log),
            Step::parallel(vec![
                fake("json", ErrorPolicy::Propagate, false, &log),
                fake("images", ErrorPolicy::Propagate, false, &log),
            ]),
        ]);
        assert_eq!(step.task_names(), vec!["clean", "json", "images"]);
        assert_eq!(format!("{:?}", step), "series([clean, parallel([json, images])])");
    }
}
