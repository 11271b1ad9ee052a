//! Developer notifications for task errors.

use std::io::Write;
use std::path::Path;
use tracing::error;

/// Receives errors from tasks using [`ErrorPolicy::Notify`](crate::build::ErrorPolicy::Notify).
pub trait Notifier: Send + Sync {
    /// Report a task error to the developer.
    fn notify(&self, task: &str, file: Option<&Path>, message: &str);
}

/// Logs the error and rings the terminal bell when stderr is a TTY.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, task: &str, file: Option<&Path>, message: &str) {
        match file {
            Some(file) => error!(task, file = %file.display(), "{}", message),
            None => error!(task, "{}", message),
        }
        if atty::is(atty::Stream::Stderr) {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "\x07");
            let _ = stderr.flush();
        }
    }
}
