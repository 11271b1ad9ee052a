//! Build pipeline module for assetflow
//!
//! Provides the task abstraction and the composition layer that runs the
//! asset tasks.
//!
//! # Overview
//!
//! - **Tasks**: named units of work implementing [`Task`]
//! - **Composition**: [`Step`] trees of series and parallel groups
//! - **Planning**: [`BuildPlan`] derives the `build`, `scripts` and watch
//!   compositions from the configuration
//! - **Execution**: [`Runner`] walks a step tree and collects a [`BuildResult`]
//!
//! # Example
//!
//! ```ignore
//! use assetflow::build::{BuildPlan, ConsoleNotifier, Runner, TaskContext};
//!
//! let ctx = TaskContext::new(config, project_root, environment);
//! let step = BuildPlan::new(&ctx).build();
//! let result = Runner::new(&ctx, &ConsoleNotifier).run(&step);
//! println!("{}", result.summary());
//! ```

pub mod compose;
pub mod context;
pub mod discovery;
pub mod notice;
pub mod plan;
pub mod result;
pub mod task;

pub use compose::*;
pub use context::*;
pub use discovery::*;
pub use notice::{ConsoleNotifier, Notifier};
pub use plan::*;
pub use result::*;
pub use task::*;
