//! Task context containing configuration and the selected environment.

use crate::config::AssetConfig;
use crate::env::{self, EnvError, Environment};
use std::path::{Path, PathBuf};

/// Everything a task needs to map source paths to output paths.
///
/// Source paths resolve against `project.src`; output paths resolve against
/// the selected environment's root.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// The loaded configuration
    config: AssetConfig,
    /// Project root directory (where assetflow.toml is located)
    project_root: PathBuf,
    /// Selected environment
    environment: Environment,
    /// Whether to log per-file detail
    verbose: bool,
}

impl TaskContext {
    /// Create a new task context.
    pub fn new(config: AssetConfig, project_root: PathBuf, environment: Environment) -> Self {
        Self { config, project_root, environment, verbose: false }
    }

    /// Get the configuration.
    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the selected environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Whether the selected environment is production.
    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Source directory (resolved to absolute path).
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// A path under the source directory.
    pub fn src_path(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.src_dir().join(relative)
        }
    }

    /// Output root of the selected environment (resolved to absolute path).
    pub fn out_root(&self) -> PathBuf {
        self.resolve_path(self.environment.root())
    }

    /// A path under the output root.
    pub fn out_path(&self, relative: &Path) -> PathBuf {
        self.out_root().join(relative)
    }

    /// Directory the clean task empties (resolved to absolute path).
    pub fn clean_root(&self) -> Result<PathBuf, EnvError> {
        env::clean_root(&self.config, &self.environment).map(|root| self.resolve_path(&root))
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    /// If relative, joins it with the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}
