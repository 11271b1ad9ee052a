//! Environment selection.
//!
//! Resolves the `--env` flag (or `NODE_ENV`) against the configured
//! environment mapping to pick an output root and public paths.

use crate::config::{AssetConfig, PublicPath};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment used when neither `--env` nor `NODE_ENV` is given.
pub const DEFAULT_ENV: &str = "development";

/// Name that marks an environment as production.
pub const PRODUCTION: &str = "production";

/// Error selecting an environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    /// The requested name is not in the mapping
    #[error("Unknown environment '{name}' (configured: {})", .known.join(", "))]
    Unknown { name: String, known: Vec<String> },
}

/// A resolved environment entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    name: String,
    root: PathBuf,
    path: PublicPath,
}

impl Environment {
    /// Environment name as selected.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output root, relative to the project root unless configured absolute.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public paths handed to templates.
    pub fn public_path(&self) -> &PublicPath {
        &self.path
    }

    /// Whether this is the production environment.
    pub fn is_production(&self) -> bool {
        self.name == PRODUCTION
    }
}

/// Name of the environment to use when no flag is given.
///
/// `NODE_ENV` wins when set and non-empty.
pub fn default_env_name() -> String {
    std::env::var("NODE_ENV")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENV.to_string())
}

/// Look up an environment by flag, falling back to [`default_env_name`].
pub fn select_environment(config: &AssetConfig, flag: Option<&str>) -> Result<Environment, EnvError> {
    let name = match flag {
        Some(name) => name.to_string(),
        None => default_env_name(),
    };
    lookup(config, &name)
}

fn lookup(config: &AssetConfig, name: &str) -> Result<Environment, EnvError> {
    match config.environments.get(name) {
        Some(entry) => Ok(Environment {
            name: name.to_string(),
            root: entry.root.clone(),
            path: entry.path.clone(),
        }),
        None => Err(EnvError::Unknown { name: name.to_string(), known: config.environment_names() }),
    }
}

/// Root directory the clean task empties.
///
/// `NODE_ENV=production` selects the production root and any other
/// `NODE_ENV` value the development root. Without `NODE_ENV` the selected
/// environment is cleaned.
pub fn clean_root(config: &AssetConfig, selected: &Environment) -> Result<PathBuf, EnvError> {
    match std::env::var("NODE_ENV").ok().filter(|v| !v.trim().is_empty()) {
        Some(node_env) => {
            let name = if node_env == PRODUCTION { PRODUCTION } else { DEFAULT_ENV };
            lookup(config, name).map(|env| env.root)
        }
        None => Ok(selected.root.clone()),
    }
}
