//! Configuration loading and discovery for `assetflow.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::{
    AssetConfig, DataConfig, ImagesConfig, MarkupConfig, ProjectConfig, ScriptsConfig,
    ServerConfig, StylesConfig, Variant, WatchConfig,
};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "assetflow.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse assetflow.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override project variant
    pub variant: Option<Variant>,
    /// Override dev server port
    pub port: Option<u16>,
    /// Override the proxied upstream
    pub proxy: Option<String>,
}

/// Find assetflow.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find assetflow.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from an assetflow.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns the static
/// preset.
pub fn load_config(path: Option<&Path>) -> Result<AssetConfig, ConfigError> {
    load_config_with(path, &CliOverrides::default())
}

/// Load configuration and apply CLI overrides before variant defaults are filled in.
pub fn load_config_with(
    path: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<AssetConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    let mut config = match config_path {
        Some(p) => {
            let contents = fs::read_to_string(&p)?;
            let mut config = toml::from_str::<AssetConfig>(&contents)?;
            if config.project.name.is_empty() {
                config.project.name = config_dir_name(&p);
            }
            config
        }
        None => bare_config(overrides.variant.unwrap_or_default()),
    };

    merge_cli_overrides(&mut config, overrides);
    config.apply_variant_defaults();

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Create the built-in configuration for a variant.
///
/// The project name is the current directory name.
pub fn default_config(variant: Variant) -> AssetConfig {
    let mut config = bare_config(variant);
    config.apply_variant_defaults();
    config
}

fn bare_config(variant: Variant) -> AssetConfig {
    let project_name = env::current_dir().ok().as_deref().and_then(dir_name);

    AssetConfig {
        project: ProjectConfig {
            name: project_name.unwrap_or_else(|| UNNAMED.to_string()),
            variant,
            ..ProjectConfig::default()
        },
        environments: BTreeMap::new(),
        styles: StylesConfig::default(),
        scripts: ScriptsConfig::default(),
        markup: MarkupConfig::default(),
        images: ImagesConfig::default(),
        data: DataConfig::default(),
        server: ServerConfig::default(),
        watch: WatchConfig::default(),
    }
}

const UNNAMED: &str = "unnamed";

/// Name of the directory holding a config file.
fn config_dir_name(config_path: &Path) -> String {
    let dir = match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => env::current_dir().unwrap_or_default(),
    };
    let dir = fs::canonicalize(&dir).unwrap_or(dir);
    dir_name(&dir).unwrap_or_else(|| UNNAMED.to_string())
}

fn dir_name(dir: &Path) -> Option<String> {
    dir.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut AssetConfig, overrides: &CliOverrides) {
    if let Some(variant) = overrides.variant {
        config.project.variant = variant;
    }

    if let Some(port) = overrides.port {
        config.server.port = port;
    }

    if let Some(ref proxy) = overrides.proxy {
        config.server.proxy = Some(proxy.clone());
    }
}

/// Get the project root directory from a config file path.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}

/// Resolve a path relative to the project root.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project root.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE);
        File::create(&config_path)
            .expect("should create config file")
            .write_all(content.as_bytes())
            .expect("should write config content");
        config_path
    }

    #[test]
    fn test_find_config_in_current_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "[project]\nname = \"test\"");

        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "[project]\nname = \"test\"");

        let subdir = temp.path().join("src").join("assets");
        fs::create_dir_all(&subdir).expect("should create subdirectories");

        let found = find_config_from(subdir);
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_not_found() {
        let temp = TempDir::new().expect("should create temp dir");
        let found = find_config_from(temp.path().to_path_buf());
        assert_eq!(found, None);
    }

    #[test]
    fn test_load_config_from_file() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(
            temp.path(),
            r#"
[project]
name = "site"

[environments.development]
root = "public"

[server]
port = 8080
"#,
        );

        let config = load_config(Some(&config_path)).expect("should load valid config");
        assert_eq!(config.project.name, "site");
        assert_eq!(config.environments.len(), 1);
        assert_eq!(config.environments["development"].root, PathBuf::from("public"));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_config_missing_file_errors() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = temp.path().join("nonexistent.toml");

        let result = load_config(Some(&config_path));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "this is not valid toml {{{");

        let result = load_config(Some(&config_path));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_validation_error() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(
            temp.path(),
            r#"
[project]
name = "site"

[images]
jpeg_quality = 150
"#,
        );

        let result = load_config(Some(&config_path));
        match result {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("images.jpeg_quality")));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_config_variant_override_applies_before_defaults() {
        let temp = TempDir::new().expect("should create temp dir");
        let config_path = write_config(temp.path(), "[project]\nname = \"theme\"");

        let overrides = CliOverrides { variant: Some(Variant::Wordpress), ..Default::default() };
        let config = load_config_with(Some(&config_path), &overrides).expect("should load");

        assert_eq!(config.project.variant, Variant::Wordpress);
        assert_eq!(
            config.environments["production"].root,
            PathBuf::from("wp-content/themes/theme")
        );
        assert!(config.server.proxy.is_some());
    }

    #[test]
    fn test_load_config_without_project_section() {
        let temp = TempDir::new().expect("should create temp dir");
        let project = temp.path().join("my-site");
        fs::create_dir_all(&project).expect("should create project dir");
        let config_path = write_config(&project, "[environments.preview]\nroot = \"preview\"\n");

        let config = load_config(Some(&config_path)).expect("should load without [project]");
        assert_eq!(config.project.name, "my-site");
        assert_eq!(config.project.variant, Variant::Static);
        assert_eq!(config.environment_names(), vec!["preview"]);
    }

    #[test]
    fn test_load_config_names_theme_after_directory() {
        let temp = TempDir::new().expect("should create temp dir");
        let project = temp.path().join("ichigo");
        fs::create_dir_all(&project).expect("should create project dir");
        let config_path = write_config(&project, "[project]\nvariant = \"wordpress\"\n");

        let config = load_config(Some(&config_path)).expect("should load without a name");
        assert_eq!(config.project.name, "ichigo");
        assert_eq!(
            config.environments["production"].root,
            PathBuf::from("wp-content/themes/ichigo")
        );
    }

    #[test]
    fn test_merge_cli_overrides_port_and_proxy() {
        let mut config = default_config(Variant::Static);
        let overrides = CliOverrides {
            port: Some(3100),
            proxy: Some("http://localhost:8080/".to_string()),
            ..Default::default()
        };

        merge_cli_overrides(&mut config, &overrides);
        assert_eq!(config.server.port, 3100);
        assert_eq!(config.server.proxy.as_deref(), Some("http://localhost:8080/"));
    }

    #[test]
    fn test_default_config_static() {
        let config = default_config(Variant::Static);
        assert!(!config.project.name.is_empty());
        assert_eq!(config.environment_names(), vec!["development", "production"]);
        assert!(config.is_valid());
    }

    #[test]
    fn test_default_config_wordpress() {
        let config = default_config(Variant::Wordpress);
        assert_eq!(config.project.variant, Variant::Wordpress);
        assert!(config.environments["development"].root.starts_with("wp-content/themes"));
        assert!(config.is_valid());
    }

    #[test]
    fn test_resolve_path_absolute() {
        let root = Path::new("/project");
        let absolute = Path::new("/other/path");
        assert_eq!(resolve_path(root, absolute), PathBuf::from("/other/path"));
    }

    #[test]
    fn test_resolve_path_relative() {
        let root = Path::new("/project");
        let relative = Path::new("src/assets");
        assert_eq!(resolve_path(root, relative), PathBuf::from("/project/src/assets"));
    }

    #[test]
    fn test_project_root() {
        let config_path = Path::new("/project/assetflow.toml");
        assert_eq!(project_root(config_path), Some(Path::new("/project")));
    }
}
