//! Configuration schema types for `assetflow.toml`
//!
//! Defines the structure and validation rules for an asset project.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Which flavour of project the pipeline builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Plain static site served from the output root
    #[default]
    Static,
    /// WordPress theme, previewed through a proxied local WordPress install
    Wordpress,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Static => write!(f, "static"),
            Variant::Wordpress => write!(f, "wordpress"),
        }
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(Variant::Static),
            "wordpress" | "wp" => Ok(Variant::Wordpress),
            other => Err(format!("unknown variant '{}' (expected static or wordpress)", other)),
        }
    }
}

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name, also used as the WordPress theme directory. Left empty,
    /// the loader fills in the config directory name.
    #[serde(default)]
    pub name: String,
    /// Project variant
    #[serde(default)]
    pub variant: Variant,
    /// Source directory
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Whether `build` wipes the output root first (defaults per variant)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean: Option<bool>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { name: String::new(), variant: Variant::default(), src: default_src(), clean: None }
    }
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

/// URLs handed to templates as `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicPath {
    /// Absolute base URL of the site
    pub absolute: String,
    /// Relative base path
    pub relative: String,
}

impl Default for PublicPath {
    fn default() -> Self {
        Self { absolute: "http://localhost:3000".to_string(), relative: "/".to_string() }
    }
}

/// One entry of the environment mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Output root directory
    pub root: PathBuf,
    /// Public paths for templates
    #[serde(default)]
    pub path: PublicPath,
}

/// Sass entry and output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Entry stylesheet, relative to `project.src`
    #[serde(default = "default_styles_entry")]
    pub entry: PathBuf,
    /// Directory watched for changes, relative to `project.src`
    #[serde(default = "default_styles_watch")]
    pub watch: PathBuf,
    /// Output directory, relative to the environment root
    #[serde(default = "default_styles_out")]
    pub out: PathBuf,
    /// Prepend `@charset "utf-8";` to the minified stylesheet
    #[serde(default = "default_true")]
    pub charset: bool,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: default_styles_entry(),
            watch: default_styles_watch(),
            out: default_styles_out(),
            charset: true,
        }
    }
}

fn default_styles_entry() -> PathBuf {
    PathBuf::from("assets/scss/style.scss")
}

fn default_styles_watch() -> PathBuf {
    PathBuf::from("assets/scss")
}

fn default_styles_out() -> PathBuf {
    PathBuf::from("assets/css")
}

/// JavaScript entry and bundle output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Entry script, relative to `project.src`
    #[serde(default = "default_scripts_entry")]
    pub entry: PathBuf,
    /// Directory watched for changes, relative to `project.src`
    #[serde(default = "default_scripts_watch")]
    pub watch: PathBuf,
    /// Bundle file name
    #[serde(default = "default_bundle")]
    pub bundle: String,
    /// Output directory, relative to the environment root
    #[serde(default = "default_scripts_out")]
    pub out: PathBuf,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            entry: default_scripts_entry(),
            watch: default_scripts_watch(),
            bundle: default_bundle(),
            out: default_scripts_out(),
        }
    }
}

fn default_scripts_entry() -> PathBuf {
    PathBuf::from("assets/js/script.js")
}

fn default_scripts_watch() -> PathBuf {
    PathBuf::from("assets/js")
}

fn default_bundle() -> String {
    "bundle.js".to_string()
}

fn default_scripts_out() -> PathBuf {
    PathBuf::from("assets/js")
}

/// Template pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupConfig {
    /// Enable the markup tasks (defaults per variant)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Template directory, relative to `project.src`
    #[serde(default = "default_markup_dir")]
    pub dir: PathBuf,
    /// JSON file whose top-level keys become template variables
    #[serde(default = "default_markup_data")]
    pub data: PathBuf,
    /// Directory rendered to `.inc` fragments in production
    #[serde(default = "default_markup_includes")]
    pub includes: PathBuf,
    /// File-name prefix excluded from `.inc` rendering
    #[serde(default = "default_includes_exclude")]
    pub includes_exclude: String,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            dir: default_markup_dir(),
            data: default_markup_data(),
            includes: default_markup_includes(),
            includes_exclude: default_includes_exclude(),
        }
    }
}

fn default_markup_dir() -> PathBuf {
    PathBuf::from("ejs")
}

fn default_markup_data() -> PathBuf {
    PathBuf::from("ejs/data.json")
}

fn default_markup_includes() -> PathBuf {
    PathBuf::from("ejs/play")
}

fn default_includes_exclude() -> String {
    "panel".to_string()
}

/// Image minification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Source directory, relative to `project.src`
    #[serde(default = "default_images_dir")]
    pub dir: PathBuf,
    /// Output directory, relative to the environment root
    #[serde(default = "default_images_out")]
    pub out: PathBuf,
    /// JPEG re-encoding quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            dir: default_images_dir(),
            out: default_images_out(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("assets/images")
}

fn default_images_out() -> PathBuf {
    PathBuf::from("assets/images")
}

fn default_jpeg_quality() -> u8 {
    85
}

/// JSON data files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Enable the json task (defaults per variant)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Source directory, relative to `project.src`
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    /// Output directory, relative to the environment root
    #[serde(default = "default_data_out")]
    pub out: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { enabled: None, dir: default_data_dir(), out: default_data_out() }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_data_out() -> PathBuf {
    PathBuf::from("data")
}

/// Dev server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Add `Access-Control-Allow-Origin: *` to every response
    #[serde(default = "default_true")]
    pub cors: bool,
    /// Upstream site to proxy instead of serving the output root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port(), cors: true, proxy: None }
    }
}

fn default_port() -> u16 {
    3000
}

/// Watch mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce time in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal before each rebuild
    #[serde(default)]
    pub clear_screen: bool,
    /// Globs (relative to the project root) that only trigger a browser reload
    #[serde(default)]
    pub reload: Vec<String>,
}

fn default_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100, clear_screen: false, reload: vec![] }
    }
}

fn default_true() -> bool {
    true
}

/// Complete assetflow.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Project metadata
    #[serde(default)]
    pub project: ProjectConfig,
    /// Environment name to output root and public paths
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    /// Sass settings
    #[serde(default)]
    pub styles: StylesConfig,
    /// JavaScript settings
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Template settings
    #[serde(default)]
    pub markup: MarkupConfig,
    /// Image settings
    #[serde(default)]
    pub images: ImagesConfig,
    /// JSON data settings
    #[serde(default)]
    pub data: DataConfig,
    /// Dev server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "environments.production.root")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assetflow.toml: '{}' {}", self.field, self.message)
    }
}

/// Upstream used by the WordPress preset when no proxy is configured.
pub const WORDPRESS_PROXY: &str = "http://localhost:8888/";

impl AssetConfig {
    /// Output root of the WordPress theme for this project.
    pub fn theme_root(&self) -> PathBuf {
        PathBuf::from("wp-content/themes").join(&self.project.name)
    }

    /// Fill variant-dependent values the file left unset.
    ///
    /// Environments are only added when the mapping is empty; an explicit
    /// mapping is taken as-is.
    pub fn apply_variant_defaults(&mut self) {
        if self.environments.is_empty() {
            self.environments = match self.project.variant {
                Variant::Static => [
                    ("development", PathBuf::from("dist")),
                    ("production", PathBuf::from("prod")),
                ]
                .into_iter()
                .map(|(name, root)| {
                    (name.to_string(), EnvironmentConfig { root, path: PublicPath::default() })
                })
                .collect(),
                Variant::Wordpress => {
                    let root = self.theme_root();
                    ["development", "production"]
                        .into_iter()
                        .map(|name| {
                            (
                                name.to_string(),
                                EnvironmentConfig { root: root.clone(), path: PublicPath::default() },
                            )
                        })
                        .collect()
                }
            };
        }

        if self.project.variant == Variant::Wordpress {
            if self.server.proxy.is_none() {
                self.server.proxy = Some(WORDPRESS_PROXY.to_string());
            }
            if self.watch.reload.is_empty() {
                let theme = self.theme_root();
                self.watch.reload.push(format!("{}/**/*.php", theme.display()));
            }
        }
    }

    /// Whether `build` cleans the output root first.
    pub fn clean_enabled(&self) -> bool {
        self.project.clean.unwrap_or(self.project.variant == Variant::Static)
    }

    /// Whether the markup and include tasks run.
    pub fn markup_enabled(&self) -> bool {
        self.markup.enabled.unwrap_or(self.project.variant == Variant::Static)
    }

    /// Whether the json task runs.
    pub fn data_enabled(&self) -> bool {
        self.data.enabled.unwrap_or(self.project.variant == Variant::Static)
    }

    /// Names of all configured environments, sorted.
    pub fn environment_names(&self) -> Vec<String> {
        self.environments.keys().cloned().collect()
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        if self.environments.is_empty() {
            errors.push(ConfigValidationError {
                field: "environments".to_string(),
                message: "must define at least one environment".to_string(),
            });
        }

        for (name, env) in &self.environments {
            if env.root.as_os_str().is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("environments.{}.root", name),
                    message: "must be a non-empty path".to_string(),
                });
            }
        }

        if self.scripts.bundle.is_empty() || !self.scripts.bundle.ends_with(".js") {
            errors.push(ConfigValidationError {
                field: "scripts.bundle".to_string(),
                message: "must be a file name ending in .js".to_string(),
            });
        }

        if !(1..=100).contains(&self.images.jpeg_quality) {
            errors.push(ConfigValidationError {
                field: "images.jpeg_quality".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }

        if self.server.port == 0 {
            errors.push(ConfigValidationError {
                field: "server.port".to_string(),
                message: "must be a positive port number".to_string(),
            });
        }

        if let Some(proxy) = &self.server.proxy {
            if reqwest::Url::parse(proxy).map(|u| !u.has_host()).unwrap_or(true) {
                errors.push(ConfigValidationError {
                    field: "server.proxy".to_string(),
                    message: format!("'{}' is not an absolute http(s) URL", proxy),
                });
            }
        }

        if self.watch.debounce_ms == 0 {
            errors.push(ConfigValidationError {
                field: "watch.debounce_ms".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        for pattern in &self.watch.reload {
            if let Err(e) = glob::Pattern::new(pattern) {
                errors.push(ConfigValidationError {
                    field: "watch.reload".to_string(),
                    message: format!("invalid glob '{}': {}", pattern, e),
                });
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parse() {
        let toml = r#"
[project]
name = "site"
"#;
        let mut config: AssetConfig = toml::from_str(toml).unwrap();
        config.apply_variant_defaults();

        assert_eq!(config.project.variant, Variant::Static);
        assert_eq!(config.project.src, PathBuf::from("src"));
        assert_eq!(config.environments["development"].root, PathBuf::from("dist"));
        assert_eq!(config.environments["production"].root, PathBuf::from("prod"));
        assert_eq!(config.styles.entry, PathBuf::from("assets/scss/style.scss"));
        assert_eq!(config.scripts.bundle, "bundle.js");
        assert_eq!(config.images.jpeg_quality, 85);
        assert_eq!(config.server.port, 3000);
        assert!(config.server.proxy.is_none());
        assert!(config.clean_enabled());
        assert!(config.markup_enabled());
        assert!(config.data_enabled());
        assert!(config.is_valid());
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[project]
name = "full"
variant = "static"
src = "source"
clean = false

[environments.development]
root = "out/dev"

[environments.development.path]
absolute = "http://localhost:4000"
relative = "/dev/"

[environments.staging]
root = "out/stage"

[styles]
entry = "scss/main.scss"
charset = false

[scripts]
entry = "js/main.js"
bundle = "app.js"

[markup]
dir = "pages"
data = "pages/site.json"

[images]
jpeg_quality = 70

[data]
enabled = false

[server]
port = 4000
cors = false

[watch]
debounce_ms = 250
clear_screen = true
reload = ["templates/**/*.php"]
"#;
        let mut config: AssetConfig = toml::from_str(toml).unwrap();
        config.apply_variant_defaults();

        assert_eq!(config.project.src, PathBuf::from("source"));
        assert!(!config.clean_enabled());
        assert_eq!(config.environments.len(), 2);
        assert_eq!(config.environments["development"].path.relative, "/dev/");
        assert_eq!(config.environments["staging"].path, PublicPath::default());
        assert!(!config.styles.charset);
        assert_eq!(config.scripts.bundle, "app.js");
        assert_eq!(config.markup.dir, PathBuf::from("pages"));
        assert_eq!(config.images.jpeg_quality, 70);
        assert!(!config.data_enabled());
        assert_eq!(config.server.port, 4000);
        assert!(!config.server.cors);
        assert_eq!(config.watch.debounce_ms, 250);
        assert_eq!(config.watch.reload, vec!["templates/**/*.php".to_string()]);
    }

    #[test]
    fn test_wordpress_defaults() {
        let toml = r#"
[project]
name = "ichigo"
variant = "wordpress"
"#;
        let mut config: AssetConfig = toml::from_str(toml).unwrap();
        config.apply_variant_defaults();

        let theme = PathBuf::from("wp-content/themes/ichigo");
        assert_eq!(config.environments["development"].root, theme);
        assert_eq!(config.environments["production"].root, theme);
        assert_eq!(config.server.proxy.as_deref(), Some(WORDPRESS_PROXY));
        assert_eq!(config.watch.reload, vec!["wp-content/themes/ichigo/**/*.php".to_string()]);
        assert!(!config.clean_enabled());
        assert!(!config.markup_enabled());
        assert!(!config.data_enabled());
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!("static".parse::<Variant>().unwrap(), Variant::Static);
        assert_eq!("WordPress".parse::<Variant>().unwrap(), Variant::Wordpress);
        assert_eq!("wp".parse::<Variant>().unwrap(), Variant::Wordpress);
        assert!("gulp".parse::<Variant>().is_err());
    }

    #[test]
    fn test_validation_bad_values() {
        let toml = r#"
[project]
name = ""

[environments.development]
root = ""

[scripts]
bundle = "bundle.ts"

[images]
jpeg_quality = 0

[server]
port = 0
proxy = "not a url"

[watch]
debounce_ms = 0
"#;
        let config: AssetConfig = toml::from_str(toml).unwrap();
        let fields: Vec<String> = config.validate().into_iter().map(|e| e.field).collect();

        for expected in [
            "project.name",
            "environments.development.root",
            "scripts.bundle",
            "images.jpeg_quality",
            "server.port",
            "server.proxy",
            "watch.debounce_ms",
        ] {
            assert!(fields.iter().any(|f| f == expected), "missing error for {}", expected);
        }
    }

    #[test]
    fn test_project_section_is_optional() {
        let config: AssetConfig = toml::from_str("[environments.preview]\nroot = \"preview\"\n").unwrap();
        assert_eq!(config.project.name, "");
        assert_eq!(config.project.variant, Variant::Static);
        assert_eq!(config.project.src, PathBuf::from("src"));
    }

    #[test]
    fn test_validation_empty_environments() {
        let toml = r#"
[project]
name = "site"
"#;
        let config: AssetConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().iter().any(|e| e.field == "environments"));
    }

    #[test]
    fn test_validation_error_display() {
        let error = ConfigValidationError {
            field: "server.port".to_string(),
            message: "must be a positive port number".to_string(),
        };
        assert_eq!(error.to_string(), "assetflow.toml: 'server.port' must be a positive port number");
    }
}
