//! Source file discovery.
//!
//! Matches source files with glob patterns and maps them to destination
//! paths that keep their position relative to the glob base.

use crate::build::TaskError;
use glob::{glob, Pattern};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Discover files under `base_dir` matching a glob pattern.
///
/// The base directory is escaped so paths containing glob metacharacters
/// are matched literally. Returns a sorted list; a missing base directory
/// yields an empty list.
pub fn discover_files(base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, TaskError> {
    if !base_dir.is_dir() {
        return Ok(vec![]);
    }

    let escaped = Pattern::escape(&base_dir.to_string_lossy());
    let full_pattern = format!("{}/{}", escaped.trim_end_matches('/'), pattern);

    let paths =
        glob(&full_pattern).map_err(|e| TaskError::Pattern(pattern.to_string(), e))?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    files.push(path);
                }
            }
            Err(e) => warn!("error reading path: {}", e),
        }
    }

    files.sort();
    Ok(files)
}

/// Discover files under `base_dir` whose extension is in `extensions`
/// (compared case-insensitively).
pub fn discover_with_extensions(
    base_dir: &Path,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, TaskError> {
    let files = discover_files(base_dir, "**/*")?;
    Ok(files.into_iter().filter(|p| has_extension(p, extensions)).collect())
}

/// Check a path's extension against a list, ignoring case.
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Map a source file to its destination.
///
/// The file's path relative to `base` is appended to `out_dir`. When
/// `extension` is given it replaces the file's extension.
pub fn output_path(base: &Path, file: &Path, out_dir: &Path, extension: Option<&str>) -> PathBuf {
    let relative = file.strip_prefix(base).unwrap_or(file);
    let relative = match relative.file_name() {
        Some(_) => relative.to_path_buf(),
        None => PathBuf::from(file.file_name().unwrap_or_default()),
    };
    let mut out = out_dir.join(relative);
    if let Some(ext) = extension {
        out.set_extension(ext);
    }
    out
}

/// Template-style name of a file relative to `base`, with `/` separators.
pub fn relative_name(base: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(base).unwrap_or(file);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// The literal directory prefix of a glob pattern.
///
/// `wp-content/themes/site/**/*.php` has the base `wp-content/themes/site`.
pub fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    for part in Path::new(pattern).components() {
        let text = part.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[', '{']) {
            break;
        }
        base.push(part);
    }
    if base == Path::new(pattern) {
        base.pop();
    }
    base
}
