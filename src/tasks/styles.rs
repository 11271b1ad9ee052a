//! Sass compilation and CSS minification.
//!
//! `scss` compiles the entry stylesheet with grass (expanded style) and runs
//! the result through lightningcss for vendor prefixing. `css` minifies the
//! compiled stylesheet into `<stem>.min.css`.

use crate::build::{
    discover_files, read_source, write_output, ErrorPolicy, Task, TaskContext, TaskError,
    TaskOutput,
};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

const CHARSET: &str = "@charset \"utf-8\";";

/// Compile the Sass entry to `<out>/<stem>.css`.
#[derive(Debug, Default)]
pub struct ScssTask;

/// Minify `<out>/<stem>.css` to `<out>/<stem>.min.css`.
#[derive(Debug, Default)]
pub struct CssTask;

impl Task for ScssTask {
    fn name(&self) -> &str {
        "scss"
    }

    fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::Notify
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let styles = &ctx.config().styles;
        let entry = ctx.src_path(&styles.entry);
        if !entry.is_file() {
            return Err(TaskError::MissingSource(entry));
        }

        let fs = GlobFs;
        let mut options = grass::Options::default().style(grass::OutputStyle::Expanded).fs(&fs);
        if let Some(parent) = entry.parent() {
            options = options.load_path(parent);
        }

        let compiled = grass::from_path(&entry, &options)
            .map_err(|e| TaskError::transform(&entry, e.to_string()))?;
        let css = process_css(&compiled, &entry, false)?;

        let out = compiled_path(ctx);
        write_output(&out, css)?;
        debug!(file = %out.display(), "wrote stylesheet");
        Ok(TaskOutput::files(vec![out]))
    }
}

impl Task for CssTask {
    fn name(&self) -> &str {
        "css"
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let input = compiled_path(ctx);
        let source = read_source(&input)?;
        let minified = process_css(strip_charset(&source), &input, true)?;

        let contents = if ctx.config().styles.charset {
            format!("{}{}", CHARSET, minified)
        } else {
            minified
        };

        let out = input.with_extension("min.css");
        write_output(&out, contents)?;
        Ok(TaskOutput::files(vec![out]))
    }
}

/// Destination of the compiled, unminified stylesheet.
fn compiled_path(ctx: &TaskContext) -> PathBuf {
    let styles = &ctx.config().styles;
    let stem = styles
        .entry
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "style".to_string());
    ctx.out_path(&styles.out).join(format!("{}.css", stem))
}

/// Browsers the prefixer targets.
fn browser_targets() -> Targets {
    let version = |major: u32| Some(major << 16);
    Targets::from(Browsers {
        android: version(100),
        chrome: version(100),
        edge: version(100),
        firefox: version(100),
        ios_saf: version(14),
        safari: version(14),
        samsung: version(16),
        opera: version(86),
        ..Browsers::default()
    })
}

/// Parse, prefix and print a stylesheet.
fn process_css(source: &str, file: &Path, minify: bool) -> Result<String, TaskError> {
    let targets = browser_targets();
    let options = ParserOptions { filename: file.display().to_string(), ..ParserOptions::default() };

    let mut sheet = StyleSheet::parse(source, options)
        .map_err(|e| TaskError::transform(file, e.to_string()))?;
    sheet
        .minify(MinifyOptions { targets, ..MinifyOptions::default() })
        .map_err(|e| TaskError::transform(file, e.to_string()))?;
    let printed = sheet
        .to_css(PrinterOptions { minify, targets, ..PrinterOptions::default() })
        .map_err(|e| TaskError::transform(file, e.to_string()))?;

    Ok(printed.code)
}

/// Drop a leading `@charset` rule so it is not duplicated.
fn strip_charset(css: &str) -> &str {
    let trimmed = css.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("@charset") {
        match trimmed.find(';') {
            Some(end) => &trimmed[end + 1..],
            None => trimmed,
        }
    } else {
        css
    }
}

/// A grass filesystem that expands glob `@use`, `@forward` and `@import`
/// rules in every Sass file it reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobFs;

impl grass::Fs for GlobFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let bytes = std::fs::read(path)?;
        let is_sass = path
            .extension()
            .map(|ext| ext == "scss" || ext == "sass")
            .unwrap_or(false);
        if !is_sass {
            return Ok(bytes);
        }

        let source = String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        expand_glob_rules(&source, dir)
            .map(String::into_bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

fn glob_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(r#"(?m)^([ \t]*)@(use|forward|import)\s+["']([^"'\n]*\*[^"'\n]*)["']([^;\n]*);"#)
            .expect("glob rule regex is valid")
    })
}

/// Expand glob load rules into one rule per matching file, sorted by path.
///
/// `dir/*` and `dir/**` match `.scss` files; the rule's trailing modifiers
/// (`as *`, `with (...)`) are kept on every expanded rule.
pub fn expand_glob_rules(source: &str, dir: &Path) -> Result<String, TaskError> {
    let rule = glob_rule();
    if !rule.is_match(source) {
        return Ok(source.to_string());
    }

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for caps in rule.captures_iter(source) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        out.push_str(&source[last..whole.start]);
        last = whole.end;

        let indent = &caps[1];
        let keyword = &caps[2];
        let pattern = with_scss_extension(&caps[3]);
        let modifiers = &caps[4];

        let expanded: Vec<String> = discover_files(dir, &pattern)?
            .iter()
            .map(|file| {
                format!("{}@{} \"{}\"{};", indent, keyword, load_url(dir, file), modifiers)
            })
            .collect();
        out.push_str(&expanded.join("\n"));
    }
    out.push_str(&source[last..]);
    Ok(out)
}

fn with_scss_extension(pattern: &str) -> String {
    let last = pattern.rsplit('/').next().unwrap_or(pattern);
    if last.contains('.') {
        pattern.to_string()
    } else if last == "**" {
        format!("{}/*.scss", pattern)
    } else {
        format!("{}.scss", pattern)
    }
}

/// Load URL for a file: relative, `/`-separated, without extension or
/// partial underscore.
fn load_url(dir: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(dir).unwrap_or(file).with_extension("");
    let mut parts: Vec<String> =
        relative.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    if let Some(name) = parts.last_mut() {
        if let Some(stripped) = name.strip_prefix('_') {
            *name = stripped.to_string();
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_config, Variant};
    use crate::env::select_environment;
    use std::fs;
    use tempfile::TempDir;

    fn context(root: &Path) -> TaskContext {
        let config = default_config(Variant::Static);
        let env = select_environment(&config, Some("development")).unwrap();
        TaskContext::new(config, root.to_path_buf(), env)
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_expand_glob_rules() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "foundation/_reset.scss", "");
        write(temp.path(), "foundation/_base.scss", "");
        write(temp.path(), "foundation/notes.txt", "");

        let source = "@use \"foundation/*\" as *;\n.a { color: red; }\n";
        let expanded = expand_glob_rules(source, temp.path()).unwrap();

        assert_eq!(
            expanded,
            "@use \"foundation/base\" as *;\n@use \"foundation/reset\" as *;\n.a { color: red; }\n"
        );
    }

    #[test]
    fn test_expand_recursive_forward() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "layout/_header.scss", "");
        write(temp.path(), "layout/parts/_nav.scss", "");

        let expanded = expand_glob_rules("@forward 'layout/**';", temp.path()).unwrap();
        assert_eq!(expanded, "@forward \"layout/header\";\n@forward \"layout/parts/nav\";");
    }

    #[test]
    fn test_expand_leaves_plain_rules() {
        let temp = TempDir::new().unwrap();
        let source = "@use \"sass:math\";\n@import 'base';\n";
        assert_eq!(expand_glob_rules(source, temp.path()).unwrap(), source);
    }

    #[test]
    fn test_strip_charset() {
        assert_eq!(strip_charset("@charset \"utf-8\";\n.a{}"), "\n.a{}");
        assert_eq!(strip_charset(".a{}"), ".a{}");
    }

    #[test]
    fn test_scss_then_css() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/assets/scss/global/_vars.scss", "$main: #ff0000;\n");
        write(
            temp.path(),
            "src/assets/scss/style.scss",
            "@use \"global/*\" as *;\n.card {\n  .title { color: $main; }\n}\n",
        );
        let ctx = context(temp.path());

        let output = ScssTask.run(&ctx).unwrap();
        let css_path = temp.path().join("dist/assets/css/style.css");
        assert_eq!(output.outputs, vec![css_path.clone()]);
        let css = fs::read_to_string(&css_path).unwrap();
        assert!(css.contains(".card .title"));
        assert!(css.contains("color: red"));

        let output = CssTask.run(&ctx).unwrap();
        let min_path = temp.path().join("dist/assets/css/style.min.css");
        assert_eq!(output.outputs, vec![min_path.clone()]);
        let min = fs::read_to_string(&min_path).unwrap();
        assert!(min.starts_with("@charset \"utf-8\";"));
        assert!(min.contains(".card .title{color:red}"));
        assert!(!min.contains('\n'));
    }

    #[test]
    fn test_scss_expands_globs_inside_partials() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/assets/scss/style.scss", "@use \"layout\";\n");
        write(temp.path(), "src/assets/scss/_layout.scss", "@forward \"layout/*\";\n");
        write(temp.path(), "src/assets/scss/layout/_header.scss", ".header { color: red; }\n");
        write(temp.path(), "src/assets/scss/layout/_footer.scss", ".footer { margin: 0; }\n");
        let ctx = context(temp.path());

        ScssTask.run(&ctx).unwrap();
        let css = fs::read_to_string(temp.path().join("dist/assets/css/style.css")).unwrap();
        assert!(css.contains(".header"), "css: {}", css);
        assert!(css.contains(".footer"), "css: {}", css);
        assert!(!css.contains('*'));
    }

    #[test]
    fn test_scss_error_names_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/assets/scss/style.scss", ".a { color: $missing; }\n");
        let ctx = context(temp.path());

        let err = ScssTask.run(&ctx).unwrap_err();
        assert!(matches!(err, TaskError::Transform { .. }));
        assert_eq!(ScssTask.error_policy(), ErrorPolicy::Notify);
    }

    #[test]
    fn test_css_without_compiled_input() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        assert!(matches!(CssTask.run(&ctx).unwrap_err(), TaskError::MissingSource(_)));
    }
}
