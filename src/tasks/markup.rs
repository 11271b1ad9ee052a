//! Template pages and production include fragments.
//!
//! Templates live under the markup directory and use Jinja syntax with
//! HTML auto-escaping. Files whose name starts with `_` are partials: they
//! can be included but are never rendered as pages.

use crate::build::{
    discover_files, output_path, relative_name, write_output, ErrorPolicy, Task, TaskContext,
    TaskError, TaskOutput,
};
use minijinja::{path_loader, AutoEscape, Environment, Value};
use serde_json::{Map, Value as Json};
use std::fmt::Write;
use std::path::Path;
use tracing::debug;

/// Pages matched by the markup task: every template that is not a partial.
const PAGE_PATTERN: &str = "**/[!_]*.ejs";

/// Render every page to `<root>/<rel>.html`.
#[derive(Debug, Default)]
pub struct MarkupTask;

/// Render include fragments to `<root>/<rel>.inc` (production only).
#[derive(Debug, Default)]
pub struct IncludesTask;

impl Task for MarkupTask {
    fn name(&self) -> &str {
        "markup"
    }

    fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::Swallow
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let markup = &ctx.config().markup;
        let dir = ctx.src_path(&markup.dir);
        let pages = discover_files(&dir, PAGE_PATTERN)?;
        if pages.is_empty() {
            return Ok(TaskOutput::skipped(format!("no templates in {}", dir.display())));
        }

        let mut context = load_data(&ctx.src_path(&markup.data))?;
        context.insert("path".to_string(), public_path(ctx));
        let context = Value::from_serialize(&Json::Object(context));

        let env = template_env(&dir);
        let out_root = ctx.out_root();
        let mut outputs = Vec::with_capacity(pages.len());
        for page in &pages {
            let html = render(&env, &dir, page, &context)?;
            let out = output_path(&dir, page, &out_root, Some("html"));
            write_output(&out, tidy_html(&html))?;
            debug!(page = %out.display(), "rendered");
            outputs.push(out);
        }
        Ok(TaskOutput::files(outputs))
    }
}

impl Task for IncludesTask {
    fn name(&self) -> &str {
        "includes"
    }

    fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::Swallow
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        if !ctx.is_production() {
            return Ok(TaskOutput::skipped("includes are only rendered for production"));
        }

        let markup = &ctx.config().markup;
        let markup_dir = ctx.src_path(&markup.dir);
        let dir = ctx.src_path(&markup.includes);
        let exclude = markup.includes_exclude.as_str();

        let files: Vec<_> = discover_files(&dir, "**/*.ejs")?
            .into_iter()
            .filter(|file| {
                let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                exclude.is_empty() || !name.starts_with(exclude)
            })
            .collect();

        // Fragments under the markup directory can include its partials.
        let template_root = if dir.starts_with(&markup_dir) { &markup_dir } else { &dir };
        let env = template_env(template_root);
        let mut context = Map::new();
        context.insert("path".to_string(), public_path(ctx));
        let context = Value::from_serialize(&Json::Object(context));

        let out_root = ctx.out_root();
        let mut outputs = Vec::with_capacity(files.len());
        for file in &files {
            let text = render(&env, template_root, file, &context)?;
            let out = output_path(&dir, file, &out_root, Some("inc"));
            write_output(&out, text)?;
            outputs.push(out);
        }
        Ok(TaskOutput::files(outputs))
    }
}

fn template_env(dir: &Path) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_loader(path_loader(dir));
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env.set_formatter(|out, state, value| {
        let escape = matches!(state.auto_escape(), AutoEscape::Html)
            && !value.is_safe()
            && !value.is_undefined()
            && !value.is_none();
        if !escape {
            return minijinja::escape_formatter(out, state, value);
        }
        let text = match value.as_str() {
            Some(text) => escape_html(text),
            None => escape_html(&value.to_string()),
        };
        out.write_str(&text).map_err(minijinja::Error::from)
    });
    env
}

/// Escape the five HTML-significant characters, leaving `/` readable in URLs.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn render(
    env: &Environment<'_>,
    dir: &Path,
    file: &Path,
    context: &Value,
) -> Result<String, TaskError> {
    let name = relative_name(dir, file);
    env.get_template(&name)
        .and_then(|template| template.render(context))
        .map_err(|e| TaskError::transform(file, e.to_string()))
}

/// Top-level keys of the data file; a missing file yields no variables.
fn load_data(path: &Path) -> Result<Map<String, Json>, TaskError> {
    if !path.is_file() {
        return Ok(Map::new());
    }
    let source = std::fs::read_to_string(path).map_err(|e| TaskError::io(path, e))?;
    match serde_json::from_str::<Json>(&source) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(_) => Err(TaskError::transform(path, "template data must be a JSON object")),
        Err(e) => Err(TaskError::transform(path, e.to_string())),
    }
}

fn public_path(ctx: &TaskContext) -> Json {
    let path = ctx.environment().public_path();
    serde_json::json!({ "absolute": path.absolute, "relative": path.relative })
}

/// Strip trailing whitespace and drop blank lines outside `<pre>` blocks.
pub fn tidy_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_pre = false;
    for line in html.lines() {
        let lower = line.to_ascii_lowercase();
        let raw = in_pre || lower.contains("<pre");
        if !raw && line.trim().is_empty() {
            continue;
        }
        out.push_str(if raw { line } else { line.trim_end() });
        out.push('\n');

        if let Some(open) = lower.rfind("<pre") {
            in_pre = !lower[open..].contains("</pre>");
        } else if lower.contains("</pre>") {
            in_pre = false;
        }
    }
    out
}
