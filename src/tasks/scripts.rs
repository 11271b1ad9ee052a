//! JavaScript bundling and minification.
//!
//! The bundler follows relative `import` statements and `export ... from`
//! re-exports from the entry script. Every module becomes a function with
//! its own scope that fills an exports object, and imports bind from the
//! exports of the module they name. Modules are emitted dependencies first
//! inside one outer function and evaluated on first use.

use crate::build::{read_source, write_output, Task, TaskContext, TaskError, TaskOutput};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Bundle the entry script and its relative imports into `<out>/<bundle>`.
#[derive(Debug, Default)]
pub struct BundleTask;

/// Minify `<out>/<bundle>` into `<out>/<stem>.min.js`.
#[derive(Debug, Default)]
pub struct MinifyJsTask;

impl Task for BundleTask {
    fn name(&self) -> &str {
        "bundle"
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let entry = ctx.src_path(&ctx.config().scripts.entry);
        if !entry.is_file() {
            return Err(TaskError::MissingSource(entry));
        }

        let bundle = bundle(&entry)?;
        let out = bundle_path(ctx);
        write_output(&out, bundle)?;
        Ok(TaskOutput::files(vec![out]))
    }
}

impl Task for MinifyJsTask {
    fn name(&self) -> &str {
        "minjs"
    }

    fn run(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let input = bundle_path(ctx);
        let source = read_source(&input)?;
        let minified = minifier::js::minify(&source).to_string();

        let out = input.with_extension("min.js");
        write_output(&out, minified)?;
        Ok(TaskOutput::files(vec![out]))
    }
}

fn bundle_path(ctx: &TaskContext) -> PathBuf {
    let scripts = &ctx.config().scripts;
    ctx.out_path(&scripts.out).join(&scripts.bundle)
}

/// Module registry and export helpers placed before the modules.
const RUNTIME: &str = r#"var __modules = [];
var __cache = [];
function __require(id) {
  if (!__cache[id]) {
    __cache[id] = {};
    __modules[id](__cache[id]);
  }
  return __cache[id];
}
function __export(target, getters) {
  Object.keys(getters).forEach(function (key) {
    Object.defineProperty(target, key, { enumerable: true, get: getters[key] });
  });
}
function __reexport(target, source) {
  Object.keys(source).forEach(function (key) {
    if (key !== 'default' && !Object.prototype.hasOwnProperty.call(target, key)) {
      Object.defineProperty(target, key, { enumerable: true, get: function () { return source[key]; } });
    }
  });
}
"#;

/// Local name given to anonymous default exports.
const DEFAULT_BINDING: &str = "__default";

/// Bindings introduced by one `import` declaration.
#[derive(Debug, Default, PartialEq)]
struct ImportClause {
    default: Option<String>,
    namespace: Option<String>,
    /// `(imported, local)` pairs.
    named: Vec<(String, String)>,
}

impl ImportClause {
    fn is_empty(&self) -> bool {
        self.default.is_none() && self.namespace.is_none() && self.named.is_empty()
    }
}

#[derive(Debug, PartialEq)]
enum Link {
    Import(ImportClause),
    /// `export * from`
    ReexportAll,
    /// `export * as name from`
    ReexportNamespace(String),
    /// `export { a as b } from`, as `(imported, exported)` pairs.
    ReexportNamed(Vec<(String, String)>),
}

/// A module statement that names another module.
#[derive(Debug)]
struct Dependency {
    range: Range<usize>,
    specifier: String,
    link: Link,
}

/// One module of the bundle.
#[derive(Debug)]
struct Module {
    path: PathBuf,
    /// Import bindings and re-export setup, run before the body.
    prelude: Vec<String>,
    /// Source with its module syntax removed.
    body: String,
    /// `(exported name, expression)` pairs.
    exports: Vec<(String, String)>,
    /// Has an `export *`, so its names are only known at run time.
    open: bool,
}

impl Module {
    fn provides(&self, name: &str) -> bool {
        self.open || self.exports.iter().any(|(exported, _)| exported == name)
    }
}

/// Bundle `entry` into a single script.
pub fn bundle(entry: &Path) -> Result<String, TaskError> {
    let mut graph = Graph::default();
    let entry_id = graph.visit(entry)?;

    let base = entry.parent().unwrap_or_else(|| Path::new(""));
    let mut out = String::from("(function () {\n'use strict';\n");
    out.push_str(RUNTIME);
    for (id, module) in graph.modules.iter().enumerate() {
        let label = module.path.strip_prefix(base).unwrap_or(&module.path);
        out.push_str(&format!("\n// {}\n__modules[{}] = function (__exports) {{\n", label.display(), id));
        if !module.exports.is_empty() {
            let getters: Vec<String> = module
                .exports
                .iter()
                .map(|(name, expr)| format!("\"{}\": function () {{ return {}; }}", name, expr))
                .collect();
            out.push_str(&format!("__export(__exports, {{ {} }});\n", getters.join(", ")));
        }
        for line in &module.prelude {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(module.body.trim_end());
        out.push_str("\n};\n");
    }
    out.push_str(&format!("\n__require({});\n}})();\n", entry_id));
    debug!(modules = graph.modules.len(), "bundled {}", entry.display());
    Ok(out)
}

/// Modules in dependency order, keyed by normalized path.
#[derive(Debug, Default)]
struct Graph {
    modules: Vec<Module>,
    ids: HashMap<PathBuf, usize>,
    stack: Vec<PathBuf>,
}

impl Graph {
    fn visit(&mut self, path: &Path) -> Result<usize, TaskError> {
        let path = normalize(path);
        if let Some(&id) = self.ids.get(&path) {
            return Ok(id);
        }
        if self.stack.contains(&path) {
            let chain: Vec<String> = self
                .stack
                .iter()
                .skip_while(|p| p.as_path() != path.as_path())
                .chain(std::iter::once(&path))
                .map(|p| p.display().to_string())
                .collect();
            return Err(TaskError::transform(
                &path,
                format!("circular import: {}", chain.join(" -> ")),
            ));
        }

        let source = read_source(&path)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let dependencies = dependencies(&source).map_err(|m| TaskError::transform(&path, m))?;

        self.stack.push(path.clone());
        let mut prelude = Vec::new();
        let mut exports = Vec::new();
        let mut open = false;
        for dependency in &dependencies {
            let specifier = &dependency.specifier;
            let target = resolve(&dir, specifier).ok_or_else(|| {
                TaskError::transform(&path, format!("cannot resolve package import '{}'", specifier))
            })?;
            let id = self.visit(&target)?;
            let module = &self.modules[id];
            let check = |name: &str| {
                if module.provides(name) {
                    Ok(())
                } else {
                    Err(TaskError::transform(
                        &path,
                        format!("'{}' does not export '{}'", specifier, name),
                    ))
                }
            };

            match &dependency.link {
                Link::Import(clause) => {
                    if clause.is_empty() {
                        prelude.push(format!("__require({});", id));
                    }
                    if let Some(local) = &clause.default {
                        check("default")?;
                        prelude.push(format!("const {} = __require({}).default;", local, id));
                    }
                    if let Some(local) = &clause.namespace {
                        prelude.push(format!("const {} = __require({});", local, id));
                    }
                    if !clause.named.is_empty() {
                        let mut bindings = Vec::with_capacity(clause.named.len());
                        for (imported, local) in &clause.named {
                            check(imported.as_str())?;
                            if imported == local {
                                bindings.push(local.clone());
                            } else {
                                bindings.push(format!("{}: {}", imported, local));
                            }
                        }
                        prelude.push(format!("const {{ {} }} = __require({});", bindings.join(", "), id));
                    }
                }
                Link::ReexportAll => {
                    open = true;
                    prelude.push(format!("__reexport(__exports, __require({}));", id));
                }
                Link::ReexportNamespace(name) => {
                    prelude.push(format!("__require({});", id));
                    exports.push((name.clone(), format!("__require({})", id)));
                }
                Link::ReexportNamed(names) => {
                    prelude.push(format!("__require({});", id));
                    for (imported, exported) in names {
                        check(imported.as_str())?;
                        exports.push((exported.clone(), format!("__require({}).{}", id, imported)));
                    }
                }
            }
        }
        self.stack.pop();

        let stripped = remove_ranges(&source, dependencies.iter().map(|d| d.range.clone()));
        let body = local_exports(&stripped, &mut exports).map_err(|m| TaskError::transform(&path, m))?;
        let mut names = HashSet::new();
        if let Some((name, _)) = exports.iter().find(|(name, _)| !names.insert(name.as_str())) {
            return Err(TaskError::transform(&path, format!("duplicate export '{}'", name)));
        }

        let id = self.modules.len();
        self.ids.insert(path.clone(), id);
        self.modules.push(Module { path, prelude, body, exports, open });
        Ok(id)
    }
}

/// Import and re-export statements of a module, in source order.
fn dependencies(source: &str) -> Result<Vec<Dependency>, String> {
    let mut found = Vec::new();
    for caps in import_rule().captures_iter(source) {
        let range = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let clause = parse_import_clause(caps.get(1).map(|m| m.as_str()).unwrap_or(""))?;
        found.push(Dependency { range, specifier: caps[2].to_string(), link: Link::Import(clause) });
    }
    for caps in reexport_rule().captures_iter(source) {
        let range = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let what = caps[1].trim();
        let link = if what == "*" {
            Link::ReexportAll
        } else if let Some(alias) = what.strip_prefix('*') {
            match alias.split_whitespace().collect::<Vec<_>>().as_slice() {
                ["as", name] if is_identifier(name) => Link::ReexportNamespace(name.to_string()),
                _ => return Err(format!("unsupported re-export '{}'", what)),
            }
        } else {
            Link::ReexportNamed(parse_specifiers(what)?)
        };
        found.push(Dependency { range, specifier: caps[2].to_string(), link });
    }
    found.sort_by_key(|d| d.range.start);
    Ok(found)
}

fn parse_import_clause(clause: &str) -> Result<ImportClause, String> {
    let unsupported = || format!("unsupported import clause '{}'", clause.trim());
    let mut parsed = ImportClause::default();
    let mut rest = clause.trim();

    if !rest.is_empty() && !rest.starts_with('{') && !rest.starts_with('*') {
        let (name, tail) = match rest.split_once(',') {
            Some((name, tail)) => (name.trim(), tail.trim()),
            None => (rest, ""),
        };
        if !is_identifier(name) {
            return Err(unsupported());
        }
        parsed.default = Some(name.to_string());
        rest = tail;
    }

    if let Some(alias) = rest.strip_prefix('*') {
        match alias.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["as", name] if is_identifier(name) => parsed.namespace = Some(name.to_string()),
            _ => return Err(unsupported()),
        }
    } else if rest.starts_with('{') {
        parsed.named = parse_specifiers(rest)?;
    } else if !rest.is_empty() {
        return Err(unsupported());
    }
    Ok(parsed)
}

/// Parse `{ a, b as c }` into `(a, a)` and `(b, c)`.
fn parse_specifiers(list: &str) -> Result<Vec<(String, String)>, String> {
    let inner = list.trim().trim_start_matches('{').trim_end_matches('}');
    inner
        .split(',')
        .map(str::trim)
        .filter(|spec| !spec.is_empty())
        .map(|spec| {
            let words: Vec<&str> = spec.split_whitespace().collect();
            match words.as_slice() {
                [name] if is_identifier(name) => Ok((name.to_string(), name.to_string())),
                [name, "as", alias] if is_identifier(name) && is_identifier(alias) => {
                    Ok((name.to_string(), alias.to_string()))
                }
                _ => Err(format!("unsupported specifier '{}'", spec)),
            }
        })
        .collect()
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn identifier_prefix(text: &str) -> Option<&str> {
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(text.len());
    let name = &text[..end];
    is_identifier(name).then_some(name)
}

fn remove_ranges(source: &str, ranges: impl Iterator<Item = Range<usize>>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for range in ranges {
        out.push_str(&source[last..range.start]);
        last = range.end;
    }
    out.push_str(&source[last..]);
    out
}

/// Strip local `export` syntax from `source`, recording what it exports.
fn local_exports(source: &str, exports: &mut Vec<(String, String)>) -> Result<String, String> {
    let mut listed = String::with_capacity(source.len());
    let mut last = 0;
    for caps in export_list_rule().captures_iter(source) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        listed.push_str(&source[last..whole.start]);
        last = whole.end;
        for (local, exported) in parse_specifiers(&caps[1])? {
            exports.push((exported, local));
        }
    }
    listed.push_str(&source[last..]);

    let mut declared = String::with_capacity(listed.len());
    let mut last = 0;
    for caps in export_decl_rule().captures_iter(&listed) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        declared.push_str(&listed[last..whole.start]);
        last = whole.end;

        let indent = &caps[1];
        let is_default = caps.get(2).is_some();
        let keyword = &caps[3];
        let name = caps.get(5).map(|m| m.as_str());
        declared.push_str(indent);

        match keyword {
            "const" | "let" | "var" => {
                if is_default {
                    return Err(format!("'export default {}' is not valid", keyword));
                }
                let after = caps.get(3).map(|m| m.end()).unwrap_or(whole.end);
                let names = declared_names(&listed[after..]).ok_or_else(|| {
                    format!("destructuring in 'export {}' is not supported", keyword)
                })?;
                exports.extend(names.into_iter().map(|name| (name.clone(), name)));
                declared.push_str(&listed[caps.get(3).map(|m| m.start()).unwrap_or(after)..whole.end]);
            }
            _ => match (name, is_default) {
                (Some("extends"), true) => {
                    declared.push_str(&format!("{} {} extends", keyword, DEFAULT_BINDING));
                    exports.push(("default".to_string(), DEFAULT_BINDING.to_string()));
                }
                (Some(name), _) => {
                    declared.push_str(&format!("{}{}{}", keyword, &caps[4], name));
                    let exported = if is_default { "default" } else { name };
                    exports.push((exported.to_string(), name.to_string()));
                }
                (None, true) => {
                    declared.push_str(&format!("{} {}", keyword, DEFAULT_BINDING));
                    exports.push(("default".to_string(), DEFAULT_BINDING.to_string()));
                }
                (None, false) => return Err(format!("exported {} needs a name", keyword)),
            },
        }
    }
    declared.push_str(&listed[last..]);

    let mut out = String::with_capacity(declared.len());
    let mut last = 0;
    for caps in export_default_rule().captures_iter(&declared) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        out.push_str(&declared[last..whole.start]);
        last = whole.end;
        out.push_str(&format!("{}const {} = ", &caps[1], DEFAULT_BINDING));
        exports.push(("default".to_string(), DEFAULT_BINDING.to_string()));
    }
    out.push_str(&declared[last..]);

    if let Some(line) = out.lines().find(|line| leftover_export_rule().is_match(line)) {
        return Err(format!("unsupported export statement '{}'", line.trim()));
    }
    Ok(out)
}

/// Names declared by a `const`, `let` or `var` statement starting at `rest`.
/// Returns `None` for destructuring patterns.
fn declared_names(rest: &str) -> Option<Vec<String>> {
    let mut names = Vec::new();
    let mut expecting = true;
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    let mut previous = ' ';
    let mut resume = 0;

    for (i, c) in rest.char_indices() {
        if i < resume {
            continue;
        }
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if expecting {
            if c.is_whitespace() {
                continue;
            }
            let name = identifier_prefix(&rest[i..])?;
            names.push(name.to_string());
            resume = i + name.len();
            expecting = false;
            previous = 'x';
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => expecting = true,
            ';' if depth == 0 => break,
            '\n' if depth == 0 && !matches!(previous, ',' | '=') => break,
            _ => {}
        }
        if !c.is_whitespace() {
            previous = c;
        }
    }
    Some(names)
}

/// Resolve a relative specifier to a file. Bare package names are not
/// resolvable.
fn resolve(dir: &Path, specifier: &str) -> Option<PathBuf> {
    if !(specifier.starts_with("./") || specifier.starts_with("../")) {
        return None;
    }
    let candidate = dir.join(specifier);
    if candidate.is_file() {
        return Some(candidate);
    }
    let with_ext = PathBuf::from(format!("{}.js", candidate.display()));
    if with_ext.is_file() {
        return Some(with_ext);
    }
    Some(candidate.join("index.js"))
}

/// Collapse `.` and `..` components so one file has one key.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn import_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(
            r#"(?m)^[ \t]*import\s+(?:([\w*{}\s,$]+?)\s+from\s+)?["']([^"'\n]+)["'][ \t]*;?[ \t]*$\n?"#,
        )
        .expect("import regex is valid")
    })
}

fn reexport_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(
            r#"(?m)^[ \t]*export\s+(\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s+["']([^"'\n]+)["'][ \t]*;?[ \t]*$\n?"#,
        )
        .expect("re-export regex is valid")
    })
}

fn export_decl_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(
            r"(?m)^([ \t]*)export\s+(default\s+)?((?:async\s+)?function\b(?:\s*\*)?|class\b|const\b|let\b|var\b)(\s*)([A-Za-z_$][\w$]*)?",
        )
        .expect("export regex is valid")
    })
}

fn export_list_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*export\s*(\{[^}]*\})[ \t]*;?[ \t]*$\n?")
            .expect("export list regex is valid")
    })
}

fn export_default_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(r"(?m)^([ \t]*)export\s+default\s+").expect("export default regex is valid")
    })
}

fn leftover_export_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| Regex::new(r"^[ \t]*export\b").expect("export check regex is valid"))
}
