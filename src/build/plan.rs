//! Build plans: which tasks run for `build`, `dev` and each watched change.

use crate::build::{discovery, has_extension, Step, TaskContext, TaskError};
use crate::tasks::{
    BundleTask, CleanTask, CssTask, ImagesTask, IncludesTask, JsonTask, MarkupTask, MinifyJsTask,
    ScssTask, IMAGE_EXTENSIONS,
};
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};

/// A watched source directory and the step that rebuilds its outputs.
#[derive(Debug, Clone)]
pub struct WatchGroup {
    /// Group name for logs
    pub name: String,
    /// Directory watched recursively
    pub dir: PathBuf,
    /// File extensions that trigger the group (empty matches any file)
    pub extensions: Vec<String>,
    /// Step run when a matching file changes
    pub step: Step,
}

impl WatchGroup {
    fn new(name: &str, dir: PathBuf, extensions: &[&str], step: Step) -> Self {
        Self {
            name: name.to_string(),
            dir,
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            step,
        }
    }

    /// Whether a changed path belongs to this group.
    pub fn matches(&self, path: &Path) -> bool {
        if !path.starts_with(&self.dir) {
            return false;
        }
        let extensions: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
        extensions.is_empty() || has_extension(path, &extensions)
    }
}

/// A glob whose matches only trigger a browser reload.
#[derive(Debug, Clone)]
pub struct ReloadWatch {
    /// The glob as configured
    pub glob: String,
    /// Literal directory prefix of the glob, watched recursively
    pub dir: PathBuf,
    pattern: Pattern,
}

impl ReloadWatch {
    /// Whether a changed path matches the glob.
    pub fn matches(&self, path: &Path) -> bool {
        let options = MatchOptions { require_literal_separator: true, ..MatchOptions::default() };
        self.pattern.matches_path_with(path, options)
    }
}

/// Compositions derived from the configuration.
pub struct BuildPlan<'a> {
    ctx: &'a TaskContext,
}

impl<'a> BuildPlan<'a> {
    /// Create a plan for a task context.
    pub fn new(ctx: &'a TaskContext) -> Self {
        Self { ctx }
    }

    fn styles(&self) -> Step {
        Step::series(vec![Step::task(ScssTask), Step::task(CssTask)])
    }

    fn markup(&self) -> Step {
        Step::series(vec![Step::task(MarkupTask), Step::task(IncludesTask)])
    }

    fn scripts_series(&self) -> Step {
        Step::series(vec![Step::task(BundleTask), Step::task(MinifyJsTask)])
    }

    /// Build every asset: styles, markup, scripts, data and images in
    /// parallel, each chain in series.
    pub fn scripts(&self) -> Step {
        let config = self.ctx.config();
        let mut steps = vec![self.styles()];
        if config.markup_enabled() {
            steps.push(self.markup());
        }
        steps.push(self.scripts_series());
        if config.data_enabled() {
            steps.push(Step::task(JsonTask));
        }
        steps.push(Step::task(ImagesTask));
        Step::parallel(steps)
    }

    /// Clean the output root, then build everything.
    pub fn build(&self) -> Step {
        if self.ctx.config().clean_enabled() {
            Step::series(vec![Step::task(CleanTask), self.scripts()])
        } else {
            self.scripts()
        }
    }

    /// Source directories to watch and what each one rebuilds.
    pub fn watch_groups(&self) -> Vec<WatchGroup> {
        let ctx = self.ctx;
        let config = ctx.config();

        let mut groups = vec![WatchGroup::new(
            "styles",
            ctx.src_path(&config.styles.watch),
            &["scss", "sass"],
            self.styles(),
        )];
        if config.markup_enabled() {
            groups.push(WatchGroup::new(
                "markup",
                ctx.src_path(&config.markup.dir),
                &["ejs", "json"],
                self.markup(),
            ));
        }
        groups.push(WatchGroup::new(
            "scripts",
            ctx.src_path(&config.scripts.watch),
            &["js", "mjs"],
            self.scripts_series(),
        ));
        if config.data_enabled() {
            groups.push(WatchGroup::new(
                "data",
                ctx.src_path(&config.data.dir),
                &["json"],
                Step::task(JsonTask),
            ));
        }
        groups.push(WatchGroup::new(
            "images",
            ctx.src_path(&config.images.dir),
            IMAGE_EXTENSIONS,
            Step::task(ImagesTask),
        ));
        groups
    }

    /// Globs that only reload the browser, resolved against the project root.
    pub fn reload_watches(&self) -> Result<Vec<ReloadWatch>, TaskError> {
        let root = self.ctx.project_root();
        self.ctx
            .config()
            .watch
            .reload
            .iter()
            .map(|glob| {
                let full = format!("{}/{}", Pattern::escape(&root.to_string_lossy()), glob);
                let pattern =
                    Pattern::new(&full).map_err(|e| TaskError::Pattern(glob.clone(), e))?;
                Ok(ReloadWatch {
                    glob: glob.clone(),
                    dir: root.join(discovery::glob_base(glob)),
                    pattern,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_config, Variant};
    use crate::env::select_environment;

    fn context(variant: Variant, env_name: &str) -> TaskContext {
        let config = default_config(variant);
        let env = select_environment(&config, Some(env_name)).unwrap();
        TaskContext::new(config, PathBuf::from("/project"), env)
    }

    #[test]
    fn test_static_build_plan() {
        let ctx = context(Variant::Static, "development");
        let plan = BuildPlan::new(&ctx);

        assert_eq!(
            format!("{:?}", plan.build()),
            "series([clean, parallel([series([scss, css]), series([markup, includes]), \
             series([bundle, minjs]), json, images])])"
        );
    }

    #[test]
    fn test_wordpress_plan_omits_disabled_sections() {
        let ctx = context(Variant::Wordpress, "development");
        let plan = BuildPlan::new(&ctx);

        assert_eq!(
            plan.build().task_names(),
            vec!["scss", "css", "bundle", "minjs", "images"]
        );
        let names: Vec<String> = plan.watch_groups().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["styles", "scripts", "images"]);
    }

    #[test]
    fn test_watch_groups_match_by_dir_and_extension() {
        let ctx = context(Variant::Static, "development");
        let groups = BuildPlan::new(&ctx).watch_groups();
        let matching = |path: &str| -> Vec<String> {
            groups.iter().filter(|g| g.matches(Path::new(path))).map(|g| g.name.clone()).collect()
        };

        assert_eq!(matching("/project/src/assets/scss/layout/_header.scss"), vec!["styles"]);
        assert_eq!(matching("/project/src/ejs/about/index.ejs"), vec!["markup"]);
        assert_eq!(matching("/project/src/ejs/data.json"), vec!["markup"]);
        assert_eq!(matching("/project/src/assets/js/lib/menu.js"), vec!["scripts"]);
        assert_eq!(matching("/project/src/data/site.json"), vec!["data"]);
        assert_eq!(matching("/project/src/assets/images/hero.PNG"), vec!["images"]);
        assert!(matching("/project/src/assets/scss/notes.md").is_empty());
        assert!(matching("/project/dist/assets/css/style.css").is_empty());
    }

    #[test]
    fn test_watch_group_steps() {
        let ctx = context(Variant::Static, "development");
        let steps: Vec<Vec<String>> =
            BuildPlan::new(&ctx).watch_groups().iter().map(|g| g.step.task_names()).collect();
        assert_eq!(
            steps,
            vec![
                vec!["scss".to_string(), "css".to_string()],
                vec!["markup".to_string(), "includes".to_string()],
                vec!["bundle".to_string(), "minjs".to_string()],
                vec!["json".to_string()],
                vec!["images".to_string()],
            ]
        );
    }

    #[test]
    fn test_reload_watches() {
        let ctx = context(Variant::Wordpress, "development");
        let watches = BuildPlan::new(&ctx).reload_watches().unwrap();
        assert_eq!(watches.len(), 1);

        let theme = ctx.config().theme_root();
        let watch = &watches[0];
        assert_eq!(watch.dir, Path::new("/project").join(&theme));
        assert!(watch.matches(&Path::new("/project").join(&theme).join("page.php")));
        assert!(watch.matches(&Path::new("/project").join(&theme).join("parts/header.php")));
        assert!(!watch.matches(&Path::new("/project").join(&theme).join("style.css")));
    }
}
