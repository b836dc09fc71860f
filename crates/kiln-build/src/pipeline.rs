//! The site build pipeline.
//!
//! Wires the layout and the converters into named tasks, and composes them
//! into the standing full build and into per-change plans.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use kiln_convert::{
    ConvertInput, Converter, CopyConverter, ImageConverter, ScriptConverter, StyleConverter,
    StyleTargets, TemplateConverter,
};

use crate::error::BuildError;
use crate::index::regenerate_index;
use crate::layout::SiteLayout;
use crate::plan::{Action, Plan};
use crate::task::{StepReport, Task};

/// The converters used for each category.
#[derive(Clone)]
pub struct Converters {
    pub templates: Arc<dyn Converter>,
    pub styles: Arc<dyn Converter>,
    pub scripts: Arc<dyn Converter>,
    pub images: Arc<dyn Converter>,
    pub assets: Arc<dyn Converter>,
}

impl Converters {
    /// The standard converter set for `layout`.
    pub fn for_layout(layout: &SiteLayout, targets: StyleTargets) -> Self {
        Self {
            templates: Arc::new(TemplateConverter::new(&layout.partials_dir)),
            styles: Arc::new(StyleConverter::new(targets)),
            scripts: Arc::new(ScriptConverter::new()),
            images: Arc::new(ImageConverter::new()),
            assets: Arc::new(CopyConverter::new()),
        }
    }
}

/// Builds tasks for a site.
///
/// Cheap to clone; tasks created from it share the layout and converters.
#[derive(Clone)]
pub struct Pipeline {
    layout: Arc<SiteLayout>,
    converters: Converters,
}

impl Pipeline {
    /// Pipeline with the standard converters.
    pub fn new(layout: SiteLayout) -> Self {
        let converters = Converters::for_layout(&layout, StyleTargets::default());
        Self::with_converters(layout, converters)
    }

    /// Pipeline with custom converters.
    pub fn with_converters(layout: SiteLayout, converters: Converters) -> Self {
        Self {
            layout: Arc::new(layout),
            converters,
        }
    }

    /// The site layout.
    pub fn layout(&self) -> &Arc<SiteLayout> {
        &self.layout
    }

    /// Clean, regenerate the index, then run every converter.
    ///
    /// Clearing the output and regenerating the index are independent of
    /// each other, and both must finish before anything writes output.
    pub fn full_build(&self) -> Task {
        Task::series(vec![
            Task::parallel(vec![self.clear_output(), self.regenerate_index()]),
            Task::parallel(vec![
                self.copy_assets(),
                self.compile_styles(),
                self.compile_pages(),
                self.process_scripts(),
                self.optimize_images(),
            ]),
        ])
    }

    /// The task for a rebuild plan, its actions run in order.
    pub fn plan_task(&self, plan: &Plan) -> Task {
        Task::series(plan.actions().map(|a| self.action_task(a)).collect())
    }

    fn action_task(&self, action: &Action) -> Task {
        match action {
            Action::RegenerateIndex => self.regenerate_index(),
            Action::RemovePage(source) => self.remove_page(source.clone()),
            Action::RemovePageTree(source) => self.remove_page_tree(source.clone()),
            Action::CompileAllPages => self.compile_pages(),
            Action::CompilePage(source) => self.compile_page(source.clone()),
            Action::CompileStyles => self.compile_styles(),
            Action::ProcessScripts => self.process_scripts(),
            Action::OptimizeImages => self.optimize_images(),
            Action::CopyAssets => self.copy_assets(),
        }
    }

    /// Remove the output tree and recreate it empty.
    pub fn clear_output(&self) -> Task {
        let output = self.layout.output_dir.clone();
        Task::step("clear-output", move || {
            match fs::remove_dir_all(&output) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(BuildError::clean(&output, e)),
            }
            fs::create_dir_all(&output).map_err(|e| BuildError::clean(&output, e))?;
            Ok(StepReport::default())
        })
    }

    /// Rewrite the include index from the current partial set.
    pub fn regenerate_index(&self) -> Task {
        let layout = Arc::clone(&self.layout);
        Task::step("include-index", move || {
            let report = regenerate_index(
                &layout.partials_dir,
                &layout.index_path(),
                &layout.template_ext,
                &layout.excluded_partials(),
            )?;
            Ok(StepReport {
                outputs: usize::from(report.written),
                failures: 0,
            })
        })
    }

    /// Compile every page template.
    pub fn compile_pages(&self) -> Task {
        let layout = Arc::clone(&self.layout);
        Task::resilient("pages", Arc::clone(&self.converters.templates), move || {
            layout
                .page_sources()
                .into_iter()
                .filter_map(|source| page_job(&layout, source))
                .collect()
        })
    }

    /// Compile one page template.
    pub fn compile_page(&self, source: PathBuf) -> Task {
        let layout = Arc::clone(&self.layout);
        let name = format!("page {}", display_name(&source));
        Task::resilient(name, Arc::clone(&self.converters.templates), move || {
            page_job(&layout, source.clone()).into_iter().collect()
        })
    }

    /// Delete the output document of a removed page template.
    ///
    /// A target that is already gone (or otherwise cannot be removed) is
    /// logged and skipped.
    pub fn remove_page(&self, source: PathBuf) -> Task {
        let layout = Arc::clone(&self.layout);
        let name = format!("remove {}", display_name(&source));
        Task::step(name, move || {
            let Some(target) = layout.page_output(&source) else {
                tracing::warn!("Not a page template: {}", source.display());
                return Ok(StepReport::default());
            };

            match fs::remove_file(&target) {
                Ok(()) => tracing::info!("Deleted {}", target.display()),
                Err(e) => tracing::warn!("Could not delete {}: {}", target.display(), e),
            }
            Ok(StepReport::default())
        })
    }

    /// Delete the output directory mirroring a removed pages directory.
    pub fn remove_page_tree(&self, source: PathBuf) -> Task {
        let layout = Arc::clone(&self.layout);
        let name = format!("remove {}/", display_name(&source));
        Task::step(name, move || {
            let Some(target) = layout.page_tree_output(&source) else {
                tracing::debug!("Not under the pages directory: {}", source.display());
                return Ok(StepReport::default());
            };

            if !target.is_dir() {
                tracing::debug!("No output directory for {}", source.display());
                return Ok(StepReport::default());
            }

            match fs::remove_dir_all(&target) {
                Ok(()) => tracing::info!("Deleted {}", target.display()),
                Err(e) => tracing::warn!("Could not delete {}: {}", target.display(), e),
            }
            Ok(StepReport::default())
        })
    }

    /// Compile the entry stylesheet.
    pub fn compile_styles(&self) -> Task {
        let layout = Arc::clone(&self.layout);
        Task::resilient("styles", Arc::clone(&self.converters.styles), move || {
            let entry = layout.style_entry_path();
            if !entry.is_file() {
                tracing::warn!("Style entry not found: {}", entry.display());
                return Vec::new();
            }
            vec![ConvertInput::new(entry, layout.style_output())]
        })
    }

    /// Minify every script.
    pub fn process_scripts(&self) -> Task {
        let layout = Arc::clone(&self.layout);
        Task::resilient("scripts", Arc::clone(&self.converters.scripts), move || {
            mirrored_jobs(&layout, layout.script_sources())
        })
    }

    /// Optimize every image.
    pub fn optimize_images(&self) -> Task {
        let layout = Arc::clone(&self.layout);
        Task::resilient("images", Arc::clone(&self.converters.images), move || {
            mirrored_jobs(&layout, layout.image_sources())
        })
    }

    /// Copy fonts and other static files.
    pub fn copy_assets(&self) -> Task {
        let layout = Arc::clone(&self.layout);
        Task::resilient("assets", Arc::clone(&self.converters.assets), move || {
            mirrored_jobs(&layout, layout.asset_sources())
        })
    }
}

fn page_job(layout: &SiteLayout, source: PathBuf) -> Option<ConvertInput> {
    let destination = layout.page_output(&source)?;
    Some(ConvertInput::new(source, destination))
}

fn mirrored_jobs(layout: &SiteLayout, sources: Vec<PathBuf>) -> Vec<ConvertInput> {
    sources
        .into_iter()
        .filter_map(|source| {
            let destination = layout.mirrored_output(&source)?;
            Some(ConvertInput::new(source, destination))
        })
        .collect()
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ChangeKind;
    use crate::Category;
    use std::collections::BTreeSet;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};
    use walkdir::WalkDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn site() -> (TempDir, SiteLayout) {
        let temp = tempdir().unwrap();
        let layout = SiteLayout::new(temp.path().join("source"), temp.path().join("build"));

        write(
            &layout.layout_path(),
            "<html><body>{% include \"includes.tpl\" %}{% block body %}{% endblock %}</body></html>",
        );
        write(&layout.partials_dir.join("card.tpl"), "<div class=\"card\"></div>");
        write(
            &layout.pages_dir.join("index.tpl"),
            "{% extends \"layout.tpl\" %}{% block body %}<h1>Home</h1>{% endblock %}",
        );
        write(
            &layout.pages_dir.join("about.tpl"),
            "{% extends \"layout.tpl\" %}{% block body %}<h1>About</h1>{% endblock %}",
        );
        write(&layout.styles_dir.join("style.css"), ".a { color: red; }");
        write(&layout.scripts_dir.join("app.js"), "var x = 1 + 1;\nconsole.log(x);\n");
        write(
            &layout.images_dir.join("icons/logo.svg"),
            "<svg>\n  <rect/>\n</svg>",
        );
        write(&layout.images_dir.join("favicon.ico"), "ico");
        write(&layout.fonts_dir.join("body.woff2"), "font");

        (temp, layout)
    }

    fn output_files(layout: &SiteLayout) -> BTreeSet<String> {
        WalkDir::new(&layout.output_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(&layout.output_dir)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    async fn run_change(
        pipeline: &Pipeline,
        category: Category,
        path: &Path,
        kind: ChangeKind,
    ) -> StepReport {
        let plan = Plan::for_change(category, path, kind).unwrap();
        pipeline.plan_task(&plan).run().await.unwrap()
    }

    #[tokio::test]
    async fn full_build_produces_expected_tree() {
        let (_temp, layout) = site();
        let pipeline = Pipeline::new(layout.clone());

        let report = pipeline.full_build().run().await.unwrap();

        assert_eq!(report.failures, 0);
        let expected: BTreeSet<String> = [
            "about.html",
            "index.html",
            "css/style.css",
            "css/style.min.css",
            "js/app.js",
            "img/icons/logo.svg",
            "img/favicon.ico",
            "fonts/body.woff2",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(output_files(&layout), expected);

        let index = fs::read_to_string(layout.output_dir.join("index.html")).unwrap();
        assert!(index.contains("<h1>Home</h1>"));
        assert!(index.contains("class=\"card\""));
    }

    #[tokio::test]
    async fn full_build_clears_stale_output() {
        let (_temp, layout) = site();
        write(&layout.output_dir.join("stale.html"), "old");

        Pipeline::new(layout.clone()).full_build().run().await.unwrap();

        assert!(!layout.output_dir.join("stale.html").exists());
    }

    #[tokio::test]
    async fn broken_page_does_not_stop_others() {
        let (_temp, layout) = site();
        write(&layout.pages_dir.join("about.tpl"), "{% if %}");

        let report = Pipeline::new(layout.clone()).full_build().run().await.unwrap();

        assert_eq!(report.failures, 1);
        assert!(layout.output_dir.join("index.html").exists());
        assert!(!layout.output_dir.join("about.html").exists());
        assert!(layout.output_dir.join("css/style.css").exists());
    }

    #[tokio::test]
    async fn unwritable_index_is_fatal() {
        let (_temp, layout) = site();
        let mut layout = layout;
        layout.index_file = "card.tpl/includes.tpl".to_string();

        let result = Pipeline::new(layout).full_build().run().await;

        assert!(matches!(result, Err(BuildError::Index { .. })));
    }

    #[tokio::test]
    async fn removing_a_page_deletes_only_its_output() {
        let (_temp, layout) = site();
        let pipeline = Pipeline::new(layout.clone());
        pipeline.full_build().run().await.unwrap();

        let about = layout.pages_dir.join("about.tpl");
        fs::remove_file(&about).unwrap();
        run_change(&pipeline, Category::Pages, &about, ChangeKind::Removed).await;

        assert!(!layout.output_dir.join("about.html").exists());
        assert!(layout.output_dir.join("index.html").exists());

        // Already gone: logged, not fatal.
        run_change(&pipeline, Category::Pages, &about, ChangeKind::Removed).await;
    }

    #[tokio::test]
    async fn multi_dot_templates_compile_and_remove_as_html() {
        let temp = tempdir().unwrap();
        let mut layout = SiteLayout::new(temp.path().join("source"), temp.path().join("build"));
        layout.template_ext = "html.j2".to_string();
        let about = layout.pages_dir.join("about.html.j2");
        write(&about, "<h1>About</h1>");

        let pipeline = Pipeline::new(layout.clone());
        let report = pipeline.full_build().run().await.unwrap();

        assert_eq!(report.failures, 0);
        assert!(layout.output_dir.join("about.html").exists());
        assert!(!layout.output_dir.join("about.html.html").exists());

        fs::remove_file(&about).unwrap();
        run_change(&pipeline, Category::Pages, &about, ChangeKind::Removed).await;

        assert!(!layout.output_dir.join("about.html").exists());
    }

    #[tokio::test]
    async fn removing_a_page_directory_deletes_its_output_tree() {
        let (_temp, layout) = site();
        write(
            &layout.pages_dir.join("blog/post.tpl"),
            "{% extends \"layout.tpl\" %}{% block body %}post{% endblock %}",
        );
        let pipeline = Pipeline::new(layout.clone());
        pipeline.full_build().run().await.unwrap();
        assert!(layout.output_dir.join("blog/post.html").exists());

        let blog = layout.pages_dir.join("blog");
        fs::remove_dir_all(&blog).unwrap();
        run_change(&pipeline, Category::PageTree, &blog, ChangeKind::Removed).await;

        assert!(!layout.output_dir.join("blog").exists());
        assert!(layout.output_dir.join("index.html").exists());

        // Nothing left to delete: skipped, not fatal.
        run_change(&pipeline, Category::PageTree, &blog, ChangeKind::Removed).await;
    }

    #[tokio::test]
    async fn partial_edit_recompiles_pages_without_touching_index() {
        let (_temp, layout) = site();
        let pipeline = Pipeline::new(layout.clone());
        pipeline.full_build().run().await.unwrap();

        let index_before = fs::read(layout.index_path()).unwrap();
        let mtime_before = fs::metadata(layout.index_path()).unwrap().modified().unwrap();

        let card = layout.partials_dir.join("card.tpl");
        write(&card, "<div class=\"card v2\"></div>");
        run_change(&pipeline, Category::Partials, &card, ChangeKind::Modified).await;

        assert_eq!(fs::read(layout.index_path()).unwrap(), index_before);
        assert_eq!(
            fs::metadata(layout.index_path()).unwrap().modified().unwrap(),
            mtime_before
        );
        let about = fs::read_to_string(layout.output_dir.join("about.html")).unwrap();
        assert!(about.contains("card v2"));
    }

    #[tokio::test]
    async fn new_partial_is_indexed_and_rendered() {
        let (_temp, layout) = site();
        let pipeline = Pipeline::new(layout.clone());
        pipeline.full_build().run().await.unwrap();

        let banner = layout.partials_dir.join("banner.tpl");
        write(&banner, "<aside>banner</aside>");
        run_change(&pipeline, Category::Partials, &banner, ChangeKind::Created).await;

        let index = fs::read_to_string(layout.index_path()).unwrap();
        assert!(index.contains("{% include \"banner.tpl\" %}"));
        let home = fs::read_to_string(layout.output_dir.join("index.html")).unwrap();
        assert!(home.contains("<aside>banner</aside>"));
    }

    #[tokio::test]
    async fn single_page_change_only_compiles_that_page() {
        let (_temp, layout) = site();
        let pipeline = Pipeline::new(layout.clone());
        pipeline.full_build().run().await.unwrap();

        let about = layout.pages_dir.join("about.tpl");
        let report = run_change(&pipeline, Category::Pages, &about, ChangeKind::Modified).await;

        assert_eq!(report.outputs, 1);
    }
}
