//! Source and output tree layout.
//!
//! A site's source root is partitioned into categories. Each category has
//! one extension set and one rule mapping a source path to its output path.

use std::fmt;
use std::path::{Path, PathBuf};

use kiln_convert::ImageConverter;

use crate::discover::{discover, discover_matching, has_extension, is_temp_file};

/// Font formats copied verbatim into the output tree.
pub const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "eot", "ttf", "otf"];

/// A partition of the source tree (plus the output tree itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Page templates, one output document each
    Pages,
    /// Directories (and stray files) under the pages directory
    PageTree,
    /// Partial templates, the layout, and the generated include index
    Partials,
    /// Stylesheets (the entry and everything it imports)
    Styles,
    /// Browser scripts
    Scripts,
    /// Optimizable images
    Images,
    /// Fonts and any other file under the images directory
    Assets,
    /// Anything inside the output tree
    Output,
}

impl Category {
    /// Every category, in a stable order.
    pub const ALL: [Category; 8] = [
        Category::Pages,
        Category::PageTree,
        Category::Partials,
        Category::Styles,
        Category::Scripts,
        Category::Images,
        Category::Assets,
        Category::Output,
    ];

    /// Short lowercase label for logs.
    pub fn label(self) -> &'static str {
        match self {
            Category::Pages => "pages",
            Category::PageTree => "page-tree",
            Category::Partials => "partials",
            Category::Styles => "styles",
            Category::Scripts => "scripts",
            Category::Images => "images",
            Category::Assets => "assets",
            Category::Output => "output",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where sources live and where their outputs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    /// Source root
    pub source_dir: PathBuf,

    /// Output root
    pub output_dir: PathBuf,

    /// Page templates
    pub pages_dir: PathBuf,

    /// Partial templates, layout and include index
    pub partials_dir: PathBuf,

    /// Stylesheets
    pub styles_dir: PathBuf,

    /// Scripts
    pub scripts_dir: PathBuf,

    /// Images
    pub images_dir: PathBuf,

    /// Fonts
    pub fonts_dir: PathBuf,

    /// Template extension without the dot
    pub template_ext: String,

    /// Layout file name, relative to the partials directory
    pub layout_file: String,

    /// Generated include index file name, relative to the partials directory
    pub index_file: String,

    /// Entry stylesheet file name, relative to the styles directory
    pub style_entry: String,
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self::new("source", "build")
    }
}

impl SiteLayout {
    /// Layout with the conventional subdirectory names under `source_dir`.
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let source_dir = source_dir.into();
        Self {
            pages_dir: source_dir.join("pages"),
            partials_dir: source_dir.join("partials"),
            styles_dir: source_dir.join("styles"),
            scripts_dir: source_dir.join("js"),
            images_dir: source_dir.join("img"),
            fonts_dir: source_dir.join("fonts"),
            source_dir,
            output_dir: output_dir.into(),
            template_ext: "tpl".to_string(),
            layout_file: "layout.tpl".to_string(),
            index_file: "includes.tpl".to_string(),
            style_entry: "style.css".to_string(),
        }
    }

    /// Path of the generated include index.
    pub fn index_path(&self) -> PathBuf {
        self.partials_dir.join(&self.index_file)
    }

    /// Path of the layout template.
    pub fn layout_path(&self) -> PathBuf {
        self.partials_dir.join(&self.layout_file)
    }

    /// Partials that are never listed in the include index.
    pub fn excluded_partials(&self) -> Vec<PathBuf> {
        vec![self.layout_path(), self.index_path()]
    }

    /// Path of the entry stylesheet.
    pub fn style_entry_path(&self) -> PathBuf {
        self.styles_dir.join(&self.style_entry)
    }

    /// Output path of the expanded stylesheet (`css/<name>.css`).
    pub fn style_output(&self) -> PathBuf {
        let stem = Path::new(&self.style_entry)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("style");
        self.output_dir.join("css").join(format!("{}.css", stem))
    }

    /// URL paths of every stylesheet the style entry produces.
    pub fn style_urls(&self) -> Vec<String> {
        let css = self.style_output();
        let min = kiln_convert::style::minified_path(&css);
        [css, min]
            .iter()
            .filter_map(|p| self.output_url(p))
            .collect()
    }

    /// All page templates.
    pub fn page_sources(&self) -> Vec<PathBuf> {
        discover(&self.pages_dir, &self.template_ext)
    }

    /// `pages/blog/post.tpl` -> `<output>/blog/post.html`
    ///
    /// The whole template extension is replaced, so with `html.j2`
    /// templates `about.html.j2` becomes `about.html`.
    pub fn page_output(&self, source: &Path) -> Option<PathBuf> {
        let relative = source.strip_prefix(&self.pages_dir).ok()?;
        let name = relative.file_name()?.to_str()?;

        let stem = if has_extension(relative, &self.template_ext) {
            let ext = self.template_ext.trim_start_matches('.');
            &name[..name.len() - ext.len() - 1]
        } else {
            Path::new(name).file_stem()?.to_str()?
        };

        Some(
            self.output_dir
                .join(relative)
                .with_file_name(format!("{}.html", stem)),
        )
    }

    /// Output directory mirroring a directory under the pages directory.
    pub fn page_tree_output(&self, source: &Path) -> Option<PathBuf> {
        let relative = source.strip_prefix(&self.pages_dir).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        Some(self.output_dir.join(relative))
    }

    /// All scripts.
    pub fn script_sources(&self) -> Vec<PathBuf> {
        discover(&self.scripts_dir, "js")
    }

    /// All optimizable images.
    pub fn image_sources(&self) -> Vec<PathBuf> {
        discover_matching(&self.images_dir, is_image)
    }

    /// Fonts, plus files under the images directory the optimizer skips.
    pub fn asset_sources(&self) -> Vec<PathBuf> {
        let mut sources = discover_matching(&self.fonts_dir, is_font);
        sources.extend(discover_matching(&self.images_dir, |p| !is_image(p)));
        sources
    }

    /// Output path for a source file in one of the mirrored directories
    /// (scripts, images, fonts).
    pub fn mirrored_output(&self, source: &Path) -> Option<PathBuf> {
        [
            (&self.scripts_dir, "js"),
            (&self.images_dir, "img"),
            (&self.fonts_dir, "fonts"),
        ]
        .into_iter()
        .find_map(|(dir, out)| {
            source
                .strip_prefix(dir)
                .ok()
                .map(|rel| self.output_dir.join(out).join(rel))
        })
    }

    /// URL path of a file inside the output tree (`/css/style.css`).
    pub fn output_url(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.output_dir).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("/{}", parts.join("/")))
    }

    /// Which category a changed path belongs to, if any.
    ///
    /// The generated include index is never classified: it is written by the
    /// build itself and must not feed back into the watch loop.
    pub fn classify(&self, path: &Path) -> Option<Category> {
        if is_temp_file(path) {
            return None;
        }

        if path.starts_with(&self.output_dir) {
            return Some(Category::Output);
        }

        if path.starts_with(&self.partials_dir) {
            if path == self.index_path() || !has_extension(path, &self.template_ext) {
                return None;
            }
            return Some(Category::Partials);
        }

        if path.starts_with(&self.pages_dir) {
            // Anything else is most likely a directory that was moved or
            // deleted; its pages were never reported one by one.
            return Some(if has_extension(path, &self.template_ext) {
                Category::Pages
            } else {
                Category::PageTree
            });
        }

        if path.starts_with(&self.styles_dir) {
            return has_extension(path, "css").then_some(Category::Styles);
        }

        if path.starts_with(&self.scripts_dir) {
            return has_extension(path, "js").then_some(Category::Scripts);
        }

        if path.starts_with(&self.images_dir) {
            return Some(if is_image(path) {
                Category::Images
            } else {
                Category::Assets
            });
        }

        if path.starts_with(&self.fonts_dir) {
            return is_font(path).then_some(Category::Assets);
        }

        None
    }
}

fn is_image(path: &Path) -> bool {
    ImageConverter::EXTENSIONS
        .iter()
        .any(|ext| has_extension(path, ext))
}

fn is_font(path: &Path) -> bool {
    FONT_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SiteLayout {
        SiteLayout::new("/site/source", "/site/build")
    }

    #[test]
    fn maps_pages_to_html() {
        let layout = layout();
        assert_eq!(
            layout.page_output(Path::new("/site/source/pages/about.tpl")),
            Some(PathBuf::from("/site/build/about.html"))
        );
        assert_eq!(
            layout.page_output(Path::new("/site/source/pages/blog/post.tpl")),
            Some(PathBuf::from("/site/build/blog/post.html"))
        );
        assert_eq!(layout.page_output(Path::new("/elsewhere/x.tpl")), None);
    }

    #[test]
    fn replaces_multi_dot_template_extensions() {
        let mut layout = layout();
        layout.template_ext = "html.j2".to_string();

        assert_eq!(
            layout.page_output(Path::new("/site/source/pages/about.html.j2")),
            Some(PathBuf::from("/site/build/about.html"))
        );
        assert_eq!(
            layout.page_output(Path::new("/site/source/pages/blog/Post.HTML.J2")),
            Some(PathBuf::from("/site/build/blog/Post.html"))
        );
        assert_eq!(
            layout.classify(Path::new("/site/source/pages/about.html.j2")),
            Some(Category::Pages)
        );
    }

    #[test]
    fn maps_page_directories() {
        let layout = layout();
        assert_eq!(
            layout.page_tree_output(Path::new("/site/source/pages/blog")),
            Some(PathBuf::from("/site/build/blog"))
        );
        assert_eq!(layout.page_tree_output(Path::new("/site/source/pages")), None);
        assert_eq!(layout.page_tree_output(Path::new("/elsewhere/blog")), None);
    }

    #[test]
    fn maps_styles_and_mirrored_dirs() {
        let layout = layout();
        assert_eq!(
            layout.style_output(),
            PathBuf::from("/site/build/css/style.css")
        );
        assert_eq!(
            layout.style_urls(),
            vec!["/css/style.css".to_string(), "/css/style.min.css".to_string()]
        );
        assert_eq!(
            layout.mirrored_output(Path::new("/site/source/img/icons/a.png")),
            Some(PathBuf::from("/site/build/img/icons/a.png"))
        );
        assert_eq!(
            layout.mirrored_output(Path::new("/site/source/js/app.js")),
            Some(PathBuf::from("/site/build/js/app.js"))
        );
        assert_eq!(
            layout.mirrored_output(Path::new("/site/source/fonts/a.woff2")),
            Some(PathBuf::from("/site/build/fonts/a.woff2"))
        );
    }

    #[test]
    fn classifies_changes() {
        let layout = layout();
        let cases = [
            ("/site/source/pages/index.tpl", Some(Category::Pages)),
            ("/site/source/pages/blog", Some(Category::PageTree)),
            ("/site/source/partials/card.tpl", Some(Category::Partials)),
            ("/site/source/partials/layout.tpl", Some(Category::Partials)),
            ("/site/source/partials/includes.tpl", None),
            ("/site/source/styles/base.css", Some(Category::Styles)),
            ("/site/source/js/app.js", Some(Category::Scripts)),
            ("/site/source/img/logo.svg", Some(Category::Images)),
            ("/site/source/img/favicon.ico", Some(Category::Assets)),
            ("/site/source/fonts/a.woff2", Some(Category::Assets)),
            ("/site/source/fonts/readme.md", None),
            ("/site/build/index.html", Some(Category::Output)),
            ("/site/build/.index.html.42.tmp", None),
            ("/site/source/pages/.index.tpl.swp", None),
            ("/site/other.txt", None),
        ];

        for (path, expected) in cases {
            assert_eq!(layout.classify(Path::new(path)), expected, "{}", path);
        }
    }

    #[test]
    fn excludes_layout_and_index() {
        assert_eq!(
            layout().excluded_partials(),
            vec![
                PathBuf::from("/site/source/partials/layout.tpl"),
                PathBuf::from("/site/source/partials/includes.tpl"),
            ]
        );
    }
}
