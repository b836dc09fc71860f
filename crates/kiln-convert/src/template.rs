//! Page template compilation using minijinja.

use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{context, path_loader, Environment};

use crate::output::write_output;
use crate::traits::{ConvertError, ConvertInput, Converter};

/// Compiles a page template into a single HTML document.
///
/// Templates referenced by name (`{% extends %}`, `{% include %}`) are
/// resolved against the partials directory, which also holds the generated
/// include index.
#[derive(Debug, Clone)]
pub struct TemplateConverter {
    partials_dir: PathBuf,
}

impl TemplateConverter {
    /// Create a converter that resolves includes from `partials_dir`.
    pub fn new(partials_dir: impl Into<PathBuf>) -> Self {
        Self {
            partials_dir: partials_dir.into(),
        }
    }

    /// Render a page template to an HTML string.
    pub fn render(&self, source_path: &Path) -> Result<String, ConvertError> {
        let source =
            fs::read_to_string(source_path).map_err(|e| ConvertError::read(source_path, e))?;

        // A fresh environment per page: partials may have changed on disk
        // since the last render and the loader caches what it loads.
        let mut env = Environment::new();
        env.set_loader(path_loader(&self.partials_dir));

        let name = source_path.display().to_string();
        let page = source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("index")
            .to_string();

        env.add_template_owned(name.clone(), source)
            .map_err(|e| template_error(source_path, &e))?;

        env.get_template(&name)
            .and_then(|tmpl| tmpl.render(context! { page => page }))
            .map_err(|e| template_error(source_path, &e))
    }
}

impl Converter for TemplateConverter {
    fn name(&self) -> &'static str {
        "templates"
    }

    fn convert(&self, input: &ConvertInput) -> Result<Vec<PathBuf>, ConvertError> {
        let html = self.render(&input.source)?;
        write_output(&input.destination, html)?;
        Ok(vec![input.destination.clone()])
    }
}

fn template_error(path: &Path, err: &minijinja::Error) -> ConvertError {
    ConvertError::TemplateError {
        path: path.display().to_string(),
        message: format!("{:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let temp = tempdir().unwrap();
        let pages = temp.path().join("pages");
        let partials = temp.path().join("partials");
        fs::create_dir_all(&pages).unwrap();
        fs::create_dir_all(&partials).unwrap();

        fs::write(
            partials.join("layout.tpl"),
            "<html><body>{% block body %}{% endblock %}</body></html>",
        )
        .unwrap();
        fs::write(partials.join("card.tpl"), "<div class=\"card\"></div>").unwrap();

        (temp, pages, partials)
    }

    #[test]
    fn renders_page_with_layout_and_include() {
        let (temp, pages, partials) = fixture();
        fs::write(
            pages.join("index.tpl"),
            r#"{% extends "layout.tpl" %}{% block body %}<h1>{{ page }}</h1>{% include "card.tpl" %}{% endblock %}"#,
        )
        .unwrap();

        let out = temp.path().join("build/index.html");
        let converter = TemplateConverter::new(&partials);
        let written = converter
            .convert(&ConvertInput::new(pages.join("index.tpl"), &out))
            .unwrap();

        assert_eq!(written, vec![out.clone()]);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            r#"<html><body><h1>index</h1><div class="card"></div></body></html>"#
        );
    }

    #[test]
    fn picks_up_partial_edits_between_renders() {
        let (_temp, pages, partials) = fixture();
        fs::write(pages.join("a.tpl"), r#"{% include "card.tpl" %}"#).unwrap();

        let converter = TemplateConverter::new(&partials);
        assert!(converter.render(&pages.join("a.tpl")).unwrap().contains("card"));

        fs::write(partials.join("card.tpl"), "<p>changed</p>").unwrap();
        assert_eq!(converter.render(&pages.join("a.tpl")).unwrap(), "<p>changed</p>");
    }

    #[test]
    fn reports_syntax_errors_with_path() {
        let (temp, pages, partials) = fixture();
        fs::write(pages.join("about.tpl"), "{% if %}broken").unwrap();

        let converter = TemplateConverter::new(&partials);
        let err = converter
            .convert(&ConvertInput::new(
                pages.join("about.tpl"),
                temp.path().join("build/about.html"),
            ))
            .unwrap_err();

        assert!(matches!(err, ConvertError::TemplateError { .. }));
        assert!(err.to_string().contains("about.tpl"));
        assert!(!temp.path().join("build/about.html").exists());
    }

    #[test]
    fn macros_are_imported_not_included() {
        let (_temp, pages, partials) = fixture();
        fs::write(
            partials.join("buttons.tpl"),
            r#"{% macro button(label) %}<button>{{ label }}</button>{% endmacro %}"#,
        )
        .unwrap();
        fs::write(
            partials.join("includes.tpl"),
            "{% include \"buttons.tpl\" %}{% include \"card.tpl\" %}",
        )
        .unwrap();
        fs::write(
            pages.join("index.tpl"),
            r#"{% from "buttons.tpl" import button %}{% include "includes.tpl" %}{{ button("Go") }}"#,
        )
        .unwrap();

        let converter = TemplateConverter::new(&partials);
        assert_eq!(
            converter.render(&pages.join("index.tpl")).unwrap(),
            r#"<div class="card"></div><button>Go</button>"#
        );
    }

    #[test]
    fn reports_missing_include() {
        let (_temp, pages, partials) = fixture();
        fs::write(pages.join("x.tpl"), r#"{% include "nope.tpl" %}"#).unwrap();

        let converter = TemplateConverter::new(&partials);
        assert!(converter.render(&pages.join("x.tpl")).is_err());
    }
}
