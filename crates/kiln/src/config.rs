//! Configuration file (kiln.toml).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use kiln_build::SiteLayout;
use kiln_server::DevServerConfig;
use serde::Deserialize;

/// Configuration file structure.
///
/// Every section and key is optional. Directory paths are relative to the
/// directory holding the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub templates: TemplatesConfig,
    pub styles: StylesConfig,
    pub server: ServerConfig,
    pub watch: WatchConfig,

    /// Directory the config file was loaded from
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub dir: String,
    pub pages: String,
    pub partials: String,
    pub styles: String,
    pub scripts: String,
    pub images: String,
    pub fonts: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: "source".to_string(),
            pages: "pages".to_string(),
            partials: "partials".to_string(),
            styles: "styles".to_string(),
            scripts: "js".to_string(),
            images: "img".to_string(),
            fonts: "fonts".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "build".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Template extension, with or without the leading dot
    pub extension: String,
    pub layout: String,
    pub index: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            extension: "tpl".to_string(),
            layout: "layout.tpl".to_string(),
            index: "includes.tpl".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StylesConfig {
    pub entry: String,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: "style.css".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            open: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let root = std::path::absolute(&root)
        .with_context(|| format!("Failed to resolve {}", root.display()))?;

    if !path.exists() {
        tracing::debug!("No {} found, using defaults", path.display());
        return Ok(ConfigFile {
            root,
            ..Default::default()
        });
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config.root = root;

    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

impl ConfigFile {
    /// Source and output layout, with every directory resolved.
    pub fn layout(&self) -> SiteLayout {
        let source_dir = self.root.join(&self.source.dir);
        let mut layout = SiteLayout::new(&source_dir, self.root.join(&self.output.dir));

        layout.pages_dir = source_dir.join(&self.source.pages);
        layout.partials_dir = source_dir.join(&self.source.partials);
        layout.styles_dir = source_dir.join(&self.source.styles);
        layout.scripts_dir = source_dir.join(&self.source.scripts);
        layout.images_dir = source_dir.join(&self.source.images);
        layout.fonts_dir = source_dir.join(&self.source.fonts);
        layout.template_ext = self.templates.extension.trim_start_matches('.').to_string();
        layout.layout_file = self.templates.layout.clone();
        layout.index_file = self.templates.index.clone();
        layout.style_entry = self.styles.entry.clone();

        layout
    }

    /// Dev server settings.
    pub fn server(&self) -> DevServerConfig {
        DevServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            open: self.server.open,
            debounce: Duration::from_millis(self.watch.debounce_ms),
        }
    }
}
