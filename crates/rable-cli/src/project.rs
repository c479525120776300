//! `Rable.toml` project files.
//!
//! ```toml
//! page = "index.html"
//! mount = "#app"
//! data = "data.json"
//!
//! [components]
//! download-link = "components/download-link.html"
//! ```
//!
//! Relative paths resolve against the directory holding `Rable.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use rable::TemplateLoader;
use serde::Deserialize;

pub const PROJECT_FILE: &str = "Rable.toml";

fn default_mount() -> String {
    "#app".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Page markup to render.
    pub page: PathBuf,
    /// Selector of the element to mount.
    #[serde(default = "default_mount")]
    pub mount: String,
    /// JSON object seeding the root state.
    #[serde(default)]
    pub data: Option<PathBuf>,
    /// Component name -> template path.
    #[serde(default)]
    pub components: IndexMap<String, PathBuf>,
}

/// A parsed project and the directory its paths are relative to.
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
}

impl Project {
    /// Load `path`, either a `Rable.toml` or a directory containing one.
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.is_dir() {
            path.join(PROJECT_FILE)
        } else {
            path.to_path_buf()
        };
        let content = fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", file.display()))?;
        let root = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        log::debug!("loaded {} with {} component(s)", file.display(), config.components.len());
        Ok(Self { root, config })
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    pub fn page(&self) -> Result<String> {
        let path = self.resolve(&self.config.page);
        fs::read_to_string(&path).with_context(|| format!("Failed to read page {}", path.display()))
    }

    /// Initial root state; empty without a `data` file.
    pub fn data(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        let Some(data) = &self.config.data else {
            return Ok(serde_json::Map::new());
        };
        let path = self.resolve(data);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read data {}", path.display()))?;
        match serde_json::from_str::<serde_json::Value>(&content)
            .with_context(|| format!("Failed to parse data {}", path.display()))?
        {
            serde_json::Value::Object(map) => Ok(map),
            other => bail!(
                "Data file {} must hold a JSON object, found {}",
                path.display(),
                json_kind(&other)
            ),
        }
    }

    pub fn loader(&self) -> FsLoader {
        FsLoader {
            root: self.root.clone(),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Reads component templates from disk, relative to `root`.
pub struct FsLoader {
    pub root: PathBuf,
}

impl TemplateLoader for FsLoader {
    fn load(&self, path: &str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Ok(fs::read_to_string(self.root.join(path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_with_defaults() {
        let config: ProjectConfig = toml::from_str(
            r#"
            page = "index.html"

            [components]
            download-link = "components/download-link.html"
            card = "card.html"
            "#,
        )
        .unwrap();
        assert_eq!(config.mount, "#app");
        assert_eq!(config.data, None);
        assert_eq!(
            config.components.keys().collect::<Vec<_>>(),
            vec!["download-link", "card"]
        );
    }

    #[test]
    fn page_is_required() {
        assert!(toml::from_str::<ProjectConfig>("mount = \"#root\"").is_err());
    }
}
