//! Project configuration.

use super::BuildConfig;
use crate::core::paths;
use crate::errors::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How bare module specifiers are resolved by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleResolution {
    /// Leave bare specifiers alone.
    #[default]
    None,
    /// Resolve bare specifiers with node's algorithm.
    Node,
}

/// A project: where its files live, which of them are entrypoints, and how
/// to build it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Project root directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Main entrypoint document, relative to the root.
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,
    /// App shell document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Lazily loaded fragment documents.
    #[serde(default)]
    pub fragments: Vec<String>,
    /// Globs selecting project sources.
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    /// Globs selecting dependency files.
    #[serde(default = "default_dependencies")]
    pub dependencies: Vec<String>,
    /// Extra dependency globs appended to `dependencies`.
    #[serde(default)]
    pub extra_dependencies: Vec<String>,
    /// Module resolution passed to the optimizer.
    #[serde(default)]
    pub module_resolution: ModuleResolution,
    /// Directory that receives `build/`; defaults to the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_root: Option<PathBuf>,
    /// The build to run.
    #[serde(default)]
    pub build: BuildConfig,
    /// Several builds to run; takes precedence over `build` when non-empty.
    #[serde(default)]
    pub builds: Vec<BuildConfig>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_entrypoint() -> String {
    "index.html".to_string()
}

fn default_sources() -> Vec<String> {
    vec!["src/**/*".to_string()]
}

fn default_dependencies() -> Vec<String> {
    vec!["node_modules/**/*".to_string()]
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self::new(default_root())
    }
}

impl ProjectConfig {
    /// Creates a project rooted at `root` with default settings.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entrypoint: default_entrypoint(),
            shell: None,
            fragments: Vec::new(),
            sources: default_sources(),
            dependencies: default_dependencies(),
            extra_dependencies: Vec::new(),
            module_resolution: ModuleResolution::default(),
            output_root: None,
            build: BuildConfig::default(),
            builds: Vec::new(),
        }
    }

    /// Parses a project configuration from JSON.
    pub fn from_json_str(json: &str) -> BuildResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a project configuration file.
    ///
    /// A relative `root` is taken relative to the file's directory.
    pub async fn from_json_file(path: impl AsRef<Path>) -> BuildResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BuildError::io(path, e))?;
        let mut config = Self::from_json_str(&text)?;
        if config.root.is_relative() {
            if let Some(dir) = path.parent() {
                config.root = dir.join(&config.root);
            }
        }
        Ok(config)
    }

    /// Sets the build to run.
    #[must_use]
    pub fn with_build(mut self, build: BuildConfig) -> Self {
        self.build = build;
        self
    }

    /// Sets the source globs.
    #[must_use]
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the dependency globs.
    #[must_use]
    pub fn with_dependencies(
        mut self,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the output root.
    #[must_use]
    pub fn with_output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(output_root.into());
        self
    }

    /// Directory that receives `build/`.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        self.output_root.as_deref().unwrap_or(&self.root)
    }

    /// Entrypoint, shell and fragments as normalized logical paths, deduplicated.
    #[must_use]
    pub fn entrypoints(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let candidates = std::iter::once(&self.entrypoint)
            .chain(self.shell.iter())
            .chain(self.fragments.iter());
        for candidate in candidates {
            if let Some(path) = paths::normalize(candidate) {
                if !out.contains(&path) {
                    out.push(path);
                }
            }
        }
        out
    }

    /// Normalized logical path of the main entrypoint.
    #[must_use]
    pub fn entrypoint_path(&self) -> String {
        paths::normalize(&self.entrypoint).unwrap_or_else(default_entrypoint)
    }

    /// Dependency globs including the extra ones.
    #[must_use]
    pub fn dependency_globs(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .chain(self.extra_dependencies.iter())
            .cloned()
            .collect()
    }

    /// The builds to run: `builds` when non-empty, otherwise `build`.
    #[must_use]
    pub fn build_configs(&self) -> Vec<BuildConfig> {
        if self.builds.is_empty() {
            vec![self.build.clone()]
        } else {
            self.builds.clone()
        }
    }
}
