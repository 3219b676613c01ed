//! Filesystem asset source.

use super::AssetSource;
use crate::config::{ProjectConfig, BUILD_DIRECTORY};
use crate::core::{paths, FileRecord, RecordOrigin};
use crate::errors::{BuildError, BuildResult, ConfigError, ErrorInfo};
use crate::stream::RecordStream;
use futures::stream;
use futures::{StreamExt, TryStreamExt};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reads records from a project directory.
///
/// Files are selected with gitignore-style globs relative to the root;
/// `.gitignore` files themselves are not consulted. Listing happens on the
/// blocking pool, then each file is read only when the stream is polled.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: Arc<PathBuf>,
    sources: Arc<Vec<String>>,
    dependencies: Arc<Vec<String>>,
    excludes: Arc<Vec<String>>,
}

impl FsAssetSource {
    /// Creates a source rooted at `root` with explicit glob lists.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        sources: impl IntoIterator<Item = impl Into<String>>,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            root: Arc::new(root.into()),
            sources: Arc::new(sources.into_iter().map(Into::into).collect()),
            dependencies: Arc::new(dependencies.into_iter().map(Into::into).collect()),
            excludes: Arc::new(vec![format!("/{BUILD_DIRECTORY}/")]),
        }
    }

    /// Creates the source described by a project configuration.
    ///
    /// Sources are the `sources` globs plus the entrypoint, shell and
    /// fragments; dependencies are `dependencies` plus `extraDependencies`.
    #[must_use]
    pub fn from_project(project: &ProjectConfig) -> Self {
        let sources = project
            .sources
            .iter()
            .cloned()
            .chain(project.entrypoints().into_iter().map(|path| format!("/{path}")));
        Self::new(project.root.clone(), sources, project.dependency_globs())
    }

    /// Adds an exclusion glob, applied to both streams.
    #[must_use]
    pub fn exclude(mut self, glob: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.excludes).push(glob.into());
        self
    }

    /// The project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stream(&self, globs: Arc<Vec<String>>, origin: RecordOrigin) -> RecordStream {
        let root = self.root.clone();
        let excludes = self.excludes.clone();
        let listing = {
            let root = root.clone();
            async move {
                tokio::task::spawn_blocking(move || list_files(&root, &globs, &excludes))
                    .await
                    .map_err(|e| BuildError::Internal(format!("file listing task failed: {e}")))?
            }
        };

        stream::once(listing)
            .map_ok(|files| stream::iter(files.into_iter().map(Ok)))
            .try_flatten()
            .and_then(move |(logical, path)| async move {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| BuildError::io(&path, e))?;
                Ok::<_, BuildError>(FileRecord::new(logical, bytes, origin))
            })
            .boxed()
    }
}

impl AssetSource for FsAssetSource {
    fn sources(&self) -> RecordStream {
        self.stream(self.sources.clone(), RecordOrigin::Source)
    }

    fn dependencies(&self) -> RecordStream {
        self.stream(self.dependencies.clone(), RecordOrigin::Dependency)
    }
}

fn glob_error(glob: &str, err: &ignore::Error) -> BuildError {
    ConfigError::new(
        "project",
        format!("invalid file glob '{glob}': {err}"),
        ErrorInfo::new("CONFIG-008-SOURCE_GLOB", "Invalid source or dependency glob")
            .with_context_entry("glob", glob),
    )
    .into()
}

/// Lists `(logical path, filesystem path)` pairs matching `globs`, sorted by
/// logical path.
fn list_files(root: &Path, globs: &[String], excludes: &[String]) -> BuildResult<Vec<(String, PathBuf)>> {
    if globs.is_empty() {
        return Ok(Vec::new());
    }
    let mut overrides = OverrideBuilder::new(root);
    for glob in globs {
        overrides.add(glob).map_err(|e| glob_error(glob, &e))?;
    }
    for glob in excludes {
        let negated = format!("!{glob}");
        overrides.add(&negated).map_err(|e| glob_error(glob, &e))?;
    }
    let overrides = overrides.build().map_err(|e| glob_error("<overrides>", &e))?;

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .overrides(overrides)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        match paths::from_fs_path(root, entry.path()) {
            Some(logical) => files.push((logical, entry.into_path())),
            None => warn!(path = %entry.path().display(), "Skipping file without a UTF-8 logical path"),
        }
    }
    files.sort();
    files.dedup_by(|a, b| a.0 == b.0);
    debug!(root = %root.display(), files = files.len(), "Listed project files");
    Ok(files)
}

fn walk_error(root: &Path, err: ignore::Error) -> BuildError {
    let path = match &err {
        ignore::Error::WithPath { path, .. } => path.clone(),
        _ => root.to_path_buf(),
    };
    match err.into_io_error() {
        Some(io) => BuildError::io(path, io),
        None => BuildError::Internal(format!("walking '{}' failed", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use crate::stream::collect_records;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        tokio::fs::create_dir_all(full.parent().unwrap()).await.unwrap();
        tokio::fs::write(full, content).await.unwrap();
    }

    async fn project_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "index.html", "<my-app></my-app>").await;
        write(root, "src/my-app.js", "export class MyApp {}").await;
        write(root, "src/views/view1.js", "export {}").await;
        write(root, "node_modules/lit/index.js", "export const html = 1;").await;
        write(root, "node_modules/.bin/tool", "#!/bin/sh").await;
        write(root, "build/default/index.html", "stale output").await;
        write(root, "README.md", "docs").await;
        dir
    }

    fn paths_of(records: &[FileRecord]) -> Vec<&str> {
        records.iter().map(|r| r.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_sources_and_dependencies_from_project() {
        let dir = project_dir().await;
        let project = ProjectConfig::new(dir.path());
        let source = FsAssetSource::from_project(&project);

        let sources = collect_records(source.sources()).await.unwrap();
        assert_eq!(
            paths_of(&sources),
            vec!["index.html", "src/my-app.js", "src/views/view1.js"]
        );
        assert!(sources.iter().all(|r| r.origin == RecordOrigin::Source));
        assert_eq!(sources[1].text().unwrap(), "export class MyApp {}");

        let deps = collect_records(source.dependencies()).await.unwrap();
        assert_eq!(
            paths_of(&deps),
            vec!["node_modules/.bin/tool", "node_modules/lit/index.js"]
        );
        assert!(deps.iter().all(|r| r.origin == RecordOrigin::Dependency));
    }

    #[tokio::test]
    async fn test_streams_are_independent() {
        let dir = project_dir().await;
        let source = FsAssetSource::from_project(&ProjectConfig::new(dir.path()));
        let first = collect_records(source.sources()).await.unwrap();
        let second = collect_records(source.sources()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_build_output_is_excluded() {
        let dir = project_dir().await;
        let source = FsAssetSource::new(dir.path(), ["**/*.html"], Vec::<String>::new());
        let sources = collect_records(source.sources()).await.unwrap();
        assert_eq!(paths_of(&sources), vec!["index.html"]);
        assert!(collect_records(source.dependencies()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extra_exclusions() {
        let dir = project_dir().await;
        let source = FsAssetSource::new(dir.path(), ["src/**/*"], ["node_modules/**/*"])
            .exclude("src/views/");
        let sources = collect_records(source.sources()).await.unwrap();
        assert_eq!(paths_of(&sources), vec!["src/my-app.js"]);
    }

    #[tokio::test]
    async fn test_missing_root_is_io_error() {
        let source = FsAssetSource::new("/definitely/not/a/project", ["**/*"], ["x"]);
        let err = collect_records(source.sources()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Io);
    }

    #[tokio::test]
    async fn test_invalid_glob_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsAssetSource::new(dir.path(), ["src/[unclosed"], Vec::<String>::new());
        let err = collect_records(source.sources()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }
}
