//! Project facade: the entry points that run builds.

use crate::config::{BuildConfig, ProjectConfig, ResolvedBuild};
use crate::errors::{BuildError, BuildResult, ConfigError, ErrorInfo};
use crate::pipeline::{BuildReport, CompletionGate, DirectorySink, PipelineBuilder, StagePlan};
use crate::source::{AssetSource, FsAssetSource};
use crate::stages::{Chain, Stage};
use crate::stream::{self, RecordStream};
use crate::toolchain::Toolchain;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A project together with the collaborators that build it.
#[derive(Clone)]
pub struct Project {
    config: ProjectConfig,
    toolchain: Toolchain,
    source: Arc<dyn AssetSource>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("root", &self.config.root)
            .field("toolchain", &self.toolchain)
            .finish_non_exhaustive()
    }
}

impl Project {
    /// Creates a project reading its files from disk.
    #[must_use]
    pub fn new(config: ProjectConfig, toolchain: Toolchain) -> Self {
        let source = Arc::new(FsAssetSource::from_project(&config));
        Self {
            config,
            toolchain,
            source,
        }
    }

    /// Replaces the asset source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn AssetSource>) -> Self {
        self.source = source;
        self
    }

    /// The project configuration.
    #[must_use]
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// The toolchain.
    #[must_use]
    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Resolves one build configuration against this project.
    ///
    /// # Errors
    ///
    /// Returns the configuration error, if any.
    pub fn resolve(&self, build: &BuildConfig) -> BuildResult<ResolvedBuild> {
        Ok(ResolvedBuild::resolve(build, &self.config)?)
    }

    /// Starts one build and returns its completion gate.
    ///
    /// Configuration errors are returned before anything is read. Must be
    /// called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns configuration and collaborator errors.
    pub fn build(&self, build: &BuildConfig) -> BuildResult<CompletionGate> {
        let (resolved, chain) = self.prepare(build)?;
        let capacity = self.toolchain.settings.channel_capacity;
        let sources = stream::isolate(self.source.sources(), capacity);
        let dependencies = stream::isolate(self.source.dependencies(), capacity);
        Ok(self.start(&resolved, &chain, sources, dependencies))
    }

    /// Runs several builds concurrently over one read of the project files.
    ///
    /// Returns one result per configuration, in order; a failing build does
    /// not affect its siblings.
    ///
    /// # Errors
    ///
    /// Fails as a whole only when two builds would write to overlapping
    /// output directories.
    pub async fn build_all(&self, builds: &[BuildConfig]) -> BuildResult<Vec<BuildResult<BuildReport>>> {
        let prepared: Vec<BuildResult<(ResolvedBuild, Chain)>> =
            builds.iter().map(|build| self.prepare(build)).collect();
        check_output_collisions(prepared.iter().filter_map(|p| p.as_ref().ok()).map(|(r, _)| r))?;

        let ready = prepared.iter().filter(|p| p.is_ok()).count();
        let capacity = self.toolchain.settings.channel_capacity;
        let mut sources = stream::fork(self.source.sources(), ready, capacity).into_iter();
        let mut dependencies = stream::fork(self.source.dependencies(), ready, capacity).into_iter();
        debug!(builds = builds.len(), ready, "Starting builds");

        let gates: Vec<BuildResult<CompletionGate>> = prepared
            .into_iter()
            .map(|prepared| {
                let (resolved, chain) = prepared?;
                match (sources.next(), dependencies.next()) {
                    (Some(s), Some(d)) => Ok(self.start(&resolved, &chain, s, d)),
                    _ => Err(BuildError::Internal(format!(
                        "no isolated input left for build '{}'",
                        resolved.name
                    ))),
                }
            })
            .collect();

        Ok(join_all(gates.into_iter().map(|gate| async move { gate?.wait().await })).await)
    }

    /// Runs every build the project configuration lists.
    ///
    /// # Errors
    ///
    /// See [`Project::build_all`].
    pub async fn build_configured(&self) -> BuildResult<Vec<BuildResult<BuildReport>>> {
        self.build_all(&self.config.build_configs()).await
    }

    fn prepare(&self, build: &BuildConfig) -> BuildResult<(ResolvedBuild, Chain)> {
        let prepared = self.resolve(build).and_then(|resolved| {
            let plan = StagePlan::from_resolved(&resolved);
            let chain = PipelineBuilder::from_plan(&plan, &self.toolchain)?.build();
            Ok((resolved, chain))
        });
        if let Err(err) = &prepared {
            error!(build = build.build_name(), error = %err, "Build configuration rejected");
        }
        prepared
    }

    fn start(
        &self,
        resolved: &ResolvedBuild,
        chain: &Chain,
        sources: RecordStream,
        dependencies: RecordStream,
    ) -> CompletionGate {
        info!(
            build = %resolved.name,
            output = %resolved.output_dir.display(),
            stages = ?chain.stage_names(),
            "Starting build"
        );
        let records = chain.apply(stream::merge(sources, dependencies));
        CompletionGate::spawn(
            &resolved.name,
            records,
            DirectorySink::new(&resolved.output_dir),
            self.toolchain.events.clone(),
        )
    }
}

fn check_output_collisions<'a>(builds: impl Iterator<Item = &'a ResolvedBuild>) -> BuildResult<()> {
    let mut claimed: Vec<&ResolvedBuild> = Vec::new();
    for build in builds {
        if let Some(other) = claimed.iter().find(|other| {
            other.output_dir.starts_with(&build.output_dir) || build.output_dir.starts_with(&other.output_dir)
        }) {
            return Err(ConfigError::new(
                &build.name,
                format!(
                    "output directory '{}' overlaps with build '{}'",
                    build.output_dir.display(),
                    other.name
                ),
                ErrorInfo::new("CONFIG-005-OUTPUT_COLLISION", "Builds share an output directory")
                    .with_fix_hint("Give each build a distinct name or outputPath.")
                    .with_context_entry("other_build", other.name.clone())
                    .with_context_entry("output_dir", build.output_dir.display().to_string()),
            )
            .into());
        }
        claimed.push(build);
    }
    Ok(())
}

/// Builds the project's `build` configuration from disk and waits for it.
///
/// # Errors
///
/// Returns the first configuration, pipeline data or I/O error of the build.
pub async fn build_project(config: ProjectConfig, toolchain: Toolchain) -> BuildResult<BuildReport> {
    let build = config.build.clone();
    Project::new(config, toolchain).build(&build)?.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BasePathSetting;
    use crate::core::FileRecord;
    use crate::testing::MemorySource;
    use pretty_assertions::assert_eq;

    fn project(root: &std::path::Path) -> Project {
        let source = MemorySource::new(
            vec![
                FileRecord::source("index.html", "<base href=\"/\"><script>var a = 1;</script>"),
                FileRecord::source("src/app.js", "export {};"),
            ],
            vec![FileRecord::dependency("node_modules/lib/index.js", "export const lib = 1;")],
        );
        Project::new(ProjectConfig::new(root), Toolchain::new()).with_source(Arc::new(source))
    }

    #[tokio::test]
    async fn test_single_build_writes_under_build_name() {
        let dir = tempfile::tempdir().unwrap();
        let report = project(dir.path())
            .build(&BuildConfig::named("default"))
            .unwrap()
            .wait()
            .await
            .unwrap();

        let mut files = report.files.clone();
        files.sort();
        assert_eq!(files, vec!["index.html", "node_modules/lib/index.js", "src/app.js"]);
        assert_eq!(report.output_dir, dir.path().join("build").join("default"));
        let index = tokio::fs::read_to_string(report.output_dir.join("index.html")).await.unwrap();
        assert_eq!(index, "<base href=\"/\"><script>var a = 1;</script>");
    }

    #[tokio::test]
    async fn test_config_error_reported_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let err = project(dir.path())
            .build(&BuildConfig::named("x").with_base_path(BasePathSetting::Path("a b".into())))
            .unwrap_err();
        assert_eq!(err.error_info().map(|i| i.code.as_str()), Some("CONFIG-002-BASE_PATH"));
        assert!(!dir.path().join("build").exists());
    }

    #[tokio::test]
    async fn test_colliding_outputs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let builds = [
            BuildConfig::named("one").with_output_path("shared"),
            BuildConfig::named("two").with_output_path("shared/nested"),
        ];
        let err = project(dir.path()).build_all(&builds).await.unwrap_err();
        assert_eq!(err.error_info().map(|i| i.code.as_str()), Some("CONFIG-005-OUTPUT_COLLISION"));
    }

    #[tokio::test]
    async fn test_build_all_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let builds = [
            BuildConfig::named("good"),
            BuildConfig::named(" "),
            BuildConfig::named("also-good").with_base_path(BasePathSetting::Flag(true)),
        ];
        let results = project(dir.path()).build_all(&builds).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        let also_good = results[2].as_ref().unwrap();
        let index = std::fs::read_to_string(also_good.output_dir.join("index.html")).unwrap();
        assert!(index.starts_with("<base href=\"/also-good/\">"));
    }

    #[tokio::test]
    async fn test_build_project_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("index.html"), "<h1>home</h1>").await.unwrap();
        let config = ProjectConfig::new(dir.path()).with_build(BuildConfig::named("site"));
        let report = build_project(config, Toolchain::new()).await.unwrap();
        assert_eq!(report.files, vec!["index.html"]);
        assert!(dir.path().join("build/site/index.html").exists());
    }
}
