//! Collaborator seams: optimizer, bundler and legacy-syntax adapter.
//!
//! The pipeline decides *which* of these run and in what order; what they do
//! to a record is theirs. Minifiers, compilers and bundlers plug in here.

use crate::config::{BundlerOptions, OptimizeOptions};
use crate::core::{ContentKind, FileRecord};
use crate::errors::{BuildResult, ConfigError, ErrorInfo};
use crate::events::{EventSink, LoggingEventSink};
use crate::stages::{Chain, Es5AdapterInjector, Identity, RecordTransform, Stage, TransformStage};
use crate::stream::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default number of records in flight inside one transform stage.
pub const DEFAULT_TRANSFORM_CONCURRENCY: usize = 4;

/// Builds the optimizer stage for one build.
pub trait Optimizer: Send + Sync {
    /// Returns one composed stage configured by `options`.
    fn stage(&self, options: &OptimizeOptions) -> BuildResult<Arc<dyn Stage>>;

    /// Like [`Optimizer::stage`], with the toolchain's default for how many
    /// records each transform keeps in flight. Optimizers that do not run
    /// records concurrently ignore it.
    fn stage_with_concurrency(
        &self,
        options: &OptimizeOptions,
        concurrency: usize,
    ) -> BuildResult<Arc<dyn Stage>> {
        let _ = concurrency;
        self.stage(options)
    }
}

/// Builds the bundler stage for one build.
#[cfg_attr(test, mockall::automock)]
pub trait Bundler: Send + Sync {
    /// Returns a stage configured by the merged bundler options.
    fn stage(&self, options: &BundlerOptions) -> BuildResult<Arc<dyn Stage>>;
}

/// An optimizer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeOp {
    /// Compile scripts down to a target.
    CompileJs,
    /// Rewrite ES modules to AMD.
    ModulesToAmd,
    /// Minify scripts.
    MinifyJs,
    /// Minify styles.
    MinifyCss,
    /// Minify markup.
    MinifyHtml,
}

impl OptimizeOp {
    /// Content kind the operation applies to.
    #[must_use]
    pub fn kind(self) -> ContentKind {
        match self {
            Self::CompileJs | Self::ModulesToAmd | Self::MinifyJs => ContentKind::Script,
            Self::MinifyCss => ContentKind::Style,
            Self::MinifyHtml => ContentKind::Markup,
        }
    }

    /// The operations `options` asks for, in the order they run.
    #[must_use]
    pub fn requested(options: &OptimizeOptions) -> Vec<Self> {
        let js = &options.js;
        [
            (Self::CompileJs, js.compile.is_some()),
            (Self::ModulesToAmd, js.transform_modules_to_amd),
            (Self::MinifyJs, js.minify),
            (Self::MinifyCss, options.css.minify),
            (Self::MinifyHtml, options.html.minify),
        ]
        .into_iter()
        .filter_map(|(op, on)| on.then_some(op))
        .collect()
    }
}

impl fmt::Display for OptimizeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CompileJs => "js.compile",
            Self::ModulesToAmd => "js.transformModulesToAmd",
            Self::MinifyJs => "js.minify",
            Self::MinifyCss => "css.minify",
            Self::MinifyHtml => "html.minify",
        };
        f.write_str(name)
    }
}

/// Creates a transform for one build's options.
pub type TransformFactory =
    Arc<dyn Fn(&OptimizeOptions) -> Arc<dyn RecordTransform> + Send + Sync>;

/// Routes records by kind through registered per-operation transforms.
///
/// Scripts run compile, then AMD conversion, then minification; styles and
/// markup run their minifier. Requesting an operation nobody registered is a
/// configuration error.
#[derive(Clone, Default)]
pub struct StandardOptimizer {
    transforms: HashMap<OptimizeOp, TransformFactory>,
    concurrency: Option<usize>,
}

impl fmt::Debug for StandardOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ops: Vec<String> = self.transforms.keys().map(ToString::to_string).collect();
        ops.sort();
        f.debug_struct("StandardOptimizer")
            .field("operations", &ops)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl StandardOptimizer {
    /// Creates an optimizer with no operations registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fixed transform for `op`.
    #[must_use]
    pub fn with_transform(self, op: OptimizeOp, transform: Arc<dyn RecordTransform>) -> Self {
        self.with_factory(op, Arc::new(move |_: &OptimizeOptions| transform.clone()))
    }

    /// Registers a transform built from each build's options.
    #[must_use]
    pub fn with_factory(mut self, op: OptimizeOp, factory: TransformFactory) -> Self {
        self.transforms.insert(op, factory);
        self
    }

    /// Sets how many records each transform processes concurrently,
    /// overriding the toolchain's [`PipelineSettings::transform_concurrency`].
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Returns true if a transform is registered for `op`.
    #[must_use]
    pub fn supports(&self, op: OptimizeOp) -> bool {
        self.transforms.contains_key(&op)
    }
}

impl Optimizer for StandardOptimizer {
    fn stage(&self, options: &OptimizeOptions) -> BuildResult<Arc<dyn Stage>> {
        self.stage_with_concurrency(options, DEFAULT_TRANSFORM_CONCURRENCY)
    }

    fn stage_with_concurrency(
        &self,
        options: &OptimizeOptions,
        concurrency: usize,
    ) -> BuildResult<Arc<dyn Stage>> {
        let concurrency = self.concurrency.unwrap_or(concurrency);
        let requested = OptimizeOp::requested(options);
        if requested.is_empty() {
            return Ok(Arc::new(Identity::new("optimize")));
        }

        let mut chain = Chain::new();
        for op in requested {
            let factory = self.transforms.get(&op).ok_or_else(|| {
                ConfigError::new(
                    "optimize",
                    format!("'{op}' is enabled but no optimizer transform is registered for it"),
                    ErrorInfo::new("CONFIG-006-MISSING_COLLABORATOR", "Missing optimizer transform")
                        .with_fix_hint("Register a transform with StandardOptimizer::with_transform.")
                        .with_context_entry("operation", op.to_string()),
                )
            })?;
            let scoped = KindScoped {
                kind: op.kind(),
                inner: factory(options),
            };
            let stage = TransformStage::new(Arc::new(scoped)).with_concurrency(concurrency);
            chain = chain.then(Arc::new(stage));
        }
        Ok(Arc::new(chain))
    }
}

/// Restricts a transform to records of one kind.
#[derive(Debug)]
struct KindScoped {
    kind: ContentKind,
    inner: Arc<dyn RecordTransform>,
}

#[async_trait]
impl RecordTransform for KindScoped {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn accepts(&self, record: &FileRecord) -> bool {
        record.kind == self.kind && self.inner.accepts(record)
    }

    async fn transform(&self, record: FileRecord) -> BuildResult<FileRecord> {
        self.inner.transform(record).await
    }
}

/// Tunables for the streaming machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    /// Capacity of every bounded hand-off channel.
    pub channel_capacity: usize,
    /// Records in flight inside one transform stage.
    pub transform_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            transform_concurrency: DEFAULT_TRANSFORM_CONCURRENCY,
        }
    }
}

/// Everything a build needs besides its configuration.
#[derive(Clone)]
pub struct Toolchain {
    /// Optimizer collaborator.
    pub optimizer: Arc<dyn Optimizer>,
    /// Bundler collaborator, if any.
    pub bundler: Option<Arc<dyn Bundler>>,
    /// Replacement for the built-in legacy-syntax adapter.
    pub legacy_adapter: Option<Arc<dyn Stage>>,
    /// Where lifecycle events go.
    pub events: Arc<dyn EventSink>,
    /// Streaming tunables.
    pub settings: PipelineSettings,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            optimizer: Arc::new(StandardOptimizer::new()),
            bundler: None,
            legacy_adapter: None,
            events: Arc::new(LoggingEventSink::default()),
            settings: PipelineSettings::default(),
        }
    }
}

impl fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolchain")
            .field("has_bundler", &self.bundler.is_some())
            .field("legacy_adapter", &self.legacy_adapter.as_ref().map(|s| s.name().to_string()))
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Toolchain {
    /// Creates a toolchain with the default optimizer and no bundler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the optimizer.
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: Arc<dyn Optimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the bundler.
    #[must_use]
    pub fn with_bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = Some(bundler);
        self
    }

    /// Replaces the built-in legacy-syntax adapter.
    #[must_use]
    pub fn with_legacy_adapter(mut self, adapter: Arc<dyn Stage>) -> Self {
        self.legacy_adapter = Some(adapter);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the streaming tunables.
    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The legacy-syntax adapter stage: the override, or the built-in
    /// custom-elements ES5 adapter injector.
    #[must_use]
    pub fn legacy_adapter_stage(&self) -> Arc<dyn Stage> {
        self.legacy_adapter
            .clone()
            .unwrap_or_else(|| Arc::new(Es5AdapterInjector::stage()))
    }

    /// Builds the optimizer stage, running each transform with
    /// [`PipelineSettings::transform_concurrency`] records in flight unless
    /// the optimizer sets its own.
    ///
    /// # Errors
    ///
    /// Fails if the optimizer rejects the options.
    pub fn optimizer_stage(&self, options: &OptimizeOptions) -> BuildResult<Arc<dyn Stage>> {
        self.optimizer
            .stage_with_concurrency(options, self.settings.transform_concurrency)
    }

    /// Builds the bundler stage.
    ///
    /// # Errors
    ///
    /// Fails if no bundler is registered or the bundler rejects the options.
    pub fn bundler_stage(&self, build: &str, options: &BundlerOptions) -> BuildResult<Arc<dyn Stage>> {
        let Some(bundler) = &self.bundler else {
            return Err(ConfigError::new(
                build,
                "bundling is enabled but no bundler is registered",
                ErrorInfo::new("CONFIG-006-MISSING_COLLABORATOR", "Missing bundler")
                    .with_fix_hint("Register one with Toolchain::with_bundler or set \"bundle\": false."),
            )
            .into());
        };
        bundler.stage(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildConfig, CompileTarget, JsOptions, ProjectConfig, ResolvedBuild};
    use crate::errors::BuildError;
    use crate::stages::FnTransform;
    use crate::stream::{collect_records, from_records};
    use crate::testing::SlowTransform;
    use pretty_assertions::assert_eq;

    fn options(config: BuildConfig) -> OptimizeOptions {
        ResolvedBuild::resolve(&config, &ProjectConfig::new("/p"))
            .unwrap()
            .optimize
    }

    fn tag(label: &'static str) -> Arc<dyn RecordTransform> {
        Arc::new(FnTransform::new(label, move |mut record: FileRecord| {
            let text = format!("{}|{label}", record.text()?);
            record.set_text(text);
            Ok(record)
        }))
    }

    #[test]
    fn test_requested_operations_in_order() {
        let opts = options(BuildConfig::named("x").with_js(JsOptions {
            minify: true,
            transform_modules_to_amd: true,
            ..JsOptions::compile("es5")
        }));
        assert_eq!(
            OptimizeOp::requested(&opts),
            vec![OptimizeOp::CompileJs, OptimizeOp::ModulesToAmd, OptimizeOp::MinifyJs]
        );
        assert!(OptimizeOp::requested(&options(BuildConfig::default())).is_empty());
    }

    #[tokio::test]
    async fn test_standard_optimizer_routes_by_kind() {
        let optimizer = StandardOptimizer::new()
            .with_transform(OptimizeOp::CompileJs, tag("es5"))
            .with_transform(OptimizeOp::MinifyJs, tag("min"))
            .with_transform(OptimizeOp::MinifyCss, tag("css"))
            .with_concurrency(2);
        let mut config = BuildConfig::named("x").with_js(JsOptions {
            minify: true,
            ..JsOptions::compile("es5")
        });
        config.css = Some(crate::config::CssOptions { minify: true });

        let stage = optimizer.stage(&options(config)).unwrap();
        let input = vec![
            FileRecord::source("a.js", "a"),
            FileRecord::source("b.css", "b"),
            FileRecord::source("c.html", "c"),
        ];
        let out = collect_records(stage.apply(from_records(input))).await.unwrap();
        let texts: Vec<&str> = out.iter().map(|r| r.text().unwrap()).collect();
        assert_eq!(texts, vec!["a|es5|min", "b|css", "c"]);
    }

    #[test]
    fn test_no_operations_is_identity() {
        let stage = StandardOptimizer::new()
            .stage(&options(BuildConfig::default()))
            .unwrap();
        assert!(stage.is_identity());
    }

    #[test]
    fn test_unregistered_operation_is_config_error() {
        let err = StandardOptimizer::new()
            .stage(&options(BuildConfig::named("x").with_js(JsOptions::compile("es2015"))))
            .unwrap_err();
        assert!(matches!(&err, BuildError::Config(e) if e.code() == "CONFIG-006-MISSING_COLLABORATOR"));
    }

    #[test]
    fn test_factory_sees_build_options() {
        let optimizer = StandardOptimizer::new().with_factory(
            OptimizeOp::CompileJs,
            Arc::new(|opts: &OptimizeOptions| {
                let label = match opts.js.compile {
                    Some(CompileTarget::Es5) => "to-es5",
                    _ => "to-es2015",
                };
                tag(label)
            }),
        );
        let stage = optimizer
            .stage(&options(BuildConfig::named("x").with_js(JsOptions::compile("es5"))))
            .unwrap();
        assert_eq!(stage.name(), "chain");
        assert!(optimizer.supports(OptimizeOp::CompileJs));
        assert!(!optimizer.supports(OptimizeOp::MinifyHtml));
    }

    async fn peak_in_flight(toolchain: Toolchain, slow: &SlowTransform) -> usize {
        let opts = options(BuildConfig::named("x").with_js(JsOptions {
            minify: true,
            ..JsOptions::default()
        }));
        let stage = toolchain.optimizer_stage(&opts).unwrap();
        let input: Vec<FileRecord> = (0..12)
            .map(|i| FileRecord::source(format!("f{i}.js"), "x"))
            .collect();
        let out = collect_records(stage.apply(from_records(input))).await.unwrap();
        assert_eq!(out.len(), 12);
        slow.peak_in_flight()
    }

    #[tokio::test]
    async fn test_settings_bound_transform_concurrency() {
        let slow = SlowTransform::with_delay_ms("js-minify", 15);
        let optimizer = StandardOptimizer::new()
            .with_transform(OptimizeOp::MinifyJs, Arc::new(slow.clone()));
        let toolchain = Toolchain::new()
            .with_optimizer(Arc::new(optimizer))
            .with_settings(PipelineSettings {
                transform_concurrency: 3,
                ..PipelineSettings::default()
            });
        assert_eq!(peak_in_flight(toolchain, &slow).await, 3);
    }

    #[tokio::test]
    async fn test_optimizer_concurrency_overrides_settings() {
        let slow = SlowTransform::with_delay_ms("js-minify", 15);
        let optimizer = StandardOptimizer::new()
            .with_transform(OptimizeOp::MinifyJs, Arc::new(slow.clone()))
            .with_concurrency(1);
        let toolchain = Toolchain::new()
            .with_optimizer(Arc::new(optimizer))
            .with_settings(PipelineSettings {
                transform_concurrency: 8,
                ..PipelineSettings::default()
            });
        assert_eq!(peak_in_flight(toolchain, &slow).await, 1);
    }

    #[test]
    fn test_bundler_stage_requires_bundler() {
        let err = Toolchain::new()
            .bundler_stage("default", &crate::config::default_bundler_options())
            .unwrap_err();
        assert_eq!(
            err.error_info().map(|i| i.code.as_str()),
            Some("CONFIG-006-MISSING_COLLABORATOR")
        );
    }

    #[test]
    fn test_bundler_receives_merged_options() {
        let mut bundler = MockBundler::new();
        bundler
            .expect_stage()
            .withf(|opts| opts.get("rewriteUrlsInTemplates") == Some(&serde_json::json!(true)))
            .times(1)
            .returning(|_| Ok(Arc::new(Identity::new("bundle"))));

        let toolchain = Toolchain::new().with_bundler(Arc::new(bundler));
        let stage = toolchain
            .bundler_stage("default", &crate::config::default_bundler_options())
            .unwrap();
        assert_eq!(stage.name(), "bundle");
    }

    #[test]
    fn test_legacy_adapter_default_and_override() {
        let toolchain = Toolchain::new();
        assert_eq!(toolchain.legacy_adapter_stage().name(), "es5-adapter");

        let toolchain = toolchain.with_legacy_adapter(Arc::new(Identity::new("custom-adapter")));
        assert_eq!(toolchain.legacy_adapter_stage().name(), "custom-adapter");
    }
}
