//! Declarative stage plan.
//!
//! A [`StagePlan`] is computed once from a [`ResolvedBuild`] and lists the
//! stages a build runs, in their fixed relative order. Optional stages that
//! were not requested are simply absent.

use crate::config::{BundlerOptions, OptimizeOptions, ResolvedBuild};
use serde::Serialize;
use std::fmt;

/// One stage position in the build pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "slot", rename_all = "snake_case")]
pub enum StageSlot {
    /// Legacy-syntax adapter, for ES5 output.
    LegacyAdapter,
    /// Bundler with merged options.
    Bundler {
        /// Options handed to the bundler.
        options: BundlerOptions,
    },
    /// Document splitter.
    Split,
    /// Optimizer.
    Optimize {
        /// Options handed to the optimizer.
        options: OptimizeOptions,
    },
    /// Document rejoiner.
    Rejoin,
    /// Prefetch-link inserter.
    PrefetchLinks {
        /// Documents that receive links.
        entrypoints: Vec<String>,
    },
    /// Base-path rewriter.
    BasePath {
        /// The document whose `<base>` tag is rewritten.
        entrypoint: String,
        /// The normalized base path.
        base_path: String,
    },
    /// Push-manifest generator.
    PushManifest {
        /// Documents listed in the manifest.
        entrypoints: Vec<String>,
    },
}

impl StageSlot {
    /// Position of the slot in the pipeline; later slots have higher ranks.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Self::LegacyAdapter => 0,
            Self::Bundler { .. } => 1,
            Self::Split => 2,
            Self::Optimize { .. } => 3,
            Self::Rejoin => 4,
            Self::PrefetchLinks { .. } => 5,
            Self::BasePath { .. } => 6,
            Self::PushManifest { .. } => 7,
        }
    }

    /// Short name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::LegacyAdapter => "legacy-adapter",
            Self::Bundler { .. } => "bundler",
            Self::Split => "split",
            Self::Optimize { .. } => "optimize",
            Self::Rejoin => "rejoin",
            Self::PrefetchLinks { .. } => "prefetch-links",
            Self::BasePath { .. } => "base-path",
            Self::PushManifest { .. } => "push-manifest",
        }
    }

    /// Returns true for stages that every build runs.
    #[must_use]
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Split | Self::Optimize { .. } | Self::Rejoin)
    }
}

impl fmt::Display for StageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The ordered stage slots of one build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePlan {
    /// Build name.
    pub build: String,
    /// Slots in pipeline order.
    pub slots: Vec<StageSlot>,
}

impl StagePlan {
    /// Derives the plan for a resolved build.
    #[must_use]
    pub fn from_resolved(build: &ResolvedBuild) -> Self {
        let mut slots = Vec::with_capacity(8);
        if build.legacy_adapter {
            slots.push(StageSlot::LegacyAdapter);
        }
        if let Some(options) = &build.bundle {
            slots.push(StageSlot::Bundler {
                options: options.clone(),
            });
        }
        slots.push(StageSlot::Split);
        slots.push(StageSlot::Optimize {
            options: build.optimize.clone(),
        });
        slots.push(StageSlot::Rejoin);
        if build.insert_prefetch_links {
            slots.push(StageSlot::PrefetchLinks {
                entrypoints: build.entrypoints.clone(),
            });
        }
        if let Some(base_path) = &build.base_path {
            slots.push(StageSlot::BasePath {
                entrypoint: build.optimize.entrypoint_path.clone(),
                base_path: base_path.clone(),
            });
        }
        if build.add_push_manifest {
            slots.push(StageSlot::PushManifest {
                entrypoints: build.entrypoints.clone(),
            });
        }
        Self {
            build: build.name.clone(),
            slots,
        }
    }

    /// Slot names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.slots.iter().map(StageSlot::name).collect()
    }

    /// Returns true if the plan contains a slot with this name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.slots.iter().any(|slot| slot.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BasePathSetting, BuildConfig, BundleSetting, JsOptions, ProjectConfig};
    use pretty_assertions::assert_eq;

    fn plan(config: BuildConfig) -> StagePlan {
        let resolved = ResolvedBuild::resolve(&config, &ProjectConfig::new("/project")).unwrap();
        StagePlan::from_resolved(&resolved)
    }

    #[test]
    fn test_minimal_plan() {
        let plan = plan(BuildConfig::default());
        assert_eq!(plan.build, "default");
        assert_eq!(plan.names(), vec!["split", "optimize", "rejoin"]);
        assert!(plan.slots.iter().all(StageSlot::is_required));
    }

    #[test]
    fn test_full_plan_order() {
        let config = BuildConfig::named("es5-bundled")
            .with_js(JsOptions::compile("es5"))
            .with_bundle(BundleSetting::Flag(true))
            .with_prefetch_links()
            .with_base_path(BasePathSetting::Flag(true))
            .with_push_manifest();
        let plan = plan(config);
        assert_eq!(
            plan.names(),
            vec![
                "legacy-adapter",
                "bundler",
                "split",
                "optimize",
                "rejoin",
                "prefetch-links",
                "base-path",
                "push-manifest"
            ]
        );
        let ranks: Vec<u8> = plan.slots.iter().map(StageSlot::rank).collect();
        assert!(ranks.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            plan.slots[6],
            StageSlot::BasePath {
                entrypoint: "index.html".to_string(),
                base_path: "/es5-bundled/".to_string(),
            }
        );
    }

    #[test]
    fn test_es2015_has_no_legacy_adapter() {
        let plan = plan(BuildConfig::named("modern").with_js(JsOptions::compile("es2015")));
        assert!(!plan.contains("legacy-adapter"));
    }

    #[test]
    fn test_bundle_false_has_no_bundler() {
        let plan = plan(BuildConfig::default().with_bundle(BundleSetting::Flag(false)));
        assert!(!plan.contains("bundler"));
    }

    #[test]
    fn test_bundler_options_are_merged() {
        let mut user = serde_json::Map::new();
        user.insert("inlineCss".into(), serde_json::json!(true));
        let plan = plan(BuildConfig::default().with_bundle(BundleSetting::Options(user)));
        let StageSlot::Bundler { options } = &plan.slots[0] else {
            panic!("expected bundler slot first, got {:?}", plan.slots[0]);
        };
        assert_eq!(options.get("rewriteUrlsInTemplates"), Some(&serde_json::json!(true)));
        assert_eq!(options.get("inlineCss"), Some(&serde_json::json!(true)));
    }
}
