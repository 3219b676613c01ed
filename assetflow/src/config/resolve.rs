//! Build configuration resolution.
//!
//! Turns a raw [`BuildConfig`] into a [`ResolvedBuild`] before any stage is
//! constructed, so that malformed or contradictory options fail the build
//! eagerly.

use super::{
    BasePathSetting, BuildConfig, BundleSetting, CompileSetting, CssOptions, HtmlOptions,
    ModuleResolution, ProjectConfig,
};
use crate::core::paths;
use crate::errors::{ConfigError, ErrorInfo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Directory under the output root that holds every build.
pub const BUILD_DIRECTORY: &str = "build";

/// Bundler option object handed to the bundler collaborator.
pub type BundlerOptions = serde_json::Map<String, serde_json::Value>;

/// Script compile target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileTarget {
    /// ES5; requires the legacy-syntax adapter.
    Es5,
    /// ES2015.
    Es2015,
}

/// Resolved script options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsOptimizeOptions {
    /// Compile target, if compiling. Serialized as `false` when off.
    #[serde(default, with = "compile_or_false")]
    pub compile: Option<CompileTarget>,
    /// Minify scripts.
    pub minify: bool,
    /// Rewrite ES modules to AMD.
    pub transform_modules_to_amd: bool,
}

/// `compile` on the wire: a target name, or `false` when not compiling.
mod compile_or_false {
    use super::CompileTarget;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Target(CompileTarget),
        Flag(bool),
    }

    #[allow(clippy::trivially_copy_pass_by_ref, clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        target: &Option<CompileTarget>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match target {
            Some(target) => target.serialize(serializer),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<CompileTarget>, D::Error> {
        Ok(match Option::<Wire>::deserialize(deserializer)? {
            Some(Wire::Target(target)) => Some(target),
            Some(Wire::Flag(true)) => Some(CompileTarget::Es5),
            Some(Wire::Flag(false)) | None => None,
        })
    }
}

/// Everything the optimizer collaborator is parameterized by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeOptions {
    /// Markup options.
    pub html: HtmlOptions,
    /// Style options.
    pub css: CssOptions,
    /// Script options.
    pub js: JsOptimizeOptions,
    /// Module resolution mode of the project.
    pub module_resolution: ModuleResolution,
    /// Logical path of the project entrypoint.
    pub entrypoint_path: String,
    /// Project root directory.
    pub root_dir: PathBuf,
}

impl OptimizeOptions {
    /// Returns true if no optimizer operation is requested.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.html.minify
            && !self.css.minify
            && self.js.compile.is_none()
            && !self.js.minify
            && !self.js.transform_modules_to_amd
    }
}

/// A validated build configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBuild {
    /// Build name.
    pub name: String,
    /// Absolute or root-relative destination directory.
    pub output_dir: PathBuf,
    /// Bundler options when bundling is requested.
    pub bundle: Option<BundlerOptions>,
    /// Optimizer options.
    pub optimize: OptimizeOptions,
    /// Whether the legacy-syntax adapter stage is present.
    pub legacy_adapter: bool,
    /// Whether prefetch links are inserted.
    pub insert_prefetch_links: bool,
    /// Normalized base path, when rewriting.
    pub base_path: Option<String>,
    /// Whether the push manifest is generated.
    pub add_push_manifest: bool,
    /// Normalized entrypoint, shell and fragment paths of the project.
    pub entrypoints: Vec<String>,
}

impl ResolvedBuild {
    /// Resolves and validates one build configuration against its project.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the name, compile target, base path or
    /// output path is invalid.
    pub fn resolve(config: &BuildConfig, project: &ProjectConfig) -> Result<Self, ConfigError> {
        let name = config.build_name().to_string();
        if name.trim().is_empty() {
            return Err(ConfigError::new(
                &name,
                "build name cannot be empty or whitespace-only",
                ErrorInfo::new("CONFIG-001-NAME", "Empty build name")
                    .with_fix_hint("Give the build a name or omit the field to use \"default\"."),
            ));
        }

        let js = config.js.clone().unwrap_or_default();
        let compile = resolve_compile(&name, js.compile.as_ref())?;

        let base_path = match &config.base_path {
            Some(setting) => normalize_base_path(setting, &name)
                .map(|path| validate_base_path(&name, path))
                .transpose()?,
            None => None,
        };

        let output_dir = project
            .output_root()
            .join(BUILD_DIRECTORY)
            .join(output_subdirectory(&name, config.output_path.as_deref())?);

        Ok(Self {
            output_dir,
            bundle: config.bundle.as_ref().and_then(bundler_options),
            optimize: OptimizeOptions {
                html: config.html.unwrap_or_default(),
                css: config.css.unwrap_or_default(),
                js: JsOptimizeOptions {
                    compile,
                    minify: js.minify,
                    transform_modules_to_amd: js.transform_modules_to_amd,
                },
                module_resolution: project.module_resolution,
                entrypoint_path: project.entrypoint_path(),
                root_dir: project.root.clone(),
            },
            legacy_adapter: compile == Some(CompileTarget::Es5),
            insert_prefetch_links: config.insert_prefetch_links,
            base_path,
            add_push_manifest: config.add_push_manifest,
            entrypoints: project.entrypoints(),
            name,
        })
    }

    /// Returns true if bundling is requested.
    #[must_use]
    pub fn bundled(&self) -> bool {
        self.bundle.is_some()
    }
}

fn resolve_compile(
    build: &str,
    setting: Option<&CompileSetting>,
) -> Result<Option<CompileTarget>, ConfigError> {
    match setting {
        None | Some(CompileSetting::Flag(false)) => Ok(None),
        Some(CompileSetting::Flag(true)) => Ok(Some(CompileTarget::Es5)),
        Some(CompileSetting::Target(target)) => match target.to_ascii_lowercase().as_str() {
            "es5" => Ok(Some(CompileTarget::Es5)),
            "es2015" | "es6" => Ok(Some(CompileTarget::Es2015)),
            other => Err(ConfigError::new(
                build,
                format!("unknown js.compile target '{other}'"),
                ErrorInfo::new("CONFIG-004-COMPILE_TARGET", "Unsupported compile target")
                    .with_fix_hint("Use true, false, \"es5\" or \"es2015\".")
                    .with_context_entry("target", other),
            )),
        },
    }
}

/// Default bundler options, before user overrides.
#[must_use]
pub fn default_bundler_options() -> BundlerOptions {
    let mut options = BundlerOptions::new();
    options.insert("rewriteUrlsInTemplates".to_string(), serde_json::Value::Bool(true));
    options
}

/// Shallow-merges user bundler options over the defaults; user keys win.
#[must_use]
pub fn merge_bundler_options(user: &BundlerOptions) -> BundlerOptions {
    let mut options = default_bundler_options();
    for (key, value) in user {
        options.insert(key.clone(), value.clone());
    }
    options
}

fn bundler_options(setting: &BundleSetting) -> Option<BundlerOptions> {
    match setting {
        BundleSetting::Flag(false) => None,
        BundleSetting::Flag(true) => Some(default_bundler_options()),
        BundleSetting::Options(user) => Some(merge_bundler_options(user)),
    }
}

/// Applies the base-path normalization rule.
///
/// `true` becomes the build name; the result always starts and ends with `/`.
/// `false` and the empty string mean "do not rewrite".
#[must_use]
pub fn normalize_base_path(setting: &BasePathSetting, build_name: &str) -> Option<String> {
    let mut path = match setting {
        BasePathSetting::Flag(false) => return None,
        BasePathSetting::Flag(true) => build_name.to_string(),
        BasePathSetting::Path(path) if path.is_empty() => return None,
        BasePathSetting::Path(path) => path.clone(),
    };
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if !path.ends_with('/') {
        path.push('/');
    }
    Some(path)
}

fn validate_base_path(build: &str, path: String) -> Result<String, ConfigError> {
    let ambiguous = path.chars().any(|c| c.is_whitespace() || matches!(c, '\\' | '?' | '#'))
        || path.split('/').any(|segment| segment == "..");
    if ambiguous {
        return Err(ConfigError::new(
            build,
            format!("base path '{path}' is ambiguous"),
            ErrorInfo::new("CONFIG-002-BASE_PATH", "Ambiguous base path")
                .with_fix_hint("Use a plain URL path such as \"/app/\".")
                .with_context_entry("basePath", path.clone()),
        ));
    }
    Ok(path)
}

fn output_subdirectory(build: &str, output_path: Option<&str>) -> Result<PathBuf, ConfigError> {
    let raw = output_path.unwrap_or(build);
    let invalid = raw.starts_with('/')
        || raw.contains('\\')
        || raw.split('/').any(|segment| segment == "..")
        || (!raw.is_empty() && raw.split('/').all(|s| s.is_empty() || s == "."))
        || (!raw.is_empty() && !paths::is_safe_relative(raw));
    if invalid {
        return Err(ConfigError::new(
            build,
            format!("output path '{raw}' escapes the build directory"),
            ErrorInfo::new("CONFIG-003-OUTPUT_PATH", "Invalid output path")
                .with_fix_hint("Use a relative path without '..' segments.")
                .with_context_entry("outputPath", raw),
        ));
    }
    Ok(raw.split('/').filter(|s| !s.is_empty() && *s != ".").collect())
}
