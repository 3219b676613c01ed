//! Raw build configuration as written in a project file.
//!
//! Field names follow the camelCase keys of `polymer.json` build entries.
//! Nothing here is validated; see [`super::ResolvedBuild`] for that.

use serde::{Deserialize, Serialize};

/// Options for one named build target, exactly as configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Build name; defaults to `"default"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Output subdirectory under `build/`, overriding the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Whether to bundle, or bundler-specific options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleSetting>,
    /// Script optimizer options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js: Option<JsOptions>,
    /// Markup optimizer options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<HtmlOptions>,
    /// Style optimizer options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<CssOptions>,
    /// Insert prefetch links into entrypoint documents.
    #[serde(default)]
    pub insert_prefetch_links: bool,
    /// Rewrite the entrypoint's `<base href>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<BasePathSetting>,
    /// Emit `push-manifest.json`.
    #[serde(default)]
    pub add_push_manifest: bool,
}

impl BuildConfig {
    /// Creates a configuration with a name and every option off.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Sets the output path override.
    #[must_use]
    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Sets the bundle option.
    #[must_use]
    pub fn with_bundle(mut self, bundle: BundleSetting) -> Self {
        self.bundle = Some(bundle);
        self
    }

    /// Sets the script options.
    #[must_use]
    pub fn with_js(mut self, js: JsOptions) -> Self {
        self.js = Some(js);
        self
    }

    /// Sets the markup options.
    #[must_use]
    pub fn with_html(mut self, html: HtmlOptions) -> Self {
        self.html = Some(html);
        self
    }

    /// Sets the style options.
    #[must_use]
    pub fn with_css(mut self, css: CssOptions) -> Self {
        self.css = Some(css);
        self
    }

    /// Enables prefetch link insertion.
    #[must_use]
    pub fn with_prefetch_links(mut self) -> Self {
        self.insert_prefetch_links = true;
        self
    }

    /// Sets the base path option.
    #[must_use]
    pub fn with_base_path(mut self, base_path: BasePathSetting) -> Self {
        self.base_path = Some(base_path);
        self
    }

    /// Enables the push manifest.
    #[must_use]
    pub fn with_push_manifest(mut self) -> Self {
        self.add_push_manifest = true;
        self
    }

    /// The configured name, or `"default"`.
    #[must_use]
    pub fn build_name(&self) -> &str {
        self.name.as_deref().unwrap_or("default")
    }
}

/// `bundle: true | false | { ...bundler options }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleSetting {
    /// Plain on/off switch.
    Flag(bool),
    /// Bundler options; implies bundling.
    Options(serde_json::Map<String, serde_json::Value>),
}

/// `js.compile: true | false | "es5" | "es2015"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompileSetting {
    /// `true` means ES5.
    Flag(bool),
    /// A named target.
    Target(String),
}

/// `basePath: true | false | "path"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BasePathSetting {
    /// `true` means the build name.
    Flag(bool),
    /// An explicit path.
    Path(String),
}

/// Script optimizer options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsOptions {
    /// Compile target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<CompileSetting>,
    /// Minify scripts.
    #[serde(default)]
    pub minify: bool,
    /// Rewrite ES modules to AMD.
    #[serde(default)]
    pub transform_modules_to_amd: bool,
}

impl JsOptions {
    /// Options that compile to the given target.
    #[must_use]
    pub fn compile(target: impl Into<String>) -> Self {
        Self {
            compile: Some(CompileSetting::Target(target.into())),
            ..Self::default()
        }
    }
}

/// Markup optimizer options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlOptions {
    /// Minify markup.
    #[serde(default)]
    pub minify: bool,
}

/// Style optimizer options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssOptions {
    /// Minify styles.
    #[serde(default)]
    pub minify: bool,
}
