//! Test fixtures for build testing.

use crate::config::{BuildConfig, JsOptions, ProjectConfig};
use crate::core::FileRecord;
use crate::source::AssetSource;
use crate::stream::{from_records, RecordStream};
use std::path::Path;
use std::sync::Arc;

/// An asset source serving fixed record lists.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    sources: Arc<Vec<FileRecord>>,
    dependencies: Arc<Vec<FileRecord>>,
}

impl MemorySource {
    /// Creates a source serving `sources` and `dependencies`.
    #[must_use]
    pub fn new(sources: Vec<FileRecord>, dependencies: Vec<FileRecord>) -> Self {
        Self {
            sources: Arc::new(sources),
            dependencies: Arc::new(dependencies),
        }
    }

    /// Adds a project source record.
    #[must_use]
    pub fn with_source(mut self, path: &str, content: &str) -> Self {
        Arc::make_mut(&mut self.sources).push(FileRecord::source(path, content));
        self
    }

    /// Adds a dependency record.
    #[must_use]
    pub fn with_dependency(mut self, path: &str, content: &str) -> Self {
        Arc::make_mut(&mut self.dependencies).push(FileRecord::dependency(path, content));
        self
    }
}

impl AssetSource for MemorySource {
    fn sources(&self) -> RecordStream {
        from_records(self.sources.as_ref().clone())
    }

    fn dependencies(&self) -> RecordStream {
        from_records(self.dependencies.as_ref().clone())
    }
}

/// A small app compiled to ES5: an entrypoint with one inline script that
/// loads the web components polyfill, plus one module.
#[must_use]
pub fn es5_project(root: &Path) -> (ProjectConfig, BuildConfig, MemorySource) {
    let index = "<!doctype html>\n\
                 <html>\n\
                 <head>\n  \
                 <script src=\"node_modules/@webcomponents/webcomponentsjs/webcomponents-loader.js\"></script>\n  \
                 <script>window.app = { ready: true };</script>\n\
                 </head>\n\
                 <body><script src=\"app.js\"></script></body>\n\
                 </html>\n";
    let source = MemorySource::default()
        .with_source("index.html", index)
        .with_source("app.js", "class App extends HTMLElement {}");
    let build = BuildConfig::named("default").with_js(JsOptions::compile("es5"));
    (ProjectConfig::new(root).with_build(build.clone()), build, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::collect_records;

    #[tokio::test]
    async fn test_memory_source_streams_are_independent() {
        let source = MemorySource::default()
            .with_source("index.html", "<p>")
            .with_dependency("node_modules/x.js", "x");
        let first = collect_records(source.sources()).await.unwrap();
        let second = collect_records(source.sources()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(collect_records(source.dependencies()).await.unwrap().len(), 1);
    }

    #[test]
    fn test_es5_project_fixture() {
        let (project, build, _) = es5_project(Path::new("/app"));
        assert_eq!(project.build, build);
        assert_eq!(build.build_name(), "default");
    }

    #[test]
    fn test_es5_project_sources() {
        let (_, _, source) = es5_project(Path::new("/app"));
        let records = tokio_test::block_on(collect_records(source.sources())).unwrap();
        let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["index.html", "app.js"]);
        assert!(tokio_test::block_on(collect_records(source.dependencies())).unwrap().is_empty());
    }
}
