//! Source adapters
//!
//! Turn files into [`SourceUnit`]s. Python is parsed with tree-sitter;
//! any other language reaches the engine through a JSON symbol manifest
//! produced by an external extractor.

pub mod manifest;
pub mod python;

pub use manifest::ManifestAdapter;
pub use python::PythonAdapter;

use crate::symbols::{ParseError, SourceAdapter, SourceUnit};
use std::path::Path;
use std::sync::Arc;

/// Get the language name for a file extension
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "py" | "pyi" => Some("python"),
        "ts" | "tsx" => Some("typescript"),
        "js" | "jsx" | "mjs" | "cjs" => Some("javascript"),
        "rs" => Some("rust"),
        "go" => Some("go"),
        "java" => Some("java"),
        "cs" => Some("csharp"),
        "kt" | "kts" => Some("kotlin"),
        "rb" => Some("ruby"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some("cpp"),
        _ => None,
    }
}

/// Ordered list of adapters; the first one that supports a file handles it.
///
/// A language hint naming an adapter (`python`, `manifest`) bypasses
/// extension dispatch.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::empty()
            .with(Arc::new(PythonAdapter))
            .with(Arc::new(ManifestAdapter))
    }
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Adapter for a file, by hint first and extension second
    pub fn resolve(&self, path: &Path, language_hint: Option<&str>) -> Option<&dyn SourceAdapter> {
        if let Some(hint) = language_hint {
            let hint = hint.to_ascii_lowercase();
            if let Some(adapter) = self.adapters.iter().find(|a| a.name() == hint) {
                return Some(adapter.as_ref());
            }
        }
        self.adapters
            .iter()
            .find(|a| a.supports(path))
            .map(|a| a.as_ref())
    }
}

impl SourceAdapter for AdapterRegistry {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn supports(&self, path: &Path) -> bool {
        self.adapters.iter().any(|a| a.supports(path))
    }

    fn parse_source(
        &self,
        path: &Path,
        source: &str,
        language_hint: Option<&str>,
    ) -> Result<SourceUnit, ParseError> {
        match self.resolve(path, language_hint) {
            Some(adapter) => adapter.parse_source(path, source, language_hint),
            None => {
                let language = language_hint
                    .map(str::to_string)
                    .or_else(|| {
                        path.extension()
                            .and_then(|e| e.to_str())
                            .map(|ext| language_for_extension(ext).unwrap_or(ext).to_string())
                    })
                    .unwrap_or_else(|| "unknown".to_string());
                Err(ParseError::UnsupportedLanguage {
                    path: path.to_path_buf(),
                    language,
                })
            }
        }
    }
}
