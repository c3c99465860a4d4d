//! JSON symbol manifests
//!
//! Languages without a built-in adapter are analysed from a manifest written
//! by an external extractor: `lib/net.go.symbols.json` holds the serialized
//! [`SourceUnit`] for `lib/net.go`.

use crate::symbols::{infer_domain, ParseError, SourceAdapter, SourceUnit};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const MANIFEST_SUFFIX: &str = ".symbols.json";

pub struct ManifestAdapter;

impl ManifestAdapter {
    /// Source path a manifest describes (`a/b.go.symbols.json` -> `a/b.go`)
    pub fn described_path(manifest: &Path) -> Option<PathBuf> {
        let name = manifest.file_name()?.to_str()?;
        let stem = name.strip_suffix(MANIFEST_SUFFIX)?;
        if stem.is_empty() {
            return None;
        }
        Some(manifest.with_file_name(stem))
    }
}

impl SourceAdapter for ManifestAdapter {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn supports(&self, path: &Path) -> bool {
        Self::described_path(path).is_some()
    }

    fn parse_source(
        &self,
        path: &Path,
        source: &str,
        _language_hint: Option<&str>,
    ) -> Result<SourceUnit, ParseError> {
        let failure = |line: usize, message: String| ParseError::ParseFailure {
            path: path.to_path_buf(),
            line: line as u32,
            message,
        };

        let mut value: Value =
            serde_json::from_str(source).map_err(|e| failure(e.line(), e.to_string()))?;
        let Some(object) = value.as_object_mut() else {
            return Err(failure(1, "manifest must be a JSON object".to_string()));
        };

        if !object.contains_key("path") {
            let described = Self::described_path(path).unwrap_or_else(|| path.to_path_buf());
            object.insert(
                "path".to_string(),
                Value::String(described.to_string_lossy().replace('\\', "/")),
            );
        }

        let mut unit: SourceUnit =
            serde_json::from_value(value).map_err(|e| failure(1, e.to_string()))?;
        if unit.domain.is_none() {
            unit.domain = infer_domain(&unit.path);
        }
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SideEffectKind;

    #[test]
    fn test_supports_manifest_suffix() {
        assert!(ManifestAdapter.supports(Path::new("lib/net.go.symbols.json")));
        assert!(!ManifestAdapter.supports(Path::new("lib/net.go")));
        assert!(!ManifestAdapter.supports(Path::new("package.json")));
        assert!(!ManifestAdapter.supports(Path::new(".symbols.json")));
    }

    #[test]
    fn test_path_derived_from_manifest_name() {
        let manifest = r#"{
            "language": "go",
            "line_count": 120,
            "callables": [{
                "name": "Fetch",
                "line_start": 10,
                "line_end": 30,
                "side_effects": [
                    {"kind": "network", "target": "http.Get", "line": 12, "method": "GET"}
                ]
            }]
        }"#;
        let unit = ManifestAdapter
            .parse_source(Path::new("src/billing/net.go.symbols.json"), manifest, None)
            .expect("valid manifest");

        assert_eq!(unit.path, PathBuf::from("src/billing/net.go"));
        assert_eq!(unit.language, "go");
        assert_eq!(unit.domain.as_deref(), Some("billing"));
        assert_eq!(unit.callables[0].side_effects[0].kind, SideEffectKind::Network);
    }

    #[test]
    fn test_explicit_path_wins() {
        let manifest = r#"{"path": "pkg/orders/api.rb", "language": "ruby", "line_count": 3}"#;
        let unit = ManifestAdapter
            .parse_source(Path::new("manifests/x.symbols.json"), manifest, None)
            .expect("valid manifest");
        assert_eq!(unit.path, PathBuf::from("pkg/orders/api.rb"));
    }

    #[test]
    fn test_invalid_manifest_is_parse_failure() {
        let err = ManifestAdapter
            .parse_source(Path::new("a.go.symbols.json"), "{\n  \"language\": ", None)
            .expect_err("truncated json");
        assert!(matches!(err, ParseError::ParseFailure { line: 2, .. }));

        let err = ManifestAdapter
            .parse_source(Path::new("a.go.symbols.json"), "[1, 2]", None)
            .expect_err("not an object");
        assert!(matches!(err, ParseError::ParseFailure { .. }));
        assert_eq!(err.path(), Path::new("a.go.symbols.json"));
    }
}
