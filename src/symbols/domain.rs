//! Logical domain inference from file location and naming

use std::path::{Component, Path};

/// Directories that hold sources rather than naming a domain
const SOURCE_ROOTS: &[&str] = &[
    "src", "app", "apps", "lib", "libs", "pkg", "packages", "internal", "source", "sources",
];

/// Directory names that mark code as shared across domains
const SHARED_DIRS: &[&str] = &[
    "shared", "common", "core", "utils", "util", "lib", "libs", "infra", "infrastructure",
];

fn segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str().map(|s| s.to_lowercase()),
            _ => None,
        })
        .collect()
}

/// Infer the logical domain of a file.
///
/// `src/billing/invoice.py` -> `billing`; root-level `billing_service.py`
/// -> `billing`; `main.py` -> none.
pub fn infer_domain(path: &Path) -> Option<String> {
    let segs = segments(path);
    let (file, dirs) = segs.split_last()?;

    if let Some(dir) = dirs.iter().find(|d| !SOURCE_ROOTS.contains(&d.as_str())) {
        return Some(dir.clone());
    }

    let stem = file.split('.').next().unwrap_or(file);
    match stem.split_once('_') {
        Some((prefix, _)) if prefix.len() > 2 => Some(prefix.to_string()),
        _ => None,
    }
}

/// Whether the file lives under a shared/common location
pub fn is_shared_location(path: &Path) -> bool {
    let segs = segments(path);
    match segs.split_last() {
        Some((_, dirs)) => dirs.iter().any(|d| SHARED_DIRS.contains(&d.as_str())),
        None => false,
    }
}
