//! Cross-File Index
//!
//! Repository-wide facts built in one pass after every file has been
//! extracted. [`IndexBuilder`] accumulates per-unit summaries; `build()`
//! consumes it and returns the read-only [`CrossFileIndex`] that index rules
//! see. Rules never observe a partially built index.

use crate::metrics::UnitMetrics;
use crate::symbols::{is_shared_location, EdgeTarget, SourceUnit, StructuralCategory};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

/// Source-root directory names stripped when deriving module names
const MODULE_ROOTS: &[&str] = &["src", "lib", "app"];

/// Stats for one directory that directly contains scanned files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    /// Number of path components below the scan root
    pub depth: usize,
    pub file_count: usize,
    pub total_lines: u32,
}

/// A top-level callable definition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Definition {
    pub path: PathBuf,
    pub name: String,
    pub line: u32,
    pub domain: Option<String>,
    pub shared: bool,
}

/// A callable that hand-rolls retry logic
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RetryImplementation {
    pub path: PathBuf,
    pub callable: String,
    pub line: u32,
}

#[derive(Debug, Default)]
struct UnitEntry {
    path: PathBuf,
    line_count: u32,
    domain: Option<String>,
    definitions: Vec<(String, u32)>,
    /// Identifiers this unit references (call names, imported symbols)
    references: BTreeSet<String>,
    unit_edges: BTreeSet<PathBuf>,
    module_edges: BTreeSet<String>,
    local_retry: Vec<(String, u32)>,
}

/// Accumulates per-unit facts; order of `add` calls does not matter
#[derive(Debug, Default)]
pub struct IndexBuilder {
    entries: Vec<UnitEntry>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, unit: &SourceUnit, metrics: &UnitMetrics) {
        let definitions = unit
            .callables
            .iter()
            .filter(|c| c.category == StructuralCategory::Logic && !c.name.contains('.'))
            .map(|c| (c.name.clone(), c.line_start))
            .collect();

        let mut references = BTreeSet::new();
        for call in unit.callables.iter().flat_map(|c| c.calls.iter()) {
            references.insert(call.short_name().to_string());
        }

        let mut unit_edges = BTreeSet::new();
        let mut module_edges = BTreeSet::new();
        for edge in &unit.dependencies {
            references.extend(edge.symbols.iter().cloned());
            match &edge.target {
                EdgeTarget::Unit(path) => {
                    unit_edges.insert(path.clone());
                }
                EdgeTarget::External(module) => {
                    module_edges.insert(module.clone());
                }
            }
        }

        self.entries.push(UnitEntry {
            path: unit.path.clone(),
            line_count: unit.line_count,
            domain: unit.domain.clone(),
            definitions,
            references,
            unit_edges,
            module_edges,
            local_retry: metrics.local_retry.clone(),
        });
    }

    /// Finish the index. Consumes the builder so no unit can be added after
    /// rules start reading.
    pub fn build(mut self) -> CrossFileIndex {
        self.entries.sort_by(|a, b| a.path.cmp(&b.path));

        let mut index = CrossFileIndex::default();

        let mut modules: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in &self.entries {
            index.units.insert(entry.path.clone(), entry.domain.clone());
            for name in module_names(&entry.path) {
                modules.entry(name).or_insert_with(|| entry.path.clone());
            }

            if let Some(dir) = entry.path.parent() {
                let stats = index.directories.entry(dir.to_path_buf()).or_default();
                stats.depth = path_depth(dir);
                stats.file_count += 1;
                stats.total_lines += entry.line_count;
            }

            for (name, line) in &entry.definitions {
                index
                    .definitions
                    .entry(name.clone())
                    .or_default()
                    .push(Definition {
                        path: entry.path.clone(),
                        name: name.clone(),
                        line: *line,
                        domain: entry.domain.clone(),
                        shared: is_shared_location(&entry.path),
                    });
            }

            for reference in &entry.references {
                index
                    .references
                    .entry(reference.clone())
                    .or_default()
                    .insert(entry.path.clone());
            }

            for (callable, line) in &entry.local_retry {
                index.retry_implementations.push(RetryImplementation {
                    path: entry.path.clone(),
                    callable: callable.clone(),
                    line: *line,
                });
            }
        }

        for entry in &self.entries {
            let resolved = entry
                .module_edges
                .iter()
                .filter_map(|m| resolve_module(&modules, m))
                .chain(entry.unit_edges.iter().cloned());
            for target in resolved {
                if target != entry.path {
                    index
                        .dependents
                        .entry(target)
                        .or_default()
                        .insert(entry.path.clone());
                }
            }
        }

        index.retry_implementations.sort();
        index
    }
}

/// Read-only repository-wide facts
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrossFileIndex {
    /// Every indexed unit and its domain
    pub units: BTreeMap<PathBuf, Option<String>>,
    /// Identifier -> units referencing it
    pub references: BTreeMap<String, BTreeSet<PathBuf>>,
    /// Identifier -> top-level definitions
    pub definitions: BTreeMap<String, Vec<Definition>>,
    pub directories: BTreeMap<PathBuf, DirectoryStats>,
    pub retry_implementations: Vec<RetryImplementation>,
    /// Unit -> units that import it
    pub dependents: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl CrossFileIndex {
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Number of distinct units referencing `identifier`
    pub fn fan_in(&self, identifier: &str) -> usize {
        self.references.get(identifier).map_or(0, BTreeSet::len)
    }

    /// Distinct units other than `defined_in` that reference the definition,
    /// by name or by importing its module
    pub fn users_of(&self, definition: &Definition) -> BTreeSet<&Path> {
        let by_name = self
            .references
            .get(&definition.name)
            .into_iter()
            .flatten();
        by_name
            .filter(|p| **p != definition.path)
            .map(PathBuf::as_path)
            .collect()
    }

    pub fn dependents_of(&self, path: &Path) -> usize {
        self.dependents.get(path).map_or(0, BTreeSet::len)
    }

    /// Units implementing retry locally, one entry per unit
    pub fn retry_units(&self) -> BTreeMap<&Path, &RetryImplementation> {
        let mut units = BTreeMap::new();
        for imp in &self.retry_implementations {
            units.entry(imp.path.as_path()).or_insert(imp);
        }
        units
    }

    pub fn domain_of(&self, path: &Path) -> Option<&str> {
        self.units.get(path).and_then(|d| d.as_deref())
    }
}

fn normal_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str().map(str::to_string),
            _ => None,
        })
        .collect()
}

fn path_depth(dir: &Path) -> usize {
    normal_components(dir).len()
}

/// Dotted module names a unit answers to: `src/billing/invoice.py` is both
/// `src.billing.invoice` and `billing.invoice`; a package `__init__` also
/// answers to its directory.
fn module_names(path: &Path) -> Vec<String> {
    let mut parts = normal_components(&path.with_extension(""));
    if parts.last().is_some_and(|p| p == "__init__" || p == "index" || p == "mod") {
        parts.pop();
    }
    if parts.is_empty() {
        return Vec::new();
    }

    let mut names = vec![parts.join(".")];
    if parts.len() > 1 && MODULE_ROOTS.contains(&parts[0].as_str()) {
        names.push(parts[1..].join("."));
    }
    names
}

fn resolve_module(modules: &BTreeMap<String, PathBuf>, module: &str) -> Option<PathBuf> {
    let normalized = module
        .trim_start_matches('.')
        .replace(['/', ':'], ".")
        .replace("..", ".");
    modules.get(&normalized).cloned()
}
