//! Symbol cache
//!
//! Parsed [`SourceUnit`]s keyed by relative path and the xxh3 hash of the
//! file content. A re-scan of an unchanged file skips the adapter entirely.
//! Entries for files a complete scan did not visit are dropped before saving.
//!
//! ```ignore
//! let cache = Arc::new(SymbolCache::open(root));
//! let adapter = Arc::new(CachingAdapter::new(registry, Arc::clone(&cache)));
//! let result = evaluator.scan_path(root, adapter, &excludes)?;
//! if !result.incomplete {
//!     cache.retain_seen();
//! }
//! cache.save()?;
//! ```

use crate::symbols::{ParseError, SourceAdapter, SourceUnit};
use anyhow::{Context, Result};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Cache directory, relative to the scan root
pub const CACHE_DIR: &str = ".stricture/cache";

const CACHE_FILE: &str = "symbols.json";

/// Cache format version - bump when the symbol model changes
const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedUnit {
    hash: u64,
    unit: SourceUnit,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheData {
    version: u32,
    units: BTreeMap<String, CachedUnit>,
}

/// Hit/miss counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

pub struct SymbolCache {
    file: Option<PathBuf>,
    units: DashMap<String, CachedUnit>,
    /// Keys looked up or stored during this run
    seen: DashSet<String>,
    dirty: AtomicBool,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl SymbolCache {
    /// Where the cache for `root` lives on disk
    pub fn cache_path(root: &Path) -> PathBuf {
        root.join(CACHE_DIR).join(CACHE_FILE)
    }

    /// Cache with no backing file
    pub fn in_memory() -> Self {
        Self {
            file: None,
            units: DashMap::new(),
            seen: DashSet::new(),
            dirty: AtomicBool::new(false),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Load the cache for `root`. A missing, unreadable or outdated cache
    /// file yields an empty cache.
    pub fn open(root: &Path) -> Self {
        let file = Self::cache_path(root);
        let mut cache = Self::in_memory();

        match Self::load(&file) {
            Ok(Some(units)) => {
                debug!("Loaded symbol cache with {} units", units.len());
                cache.units = units.into_iter().collect();
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable symbol cache {}: {:#}", file.display(), e),
        }

        cache.file = Some(file);
        cache
    }

    fn load(file: &Path) -> Result<Option<BTreeMap<String, CachedUnit>>> {
        if !file.exists() {
            debug!("No symbol cache at {}", file.display());
            return Ok(None);
        }

        let reader = BufReader::new(File::open(file).context("Failed to open symbol cache")?);
        let data: CacheData =
            serde_json::from_reader(reader).context("Failed to parse symbol cache")?;

        if data.version != CACHE_VERSION {
            info!(
                "Symbol cache version mismatch (got {}, expected {}), rebuilding",
                data.version, CACHE_VERSION
            );
            return Ok(None);
        }
        Ok(Some(data.units))
    }

    pub fn content_hash(source: &str) -> u64 {
        xxh3_64(source.as_bytes())
    }

    fn key(path: &Path) -> String {
        path.to_string_lossy().replace('\\', "/")
    }

    /// Cached unit for `path`, if its content hash still matches
    pub fn get(&self, path: &Path, hash: u64) -> Option<SourceUnit> {
        let key = Self::key(path);
        let hit = self
            .units
            .get(&key)
            .filter(|cached| cached.hash == hash)
            .map(|cached| cached.unit.clone());
        let counter = if hit.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        self.seen.insert(key);
        hit
    }

    pub fn insert(&self, path: &Path, hash: u64, unit: SourceUnit) {
        let key = Self::key(path);
        self.seen.insert(key.clone());
        self.units.insert(key, CachedUnit { hash, unit });
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Drop entries not looked up this run (deleted, renamed or newly
    /// excluded files). Returns how many were dropped.
    pub fn retain_seen(&self) -> usize {
        let before = self.units.len();
        self.units.retain(|key, _| self.seen.contains(key));
        let pruned = before - self.units.len();
        if pruned > 0 {
            debug!("Pruned {} stale symbol cache entries", pruned);
            self.dirty.store(true, Ordering::Relaxed);
        }
        pruned
    }

    pub fn remove(&self, path: &Path) {
        if self.units.remove(&Self::key(path)).is_some() {
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.units.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Persist to disk if anything changed. Writes a temp file then renames
    /// it over the old cache.
    pub fn save(&self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        if !self.dirty.load(Ordering::Relaxed) {
            return Ok(());
        }

        if let Some(dir) = file.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let data = CacheData {
            version: CACHE_VERSION,
            units: self
                .units
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        };

        let tmp_file = file.with_extension("tmp");
        let writer =
            BufWriter::new(File::create(&tmp_file).context("Failed to create temp cache file")?);
        serde_json::to_writer(writer, &data).context("Failed to write symbol cache")?;
        fs::rename(&tmp_file, file).context("Failed to rename temp cache")?;

        self.dirty.store(false, Ordering::Relaxed);
        debug!("Saved symbol cache with {} units", data.units.len());
        Ok(())
    }
}

/// Wraps an adapter with the symbol cache: unchanged content is served from
/// the cache, everything else is parsed and stored.
pub struct CachingAdapter {
    inner: Arc<dyn SourceAdapter>,
    cache: Arc<SymbolCache>,
}

impl CachingAdapter {
    pub fn new(inner: Arc<dyn SourceAdapter>, cache: Arc<SymbolCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &SymbolCache {
        &self.cache
    }
}

impl SourceAdapter for CachingAdapter {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn supports(&self, path: &Path) -> bool {
        self.inner.supports(path)
    }

    fn parse_source(
        &self,
        path: &Path,
        source: &str,
        language_hint: Option<&str>,
    ) -> Result<SourceUnit, ParseError> {
        let hash = SymbolCache::content_hash(source);
        if let Some(unit) = self.cache.get(path, hash) {
            return Ok(unit);
        }

        match self.inner.parse_source(path, source, language_hint) {
            Ok(unit) => {
                self.cache.insert(path, hash, unit.clone());
                Ok(unit)
            }
            Err(e) => {
                self.cache.remove(path);
                Err(e)
            }
        }
    }
}
