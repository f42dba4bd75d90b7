//! Mapping sources and the shared mapping cache

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::error::MappingError;
use crate::mapping::ScraperMapping;

/// Where mapping documents come from.
pub trait MappingSource: Send + Sync {
    fn load(&self, name: &str) -> Result<ScraperMapping, MappingError>;
}

/// Reads `<root>/<name>.json`, tolerating comments and trailing commas.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MappingSource for DirectorySource {
    fn load(&self, name: &str) -> Result<ScraperMapping, MappingError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(MappingError::NotFound(name.to_string()));
        }

        let path = self.root.join(format!("{name}.json"));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MappingError::NotFound(name.to_string()));
            }
            Err(source) => return Err(MappingError::Io { path, source }),
        };

        ScraperMapping::from_json_lenient(name, &text)
    }
}

/// Loaded mappings by portal name. Entries are write-once; readers share
/// them as `Arc`s.
#[derive(Debug)]
pub struct MappingCache {
    entries: RwLock<HashMap<String, CachedMapping>>,
}

#[derive(Debug)]
struct CachedMapping {
    mapping: Arc<ScraperMapping>,
    loaded_at: Instant,
}

impl MappingCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ScraperMapping>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(name).map(|cached| Arc::clone(&cached.mapping))
    }

    /// Store `mapping` unless `name` is already cached; returns the entry
    /// that ends up in the cache.
    pub fn insert(&self, name: &str, mapping: ScraperMapping) -> Arc<ScraperMapping> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let cached = entries.entry(name.to_string()).or_insert_with(|| CachedMapping {
            mapping: Arc::new(mapping),
            loaded_at: Instant::now(),
        });
        Arc::clone(&cached.mapping)
    }

    /// Cached mapping, loading it from `source` on first use.
    pub fn get_or_load(
        &self,
        name: &str,
        source: &dyn MappingSource,
    ) -> Result<Arc<ScraperMapping>, MappingError> {
        if let Some(mapping) = self.get(name) {
            return Ok(mapping);
        }

        // Loaded outside the lock; a concurrent loader may win the insert.
        let mapping = source.load(name)?;
        tracing::debug!(mapping = name, "mapping loaded");
        Ok(self.insert(name, mapping))
    }

    /// Drop every entry. Returns how many were cached.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        tracing::info!(count, "mapping cache cleared");
        count
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached names with their age, sorted by name.
    pub fn entries(&self) -> Vec<(String, Duration)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut listed: Vec<_> = entries
            .iter()
            .map(|(name, cached)| (name.clone(), cached.loaded_at.elapsed()))
            .collect();
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        listed
    }
}

impl Default for MappingCache {
    fn default() -> Self {
        Self::new()
    }
}
