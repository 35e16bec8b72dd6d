//! On-disk prompt cache.
//!
//! Generated domain prompts are expensive (several LLM calls), so they are
//! cached in a JSON file keyed by the schema content hash. A schema change
//! produces a new hash and forces regeneration; identical schemas always
//! hit the cache, across processes and restarts.

use crate::error::{PilotError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// One cached prompt with generation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPrompt {
    pub prompt: String,
    /// Unix timestamp of generation.
    pub generated_at: u64,
    pub domain: String,
    pub total_tables: usize,
}

/// File-backed prompt cache keyed by schema hash.
#[derive(Debug)]
pub struct PromptCache {
    path: PathBuf,
    entries: BTreeMap<String, CachedPrompt>,
}

impl PromptCache {
    /// Opens the cache at the default location
    /// (`<state dir>/sqlpilot/prompt_cache.json`).
    pub fn open_default() -> Result<Self> {
        let dir = dirs::state_dir()
            .or_else(dirs::cache_dir)
            .ok_or_else(|| PilotError::config("Could not determine state directory"))?
            .join("sqlpilot");
        Self::open(dir.join("prompt_cache.json"))
    }

    /// Opens (or creates) a cache file at the given path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt prompt cache, starting fresh");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        if !entries.is_empty() {
            info!(prompts = entries.len(), "Loaded cached prompts");
        }
        Ok(Self { path, entries })
    }

    /// Looks up the prompt generated for a schema hash.
    pub fn get(&self, schema_hash: &str) -> Option<&CachedPrompt> {
        let hit = self.entries.get(schema_hash);
        debug!(
            hash = &schema_hash[..schema_hash.len().min(8)],
            hit = hit.is_some(),
            "Prompt cache lookup"
        );
        hit
    }

    /// Stores a generated prompt and persists the cache to disk.
    pub fn put(
        &mut self,
        schema_hash: impl Into<String>,
        prompt: impl Into<String>,
        domain: impl Into<String>,
        total_tables: usize,
    ) -> Result<()> {
        let generated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.entries.insert(
            schema_hash.into(),
            CachedPrompt {
                prompt: prompt.into(),
                generated_at,
                domain: domain.into(),
                total_tables,
            },
        );
        self.save()
    }

    /// Number of cached prompts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PilotError::config(format!(
                    "Could not create cache directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| PilotError::internal(format!("Failed to serialize prompt cache: {}", e)))?;
        std::fs::write(&self.path, json).map_err(|e| {
            PilotError::config(format!(
                "Could not write prompt cache {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_and_get() {
        let dir = tempdir().unwrap();
        let mut cache = PromptCache::open(dir.path().join("cache.json")).unwrap();

        assert!(cache.get("abc123").is_none());
        cache
            .put("abc123", "the prompt", "financial_services", 10)
            .unwrap();

        let cached = cache.get("abc123").unwrap();
        assert_eq!(cached.prompt, "the prompt");
        assert_eq!(cached.domain, "financial_services");
        assert_eq!(cached.total_tables, 10);
    }

    #[test]
    fn test_cache_persists_across_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        {
            let mut cache = PromptCache::open(&path).unwrap();
            cache.put("hash1", "prompt one", "e_commerce", 4).unwrap();
        }

        let reopened = PromptCache::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("hash1").unwrap().prompt, "prompt one");
    }

    #[test]
    fn test_corrupt_cache_starts_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();

        let cache = PromptCache::open(&path).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_file_is_empty_cache() {
        let dir = tempdir().unwrap();
        let cache = PromptCache::open(dir.path().join("nope.json")).unwrap();
        assert!(cache.is_empty());
    }
}
