use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::error::{PennyError, Result};
use crate::models::CategoryPair;
use crate::normalizer::normalize_merchant;

/// Shortest shared prefix that counts as a "similar" merchant.
const SIMILAR_PREFIX_MIN: usize = 4;

/// Older stores kept each entry as a `[category, subcategory]` pair.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Pair(CategoryPair),
    Legacy(String, String),
}

impl From<StoredEntry> for CategoryPair {
    fn from(entry: StoredEntry) -> Self {
        match entry {
            StoredEntry::Pair(p) => p,
            StoredEntry::Legacy(c, s) => CategoryPair::new(c, s),
        }
    }
}

/// Durable merchant -> (category, subcategory) history.
#[derive(Debug, Clone)]
pub struct MappingStore {
    path: PathBuf,
    entries: BTreeMap<String, CategoryPair>,
}

impl MappingStore {
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the store; a missing or empty file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let mut store = Self::empty(path);
        if !path.exists() {
            debug!("no mapping store at {}, starting empty", path.display());
            return Ok(store);
        }
        let content = std::fs::read_to_string(path).map_err(|e| PennyError::StoreCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if content.trim().is_empty() {
            return Ok(store);
        }
        let raw: BTreeMap<String, StoredEntry> =
            serde_json::from_str(&content).map_err(|e| PennyError::StoreCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        for (merchant, entry) in raw {
            let key = normalize_merchant(&merchant);
            if key.is_empty() {
                warn!("ignoring mapping with empty merchant name");
                continue;
            }
            if store.entries.insert(key.clone(), entry.into()).is_some() {
                warn!("mapping entries collide after normalization: '{key}'");
            }
        }
        info!(entries = store.entries.len(), "loaded mapping store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lookup(&self, merchant: &str) -> Option<&CategoryPair> {
        self.entries.get(&normalize_merchant(merchant))
    }

    /// Record or replace an entry. Whether the target exists in the Template is
    /// the conflict detector's concern, not the store's.
    pub fn upsert(&mut self, merchant: &str, pair: CategoryPair) -> Option<CategoryPair> {
        self.entries.insert(normalize_merchant(merchant), pair)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &CategoryPair)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive exact match, else the entry sharing the longest prefix
    /// (at least four characters) with `merchant`.
    pub fn find_similar(&self, merchant: &str) -> Option<(&String, &CategoryPair)> {
        let wanted: Vec<char> = normalize_merchant(merchant).to_uppercase().chars().collect();
        if wanted.is_empty() {
            return None;
        }
        let mut best: Option<((&String, &CategoryPair), usize)> = None;
        for (name, pair) in &self.entries {
            let existing: Vec<char> = name.to_uppercase().chars().collect();
            if existing == wanted {
                return Some((name, pair));
            }
            let common = existing
                .iter()
                .zip(wanted.iter())
                .take_while(|(a, b)| a == b)
                .count();
            if common >= SIMILAR_PREFIX_MIN && best.map_or(true, |(_, len)| common > len) {
                best = Some(((name, pair), common));
            }
        }
        best.map(|(entry, _)| entry)
    }

    /// Persist the full mapping atomically.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(&self.path, format!("{json}\n").as_bytes())?;
        info!(entries = self.entries.len(), "mapping store saved to {}", self.path.display());
        Ok(())
    }
}
