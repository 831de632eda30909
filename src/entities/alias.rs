// 🔗 Store Aliases - manual overrides for spellings the index can't join
//
// File: alias_name, alias_address, store_id
// Lookups consult this table before the automatic registry index.

use crate::normalize::NormalizedKey;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    #[serde(default)]
    pub alias_name: String,
    #[serde(default)]
    pub alias_address: String,
    #[serde(default)]
    pub store_id: String,
}

impl AliasEntry {
    pub fn key(&self) -> NormalizedKey {
        NormalizedKey::new(&self.alias_name, &self.alias_address)
    }
}

/// NormalizedKey → store id, curated by hand.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    map: HashMap<NormalizedKey, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later rows override earlier ones; rows without a store id are ignored.
    pub fn from_entries(entries: impl IntoIterator<Item = AliasEntry>) -> Self {
        let mut table = AliasTable::new();
        for entry in entries {
            if entry.store_id.trim().is_empty() {
                continue;
            }
            table.map.insert(entry.key(), entry.store_id);
        }
        table
    }

    /// The alias file is optional: a missing file is an empty table.
    pub fn load_optional(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no alias file");
            return Ok(AliasTable::new());
        }

        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open alias file {}", path.display()))?;
        let mut entries = Vec::new();
        for result in rdr.deserialize::<AliasEntry>() {
            entries.push(result.with_context(|| {
                format!("Failed to read alias row in {}", path.display())
            })?);
        }
        Ok(AliasTable::from_entries(entries))
    }

    pub fn get(&self, key: &NormalizedKey) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
