// 🏪 Store Registry - canonical store list + automatic key index
//
// "Store id is IDENTITY (never changes), name/address are VALUES used to find it"
//
// The registry is a GeoJSON FeatureCollection. Each feature's properties carry
// at least store_id, name, address. The document is kept as raw JSON so that
// geometry, coordinates and any unknown properties survive a rewrite with
// their original order.

use crate::normalize::NormalizedKey;
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

// ============================================================================
// STORE ENTRY
// ============================================================================

/// Identity-relevant view of one registry feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Empty when the feature carries no usable id
    pub store_id: String,
    pub name: String,
    pub address: String,
}

impl StoreEntry {
    pub fn key(&self) -> NormalizedKey {
        NormalizedKey::new(&self.name, &self.address)
    }

    fn from_properties(props: Option<&Map<String, Value>>) -> Self {
        let text = |field: &str| props.and_then(|p| p.get(field)).map(value_text).unwrap_or_default();
        StoreEntry {
            store_id: text("store_id"),
            name: text("name"),
            address: text("address"),
        }
    }
}

/// Strings as-is, numbers via their JSON text, everything else empty.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

// ============================================================================
// STORE REGISTRY
// ============================================================================

/// Canonical registry loaded from GeoJSON, mutable in place by the scorer.
#[derive(Debug, Clone)]
pub struct StoreRegistry {
    document: Value,
}

impl StoreRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open registry {}", path.display()))?;
        let document: Value = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse registry {}", path.display()))?;
        Self::from_value(document)
            .with_context(|| format!("Invalid registry {}", path.display()))
    }

    /// Accepts any JSON object; a missing `features` member is an empty registry.
    pub fn from_value(mut document: Value) -> Result<Self> {
        let obj = document
            .as_object_mut()
            .ok_or_else(|| anyhow!("registry root is not a JSON object"))?;
        match obj.get("features") {
            None => {
                obj.insert("features".to_string(), Value::Array(Vec::new()));
            }
            Some(Value::Array(_)) => {}
            Some(_) => return Err(anyhow!("registry `features` is not an array")),
        }
        Ok(StoreRegistry { document })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &self.document)?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn features(&self) -> &[Value] {
        self.document
            .get("features")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// One entry per feature, in document order.
    pub fn entries(&self) -> Vec<StoreEntry> {
        self.features()
            .iter()
            .map(|f| StoreEntry::from_properties(f.get("properties").and_then(Value::as_object)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.features().len()
    }

    pub fn is_empty(&self) -> bool {
        self.features().is_empty()
    }

    /// Mutable properties of the feature at `index`, created if absent.
    pub fn properties_mut(&mut self, index: usize) -> Option<&mut Map<String, Value>> {
        let feature = self
            .document
            .get_mut("features")
            .and_then(Value::as_array_mut)?
            .get_mut(index)?
            .as_object_mut()?;

        let props = feature
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        if !props.is_object() {
            *props = Value::Object(Map::new());
        }
        props.as_object_mut()
    }

    pub fn as_value(&self) -> &Value {
        &self.document
    }

    /// Build the automatic name+address → store id index.
    pub fn build_index(&self) -> StoreIndex {
        StoreIndex::from_entries(&self.entries())
    }
}

// ============================================================================
// STORE INDEX
// ============================================================================

/// NormalizedKey → store id.
///
/// On a key collision the later registry entry overwrites the earlier one.
/// Collisions are counted but not treated as errors.
#[derive(Debug, Clone, Default)]
pub struct StoreIndex {
    map: HashMap<NormalizedKey, String>,
    overwritten: usize,
}

impl StoreIndex {
    pub fn from_entries(entries: &[StoreEntry]) -> Self {
        let mut index = StoreIndex::default();
        for entry in entries {
            index.insert(entry.key(), &entry.store_id);
        }
        index
    }

    /// Entries without a store id are skipped.
    pub fn insert(&mut self, key: NormalizedKey, store_id: &str) {
        if store_id.is_empty() {
            return;
        }
        if let Some(previous) = self.map.insert(key.clone(), store_id.to_string()) {
            if previous != store_id {
                debug!(key = %key, previous = %previous, store_id, "registry key overwritten");
            }
            self.overwritten += 1;
        }
    }

    pub fn get(&self, key: &NormalizedKey) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// How many inserts replaced an existing key.
    pub fn overwritten(&self) -> usize {
        self.overwritten
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
