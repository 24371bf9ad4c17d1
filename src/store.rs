//! Persistent metadata store: one JSON object per account mapping entry
//! identifier to the raw entry document.
//!
//! Raw documents are stored rather than flattened ones so that later versions
//! of the flatten table can pick up fields without refetching; flattening
//! happens on read through [`MetadataEntry::from_raw`].

use crate::entity::MetadataEntry;
use crate::error::Result;
use crate::types::MediaId;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// In-memory image of an account's metadata file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl MetadataStore {
    /// An empty store that persists to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the store at `path`.
    ///
    /// A missing file, or one that does not parse as a JSON object, yields an
    /// empty store; the next flush replaces it.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::empty(path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not read metadata store, starting empty");
                return Self::empty(path);
            }
        };

        match serde_json::from_slice::<BTreeMap<String, Value>>(&raw) {
            Ok(entries) => Self { path, entries },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Malformed metadata store, starting empty");
                Self::empty(path)
            }
        }
    }

    /// File this store persists to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw document for one identifier
    pub fn get(&self, id: &MediaId) -> Option<&Value> {
        self.entries.get(id.as_str())
    }

    /// Raw documents keyed by identifier
    pub fn raw_entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    /// Flattened entries in identifier order
    pub fn entries(&self) -> impl Iterator<Item = MetadataEntry> + '_ {
        self.entries.values().map(MetadataEntry::from_raw)
    }

    /// Merge a keyed batch; incoming values replace existing ones per key.
    pub fn merge(&mut self, batch: BTreeMap<String, Value>) {
        self.entries.extend(batch);
    }

    /// Key a page of raw entries by their `_id` and merge them.
    ///
    /// Entries without a usable `_id` are skipped. Returns the number merged.
    pub fn merge_page(&mut self, entries: Vec<Value>) -> usize {
        let keyed = key_by_id(entries);
        let merged = keyed.len();
        self.merge(keyed);
        merged
    }

    /// Write the whole store to disk, pretty-printed.
    pub async fn persist(&self) -> Result<()> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.entries.serialize(&mut serializer)?;
        crate::utils::write_atomic(&self.path, &out).await
    }

    /// Identifier → value of one flattened attribute, skipping entries
    /// where it is absent.
    pub fn attribute_values(&self, attribute: &str) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .filter_map(|(id, raw)| {
                MetadataEntry::from_raw(raw)
                    .attribute(attribute)
                    .map(|value| (id.clone(), value))
            })
            .collect()
    }
}

/// Key raw entries by `_id` (strings kept as-is, numbers stringified)
pub fn key_by_id(entries: Vec<Value>) -> BTreeMap<String, Value> {
    let mut keyed = BTreeMap::new();
    for entry in entries {
        let id = match entry.get("_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                tracing::warn!("Skipping metadata entry without an _id");
                continue;
            }
        };
        keyed.insert(id, entry);
    }
    keyed
}
