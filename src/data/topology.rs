//! Named topology presets
//!
//! A `Topology` is an ordered collection of desired per-display states plus
//! metadata. The content hash ignores entry order and the name so two presets
//! describing the same layout compare as equivalent.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::data::types::{DisplayId, DisplayTopologyEntry};
use crate::data::validation::validate_entries;
use crate::error::Result;

/// Named snapshot of desired display state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub name: String,
    pub entries: Vec<DisplayTopologyEntry>,
    /// Creation timestamp (ms since epoch)
    pub created_at: u64,
    /// SHA-256 over the order-independent entry set
    pub content_hash: String,
}

impl Topology {
    pub fn new(name: impl Into<String>, entries: Vec<DisplayTopologyEntry>) -> Self {
        let content_hash = compute_content_hash(&entries);
        Self {
            name: name.into(),
            entries,
            created_at: current_timestamp_ms(),
            content_hash,
        }
    }

    /// Copy with a different entry list, keeping the name and creation time
    pub fn with_entries(&self, entries: Vec<DisplayTopologyEntry>) -> Self {
        Self {
            name: self.name.clone(),
            content_hash: compute_content_hash(&entries),
            entries,
            created_at: self.created_at,
        }
    }

    /// Check the topology invariants (single primary, unique ids, bounds)
    pub fn validate(&self) -> Result<()> {
        validate_entries(&self.entries)
    }

    /// The enabled entry flagged primary, if any
    pub fn primary(&self) -> Option<&DisplayTopologyEntry> {
        self.entries.iter().find(|e| e.is_enabled && e.is_primary)
    }

    pub fn get(&self, id: &DisplayId) -> Option<&DisplayTopologyEntry> {
        self.entries.iter().find(|e| &e.display_id == id)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &DisplayTopologyEntry> {
        self.entries.iter().filter(|e| e.is_enabled)
    }

    /// Whether two topologies describe the same layout
    pub fn is_equivalent(&self, other: &Topology) -> bool {
        self.content_hash == other.content_hash
    }

    /// Whether the stored hash still matches the entries
    pub fn hash_is_current(&self) -> bool {
        self.content_hash == compute_content_hash(&self.entries)
    }
}

/// Compute the order-independent content hash of a set of entries
pub fn compute_content_hash(entries: &[DisplayTopologyEntry]) -> String {
    let mut sorted: Vec<&DisplayTopologyEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.display_id.cmp(&b.display_id));

    let mut hasher = Sha256::new();
    for entry in sorted {
        // serde_json output for these plain structs is deterministic
        let json = serde_json::to_string(entry).unwrap_or_default();
        hasher.update(json.as_bytes());
        hasher.update(b"\n");
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
