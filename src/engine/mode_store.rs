//! Last-known mode store
//!
//! Remembers the mode each display was running when it was last disabled, so
//! the legacy restore strategies can bring it back the way it was. The store
//! is an explicit handle owned by the caller and passed into the engine.
//!
//! Logical ids can be reassigned across a disable/enable toggle, so entries
//! are keyed by hardware UID whenever the identity is known. The logical id is
//! kept as a fallback for displays without a resolved identity, and is not
//! trusted once its recorded monitor shows up under another id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::data::{DisplayId, DisplayMode};
use crate::identity::IdentityMap;

#[derive(Debug, Default)]
struct Entries {
    by_uid: HashMap<u32, DisplayMode>,
    /// Mode plus the UID the logical id carried when it was recorded
    by_id: HashMap<DisplayId, (Option<u32>, DisplayMode)>,
}

/// Shared keyed store of last-known display modes
#[derive(Debug, Clone, Default)]
pub struct ModeStore {
    entries: Arc<RwLock<Entries>>,
}

fn uid_of(display: &DisplayId, identities: &IdentityMap) -> Option<u32> {
    identities.get(display).and_then(|i| i.physical_uid)
}

impl ModeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the mode a display was last running
    pub fn remember(&self, display: &DisplayId, identities: &IdentityMap, mode: DisplayMode) {
        let uid = uid_of(display, identities);
        { let display_id = &display; debug!(display = %display_id, ?uid, mode = %mode.resolution, "Remembering last-known mode") };

        let mut entries = self.entries.write();
        if let Some(uid) = uid {
            entries.by_uid.insert(uid, mode);
        }
        entries.by_id.insert(display.clone(), (uid, mode));
    }

    /// Last mode of the monitor currently reported as `display`
    pub fn lookup(&self, display: &DisplayId, identities: &IdentityMap) -> Option<DisplayMode> {
        let entries = self.entries.read();
        let current_uid = uid_of(display, identities);
        if let Some(mode) = current_uid.and_then(|uid| entries.by_uid.get(&uid)) {
            return Some(*mode);
        }

        let (owner, mode) = entries.by_id.get(display)?;
        let Some(owner) = owner else {
            return Some(*mode);
        };
        let moved = identities.by_uid(*owner).is_some_and(|i| &i.logical_id != display);
        if moved || current_uid.is_some_and(|uid| uid != *owner) {
            { let display_id = &display; debug!(display = %display_id, owner, "Remembered mode belongs to another monitor") };
            return None;
        }
        Some(*mode)
    }

    pub fn len(&self) -> usize {
        self.entries.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().by_id.is_empty()
    }
}
