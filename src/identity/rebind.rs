//! Rebinding of topology entries to reassigned logical ids
//!
//! Presets record the hardware UID of each display. Logical ids move around
//! across reboots and enable/disable toggles, so before a preset is applied
//! every entry whose UID is now reported under a different logical id is
//! moved to that id.

use std::collections::HashMap;

use tracing::{info, warn};

use super::resolver::IdentityMap;
use crate::data::{DisplayId, DisplayTopologyEntry};

/// One entry moved to a new logical id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
    pub hardware_uid: u32,
    pub from: DisplayId,
    pub to: DisplayId,
}

/// Result of rebinding a set of entries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RebindResult {
    pub entries: Vec<DisplayTopologyEntry>,
    pub remaps: Vec<Remap>,
    /// Entries whose UID is not visible right now (kept under their old id)
    pub unresolved: Vec<DisplayId>,
}

/// Move entries to the logical id their hardware UID currently resolves to
pub fn rebind_entries(entries: &[DisplayTopologyEntry], identities: &IdentityMap) -> RebindResult {
    let mut result = RebindResult {
        entries: entries.to_vec(),
        ..RebindResult::default()
    };

    let mut proposed: Vec<Option<DisplayId>> = Vec::with_capacity(entries.len());
    for entry in entries {
        let target = match entry.hardware_uid {
            Some(uid) => match identities.by_uid(uid) {
                Some(identity) if identity.logical_id != entry.display_id => Some(identity.logical_id.clone()),
                Some(_) => None,
                None => {
                    result.unresolved.push(entry.display_id.clone());
                    None
                }
            },
            None => None,
        };
        proposed.push(target);
    }

    // Drop remaps that would leave two entries on one id
    loop {
        let mut counts: HashMap<&DisplayId, usize> = HashMap::new();
        for (entry, target) in entries.iter().zip(&proposed) {
            *counts.entry(target.as_ref().unwrap_or(&entry.display_id)).or_default() += 1;
        }
        let conflict = entries
            .iter()
            .zip(&proposed)
            .position(|(_, target)| matches!(target, Some(id) if counts[id] > 1));
        match conflict {
            Some(idx) => {
                warn!(
                    display = %entries[idx].display_id,
                    "Rebinding would collide with another entry, keeping logical id"
                );
                proposed[idx] = None;
            }
            None => break,
        }
    }

    for (idx, target) in proposed.into_iter().enumerate() {
        let Some(to) = target else { continue };
        let entry = &entries[idx];
        let uid = entry.hardware_uid.unwrap_or_default();
        info!(uid, from = %entry.display_id, to = %to, "Rebinding topology entry");
        result.entries[idx] = entry.with_display_id(to.clone());
        result.remaps.push(Remap {
            hardware_uid: uid,
            from: entry.display_id.clone(),
            to,
        });
    }

    result
}
