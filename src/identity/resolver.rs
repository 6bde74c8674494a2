//! Hardware Identity Resolver
//!
//! Correlates logical displays (platform source ids) with the stable hardware
//! UIDs published by the inventory service. Two correlation tiers:
//!
//! 1. **Direct**: the target id of an active path equals a monitor's UID
//! 2. **Positional**: inventory enumeration order aligned index-for-index with
//!    the active path list. Degraded: holds only while the attachment order
//!    the inventory reports matches the path order.
//!
//! Resolution never fails. Any service failure degrades to a partial or empty
//! map, and callers must treat missing identities as "unknown".

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::decode::{decode_buffer, extract_uid};
use crate::data::{Correlation, DisplayId, DisplayIdentity};
use crate::engine::query_paths;
use crate::platform::{HardwareInventory, MonitorRecord, PathInfo, TopologyService};

// ============================================================================
// Identity Map
// ============================================================================

/// Logical id to physical identity, valid for one detection cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityMap {
    identities: HashMap<DisplayId, DisplayIdentity>,
}

impl IdentityMap {
    pub fn get(&self, id: &DisplayId) -> Option<&DisplayIdentity> {
        self.identities.get(id)
    }

    /// Identity currently carrying the given hardware UID
    pub fn by_uid(&self, uid: u32) -> Option<&DisplayIdentity> {
        self.identities.values().find(|i| i.physical_uid == Some(uid))
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplayIdentity> {
        self.identities.values()
    }

    pub fn insert(&mut self, identity: DisplayIdentity) {
        self.identities.insert(identity.logical_id.clone(), identity);
    }
}

impl FromIterator<DisplayIdentity> for IdentityMap {
    fn from_iter<I: IntoIterator<Item = DisplayIdentity>>(iter: I) -> Self {
        let mut map = Self::default();
        for identity in iter {
            map.insert(identity);
        }
        map
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Decoded inventory record
#[derive(Debug, Clone, PartialEq, Eq)]
struct MonitorEntry {
    uid: Option<u32>,
    manufacturer: String,
    product: String,
    serial: String,
    friendly_name: String,
}

impl MonitorEntry {
    fn decode(record: &MonitorRecord) -> Self {
        Self {
            uid: extract_uid(&record.instance_path),
            manufacturer: decode_buffer(&record.manufacturer_raw),
            product: decode_buffer(&record.product_raw),
            serial: decode_buffer(&record.serial_raw),
            friendly_name: decode_buffer(&record.friendly_name_raw),
        }
    }

    fn display_name(&self) -> String {
        if !self.friendly_name.is_empty() {
            return self.friendly_name.clone();
        }
        format!("{} {}", self.manufacturer, self.product).trim().to_string()
    }
}

/// Build the logical-to-physical identity map for the current hardware
pub fn resolve(inventory: &dyn HardwareInventory, topology: &dyn TopologyService) -> IdentityMap {
    let records = match inventory.list_monitors() {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "Hardware inventory unavailable, identities unresolved");
            return IdentityMap::default();
        }
    };

    let paths: Vec<PathInfo> = match query_paths(topology, false) {
        Ok((paths, _)) => paths.into_iter().filter(|p| p.is_active()).collect(),
        Err(e) => {
            warn!(error = %e, "Active path query failed, identities unresolved");
            return IdentityMap::default();
        }
    };

    let monitors: Vec<MonitorEntry> = records.iter().map(MonitorEntry::decode).collect();
    let map = correlate(&paths, &monitors);

    info!(
        paths = paths.len(),
        monitors = monitors.len(),
        resolved = map.len(),
        "Resolved display identities"
    );
    map
}

fn correlate(paths: &[PathInfo], monitors: &[MonitorEntry]) -> IdentityMap {
    let mut used = vec![false; monitors.len()];
    let mut matched: Vec<Option<(usize, Correlation)>> = vec![None; paths.len()];

    // Direct: target id equals the UID token
    for (path_idx, path) in paths.iter().enumerate() {
        let hit = monitors
            .iter()
            .enumerate()
            .find(|(i, m)| !used[*i] && m.uid == Some(path.target.id));
        if let Some((monitor_idx, _)) = hit {
            used[monitor_idx] = true;
            matched[path_idx] = Some((monitor_idx, Correlation::Direct));
        }
    }

    // Positional: same index in both lists
    for (path_idx, slot) in matched.iter_mut().enumerate() {
        if slot.is_some() {
            continue;
        }
        if path_idx < monitors.len() && !used[path_idx] {
            used[path_idx] = true;
            *slot = Some((path_idx, Correlation::Positional));
            debug!(
                source_id = paths[path_idx].source.id,
                target_id = paths[path_idx].target.id,
                "Falling back to positional identity correlation"
            );
        }
    }

    paths
        .iter()
        .zip(matched)
        .filter_map(|(path, slot)| {
            let (monitor_idx, correlation) = slot?;
            let monitor = &monitors[monitor_idx];
            Some(DisplayIdentity {
                logical_id: DisplayId::from_source_id(path.source.id),
                physical_uid: monitor.uid,
                friendly_name: monitor.display_name(),
                manufacturer: monitor.manufacturer.clone(),
                target_id: Some(path.target.id),
                correlation,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Resolution;
    use crate::error::TopologyError;
    use crate::platform::{
        MockHardwareInventory, MockTopologyService, RawBuffer, SimMonitor, SimulatedPlatform,
    };

    fn record(instance_path: &str, name: &str) -> MonitorRecord {
        MonitorRecord {
            instance_path: instance_path.to_string(),
            manufacturer_raw: RawBuffer::wide_padded("GSM", 16),
            product_raw: RawBuffer::wide_padded("5B7F", 16),
            serial_raw: RawBuffer::Bytes(vec![0; 16]),
            friendly_name_raw: RawBuffer::wide_padded(name, 64),
        }
    }

    fn desk() -> SimulatedPlatform {
        SimulatedPlatform::new(vec![
            SimMonitor::new(0, 4353, Resolution::new(1920, 1080, 60)).with_name("DELL U2720Q"),
            SimMonitor::new(1, 4354, Resolution::new(2560, 1440, 144)).at(1920, 0).with_name("LG 27GN950"),
        ])
    }

    #[test]
    fn test_direct_correlation_by_target_id() {
        let sim = desk();
        let map = resolve(&sim, &sim);
        assert_eq!(map.len(), 2);

        let second = map.get(&DisplayId::from_source_id(1)).unwrap();
        assert_eq!(second.physical_uid, Some(4354));
        assert_eq!(second.friendly_name, "LG 27GN950");
        assert_eq!(second.manufacturer, "DEL");
        assert_eq!(second.correlation, Correlation::Direct);
        assert_eq!(map.by_uid(4353).unwrap().logical_id, DisplayId::from_source_id(0));
    }

    #[test]
    fn test_positional_fallback_when_uids_differ() {
        let sim = SimulatedPlatform::new(vec![
            SimMonitor::new(0, 7, Resolution::new(1920, 1080, 60)).with_uid(265988),
            SimMonitor::new(1, 8, Resolution::new(1920, 1080, 60)).at(1920, 0).with_uid(265989),
        ]);
        let map = resolve(&sim, &sim);
        let first = map.get(&DisplayId::from_source_id(0)).unwrap();
        assert_eq!(first.correlation, Correlation::Positional);
        assert_eq!(first.physical_uid, Some(265988));
        assert_eq!(first.target_id, Some(7));
    }

    #[test]
    fn test_mixed_direct_and_positional() {
        let paths = vec![
            {
                let mut p = PathInfo::default().with_active(true);
                p.source.id = 0;
                p.target.id = 99;
                p
            },
            {
                let mut p = PathInfo::default().with_active(true);
                p.source.id = 1;
                p.target.id = 4353;
                p
            },
        ];
        let monitors = vec![
            MonitorEntry::decode(&record(r"DISPLAY\GSM5B7F\5&1&0&UID4353_0", "A")),
            MonitorEntry::decode(&record(r"DISPLAY\GSM5B7F\5&1&0&UID5000_0", "B")),
        ];
        let map = correlate(&paths, &monitors);

        // Direct claims monitor 0 for path 1, so path 0 cannot take index 0
        let direct = map.get(&DisplayId::from_source_id(1)).unwrap();
        assert_eq!(direct.correlation, Correlation::Direct);
        assert_eq!(direct.friendly_name, "A");
        assert!(map.get(&DisplayId::from_source_id(0)).is_none());
    }

    #[test]
    fn test_inventory_failure_degrades_to_empty() {
        let mut inventory = MockHardwareInventory::new();
        inventory
            .expect_list_monitors()
            .times(1)
            .returning(|| Err(TopologyError::internal("WMI namespace missing")));
        let mut topology = MockTopologyService::new();
        topology.expect_get_buffer_sizes().never();

        assert!(resolve(&inventory, &topology).is_empty());
    }

    #[test]
    fn test_query_failure_degrades_to_empty() {
        let mut inventory = MockHardwareInventory::new();
        inventory
            .expect_list_monitors()
            .returning(|| Ok(vec![record(r"DISPLAY\GSM5B7F\5&1&0&UID1_0", "A")]));
        let mut topology = MockTopologyService::new();
        topology.expect_get_buffer_sizes().returning(|_| Err(31));

        assert!(resolve(&inventory, &topology).is_empty());
    }

    #[test]
    fn test_missing_friendly_name_uses_manufacturer_and_product() {
        let entry = MonitorEntry::decode(&record(r"DISPLAY\GSM5B7F\UID3", ""));
        assert_eq!(entry.display_name(), "GSM 5B7F");
        assert_eq!(entry.uid, Some(3));
    }
}
