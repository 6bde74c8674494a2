//! Position Normalizer
//!
//! The platform makes whatever display sits at (0, 0) the primary. A layout
//! is therefore re-anchored so the primary lands on the origin, keeping every
//! relative offset, and then nudged back inside the coordinate bounds.

use tracing::{debug, warn};

use crate::constants::bounds;
use crate::data::{DisplayId, DisplayTopologyEntry};

/// Re-anchor entries on the primary (or the first entry) and enforce bounds
///
/// Returns the input unchanged when the anchor is already at the origin.
/// A bounds violation after translation is fixed with one uniform shift per
/// axis sized to the worst offender, so relative offsets survive that too.
pub fn normalize(entries: &[DisplayTopologyEntry]) -> Vec<DisplayTopologyEntry> {
    let Some(anchor) = entries
        .iter()
        .find(|e| e.is_enabled && e.is_primary)
        .or_else(|| entries.first())
    else {
        return Vec::new();
    };

    if anchor.position.is_origin() {
        return entries.to_vec();
    }

    let (dx, dy) = (-anchor.position.x, -anchor.position.y);
    debug!(anchor = %anchor.display_id, dx, dy, "Re-anchoring layout on origin");
    let translated: Vec<DisplayTopologyEntry> = entries
        .iter()
        .map(|e| e.with_position(e.position.offset(dx, dy)))
        .collect();

    let shift_x = axis_shift(translated.iter().map(|e| (e.position.x, e.desktop_size().0)));
    let shift_y = axis_shift(translated.iter().map(|e| (e.position.y, e.desktop_size().1)));
    if shift_x == 0 && shift_y == 0 {
        return translated;
    }

    warn!(shift_x, shift_y, "Layout exceeds desktop bounds, shifting every display");
    translated
        .iter()
        .map(|e| e.with_position(e.position.offset(shift_x, shift_y)))
        .collect()
}

/// Smallest uniform shift that brings every span inside the bounds
fn axis_shift(spans: impl Iterator<Item = (i32, u32)>) -> i32 {
    let mut low = i64::MAX;
    let mut high = i64::MIN;
    for (start, extent) in spans {
        low = low.min(start as i64);
        high = high.max(start as i64 + extent as i64);
    }
    if low == i64::MAX {
        return 0;
    }

    let under = bounds::MIN_COORD as i64 - low;
    let over = high - bounds::MAX_COORD as i64;
    match (under > 0, over > 0) {
        (true, false) => under as i32,
        (false, true) => -over as i32,
        (false, false) => 0,
        (true, true) => {
            warn!(low, high, "Layout is wider than the desktop coordinate space");
            0
        }
    }
}

/// Pairs of enabled entries whose rectangles intersect
///
/// Advisory only. Intermediate layouts during a multi-step apply can
/// overlap transiently, so nothing is moved because of an overlap.
pub fn find_overlaps(entries: &[DisplayTopologyEntry]) -> Vec<(DisplayId, DisplayId)> {
    let enabled: Vec<&DisplayTopologyEntry> = entries.iter().filter(|e| e.is_enabled).collect();
    let mut overlaps = Vec::new();

    for (i, a) in enabled.iter().enumerate() {
        for b in &enabled[i + 1..] {
            if intersects(a, b) {
                overlaps.push((a.display_id.clone(), b.display_id.clone()));
            }
        }
    }
    overlaps
}

fn intersects(a: &DisplayTopologyEntry, b: &DisplayTopologyEntry) -> bool {
    let rect = |e: &DisplayTopologyEntry| {
        let (w, h) = e.desktop_size();
        let (x, y) = (e.position.x as i64, e.position.y as i64);
        (x, y, x + w as i64, y + h as i64)
    };
    let (ax0, ay0, ax1, ay1) = rect(a);
    let (bx0, by0, bx1, by1) = rect(b);
    ax0 < bx1 && bx0 < ax1 && ay0 < by1 && by0 < ay1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Orientation, Position};
    use crate::test_utils::{create_entry, display, FHD, QHD};

    #[test]
    fn test_primary_at_origin_is_unchanged() {
        let entries = vec![
            create_entry(0, FHD, 0, 0).primary(),
            create_entry(1, FHD, -1920, 0),
            create_entry(2, FHD, 1920, 0).disabled(),
        ];
        assert_eq!(normalize(&entries), entries);
    }

    #[test]
    fn test_re_anchors_on_primary() {
        let entries = vec![create_entry(0, FHD, 100, 50), create_entry(1, FHD, 2000, 0).primary()];
        let normalized = normalize(&entries);
        assert_eq!(normalized[1].position, Position::ORIGIN);
        assert_eq!(normalized[0].position, Position::new(-1900, 50));
    }

    #[test]
    fn test_relative_offsets_are_preserved() {
        let entries = vec![
            create_entry(0, QHD, -640, 300),
            create_entry(1, FHD, 1920, -200).primary(),
            create_entry(2, FHD, 4480, 0),
        ];
        let normalized = normalize(&entries);
        let primary = normalized.iter().find(|e| e.is_primary).unwrap().position;
        assert!(primary.is_origin());
        for (old, new) in entries.iter().zip(&normalized) {
            assert_eq!(new.position.x - primary.x, old.position.x - 1920);
            assert_eq!(new.position.y - primary.y, old.position.y + 200);
        }
    }

    #[test]
    fn test_anchors_on_first_entry_without_primary() {
        let entries = vec![create_entry(0, FHD, 500, 500), create_entry(1, FHD, 2420, 500)];
        let normalized = normalize(&entries);
        assert_eq!(normalized[0].position, Position::ORIGIN);
        assert_eq!(normalized[1].position, Position::new(1920, 0));
    }

    #[test]
    fn test_out_of_bounds_layout_shifts_once() {
        // Translating on the primary pushes the left display past the minimum
        let entries = vec![
            create_entry(0, FHD, -20000, 0),
            create_entry(1, FHD, 20000, 0).primary(),
        ];
        let normalized = normalize(&entries);
        assert_eq!(normalized[0].position.x, -32768);
        assert_eq!(normalized[1].position.x, -32768 + 40000);
        for entry in &normalized {
            assert!(entry.position.x >= -32768);
            assert!(entry.position.x + entry.desktop_size().0 as i32 <= 32767);
        }
    }

    #[test]
    fn test_rotated_height_counts_for_bounds() {
        let entries = vec![
            create_entry(0, FHD, 0, 20000).with_orientation(Orientation::Portrait),
            create_entry(1, FHD, 0, -12000).primary(),
        ];
        let normalized = normalize(&entries);
        let (_, height) = normalized[0].desktop_size();
        assert_eq!(normalized[0].position.y + height as i32, 32767);
    }

    #[test]
    fn test_find_overlaps() {
        let entries = vec![
            create_entry(0, FHD, 0, 0),
            create_entry(1, FHD, 1900, 0),
            create_entry(2, FHD, 3820, 0),
            create_entry(3, FHD, 100, 100).disabled(),
        ];
        assert_eq!(find_overlaps(&entries), vec![(display(0), display(1))]);
        assert!(find_overlaps(&entries[..1]).is_empty());
    }
}
