//! Swap Schedule
//!
//! Turns a slot assignment into the ordered list of manual filament swaps an
//! operator performs during the print.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assignment::SlotAssignment;
use crate::model::{Color, ColorId, ColorUsageProfile};
use crate::timing::TimingWindow;

/// One operator-performed filament change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSwap {
    pub slot: usize,
    pub from_color: ColorId,
    pub to_color: ColorId,
    /// First layer printed with the new color loaded
    pub at_layer: u32,
    /// Z height (mm) of `at_layer`
    pub z_height: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_window: Option<TimingWindow>,
}

impl ManualSwap {
    /// Key used by timing analysis: `{from}-{to}-{layer}`
    pub fn key(&self) -> String {
        swap_key(&self.from_color, &self.to_color, self.at_layer)
    }
}

pub fn swap_key(from: &str, to: &str, at_layer: u32) -> String {
    format!("{}-{}-{}", from, to, at_layer)
}

/// Derive manual swaps from slot assignments.
///
/// Shared slots swap from each member to the next (by first use) on the
/// layer after the outgoing color's last use. Members without usage data are
/// skipped. Swaps are sorted by layer, then slot.
pub fn generate_swaps(profile: &ColorUsageProfile, slots: &[SlotAssignment]) -> Vec<ManualSwap> {
    let index = profile.index();
    let mut swaps = Vec::new();

    for slot in slots.iter().filter(|s| s.colors.len() > 1) {
        let mut members: Vec<&Color> = slot
            .colors
            .iter()
            .filter_map(|id| index.resolve(id, "slot member"))
            .collect();
        members.sort_by_key(|c| c.first_layer);

        for pair in members.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let at_layer = prev.last_layer + 1;
            swaps.push(ManualSwap {
                slot: slot.slot,
                from_color: prev.id.clone(),
                to_color: next.id.clone(),
                at_layer,
                z_height: profile.z_height(at_layer),
                reason: format!(
                    "Slot {} is shared: {} finishes at layer {}, {} starts at layer {}",
                    slot.slot,
                    prev.display_name(),
                    prev.last_layer,
                    next.display_name(),
                    next.first_layer
                ),
                timing_window: None,
            });
        }
    }

    swaps.sort_by_key(|s| (s.at_layer, s.slot));
    debug!(swaps = swaps.len(), "swap schedule generated");
    swaps
}

/// Operator-facing instructions, one line per swap
pub fn render_instructions(profile: &ColorUsageProfile, swaps: &[ManualSwap]) -> Vec<String> {
    let index = profile.index();
    let name = |id: &str| {
        index
            .get(id)
            .map(|c| c.display_name().to_string())
            .unwrap_or_else(|| id.to_string())
    };

    swaps
        .iter()
        .enumerate()
        .map(|(i, swap)| {
            let mut line = format!(
                "{}. Pause at layer {} (Z {:.2} mm): unload {} from slot {}, load {}",
                i + 1,
                swap.at_layer,
                swap.z_height,
                name(&swap.from_color),
                swap.slot,
                name(&swap.to_color)
            );
            if let Some(window) = &swap.timing_window {
                if window.latest > window.earliest {
                    line.push_str(&format!(
                        " (any layer {}-{} works, best {})",
                        window.earliest, window.latest, window.optimal
                    ));
                }
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Color;

    fn profile() -> ColorUsageProfile {
        ColorUsageProfile::new(
            40,
            8.0,
            vec![
                Color::from_span("T0", 0, 9, 40).with_name("Red"),
                Color::from_span("T1", 10, 19, 40),
                Color::from_span("T2", 5, 14, 40),
                Color::from_span("T3", 20, 39, 40),
            ],
        )
    }

    fn slot(number: usize, colors: &[&str]) -> SlotAssignment {
        SlotAssignment {
            slot: number,
            colors: colors.iter().map(|c| c.to_string()).collect(),
            is_permanent: colors.len() == 1,
            utilization: 0.0,
            conflicts: 0,
            efficiency: 0.0,
        }
    }

    #[test]
    fn test_single_swap_for_shared_slot() {
        let p = profile();
        let swaps = generate_swaps(&p, &[slot(1, &["T0", "T1"]), slot(2, &["T2"])]);
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].from_color, "T0");
        assert_eq!(swaps[0].to_color, "T1");
        assert_eq!(swaps[0].at_layer, 10);
        assert!((swaps[0].z_height - 2.0).abs() < 1e-9);
        assert_eq!(swaps[0].key(), "T0-T1-10");
    }

    #[test]
    fn test_members_are_ordered_and_globally_sorted() {
        let p = profile();
        // Declared out of order on purpose
        let swaps = generate_swaps(&p, &[slot(1, &["T3", "T1"]), slot(2, &["T2", "T0"])]);
        let layers: Vec<u32> = swaps.iter().map(|s| s.at_layer).collect();
        assert_eq!(layers, vec![10, 20]);
        assert_eq!(swaps[0].slot, 2);
        assert_eq!(swaps[1].from_color, "T1");
        assert_eq!(swaps[1].to_color, "T3");
    }

    #[test]
    fn test_idempotent() {
        let p = profile();
        let slots = [slot(1, &["T0", "T1", "T3"]), slot(2, &["T2"])];
        assert_eq!(generate_swaps(&p, &slots), generate_swaps(&p, &slots));
    }

    #[test]
    fn test_unknown_members_skipped() {
        let p = profile();
        let swaps = generate_swaps(&p, &[slot(1, &["T0", "ghost", "T1"])]);
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].to_color, "T1");
    }

    #[test]
    fn test_instructions_use_display_names() {
        let p = profile();
        let swaps = generate_swaps(&p, &[slot(1, &["T0", "T1"])]);
        let lines = render_instructions(&p, &swaps);
        assert_eq!(lines.len(), 1);
        assert!(lines[0]
            .starts_with("1. Pause at layer 10 (Z 2.00 mm): unload Red from slot 1, load T1"));
    }
}
