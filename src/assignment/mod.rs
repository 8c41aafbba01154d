//! Slot Assignment
//!
//! Packs the profile's colors into at most `capacity` slots. Two strategies
//! share one result contract:
//! - [`IntervalPartition`]: clique growth over the interval compatibility graph
//! - [`AffinityClustering`]: greedy clustering on a multi-factor affinity score
//!
//! Both only decide the initial groups. Placing colors that did not fit,
//! ordering members and computing slot metrics happens here so the two
//! strategies cannot drift apart.

pub mod affinity;
pub mod interval;

pub use affinity::{pair_affinity, AffinityBreakdown, AffinityClustering};
pub use interval::IntervalPartition;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AssignmentStrategy, SlotConfig};
use crate::model::{ColorId, ColorUsageProfile};
use crate::overlap::OverlapAnalysis;

// =============================================================================
// Slot Assignment
// =============================================================================

/// One physical slot and the colors it serves over the print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAssignment {
    /// 1-based slot number
    pub slot: usize,
    /// Members ordered by first use
    pub colors: Vec<ColorId>,
    /// One color for the whole print
    pub is_permanent: bool,
    /// Σ member usage percentage, capped at 100
    pub utilization: f64,
    /// Σ over layers of (members present − 1)
    pub conflicts: u32,
    /// 0..=100
    pub efficiency: f64,
}

impl SlotAssignment {
    pub fn holds(&self, color: &str) -> bool {
        self.colors.iter().any(|c| c == color)
    }

    /// Number of manual swaps this slot needs
    pub fn swap_count(&self) -> usize {
        self.colors.len().saturating_sub(1)
    }
}

/// Efficiency of a slot from its conflicts and utilization
pub fn slot_efficiency(conflicts: u32, utilization: f64) -> f64 {
    (80.0 - 5.0 * f64::from(conflicts) + 0.4 * (utilization - 50.0)).clamp(0.0, 100.0)
}

// =============================================================================
// Strategy Interface
// =============================================================================

/// Everything a strategy may look at
pub struct AssignmentContext<'a> {
    pub profile: &'a ColorUsageProfile,
    pub overlaps: &'a OverlapAnalysis,
    pub config: &'a SlotConfig,
}

impl<'a> AssignmentContext<'a> {
    pub fn new(
        profile: &'a ColorUsageProfile,
        overlaps: &'a OverlapAnalysis,
        config: &'a SlotConfig,
    ) -> Self {
        Self { profile, overlaps, config }
    }

    fn capacity(&self) -> usize {
        self.config.capacity.max(1)
    }

    fn max_per_slot(&self) -> usize {
        self.config.max_colors_per_slot.max(1)
    }
}

/// A slot packing strategy.
///
/// Returns at most `capacity` groups of color positions (declaration
/// indices). Colors left out are placed afterwards by [`assign_slots`].
pub trait SlotAssigner {
    fn name(&self) -> &'static str;

    fn partition(&self, ctx: &AssignmentContext<'_>) -> Vec<Vec<usize>>;
}

impl AssignmentStrategy {
    /// The strategy implementation selected by configuration
    pub fn assigner(&self) -> Box<dyn SlotAssigner> {
        match self {
            AssignmentStrategy::IntervalPartition => Box::new(IntervalPartition),
            AssignmentStrategy::AffinityClustering => Box::new(AffinityClustering),
        }
    }
}

// =============================================================================
// Assignment
// =============================================================================

/// Assign every color to exactly one slot using the configured strategy
pub fn assign_slots(ctx: &AssignmentContext<'_>) -> Vec<SlotAssignment> {
    let colors = &ctx.profile.colors;
    if colors.is_empty() {
        return Vec::new();
    }

    let capacity = ctx.capacity();
    let mut groups: Vec<Vec<usize>> = if colors.len() <= capacity {
        (0..colors.len()).map(|i| vec![i]).collect()
    } else {
        let assigner = ctx.config.strategy.assigner();
        let groups = assigner.partition(ctx);
        debug!(strategy = assigner.name(), groups = groups.len(), "initial partition");
        groups
    };

    let mut placed = vec![false; colors.len()];
    for &member in groups.iter().flatten() {
        placed[member] = true;
    }
    let leftovers: Vec<usize> = (0..colors.len()).filter(|&i| !placed[i]).collect();
    place_leftovers(ctx, &mut groups, &leftovers);

    groups
        .into_iter()
        .enumerate()
        .map(|(i, members)| build_slot(ctx.profile, i + 1, members))
        .collect()
}

/// Place colors no strategy group took.
///
/// Opens a singleton slot while capacity remains; otherwise picks the shared
/// slot with room whose tightest gap to the newcomer is widest, then any slot
/// with room, then any slot at all.
fn place_leftovers(ctx: &AssignmentContext<'_>, groups: &mut Vec<Vec<usize>>, leftovers: &[usize]) {
    let colors = &ctx.profile.colors;
    let capacity = ctx.capacity();
    let max_per_slot = ctx.max_per_slot();

    for &color in leftovers {
        if groups.len() < capacity {
            groups.push(vec![color]);
            continue;
        }

        let shared_with_room: Vec<usize> = (0..groups.len())
            .filter(|&s| groups[s].len() > 1 && groups[s].len() < max_per_slot)
            .collect();
        let with_room: Vec<usize> = (0..groups.len())
            .filter(|&s| groups[s].len() < max_per_slot)
            .collect();

        let candidates = if !shared_with_room.is_empty() {
            shared_with_room
        } else if !with_room.is_empty() {
            with_room
        } else {
            warn!(
                color = %colors[color].id,
                max_per_slot,
                "every slot is full, exceeding the per-slot limit"
            );
            (0..groups.len()).collect()
        };

        let mut best: Option<(usize, i64)> = None;
        for slot in candidates {
            let worst_gap = groups[slot]
                .iter()
                .map(|&member| colors[color].interval_gap(&colors[member]))
                .min()
                .unwrap_or(i64::MAX);
            if best.map_or(true, |(_, gap)| worst_gap > gap) {
                best = Some((slot, worst_gap));
            }
        }

        if let Some((slot, gap)) = best {
            debug!(color = %colors[color].id, slot = slot + 1, gap, "placed leftover color");
            groups[slot].push(color);
        }
    }
}

fn build_slot(profile: &ColorUsageProfile, slot: usize, mut members: Vec<usize>) -> SlotAssignment {
    let colors = &profile.colors;
    members.sort_by_key(|&i| (colors[i].first_layer, i));

    let ids: Vec<ColorId> = members.iter().map(|&i| colors[i].id.clone()).collect();
    let utilization = members
        .iter()
        .map(|&i| colors[i].usage_percentage)
        .sum::<f64>()
        .min(100.0);

    let conflicts: u32 = if ids.len() < 2 {
        0
    } else {
        profile
            .layer_color_map
            .iter()
            .map(|(_, active)| {
                let present = active.iter().filter(|c| ids.iter().any(|id| id == *c)).count();
                present.saturating_sub(1) as u32
            })
            .sum()
    };

    SlotAssignment {
        slot,
        is_permanent: ids.len() == 1,
        colors: ids,
        utilization,
        conflicts,
        efficiency: slot_efficiency(conflicts, utilization),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Color;
    use crate::overlap::analyze_overlaps;

    fn run(profile: &ColorUsageProfile, config: &SlotConfig) -> Vec<SlotAssignment> {
        let overlaps = analyze_overlaps(profile);
        assign_slots(&AssignmentContext::new(profile, &overlaps, config))
    }

    fn config(capacity: usize, strategy: AssignmentStrategy) -> SlotConfig {
        SlotConfig {
            capacity,
            strategy,
            ..SlotConfig::default()
        }
    }

    #[test]
    fn test_no_colors_no_slots() {
        let profile = ColorUsageProfile::new(0, 0.0, Vec::new());
        assert!(run(&profile, &SlotConfig::default()).is_empty());
    }

    #[test]
    fn test_colors_within_capacity_are_permanent() {
        let profile = ColorUsageProfile::new(
            10,
            2.0,
            vec![Color::from_span("T0", 0, 9, 10), Color::from_span("T1", 0, 4, 10)],
        );
        for strategy in [
            AssignmentStrategy::IntervalPartition,
            AssignmentStrategy::AffinityClustering,
        ] {
            let slots = run(&profile, &config(4, strategy));
            assert_eq!(slots.len(), 2);
            assert!(slots.iter().all(|s| s.is_permanent && s.conflicts == 0));
            assert_eq!(slots[0].colors, vec!["T0"]);
            assert_eq!(slots[1].slot, 2);
        }
    }

    #[test]
    fn test_efficiency_formula() {
        assert_eq!(slot_efficiency(0, 50.0), 80.0);
        assert_eq!(slot_efficiency(0, 100.0), 100.0);
        assert_eq!(slot_efficiency(2, 25.0), 60.0);
        assert_eq!(slot_efficiency(40, 0.0), 0.0);
    }

    #[test]
    fn test_every_color_placed_once_when_overfull() {
        // Six overlapping colors into two slots: leftovers are forced in
        let colors: Vec<Color> = (0..6)
            .map(|i| Color::from_span(format!("T{}", i), i, 20 + i, 30))
            .collect();
        let profile = ColorUsageProfile::new(30, 6.0, colors);
        for strategy in [
            AssignmentStrategy::IntervalPartition,
            AssignmentStrategy::AffinityClustering,
        ] {
            let slots = run(&profile, &config(2, strategy));
            assert_eq!(slots.len(), 2);
            let mut seen: Vec<&str> = slots
                .iter()
                .flat_map(|s| s.colors.iter().map(String::as_str))
                .collect();
            seen.sort_unstable();
            assert_eq!(seen, vec!["T0", "T1", "T2", "T3", "T4", "T5"]);
            assert!(slots.iter().all(|s| s.colors.len() <= 4));
            assert!(slots.iter().all(|s| !s.is_permanent));
            assert!(slots.iter().any(|s| s.conflicts > 0));
        }
    }

    #[test]
    fn test_members_sorted_by_first_layer() {
        let profile = ColorUsageProfile::new(
            30,
            6.0,
            vec![
                Color::from_span("late", 20, 29, 30),
                Color::from_span("early", 0, 9, 30),
                Color::from_span("wide", 0, 29, 30),
            ],
        );
        let slots = run(&profile, &config(2, AssignmentStrategy::IntervalPartition));
        let shared = slots.iter().find(|s| !s.is_permanent).unwrap();
        assert_eq!(shared.colors, vec!["early", "late"]);
    }
}
