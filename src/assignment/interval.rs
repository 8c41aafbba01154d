//! Exact interval partition
//!
//! Repeatedly picks the largest clique of mutually compatible colors (no two
//! usage intervals intersect) among the unassigned ones, one clique per slot.

use tracing::trace;

use super::{AssignmentContext, SlotAssigner};
use crate::compatibility::CompatibilityGraph;

/// Clique growth over the interval compatibility graph
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalPartition;

impl SlotAssigner for IntervalPartition {
    fn name(&self) -> &'static str {
        "interval-partition"
    }

    fn partition(&self, ctx: &AssignmentContext<'_>) -> Vec<Vec<usize>> {
        let graph = CompatibilityGraph::from_colors(&ctx.profile.colors);
        let capacity = ctx.capacity();
        let max_size = ctx.max_per_slot();

        let mut unassigned: Vec<usize> = (0..ctx.profile.colors.len()).collect();
        let mut groups = Vec::new();

        while groups.len() < capacity && !unassigned.is_empty() {
            let mut best: Vec<usize> = Vec::new();
            for &seed in &unassigned {
                let clique = graph.grow_clique(seed, &unassigned, max_size);
                if clique.len() > best.len() {
                    best = clique;
                }
            }

            trace!(slot = groups.len() + 1, size = best.len(), "selected clique");
            unassigned.retain(|c| !best.contains(c));
            groups.push(best);
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::assign_slots;
    use crate::config::SlotConfig;
    use crate::model::{Color, ColorUsageProfile};
    use crate::overlap::analyze_overlaps;

    fn partition(profile: &ColorUsageProfile, capacity: usize) -> Vec<Vec<usize>> {
        let overlaps = analyze_overlaps(profile);
        let config = SlotConfig {
            capacity,
            ..SlotConfig::default()
        };
        IntervalPartition.partition(&AssignmentContext::new(profile, &overlaps, &config))
    }

    #[test]
    fn test_three_color_example() {
        let profile = ColorUsageProfile::new(
            20,
            4.0,
            vec![
                Color::from_span("T0", 0, 9, 20),
                Color::from_span("T1", 10, 19, 20),
                Color::from_span("T2", 5, 14, 20),
            ],
        );
        assert_eq!(partition(&profile, 2), vec![vec![0, 1], vec![2]]);

        let overlaps = analyze_overlaps(&profile);
        let config = SlotConfig {
            capacity: 2,
            ..SlotConfig::default()
        };
        let slots = assign_slots(&AssignmentContext::new(&profile, &overlaps, &config));
        assert_eq!(slots[0].colors, vec!["T0", "T1"]);
        assert!(!slots[0].is_permanent);
        assert_eq!(slots[0].conflicts, 0);
        assert_eq!(slots[1].colors, vec!["T2"]);
        assert!(slots[1].is_permanent);
    }

    #[test]
    fn test_prefers_largest_clique() {
        // T3 is compatible with nothing; T0, T1, T2 are sequential
        let profile = ColorUsageProfile::new(
            40,
            8.0,
            vec![
                Color::from_span("T3", 0, 39, 40),
                Color::from_span("T0", 0, 9, 40),
                Color::from_span("T1", 10, 19, 40),
                Color::from_span("T2", 20, 29, 40),
            ],
        );
        let groups = partition(&profile, 2);
        assert_eq!(groups[0], vec![1, 2, 3]);
        assert_eq!(groups[1], vec![0]);
    }

    #[test]
    fn test_stops_at_capacity() {
        let profile = ColorUsageProfile::new(
            10,
            2.0,
            (0..5).map(|i| Color::from_span(format!("T{}", i), 0, 9, 10)).collect(),
        );
        let groups = partition(&profile, 3);
        assert_eq!(groups, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_deterministic() {
        let profile = ColorUsageProfile::new(
            60,
            12.0,
            (0..8)
                .map(|i| Color::from_span(format!("T{}", i), (i % 4) * 15, (i % 4) * 15 + 12, 60))
                .collect(),
        );
        assert_eq!(partition(&profile, 3), partition(&profile, 3));
    }
}
