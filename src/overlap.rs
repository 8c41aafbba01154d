//! Overlap Analysis
//!
//! Counts, for every pair of colors, the layers on which both are active and
//! grades how badly each overlapping pair blocks slot sharing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::model::{Color, ColorId, ColorUsageProfile};

// =============================================================================
// Severity
// =============================================================================

/// How strongly an overlap ties two colors together
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapSeverity {
    Low,
    Medium,
    High,
}

impl OverlapSeverity {
    /// Grade an overlap from its shared-layer count and longest consecutive
    /// shared run, both relative to the print's layer count.
    pub fn classify(shared_layers: usize, longest_run: usize, total_layers: u32) -> Self {
        if total_layers == 0 {
            return Self::Low;
        }
        let total = total_layers as f64;
        let shared = shared_layers as f64 / total;
        let run = longest_run as f64 / total;

        if shared >= 0.20 || run >= 0.30 {
            Self::High
        } else if shared >= 0.10 || run >= 0.15 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for OverlapSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

// =============================================================================
// Overlap
// =============================================================================

/// Two colors required on the same layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlap {
    pub color_a: ColorId,
    pub color_b: ColorId,
    pub overlap_layers: Vec<u32>,
    pub can_share: bool,
    pub severity: OverlapSeverity,
}

impl Overlap {
    pub fn involves(&self, color: &str) -> bool {
        self.color_a == color || self.color_b == color
    }

    pub fn longest_run(&self) -> usize {
        longest_run(&self.overlap_layers)
    }
}

/// Length of the longest run of consecutive layers in a sorted list
pub fn longest_run(layers: &[u32]) -> usize {
    let mut best = 0;
    let mut current = 0;
    let mut previous: Option<u32> = None;
    for &layer in layers {
        current = match previous {
            Some(p) if layer == p + 1 => current + 1,
            Some(p) if layer == p => current,
            _ => 1,
        };
        best = best.max(current);
        previous = Some(layer);
    }
    best
}

/// Split a sorted layer list into maximal consecutive runs
pub fn consecutive_runs(layers: &[u32]) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &layer in layers {
        if let Some((_, end)) = runs.last_mut() {
            if layer <= *end + 1 {
                *end = (*end).max(layer);
                continue;
            }
        }
        runs.push((layer, layer));
    }
    runs
}

// =============================================================================
// Co-occurrence Matrix
// =============================================================================

/// Symmetric pair → shared-layer count matrix in declaration order.
/// The diagonal holds the number of mapped layers of each color.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoOccurrenceMatrix {
    ids: Vec<ColorId>,
    counts: Vec<Vec<u32>>,
}

impl CoOccurrenceMatrix {
    fn new(ids: Vec<ColorId>) -> Self {
        let n = ids.len();
        Self {
            ids,
            counts: vec![vec![0; n]; n],
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|c| c == id)
    }

    /// Shared-layer count for a pair (0 for unknown ids)
    pub fn get(&self, a: &str, b: &str) -> u32 {
        match (self.position(a), self.position(b)) {
            (Some(i), Some(j)) => self.counts[i][j],
            _ => 0,
        }
    }

    pub fn get_index(&self, i: usize, j: usize) -> u32 {
        self.counts
            .get(i)
            .and_then(|row| row.get(j))
            .copied()
            .unwrap_or(0)
    }

    pub fn ids(&self) -> &[ColorId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// =============================================================================
// Analysis
// =============================================================================

/// Complete overlap analysis for one profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlapAnalysis {
    pub matrix: CoOccurrenceMatrix,
    /// Every pair sharing at least one layer, in declaration order
    pub overlaps: Vec<Overlap>,
}

impl OverlapAnalysis {
    /// Shared-layer count for a pair
    pub fn overlap_count(&self, a: &str, b: &str) -> u32 {
        self.matrix.get(a, b)
    }

    /// Whether two colors can live in one slot: their intervals never
    /// intersect, or no layer actually contains both.
    pub fn can_share(&self, a: &Color, b: &Color) -> bool {
        !a.intervals_overlap(b) || self.overlap_count(&a.id, &b.id) == 0
    }

    /// Overlap record for a pair, in either order
    pub fn get(&self, a: &str, b: &str) -> Option<&Overlap> {
        self.overlaps
            .iter()
            .find(|o| (o.color_a == a && o.color_b == b) || (o.color_a == b && o.color_b == a))
    }

    pub fn overlaps_for<'a>(&'a self, color: &'a str) -> impl Iterator<Item = &'a Overlap> + 'a {
        self.overlaps.iter().filter(move |o| o.involves(color))
    }

    pub fn count_by_severity(&self, severity: OverlapSeverity) -> usize {
        self.overlaps.iter().filter(|o| o.severity == severity).count()
    }
}

/// Build the co-occurrence matrix and overlap list for a profile
pub fn analyze_overlaps(profile: &ColorUsageProfile) -> OverlapAnalysis {
    let ids: Vec<ColorId> = profile.colors.iter().map(|c| c.id.clone()).collect();
    let mut matrix = CoOccurrenceMatrix::new(ids);
    let index = profile.index();

    let mut shared: BTreeMap<(usize, usize), Vec<u32>> = BTreeMap::new();

    for (layer, colors) in profile.layer_color_map.iter() {
        let mut present: Vec<usize> = colors
            .iter()
            .filter_map(|id| {
                let position = index.position(id);
                if position.is_none() {
                    warn!(color = *id, layer, "layer references unknown color, skipping");
                }
                position
            })
            .collect();
        present.sort_unstable();

        for (n, &i) in present.iter().enumerate() {
            matrix.counts[i][i] += 1;
            for &j in &present[n + 1..] {
                matrix.counts[i][j] += 1;
                matrix.counts[j][i] += 1;
                shared.entry((i, j)).or_default().push(layer);
            }
        }
    }

    let overlaps: Vec<Overlap> = shared
        .into_iter()
        .map(|((i, j), overlap_layers)| {
            let a = &profile.colors[i];
            let b = &profile.colors[j];
            let severity = OverlapSeverity::classify(
                overlap_layers.len(),
                longest_run(&overlap_layers),
                profile.total_layers,
            );
            Overlap {
                color_a: a.id.clone(),
                color_b: b.id.clone(),
                can_share: !a.intervals_overlap(b),
                overlap_layers,
                severity,
            }
        })
        .collect();

    debug!(
        colors = matrix.len(),
        overlaps = overlaps.len(),
        "overlap analysis complete"
    );

    OverlapAnalysis { matrix, overlaps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Color, ColorUsageProfile};

    fn profile(colors: Vec<Color>, total_layers: u32) -> ColorUsageProfile {
        ColorUsageProfile::new(total_layers, total_layers as f64 * 0.2, colors)
    }

    #[test]
    fn test_empty_profile() {
        let analysis = analyze_overlaps(&profile(Vec::new(), 0));
        assert!(analysis.matrix.is_empty());
        assert!(analysis.overlaps.is_empty());
    }

    #[test]
    fn test_single_color_has_no_pairs() {
        let analysis = analyze_overlaps(&profile(vec![Color::from_span("T0", 0, 9, 10)], 10));
        assert_eq!(analysis.matrix.len(), 1);
        assert_eq!(analysis.matrix.get("T0", "T0"), 10);
        assert!(analysis.overlaps.is_empty());
    }

    #[test]
    fn test_disjoint_intervals_can_share() {
        let colors = vec![
            Color::from_span("T0", 0, 9, 20),
            Color::from_span("T1", 10, 19, 20),
        ];
        let p = profile(colors, 20);
        let analysis = analyze_overlaps(&p);
        assert_eq!(analysis.overlap_count("T0", "T1"), 0);
        assert!(analysis.can_share(&p.colors[0], &p.colors[1]));
        assert!(analysis.get("T0", "T1").is_none());
    }

    #[test]
    fn test_overlap_layers_and_symmetry() {
        let colors = vec![
            Color::from_span("T0", 0, 9, 20),
            Color::from_span("T1", 10, 19, 20),
            Color::from_span("T2", 5, 14, 20),
        ];
        let p = profile(colors, 20);
        let analysis = analyze_overlaps(&p);

        assert_eq!(analysis.overlap_count("T0", "T2"), 5);
        assert_eq!(analysis.overlap_count("T2", "T0"), 5);
        assert_eq!(analysis.overlap_count("T1", "T2"), 5);
        assert_eq!(analysis.overlaps.len(), 2);

        let t0_t2 = analysis.get("T2", "T0").unwrap();
        assert_eq!(t0_t2.overlap_layers, vec![5, 6, 7, 8, 9]);
        assert!(!t0_t2.can_share);
        // 5 of 20 layers shared = 25%
        assert_eq!(t0_t2.severity, OverlapSeverity::High);
        assert!(!analysis.can_share(&p.colors[0], &p.colors[2]));
    }

    #[test]
    fn test_interleaved_intervals_without_shared_layers() {
        // Intervals intersect but the colors alternate layers
        let colors = vec![
            Color::from_layers("A", [0, 2, 4], 10),
            Color::from_layers("B", [1, 3, 5], 10),
        ];
        let p = profile(colors, 10);
        let analysis = analyze_overlaps(&p);
        assert_eq!(analysis.overlap_count("A", "B"), 0);
        assert!(analysis.can_share(&p.colors[0], &p.colors[1]));
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(OverlapSeverity::classify(20, 1, 100), OverlapSeverity::High);
        assert_eq!(OverlapSeverity::classify(5, 30, 100), OverlapSeverity::High);
        assert_eq!(OverlapSeverity::classify(10, 1, 100), OverlapSeverity::Medium);
        assert_eq!(OverlapSeverity::classify(2, 15, 100), OverlapSeverity::Medium);
        assert_eq!(OverlapSeverity::classify(9, 14, 100), OverlapSeverity::Low);
        assert_eq!(OverlapSeverity::classify(9, 9, 0), OverlapSeverity::Low);
    }

    #[test]
    fn test_unknown_ids_in_layer_map_are_skipped() {
        let mut p = profile(vec![Color::from_span("T0", 0, 1, 2)], 2);
        p.layer_color_map.insert(0, "ghost");
        let analysis = analyze_overlaps(&p);
        assert!(analysis.overlaps.is_empty());
        assert_eq!(analysis.matrix.get("T0", "T0"), 2);
    }

    #[test]
    fn test_runs() {
        assert_eq!(longest_run(&[1, 2, 3, 7, 8]), 3);
        assert_eq!(longest_run(&[]), 0);
        assert_eq!(consecutive_runs(&[1, 2, 3, 7, 8, 10]), vec![(1, 3), (7, 8), (10, 10)]);
    }
}
