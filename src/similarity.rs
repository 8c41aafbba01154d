//! Color Substitution Search
//!
//! Looks for near-duplicate colors whose merge would remove filament swaps.
//! Every candidate pair is evaluated by replaying the slicer's tool-change
//! sequence with one color standing in for the other.
//!
//! Feasibility of a substitution starts at 100:
//!
//! | Term | Effect |
//! |---|---|
//! | visual distance | −1.5 per point |
//! | swaps reduced | +10 each |
//! | usage difference over 20 points | −15 |
//! | new conflict runs | −20 each |
//! | visual distance ≤ 10 | +20 |

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::color::{ColorDistance, Rgb, VisualImpact};
use crate::config::SimilarityConfig;
use crate::model::{count_swaps, Color, ColorId, ColorUsageProfile, ToolChange};
use crate::overlap::{analyze_overlaps, consecutive_runs, OverlapAnalysis};

const USAGE_DIFF_LIMIT: f64 = 20.0;
const CLOSE_MATCH_DISTANCE: f64 = 10.0;

// =============================================================================
// Types
// =============================================================================

/// How urgently a substitution is worth applying
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn classify(confidence: f64, swaps_reduced: usize) -> Self {
        if confidence >= 80.0 && swaps_reduced >= 2 {
            Self::High
        } else if confidence >= 70.0 || swaps_reduced >= 2 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Print `original_color` with `substitute_color` instead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substitution {
    pub original_color: ColorId,
    pub substitute_color: ColorId,
    pub visual_distance: f64,
    pub rgb_distance: f64,
    pub delta_e: f64,
    pub quality_impact: VisualImpact,
    pub swaps_reduced: usize,
    /// Contiguous layer runs where both colors are printed together
    pub new_conflicts: usize,
    pub feasibility: f64,
    pub confidence: f64,
    pub priority: Priority,
}

impl Substitution {
    pub fn involves(&self, color: &str) -> bool {
        self.original_color == color || self.substitute_color == color
    }
}

/// Effect of applying the best non-conflicting substitutions together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallImpact {
    pub original_swap_count: usize,
    pub optimized_swap_count: usize,
    pub total_swaps_reduced: usize,
    /// Worst visual impact among the applied substitutions
    pub quality_impact: VisualImpact,
    pub time_saved_seconds: u64,
    pub applied: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionAnalysis {
    /// Ranked by swaps reduced, then confidence
    pub substitutions: Vec<Substitution>,
    pub overall_impact: OverallImpact,
    pub recommendations: Vec<String>,
}

// =============================================================================
// Search
// =============================================================================

/// Find substitutions that remove swaps at acceptable visual cost.
///
/// Colors without a parseable hex value are skipped with a warning.
pub fn find_substitutions(
    profile: &ColorUsageProfile,
    config: &SimilarityConfig,
    seconds_per_swap: u32,
) -> SubstitutionAnalysis {
    let rgb: Vec<(&Color, Rgb)> = profile
        .colors
        .iter()
        .filter_map(|color| {
            let hex = color.hex_value.as_deref()?;
            match Rgb::from_hex(hex) {
                Ok(value) => Some((color, value)),
                Err(e) => {
                    warn!(
                        color = %color.id,
                        error = %e,
                        "skipping color with unparseable hex value"
                    );
                    None
                }
            }
        })
        .collect();

    let overlaps = analyze_overlaps(profile);
    let changes = profile.known_tool_changes();
    let baseline = changes.iter().filter(|c| c.is_swap()).count();
    let mut substitutions = Vec::new();

    for (i, (a, rgb_a)) in rgb.iter().enumerate() {
        for (b, rgb_b) in &rgb[i + 1..] {
            let distance = ColorDistance::between(rgb_a, rgb_b);
            if distance.visual_distance > config.max_visual_distance {
                continue;
            }
            let (original, substitute) = substitution_direction(a, b);
            let candidate =
                evaluate(&changes, &overlaps, baseline, original, substitute, &distance);
            if candidate.swaps_reduced > 0 && candidate.feasibility >= config.min_feasibility {
                substitutions.push(candidate);
            }
        }
    }

    substitutions.sort_by(|x, y| {
        y.swaps_reduced
            .cmp(&x.swaps_reduced)
            .then(y.confidence.total_cmp(&x.confidence))
            .then_with(|| x.original_color.cmp(&y.original_color))
            .then_with(|| x.substitute_color.cmp(&y.substitute_color))
    });

    let overall_impact = overall_impact(&changes, &substitutions, baseline, seconds_per_swap);
    let recommendations = recommendations(&substitutions, &overall_impact);

    debug!(
        candidates = substitutions.len(),
        swaps_reduced = overall_impact.total_swaps_reduced,
        "substitution search complete"
    );

    SubstitutionAnalysis {
        substitutions,
        overall_impact,
        recommendations,
    }
}

/// The less-used color is replaced by the more-used one; ties go by id so
/// the outcome does not depend on declaration order.
fn substitution_direction<'a>(a: &'a Color, b: &'a Color) -> (&'a Color, &'a Color) {
    let a_first = a
        .usage_percentage
        .total_cmp(&b.usage_percentage)
        .then_with(|| b.id.cmp(&a.id))
        .is_lt();
    if a_first {
        (a, b)
    } else {
        (b, a)
    }
}

fn evaluate(
    changes: &[&ToolChange],
    overlaps: &OverlapAnalysis,
    baseline: usize,
    original: &Color,
    substitute: &Color,
    distance: &ColorDistance,
) -> Substitution {
    let mapping = HashMap::from([(original.id.as_str(), substitute.id.as_str())]);
    let replayed = substitute_changes(changes, &mapping);
    let swaps_reduced = baseline.saturating_sub(count_swaps(&replayed));

    let new_conflicts = overlaps
        .get(&original.id, &substitute.id)
        .map(|o| consecutive_runs(&o.overlap_layers).len())
        .unwrap_or(0);

    let vd = distance.visual_distance;
    let mut feasibility = 100.0 - 1.5 * vd + 10.0 * swaps_reduced as f64;
    if (original.usage_percentage - substitute.usage_percentage).abs() > USAGE_DIFF_LIMIT {
        feasibility -= 15.0;
    }
    feasibility -= 20.0 * new_conflicts as f64;
    if vd <= CLOSE_MATCH_DISTANCE {
        feasibility += 20.0;
    }
    let confidence = feasibility.clamp(0.0, 100.0);

    Substitution {
        original_color: original.id.clone(),
        substitute_color: substitute.id.clone(),
        visual_distance: vd,
        rgb_distance: distance.rgb_distance,
        delta_e: distance.delta_e,
        quality_impact: distance.quality_impact(),
        swaps_reduced,
        new_conflicts,
        feasibility,
        confidence,
        priority: Priority::classify(confidence, swaps_reduced),
    }
}

/// Replay tool changes with colors renamed through `mapping`
fn substitute_changes(changes: &[&ToolChange], mapping: &HashMap<&str, &str>) -> Vec<ToolChange> {
    let rename = |id: &str| mapping.get(id).copied().unwrap_or(id).to_string();
    changes
        .iter()
        .map(|c| ToolChange::new(rename(&c.from_tool), rename(&c.to_tool), c.at_layer))
        .collect()
}

/// Greedily apply ranked substitutions that share no color and recount
fn overall_impact(
    changes: &[&ToolChange],
    substitutions: &[Substitution],
    baseline: usize,
    seconds_per_swap: u32,
) -> OverallImpact {
    let mut used: HashSet<&str> = HashSet::new();
    let mut mapping: HashMap<&str, &str> = HashMap::new();
    let mut applied = Vec::new();
    let mut quality_impact = VisualImpact::Minimal;

    for (i, s) in substitutions.iter().enumerate() {
        if used.contains(s.original_color.as_str()) || used.contains(s.substitute_color.as_str()) {
            continue;
        }
        used.insert(s.original_color.as_str());
        used.insert(s.substitute_color.as_str());
        mapping.insert(s.original_color.as_str(), s.substitute_color.as_str());
        quality_impact = quality_impact.max(s.quality_impact);
        applied.push(i);
    }

    let optimized = count_swaps(&substitute_changes(changes, &mapping));
    let total_swaps_reduced = baseline.saturating_sub(optimized);

    OverallImpact {
        original_swap_count: baseline,
        optimized_swap_count: optimized,
        total_swaps_reduced,
        quality_impact,
        time_saved_seconds: total_swaps_reduced as u64 * u64::from(seconds_per_swap),
        applied,
    }
}

fn recommendations(substitutions: &[Substitution], impact: &OverallImpact) -> Vec<String> {
    if substitutions.is_empty() {
        return vec!["No color substitution removes a swap at acceptable visual cost".to_string()];
    }

    let mut lines: Vec<String> = impact
        .applied
        .iter()
        .map(|&i| {
            let s = &substitutions[i];
            format!(
                "Print {} with {}: {} fewer swaps, {} visual impact ({:?} priority)",
                s.original_color, s.substitute_color, s.swaps_reduced, s.quality_impact, s.priority
            )
        })
        .collect();

    lines.push(format!(
        "Applying {} substitution(s) cuts swaps from {} to {}, saving about {} s",
        impact.applied.len(),
        impact.original_swap_count,
        impact.optimized_swap_count,
        impact.time_saved_seconds
    ));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alternating(colors: Vec<Color>, pattern: &[&str]) -> ColorUsageProfile {
        let changes = pattern
            .windows(2)
            .enumerate()
            .map(|(layer, pair)| ToolChange::new(pair[0], pair[1], layer as u32))
            .collect();
        ColorUsageProfile::new(20, 4.0, colors).with_tool_changes(changes)
    }

    fn reds() -> Vec<Color> {
        vec![
            Color::from_span("T0", 0, 19, 20).with_hex("#FF0000"),
            Color::from_span("T1", 0, 9, 20).with_hex("#FE0101"),
            Color::from_span("T2", 0, 19, 20).with_hex("#0000FF"),
        ]
    }

    #[test]
    fn test_near_duplicate_found() {
        let profile = alternating(reds(), &["T0", "T1", "T0", "T1", "T2"]);
        let analysis = find_substitutions(&profile, &SimilarityConfig::default(), 30);

        assert_eq!(analysis.substitutions.len(), 1);
        let s = &analysis.substitutions[0];
        assert_eq!(s.original_color, "T1");
        assert_eq!(s.substitute_color, "T0");
        assert_eq!(s.swaps_reduced, 3);
        assert_eq!(s.quality_impact, VisualImpact::Minimal);
        // one shared run over layers 0..=9
        assert_eq!(s.new_conflicts, 1);
        assert_eq!(s.confidence, 100.0);
        assert_eq!(s.priority, Priority::High);

        assert_eq!(analysis.overall_impact.original_swap_count, 4);
        assert_eq!(analysis.overall_impact.optimized_swap_count, 1);
        assert_eq!(analysis.overall_impact.time_saved_seconds, 90);
    }

    #[test]
    fn test_changes_with_unknown_colors_not_counted() {
        let mut profile = alternating(reds(), &["T0", "T1", "T0", "T1", "T2"]);
        profile.tool_changes.extend([
            ToolChange::new("T2", "ghost", 10),
            ToolChange::new("ghost", "T1", 11),
            ToolChange::new("T1", "T9", 12),
        ]);
        let analysis = find_substitutions(&profile, &SimilarityConfig::default(), 30);

        assert_eq!(analysis.substitutions[0].swaps_reduced, 3);
        assert_eq!(analysis.overall_impact.original_swap_count, 4);
        assert_eq!(analysis.overall_impact.optimized_swap_count, 1);
        assert_eq!(analysis.overall_impact.time_saved_seconds, 90);
    }

    #[test]
    fn test_order_independent() {
        let pattern = ["T0", "T1", "T0", "T1", "T2"];
        let config = SimilarityConfig::default();
        let forward = find_substitutions(&alternating(reds(), &pattern), &config, 30);
        let mut reversed = reds();
        reversed.reverse();
        let backward = find_substitutions(&alternating(reversed, &pattern), &config, 30);
        assert_eq!(forward.substitutions, backward.substitutions);
    }

    #[test]
    fn test_no_swaps_saved_is_dropped() {
        let profile = alternating(reds(), &["T0", "T2", "T0"]);
        let analysis = find_substitutions(&profile, &SimilarityConfig::default(), 30);
        assert!(analysis.substitutions.is_empty());
        assert_eq!(analysis.overall_impact.total_swaps_reduced, 0);
        assert_eq!(analysis.recommendations.len(), 1);
    }

    #[test]
    fn test_distant_colors_skipped() {
        let colors = vec![
            Color::from_span("T0", 0, 9, 20).with_hex("#FF0000"),
            Color::from_span("T1", 10, 19, 20).with_hex("#00FF00"),
        ];
        let profile = alternating(colors, &["T0", "T1", "T0", "T1"]);
        assert!(find_substitutions(&profile, &SimilarityConfig::default(), 30)
            .substitutions
            .is_empty());
    }

    #[test]
    fn test_priority_classification() {
        assert_eq!(Priority::classify(85.0, 2), Priority::High);
        assert_eq!(Priority::classify(85.0, 1), Priority::Medium);
        assert_eq!(Priority::classify(50.0, 3), Priority::Medium);
        assert_eq!(Priority::classify(65.0, 1), Priority::Low);
    }

    #[test]
    fn test_bad_hex_skipped() {
        let colors = vec![
            Color::from_span("T0", 0, 9, 20).with_hex("#FF0000"),
            Color::from_span("T1", 10, 19, 20).with_hex("not-a-color"),
        ];
        let profile = alternating(colors, &["T0", "T1", "T0"]);
        assert!(find_substitutions(&profile, &SimilarityConfig::default(), 30)
            .substitutions
            .is_empty());
    }
}
