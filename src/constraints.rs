//! Layer Constraint Validation
//!
//! Finds layers that need more colors at once than there are slots, groups
//! them into ranges and proposes ways to consolidate colors inside each
//! range. Over-capacity layers are reported as data, never as errors.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;

use crate::color::{mergeable, ColorDistance, Rgb, VisualImpact};
use crate::config::ValidationConfig;
use crate::model::{Color, ColorId, ColorIndex, ColorUsageProfile};

/// Range usage below which a color is a removal candidate (percent)
const RARE_IN_RANGE: f64 = 5.0;
/// Range usage below which a color counts as detail (percent)
const DETAIL_IN_RANGE: f64 = 30.0;
/// Overall usage below which a color counts as detail (percent)
const DETAIL_OVERALL: f64 = 10.0;

// =============================================================================
// Violations
// =============================================================================

/// Why a layer cannot be printed as planned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    /// More simultaneous colors than slots; always critical
    Impossible,
}

/// A single over-capacity layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintViolation {
    pub layer: u32,
    pub kind: ViolationKind,
    pub required_colors: usize,
    pub available_slots: usize,
    pub colors: Vec<ColorId>,
}

impl ConstraintViolation {
    /// Colors beyond capacity on this layer
    pub fn excess(&self) -> usize {
        self.required_colors.saturating_sub(self.available_slots)
    }
}

// =============================================================================
// Suggestions
// =============================================================================

/// How a suggestion consolidates colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    /// Fold one color into a similar, more-used one
    Merge,
    /// Drop a color from the range
    Remove,
    /// Print a detail color with a similar existing color
    Replace,
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Remove => write!(f, "remove"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// A way to bring a violation range back under capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorConsolidationSuggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    /// Color that disappears from the range
    pub color: ColorId,
    /// Color that takes over its features (merge/replace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ColorId>,
    pub description: String,
    pub visual_impact: VisualImpact,
    /// Violating layers of the range that would fit after applying this
    pub layers_resolved: usize,
}

// =============================================================================
// Ranges and Result
// =============================================================================

/// Consecutive over-capacity layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRange {
    pub start_layer: u32,
    pub end_layer: u32,
    pub violations: Vec<ConstraintViolation>,
    pub max_required_colors: usize,
    /// Colors active on the violating layers, in declaration order
    pub colors_involved: Vec<ColorId>,
    pub suggestions: Vec<ColorConsolidationSuggestion>,
}

impl ViolationRange {
    pub fn layer_count(&self) -> u32 {
        self.end_layer - self.start_layer + 1
    }
}

/// Totals over all violations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub capacity: usize,
    pub violating_layers: usize,
    pub range_count: usize,
    pub max_required_colors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_layer: Option<u32>,
    pub affected_layer_percentage: f64,
    pub message: String,
}

/// Outcome of layer constraint validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintValidationResult {
    pub is_valid: bool,
    pub violation_ranges: Vec<ViolationRange>,
    pub summary: ValidationSummary,
}

impl ConstraintValidationResult {
    pub fn violations(&self) -> impl Iterator<Item = &ConstraintViolation> {
        self.violation_ranges.iter().flat_map(|r| r.violations.iter())
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Check every mapped layer against `capacity`.
///
/// Every layer present in the layer color map is checked, including layer 0
/// and layers past `totalLayers`, so a layer is flagged exactly when it maps
/// more colors than `capacity`.
pub fn validate_layers(
    profile: &ColorUsageProfile,
    capacity: usize,
    config: &ValidationConfig,
) -> ConstraintValidationResult {
    let violations: Vec<ConstraintViolation> = profile
        .layer_color_map
        .iter()
        .filter(|(_, colors)| colors.len() > capacity)
        .map(|(layer, colors)| ConstraintViolation {
            layer,
            kind: ViolationKind::Impossible,
            required_colors: colors.len(),
            available_slots: capacity,
            colors: colors.iter().map(|c| c.to_string()).collect(),
        })
        .collect();

    let index = profile.index();
    let violation_ranges: Vec<ViolationRange> = merge_violations(violations)
        .into_iter()
        .map(|violations| build_range(profile, &index, capacity, violations, config))
        .collect();

    let summary = summarize(profile, capacity, &violation_ranges);
    debug!(
        violating_layers = summary.violating_layers,
        ranges = summary.range_count,
        "layer validation complete"
    );

    ConstraintValidationResult {
        is_valid: violation_ranges.is_empty(),
        violation_ranges,
        summary,
    }
}

/// Group violations whose layers are at most one past the current range end
fn merge_violations(violations: Vec<ConstraintViolation>) -> Vec<Vec<ConstraintViolation>> {
    let mut groups: Vec<Vec<ConstraintViolation>> = Vec::new();
    for violation in violations {
        if let Some(group) = groups.last_mut() {
            let end = group.last().map(|v| v.layer).unwrap_or(violation.layer);
            if violation.layer <= end + 1 {
                group.push(violation);
                continue;
            }
        }
        groups.push(vec![violation]);
    }
    groups
}

fn build_range(
    profile: &ColorUsageProfile,
    index: &ColorIndex<'_>,
    capacity: usize,
    violations: Vec<ConstraintViolation>,
    config: &ValidationConfig,
) -> ViolationRange {
    let start_layer = violations.first().map(|v| v.layer).unwrap_or(0);
    let end_layer = violations.last().map(|v| v.layer).unwrap_or(start_layer);
    let max_required_colors = violations.iter().map(|v| v.required_colors).max().unwrap_or(0);

    let mut involved: Vec<ColorId> = Vec::new();
    for violation in &violations {
        for color in &violation.colors {
            if !involved.contains(color) {
                involved.push(color.clone());
            }
        }
    }
    involved.sort_by_key(|c| index.position(c).unwrap_or(usize::MAX));

    let mut range = ViolationRange {
        start_layer,
        end_layer,
        violations,
        max_required_colors,
        colors_involved: involved,
        suggestions: Vec::new(),
    };
    range.suggestions =
        suggest_consolidations(profile, index, capacity, &range, config.max_suggestions);
    range
}

/// Range-local usage of one color
struct RangeUsage<'a> {
    color: &'a Color,
    layers: usize,
    percentage: f64,
    rgb: Option<Rgb>,
}

fn suggest_consolidations(
    profile: &ColorUsageProfile,
    index: &ColorIndex<'_>,
    capacity: usize,
    range: &ViolationRange,
    max_suggestions: usize,
) -> Vec<ColorConsolidationSuggestion> {
    let span = range.layer_count() as f64;

    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for (_, colors) in profile.layer_color_map.iter_range(range.start_layer, range.end_layer) {
        for id in colors {
            if let Some(position) = index.position(id) {
                *counts.entry(position).or_default() += 1;
            }
        }
    }

    let usage: Vec<RangeUsage<'_>> = counts
        .into_iter()
        .map(|(position, layers)| {
            let color = &profile.colors[position];
            RangeUsage {
                color,
                layers,
                percentage: layers as f64 / span * 100.0,
                rgb: color.hex_value.as_deref().and_then(|hex| Rgb::from_hex(hex).ok()),
            }
        })
        .collect();

    let mut suggestions: Vec<ColorConsolidationSuggestion> = Vec::new();
    let mut seen: HashSet<(SuggestionKind, ColorId, Option<ColorId>)> = HashSet::new();
    let mut push = |suggestion: ColorConsolidationSuggestion| {
        let key = (suggestion.kind, suggestion.color.clone(), suggestion.target.clone());
        let removal_key = (SuggestionKind::Remove, suggestion.color.clone(), None);
        if suggestion.kind == SuggestionKind::Remove && seen.contains(&removal_key) {
            return;
        }
        if seen.insert(key) {
            suggestions.push(suggestion);
        }
    };

    // 1. Rarely used colors
    let mut rare: Vec<&RangeUsage<'_>> = usage
        .iter()
        .filter(|u| u.percentage < RARE_IN_RANGE)
        .collect();
    rare.sort_by(|a, b| a.layers.cmp(&b.layers));
    for u in rare {
        push(ColorConsolidationSuggestion {
            kind: SuggestionKind::Remove,
            color: u.color.id.clone(),
            target: None,
            description: format!(
                "Remove {}: used on only {} of {} layers in this range",
                u.color.display_name(),
                u.layers,
                range.layer_count()
            ),
            visual_impact: VisualImpact::Low,
            layers_resolved: layers_resolved(range, capacity, &u.color.id, None),
        });
    }

    // 2. Near-duplicate colors, folding the less-used one into the other
    for (i, a) in usage.iter().enumerate() {
        for b in &usage[i + 1..] {
            let (Some(rgb_a), Some(rgb_b)) = (a.rgb, b.rgb) else {
                continue;
            };
            if !mergeable(&rgb_a, &rgb_b) {
                continue;
            }
            let (source, target) = if less_used(a, b) { (a, b) } else { (b, a) };
            let distance = ColorDistance::between(&rgb_a, &rgb_b);
            push(ColorConsolidationSuggestion {
                kind: SuggestionKind::Merge,
                color: source.color.id.clone(),
                target: Some(target.color.id.clone()),
                description: format!(
                    "Merge {} into {} (visual distance {:.1})",
                    source.color.display_name(),
                    target.color.display_name(),
                    distance.visual_distance
                ),
                visual_impact: distance.quality_impact(),
                layers_resolved: layers_resolved(
                    range,
                    capacity,
                    &source.color.id,
                    Some(&target.color.id),
                ),
            });
        }
    }

    // 3. Small detail colors
    for u in usage
        .iter()
        .filter(|u| u.percentage < DETAIL_IN_RANGE && u.color.usage_percentage < DETAIL_OVERALL)
    {
        let partner = u.rgb.and_then(|rgb| {
            usage
                .iter()
                .filter(|other| other.color.id != u.color.id && !less_used(other, u))
                .filter_map(|other| {
                    let other_rgb = other.rgb?;
                    mergeable(&rgb, &other_rgb)
                        .then(|| (other, ColorDistance::between(&rgb, &other_rgb)))
                })
                .min_by(|x, y| x.1.visual_distance.total_cmp(&y.1.visual_distance))
        });

        let suggestion = match partner {
            Some((other, distance)) => ColorConsolidationSuggestion {
                kind: SuggestionKind::Replace,
                color: u.color.id.clone(),
                target: Some(other.color.id.clone()),
                description: format!(
                    "Print detail color {} with {} in this range",
                    u.color.display_name(),
                    other.color.display_name()
                ),
                visual_impact: distance.quality_impact().max(VisualImpact::Low),
                layers_resolved: layers_resolved(
                    range,
                    capacity,
                    &u.color.id,
                    Some(&other.color.id),
                ),
            },
            None => ColorConsolidationSuggestion {
                kind: SuggestionKind::Remove,
                color: u.color.id.clone(),
                target: None,
                description: format!(
                    "Remove detail color {} ({:.1}% of this range, {:.1}% overall)",
                    u.color.display_name(),
                    u.percentage,
                    u.color.usage_percentage
                ),
                visual_impact: VisualImpact::Medium,
                layers_resolved: layers_resolved(range, capacity, &u.color.id, None),
            },
        };
        push(suggestion);
    }

    suggestions.sort_by_key(|s| s.visual_impact);
    suggestions.truncate(max_suggestions);
    suggestions
}

/// Whether `a` is used less than `b` in the range (ties broken overall,
/// then by declaration order with the later color losing)
fn less_used(a: &RangeUsage<'_>, b: &RangeUsage<'_>) -> bool {
    match a.layers.cmp(&b.layers) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => a.color.usage_percentage < b.color.usage_percentage,
    }
}

/// Violating layers that fit once `color` is dropped or folded into `target`
fn layers_resolved(
    range: &ViolationRange,
    capacity: usize,
    color: &str,
    target: Option<&str>,
) -> usize {
    range
        .violations
        .iter()
        .filter(|v| {
            let has = |id: &str| v.colors.iter().any(|c| c == id);
            if !has(color) {
                return false;
            }
            let reduced = match target {
                Some(target) if !has(target) => v.required_colors,
                _ => v.required_colors - 1,
            };
            reduced <= capacity
        })
        .count()
}

fn summarize(
    profile: &ColorUsageProfile,
    capacity: usize,
    ranges: &[ViolationRange],
) -> ValidationSummary {
    let violating_layers: usize = ranges.iter().map(|r| r.violations.len()).sum();
    let worst = ranges
        .iter()
        .flat_map(|r| r.violations.iter())
        .fold(None::<&ConstraintViolation>, |best, v| match best {
            Some(b) if b.required_colors >= v.required_colors => Some(b),
            _ => Some(v),
        });
    let affected_layer_percentage = if profile.total_layers == 0 {
        0.0
    } else {
        violating_layers as f64 / profile.total_layers as f64 * 100.0
    };

    let message = match worst {
        None => format!("All layers fit within {} slots", capacity),
        Some(w) => format!(
            "{} layers in {} ranges need more than {} slots (worst: layer {} needs {})",
            violating_layers,
            ranges.len(),
            capacity,
            w.layer,
            w.required_colors
        ),
    };

    ValidationSummary {
        capacity,
        violating_layers,
        range_count: ranges.len(),
        max_required_colors: worst.map(|w| w.required_colors).unwrap_or(0),
        worst_layer: worst.map(|w| w.layer),
        affected_layer_percentage,
        message,
    }
}
