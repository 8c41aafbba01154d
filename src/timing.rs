//! Swap Timing Windows
//!
//! For every manual swap, works out how early and how late the operator may
//! perform it, ranks nearby alternative layers and scores how much freedom
//! the swap really has.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::TimingConfig;
use crate::model::ColorUsageProfile;
use crate::schedule::ManualSwap;

const BASE_SCORE: f64 = 50.0;
const EARLY_BONUS: f64 = 15.0;
const SIMPLE_LAYER_BONUS: f64 = 20.0;
const COMPLEX_LAYER_PENALTY: f64 = 15.0;
const DISTANCE_PENALTY_PER_LAYER: f64 = 5.0;
const MAX_DISTANCE_PENALTY: f64 = 30.0;
const CLUSTER_PENALTY: f64 = 20.0;

// =============================================================================
// Types
// =============================================================================

/// Whether a constraint can be bent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    Hard,
    Soft,
}

/// A rule bounding when a swap may happen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingConstraint {
    pub kind: ConstraintKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
    /// How much the constraint matters, 0..=100
    pub impact: f64,
}

/// A layer the swap could move to instead of the nominal one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingAlternative {
    pub layer: u32,
    pub z_height: f64,
    pub score: f64,
    pub tradeoffs: Vec<String>,
}

/// Independent 0..=100 confidence scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingConfidence {
    /// From the flexibility score
    pub timing: f64,
    /// Mean constraint impact
    pub necessity: f64,
    /// Grows with the number of alternatives
    pub user_control: f64,
}

/// When a swap may happen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingWindow {
    pub earliest: u32,
    pub latest: u32,
    pub optimal: u32,
    pub flexibility_score: f64,
    pub constraints: Vec<TimingConstraint>,
    pub alternatives: Vec<TimingAlternative>,
    pub confidence: TimingConfidence,
}

impl TimingWindow {
    pub fn contains(&self, layer: u32) -> bool {
        self.earliest <= layer && layer <= self.latest
    }

    pub fn span(&self) -> u32 {
        self.latest - self.earliest
    }

    fn refresh_confidence(&mut self) {
        let necessity = if self.constraints.is_empty() {
            0.0
        } else {
            self.constraints.iter().map(|c| c.impact).sum::<f64>() / self.constraints.len() as f64
        };
        self.confidence = TimingConfidence {
            timing: self.flexibility_score,
            necessity,
            user_control: (self.alternatives.len() as f64 * 20.0).min(100.0),
        };
    }
}

/// Timing windows keyed by `{fromColor}-{toColor}-{atLayer}`
pub type TimingAnalysis = BTreeMap<String, TimingWindow>;

/// Flexibility of a window of `span` layers
pub fn flexibility_score(span: u32) -> f64 {
    (f64::from(span) * 10.0).clamp(0.0, 100.0)
}

// =============================================================================
// Analyzer
// =============================================================================

/// Computes timing windows for a profile's swaps
pub struct TimingAnalyzer<'a> {
    profile: &'a ColorUsageProfile,
    config: &'a TimingConfig,
}

impl<'a> TimingAnalyzer<'a> {
    pub fn new(profile: &'a ColorUsageProfile, config: &'a TimingConfig) -> Self {
        Self { profile, config }
    }

    /// Window for one swap, or `None` when either color is unknown
    pub fn analyze_swap(&self, swap: &ManualSwap) -> Option<TimingWindow> {
        let index = self.profile.index();
        let from = index.resolve(&swap.from_color, "swap source")?;
        let to = index.resolve(&swap.to_color, "swap target")?;
        let buffer = self.config.buffer_layers;
        let nominal = swap.at_layer;

        // Hard bounds: after the source finishes, no later than the target's first layer
        let hard_lo = from.last_layer.saturating_add(1);
        let hard_hi = to.first_layer;

        let earliest = from.last_layer.saturating_add(buffer).max(hard_lo);
        let latest = earliest.max(to.first_layer.saturating_sub(buffer)).min(hard_hi);
        // The nominal layer is always an admissible choice
        let earliest = earliest.min(nominal);
        let latest = latest.max(nominal);

        let constraints = vec![
            TimingConstraint {
                kind: ConstraintKind::Hard,
                description: format!(
                    "Must follow the last use of {} at layer {}",
                    from.display_name(),
                    from.last_layer
                ),
                layer: Some(from.last_layer),
                impact: 100.0,
            },
            TimingConstraint {
                kind: ConstraintKind::Hard,
                description: format!(
                    "Must precede the first use of {} at layer {}",
                    to.display_name(),
                    to.first_layer
                ),
                layer: Some(to.first_layer),
                impact: 100.0,
            },
            TimingConstraint {
                kind: ConstraintKind::Soft,
                description: format!("Keep a {}-layer buffer around the swap", buffer),
                layer: None,
                impact: 50.0,
            },
        ];

        let (nominal_score, _) = self.score_layer(nominal, nominal);
        let mut alternatives: Vec<TimingAlternative> = (earliest..=latest)
            .filter(|&layer| layer != nominal && hard_lo <= layer && layer <= hard_hi)
            .map(|layer| {
                let (score, tradeoffs) = self.score_layer(layer, nominal);
                TimingAlternative {
                    layer,
                    z_height: self.profile.z_height(layer),
                    score,
                    tradeoffs,
                }
            })
            .collect();
        alternatives.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.layer.cmp(&b.layer)));
        alternatives.truncate(self.config.max_alternatives);

        let optimal = match alternatives.first() {
            Some(best) if best.score > nominal_score => best.layer,
            _ => nominal,
        };

        let mut window = TimingWindow {
            earliest,
            latest,
            optimal,
            flexibility_score: flexibility_score(latest - earliest),
            constraints,
            alternatives,
            confidence: TimingConfidence {
                timing: 0.0,
                necessity: 0.0,
                user_control: 0.0,
            },
        };
        window.refresh_confidence();
        Some(window)
    }

    /// Windows for every swap, with the clustered-swap penalty applied
    pub fn analyze(&self, swaps: &[ManualSwap]) -> TimingAnalysis {
        let mut windows: Vec<Option<TimingWindow>> =
            swaps.iter().map(|s| self.analyze_swap(s)).collect();

        for i in 0..swaps.len() {
            for j in (i + 1)..swaps.len() {
                if swaps[i].at_layer.abs_diff(swaps[j].at_layer) > 1 {
                    continue;
                }
                for (own, other) in [(i, j), (j, i)] {
                    if let Some(window) = windows[own].as_mut() {
                        window.flexibility_score =
                            (window.flexibility_score - CLUSTER_PENALTY).max(0.0);
                        window.constraints.push(TimingConstraint {
                            kind: ConstraintKind::Soft,
                            description: format!(
                                "Within one layer of the slot {} swap at layer {}",
                                swaps[other].slot, swaps[other].at_layer
                            ),
                            layer: Some(swaps[other].at_layer),
                            impact: 30.0,
                        });
                    }
                }
            }
        }

        let analysis: TimingAnalysis = swaps
            .iter()
            .zip(windows)
            .filter_map(|(swap, window)| {
                let mut window = window?;
                window.refresh_confidence();
                Some((swap.key(), window))
            })
            .collect();

        debug!(windows = analysis.len(), "timing analysis complete");
        analysis
    }

    /// Score a candidate layer against the nominal swap layer
    fn score_layer(&self, layer: u32, nominal: u32) -> (f64, Vec<String>) {
        let mut score = BASE_SCORE;
        let mut tradeoffs = Vec::new();

        if self.config.prefer_early && layer < nominal {
            score += EARLY_BONUS;
            tradeoffs.push("Earlier than planned, frees the slot sooner".to_string());
        }

        let active = self.profile.layer_color_map.count_at(layer);
        if active <= 1 {
            score += SIMPLE_LAYER_BONUS;
            tradeoffs.push(format!("Simple layer ({} active colors)", active));
        } else if active > 3 {
            score -= COMPLEX_LAYER_PENALTY;
            tradeoffs.push(format!("Complex layer ({} active colors)", active));
        }

        let distance = layer.abs_diff(nominal);
        if distance > 0 {
            score -= (f64::from(distance) * DISTANCE_PENALTY_PER_LAYER).min(MAX_DISTANCE_PENALTY);
            tradeoffs.push(format!("{} layers from the planned swap", distance));
        }

        (score.clamp(0.0, 100.0), tradeoffs)
    }
}

/// Copy computed windows onto their swaps
pub fn attach_windows(swaps: &mut [ManualSwap], analysis: &TimingAnalysis) {
    for swap in swaps.iter_mut() {
        swap.timing_window = analysis.get(&swap.key()).cloned();
    }
}
