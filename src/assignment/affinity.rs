//! Affinity clustering
//!
//! Scores every pair of colors on three factors and greedily grows clusters
//! of high-affinity colors, keeping the best cluster over all seeds each
//! round.
//!
//! | Factor | Max | Shape |
//! |---|---|---|
//! | proximity | 50 | linear decay over `proximity_window` layers of interval gap |
//! | frequency / utilization similarity | 30 | 15 + 15, shrinking with the differences |
//! | co-occurrence | 40 | proportional to shared layers, capped at 10 |

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

use super::{AssignmentContext, SlotAssigner};
use crate::model::Color;

const PROXIMITY_MAX: f64 = 50.0;
const SIMILARITY_MAX: f64 = 30.0;
const CO_OCCURRENCE_MAX: f64 = 40.0;
const CO_OCCURRENCE_CAP: u32 = 10;
const FREQUENCY_CAP: f64 = 10.0;

/// Per-factor affinity of a color pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffinityBreakdown {
    pub proximity: f64,
    pub similarity: f64,
    pub co_occurrence: f64,
}

impl AffinityBreakdown {
    pub fn total(&self) -> f64 {
        self.proximity + self.similarity + self.co_occurrence
    }
}

/// Affinity of two colors.
///
/// `frequencies` are the tool changes into each color; `shared_layers` the
/// co-occurrence count from the overlap matrix.
pub fn pair_affinity(
    a: &Color,
    b: &Color,
    frequencies: (usize, usize),
    shared_layers: u32,
    proximity_window: u32,
) -> AffinityBreakdown {
    let gap = a.interval_gap(b).max(0) as f64;
    let window = f64::from(proximity_window);
    let proximity = if window > 0.0 && gap < window {
        PROXIMITY_MAX * (1.0 - gap / window)
    } else {
        0.0
    };

    let frequency_diff = (frequencies.0 as f64 - frequencies.1 as f64).abs();
    let usage_diff = (a.usage_percentage - b.usage_percentage).abs();
    let half = SIMILARITY_MAX / 2.0;
    let similarity = half * (1.0 - frequency_diff.min(FREQUENCY_CAP) / FREQUENCY_CAP)
        + half * (1.0 - usage_diff.min(100.0) / 100.0);

    let co_occurrence = CO_OCCURRENCE_MAX * f64::from(shared_layers.min(CO_OCCURRENCE_CAP))
        / f64::from(CO_OCCURRENCE_CAP);

    AffinityBreakdown {
        proximity,
        similarity,
        co_occurrence,
    }
}

/// Greedy multi-factor affinity clustering
#[derive(Debug, Clone, Copy, Default)]
pub struct AffinityClustering;

impl AffinityClustering {
    /// Symmetric pairwise affinity totals in declaration order
    pub fn matrix(ctx: &AssignmentContext<'_>) -> Vec<Vec<f64>> {
        let colors = &ctx.profile.colors;
        let frequency: HashMap<&str, usize> = ctx.profile.change_frequency();
        let freq = |c: &Color| frequency.get(c.id.as_str()).copied().unwrap_or(0);

        let n = colors.len();
        let mut matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (&colors[i], &colors[j]);
                let affinity = pair_affinity(
                    a,
                    b,
                    (freq(a), freq(b)),
                    ctx.overlaps.matrix.get_index(i, j),
                    ctx.config.proximity_window,
                )
                .total();
                matrix[i][j] = affinity;
                matrix[j][i] = affinity;
            }
        }
        matrix
    }
}

impl SlotAssigner for AffinityClustering {
    fn name(&self) -> &'static str {
        "affinity-clustering"
    }

    fn partition(&self, ctx: &AssignmentContext<'_>) -> Vec<Vec<usize>> {
        let affinity = Self::matrix(ctx);
        let capacity = ctx.capacity();
        let max_size = ctx.max_per_slot();
        let threshold = ctx.config.affinity_threshold;

        let mut unassigned: Vec<usize> = (0..ctx.profile.colors.len()).collect();
        let mut clusters = Vec::new();

        while clusters.len() < capacity && !unassigned.is_empty() {
            let mut best: Option<(Vec<usize>, f64)> = None;

            for &seed in &unassigned {
                let (cluster, score) =
                    grow_cluster(seed, &unassigned, &affinity, threshold, max_size);
                if best.as_ref().map_or(true, |(_, s)| score > *s) {
                    best = Some((cluster, score));
                }
            }

            let Some((cluster, score)) = best else {
                break;
            };
            trace!(slot = clusters.len() + 1, size = cluster.len(), score, "selected cluster");
            unassigned.retain(|c| !cluster.contains(c));
            clusters.push(cluster);
        }

        clusters
    }
}

/// Grow one cluster from `seed`: admit the unassigned candidate with the
/// highest mean affinity to the cluster while it beats the threshold.
fn grow_cluster(
    seed: usize,
    unassigned: &[usize],
    affinity: &[Vec<f64>],
    threshold: f64,
    max_size: usize,
) -> (Vec<usize>, f64) {
    let mut cluster = vec![seed];
    let mut score = 0.0;

    while cluster.len() < max_size {
        let mut best: Option<(usize, f64)> = None;
        for &candidate in unassigned {
            if cluster.contains(&candidate) {
                continue;
            }
            let mean =
                cluster.iter().map(|&m| affinity[m][candidate]).sum::<f64>() / cluster.len() as f64;
            if best.map_or(true, |(_, a)| mean > a) {
                best = Some((candidate, mean));
            }
        }

        match best {
            Some((candidate, mean)) if mean > threshold => {
                cluster.push(candidate);
                score += mean;
            }
            _ => break,
        }
    }

    (cluster, score)
}
