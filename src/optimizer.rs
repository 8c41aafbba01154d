//! Slot Optimizer
//!
//! Runs the planning pipeline over one profile:
//!
//! ```text
//! profile → overlaps → slot assignment → swap schedule → timing windows
//!        ↘ layer constraint validation (advisory)
//!        ↘ substitution search (advisory)
//! ```
//!
//! Every pass is a pure function of the profile and the configuration, so
//! the optimizer holds nothing but its config.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assignment::{assign_slots, AssignmentContext, SlotAssignment};
use crate::checksum::ProfileFingerprint;
use crate::compatibility::CompatibilityGraph;
use crate::config::PlannerConfig;
use crate::constraints::{validate_layers, ConstraintValidationResult};
use crate::error::Result;
use crate::model::ColorUsageProfile;
use crate::overlap::analyze_overlaps;
use crate::schedule::{generate_swaps, render_instructions, ManualSwap};
use crate::similarity::{find_substitutions, SubstitutionAnalysis};
use crate::timing::{attach_windows, TimingAnalysis, TimingAnalyzer};

/// Slot plan for one print
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub total_colors: usize,
    /// Slots in use, never more than the capacity
    pub required_slots: usize,
    pub slot_assignments: Vec<SlotAssignment>,
    /// Ordered by layer, then slot, each with its timing window
    pub manual_swaps: Vec<ManualSwap>,
    /// Seconds saved against the slicer's own tool changes
    pub estimated_time_saved: u64,
    /// Whether any two colors have disjoint usage intervals
    pub can_share_slots: bool,
}

impl OptimizationResult {
    /// Slot holding `color`
    pub fn slot_of(&self, color: &str) -> Option<&SlotAssignment> {
        self.slot_assignments.iter().find(|s| s.holds(color))
    }
}

/// Everything the planner knows about one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    pub fingerprint: ProfileFingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    pub optimization: OptimizationResult,
    pub validation: ConstraintValidationResult,
    pub substitutions: SubstitutionAnalysis,
    pub timing: TimingAnalysis,
    pub instructions: Vec<String>,
}

impl PlanReport {
    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }
}

/// Planner entry point
#[derive(Debug, Clone, Default)]
pub struct SlotOptimizer {
    config: PlannerConfig,
}

impl SlotOptimizer {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Assign slots, schedule swaps and attach timing windows
    pub fn optimize(&self, profile: &ColorUsageProfile) -> Result<OptimizationResult> {
        self.check(profile)?;

        let overlaps = analyze_overlaps(profile);
        let ctx = AssignmentContext::new(profile, &overlaps, &self.config.slots);
        let slot_assignments = assign_slots(&ctx);

        let mut manual_swaps = generate_swaps(profile, &slot_assignments);
        let timing = TimingAnalyzer::new(profile, &self.config.timing).analyze(&manual_swaps);
        attach_windows(&mut manual_swaps, &timing);

        let automatic = profile.swap_count();
        let swaps_saved = automatic.saturating_sub(manual_swaps.len());
        let estimated_time_saved =
            swaps_saved as u64 * u64::from(self.config.timing.seconds_per_swap);

        let result = OptimizationResult {
            total_colors: profile.colors.len(),
            required_slots: slot_assignments.len(),
            can_share_slots: CompatibilityGraph::from_colors(&profile.colors).edge_count() > 0,
            slot_assignments,
            manual_swaps,
            estimated_time_saved,
        };

        info!(
            colors = result.total_colors,
            slots = result.required_slots,
            swaps = result.manual_swaps.len(),
            strategy = ?self.config.slots.strategy,
            "optimization complete"
        );
        Ok(result)
    }

    /// Find layers needing more simultaneous colors than there are slots
    pub fn validate_constraints(
        &self,
        profile: &ColorUsageProfile,
    ) -> Result<ConstraintValidationResult> {
        self.check(profile)?;
        Ok(validate_layers(profile, self.config.slots.capacity, &self.config.validation))
    }

    /// Search for swap-saving color substitutions
    pub fn find_substitutions(&self, profile: &ColorUsageProfile) -> Result<SubstitutionAnalysis> {
        self.check(profile)?;
        Ok(find_substitutions(
            profile,
            &self.config.similarity,
            self.config.timing.seconds_per_swap,
        ))
    }

    /// Timing windows for an existing swap schedule
    pub fn analyze_timing(
        &self,
        profile: &ColorUsageProfile,
        swaps: &[ManualSwap],
    ) -> TimingAnalysis {
        TimingAnalyzer::new(profile, &self.config.timing).analyze(swaps)
    }

    /// Run every pass and bundle the results
    pub fn report(&self, profile: &ColorUsageProfile) -> Result<PlanReport> {
        let optimization = self.optimize(profile)?;
        let timing = optimization
            .manual_swaps
            .iter()
            .filter_map(|s| s.timing_window.clone().map(|w| (s.key(), w)))
            .collect();

        Ok(PlanReport {
            fingerprint: ProfileFingerprint::of(profile)?,
            generated_at: None,
            instructions: render_instructions(profile, &optimization.manual_swaps),
            validation: validate_layers(
                profile,
                self.config.slots.capacity,
                &self.config.validation,
            ),
            substitutions: find_substitutions(
                profile,
                &self.config.similarity,
                self.config.timing.seconds_per_swap,
            ),
            timing,
            optimization,
        })
    }

    fn check(&self, profile: &ColorUsageProfile) -> Result<()> {
        self.config.validate()?;
        profile.validate()?;
        debug!(
            colors = profile.colors.len(),
            layers = profile.total_layers,
            "profile accepted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlannerError;
    use crate::model::{Color, ToolChange};

    fn three_colors() -> ColorUsageProfile {
        ColorUsageProfile::new(
            20,
            4.0,
            vec![
                Color::from_span("T0", 0, 9, 20),
                Color::from_span("T1", 10, 19, 20),
                Color::from_span("T2", 5, 14, 20),
            ],
        )
        .with_tool_changes(vec![
            ToolChange::new("T0", "T2", 5),
            ToolChange::new("T2", "T0", 6),
            ToolChange::new("T0", "T2", 7),
            ToolChange::new("T2", "T1", 10),
        ])
    }

    #[test]
    fn test_two_slot_plan() {
        let optimizer = SlotOptimizer::new(PlannerConfig::with_capacity(2));
        let result = optimizer.optimize(&three_colors()).unwrap();

        assert_eq!(result.total_colors, 3);
        assert_eq!(result.required_slots, 2);
        assert_eq!(result.slot_assignments[0].colors, vec!["T0", "T1"]);
        assert_eq!(result.slot_assignments[1].colors, vec!["T2"]);
        assert_eq!(result.manual_swaps.len(), 1);
        assert_eq!(result.manual_swaps[0].at_layer, 10);
        assert!(result.manual_swaps[0].timing_window.is_some());
        assert!(result.can_share_slots);
        // four slicer changes against one manual swap
        assert_eq!(result.estimated_time_saved, 90);
        assert_eq!(result.slot_of("T1").map(|s| s.slot), Some(1));
    }

    #[test]
    fn test_unknown_tool_changes_save_nothing() {
        let profile = ColorUsageProfile::new(
            20,
            4.0,
            vec![Color::from_span("T0", 0, 9, 20), Color::from_span("T1", 10, 19, 20)],
        )
        .with_tool_changes(vec![
            ToolChange::new("T0", "ghost", 3),
            ToolChange::new("ghost", "T1", 4),
            ToolChange::new("T1", "T9", 12),
            ToolChange::new("T9", "T0", 13),
        ]);
        let result = SlotOptimizer::new(PlannerConfig::with_capacity(2))
            .optimize(&profile)
            .unwrap();
        assert!(result.manual_swaps.is_empty());
        assert_eq!(result.estimated_time_saved, 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let optimizer = SlotOptimizer::new(PlannerConfig::with_capacity(0));
        assert!(matches!(
            optimizer.optimize(&three_colors()),
            Err(PlannerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_empty_profile_is_noop() {
        let result = SlotOptimizer::default()
            .optimize(&ColorUsageProfile::new(0, 0.0, Vec::new()))
            .unwrap();
        assert_eq!(result.total_colors, 0);
        assert!(result.slot_assignments.is_empty());
        assert!(result.manual_swaps.is_empty());
        assert!(!result.can_share_slots);
    }

    #[test]
    fn test_report_bundles_all_passes() {
        let profile = three_colors();
        let report = SlotOptimizer::new(PlannerConfig::with_capacity(2))
            .report(&profile)
            .unwrap();
        assert_eq!(report.fingerprint, ProfileFingerprint::of(&profile).unwrap());
        assert_eq!(report.instructions.len(), 1);
        assert_eq!(report.timing.len(), 1);
        assert!(report.timing.contains_key("T0-T1-10"));
        // layers 5..=9 and 10..=14 hold two colors each
        assert!(report.validation.is_valid);
        assert!(report.generated_at.is_none());
    }
}
