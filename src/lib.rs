//! Filament Slot Planner
//!
//! Plans how the filament colors of a multi-color print share the limited
//! slots of a material system, and when the operator has to swap spools.
//!
//! ## Features
//!
//! - **Overlap Analysis**: co-occurrence matrix and per-pair overlap severity
//! - **Slot Assignment**: interval partitioning or affinity clustering into K slots
//! - **Swap Scheduling**: ordered manual swaps with Z heights
//! - **Timing Windows**: flexible swap windows with ranked alternative layers
//! - **Constraint Validation**: over-capacity layers with consolidation suggestions
//! - **Substitution Search**: near-duplicate colors whose merge removes swaps
//!
//! ## Architecture
//!
//! ```text
//! ColorUsageProfile
//! ├── overlap ──► assignment ──► schedule ──► timing   (OptimizationResult)
//! ├── constraints                                      (ConstraintValidationResult)
//! └── similarity                                       (SubstitutionAnalysis)
//! ```
//!
//! The G-code parser producing the profile and anything consuming the plan
//! live outside this crate; all shapes cross the boundary as camelCase JSON.

pub mod assignment;
pub mod checksum;
pub mod color;
pub mod compatibility;
pub mod config;
pub mod constraints;
pub mod error;
pub mod model;
pub mod optimizer;
pub mod overlap;
pub mod schedule;
pub mod similarity;
pub mod timing;

pub use assignment::{assign_slots, AssignmentContext, SlotAssigner, SlotAssignment};
pub use checksum::ProfileFingerprint;
pub use color::{ColorDistance, Rgb, VisualImpact};
pub use compatibility::CompatibilityGraph;
pub use config::{AssignmentStrategy, PlannerConfig};
pub use constraints::{
    validate_layers, ConstraintValidationResult, ConstraintViolation, ViolationRange,
};
pub use error::{PlannerError, Result};
pub use model::{Color, ColorId, ColorUsageProfile, LayerColorMap, ToolChange};
pub use optimizer::{OptimizationResult, PlanReport, SlotOptimizer};
pub use overlap::{analyze_overlaps, CoOccurrenceMatrix, Overlap, OverlapAnalysis, OverlapSeverity};
pub use schedule::{generate_swaps, ManualSwap};
pub use similarity::{find_substitutions, Substitution, SubstitutionAnalysis};
pub use timing::{TimingAnalysis, TimingAnalyzer, TimingWindow};
