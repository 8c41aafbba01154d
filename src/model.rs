//! Color usage model
//!
//! The input of every pass: which colors exist, which layers use them and
//! which colors are active on each layer. Produced by the G-code parsing
//! collaborator and treated as read-only here.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::warn;

use crate::error::{PlannerError, Result};

/// Color identifier (tool id such as "T0")
pub type ColorId = String;

// =============================================================================
// Color
// =============================================================================

/// One filament color and where it is used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Color {
    pub id: ColorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex_value: Option<String>,
    #[serde(default)]
    pub layers_used: BTreeSet<u32>,
    /// Layers where the color appears but is not the dominant one
    #[serde(default)]
    pub partial_layers: BTreeSet<u32>,
    pub first_layer: u32,
    pub last_layer: u32,
    #[serde(default)]
    pub usage_percentage: f64,
}

impl Color {
    /// Build a color from the layers it is used on, deriving first/last
    /// layer and usage percentage.
    pub fn from_layers(
        id: impl Into<ColorId>,
        layers: impl IntoIterator<Item = u32>,
        total_layers: u32,
    ) -> Self {
        let layers_used: BTreeSet<u32> = layers.into_iter().collect();
        let first_layer = layers_used.first().copied().unwrap_or(0);
        let last_layer = layers_used.last().copied().unwrap_or(0);
        let usage_percentage = if total_layers == 0 {
            0.0
        } else {
            layers_used.len() as f64 / total_layers as f64 * 100.0
        };
        Self {
            id: id.into(),
            name: None,
            hex_value: None,
            layers_used,
            partial_layers: BTreeSet::new(),
            first_layer,
            last_layer,
            usage_percentage,
        }
    }

    /// Build a color used on every layer of `range` (inclusive)
    pub fn from_span(id: impl Into<ColorId>, first: u32, last: u32, total_layers: u32) -> Self {
        Self::from_layers(id, first..=last, total_layers)
    }

    pub fn with_hex(mut self, hex: impl Into<String>) -> Self {
        self.hex_value = Some(hex.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name for operator-facing text, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Inclusive usage interval
    pub fn interval(&self) -> (u32, u32) {
        (self.first_layer, self.last_layer)
    }

    /// Whether the usage intervals of two colors intersect
    pub fn intervals_overlap(&self, other: &Color) -> bool {
        self.first_layer <= other.last_layer && other.first_layer <= self.last_layer
    }

    /// Layers strictly between the two intervals; negative when they overlap
    pub fn interval_gap(&self, other: &Color) -> i64 {
        let (a, b) = if self.first_layer <= other.first_layer {
            (self, other)
        } else {
            (other, self)
        };
        i64::from(b.first_layer) - i64::from(a.last_layer) - 1
    }
}

// =============================================================================
// Layer Color Map
// =============================================================================

/// Ordered mapping layer index → colors active on that layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerColorMap(BTreeMap<u32, Vec<ColorId>>);

impl LayerColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `color` active on `layer`
    pub fn insert(&mut self, layer: u32, color: impl Into<ColorId>) {
        let color = color.into();
        let entry = self.0.entry(layer).or_default();
        if !entry.contains(&color) {
            entry.push(color);
        }
    }

    /// Derive the map from the colors' own layer sets
    pub fn from_colors(colors: &[Color]) -> Self {
        let mut map = Self::new();
        for color in colors {
            for &layer in &color.layers_used {
                map.insert(layer, color.id.clone());
            }
        }
        map
    }

    /// Colors active on `layer` (empty for unmapped layers)
    pub fn colors_at(&self, layer: u32) -> &[ColorId] {
        self.0.get(&layer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct colors active on `layer`
    pub fn count_at(&self, layer: u32) -> usize {
        distinct(self.colors_at(layer)).len()
    }

    pub fn contains(&self, layer: u32, color: &str) -> bool {
        self.colors_at(layer).iter().any(|c| c == color)
    }

    /// Iterate layers in ascending order with their distinct colors
    pub fn iter(&self) -> impl Iterator<Item = (u32, Vec<&str>)> + '_ {
        self.0.iter().map(|(layer, colors)| (*layer, distinct(colors)))
    }

    /// Layers within `first..=last`, ascending, with their distinct colors
    pub fn iter_range(&self, first: u32, last: u32) -> impl Iterator<Item = (u32, Vec<&str>)> + '_ {
        self.0
            .range(first..=last)
            .map(|(layer, colors)| (*layer, distinct(colors)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn distinct(colors: &[ColorId]) -> Vec<&str> {
    let mut seen = HashSet::new();
    colors
        .iter()
        .map(String::as_str)
        .filter(|c| seen.insert(*c))
        .collect()
}

// =============================================================================
// Tool Changes
// =============================================================================

/// A tool change emitted by the slicer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolChange {
    pub from_tool: ColorId,
    pub to_tool: ColorId,
    pub at_layer: u32,
}

impl ToolChange {
    pub fn new(from: impl Into<ColorId>, to: impl Into<ColorId>, at_layer: u32) -> Self {
        Self {
            from_tool: from.into(),
            to_tool: to.into(),
            at_layer,
        }
    }

    /// A change that actually switches filament
    pub fn is_swap(&self) -> bool {
        self.from_tool != self.to_tool
    }
}

/// Number of tool changes that switch filament
pub fn count_swaps(changes: &[ToolChange]) -> usize {
    changes.iter().filter(|c| c.is_swap()).count()
}

// =============================================================================
// Color Usage Profile
// =============================================================================

/// Everything a planning run consumes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorUsageProfile {
    pub total_layers: u32,
    /// Print height in mm
    pub total_height: f64,
    pub colors: Vec<Color>,
    #[serde(default)]
    pub tool_changes: Vec<ToolChange>,
    pub layer_color_map: LayerColorMap,
}

impl ColorUsageProfile {
    /// Build a profile whose layer map is derived from the colors
    pub fn new(total_layers: u32, total_height: f64, colors: Vec<Color>) -> Self {
        let layer_color_map = LayerColorMap::from_colors(&colors);
        Self {
            total_layers,
            total_height,
            colors,
            tool_changes: Vec::new(),
            layer_color_map,
        }
    }

    pub fn with_tool_changes(mut self, tool_changes: Vec<ToolChange>) -> Self {
        self.tool_changes = tool_changes;
        self
    }

    /// Parse a profile from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check the calling contract: unique ids, sane height, ordered spans.
    pub fn validate(&self) -> Result<()> {
        if !self.total_height.is_finite() || self.total_height < 0.0 {
            return Err(PlannerError::InvalidInput(format!(
                "totalHeight must be a non-negative number, got {}",
                self.total_height
            )));
        }

        let mut seen = HashSet::new();
        for color in &self.colors {
            if color.id.is_empty() {
                return Err(PlannerError::InvalidInput("color with empty id".to_string()));
            }
            if !seen.insert(color.id.as_str()) {
                return Err(PlannerError::DuplicateColor(color.id.clone()));
            }
            if color.first_layer > color.last_layer {
                return Err(PlannerError::InvalidInput(format!(
                    "color {} has firstLayer {} after lastLayer {}",
                    color.id, color.first_layer, color.last_layer
                )));
            }
        }
        Ok(())
    }

    /// Strict referential check: every id in the layer map and tool changes
    /// must name a declared color. The passes themselves only warn.
    pub fn check_references(&self) -> Result<()> {
        let index = self.index();
        for (layer, colors) in self.layer_color_map.iter() {
            if let Some(unknown) = colors.iter().find(|c| !index.contains(c)) {
                return Err(PlannerError::ReferentialInconsistency {
                    color: unknown.to_string(),
                    context: format!("layer {}", layer),
                });
            }
        }
        for change in &self.tool_changes {
            for tool in [&change.from_tool, &change.to_tool] {
                if !index.contains(tool) {
                    return Err(PlannerError::ReferentialInconsistency {
                        color: tool.clone(),
                        context: format!("tool change at layer {}", change.at_layer),
                    });
                }
            }
        }
        Ok(())
    }

    /// Id lookup over the declared colors
    pub fn index(&self) -> ColorIndex<'_> {
        ColorIndex::new(&self.colors)
    }

    /// Z height (mm) of a layer, linear over the print
    pub fn z_height(&self, layer: u32) -> f64 {
        if self.total_layers == 0 {
            return 0.0;
        }
        layer as f64 / self.total_layers as f64 * self.total_height
    }

    /// Tool changes between declared colors. Changes naming an unknown id
    /// are skipped with a warning.
    pub fn known_tool_changes(&self) -> Vec<&ToolChange> {
        let index = self.index();
        self.tool_changes
            .iter()
            .filter(|change| {
                index.resolve(&change.from_tool, "tool change source").is_some()
                    && index.resolve(&change.to_tool, "tool change target").is_some()
            })
            .collect()
    }

    /// Slicer swaps between declared colors
    pub fn swap_count(&self) -> usize {
        self.known_tool_changes().into_iter().filter(|c| c.is_swap()).count()
    }

    /// Tool changes into each color
    pub fn change_frequency(&self) -> HashMap<&str, usize> {
        let mut frequency: HashMap<&str, usize> = HashMap::new();
        for change in self.known_tool_changes().into_iter().filter(|c| c.is_swap()) {
            *frequency.entry(change.to_tool.as_str()).or_default() += 1;
        }
        frequency
    }
}

// =============================================================================
// Color Index
// =============================================================================

/// Borrowed id → color lookup preserving declaration order
#[derive(Debug, Clone)]
pub struct ColorIndex<'a> {
    colors: &'a [Color],
    positions: HashMap<&'a str, usize>,
}

impl<'a> ColorIndex<'a> {
    pub fn new(colors: &'a [Color]) -> Self {
        let mut positions = HashMap::with_capacity(colors.len());
        for (i, color) in colors.iter().enumerate() {
            positions.entry(color.id.as_str()).or_insert(i);
        }
        Self { colors, positions }
    }

    pub fn get(&self, id: &str) -> Option<&'a Color> {
        self.positions.get(id).map(|&i| &self.colors[i])
    }

    /// Declaration position of a color
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Resolve an id, logging and returning `None` for unknown ones
    pub fn resolve(&self, id: &str, context: &str) -> Option<&'a Color> {
        let color = self.get(id);
        if color.is_none() {
            warn!(color = id, context, "skipping unknown color id");
        }
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_layers_derives_invariants() {
        let color = Color::from_layers("T0", [4, 2, 9, 2], 20);
        assert_eq!(color.first_layer, 2);
        assert_eq!(color.last_layer, 9);
        assert_eq!(color.layers_used.len(), 3);
        assert!((color.usage_percentage - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_interval_gap() {
        let a = Color::from_span("A", 0, 9, 30);
        let b = Color::from_span("B", 10, 19, 30);
        let c = Color::from_span("C", 5, 14, 30);
        assert_eq!(a.interval_gap(&b), 0);
        assert_eq!(b.interval_gap(&a), 0);
        assert!(!a.intervals_overlap(&b));
        assert!(a.intervals_overlap(&c));
        assert!(a.interval_gap(&c) < 0);
    }

    #[test]
    fn test_layer_map_dedupes() {
        let mut map = LayerColorMap::new();
        map.insert(3, "T0");
        map.insert(3, "T0");
        map.insert(3, "T1");
        assert_eq!(map.count_at(3), 2);
        assert_eq!(map.count_at(4), 0);
        assert!(map.contains(3, "T1"));
    }

    #[test]
    fn test_profile_json_uses_camel_case() {
        let json = r##"{
            "totalLayers": 10,
            "totalHeight": 2.0,
            "colors": [
                {"id": "T0", "hexValue": "#FF0000", "layersUsed": [0, 1],
                 "firstLayer": 0, "lastLayer": 1, "usagePercentage": 20.0}
            ],
            "toolChanges": [{"fromTool": "T0", "toTool": "T0", "atLayer": 1}],
            "layerColorMap": {"0": ["T0"], "1": ["T0"]}
        }"##;
        let profile = ColorUsageProfile::from_json(json).unwrap();
        assert_eq!(profile.colors[0].hex_value.as_deref(), Some("#FF0000"));
        assert_eq!(profile.layer_color_map.count_at(1), 1);
        assert_eq!(count_swaps(&profile.tool_changes), 0);
        assert!(profile.validate().is_ok());
        assert!(profile.check_references().is_ok());
    }

    #[test]
    fn test_missing_collection_fails() {
        let json = r#"{"totalLayers": 10, "totalHeight": 2.0}"#;
        assert!(matches!(
            ColorUsageProfile::from_json(json),
            Err(PlannerError::Json(_))
        ));
    }

    #[test]
    fn test_duplicate_color_rejected() {
        let profile = ColorUsageProfile::new(
            10,
            2.0,
            vec![Color::from_span("T0", 0, 3, 10), Color::from_span("T0", 4, 6, 10)],
        );
        assert!(matches!(profile.validate(), Err(PlannerError::DuplicateColor(id)) if id == "T0"));
    }

    #[test]
    fn test_unknown_reference_detected() {
        let profile = ColorUsageProfile::new(10, 2.0, vec![Color::from_span("T0", 0, 3, 10)])
            .with_tool_changes(vec![ToolChange::new("T0", "T9", 4)]);
        assert!(matches!(
            profile.check_references(),
            Err(PlannerError::ReferentialInconsistency { color, .. }) if color == "T9"
        ));
    }

    #[test]
    fn test_unknown_tool_changes_skipped() {
        let profile = ColorUsageProfile::new(
            10,
            2.0,
            vec![Color::from_span("T0", 0, 4, 10), Color::from_span("T1", 5, 9, 10)],
        )
        .with_tool_changes(vec![
            ToolChange::new("T0", "T1", 5),
            ToolChange::new("T1", "ghost", 6),
            ToolChange::new("T9", "T0", 7),
            ToolChange::new("T0", "T0", 8),
        ]);
        assert_eq!(profile.known_tool_changes().len(), 2);
        assert_eq!(profile.swap_count(), 1);
        assert_eq!(profile.change_frequency().get("T1"), Some(&1));
        assert!(!profile.change_frequency().contains_key("ghost"));
    }

    #[test]
    fn test_z_height_guards_empty_print() {
        let profile = ColorUsageProfile::new(0, 10.0, Vec::new());
        assert_eq!(profile.z_height(5), 0.0);
        let profile = ColorUsageProfile::new(100, 20.0, Vec::new());
        assert!((profile.z_height(50) - 10.0).abs() < 1e-9);
    }
}
