//! Color Compatibility Graph
//!
//! Undirected petgraph graph with one node per color and an edge between two
//! colors whenever their usage intervals do not overlap. A clique in this
//! graph is a set of colors that can take turns in a single slot.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

use crate::model::{Color, ColorId};

/// Interval compatibility graph over a profile's colors
pub struct CompatibilityGraph {
    /// Node weight is the color's declaration position
    pub(crate) graph: UnGraph<usize, ()>,

    /// Declared ids, in order
    pub(crate) ids: Vec<ColorId>,

    /// Node index lookup: color id -> NodeIndex
    pub(crate) node_indices: HashMap<ColorId, NodeIndex>,
}

impl CompatibilityGraph {
    /// Build the graph for `colors` in declaration order
    pub fn from_colors(colors: &[Color]) -> Self {
        let mut graph = UnGraph::with_capacity(colors.len(), colors.len() * colors.len() / 2);
        let mut node_indices = HashMap::with_capacity(colors.len());
        let mut nodes = Vec::with_capacity(colors.len());

        for (position, color) in colors.iter().enumerate() {
            let idx = graph.add_node(position);
            node_indices.insert(color.id.clone(), idx);
            nodes.push(idx);
        }

        for (i, a) in colors.iter().enumerate() {
            for (j, b) in colors.iter().enumerate().skip(i + 1) {
                if !a.intervals_overlap(b) {
                    graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }

        Self {
            graph,
            ids: colors.iter().map(|c| c.id.clone()).collect(),
            node_indices,
        }
    }

    pub fn color_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether two colors (by declaration position) may share a slot
    pub fn compatible(&self, a: usize, b: usize) -> bool {
        self.graph
            .find_edge(NodeIndex::new(a), NodeIndex::new(b))
            .is_some()
    }

    /// Whether two colors (by id) may share a slot
    pub fn compatible_ids(&self, a: &str, b: &str) -> bool {
        match (self.node_indices.get(a), self.node_indices.get(b)) {
            (Some(&x), Some(&y)) => self.graph.find_edge(x, y).is_some(),
            _ => false,
        }
    }

    /// Compatible partners of a color, in declaration order
    pub fn partners(&self, id: &str) -> Vec<&ColorId> {
        let Some(&node_idx) = self.node_indices.get(id) else {
            return Vec::new();
        };

        let mut positions: Vec<usize> = self
            .graph
            .edges(node_idx)
            .filter_map(|e| {
                let other = if e.source() == node_idx { e.target() } else { e.source() };
                self.graph.node_weight(other).copied()
            })
            .collect();
        positions.sort_unstable();
        positions.into_iter().map(|p| &self.ids[p]).collect()
    }

    /// Greedily grow a clique from `seed`, admitting candidates in the given
    /// order when they are compatible with every current member.
    pub fn grow_clique(&self, seed: usize, candidates: &[usize], max_size: usize) -> Vec<usize> {
        let mut clique = vec![seed];
        for &candidate in candidates {
            if clique.len() >= max_size {
                break;
            }
            if candidate == seed {
                continue;
            }
            if clique.iter().all(|&member| self.compatible(member, candidate)) {
                clique.push(candidate);
            }
        }
        clique
    }

    /// Render as Graphviz DOT (undirected)
    pub fn to_dot(&self, colors: &[Color]) -> String {
        let mut output = String::new();

        output.push_str("graph Compatibility {\n");
        output.push_str(
            "  node [shape=circle, style=filled, fontname=\"Helvetica\", fontsize=10];\n",
        );
        output.push('\n');

        for (position, id) in self.ids.iter().enumerate() {
            let fill = colors
                .get(position)
                .and_then(|c| c.hex_value.as_deref())
                .unwrap_or("#9E9E9E");
            let label = colors.get(position).map(Color::display_name).unwrap_or(id.as_str());
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                id, label, fill
            ));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            if let (Some(&a), Some(&b)) = (
                self.graph.node_weight(edge.source()),
                self.graph.node_weight(edge.target()),
            ) {
                output.push_str(&format!("  \"{}\" -- \"{}\";\n", self.ids[a], self.ids[b]));
            }
        }

        output.push_str("}\n");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> Vec<Color> {
        vec![
            Color::from_span("T0", 0, 9, 20),
            Color::from_span("T1", 10, 19, 20),
            Color::from_span("T2", 5, 14, 20),
        ]
    }

    #[test]
    fn test_edges_only_between_disjoint_intervals() {
        let graph = CompatibilityGraph::from_colors(&colors());
        assert_eq!(graph.color_count(), 3);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.compatible(0, 1));
        assert!(graph.compatible(1, 0));
        assert!(!graph.compatible(0, 2));
        assert!(graph.compatible_ids("T1", "T0"));
        assert!(!graph.compatible_ids("T1", "missing"));
    }

    #[test]
    fn test_partners() {
        let graph = CompatibilityGraph::from_colors(&colors());
        assert_eq!(graph.partners("T0"), vec!["T1"]);
        assert!(graph.partners("T2").is_empty());
    }

    #[test]
    fn test_grow_clique_respects_max_size() {
        let sequential: Vec<Color> = (0..6)
            .map(|i| Color::from_span(format!("T{}", i), i * 10, i * 10 + 9, 60))
            .collect();
        let graph = CompatibilityGraph::from_colors(&sequential);
        let all: Vec<usize> = (0..6).collect();
        assert_eq!(graph.grow_clique(0, &all, 4), vec![0, 1, 2, 3]);
        assert_eq!(graph.grow_clique(5, &all, 10).len(), 6);
    }

    #[test]
    fn test_dot_output() {
        let c = colors();
        let dot = CompatibilityGraph::from_colors(&c).to_dot(&c);
        assert!(dot.starts_with("graph Compatibility {"));
        assert!(dot.contains("\"T0\" -- \"T1\";"));
        assert!(!dot.contains("\"T2\" --"));
    }
}
