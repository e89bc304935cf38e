//! Automatic column layout of a [`NodeGraph`], used by the editor's auto-arrange command.
//!
//! Nodes are placed in columns by their distance to the terminal nodes (nodes whose outputs are not linked).
//! A node always ends up one column left of its left-most consumer, so every link points to the right.
//! Inside a column, nodes are stacked by row, where a node's row follows the input it feeds.
//!
//! Layout is cosmetic and never touches the execution state of a node. Nodes it cannot place keep their
//! position and get the cell `(-1, -1)`: nodes without links, and nodes on a cycle. Cycles are detected by
//! counting how often a node is pushed further left; past [`GraphSettings::loop_threshold`](crate::GraphSettings::loop_threshold) the node and
//! every node on a cycle with it are reported as loop suspects.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use anyhow::Result;
use glam::{IVec2, Vec2};
use petgraph::algo::tarjan_scc;

use crate::core::settings::GraphSettings;
use crate::graph::node::{NodeId, UNPLACED_CELL};
use crate::graph::node_graph::NodeGraph;
use crate::Error;

/// Outcome of an auto layout.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LayoutReport {
    /// Number of columns used.
    pub columns: usize,
    /// Nodes that received a cell, in insertion order.
    pub placed: Vec<NodeId>,
    /// Nodes on a cycle, in insertion order.
    pub loop_suspects: Vec<NodeId>,
    /// Nodes upstream of the root or of a root-flagged terminal, in insertion order. Independent of
    /// [`NodeGraph::is_used`], which only the scheduler maintains.
    pub used: Vec<NodeId>,
    /// Loop detection warnings logged, at most one per loop suspect.
    pub loop_warnings: usize,
}

#[derive(Debug, Default)]
struct Column {
    /// `(row, node)`, rows unique.
    nodes: Vec<(i32, NodeId)>,
    size: Vec2,
    offset: Vec2,
}

impl Column {
    fn add_node(&mut self, node: NodeId, row: i32) {
        let row = match self.nodes.iter().map(|(row, _)| *row).max() {
            Some(max) if self.nodes.iter().any(|(existing, _)| *existing == row) => max + 1,
            _ => row,
        };
        self.nodes.push((row, node));
    }
}

#[derive(Debug, Copy, Clone)]
struct Visit {
    node: NodeId,
    depth: i32,
    row: i32,
    used: bool,
}

/// Computes cells and positions for every node of a graph. See the [module documentation](self).
#[derive(Debug)]
pub struct GraphLayout {
    spacing: Vec2,
    centering: f32,
    loop_threshold: u32,
    root_name: String,
    depth: HashMap<NodeId, i32>,
    row: HashMap<NodeId, i32>,
    raises: HashMap<NodeId, u32>,
    used: HashSet<NodeId>,
    suspects: BTreeSet<NodeId>,
    loop_warnings: usize,
}

impl GraphLayout {
    pub fn new(settings: &GraphSettings) -> Self {
        Self {
            spacing: settings.node_spacing,
            centering: settings.node_centering,
            loop_threshold: settings.loop_threshold,
            root_name: settings.root_name.clone(),
            depth: HashMap::new(),
            row: HashMap::new(),
            raises: HashMap::new(),
            used: HashSet::new(),
            suspects: BTreeSet::new(),
            loop_warnings: 0,
        }
    }

    fn reset(&mut self, graph: &mut NodeGraph) {
        self.depth.clear();
        self.row.clear();
        self.raises.clear();
        self.used.clear();
        self.suspects.clear();
        self.loop_warnings = 0;
        for node in graph.nodes.values_mut() {
            node.cell = UNPLACED_CELL;
            node.inserted = false;
        }
    }

    /// Lay out the whole graph. `root` is always treated as a terminal node and as used.
    pub fn apply(&mut self, graph: &mut NodeGraph, root: Option<NodeId>) -> LayoutReport {
        self.reset(graph);

        let linked = graph
            .nodes
            .values()
            .filter(|node| {
                node.inputs
                    .iter()
                    .chain(node.outputs.iter())
                    .any(|slot| graph.slots.get(slot).map_or(false, |slot| slot.is_connected()))
            })
            .map(|node| node.id)
            .collect::<BTreeSet<_>>();
        let terminals = graph
            .nodes
            .values()
            .filter(|node| Some(node.id) == root || linked.contains(&node.id))
            .filter(|node| {
                Some(node.id) == root
                    || !node
                        .outputs
                        .iter()
                        .any(|slot| graph.slots.get(slot).map_or(false, |slot| slot.is_connected()))
            })
            .map(|node| (node.id, Some(node.id) == root || node.root || node.name == self.root_name))
            .collect::<Vec<_>>();

        for (row, (node, used)) in terminals.into_iter().enumerate() {
            self.assign_columns(graph, Visit {
                node,
                depth: 0,
                row: row as i32,
                used,
            });
        }
        // Nodes on a cycle without any terminal downstream are never reached from a terminal.
        let unreached = linked
            .iter()
            .copied()
            .filter(|node| !self.depth.contains_key(node) && !self.suspects.contains(node))
            .collect::<Vec<_>>();
        for node in unreached {
            if !self.depth.contains_key(&node) && !self.suspects.contains(&node) {
                let row = self.row.values().max().map_or(0, |row| row + 1);
                self.assign_columns(graph, Visit {
                    node,
                    depth: 0,
                    row,
                    used: false,
                });
            }
        }
        self.expand_suspects(graph);
        self.place(graph)
    }

    /// Push depths upstream until they settle. Depths only ever grow; a node grown more often than the loop
    /// threshold is marked as a loop suspect and not followed any further.
    fn assign_columns(&mut self, graph: &NodeGraph, start: Visit) {
        let mut stack = vec![start];
        while let Some(visit) = stack.pop() {
            if self.suspects.contains(&visit.node) {
                continue;
            }
            let mut changed = false;
            match self.depth.get(&visit.node).copied() {
                None => {
                    self.depth.insert(visit.node, visit.depth);
                    self.row.insert(visit.node, visit.row);
                    changed = true;
                }
                Some(depth) if visit.depth > depth => {
                    let raises = self.raises.entry(visit.node).or_insert(0);
                    *raises += 1;
                    if *raises > self.loop_threshold {
                        self.flag_suspect(graph, visit.node);
                        continue;
                    }
                    self.depth.insert(visit.node, visit.depth);
                    self.row.insert(visit.node, visit.row);
                    changed = true;
                }
                Some(_) => {}
            }
            if visit.used && self.used.insert(visit.node) {
                changed = true;
            }
            if !changed {
                continue;
            }

            let depth = self.depth.get(&visit.node).copied().unwrap_or(visit.depth);
            let row = self.row.get(&visit.node).copied().unwrap_or(visit.row);
            let used = self.used.contains(&visit.node);
            let Some(node) = graph.nodes.get(&visit.node) else { continue };
            for (index, input) in node.inputs.iter().enumerate() {
                let Some(slot) = graph.slots.get(input) else { continue };
                for peer in &slot.links {
                    let Some(upstream) = graph.node_of(*peer) else { continue };
                    stack.push(Visit {
                        node: upstream,
                        depth: depth + 1,
                        row: row + index as i32,
                        used,
                    });
                }
            }
        }
    }

    fn flag_suspect(&mut self, graph: &NodeGraph, node: NodeId) {
        if self.suspects.insert(node) {
            self.loop_warnings += 1;
            let name = graph.nodes.get(&node).map(|node| node.name.as_str()).unwrap_or_default();
            warn!("Auto layout: node `{name}` was moved more than {} times, it is probably part of a loop", self.loop_threshold);
        }
    }

    /// Every node sharing a cycle with a loop suspect is a loop suspect too.
    fn expand_suspects(&mut self, graph: &NodeGraph) {
        if self.suspects.is_empty() {
            return;
        }
        let (petgraph, _) = graph.to_petgraph();
        for component in tarjan_scc(&petgraph) {
            let ids = component.iter().map(|index| petgraph[*index].id).collect::<Vec<_>>();
            if ids.len() > 1 && ids.iter().any(|id| self.suspects.contains(id)) {
                for id in ids {
                    self.flag_suspect(graph, id);
                }
            }
        }
        for id in &self.suspects {
            self.depth.remove(id);
            self.row.remove(id);
        }
    }

    /// Bucket nodes per column and compute positions. Column 0 holds the terminal nodes at `x = 0`,
    /// each further column is placed to the left of the previous one.
    fn place(&self, graph: &mut NodeGraph) -> LayoutReport {
        let mut buckets: BTreeMap<i32, Column> = BTreeMap::new();
        for (id, depth) in self.depth.iter().collect::<BTreeMap<_, _>>() {
            let row = self.row.get(id).copied().unwrap_or(0);
            buckets.entry(*depth).or_default().add_node(*id, row);
        }

        let max_depth = buckets.keys().next_back().copied().unwrap_or(0);
        let mut x = 0.0;
        for (depth, column) in buckets.iter_mut() {
            column.nodes.sort();
            let sizes = column
                .nodes
                .iter()
                .filter_map(|(_, id)| graph.nodes.get(id).map(|node| node.size))
                .collect::<Vec<_>>();
            let width = sizes.iter().map(|size| size.x).fold(0.0, f32::max);
            let height = sizes.iter().map(|size| size.y).sum::<f32>()
                + self.spacing.y * sizes.len().saturating_sub(1) as f32;
            column.size = Vec2::new(width, height);
            if *depth > 0 {
                x -= self.spacing.x + width;
            }
            column.offset = Vec2::new(x, -height * 0.5);
        }

        let mut report = LayoutReport {
            columns: buckets.len(),
            ..Default::default()
        };
        for (depth, column) in &buckets {
            let mut y = column.offset.y;
            for (row, id) in &column.nodes {
                let Some(node) = graph.nodes.get_mut(id) else { continue };
                node.position = Vec2::new(
                    column.offset.x + column.size.x * self.centering - node.size.x * self.centering,
                    y,
                );
                y += node.size.y + self.spacing.y;
                node.cell = IVec2::new(max_depth - depth, *row);
                node.inserted = true;
                report.placed.push(*id);
            }
        }
        report.placed.sort();
        report.loop_suspects = self.suspects.iter().copied().collect();
        report.used = self.used.iter().copied().filter(|id| !self.suspects.contains(id)).collect();
        report.used.sort();
        report.loop_warnings = self.loop_warnings;
        report
    }
}

impl NodeGraph {
    /// Arrange every node in columns, with `root` as the right-most terminal. See [`GraphLayout`].
    /// # Errors
    /// * Fails if `root` is not a node of this graph.
    pub fn auto_layout(&mut self, root: NodeId) -> Result<LayoutReport> {
        if !self.nodes.contains_key(&root) {
            return Err(Error::NodeNotFound(root).into());
        }
        let mut layout = GraphLayout::new(&self.settings);
        let report = layout.apply(self, Some(root));
        info!(
            "Auto layout placed {} nodes in {} columns, {} loop suspects",
            report.placed.len(),
            report.columns,
            report.loop_suspects.len()
        );
        Ok(report)
    }
}
