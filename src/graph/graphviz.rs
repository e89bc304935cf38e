//! Exports a [`NodeGraph`] to petgraph, for cycle checks and topological ordering, and from there to
//! graphviz `dot` and SVG for debugging.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use anyhow::Result;
use layout::backends::svg::SVGWriter;
use layout::gv;
use layout::gv::GraphBuilder;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};

use crate::graph::node::NodeId;
use crate::graph::node_graph::NodeGraph;
use crate::graph::slot::SlotType;
use crate::Error;

/// Trait for graphs that can be displayed with graphviz.
pub trait GraphViz {
    /// Get the string representation of this graph in `dot` format.
    fn dot(&self) -> Result<String>;
}

/// Node weight of the exported graph.
#[derive(Debug, Clone)]
pub struct DotNode {
    pub id: NodeId,
    pub name: String,
    pub used: bool,
    pub root: bool,
}

impl Display for DotNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl NodeGraph {
    /// Node-level view of this graph: one vertex per node, one edge per link, from producer to consumer.
    pub fn to_petgraph(&self) -> (DiGraph<DotNode, SlotType>, HashMap<NodeId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for node in self.nodes.values() {
            let index = graph.add_node(DotNode {
                id: node.id,
                name: node.name.clone(),
                used: node.used,
                root: node.root || node.name == self.settings.root_name,
            });
            indices.insert(node.id, index);
        }
        for (from, to) in self.links() {
            let (Some(from_slot), Some(to_slot)) = (self.slots.get(&from), self.slots.get(&to)) else {
                continue;
            };
            let (Some(a), Some(b)) = (indices.get(&from_slot.node), indices.get(&to_slot.node)) else {
                continue;
            };
            graph.add_edge(*a, *b, from_slot.slot_type);
        }
        (graph, indices)
    }

    /// Whether the links of this graph form a cycle.
    pub fn has_cycle(&self) -> bool {
        let (graph, _) = self.to_petgraph();
        petgraph::algo::is_cyclic_directed(&graph)
    }

    /// Every node ordered so producers come before their consumers.
    /// # Errors
    /// * Fails with [`Error::ExecutionCycle`] if the graph contains a cycle.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let (graph, _) = self.to_petgraph();
        match petgraph::algo::toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(|index| graph[index].id).collect()),
            Err(cycle) => Err(Error::ExecutionCycle(graph[cycle.node_id()].name.clone()).into()),
        }
    }

    fn get_edge_attributes(_: &DiGraph<DotNode, SlotType>, _: EdgeReference<SlotType>) -> String {
        String::from("")
    }

    fn get_node_attributes(_: &DiGraph<DotNode, SlotType>, node: (NodeIndex, &DotNode)) -> String {
        match (node.1.root, node.1.used) {
            (true, _) => String::from("fillcolor = \"#5e6df7\" shape=box"),
            (false, true) => String::from("fillcolor = \"#5ef78a\""),
            (false, false) => String::from("fillcolor = \"#f75e70\""),
        }
    }
}

impl GraphViz for NodeGraph {
    fn dot(&self) -> Result<String> {
        let (graph, _) = self.to_petgraph();
        Ok(format!(
            "{}",
            Dot::with_attr_getters(&graph, &[], &Self::get_edge_attributes, &Self::get_node_attributes)
        ))
    }
}

/// Lay out a `dot` graph and render it to an SVG document.
pub fn render_svg(dot: &str) -> Result<String> {
    let mut parser = gv::DotParser::new(dot);
    match parser.process() {
        Ok(graph) => {
            let mut svg = SVGWriter::new();
            let mut builder = GraphBuilder::new();
            builder.visit_graph(&graph);
            let mut vg = builder.get();
            vg.do_it(false, false, false, &mut svg);
            Ok(svg.finalize())
        }
        Err(err) => {
            parser.print_error();
            Err(anyhow::anyhow!("dot render error: {err}"))
        }
    }
}
