//! The node graph: typed slots linking nodes together, a pull based scheduler executing them every frame,
//! a notification bus carrying changes over links, and an automatic layout for the editor.
//!
//! Nodes are declared with a [`NodeBuilder`](node::NodeBuilder) and own an optional [`NodeModule`](crate::NodeModule)
//! doing the actual work. Links always go from an output slot to an input slot of the same
//! [`SlotType`](slot::SlotType). The graph owns all nodes and slots; everything refers to everything else by id.
//!
//! # Example
//!
//! ```ignore
//! use lumo::prelude::*;
//!
//! let mut graph = NodeGraph::new(gpu.clone(), GraphSettings::default());
//! let scene = graph.add_node(
//!     NodeBuilder::new("scene")
//!         .output("pass", SlotType::ShaderPass)
//!         .module(scene_module),
//! );
//! let merger = graph.add_node(SceneMergerModule::node("main"));
//!
//! let pass = graph.output_slot(scene, 0).unwrap();
//! let free = graph.input_slot(merger, 0).unwrap();
//! graph.connect(pass, free)?;
//!
//! let mut ctx = ExecutionContext::new(gpu.clone());
//! for frame in 0.. {
//!     ctx.advance(1.0 / 60.0);
//!     let stats = graph.tick(frame, cmd, &mut ctx)?;
//!     let output = graph.output_descriptor(merger, 0);
//! }
//! ```
//!
//! Through the [`GraphViz`](graphviz::GraphViz) trait, it's possible to export a graphviz-compatible dot file to
//! display the graph, and [`render_svg`](graphviz::render_svg) turns that into an SVG image.

pub mod slot;
pub mod resource;
pub mod node;
pub mod notify;
pub mod node_graph;
pub mod connect;
pub mod scheduler;
pub mod layout;
pub mod graphviz;
