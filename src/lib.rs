//! Dataflow node graph execution engine for Vulkan node-based editors.
//!
//! Lumo turns a user-authored graph of processing nodes into a per-frame execution schedule. Each node owns
//! a module that renders with the GPU; the engine decides which modules run every frame, in which order,
//! hands their results downstream, propagates resizes through the graph and manages double-buffered render
//! targets so nodes can read their own previous frame.
//!
//! To get started, import everything through the prelude
//! ```
//! use lumo::prelude::*;
//! ```
//!
//! # Example
//!
//! All GPU work goes through a [`Gpu`] handle wrapping a [`GpuBackend`]. With an existing Vulkan device,
//! use the provided [`VulkanBackend`]:
//! ```ignore
//! use lumo::prelude::*;
//!
//! let gpu = Gpu::new(VulkanBackend::new(&instance, physical_device, device.clone())?);
//! ```
//! Settings tune the scheduler and the auto layout:
//! ```
//! use lumo::prelude::*;
//!
//! let settings = GraphSettingsBuilder::new()
//!     .root_name("main")
//!     .loop_threshold(50)
//!     .build();
//! ```
//! Then build a graph, link nodes and tick it once per frame:
//! ```ignore
//! let mut graph = NodeGraph::new(gpu.clone(), settings);
//! let source = graph.add_node(NodeBuilder::new("noise").output("out", SlotType::Texture2D).module(noise));
//! let main = graph.add_node(NodeBuilder::new("main").input("in", SlotType::Texture2D).module(view));
//! graph.connect(graph.output_slot(source, 0).unwrap(), graph.input_slot(main, 0).unwrap())?;
//!
//! let mut ctx = ExecutionContext::new(gpu.clone());
//! let stats = graph.tick(frame, cmd, &mut ctx)?;
//! let image = graph.output_descriptor(main, 0);
//! ```
//! For further details, check out the following modules
//! - [`graph`] for nodes, slots, scheduling, notifications and layout.
//! - [`module`] for the interface node modules implement, and the built-in scene merger.
//! - [`resource`] for double-buffered frame buffers.
//! - [`core`] for errors, settings and the GPU backend.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod core;
pub mod graph;
pub mod module;
pub mod resource;
