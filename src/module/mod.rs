//! The contract between the graph and the modules doing the actual rendering work.
//!
//! Every node may own one [`NodeModule`]. The graph drives it: it initializes the module when the node
//! is added, hands it the resources of linked upstream outputs through [`NodeModule::set_input`], forwards
//! resize requests, and calls [`NodeModule::execute`] when the scheduler decides the node must run.
//! After execution, the graph reads [`NodeModule::output`] for every output slot and publishes it downstream.
//!
//! # Example
//!
//! A module that fills a frame buffer with a constant color every time its input changes.
//! ```ignore
//! use lumo::prelude::*;
//!
//! struct Fill {
//!     target: Option<FrameBuffer>,
//!     color: [f32; 4],
//! }
//!
//! impl NodeModule for Fill {
//!     fn init(&mut self, gpu: &Gpu) -> Result<()> {
//!         self.target = Some(FrameBuffer::new(gpu.clone(), FrameBufferCreateInfo::default())?);
//!         Ok(())
//!     }
//!
//!     fn execute(&mut self, _frame: u64, cmd: vk::CommandBuffer, _ctx: &mut ExecutionContext) -> Result<()> {
//!         let target = self.target.as_mut().ok_or(Error::Uncategorized("not initialized"))?;
//!         target.set_clear_color(self.color);
//!         target.begin(cmd)?;
//!         target.end(cmd)
//!     }
//!
//!     fn output(&self, _binding: u32) -> Option<SlotResource> {
//!         let target = self.target.as_ref()?;
//!         Some(SlotResource::Texture2D {
//!             descriptor: target.front_descriptor(0),
//!             extent: target.output_size(),
//!         })
//!     }
//! }
//! ```

pub mod context;
pub mod shader_pass;
pub mod scene_merger;

use anyhow::Result;
use ash::vk;

use crate::core::gpu::Gpu;
use crate::graph::node::ExecutionMode;
use crate::graph::notify::Notification;
use crate::graph::resource::SlotResource;
use crate::graph::slot::{SlotId, SlotType};
use crate::module::context::ExecutionContext;

/// Identifies the input slot a resource is delivered to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Port {
    pub slot: SlotId,
    pub binding: u32,
    pub slot_type: SlotType,
}

/// Work done by a node. Only [`NodeModule::init`], [`NodeModule::execute`] and [`NodeModule::output`]
/// are required, everything else defaults to doing nothing.
pub trait NodeModule {
    /// Create GPU resources. On error the graph calls [`NodeModule::unit`] and marks the node as failed.
    fn init(&mut self, gpu: &Gpu) -> Result<()>;

    /// Release GPU resources. Called when the node is removed, fails, or is re-initialized.
    fn unit(&mut self) {}

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::WhenNeeded
    }

    /// Record this frame's work. All upstream nodes have already executed for `frame`.
    fn execute(&mut self, frame: u64, cmd: vk::CommandBuffer, ctx: &mut ExecutionContext) -> Result<()>;

    /// Current resource of the output slot with this binding, `None` if there is nothing to publish.
    fn output(&self, binding: u32) -> Option<SlotResource>;

    /// Receive the resource of the upstream output linked to an input, or `None` when the input
    /// lost its link or its upstream has nothing to offer.
    fn set_input(&mut self, _port: Port, _resource: Option<SlotResource>) {}

    /// Record a pending resize. Must not touch the GPU.
    fn need_resize(&mut self, _extent: Option<vk::Extent2D>, _buffer_count: Option<u32>) {}

    /// Apply a pending resize. Returns whether outputs changed size.
    fn resize_if_needed(&mut self) -> Result<bool> {
        Ok(false)
    }

    /// Size of the module's outputs, if it renders to a fixed size target.
    fn output_size(&self) -> Option<vk::Extent2D> {
        None
    }

    /// Observe every notification delivered to one of this node's slots.
    fn on_notification(&mut self, _notification: &Notification) {}
}
