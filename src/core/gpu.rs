//! Exposes the [`Gpu`] handle, through which the engine issues every GPU operation it needs.
//!
//! The engine never calls into Vulkan directly. Instead, all object creation and the few commands
//! it records itself (viewport, scissor, render pass begin and end, attachment clears) go through the
//! [`GpuBackend`] trait. A Vulkan implementation is provided in [`VulkanBackend`](crate::VulkanBackend),
//! but any other implementation can be plugged in, for example to run the scheduler headless.
//!
//! # Example
//! ```ignore
//! use lumo::prelude::*;
//!
//! let backend = VulkanBackend::new(&instance, physical_device, device.clone())?;
//! let gpu = Gpu::new(backend);
//! // Cheap to clone, all clones refer to the same backend.
//! let mut graph = NodeGraph::new(gpu.clone(), GraphSettings::default());
//! ```

use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::resource::image_set::ImageSet;

/// Describes the render pass a frame buffer renders into.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderPassCreateInfo {
    /// Format of every color attachment.
    pub format: vk::Format,
    /// Number of color attachments.
    pub color_attachments: u32,
    /// MSAA samples of every attachment.
    pub samples: vk::SampleCountFlags,
    /// Whether a depth attachment follows the color attachments.
    pub depth: bool,
    /// Whether attachments are cleared when the render pass begins.
    pub clear: bool,
}

/// Describes one set of images backing a frame buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageSetCreateInfo {
    /// Size of every attachment.
    pub extent: vk::Extent2D,
    /// Format of every color attachment.
    pub format: vk::Format,
    /// Number of color attachments.
    pub color_attachments: u32,
    /// MSAA samples of every attachment.
    pub samples: vk::SampleCountFlags,
    /// Whether to create a depth attachment.
    pub depth: bool,
    /// Render pass the framebuffer object must be compatible with.
    pub render_pass: vk::RenderPass,
}

/// Everything the engine needs from the GPU. Implementations must be callable through a shared reference,
/// [`Gpu`] hands out clones of one backend to every frame buffer.
pub trait GpuBackend {
    /// Create a render pass.
    fn create_render_pass(&self, info: &RenderPassCreateInfo) -> Result<vk::RenderPass>;
    /// Destroy a render pass created through [`GpuBackend::create_render_pass`].
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    /// Allocate images, views, samplers and a framebuffer object for one image set.
    fn create_image_set(&self, info: &ImageSetCreateInfo) -> Result<ImageSet>;
    /// Destroy an image set created through [`GpuBackend::create_image_set`].
    fn destroy_image_set(&self, set: &ImageSet);
    /// Block until the device has finished all submitted work.
    fn wait_idle(&self) -> Result<()>;
    /// Record `vkCmdSetViewport`.
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    /// Record `vkCmdSetScissor`.
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);
    /// Record `vkCmdBeginRenderPass` with inline subpass contents.
    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    );
    /// Record `vkCmdClearAttachments`.
    fn cmd_clear_attachments(&self, cmd: vk::CommandBuffer, attachments: &[vk::ClearAttachment], rect: vk::ClearRect);
    /// Record `vkCmdEndRenderPass`.
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
}

/// Shared handle to a [`GpuBackend`]. Internal state is wrapped in an `Arc`, so this is cheap to clone.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Gpu {
    #[derivative(Debug = "ignore")]
    inner: Arc<dyn GpuBackend>,
}

impl Gpu {
    /// Wrap a backend into a new handle.
    pub fn new<B: GpuBackend + 'static>(backend: B) -> Self {
        Self {
            inner: Arc::new(backend),
        }
    }

    /// Create a handle from a backend that is already shared.
    pub fn from_arc(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            inner: backend,
        }
    }
}

impl Deref for Gpu {
    type Target = dyn GpuBackend;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}
