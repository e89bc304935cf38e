//! Double-buffered render targets.
//!
//! A [`FrameBuffer`] owns one [`ImageSet`] or, when created with feedback enabled, two of them.
//! Feedback frame buffers alternate between their sets: every frame renders into one set while the
//! other still holds the result of the previous frame, so a node can sample its own history without
//! reading and writing the same image. [`FrameBuffer::end`] swaps the two sets once all commands
//! for the frame have been recorded.
//!
//! Resizing is split in two steps. [`FrameBuffer::need_resize`] only records the request and can be
//! called at any time. [`FrameBuffer::resize_if_needed`] applies it, and refuses to do so while a
//! render pass is being recorded.
//!
//! # Example
//! ```ignore
//! use lumo::prelude::*;
//!
//! let mut target = FrameBuffer::new(gpu.clone(), FrameBufferCreateInfo {
//!     extent: vk::Extent2D { width: 256, height: 256 },
//!     feedback: true,
//!     ..Default::default()
//! })?;
//!
//! target.begin(cmd)?;
//! // Sample last frame's result while drawing this frame.
//! let history = target.back_descriptor(0);
//! target.end(cmd)?;
//! // This is what downstream nodes read.
//! let output = target.front_descriptor(0);
//! ```

use anyhow::Result;
use ash::vk;

use crate::core::gpu::{Gpu, ImageSetCreateInfo, RenderPassCreateInfo};
use crate::resource::image_set::ImageSet;
use crate::Error;

/// Largest width or height a frame buffer can have.
pub const MAX_EXTENT: u32 = 8192;
/// Largest amount of color attachments per image set.
pub const MAX_BUFFER_COUNT: u32 = 8;

/// Settings used to create a [`FrameBuffer`].
#[derive(Debug, Copy, Clone)]
pub struct FrameBufferCreateInfo {
    /// Size of every attachment. Each dimension is clamped to `1..=MAX_EXTENT`.
    pub extent: vk::Extent2D,
    /// Number of color attachments, in `1..=8`.
    pub buffer_count: u32,
    /// Whether to keep a second image set holding the previous frame.
    pub feedback: bool,
    /// Format of every color attachment.
    pub format: vk::Format,
    /// MSAA samples.
    pub samples: vk::SampleCountFlags,
    /// Whether to create a depth attachment.
    pub depth: bool,
    /// Clear color used when the render pass begins. `None` leaves the contents undefined.
    pub clear_color: Option<[f32; 4]>,
    /// Render pass to render with instead of creating one. Not destroyed by the frame buffer.
    pub render_pass: Option<vk::RenderPass>,
}

impl Default for FrameBufferCreateInfo {
    fn default() -> Self {
        Self {
            extent: vk::Extent2D {
                width: 512,
                height: 512,
            },
            buffer_count: 1,
            feedback: false,
            format: vk::Format::R32G32B32A32_SFLOAT,
            samples: vk::SampleCountFlags::TYPE_1,
            depth: false,
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
            render_pass: None,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
struct PendingResize {
    extent: Option<vk::Extent2D>,
    buffer_count: Option<u32>,
}

impl PendingResize {
    fn is_empty(&self) -> bool {
        self.extent.is_none() && self.buffer_count.is_none()
    }
}

/// Validate a buffer count and clamp both dimensions of an extent to `1..=MAX_EXTENT`.
pub fn validate_extent(extent: vk::Extent2D, buffer_count: u32) -> Result<vk::Extent2D> {
    if buffer_count == 0 || buffer_count > MAX_BUFFER_COUNT {
        return Err(Error::InvalidBufferCount(buffer_count).into());
    }
    let clamped = vk::Extent2D {
        width: extent.width.clamp(1, MAX_EXTENT),
        height: extent.height.clamp(1, MAX_EXTENT),
    };
    if clamped != extent {
        warn!(
            "Frame buffer extent {}x{} is outside 1..={MAX_EXTENT}, clamped to {}x{}",
            extent.width, extent.height, clamped.width, clamped.height
        );
    }
    Ok(clamped)
}

/// One or two image sets sharing one render pass. See the [module documentation](self).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FrameBuffer {
    #[derivative(Debug = "ignore")]
    gpu: Gpu,
    sets: Vec<ImageSet>,
    render_pass: vk::RenderPass,
    owns_render_pass: bool,
    extent: vk::Extent2D,
    buffer_count: u32,
    format: vk::Format,
    samples: vk::SampleCountFlags,
    depth: bool,
    feedback: bool,
    clear_color: Option<[f32; 4]>,
    /// Index of the set the next (or current) frame renders into.
    current: usize,
    recording: bool,
    never_cleared: [bool; 2],
    pending: PendingResize,
}

impl FrameBuffer {
    /// Create a new frame buffer, allocating one image set, or two if `info.feedback` is set.
    /// # Errors
    /// * Fails if the buffer count is outside `1..=8`.
    /// * Fails if the GPU backend fails to create the render pass or images.
    pub fn new(gpu: Gpu, info: FrameBufferCreateInfo) -> Result<Self> {
        let extent = validate_extent(info.extent, info.buffer_count).map_err(|err| {
            error!("Cannot create frame buffer: {err}");
            err
        })?;

        let (render_pass, owns_render_pass) = match info.render_pass {
            Some(render_pass) => (render_pass, false),
            None => (
                gpu.create_render_pass(&RenderPassCreateInfo {
                    format: info.format,
                    color_attachments: info.buffer_count,
                    samples: info.samples,
                    depth: info.depth,
                    clear: info.clear_color.is_some(),
                })?,
                true,
            ),
        };

        let mut frame_buffer = Self {
            gpu,
            sets: Vec::new(),
            render_pass,
            owns_render_pass,
            extent,
            buffer_count: info.buffer_count,
            format: info.format,
            samples: info.samples,
            depth: info.depth,
            feedback: info.feedback,
            clear_color: info.clear_color,
            current: 0,
            recording: false,
            never_cleared: [true; 2],
            pending: PendingResize::default(),
        };
        // On failure, drop releases the render pass and whatever sets were created.
        frame_buffer.create_sets()?;
        Ok(frame_buffer)
    }

    fn create_sets(&mut self) -> Result<()> {
        let count = if self.feedback { 2 } else { 1 };
        // The second set reuses the render pass of the first.
        let info = ImageSetCreateInfo {
            extent: self.extent,
            format: self.format,
            color_attachments: self.buffer_count,
            samples: self.samples,
            depth: self.depth,
            render_pass: self.render_pass,
        };
        for _ in 0..count {
            let set = self.gpu.create_image_set(&info)?;
            #[cfg(feature = "log-objects")]
            trace!("Created image set with framebuffer {:p}", set.framebuffer);
            self.sets.push(set);
        }
        self.current = 0;
        self.never_cleared = [true; 2];
        Ok(())
    }

    fn destroy_sets(&mut self) {
        for set in self.sets.drain(..) {
            #[cfg(feature = "log-objects")]
            trace!("Destroying image set with framebuffer {:p}", set.framebuffer);
            self.gpu.destroy_image_set(&set);
        }
    }

    /// Record a pending resize. Performs no GPU work; the latest request wins.
    /// `None` keeps the current value.
    pub fn need_resize(&mut self, extent: Option<vk::Extent2D>, buffer_count: Option<u32>) {
        if let Some(extent) = extent {
            self.pending.extent = Some(extent);
        }
        if let Some(buffer_count) = buffer_count {
            self.pending.buffer_count = Some(buffer_count);
        }
    }

    /// Whether a resize request is waiting to be applied.
    pub fn is_resize_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Apply the pending resize, if any. Waits for the device to become idle before destroying
    /// the old images. Returns whether the images were actually recreated.
    ///
    /// While recording, the request stays pending and this returns `Ok(false)`. Invalid requests
    /// are logged and dropped, keeping the current images.
    pub fn resize_if_needed(&mut self) -> Result<bool> {
        if self.pending.is_empty() {
            return Ok(false);
        }
        if self.recording {
            warn!("Frame buffer resize requested while recording, deferring it");
            return Ok(false);
        }

        let pending = std::mem::take(&mut self.pending);
        let buffer_count = pending.buffer_count.unwrap_or(self.buffer_count);
        let extent = match validate_extent(pending.extent.unwrap_or(self.extent), buffer_count) {
            Ok(extent) => extent,
            Err(err) => {
                error!("Ignoring frame buffer resize: {err}");
                return Ok(false);
            }
        };
        if extent == self.extent && buffer_count == self.buffer_count {
            return Ok(false);
        }

        self.gpu.wait_idle()?;
        self.destroy_sets();
        if self.owns_render_pass && buffer_count != self.buffer_count {
            self.gpu.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
            self.render_pass = self.gpu.create_render_pass(&RenderPassCreateInfo {
                format: self.format,
                color_attachments: buffer_count,
                samples: self.samples,
                depth: self.depth,
                clear: self.clear_color.is_some(),
            })?;
        }
        self.extent = extent;
        self.buffer_count = buffer_count;
        self.create_sets()?;
        debug!("Resized frame buffer to {}x{} with {} buffers", extent.width, extent.height, buffer_count);
        Ok(true)
    }

    fn clear_values(&self) -> Vec<vk::ClearValue> {
        let Some(color) = self.clear_color else {
            return Vec::new();
        };
        let mut values = vec![
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: color,
                },
            };
            self.buffer_count as usize
        ];
        if self.depth {
            values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }
        values
    }

    /// Set viewport and scissor to the full frame buffer and begin the render pass on the set
    /// this frame renders into.
    pub fn begin(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        if self.recording {
            return Err(Error::RecordingInProgress.into());
        }
        let set = self.sets.get(self.current).ok_or(Error::Uncategorized("Frame buffer has no image set"))?;
        self.gpu.cmd_set_viewport(cmd, self.viewport());
        self.gpu.cmd_set_scissor(cmd, self.render_area());
        self.gpu
            .cmd_begin_render_pass(cmd, self.render_pass, set.framebuffer, self.render_area(), &self.clear_values());
        self.recording = true;
        Ok(())
    }

    /// Clear all color attachments of the set being rendered into, if it was never cleared since
    /// it was created or `force` is set. Returns whether a clear was recorded.
    pub fn clear_attachments_if_needed(&mut self, cmd: vk::CommandBuffer, force: bool) -> Result<bool> {
        if !self.recording {
            return Err(Error::NotRecording.into());
        }
        if !force && !self.never_cleared[self.current] {
            return Ok(false);
        }
        let color = self.clear_color.unwrap_or([0.0; 4]);
        let attachments = (0..self.buffer_count)
            .map(|index| vk::ClearAttachment {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                color_attachment: index,
                clear_value: vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: color,
                    },
                },
            })
            .collect::<Vec<_>>();
        self.gpu.cmd_clear_attachments(
            cmd,
            &attachments,
            vk::ClearRect {
                rect: self.render_area(),
                base_array_layer: 0,
                layer_count: 1,
            },
        );
        self.never_cleared[self.current] = false;
        Ok(true)
    }

    /// Mark every set as never cleared, so the next [`FrameBuffer::clear_attachments_if_needed`] clears it.
    pub fn clear_attachments(&mut self) {
        self.never_cleared = [true; 2];
    }

    /// End the render pass, and swap the sets if this is a feedback frame buffer.
    pub fn end(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        if !self.recording {
            return Err(Error::NotRecording.into());
        }
        self.gpu.cmd_end_render_pass(cmd);
        self.recording = false;
        if self.feedback {
            self.current = 1 - self.current;
        }
        Ok(())
    }

    fn front_index(&self) -> usize {
        if self.feedback {
            1 - self.current
        } else {
            0
        }
    }

    fn back_index(&self) -> usize {
        match (self.feedback, self.recording) {
            (false, _) => 0,
            (true, true) => 1 - self.current,
            (true, false) => self.current,
        }
    }

    fn descriptor(&self, set: usize, binding: u32) -> vk::DescriptorImageInfo {
        self.sets
            .get(set)
            .and_then(|set| set.attachment(binding))
            .map(|attachment| attachment.descriptor())
            .unwrap_or_default()
    }

    /// Descriptor of the most recently completed image for a binding. This is what downstream nodes sample.
    pub fn front_descriptor(&self, binding: u32) -> vk::DescriptorImageInfo {
        self.descriptor(self.front_index(), binding)
    }

    /// Descriptor of the image completed one frame before the front image. Equal to the front
    /// descriptor without feedback.
    pub fn back_descriptor(&self, binding: u32) -> vk::DescriptorImageInfo {
        self.descriptor(self.back_index(), binding)
    }

    /// Front descriptors of every binding.
    pub fn front_descriptors(&self) -> Vec<vk::DescriptorImageInfo> {
        (0..self.buffer_count).map(|binding| self.front_descriptor(binding)).collect()
    }

    /// Back descriptors of every binding.
    pub fn back_descriptors(&self) -> Vec<vk::DescriptorImageInfo> {
        (0..self.buffer_count).map(|binding| self.back_descriptor(binding)).collect()
    }

    /// Size of the images currently in use. Pending resizes are not reflected.
    pub fn output_size(&self) -> vk::Extent2D {
        self.extent
    }

    /// Width divided by height.
    pub fn output_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    /// Viewport covering the whole frame buffer.
    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Render area covering the whole frame buffer.
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.extent,
        }
    }

    /// Render pass shared by every set. Passes drawing into this frame buffer must be compatible with it.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Number of color attachments per set.
    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    /// Number of image sets. Two with feedback, one otherwise.
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    /// MSAA samples.
    pub fn sample_count(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Color attachment format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Whether this frame buffer keeps the previous frame.
    pub fn is_feedback(&self) -> bool {
        self.feedback
    }

    /// Whether [`FrameBuffer::begin`] was called without a matching [`FrameBuffer::end`].
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Change the clear color used from the next frame on.
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = Some(color);
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if let Err(err) = self.gpu.wait_idle() {
            error!("Failed to wait for device idle while dropping frame buffer: {err}");
        }
        self.destroy_sets();
        if self.owns_render_pass && self.render_pass != vk::RenderPass::null() {
            self.gpu.destroy_render_pass(self.render_pass);
        }
    }
}
