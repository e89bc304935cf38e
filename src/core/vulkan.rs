//! Vulkan implementation of [`GpuBackend`], built on `ash` and the [`gpu_allocator`] crate.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use ash::vk;
use gpu_allocator::vulkan as vk_alloc;
use gpu_allocator::vulkan::AllocationScheme;
use gpu_allocator::MemoryLocation;

use crate::core::gpu::{GpuBackend, ImageSetCreateInfo, RenderPassCreateInfo};
use crate::resource::image_set::{Attachment, ImageSet};
use crate::Error;

/// Format used for the optional depth attachment of every image set.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum AttachmentKind {
    /// Single sample color image that shaders read from.
    Sampled,
    /// Multisampled color target, only written inside the render pass and resolved at its end.
    Multisampled,
    Depth,
}

/// [`GpuBackend`] that talks to a Vulkan device. The device itself is borrowed, not owned:
/// it must outlive this backend and is never destroyed by it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanBackend {
    #[derivative(Debug = "ignore")]
    device: ash::Device,
    #[derivative(Debug = "ignore")]
    allocator: Mutex<vk_alloc::Allocator>,
    #[derivative(Debug = "ignore")]
    allocations: Mutex<HashMap<vk::Image, vk_alloc::Allocation>>,
}

impl VulkanBackend {
    /// Create a new backend on top of an existing Vulkan device.
    /// # Errors
    /// * May fail if creating the internal `gpu_allocator` fails.
    pub fn new(instance: &ash::Instance, physical_device: vk::PhysicalDevice, device: ash::Device) -> Result<Self> {
        let allocator = vk_alloc::Allocator::new(&vk_alloc::AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
        })?;
        Ok(Self {
            device,
            allocator: Mutex::new(allocator),
            allocations: Mutex::new(HashMap::new()),
        })
    }

    fn create_attachment(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        kind: AttachmentKind,
    ) -> Result<Attachment> {
        let (usage, aspect, layout, samples) = match kind {
            AttachmentKind::Sampled => (
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_SRC,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::SampleCountFlags::TYPE_1,
            ),
            AttachmentKind::Multisampled => (
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                samples,
            ),
            AttachmentKind::Depth => (
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH,
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                samples,
            ),
        };

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { self.device.create_image(&image_info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImage {image:p}");

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let allocation = match self.allocator.lock() {
            Ok(mut allocator) => allocator
                .allocate(&vk_alloc::AllocationCreateDesc {
                    name: "frame_buffer_attachment",
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(anyhow::Error::from),
            Err(err) => Err(Error::from(err).into()),
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(err);
            }
        };
        // SAFETY: the allocation was made for exactly this image's requirements.
        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        match self.allocations.lock() {
            Ok(mut allocations) => {
                allocations.insert(image, allocation);
            }
            Err(err) => {
                unsafe { self.device.destroy_image(image, None) };
                if let Ok(mut allocator) = self.allocator.lock() {
                    if let Err(err) = allocator.free(allocation) {
                        error!("Failed to free image memory: {err}");
                    }
                }
                return Err(Error::from(err).into());
            }
        }

        let mut attachment = Attachment {
            image,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            layout,
        };
        if let Err(err) = unsafe { self.device.bind_image_memory(image, memory, offset) } {
            self.destroy_attachment(&attachment);
            return Err(err.into());
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        attachment.view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(err) => {
                self.destroy_attachment(&attachment);
                return Err(err.into());
            }
        };

        if kind == AttachmentKind::Sampled {
            let sampler_info = vk::SamplerCreateInfo::builder()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                .max_lod(1.0);
            attachment.sampler = match unsafe { self.device.create_sampler(&sampler_info, None) } {
                Ok(sampler) => sampler,
                Err(err) => {
                    self.destroy_attachment(&attachment);
                    return Err(err.into());
                }
            };
        }

        Ok(attachment)
    }

    fn destroy_attachment(&self, attachment: &Attachment) {
        unsafe {
            if attachment.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(attachment.sampler, None);
            }
            if attachment.view != vk::ImageView::null() {
                self.device.destroy_image_view(attachment.view, None);
            }
            self.device.destroy_image(attachment.image, None);
        }
        #[cfg(feature = "log-objects")]
        trace!("Destroyed VkImage {:p}", attachment.image);

        let allocation = match self.allocations.lock() {
            Ok(mut allocations) => allocations.remove(&attachment.image),
            Err(_) => {
                error!("Allocation map poisoned, leaking memory of image {:p}", attachment.image);
                None
            }
        };
        if let Some(allocation) = allocation {
            match self.allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(err) = allocator.free(allocation) {
                        error!("Failed to free image memory: {err}");
                    }
                }
                Err(_) => error!("Allocator poisoned, leaking memory of image {:p}", attachment.image),
            }
        }
    }

    fn fill_image_set(&self, info: &ImageSetCreateInfo, set: &mut ImageSet) -> Result<()> {
        let multisampled = info.samples != vk::SampleCountFlags::TYPE_1;
        for _ in 0..info.color_attachments {
            if multisampled {
                let target = self.create_attachment(info.extent, info.format, info.samples, AttachmentKind::Multisampled)?;
                set.attachments.push(target);
                let resolve = self.create_attachment(info.extent, info.format, info.samples, AttachmentKind::Sampled)?;
                set.resolve.push(resolve);
            } else {
                let attachment = self.create_attachment(info.extent, info.format, info.samples, AttachmentKind::Sampled)?;
                set.attachments.push(attachment);
            }
        }
        if info.depth {
            set.depth = Some(self.create_attachment(info.extent, DEPTH_FORMAT, info.samples, AttachmentKind::Depth)?);
        }

        // Same order as the render pass: colors, depth, then resolve targets.
        let views = set
            .attachments
            .iter()
            .chain(set.depth.iter())
            .chain(set.resolve.iter())
            .map(|attachment| attachment.view)
            .collect::<Vec<_>>();
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(info.render_pass)
            .attachments(&views)
            .width(info.extent.width)
            .height(info.extent.height)
            .layers(1);
        set.framebuffer = unsafe { self.device.create_framebuffer(&framebuffer_info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkFramebuffer {:p}", set.framebuffer);
        Ok(())
    }
}

impl GpuBackend for VulkanBackend {
    fn create_render_pass(&self, info: &RenderPassCreateInfo) -> Result<vk::RenderPass> {
        let multisampled = info.samples != vk::SampleCountFlags::TYPE_1;
        let load_op = if info.clear {
            vk::AttachmentLoadOp::CLEAR
        } else {
            vk::AttachmentLoadOp::DONT_CARE
        };
        let mut attachments = (0..info.color_attachments)
            .map(|_| {
                vk::AttachmentDescription::builder()
                    .format(info.format)
                    .samples(info.samples)
                    .load_op(load_op)
                    .store_op(if multisampled {
                        vk::AttachmentStoreOp::DONT_CARE
                    } else {
                        vk::AttachmentStoreOp::STORE
                    })
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(if multisampled {
                        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
                    } else {
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                    })
                    .build()
            })
            .collect::<Vec<_>>();
        let color_refs = (0..info.color_attachments)
            .map(|index| vk::AttachmentReference {
                attachment: index,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect::<Vec<_>>();
        let depth_ref = vk::AttachmentReference {
            attachment: info.color_attachments,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        if info.depth {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(DEPTH_FORMAT)
                    .samples(info.samples)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .build(),
            );
        }
        let mut resolve_refs = Vec::new();
        if multisampled {
            for _ in 0..info.color_attachments {
                resolve_refs.push(vk::AttachmentReference {
                    attachment: attachments.len() as u32,
                    layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                });
                attachments.push(
                    vk::AttachmentDescription::builder()
                        .format(info.format)
                        .samples(vk::SampleCountFlags::TYPE_1)
                        .load_op(vk::AttachmentLoadOp::DONT_CARE)
                        .store_op(vk::AttachmentStoreOp::STORE)
                        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                        .initial_layout(vk::ImageLayout::UNDEFINED)
                        .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                        .build(),
                );
            }
        }

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if info.depth {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }
        if multisampled {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }
        let subpasses = [subpass.build()];
        // Make previous sampling of these images finish before writing, and writes visible to later sampling.
        let dependencies = [
            vk::SubpassDependency::builder()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::SHADER_READ)
                .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .dependency_flags(vk::DependencyFlags::BY_REGION)
                .build(),
            vk::SubpassDependency::builder()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .dependency_flags(vk::DependencyFlags::BY_REGION)
                .build(),
        ];
        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let handle = unsafe { self.device.create_render_pass(&create_info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkRenderPass {handle:p}");
        Ok(handle)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkRenderPass {render_pass:p}");
        unsafe { self.device.destroy_render_pass(render_pass, None) };
    }

    fn create_image_set(&self, info: &ImageSetCreateInfo) -> Result<ImageSet> {
        let mut set = ImageSet {
            framebuffer: vk::Framebuffer::null(),
            extent: info.extent,
            attachments: Vec::with_capacity(info.color_attachments as usize),
            depth: None,
            resolve: Vec::new(),
        };
        match self.fill_image_set(info, &mut set) {
            Ok(()) => Ok(set),
            Err(err) => {
                self.destroy_image_set(&set);
                Err(err)
            }
        }
    }

    fn destroy_image_set(&self, set: &ImageSet) {
        if set.framebuffer != vk::Framebuffer::null() {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkFramebuffer {:p}", set.framebuffer);
            unsafe { self.device.destroy_framebuffer(set.framebuffer, None) };
        }
        for attachment in set.attachments.iter().chain(set.depth.iter()).chain(set.resolve.iter()) {
            self.destroy_attachment(attachment);
        }
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport)) };
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor)) };
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(area)
            .clear_values(clear_values);
        unsafe { self.device.cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE) };
    }

    fn cmd_clear_attachments(&self, cmd: vk::CommandBuffer, attachments: &[vk::ClearAttachment], rect: vk::ClearRect) {
        unsafe { self.device.cmd_clear_attachments(cmd, attachments, std::slice::from_ref(&rect)) };
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) };
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Ok(allocations) = self.allocations.lock() {
            if !allocations.is_empty() {
                warn!("Dropping GPU backend with {} live image allocations", allocations.len());
            }
        }
    }
}
