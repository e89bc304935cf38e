//! Plain data describing the images behind one half of a [`FrameBuffer`](crate::FrameBuffer).

use ash::vk;

/// One attachment of an [`ImageSet`]: the image, a view over the whole image and the sampler
/// downstream nodes use to read it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// [`VkImage`](vk::Image) handle.
    pub image: vk::Image,
    /// [`VkImageView`](vk::ImageView) covering the whole image.
    pub view: vk::ImageView,
    /// Sampler used when the image is read. Null for depth attachments.
    pub sampler: vk::Sampler,
    /// Layout the image is in whenever it is read outside of its render pass.
    pub layout: vk::ImageLayout,
}

impl Attachment {
    /// Descriptor info used to bind this attachment for sampling.
    pub fn descriptor(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: self.layout,
        }
    }
}

/// Color attachments, optional depth attachment and the framebuffer object that binds them
/// to a render pass. All attachments share the same extent.
///
/// With MSAA the color attachments are multisampled and cannot be sampled directly. Each one then
/// resolves into a single sampled image in `resolve`, and those are what [`ImageSet::attachment`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    /// [`VkFramebuffer`](vk::Framebuffer) handle.
    pub framebuffer: vk::Framebuffer,
    /// Size of every attachment.
    pub extent: vk::Extent2D,
    /// Color attachments, indexed by binding.
    pub attachments: Vec<Attachment>,
    /// Depth attachment, if requested.
    pub depth: Option<Attachment>,
    /// Single sample resolve targets, one per color attachment. Empty without MSAA.
    pub resolve: Vec<Attachment>,
}

impl ImageSet {
    /// Get the sampled color image for a binding: the resolve target with MSAA, the color attachment otherwise.
    /// Out of range bindings resolve to the last attachment.
    pub fn attachment(&self, binding: u32) -> Option<&Attachment> {
        let sampled = if self.is_multisampled() {
            &self.resolve
        } else {
            &self.attachments
        };
        let index = (binding as usize).min(sampled.len().saturating_sub(1));
        sampled.get(index)
    }

    pub fn is_multisampled(&self) -> bool {
        !self.resolve.is_empty()
    }
}
