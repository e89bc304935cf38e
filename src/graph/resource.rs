//! Data published by output slots and received by input slots.

use ash::vk;
use glam::Vec4;

use crate::graph::slot::SlotType;
use crate::module::shader_pass::ShaderPassHandle;

/// Opaque handle to a model owned by the asset collaborator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ModelHandle(pub u64);

/// Opaque handle to a light group owned by the scene collaborator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LightGroupHandle(pub u64);

/// A resource flowing over a link. Each variant matches exactly one [`SlotType`].
#[derive(Debug, Clone)]
pub enum SlotResource {
    Texture2D {
        descriptor: vk::DescriptorImageInfo,
        extent: vk::Extent2D,
    },
    Texture3D {
        descriptor: vk::DescriptorImageInfo,
        extent: vk::Extent3D,
    },
    TextureCube {
        descriptor: vk::DescriptorImageInfo,
        extent: vk::Extent2D,
    },
    TextureGroup(Vec<vk::DescriptorImageInfo>),
    Model(ModelHandle),
    LightGroup(LightGroupHandle),
    ShaderPass(Vec<ShaderPassHandle>),
    AccelStructure(vk::AccelerationStructureKHR),
    TexelBuffer(vk::BufferView),
    StorageBuffer(vk::DescriptorBufferInfo),
    Variable(Vec4),
}

impl SlotResource {
    /// The slot type this resource can flow through.
    pub fn slot_type(&self) -> SlotType {
        match self {
            SlotResource::Texture2D { .. } => SlotType::Texture2D,
            SlotResource::Texture3D { .. } => SlotType::Texture3D,
            SlotResource::TextureCube { .. } => SlotType::TextureCube,
            SlotResource::TextureGroup(_) => SlotType::TextureGroup,
            SlotResource::Model(_) => SlotType::Model,
            SlotResource::LightGroup(_) => SlotType::LightGroup,
            SlotResource::ShaderPass(_) => SlotType::ShaderPass,
            SlotResource::AccelStructure(_) => SlotType::AccelStructure,
            SlotResource::TexelBuffer(_) => SlotType::TexelBuffer,
            SlotResource::StorageBuffer(_) => SlotType::StorageBuffer,
            SlotResource::Variable(_) => SlotType::Variable,
        }
    }

    /// Image descriptor of single-image texture resources.
    pub fn texture_descriptor(&self) -> Option<vk::DescriptorImageInfo> {
        match self {
            SlotResource::Texture2D { descriptor, .. }
            | SlotResource::Texture3D { descriptor, .. }
            | SlotResource::TextureCube { descriptor, .. } => Some(*descriptor),
            _ => None,
        }
    }

    /// Size of 2D and cube textures.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        match self {
            SlotResource::Texture2D { extent, .. } | SlotResource::TextureCube { extent, .. } => Some(*extent),
            _ => None,
        }
    }

    /// Shader passes carried by a [`SlotType::ShaderPass`] resource.
    pub fn shader_passes(&self) -> Option<&[ShaderPassHandle]> {
        match self {
            SlotResource::ShaderPass(passes) => Some(passes),
            _ => None,
        }
    }
}
