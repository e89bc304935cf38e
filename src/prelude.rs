pub use ash::vk;

pub use crate::core::error::Error;
pub use crate::core::gpu::{Gpu, GpuBackend, ImageSetCreateInfo, RenderPassCreateInfo};
pub use crate::core::settings::{GraphSettings, GraphSettingsBuilder};
pub use crate::core::vulkan::VulkanBackend;

pub use crate::graph::graphviz::{render_svg, GraphViz};
pub use crate::graph::layout::{GraphLayout, LayoutReport};
pub use crate::graph::node::{ExecutionMode, ModuleState, Node, NodeBuilder, NodeId, ResizePolicy};
pub use crate::graph::node_graph::NodeGraph;
pub use crate::graph::notify::{Notification, NotifyEvent};
pub use crate::graph::resource::{LightGroupHandle, ModelHandle, SlotResource};
pub use crate::graph::scheduler::FrameStats;
pub use crate::graph::slot::{Slot, SlotDirection, SlotId, SlotType};

pub use crate::module::context::{CommonUniforms, ExecutionContext};
pub use crate::module::scene_merger::SceneMergerModule;
pub use crate::module::shader_pass::{ShaderPass, ShaderPassHandle};
pub use crate::module::{NodeModule, Port};

pub use crate::resource::frame_buffer::{FrameBuffer, FrameBufferCreateInfo};
pub use crate::resource::image_set::{Attachment, ImageSet};
