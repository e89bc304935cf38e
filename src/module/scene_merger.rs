//! The scene merger draws every shader pass linked to it into one shared target.
//!
//! Its input set is variadic: every shader pass output linked to it occupies one slot, and the node always
//! keeps one empty slot to link the next pass to. A pass reachable through several slots is drawn once.
//! While merged, passes render with the merger's render pass; a pass that is no longer linked goes back to
//! its own render pass.

use std::collections::BTreeMap;

use anyhow::Result;
use ash::vk;

use crate::core::gpu::Gpu;
use crate::graph::node::{ExecutionMode, NodeBuilder};
use crate::graph::resource::SlotResource;
use crate::graph::slot::{SlotId, SlotType};
use crate::module::context::ExecutionContext;
use crate::module::shader_pass::ShaderPassHandle;
use crate::module::{NodeModule, Port};
use crate::resource::frame_buffer::{FrameBuffer, FrameBufferCreateInfo};
use crate::Error;

/// Type name of scene merger nodes.
pub const SCENE_MERGER_TYPE: &str = "SceneMerger";

/// [`NodeModule`] merging shader passes. See the [module documentation](self).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SceneMergerModule {
    create_info: FrameBufferCreateInfo,
    #[derivative(Debug = "ignore")]
    target: Option<FrameBuffer>,
    inputs: BTreeMap<SlotId, Vec<ShaderPassHandle>>,
    passes: Vec<ShaderPassHandle>,
}

impl Default for SceneMergerModule {
    fn default() -> Self {
        Self::new(FrameBufferCreateInfo {
            extent: vk::Extent2D {
                width: 512,
                height: 512,
            },
            feedback: true,
            format: vk::Format::R32G32B32A32_SFLOAT,
            ..Default::default()
        })
    }
}

impl SceneMergerModule {
    pub fn new(create_info: FrameBufferCreateInfo) -> Self {
        Self {
            create_info,
            target: None,
            inputs: BTreeMap::new(),
            passes: Vec::new(),
        }
    }

    /// Declaration of a scene merger node: a variadic shader pass input and one texture output.
    pub fn node(name: impl Into<String>) -> NodeBuilder {
        Self::node_with(name, Self::default())
    }

    pub fn node_with(name: impl Into<String>, module: SceneMergerModule) -> NodeBuilder {
        NodeBuilder::new(name)
            .type_name(SCENE_MERGER_TYPE)
            .variadic_input("pass", SlotType::ShaderPass)
            .output("scene", SlotType::Texture2D)
            .module(module)
    }

    /// Unique passes drawn every frame, in slot order.
    pub fn passes(&self) -> &[ShaderPassHandle] {
        &self.passes
    }

    pub fn target(&self) -> Option<&FrameBuffer> {
        self.target.as_ref()
    }

    /// Hand the target's render pass and size to every pass.
    fn adopt_passes(&self) {
        let Some(target) = &self.target else { return };
        for pass in &self.passes {
            match pass.lock() {
                Ok(mut pass) => {
                    pass.set_render_pass(target.render_pass());
                    pass.set_viewport_size(target.output_size());
                }
                Err(err) => warn!("Cannot adopt shader pass: {err}"),
            }
        }
    }

    fn release(passes: &[ShaderPassHandle]) {
        for pass in passes {
            match pass.lock() {
                Ok(mut pass) => pass.reset_render_pass_to_native(),
                Err(err) => warn!("Cannot release shader pass: {err}"),
            }
        }
    }

    /// Rebuild the unique pass list from the passes of every slot.
    fn set_shader_passes(&mut self) {
        let mut passes: Vec<ShaderPassHandle> = Vec::new();
        for pass in self.inputs.values().flatten() {
            if !passes.contains(pass) {
                passes.push(pass.clone());
            }
        }
        let dropped = self
            .passes
            .iter()
            .filter(|pass| !passes.contains(pass))
            .cloned()
            .collect::<Vec<_>>();
        Self::release(&dropped);
        self.passes = passes;
        self.adopt_passes();
    }
}

impl NodeModule for SceneMergerModule {
    fn init(&mut self, gpu: &Gpu) -> Result<()> {
        self.target = Some(FrameBuffer::new(gpu.clone(), self.create_info)?);
        self.adopt_passes();
        Ok(())
    }

    fn unit(&mut self) {
        Self::release(&self.passes);
        self.target = None;
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::AllTime
    }

    fn execute(&mut self, frame: u64, cmd: vk::CommandBuffer, _ctx: &mut ExecutionContext) -> Result<()> {
        let target = self.target.as_mut().ok_or(Error::Uncategorized("Scene merger has no target"))?;
        target.begin(cmd)?;
        let drawn = target
            .clear_attachments_if_needed(cmd, false)
            .and_then(|_| self.passes.iter().try_for_each(|pass| pass.lock()?.draw(cmd, frame)));
        // Always close the render pass, even if a pass failed to draw.
        target.end(cmd)?;
        drawn
    }

    fn output(&self, binding: u32) -> Option<SlotResource> {
        let target = self.target.as_ref()?;
        Some(SlotResource::Texture2D {
            descriptor: target.front_descriptor(binding),
            extent: target.output_size(),
        })
    }

    fn set_input(&mut self, port: Port, resource: Option<SlotResource>) {
        match resource {
            Some(SlotResource::ShaderPass(passes)) => {
                self.inputs.insert(port.slot, passes);
            }
            _ => {
                self.inputs.remove(&port.slot);
            }
        }
        self.set_shader_passes();
    }

    fn need_resize(&mut self, extent: Option<vk::Extent2D>, buffer_count: Option<u32>) {
        if let Some(target) = self.target.as_mut() {
            target.need_resize(extent, buffer_count);
        }
    }

    fn resize_if_needed(&mut self) -> Result<bool> {
        let Some(target) = self.target.as_mut() else {
            return Ok(false);
        };
        let resized = target.resize_if_needed()?;
        if resized {
            self.adopt_passes();
        }
        Ok(resized)
    }

    fn output_size(&self) -> Option<vk::Extent2D> {
        self.target.as_ref().map(|target| target.output_size())
    }
}
