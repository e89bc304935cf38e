//! Per-frame state shared with every executing module.

use glam::{Vec2, Vec4};

use crate::core::gpu::Gpu;

/// Uniform values most shaders want every frame.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct CommonUniforms {
    pub time: f32,
    pub delta_time: f32,
    pub frame: u32,
    pub screen_size: Vec2,
    pub mouse: Vec4,
}

/// Owned by whatever drives the graph and passed into [`NodeGraph::tick`](crate::NodeGraph::tick).
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    gpu: Gpu,
    frame: u64,
    time: f32,
    delta_time: f32,
    pub uniforms: CommonUniforms,
}

impl ExecutionContext {
    pub fn new(gpu: Gpu) -> Self {
        Self {
            gpu,
            frame: 0,
            time: 0.0,
            delta_time: 0.0,
            uniforms: CommonUniforms::default(),
        }
    }

    /// Move the clock forward. Call once per frame before ticking the graph.
    pub fn advance(&mut self, delta_time: f32) {
        self.delta_time = delta_time;
        self.time += delta_time;
        self.uniforms.time = self.time;
        self.uniforms.delta_time = delta_time;
    }

    pub(crate) fn set_frame(&mut self, frame: u64) {
        self.frame = frame;
        self.uniforms.frame = frame as u32;
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    /// Frame index of the tick in progress.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Seconds elapsed since the context was created.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }
}
