//! Shader passes shared between nodes.
//!
//! A shader pass is produced by one node and can be drawn by another one, like the
//! [`SceneMergerModule`](crate::SceneMergerModule) which draws every pass linked to it into its own target.
//! While borrowed that way, the pass renders with the borrower's render pass.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use ash::vk;

use crate::Error;

/// A drawable pass.
pub trait ShaderPass {
    /// Render with a render pass owned by someone else.
    fn set_render_pass(&mut self, render_pass: vk::RenderPass);
    /// Go back to the render pass the pass was created with.
    fn reset_render_pass_to_native(&mut self);
    fn set_viewport_size(&mut self, extent: vk::Extent2D);
    /// Record draw commands. Called inside an active render pass.
    fn draw(&mut self, cmd: vk::CommandBuffer, frame: u64) -> Result<()>;
}

/// Shared, lockable reference to a [`ShaderPass`]. Two handles are equal when they refer to the same pass.
#[derive(Clone)]
pub struct ShaderPassHandle(pub Arc<Mutex<dyn ShaderPass + Send>>);

impl ShaderPassHandle {
    pub fn new<P: ShaderPass + Send + 'static>(pass: P) -> Self {
        Self(Arc::new(Mutex::new(pass)))
    }

    /// Lock the pass for use.
    pub fn lock(&self) -> Result<MutexGuard<'_, dyn ShaderPass + Send + 'static>> {
        Ok(self.0.lock().map_err(Error::from)?)
    }

    fn address(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for ShaderPassHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for ShaderPassHandle {}

impl Debug for ShaderPassHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShaderPassHandle({:p})", self.address())
    }
}
