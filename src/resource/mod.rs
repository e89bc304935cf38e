//! Exposes the GPU resources nodes render into.
//!
//! The main type here is the [`FrameBuffer`](frame_buffer::FrameBuffer), a render target that can keep
//! its previous frame around for feedback effects. Its images are described by plain
//! [`ImageSet`](image_set::ImageSet) values created through the [`Gpu`](crate::Gpu) handle.

pub mod frame_buffer;
pub mod image_set;
