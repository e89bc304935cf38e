//! The core module holds the functionality every other part of the engine builds on: the error type,
//! graph settings and the handle through which all GPU work is issued.

pub mod error;
pub mod settings;
pub mod gpu;
pub mod vulkan;
