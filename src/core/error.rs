//! Exposes the lumo error type

use std::sync::PoisonError;

use thiserror::Error;

use crate::graph::node::NodeId;
use crate::graph::slot::SlotId;

/// Error type that lumo can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Tried to link two slots that can never be linked together.
    #[error("Cannot link {from} to {to}: {reason}.")]
    IncompatibleSlots {
        /// Slot the link would start from.
        from: SlotId,
        /// Slot the link would end in.
        to: SlotId,
        /// Why the link was refused.
        reason: &'static str,
    },
    /// Slot id does not refer to a live slot.
    #[error("{0} does not exist.")]
    SlotNotFound(SlotId),
    /// Node id does not refer to a live node.
    #[error("{0} does not exist.")]
    NodeNotFound(NodeId),
    /// Tried to break a link that does not exist.
    #[error("{0} and {1} are not linked.")]
    NotLinked(SlotId, SlotId),
    /// Frame buffers hold between one and eight color attachments.
    #[error("Invalid buffer count `{0}`, expected a value in 1..=8.")]
    InvalidBufferCount(u32),
    /// Operation is not allowed while a frame buffer is recording.
    #[error("Frame buffer is currently recording.")]
    RecordingInProgress,
    /// Operation requires an active `begin()`.
    #[error("Frame buffer is not recording.")]
    NotRecording,
    /// A node was reached again while its own inputs were being pulled.
    #[error("Execution cycle detected at node `{0}`.")]
    ExecutionCycle(String),
    /// The module of a node could not be initialized.
    #[error("Module of node `{0}` failed to initialize.")]
    ModuleInitFailed(String),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
