//! Typed connection points of a node.

use std::fmt::{Display, Formatter};

use crate::graph::node::NodeId;

/// Identifies a slot inside a [`NodeGraph`](crate::NodeGraph). Slot ids are never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    /// Raw index of this slot.
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl Display for SlotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot #{}", self.0)
    }
}

/// Whether a slot receives or produces data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SlotDirection {
    /// Receives data from exactly zero or one output slot.
    Input,
    /// Publishes data to any number of input slots.
    Output,
}

/// Kind of data flowing through a slot. Only slots of the same type can be linked.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SlotType {
    Texture2D,
    Texture3D,
    TextureCube,
    TextureGroup,
    Model,
    LightGroup,
    ShaderPass,
    AccelStructure,
    TexelBuffer,
    StorageBuffer,
    Variable,
}

impl Display for SlotType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Declaration of a slot, used when building a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDesc {
    /// Display name.
    pub name: String,
    /// Data type.
    pub slot_type: SlotType,
}

/// A connection point owned by one node. Links are stored on both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub(crate) id: SlotId,
    pub(crate) node: NodeId,
    pub(crate) direction: SlotDirection,
    pub(crate) slot_type: SlotType,
    pub(crate) binding: u32,
    pub(crate) name: String,
    pub(crate) variadic: bool,
    pub(crate) links: Vec<SlotId>,
}

impl Slot {
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Node owning this slot.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn direction(&self) -> SlotDirection {
        self.direction
    }

    pub fn slot_type(&self) -> SlotType {
        self.slot_type
    }

    /// Binding point the owning module uses for this slot.
    pub fn binding(&self) -> u32 {
        self.binding
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this slot belongs to the dynamically sized input set of its node.
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Peer slots this slot is linked to. Inputs have at most one.
    pub fn links(&self) -> &[SlotId] {
        &self.links
    }

    pub fn is_connected(&self) -> bool {
        !self.links.is_empty()
    }

    pub fn is_input(&self) -> bool {
        self.direction == SlotDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == SlotDirection::Output
    }
}
