//! Nodes of a [`NodeGraph`](crate::NodeGraph) and the builder used to declare them.
//!
//! # Example
//! ```
//! # use lumo::*;
//! let blur = NodeBuilder::new("blur")
//!     .type_name("Blur")
//!     .input("source", SlotType::Texture2D)
//!     .output("result", SlotType::Texture2D);
//! let merger = NodeBuilder::new("merger")
//!     .variadic_input("pass", SlotType::ShaderPass)
//!     .output("scene", SlotType::Texture2D)
//!     .root(true);
//! ```

use std::fmt::{Display, Formatter};

use glam::{IVec2, Vec2};

use crate::graph::slot::{SlotDesc, SlotId, SlotType};
use crate::module::NodeModule;

/// Identifies a node inside a [`NodeGraph`](crate::NodeGraph). Ids are allocated in increasing order and never reused,
/// so sorting by id sorts by insertion order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "node #{}", self.0)
    }
}

/// When a module re-renders.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Every frame it is reachable, for example for time based effects.
    AllTime,
    /// Only after an input or one of its own parameters changed.
    WhenNeeded,
}

/// Lifecycle of the module owned by a node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// No module, or not initialized yet.
    Uninitialized,
    Ready,
    /// Initialization or a resize failed. The module was torn down and the node is never used
    /// until [`NodeGraph::reinit_node`](crate::NodeGraph::reinit_node) succeeds.
    Failed,
}

/// Which resize requests a node accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResizePolicy {
    /// Follow resize events coming from upstream nodes or the window.
    pub by_event: bool,
    /// Accept explicit [`NodeGraph::request_resize`](crate::NodeGraph::request_resize) calls.
    pub by_hand: bool,
}

impl Default for ResizePolicy {
    fn default() -> Self {
        Self {
            by_event: true,
            by_hand: true,
        }
    }
}

/// Declares a node before it is added to a graph with [`NodeGraph::add_node`](crate::NodeGraph::add_node).
/// Inputs and outputs get their binding points in declaration order. A variadic input always comes after
/// the fixed inputs.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct NodeBuilder {
    pub(crate) name: String,
    pub(crate) type_name: String,
    pub(crate) inputs: Vec<SlotDesc>,
    pub(crate) outputs: Vec<SlotDesc>,
    pub(crate) variadic: Option<SlotDesc>,
    pub(crate) root: bool,
    pub(crate) enabled: bool,
    pub(crate) position: Vec2,
    pub(crate) size: Vec2,
    pub(crate) resize_policy: ResizePolicy,
    #[derivative(Debug = "ignore")]
    pub(crate) module: Option<Box<dyn NodeModule>>,
}

impl NodeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            variadic: None,
            root: false,
            enabled: true,
            position: Vec2::ZERO,
            size: Vec2::new(100.0, 50.0),
            resize_policy: ResizePolicy::default(),
            module: None,
        }
    }

    /// Name of the kind of node, for display purposes.
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn input(mut self, name: impl Into<String>, slot_type: SlotType) -> Self {
        self.inputs.push(SlotDesc {
            name: name.into(),
            slot_type,
        });
        self
    }

    pub fn output(mut self, name: impl Into<String>, slot_type: SlotType) -> Self {
        self.outputs.push(SlotDesc {
            name: name.into(),
            slot_type,
        });
        self
    }

    /// Give this node a dynamically sized set of inputs. The node always keeps exactly one empty slot of this set.
    pub fn variadic_input(mut self, name: impl Into<String>, slot_type: SlotType) -> Self {
        self.variadic = Some(SlotDesc {
            name: name.into(),
            slot_type,
        });
        self
    }

    /// Mark this node as a root. Roots, and everything they depend on, are executed every tick.
    pub fn root(mut self, root: bool) -> Self {
        self.root = root;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    /// Size of the node in the editor, used by the auto layout.
    pub fn size(mut self, size: Vec2) -> Self {
        self.size = size;
        self
    }

    pub fn resize_policy(mut self, policy: ResizePolicy) -> Self {
        self.resize_policy = policy;
        self
    }

    /// The module doing the actual work for this node.
    pub fn module(mut self, module: impl NodeModule + 'static) -> Self {
        self.module = Some(Box::new(module));
        self
    }

    pub fn boxed_module(mut self, module: Box<dyn NodeModule>) -> Self {
        self.module = Some(module);
        self
    }
}

/// A node in the graph. Nodes own their slots by id and their module by value.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) type_name: String,
    pub(crate) position: Vec2,
    pub(crate) size: Vec2,
    pub(crate) cell: IVec2,
    pub(crate) used: bool,
    pub(crate) inserted: bool,
    pub(crate) enabled: bool,
    pub(crate) root: bool,
    pub(crate) dirty: bool,
    pub(crate) last_executed_frame: Option<u64>,
    pub(crate) last_visited_frame: Option<u64>,
    pub(crate) state: ModuleState,
    pub(crate) resize_policy: ResizePolicy,
    pub(crate) inputs: Vec<SlotId>,
    pub(crate) outputs: Vec<SlotId>,
    pub(crate) variadic: Option<SlotDesc>,
    #[derivative(Debug = "ignore")]
    pub(crate) module: Option<Box<dyn NodeModule>>,
}

/// Cell of nodes the auto layout did not place.
pub const UNPLACED_CELL: IVec2 = IVec2::new(-1, -1);

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// Column and row assigned by the last auto layout, or `(-1, -1)`.
    pub fn cell(&self) -> IVec2 {
        self.cell
    }

    /// Whether this node contributes to a root.
    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Whether the last auto layout placed this node.
    pub fn is_inserted(&self) -> bool {
        self.inserted
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Whether an input or parameter changed since the last execution.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_executed_frame(&self) -> Option<u64> {
        self.last_executed_frame
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn resize_policy(&self) -> ResizePolicy {
        self.resize_policy
    }

    pub fn set_resize_policy(&mut self, policy: ResizePolicy) {
        self.resize_policy = policy;
    }

    pub fn inputs(&self) -> &[SlotId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[SlotId] {
        &self.outputs
    }

    /// Type of the dynamically sized input set, if this node has one.
    pub fn variadic_type(&self) -> Option<SlotType> {
        self.variadic.as_ref().map(|desc| desc.slot_type)
    }

    pub fn module(&self) -> Option<&dyn NodeModule> {
        self.module.as_deref()
    }

    pub fn module_mut(&mut self) -> Option<&mut (dyn NodeModule + 'static)> {
        self.module.as_deref_mut()
    }

    /// Whether the scheduler may execute this node.
    pub(crate) fn is_runnable(&self) -> bool {
        self.used && self.enabled && self.state == ModuleState::Ready && self.module.is_some()
    }
}
