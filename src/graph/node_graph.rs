//! The [`NodeGraph`] container: nodes, their slots, and delivery of notifications between them.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use anyhow::Result;
use ash::vk;
use glam::IVec2;

use crate::core::gpu::Gpu;
use crate::core::settings::GraphSettings;
use crate::graph::node::{ModuleState, Node, NodeBuilder, NodeId, UNPLACED_CELL};
use crate::graph::notify::{Notification, NotificationQueue, NotifyEvent};
use crate::graph::resource::SlotResource;
use crate::graph::slot::{Slot, SlotDesc, SlotDirection, SlotId};
use crate::module::Port;
use crate::Error;

/// Owns every node and slot of a graph. Nodes and slots refer to each other by id only.
///
/// # Example
/// ```ignore
/// use lumo::prelude::*;
///
/// let mut graph = NodeGraph::new(gpu.clone(), GraphSettings::default());
/// let noise = graph.add_node(NodeBuilder::new("noise").output("out", SlotType::Texture2D).module(noise_module));
/// let main = graph.add_node(NodeBuilder::new("main").input("in", SlotType::Texture2D).module(view_module));
/// let out = graph.node(noise).unwrap().outputs()[0];
/// let input = graph.node(main).unwrap().inputs()[0];
/// graph.connect(out, input)?;
///
/// let mut ctx = ExecutionContext::new(gpu.clone());
/// let stats = graph.tick(0, cmd, &mut ctx)?;
/// ```
#[derive(Derivative)]
#[derivative(Debug)]
pub struct NodeGraph {
    #[derivative(Debug = "ignore")]
    pub(crate) gpu: Gpu,
    pub(crate) settings: GraphSettings,
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) slots: HashMap<SlotId, Slot>,
    next_node: u32,
    next_slot: u32,
    /// Slots that must survive the link operation in progress, even when they end up empty.
    pub(crate) do_not_destroy: HashSet<SlotId>,
    pub(crate) notifications: NotificationQueue,
}

impl NodeGraph {
    pub fn new(gpu: Gpu, settings: GraphSettings) -> Self {
        Self {
            gpu,
            settings,
            nodes: BTreeMap::new(),
            slots: HashMap::new(),
            next_node: 0,
            next_slot: 0,
            do_not_destroy: HashSet::new(),
            notifications: NotificationQueue::new(),
        }
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    fn alloc_slot(&mut self, node: NodeId, direction: SlotDirection, desc: &SlotDesc, binding: u32, variadic: bool) -> SlotId {
        let id = SlotId(self.next_slot);
        self.next_slot += 1;
        self.slots.insert(
            id,
            Slot {
                id,
                node,
                direction,
                slot_type: desc.slot_type,
                binding,
                name: desc.name.clone(),
                variadic,
                links: Vec::new(),
            },
        );
        id
    }

    /// Add a node and initialize its module. A module that fails to initialize is torn down again and
    /// the node is added in the [`ModuleState::Failed`] state.
    pub fn add_node(&mut self, builder: NodeBuilder) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;

        let mut inputs = Vec::with_capacity(builder.inputs.len() + 1);
        for desc in &builder.inputs {
            let binding = inputs.len() as u32;
            inputs.push(self.alloc_slot(id, SlotDirection::Input, desc, binding, false));
        }
        if let Some(desc) = &builder.variadic {
            let binding = inputs.len() as u32;
            inputs.push(self.alloc_slot(id, SlotDirection::Input, desc, binding, true));
        }
        let mut outputs = Vec::with_capacity(builder.outputs.len());
        for desc in &builder.outputs {
            let binding = outputs.len() as u32;
            outputs.push(self.alloc_slot(id, SlotDirection::Output, desc, binding, false));
        }

        let mut node = Node {
            id,
            name: builder.name,
            type_name: builder.type_name,
            position: builder.position,
            size: builder.size,
            cell: UNPLACED_CELL,
            used: false,
            inserted: false,
            enabled: builder.enabled,
            root: builder.root,
            dirty: true,
            last_executed_frame: None,
            last_visited_frame: None,
            state: ModuleState::Uninitialized,
            resize_policy: builder.resize_policy,
            inputs,
            outputs,
            variadic: builder.variadic,
            module: builder.module,
        };
        node.state = Self::init_module(&self.gpu, &mut node);
        info!("Added node `{}` ({id})", node.name);
        self.nodes.insert(id, node);
        self.update_used();
        id
    }

    fn init_module(gpu: &Gpu, node: &mut Node) -> ModuleState {
        let Some(module) = node.module.as_mut() else {
            return ModuleState::Uninitialized;
        };
        match module.init(gpu) {
            Ok(()) => ModuleState::Ready,
            Err(err) => {
                error!("{}: {err:?}", Error::ModuleInitFailed(node.name.clone()));
                module.unit();
                ModuleState::Failed
            }
        }
    }

    /// Remove a node. All its links are broken first, notifying the nodes on the other end.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let node = self.nodes.get(&id).ok_or(Error::NodeNotFound(id))?;
        let slots = node.inputs.iter().chain(node.outputs.iter()).copied().collect::<Vec<_>>();
        for slot in slots {
            if self.slots.contains_key(&slot) {
                self.disconnect_slot(slot)?;
            }
        }

        let mut node = self.nodes.remove(&id).ok_or(Error::NodeNotFound(id))?;
        for slot in node.inputs.iter().chain(node.outputs.iter()) {
            self.slots.remove(slot);
            self.do_not_destroy.remove(slot);
        }
        if node.state == ModuleState::Ready {
            if let Some(module) = node.module.as_mut() {
                module.unit();
            }
        }
        info!("Removed node `{}` ({id})", node.name);
        self.update_used();
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// First node with this name, in insertion order.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.values().find(|node| node.name == name).map(|node| node.id)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.get(&id)
    }

    /// Input slot of a node by binding point.
    pub fn input_slot(&self, node: NodeId, binding: u32) -> Option<SlotId> {
        self.nodes
            .get(&node)?
            .inputs
            .iter()
            .copied()
            .find(|slot| self.slots.get(slot).map_or(false, |slot| slot.binding == binding))
    }

    /// Output slot of a node by binding point.
    pub fn output_slot(&self, node: NodeId, binding: u32) -> Option<SlotId> {
        self.nodes
            .get(&node)?
            .outputs
            .iter()
            .copied()
            .find(|slot| self.slots.get(slot).map_or(false, |slot| slot.binding == binding))
    }

    /// Every link as `(output, input)`, sorted.
    pub fn links(&self) -> Vec<(SlotId, SlotId)> {
        let mut links = self
            .slots
            .values()
            .filter(|slot| slot.is_input())
            .flat_map(|slot| slot.links.iter().map(move |peer| (*peer, slot.id)))
            .collect::<Vec<_>>();
        links.sort();
        links
    }

    pub fn link_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.is_input())
            .map(|slot| slot.links.len())
            .sum()
    }

    pub(crate) fn node_of(&self, slot: SlotId) -> Option<NodeId> {
        self.slots.get(&slot).map(|slot| slot.node)
    }

    /// Nodes directly feeding the inputs of a node, in input order.
    pub fn upstream_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut upstream = Vec::new();
        for input in &node.inputs {
            let Some(slot) = self.slots.get(input) else { continue };
            for peer in &slot.links {
                if let Some(peer_node) = self.node_of(*peer) {
                    if !upstream.contains(&peer_node) {
                        upstream.push(peer_node);
                    }
                }
            }
        }
        upstream
    }

    /// Nodes directly consuming the outputs of a node.
    pub fn downstream_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut downstream = Vec::new();
        for output in &node.outputs {
            let Some(slot) = self.slots.get(output) else { continue };
            for peer in &slot.links {
                if let Some(peer_node) = self.node_of(*peer) {
                    if !downstream.contains(&peer_node) {
                        downstream.push(peer_node);
                    }
                }
            }
        }
        downstream
    }

    /// Root nodes: flagged as root, or named after the configured root name.
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|node| node.root || node.name == self.settings.root_name)
            .map(|node| node.id)
            .collect()
    }

    /// Recompute the `used` flag of every node from root reachability. Failed nodes are never used
    /// and do not make their upstream used. Called after every topology change.
    pub fn update_used(&mut self) {
        for node in self.nodes.values_mut() {
            node.used = false;
        }
        let mut queue = self
            .roots()
            .into_iter()
            .filter(|id| self.nodes.get(id).map_or(false, |node| node.state != ModuleState::Failed))
            .collect::<VecDeque<_>>();
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(&id) else { continue };
            if node.used {
                continue;
            }
            node.used = true;
            for upstream in self.upstream_nodes(id) {
                let Some(node) = self.nodes.get(&upstream) else { continue };
                if !node.used && node.state != ModuleState::Failed {
                    queue.push_back(upstream);
                }
            }
        }
    }

    /// Whether a node contributes to a root.
    pub fn is_used(&self, id: NodeId) -> bool {
        self.nodes.get(&id).map_or(false, |node| node.used)
    }

    /// Enable or disable a node. Disabled nodes never execute, their outputs keep their last value.
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        node.enabled = enabled;
        node.dirty = true;
        Ok(())
    }

    /// Tell the scheduler the parameters of a node changed, so it executes on the next tick.
    pub fn mark_changed(&mut self, id: NodeId) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        node.dirty = true;
        Ok(())
    }

    /// Tear down and initialize the module of a node again, for example after it failed.
    /// On success every input of the node is refreshed from its upstream.
    pub fn reinit_node(&mut self, id: NodeId) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        if node.state == ModuleState::Ready {
            if let Some(module) = node.module.as_mut() {
                module.unit();
            }
        }
        node.state = Self::init_module(&self.gpu, node);
        node.dirty = true;
        node.last_executed_frame = None;
        let state = node.state;
        let name = node.name.clone();
        let inputs = node.inputs.clone();
        let outputs = node.outputs.clone();

        self.update_used();
        if state == ModuleState::Failed {
            return Err(Error::ModuleInitFailed(name).into());
        }
        for input in inputs {
            self.refresh_input(input);
        }
        for output in outputs {
            self.queue_updates(output);
        }
        self.flush_notifications();
        Ok(())
    }

    /// Tear down the module of a node after a resource error. Downstream nodes fall back to empty inputs.
    pub(crate) fn fail_node(&mut self, id: NodeId, err: &anyhow::Error) {
        let Some(node) = self.nodes.get_mut(&id) else { return };
        error!("Node `{}` failed, disabling it: {err:?}", node.name);
        if let Some(module) = node.module.as_mut() {
            module.unit();
        }
        node.state = ModuleState::Failed;
        let outputs = node.outputs.clone();
        self.update_used();
        for output in outputs {
            self.queue_updates(output);
        }
        self.flush_notifications();
    }

    /// Current resource of an output of a node. `None` if the node has no ready module or nothing to publish.
    pub fn output_descriptor(&self, id: NodeId, binding: u32) -> Option<SlotResource> {
        let node = self.nodes.get(&id)?;
        if node.state != ModuleState::Ready {
            return None;
        }
        node.module.as_ref()?.output(binding)
    }

    fn output_resource(&self, output: SlotId) -> Option<SlotResource> {
        let slot = self.slots.get(&output)?;
        let resource = self.output_descriptor(slot.node, slot.binding)?;
        if resource.slot_type() != slot.slot_type {
            warn!(
                "{output} publishes a {} resource but is declared as {}, ignoring it",
                resource.slot_type(),
                slot.slot_type
            );
            return None;
        }
        Some(resource)
    }

    fn deliver_input(&mut self, input: SlotId, resource: Option<SlotResource>) {
        let Some(slot) = self.slots.get(&input) else { return };
        let port = Port {
            slot: input,
            binding: slot.binding,
            slot_type: slot.slot_type,
        };
        let Some(node) = self.nodes.get_mut(&slot.node) else { return };
        node.dirty = true;
        if node.state != ModuleState::Ready {
            return;
        }
        if let Some(module) = node.module.as_mut() {
            module.set_input(port, resource);
        }
    }

    /// Pull the resource currently published by the upstream of an input.
    pub(crate) fn refresh_input(&mut self, input: SlotId) {
        let resource = self
            .slots
            .get(&input)
            .and_then(|slot| slot.links.first().copied())
            .and_then(|peer| self.output_resource(peer));
        self.deliver_input(input, resource);
    }

    /// Queue the "update done" notification of an output to every input linked to it.
    pub(crate) fn queue_updates(&mut self, output: SlotId) {
        let Some(slot) = self.slots.get(&output) else { return };
        let event = NotifyEvent::updated(slot.slot_type);
        for peer in &slot.links {
            self.notifications.push(Notification::new(event, output, *peer));
        }
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Tell every node the graph finished loading. Every input is refreshed from its upstream.
    pub fn notify_graph_loaded(&mut self) {
        self.notifications.push(Notification::broadcast(NotifyEvent::GraphLoaded));
        self.flush_notifications();
    }

    /// Deliver every queued notification, in order.
    pub fn flush_notifications(&mut self) {
        while let Some(notification) = self.notifications.pop() {
            self.deliver(notification);
        }
    }

    fn resize_node(&mut self, id: NodeId, extent: Option<vk::Extent2D>, buffer_count: Option<u32>) {
        let Some(node) = self.nodes.get_mut(&id) else { return };
        if !node.resize_policy.by_event || node.state != ModuleState::Ready {
            return;
        }
        if let Some(module) = node.module.as_mut() {
            module.need_resize(extent, buffer_count);
        }
    }

    fn deliver(&mut self, notification: Notification) {
        let receiver_node = notification.receiver.and_then(|slot| self.node_of(slot));
        match notification.event {
            NotifyEvent::TextureUpdated
            | NotifyEvent::Texture3DUpdated
            | NotifyEvent::TextureCubeUpdated
            | NotifyEvent::TextureGroupUpdated
            | NotifyEvent::ModelUpdated
            | NotifyEvent::LightGroupUpdated
            | NotifyEvent::ShaderPassUpdated
            | NotifyEvent::AccelStructureUpdated
            | NotifyEvent::TexelBufferUpdated
            | NotifyEvent::StorageBufferUpdated
            | NotifyEvent::VariableUpdated
            | NotifyEvent::JustConnected => {
                if let Some(receiver) = notification.receiver {
                    self.refresh_input(receiver);
                }
            }
            NotifyEvent::JustDisconnected => {
                if let Some(receiver) = notification.receiver {
                    self.deliver_input(receiver, None);
                }
            }
            NotifyEvent::ResizeNeeded {
                extent,
                buffer_count,
            } => match receiver_node {
                Some(id) => self.resize_node(id, extent, buffer_count),
                None => {
                    let ids = self.nodes.keys().copied().collect::<Vec<_>>();
                    for id in ids {
                        self.resize_node(id, extent, buffer_count);
                    }
                }
            },
            NotifyEvent::GraphLoaded => {
                let inputs = self
                    .slots
                    .values()
                    .filter(|slot| slot.is_input() && slot.is_connected())
                    .map(|slot| slot.id)
                    .collect::<Vec<_>>();
                for input in inputs {
                    self.refresh_input(input);
                }
            }
        }

        match receiver_node {
            Some(id) => self.observe(id, &notification),
            None if notification.receiver.is_none() => {
                let ids = self.nodes.keys().copied().collect::<Vec<_>>();
                for id in ids {
                    self.observe(id, &notification);
                }
            }
            None => {}
        }
    }

    fn observe(&mut self, id: NodeId, notification: &Notification) {
        let Some(node) = self.nodes.get_mut(&id) else { return };
        if node.state != ModuleState::Ready {
            return;
        }
        if let Some(module) = node.module.as_mut() {
            module.on_notification(notification);
        }
    }

    /// Request a resize of a node's outputs, as if done from the editor. Only records the request;
    /// it is applied when the node is next pulled by [`NodeGraph::tick`].
    pub fn request_resize(&mut self, id: NodeId, extent: vk::Extent2D) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        if !node.resize_policy.by_hand {
            warn!("Node `{}` does not allow manual resizing, ignoring request", node.name);
            return Ok(());
        }
        if node.state != ModuleState::Ready {
            return Ok(());
        }
        if let Some(module) = node.module.as_mut() {
            module.need_resize(Some(extent), None);
        }
        Ok(())
    }

    /// Forward a window or viewport resize to every node that follows resize events.
    pub fn resize_event(&mut self, extent: vk::Extent2D) {
        self.notifications.push(Notification::broadcast(NotifyEvent::ResizeNeeded {
            extent: Some(extent),
            buffer_count: None,
        }));
        self.flush_notifications();
    }

    /// Append an empty slot to the variadic input set of a node.
    pub(crate) fn add_variadic_slot(&mut self, id: NodeId) -> Option<SlotId> {
        let node = self.nodes.get(&id)?;
        let desc = node.variadic.clone()?;
        let binding = node
            .inputs
            .iter()
            .filter_map(|slot| self.slots.get(slot))
            .map(|slot| slot.binding + 1)
            .max()
            .unwrap_or(0);
        let slot = self.alloc_slot(id, SlotDirection::Input, &desc, binding, true);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.inputs.push(slot);
        }
        Some(slot)
    }

    /// Set the layout cell of a node, used by the auto layout.
    pub(crate) fn set_cell(&mut self, id: NodeId, cell: IVec2) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.cell = cell;
        }
    }
}
