//! Per-frame execution of a [`NodeGraph`].
//!
//! Execution is pull based. [`NodeGraph::tick`] visits every used root, and before a node executes all nodes
//! linked to its inputs are pulled first. Each node is visited at most once per frame, so shared upstream
//! nodes in a diamond execute once. A node executes when it is runnable and either its module runs
//! [`ExecutionMode::AllTime`] or something changed since its last execution.
//!
//! After executing, a node publishes its outputs: every linked input receives the new resource and the
//! typed update notification, which marks the consumer as changed. Pending resizes are applied right before
//! a node executes, outside of any render pass, and travel one hop downstream per applied resize.

use anyhow::Result;
use ash::vk;

use crate::graph::node::{ExecutionMode, NodeId};
use crate::graph::node_graph::NodeGraph;
use crate::graph::notify::{Notification, NotifyEvent};
use crate::module::context::ExecutionContext;
use crate::Error;

/// What happened to each node during one [`NodeGraph::tick`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    /// Nodes that executed, in execution order.
    pub executed: Vec<NodeId>,
    /// Nodes whose outputs were resized before executing.
    pub resized: Vec<NodeId>,
    /// Roots whose subgraph was aborted because of an execution cycle.
    pub aborted: Vec<NodeId>,
    /// Every node that did not execute.
    pub skipped: Vec<NodeId>,
}

impl FrameStats {
    fn new(frame: u64) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn executed(&self, id: NodeId) -> bool {
        self.executed.contains(&id)
    }
}

impl NodeGraph {
    /// Run one frame: deliver pending notifications, then pull every used root.
    ///
    /// A cycle below a root aborts that root for this frame only; it is logged and reported in
    /// [`FrameStats::aborted`], other roots still execute.
    /// # Errors
    /// * Fails if the graph is internally inconsistent, for example a link to a node that no longer exists.
    pub fn tick(&mut self, frame: u64, cmd: vk::CommandBuffer, ctx: &mut ExecutionContext) -> Result<FrameStats> {
        ctx.set_frame(frame);
        self.flush_notifications();

        let mut stats = FrameStats::new(frame);
        for root in self.roots() {
            if !self.is_used(root) {
                continue;
            }
            let mut stack = Vec::new();
            if let Err(err) = self.execute_node(root, frame, cmd, ctx, &mut stack, &mut stats) {
                match err.downcast_ref::<Error>() {
                    Some(Error::ExecutionCycle(_)) => {
                        let name = self.node(root).map(|node| node.name.clone()).unwrap_or_default();
                        error!("Aborting root `{name}` for frame {frame}: {err}");
                        stats.aborted.push(root);
                    }
                    _ => return Err(err),
                }
            }
        }

        stats.skipped = self
            .nodes
            .keys()
            .copied()
            .filter(|id| !stats.executed.contains(id))
            .collect();
        Ok(stats)
    }

    /// Pull every input of a node, then execute it if needed. Memoized per frame.
    fn execute_node(
        &mut self,
        id: NodeId,
        frame: u64,
        cmd: vk::CommandBuffer,
        ctx: &mut ExecutionContext,
        stack: &mut Vec<NodeId>,
        stats: &mut FrameStats,
    ) -> Result<()> {
        let node = self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        if stack.contains(&id) || stack.len() >= self.settings.max_pull_depth {
            return Err(Error::ExecutionCycle(node.name.clone()).into());
        }
        if node.last_visited_frame == Some(frame) {
            return Ok(());
        }
        node.last_visited_frame = Some(frame);
        if !node.is_runnable() {
            trace!("Skipping node `{}`", node.name);
            return Ok(());
        }

        stack.push(id);
        self.execute_input_tasks(id, frame, cmd, ctx, stack, stats)?;
        stack.pop();

        if !self.apply_resize(id, stats) {
            return Ok(());
        }

        let node = self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        let Some(module) = node.module.as_mut() else {
            return Ok(());
        };
        let needed = match module.execution_mode() {
            ExecutionMode::AllTime => true,
            ExecutionMode::WhenNeeded => node.dirty || node.last_executed_frame.is_none(),
        };
        if !needed {
            return Ok(());
        }

        trace!("Executing node `{}` for frame {frame}", node.name);
        if let Err(err) = module.execute(frame, cmd, ctx) {
            error!("Node `{}` failed to execute frame {frame}: {err:?}", node.name);
        }
        node.dirty = false;
        node.last_executed_frame = Some(frame);
        stats.executed.push(id);

        let outputs = node.outputs.clone();
        for output in outputs {
            self.queue_updates(output);
        }
        self.flush_notifications();
        Ok(())
    }

    /// Make sure every node linked to an input of this node has been visited for `frame`.
    fn execute_input_tasks(
        &mut self,
        id: NodeId,
        frame: u64,
        cmd: vk::CommandBuffer,
        ctx: &mut ExecutionContext,
        stack: &mut Vec<NodeId>,
        stats: &mut FrameStats,
    ) -> Result<()> {
        for upstream in self.upstream_nodes(id) {
            self.execute_node(upstream, frame, cmd, ctx, stack, stats)?;
        }
        Ok(())
    }

    /// Apply a pending resize of a node's module. A real resize marks the node as changed and sends the
    /// new size to every directly linked downstream node. Returns false if the resize failed and the node
    /// was disabled.
    fn apply_resize(&mut self, id: NodeId, stats: &mut FrameStats) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else { return false };
        let Some(module) = node.module.as_mut() else { return true };
        let resized = match module.resize_if_needed() {
            Ok(resized) => resized,
            Err(err) => {
                self.fail_node(id, &err);
                return false;
            }
        };
        if !resized {
            return true;
        }

        let extent = module.output_size();
        node.dirty = true;
        debug!("Node `{}` resized to {extent:?}", node.name);
        stats.resized.push(id);

        let outputs = node.outputs.clone();
        for output in outputs {
            let peers = self.slots.get(&output).map(|slot| slot.links.clone()).unwrap_or_default();
            for peer in peers {
                self.notify(Notification::new(
                    NotifyEvent::ResizeNeeded {
                        extent,
                        buffer_count: None,
                    },
                    output,
                    peer,
                ));
            }
        }
        self.flush_notifications();
        true
    }
}
