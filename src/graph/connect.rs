//! Linking and unlinking slots.
//!
//! There is exactly one way to create a link: [`NodeGraph::connect`] (or [`NodeGraph::reconnect`] for a batch).
//! A link always goes from an output to an input of the same [`SlotType`](crate::SlotType), on two different nodes.
//! Inputs hold at most one link, connecting an input that already has one replaces it. Refused links are
//! logged and leave the graph untouched.

use anyhow::Result;

use crate::graph::node::NodeId;
use crate::graph::node_graph::NodeGraph;
use crate::graph::notify::{Notification, NotifyEvent};
use crate::graph::slot::{SlotDirection, SlotId};
use crate::Error;

impl NodeGraph {
    /// Order two slots as `(output, input)` and check they can be linked.
    fn check_link(&self, a: SlotId, b: SlotId) -> Result<(SlotId, SlotId)> {
        let slot_a = self.slots.get(&a).ok_or(Error::SlotNotFound(a))?;
        let slot_b = self.slots.get(&b).ok_or(Error::SlotNotFound(b))?;
        let (from, to) = match (slot_a.direction, slot_b.direction) {
            (SlotDirection::Output, SlotDirection::Input) => (slot_a, slot_b),
            (SlotDirection::Input, SlotDirection::Output) => (slot_b, slot_a),
            _ => {
                return Err(Error::IncompatibleSlots {
                    from: a,
                    to: b,
                    reason: "both slots have the same direction",
                }
                .into())
            }
        };
        if from.node == to.node {
            return Err(Error::IncompatibleSlots {
                from: from.id,
                to: to.id,
                reason: "both slots belong to the same node",
            }
            .into());
        }
        if from.slot_type != to.slot_type {
            return Err(Error::IncompatibleSlots {
                from: from.id,
                to: to.id,
                reason: "slot types differ",
            }
            .into());
        }
        Ok((from.id, to.id))
    }

    /// Remove the link between two slots from both ends.
    fn unlink(&mut self, from: SlotId, to: SlotId) -> Result<()> {
        let linked = self
            .slots
            .get(&from)
            .map_or(false, |slot| slot.links.contains(&to));
        if !linked {
            return Err(Error::NotLinked(from, to).into());
        }
        if let Some(slot) = self.slots.get_mut(&from) {
            slot.links.retain(|peer| *peer != to);
        }
        if let Some(slot) = self.slots.get_mut(&to) {
            slot.links.retain(|peer| *peer != from);
        }
        Ok(())
    }

    fn link(&mut self, from: SlotId, to: SlotId) -> Result<()> {
        let existing = self.slots.get(&to).ok_or(Error::SlotNotFound(to))?.links.clone();
        if existing == [from] {
            return Ok(());
        }
        let replacing = !existing.is_empty();
        for old in existing {
            self.unlink(old, to)?;
            debug!("Replacing link {old} -> {to}");
            self.notify(Notification::new(NotifyEvent::JustDisconnected, old, to));
        }
        self.flush_notifications();
        // `to` is empty until relinked below; the batch protection keeps it alive.
        if replacing {
            if let Some(node) = self.node_of(to) {
                self.reorganize_slots(node, &[to]);
            }
        }

        if let Some(slot) = self.slots.get_mut(&from) {
            slot.links.push(to);
        }
        if let Some(slot) = self.slots.get_mut(&to) {
            slot.links.push(from);
        }
        debug!("Linked {from} -> {to}");
        self.notify(Notification::new(NotifyEvent::JustConnected, from, to));
        self.flush_notifications();

        if let Some(node) = self.node_of(to) {
            self.reorganize_slots(node, &[to]);
        }
        Ok(())
    }

    /// Link an output to an input. The slots can be given in either order.
    ///
    /// Fails without changing anything when either slot does not exist, both have the same direction,
    /// they belong to the same node, or their types differ. If the input is already linked, that link is
    /// broken first. The input's node is notified right away and receives the upstream's current resource.
    pub fn connect(&mut self, a: SlotId, b: SlotId) -> Result<()> {
        self.reconnect(&[(a, b)])
    }

    /// Create a batch of links. All links are checked before any is made, so either all are made or none.
    /// Every slot involved is protected from slot reorganization until the whole batch is done.
    pub fn reconnect(&mut self, links: &[(SlotId, SlotId)]) -> Result<()> {
        self.do_not_destroy.clear();
        let mut ordered = Vec::with_capacity(links.len());
        for (a, b) in links.iter().copied() {
            let link = self.check_link(a, b).map_err(|err| {
                warn!("Refusing to link {a} and {b}: {err}");
                err
            })?;
            ordered.push(link);
        }

        self.do_not_destroy.extend(ordered.iter().flat_map(|(from, to)| [*from, *to]));
        let result = ordered
            .iter()
            .try_for_each(|(from, to)| self.link(*from, *to));
        self.do_not_destroy.clear();
        self.update_used();
        result?;

        if self.has_cycle() {
            warn!("Graph contains a cycle, nodes on it will not execute until it is broken");
        }
        Ok(())
    }

    /// Break the link between two slots, given in either order. The input's node is notified and falls back
    /// to an empty resource. Empty slots of a variadic input set are removed, keeping exactly one empty slot.
    pub fn disconnect(&mut self, a: SlotId, b: SlotId) -> Result<()> {
        let slot_a = self.slots.get(&a).ok_or(Error::SlotNotFound(a))?;
        let (from, to) = if slot_a.is_output() { (a, b) } else { (b, a) };
        self.unlink(from, to).map_err(|err| {
            warn!("Cannot disconnect: {err}");
            err
        })?;
        debug!("Unlinked {from} -> {to}");

        self.notify(Notification::new(NotifyEvent::JustDisconnected, from, to));
        self.flush_notifications();
        if let Some(node) = self.node_of(to) {
            self.reorganize_slots(node, &[to]);
        }
        self.update_used();
        Ok(())
    }

    /// Break every link of a slot.
    pub fn disconnect_slot(&mut self, slot: SlotId) -> Result<()> {
        let peers = self.slots.get(&slot).ok_or(Error::SlotNotFound(slot))?.links.clone();
        for peer in peers {
            self.disconnect(slot, peer)?;
        }
        Ok(())
    }

    /// Whether two slots are linked.
    pub fn is_linked(&self, a: SlotId, b: SlotId) -> bool {
        self.slots.get(&a).map_or(false, |slot| slot.links.contains(&b))
    }

    /// Keep the variadic input set of a node at exactly one empty slot. Empty slots among `changed` are removed
    /// unless protected by the link operation in progress, then an orphan is appended if no slot is empty.
    pub(crate) fn reorganize_slots(&mut self, id: NodeId, changed: &[SlotId]) {
        let Some(node) = self.nodes.get(&id) else { return };
        if node.variadic.is_none() {
            return;
        }

        let removable = changed
            .iter()
            .copied()
            .filter(|slot| node.inputs.contains(slot) && !self.do_not_destroy.contains(slot))
            .filter(|slot| {
                self.slots
                    .get(slot)
                    .map_or(false, |slot| slot.variadic && !slot.is_connected())
            })
            .collect::<Vec<_>>();
        for slot in &removable {
            self.slots.remove(slot);
            debug!("Removed empty variadic {slot}");
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.inputs.retain(|slot| !removable.contains(slot));
        }

        let has_empty = self.nodes.get(&id).map_or(false, |node| {
            node.inputs.iter().any(|slot| {
                self.slots
                    .get(slot)
                    .map_or(false, |slot| slot.variadic && !slot.is_connected())
            })
        });
        if !has_empty {
            if let Some(slot) = self.add_variadic_slot(id) {
                debug!("Appended orphan {slot} to {id}");
            }
        }
    }
}
