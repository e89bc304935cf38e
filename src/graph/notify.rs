//! The notification bus. Every change that crosses a link travels as a [`Notification`]: published
//! outputs, new and removed links, and resize requests.
//!
//! Notifications are queued and delivered in order by [`NodeGraph::flush_notifications`](crate::NodeGraph::flush_notifications).
//! Delivery matches exhaustively on [`NotifyEvent`], so adding an event forces every handler to deal with it.

use std::collections::VecDeque;

use ash::vk;

use crate::graph::slot::{SlotId, SlotType};

/// What happened. Update events carry no payload, receivers pull the resource from the emitting slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    TextureUpdated,
    Texture3DUpdated,
    TextureCubeUpdated,
    TextureGroupUpdated,
    ModelUpdated,
    LightGroupUpdated,
    ShaderPassUpdated,
    AccelStructureUpdated,
    TexelBufferUpdated,
    StorageBufferUpdated,
    VariableUpdated,
    /// The emitter changed size. `None` fields are unchanged.
    ResizeNeeded {
        extent: Option<vk::Extent2D>,
        buffer_count: Option<u32>,
    },
    /// The emitter was just linked to the receiver.
    JustConnected,
    /// The emitter was just unlinked from the receiver.
    JustDisconnected,
    /// The graph finished loading, every input should refresh.
    GraphLoaded,
}

impl NotifyEvent {
    /// The "update done" event for outputs of a slot type.
    pub fn updated(slot_type: SlotType) -> Self {
        match slot_type {
            SlotType::Texture2D => NotifyEvent::TextureUpdated,
            SlotType::Texture3D => NotifyEvent::Texture3DUpdated,
            SlotType::TextureCube => NotifyEvent::TextureCubeUpdated,
            SlotType::TextureGroup => NotifyEvent::TextureGroupUpdated,
            SlotType::Model => NotifyEvent::ModelUpdated,
            SlotType::LightGroup => NotifyEvent::LightGroupUpdated,
            SlotType::ShaderPass => NotifyEvent::ShaderPassUpdated,
            SlotType::AccelStructure => NotifyEvent::AccelStructureUpdated,
            SlotType::TexelBuffer => NotifyEvent::TexelBufferUpdated,
            SlotType::StorageBuffer => NotifyEvent::StorageBufferUpdated,
            SlotType::Variable => NotifyEvent::VariableUpdated,
        }
    }

    /// Whether this is one of the typed "update done" events.
    pub fn is_update(&self) -> bool {
        !matches!(
            self,
            NotifyEvent::ResizeNeeded { .. } | NotifyEvent::JustConnected | NotifyEvent::JustDisconnected | NotifyEvent::GraphLoaded
        )
    }
}

/// An event together with the slots it travels between. Broadcasts have no emitter or receiver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event: NotifyEvent,
    pub emitter: Option<SlotId>,
    pub receiver: Option<SlotId>,
}

impl Notification {
    pub fn new(event: NotifyEvent, emitter: SlotId, receiver: SlotId) -> Self {
        Self {
            event,
            emitter: Some(emitter),
            receiver: Some(receiver),
        }
    }

    pub fn broadcast(event: NotifyEvent) -> Self {
        Self {
            event,
            emitter: None,
            receiver: None,
        }
    }
}

/// FIFO queue of pending notifications.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    queue: VecDeque<Notification>,
    delivered: u64,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: Notification) {
        self.queue.push_back(notification);
    }

    pub fn pop(&mut self) -> Option<Notification> {
        let notification = self.queue.pop_front();
        if notification.is_some() {
            self.delivered += 1;
        }
        notification
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total amount of notifications taken from this queue.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}
