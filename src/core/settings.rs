//! Exposes the settings that tune scheduling and automatic layout of a [`NodeGraph`](crate::NodeGraph).

use glam::Vec2;

/// Settings shared by every operation on a [`NodeGraph`](crate::NodeGraph).
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSettings {
    /// Name of the designated root node. Nodes with this name are always treated as roots,
    /// regardless of their own root flag.
    pub root_name: String,
    /// Amount of times the layout engine may push a single node further away from its consumers
    /// before it gives up on that node and reports it as part of a loop.
    pub loop_threshold: u32,
    /// Maximum depth of the recursive input pull. Deeper pulls are treated as execution cycles.
    pub max_pull_depth: usize,
    /// Space between two columns (x) and between two nodes in a column (y) after auto layout.
    pub node_spacing: Vec2,
    /// Horizontal alignment of nodes inside their column. `0.0` aligns left, `1.0` aligns right.
    pub node_centering: f32,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            root_name: String::from("main"),
            loop_threshold: 50,
            max_pull_depth: 1024,
            node_spacing: Vec2::new(70.0, 30.0),
            node_centering: 1.0,
        }
    }
}

/// The settings builder is a convenience struct to easily create [`GraphSettings`].
///
/// # Example
/// ```
/// # use lumo::*;
/// let settings = GraphSettingsBuilder::new()
///     .root_name("output")
///     .loop_threshold(20)
///     .node_spacing(glam::Vec2::new(40.0, 20.0))
///     .build();
/// assert_eq!(settings.root_name, "output");
/// ```
#[derive(Debug, Default)]
pub struct GraphSettingsBuilder {
    inner: GraphSettings,
}

impl GraphSettingsBuilder {
    /// Create a new settings builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of the designated root node.
    pub fn root_name(mut self, name: impl Into<String>) -> Self {
        self.inner.root_name = name.into();
        self
    }

    /// Sets the layout loop detection threshold.
    pub fn loop_threshold(mut self, threshold: u32) -> Self {
        self.inner.loop_threshold = threshold;
        self
    }

    /// Sets the maximum input pull depth.
    pub fn max_pull_depth(mut self, depth: usize) -> Self {
        self.inner.max_pull_depth = depth;
        self
    }

    /// Sets the spacing used by the auto layout.
    pub fn node_spacing(mut self, spacing: Vec2) -> Self {
        self.inner.node_spacing = spacing;
        self
    }

    /// Sets the horizontal alignment of nodes inside a layout column.
    pub fn node_centering(mut self, centering: f32) -> Self {
        self.inner.node_centering = centering.clamp(0.0, 1.0);
        self
    }

    /// Build the resulting settings.
    pub fn build(self) -> GraphSettings {
        self.inner
    }
}
