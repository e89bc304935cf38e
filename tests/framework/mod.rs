#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;
use ash::vk::Handle;

use lumo::prelude::*;

/// A call made to the [`MockGpu`].
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateRenderPass(vk::RenderPass),
    DestroyRenderPass(vk::RenderPass),
    CreateImageSet {
        framebuffer: vk::Framebuffer,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    },
    DestroyImageSet(vk::Framebuffer),
    WaitIdle,
    /// Width and height of the viewport.
    SetViewport(f32, f32),
    SetScissor(vk::Rect2D),
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        clear_values: usize,
    },
    ClearAttachments(usize),
    EndRenderPass,
}

#[derive(Debug, Default)]
pub struct MockState {
    next_handle: u64,
    pub calls: Vec<GpuCall>,
    pub live_render_passes: HashSet<vk::RenderPass>,
    pub live_sets: HashMap<vk::Framebuffer, ImageSet>,
    /// Image set creations left before allocations start failing.
    pub image_set_budget: Option<usize>,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Headless [`GpuBackend`] recording every call. Clones share their state.
#[derive(Debug, Clone, Default)]
pub struct MockGpu {
    pub state: Arc<Mutex<MockState>>,
}

impl MockGpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gpu(&self) -> Gpu {
        Gpu::new(self.clone())
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&GpuCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    pub fn live_sets(&self) -> Vec<ImageSet> {
        self.state.lock().unwrap().live_sets.values().cloned().collect()
    }

    pub fn live_render_passes(&self) -> usize {
        self.state.lock().unwrap().live_render_passes.len()
    }

    /// Framebuffer of the last render pass begun.
    pub fn last_framebuffer(&self) -> Option<vk::Framebuffer> {
        self.calls().iter().rev().find_map(|call| match call {
            GpuCall::BeginRenderPass {
                framebuffer, ..
            } => Some(*framebuffer),
            _ => None,
        })
    }

    /// Sampled color view of binding 0 of a live image set.
    pub fn view_of(&self, framebuffer: vk::Framebuffer) -> Option<vk::ImageView> {
        let state = self.state.lock().unwrap();
        state
            .live_sets
            .get(&framebuffer)
            .and_then(|set| set.attachment(0))
            .map(|attachment| attachment.view)
    }

    pub fn fail_image_sets_after(&self, budget: usize) {
        self.state.lock().unwrap().image_set_budget = Some(budget);
    }
}

impl GpuBackend for MockGpu {
    fn create_render_pass(&self, _info: &RenderPassCreateInfo) -> Result<vk::RenderPass> {
        let mut state = self.state.lock().unwrap();
        let render_pass = vk::RenderPass::from_raw(state.handle());
        state.live_render_passes.insert(render_pass);
        state.calls.push(GpuCall::CreateRenderPass(render_pass));
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        let mut state = self.state.lock().unwrap();
        state.live_render_passes.remove(&render_pass);
        state.calls.push(GpuCall::DestroyRenderPass(render_pass));
    }

    fn create_image_set(&self, info: &ImageSetCreateInfo) -> Result<ImageSet> {
        let mut state = self.state.lock().unwrap();
        if let Some(budget) = state.image_set_budget.as_mut() {
            if *budget == 0 {
                anyhow::bail!("out of device memory");
            }
            *budget -= 1;
        }
        let framebuffer = vk::Framebuffer::from_raw(state.handle());
        let multisampled = info.samples != vk::SampleCountFlags::TYPE_1;
        let mut attachments = Vec::new();
        let mut resolve = Vec::new();
        for _ in 0..info.color_attachments {
            if multisampled {
                attachments.push(Attachment {
                    image: vk::Image::from_raw(state.handle()),
                    view: vk::ImageView::from_raw(state.handle()),
                    sampler: vk::Sampler::null(),
                    layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                });
            }
            let sampled = Attachment {
                image: vk::Image::from_raw(state.handle()),
                view: vk::ImageView::from_raw(state.handle()),
                sampler: vk::Sampler::from_raw(state.handle()),
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            };
            if multisampled {
                resolve.push(sampled);
            } else {
                attachments.push(sampled);
            }
        }
        let set = ImageSet {
            framebuffer,
            extent: info.extent,
            attachments,
            depth: None,
            resolve,
        };
        state.live_sets.insert(framebuffer, set.clone());
        state.calls.push(GpuCall::CreateImageSet {
            framebuffer,
            render_pass: info.render_pass,
            extent: info.extent,
        });
        Ok(set)
    }

    fn destroy_image_set(&self, set: &ImageSet) {
        let mut state = self.state.lock().unwrap();
        state.live_sets.remove(&set.framebuffer);
        state.calls.push(GpuCall::DestroyImageSet(set.framebuffer));
    }

    fn wait_idle(&self) -> Result<()> {
        self.state.lock().unwrap().calls.push(GpuCall::WaitIdle);
        Ok(())
    }

    fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(GpuCall::SetViewport(viewport.width, viewport.height));
    }

    fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state.lock().unwrap().calls.push(GpuCall::SetScissor(scissor));
    }

    fn cmd_begin_render_pass(
        &self,
        _cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        _area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        self.state.lock().unwrap().calls.push(GpuCall::BeginRenderPass {
            render_pass,
            framebuffer,
            clear_values: clear_values.len(),
        });
    }

    fn cmd_clear_attachments(&self, _cmd: vk::CommandBuffer, attachments: &[vk::ClearAttachment], _rect: vk::ClearRect) {
        self.state.lock().unwrap().calls.push(GpuCall::ClearAttachments(attachments.len()));
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.state.lock().unwrap().calls.push(GpuCall::EndRenderPass);
    }
}

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

/// Creates an empty graph on a mock GPU, ready for automated tests
pub fn make_graph() -> (NodeGraph, MockGpu) {
    make_graph_with_settings(GraphSettings::default())
}

pub fn make_graph_with_settings(settings: GraphSettings) -> (NodeGraph, MockGpu) {
    init_logging();
    let mock = MockGpu::new();
    let graph = NodeGraph::new(mock.gpu(), settings);
    (graph, mock)
}

pub fn make_context(graph: &NodeGraph) -> ExecutionContext {
    ExecutionContext::new(graph.gpu().clone())
}

pub fn cmd() -> vk::CommandBuffer {
    vk::CommandBuffer::null()
}

/// Order in which modules executed, shared between all modules of a test.
pub type ExecLog = Arc<Mutex<Vec<(String, u64)>>>;

pub fn exec_log() -> ExecLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Everything a [`TestModule`] observed, readable from the test.
#[derive(Debug, Default)]
pub struct Probe {
    pub executions: Vec<u64>,
    /// Image view last received per input binding. `None` after the input was cleared.
    pub inputs: HashMap<u32, Option<vk::ImageView>>,
    pub events: Vec<NotifyEvent>,
    pub extent: vk::Extent2D,
    pub pending: Option<vk::Extent2D>,
    pub resizes: u32,
    pub inits: u32,
    pub units: u32,
    pub context_frames: Vec<u64>,
    pub fail_init: bool,
    pub fail_resize: bool,
}

pub type SharedProbe = Arc<Mutex<Probe>>;

/// Module publishing a fresh image view every time it executes.
pub struct TestModule {
    name: String,
    log: ExecLog,
    probe: SharedProbe,
    mode: ExecutionMode,
    view_base: u64,
}

impl TestModule {
    pub fn new(name: &str, log: &ExecLog) -> (Self, SharedProbe) {
        let probe = Arc::new(Mutex::new(Probe {
            extent: vk::Extent2D {
                width: 256,
                height: 256,
            },
            ..Default::default()
        }));
        let view_base = name.bytes().fold(0u64, |acc, byte| acc.wrapping_mul(31).wrapping_add(byte as u64)) << 16;
        (
            Self {
                name: name.to_owned(),
                log: log.clone(),
                probe: probe.clone(),
                mode: ExecutionMode::WhenNeeded,
                view_base,
            },
            probe,
        )
    }

    pub fn all_time(mut self) -> Self {
        self.mode = ExecutionMode::AllTime;
        self
    }
}

impl NodeModule for TestModule {
    fn init(&mut self, _gpu: &Gpu) -> Result<()> {
        let mut probe = self.probe.lock().unwrap();
        probe.inits += 1;
        if probe.fail_init {
            anyhow::bail!("`{}` refuses to initialize", self.name);
        }
        Ok(())
    }

    fn unit(&mut self) {
        self.probe.lock().unwrap().units += 1;
    }

    fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    fn execute(&mut self, frame: u64, _cmd: vk::CommandBuffer, ctx: &mut ExecutionContext) -> Result<()> {
        let mut probe = self.probe.lock().unwrap();
        probe.executions.push(frame);
        probe.context_frames.push(ctx.frame());
        self.log.lock().unwrap().push((self.name.clone(), frame));
        Ok(())
    }

    fn output(&self, _binding: u32) -> Option<SlotResource> {
        let probe = self.probe.lock().unwrap();
        Some(SlotResource::Texture2D {
            descriptor: vk::DescriptorImageInfo {
                image_view: vk::ImageView::from_raw(self.view_base.wrapping_add(probe.executions.len() as u64 + 1)),
                ..Default::default()
            },
            extent: probe.extent,
        })
    }

    fn set_input(&mut self, port: Port, resource: Option<SlotResource>) {
        let view = resource.and_then(|resource| resource.texture_descriptor()).map(|info| info.image_view);
        self.probe.lock().unwrap().inputs.insert(port.binding, view);
    }

    fn need_resize(&mut self, extent: Option<vk::Extent2D>, _buffer_count: Option<u32>) {
        if let Some(extent) = extent {
            self.probe.lock().unwrap().pending = Some(extent);
        }
    }

    fn resize_if_needed(&mut self) -> Result<bool> {
        let mut probe = self.probe.lock().unwrap();
        let Some(extent) = probe.pending.take() else {
            return Ok(false);
        };
        if probe.fail_resize {
            anyhow::bail!("`{}` cannot allocate {}x{}", self.name, extent.width, extent.height);
        }
        if extent == probe.extent {
            return Ok(false);
        }
        probe.extent = extent;
        probe.resizes += 1;
        Ok(true)
    }

    fn output_size(&self) -> Option<vk::Extent2D> {
        Some(self.probe.lock().unwrap().extent)
    }

    fn on_notification(&mut self, notification: &Notification) {
        self.probe.lock().unwrap().events.push(notification.event);
    }
}

/// Add a texture node with `inputs` inputs and one output, driven by a [`TestModule`].
pub fn add_texture_node(graph: &mut NodeGraph, name: &str, inputs: usize, log: &ExecLog) -> (NodeId, SharedProbe) {
    let (module, probe) = TestModule::new(name, log);
    add_with_module(graph, name, inputs, module, probe)
}

pub fn add_with_module(
    graph: &mut NodeGraph,
    name: &str,
    inputs: usize,
    module: TestModule,
    probe: SharedProbe,
) -> (NodeId, SharedProbe) {
    let mut builder = NodeBuilder::new(name).type_name("Test").output("out", SlotType::Texture2D);
    for index in 0..inputs {
        builder = builder.input(format!("in{index}"), SlotType::Texture2D);
    }
    let id = graph.add_node(builder.module(module));
    (id, probe)
}

/// Link output `from_binding` of `from` to input `to_binding` of `to`.
pub fn link(graph: &mut NodeGraph, from: NodeId, from_binding: u32, to: NodeId, to_binding: u32) -> Result<()> {
    let output = graph.output_slot(from, from_binding).expect("missing output slot");
    let input = graph.input_slot(to, to_binding).expect("missing input slot");
    graph.connect(output, input)
}

/// Image view currently published by output 0 of a node.
pub fn published_view(graph: &NodeGraph, node: NodeId) -> Option<vk::ImageView> {
    graph
        .output_descriptor(node, 0)
        .and_then(|resource| resource.texture_descriptor())
        .map(|info| info.image_view)
}

pub fn names(log: &ExecLog, frame: u64) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(_, f)| *f == frame)
        .map(|(name, _)| name.clone())
        .collect()
}

/// State of a [`TestPass`], readable from the test.
#[derive(Debug, Default)]
pub struct PassProbe {
    pub native: vk::RenderPass,
    pub render_pass: vk::RenderPass,
    pub viewport: Option<vk::Extent2D>,
    pub draws: Vec<u64>,
}

pub type SharedPassProbe = Arc<Mutex<PassProbe>>;

pub struct TestPass {
    probe: SharedPassProbe,
}

impl TestPass {
    pub fn new(native: u64) -> (ShaderPassHandle, SharedPassProbe) {
        let probe = Arc::new(Mutex::new(PassProbe {
            native: vk::RenderPass::from_raw(native),
            render_pass: vk::RenderPass::from_raw(native),
            ..Default::default()
        }));
        (
            ShaderPassHandle::new(TestPass {
                probe: probe.clone(),
            }),
            probe,
        )
    }
}

impl ShaderPass for TestPass {
    fn set_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.probe.lock().unwrap().render_pass = render_pass;
    }

    fn reset_render_pass_to_native(&mut self) {
        let mut probe = self.probe.lock().unwrap();
        probe.render_pass = probe.native;
    }

    fn set_viewport_size(&mut self, extent: vk::Extent2D) {
        self.probe.lock().unwrap().viewport = Some(extent);
    }

    fn draw(&mut self, _cmd: vk::CommandBuffer, frame: u64) -> Result<()> {
        self.probe.lock().unwrap().draws.push(frame);
        Ok(())
    }
}

/// Module publishing a fixed shader pass.
pub struct PassModule {
    pass: ShaderPassHandle,
}

impl NodeModule for PassModule {
    fn init(&mut self, _gpu: &Gpu) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, _frame: u64, _cmd: vk::CommandBuffer, _ctx: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn output(&self, _binding: u32) -> Option<SlotResource> {
        Some(SlotResource::ShaderPass(vec![self.pass.clone()]))
    }
}

/// Add a node publishing one shader pass. `native` is the raw handle of the pass' own render pass.
pub fn add_pass_node(graph: &mut NodeGraph, name: &str, native: u64) -> (NodeId, SharedPassProbe) {
    let (pass, probe) = TestPass::new(native);
    let id = graph.add_node(
        NodeBuilder::new(name)
            .type_name("Pass")
            .output("pass", SlotType::ShaderPass)
            .module(PassModule {
                pass,
            }),
    );
    (id, probe)
}

/// Input slots of a node belonging to its variadic set, and whether each is linked.
pub fn variadic_slots(graph: &NodeGraph, node: NodeId) -> Vec<(SlotId, bool)> {
    graph
        .node(node)
        .unwrap()
        .inputs()
        .iter()
        .filter_map(|slot| graph.slot(*slot))
        .filter(|slot| slot.is_variadic())
        .map(|slot| (slot.id(), slot.is_connected()))
        .collect()
}
