// Command recording
//
// CommandAllocator: one per queue type, owns the native pool.
// CommandList: one native command buffer plus its state machine:
//
//   Initial --begin--> Recording --end--> Executable --reset--> Initial
//
// Recording calls take the Device so handles resolve to native objects at
// record time. Nothing is tracked implicitly: barriers carry explicit
// stages, access masks and layouts.

use anyhow::{Context, Result};

use crate::backend::{Backend, ResolvedAttachment, ResolvedBarriers, ResolvedRendering, SemaphoreSubmit};

use super::barrier::Barriers;
use super::device::Device;
use super::handle::*;
use super::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    Initial,
    Recording,
    Executable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentResolve {
    pub image: ImageHandle,
    pub layout: ImageLayout,
    pub mode: ResolveMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingAttachment {
    pub image: ImageHandle,
    pub layout: ImageLayout,
    pub load: LoadOp,
    pub store: StoreOp,
    pub clear: ClearValue,
    pub resolve: Option<AttachmentResolve>,
}

impl RenderingAttachment {
    /// Cleared and stored colour target
    pub fn color(image: ImageHandle, clear: [f32; 4]) -> Self {
        Self {
            image,
            layout: ImageLayout::ColorAttachment,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            clear: ClearValue::Color(clear),
            resolve: None,
        }
    }

    /// Cleared depth target whose contents are discarded after the pass
    pub fn depth(image: ImageHandle, depth: f32) -> Self {
        Self {
            image,
            layout: ImageLayout::DepthStencilAttachment,
            load: LoadOp::Clear,
            store: StoreOp::DontCare,
            clear: ClearValue::DepthStencil(ClearDepthStencil { depth, stencil: 0 }),
            resolve: None,
        }
    }

    pub fn resolve_into(mut self, image: ImageHandle, layout: ImageLayout, mode: ResolveMode) -> Self {
        self.resolve = Some(AttachmentResolve { image, layout, mode });
        self
    }
}

/// One dynamic render scope
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingDesc {
    pub area: Rect2D,
    pub layers: u32,
    pub color: Vec<RenderingAttachment>,
    pub depth: Option<RenderingAttachment>,
    pub stencil: Option<RenderingAttachment>,
}

impl RenderingDesc {
    pub fn new(area: impl Into<Rect2D>) -> Self {
        Self {
            area: area.into(),
            layers: 1,
            color: Vec::new(),
            depth: None,
            stencil: None,
        }
    }

    pub fn color(mut self, attachment: RenderingAttachment) -> Self {
        self.color.push(attachment);
        self
    }

    pub fn depth(mut self, attachment: RenderingAttachment) -> Self {
        self.depth = Some(attachment);
        self
    }

    pub fn stencil(mut self, attachment: RenderingAttachment) -> Self {
        self.stencil = Some(attachment);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreWait {
    pub semaphore: SemaphoreHandle,
    pub stages: PipelineStages,
    /// Ignored for binary semaphores
    pub value: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreSignal {
    pub semaphore: SemaphoreHandle,
    /// Ignored for binary semaphores
    pub value: u64,
}

/// Synchronization attached to one `CommandList::execute`
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitInfo<'a> {
    pub waits: &'a [SemaphoreWait],
    pub signals: &'a [SemaphoreSignal],
    pub fence: Option<FenceHandle>,
}

// =============================================================================
// ALLOCATOR
// =============================================================================

pub struct CommandAllocator<B: Backend> {
    raw: B::CommandAllocator,
    queue: QueueType,
    family: u32,
    live: usize,
}

impl<B: Backend> CommandAllocator<B> {
    pub fn new(device: &Device<B>, queue: QueueType) -> Result<Self> {
        let family = device.backend().queue_family(queue);
        let raw = device
            .backend()
            .create_command_allocator(family)
            .with_context(|| format!("Failed to create {:?} command allocator", queue))?;
        log::debug!("{:?} command allocator on queue family {}", queue, family);

        Ok(Self {
            raw,
            queue,
            family,
            live: 0,
        })
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.family
    }

    pub fn allocate(&mut self, device: &Device<B>) -> Result<CommandList<B>> {
        let raw = device
            .backend()
            .allocate_command_buffer(&self.raw)
            .context("Failed to allocate command buffer")?;
        self.live += 1;

        Ok(CommandList {
            raw,
            queue: self.queue,
            family: self.family,
            state: CommandListState::Initial,
            in_rendering: false,
            bound_pipeline: None,
        })
    }

    /// The list must not be Recording and the GPU must be done with it
    pub fn free(&mut self, device: &Device<B>, list: CommandList<B>) {
        assert!(
            list.state != CommandListState::Recording,
            "freeing a command list that is still recording"
        );
        assert_eq!(list.family, self.family, "command list freed to a foreign allocator");
        device.backend().free_command_buffer(&self.raw, list.raw);
        self.live -= 1;
    }

    /// Lists still allocated from this allocator are invalidated
    pub fn destroy(self, device: &Device<B>) {
        if self.live > 0 {
            log::warn!("Destroying {:?} command allocator with {} live lists", self.queue, self.live);
        }
        device.backend().destroy_command_allocator(self.raw);
    }
}

// =============================================================================
// COMMAND LIST
// =============================================================================

pub struct CommandList<B: Backend> {
    raw: B::CommandBuffer,
    queue: QueueType,
    family: u32,
    state: CommandListState,
    in_rendering: bool,
    bound_pipeline: Option<PipelineHandle>,
}

impl<B: Backend> CommandList<B> {
    pub fn state(&self) -> CommandListState {
        self.state
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.family
    }

    pub fn raw(&self) -> &B::CommandBuffer {
        &self.raw
    }

    fn expect_recording(&self, op: &str) {
        assert!(
            self.state == CommandListState::Recording,
            "CommandList::{} called while {:?}",
            op,
            self.state
        );
    }

    fn bound_pipeline(&self, op: &str) -> PipelineHandle {
        match self.bound_pipeline {
            Some(pipeline) => pipeline,
            None => panic!("CommandList::{} called with no pipeline bound", op),
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    pub fn begin(&mut self, device: &Device<B>, usage: CommandListUsage) -> Result<()> {
        assert!(
            self.state == CommandListState::Initial,
            "CommandList::begin called while {:?}",
            self.state
        );
        device.begin_recording();

        if let Err(e) = device.backend().begin_command_buffer(&mut self.raw, usage) {
            device.end_recording();
            return Err(e).context("Failed to begin command buffer");
        }
        self.state = CommandListState::Recording;
        self.bound_pipeline = None;
        Ok(())
    }

    pub fn end(&mut self, device: &Device<B>) -> Result<()> {
        self.expect_recording("end");
        assert!(!self.in_rendering, "CommandList::end called inside a render scope");

        device.end_recording();
        self.state = CommandListState::Executable;
        device
            .backend()
            .end_command_buffer(&mut self.raw)
            .context("Failed to end command buffer")
    }

    /// Return to Initial from any state. Resetting a Recording list abandons
    /// what was recorded and frees the device's recording slot.
    pub fn reset(&mut self, device: &Device<B>, release_resources: bool) -> Result<()> {
        if self.state == CommandListState::Recording {
            log::warn!("Resetting a command list that was still recording");
            device.end_recording();
        }
        self.state = CommandListState::Initial;
        self.in_rendering = false;
        self.bound_pipeline = None;
        device
            .backend()
            .reset_command_buffer(&mut self.raw, release_resources)
            .context("Failed to reset command buffer")
    }

    // =========================================================================
    // CLEARS & RENDER SCOPES
    // =========================================================================

    /// Image must currently be in TransferDst or General layout
    pub fn clear_color_image(&mut self, device: &Device<B>, image: ImageHandle, color: [f32; 4], range: SubresourceRange) {
        self.expect_recording("clear_color_image");
        let image = device.image(image);
        debug_assert!(
            matches!(image.layout, ImageLayout::TransferDst | ImageLayout::General),
            "clear_color_image on an image in {:?} layout",
            image.layout
        );
        device
            .backend()
            .cmd_clear_color_image(&mut self.raw, &image.raw, image.layout, color, range);
    }

    pub fn clear_depth_stencil_image(
        &mut self,
        device: &Device<B>,
        image: ImageHandle,
        value: ClearDepthStencil,
        range: SubresourceRange,
    ) {
        self.expect_recording("clear_depth_stencil_image");
        let image = device.image(image);
        debug_assert!(image.desc.format.is_depth(), "depth clear on a colour image");
        device
            .backend()
            .cmd_clear_depth_stencil_image(&mut self.raw, &image.raw, image.layout, value, range);
    }

    pub fn begin_rendering(&mut self, device: &Device<B>, desc: &RenderingDesc) {
        self.expect_recording("begin_rendering");
        assert!(!self.in_rendering, "render scopes cannot nest");

        let resolve = |a: &RenderingAttachment| ResolvedAttachment::<B> {
            image: &device.image(a.image).raw,
            layout: a.layout,
            load: a.load,
            store: a.store,
            clear: a.clear,
            resolve: a
                .resolve
                .map(|r| (&device.image(r.image).raw, r.layout, r.mode)),
        };
        let info = ResolvedRendering {
            area: desc.area,
            layers: desc.layers.max(1),
            color: desc.color.iter().map(resolve).collect(),
            depth: desc.depth.as_ref().map(resolve),
            stencil: desc.stencil.as_ref().map(resolve),
        };
        device.backend().cmd_begin_rendering(&mut self.raw, &info);
        self.in_rendering = true;
    }

    pub fn end_rendering(&mut self, device: &Device<B>) {
        self.expect_recording("end_rendering");
        assert!(self.in_rendering, "end_rendering without begin_rendering");
        device.backend().cmd_end_rendering(&mut self.raw);
        self.in_rendering = false;
    }

    // =========================================================================
    // BARRIERS
    // =========================================================================

    /// Record every barrier in `barriers` as one native dependency, in the
    /// order given. Image layouts tracked by the Device move to each
    /// barrier's new layout.
    pub fn add_barriers(&mut self, device: &mut Device<B>, barriers: &Barriers) {
        self.expect_recording("add_barriers");
        if barriers.is_empty() {
            return;
        }

        {
            let pools = device.pools();
            let resolved = ResolvedBarriers::<B> {
                memory: &barriers.memory,
                buffers: barriers
                    .buffers
                    .iter()
                    .map(|b| (&pools.buffers.get(b.buffer).raw, b))
                    .collect(),
                images: barriers
                    .images
                    .iter()
                    .map(|b| (&pools.images.get(b.image).raw, b))
                    .collect(),
            };
            device.backend().cmd_pipeline_barrier(&mut self.raw, &resolved);
        }

        for barrier in &barriers.images {
            device.set_image_layout(barrier.image, barrier.new_layout);
        }
    }

    // =========================================================================
    // COPIES
    // =========================================================================

    pub fn copy_buffer(&mut self, device: &Device<B>, src: BufferHandle, dst: BufferHandle, regions: &[BufferCopy]) {
        self.expect_recording("copy_buffer");
        let (src, dst) = (device.buffer(src), device.buffer(dst));
        for r in regions {
            debug_assert!(r.src_offset + r.size <= src.size(), "copy reads past the source buffer");
            debug_assert!(r.dst_offset + r.size <= dst.size(), "copy writes past the destination buffer");
        }
        device.backend().cmd_copy_buffer(&mut self.raw, &src.raw, &dst.raw, regions);
    }

    pub fn copy_buffer_to_image(
        &mut self,
        device: &Device<B>,
        src: BufferHandle,
        dst: ImageHandle,
        regions: &[BufferImageCopy],
    ) {
        self.expect_recording("copy_buffer_to_image");
        let (src, dst) = (device.buffer(src), device.image(dst));
        device
            .backend()
            .cmd_copy_buffer_to_image(&mut self.raw, &src.raw, &dst.raw, dst.layout, regions);
    }

    pub fn copy_image_to_buffer(
        &mut self,
        device: &Device<B>,
        src: ImageHandle,
        dst: BufferHandle,
        regions: &[BufferImageCopy],
    ) {
        self.expect_recording("copy_image_to_buffer");
        let (src, dst) = (device.image(src), device.buffer(dst));
        device
            .backend()
            .cmd_copy_image_to_buffer(&mut self.raw, &src.raw, src.layout, &dst.raw, regions);
    }

    pub fn copy_image(&mut self, device: &Device<B>, src: ImageHandle, dst: ImageHandle, regions: &[ImageCopy]) {
        self.expect_recording("copy_image");
        let (src, dst) = (device.image(src), device.image(dst));
        device
            .backend()
            .cmd_copy_image(&mut self.raw, &src.raw, src.layout, &dst.raw, dst.layout, regions);
    }

    // =========================================================================
    // BINDING
    // =========================================================================

    pub fn bind_pipeline(&mut self, device: &Device<B>, pipeline: PipelineHandle) {
        self.expect_recording("bind_pipeline");
        let p = device.pipeline(pipeline);
        device.backend().cmd_bind_pipeline(&mut self.raw, p.bind_point(), &p.raw);
        self.bound_pipeline = Some(pipeline);
    }

    pub fn bind_vertex_buffers(&mut self, device: &Device<B>, first_binding: u32, buffers: &[(BufferHandle, u64)]) {
        self.expect_recording("bind_vertex_buffers");
        let raw: Vec<(&B::Buffer, u64)> = buffers
            .iter()
            .map(|&(h, offset)| (&device.buffer(h).raw, offset))
            .collect();
        device.backend().cmd_bind_vertex_buffers(&mut self.raw, first_binding, &raw);
    }

    pub fn bind_index_buffer(&mut self, device: &Device<B>, buffer: BufferHandle, offset: u64, index_type: IndexType) {
        self.expect_recording("bind_index_buffer");
        device
            .backend()
            .cmd_bind_index_buffer(&mut self.raw, &device.buffer(buffer).raw, offset, index_type);
    }

    /// Bind a group against the layout of the currently bound pipeline
    pub fn bind_descriptor_group(&mut self, device: &Device<B>, first_set: u32, group: DescriptorGroupHandle) {
        self.expect_recording("bind_descriptor_group");
        let pipeline = device.pipeline(self.bound_pipeline("bind_descriptor_group"));
        device.backend().cmd_bind_descriptor_group(
            &mut self.raw,
            pipeline.bind_point(),
            &pipeline.raw,
            first_set,
            &device.descriptor_group(group).raw,
        );
    }

    pub fn push_constants(&mut self, device: &Device<B>, stages: ShaderStages, offset: u32, data: &[u8]) {
        self.expect_recording("push_constants");
        let pipeline = device.pipeline(self.bound_pipeline("push_constants"));
        device
            .backend()
            .cmd_push_constants(&mut self.raw, &pipeline.raw, stages, offset, data);
    }

    pub fn set_viewport(&mut self, device: &Device<B>, viewport: Viewport) {
        self.expect_recording("set_viewport");
        device.backend().cmd_set_viewport(&mut self.raw, viewport);
    }

    pub fn set_scissor(&mut self, device: &Device<B>, scissor: Rect2D) {
        self.expect_recording("set_scissor");
        device.backend().cmd_set_scissor(&mut self.raw, scissor);
    }

    // =========================================================================
    // DRAW & DISPATCH
    // =========================================================================

    pub fn draw(&mut self, device: &Device<B>, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.expect_recording("draw");
        debug_assert!(self.in_rendering, "draw outside a render scope");
        device
            .backend()
            .cmd_draw(&mut self.raw, vertex_count, instance_count, first_vertex, first_instance);
    }

    pub fn draw_indexed(
        &mut self,
        device: &Device<B>,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.expect_recording("draw_indexed");
        debug_assert!(self.in_rendering, "draw_indexed outside a render scope");
        device.backend().cmd_draw_indexed(
            &mut self.raw,
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        );
    }

    pub fn draw_mesh_tasks(&mut self, device: &Device<B>, x: u32, y: u32, z: u32) {
        self.expect_recording("draw_mesh_tasks");
        debug_assert!(self.in_rendering, "draw_mesh_tasks outside a render scope");
        device.backend().cmd_draw_mesh_tasks(&mut self.raw, x, y, z);
    }

    pub fn dispatch(&mut self, device: &Device<B>, x: u32, y: u32, z: u32) {
        self.expect_recording("dispatch");
        debug_assert!(!self.in_rendering, "dispatch inside a render scope");
        device.backend().cmd_dispatch(&mut self.raw, x, y, z);
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    pub fn set_event(&mut self, device: &Device<B>, event: EventHandle, stages: PipelineStages) {
        self.expect_recording("set_event");
        device
            .backend()
            .cmd_set_event(&mut self.raw, &device.pools.events.get(event).raw, stages);
    }

    pub fn reset_event(&mut self, device: &Device<B>, event: EventHandle, stages: PipelineStages) {
        self.expect_recording("reset_event");
        device
            .backend()
            .cmd_reset_event(&mut self.raw, &device.pools.events.get(event).raw, stages);
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    /// Submit Executable lists to their queue in one batch
    pub fn execute(device: &Device<B>, lists: &[&CommandList<B>], info: &SubmitInfo<'_>) -> Result<()> {
        let Some(first) = lists.first() else {
            anyhow::bail!("execute called with no command lists");
        };
        for list in lists {
            assert!(
                list.state == CommandListState::Executable,
                "executing a command list that is {:?}",
                list.state
            );
            assert_eq!(list.queue, first.queue, "command lists in one submit must share a queue");
        }

        // Binary semaphores carry a 0 placeholder value so one value array
        // lines up with the semaphore array
        let resolve = |handle: SemaphoreHandle, value: u64, stages: PipelineStages| {
            let semaphore = device.semaphore(handle);
            SemaphoreSubmit::<B> {
                semaphore: &semaphore.raw,
                kind: semaphore.kind,
                value: match semaphore.kind {
                    SemaphoreKind::Binary => 0,
                    SemaphoreKind::Timeline => value,
                },
                stages,
            }
        };
        let waits: Vec<_> = info.waits.iter().map(|w| resolve(w.semaphore, w.value, w.stages)).collect();
        let signals: Vec<_> = info
            .signals
            .iter()
            .map(|s| resolve(s.semaphore, s.value, PipelineStages::ALL_COMMANDS))
            .collect();
        let cmds: Vec<&B::CommandBuffer> = lists.iter().map(|l| &l.raw).collect();
        let fence = info.fence.map(|h| &device.fence(h).raw);

        device
            .backend()
            .submit(first.queue, &cmds, &waits, &signals, fence)
            .with_context(|| format!("Failed to submit {} command list(s) to {:?} queue", lists.len(), first.queue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{BarrierEntry, HeadlessBackend, HeadlessCommand};
    use crate::rhi::barrier::{BufferBarrier, ImageBarrier, MemoryBarrier};

    fn setup() -> (Device<HeadlessBackend>, CommandAllocator<HeadlessBackend>) {
        let device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let allocator = CommandAllocator::new(&device, QueueType::Graphics).unwrap();
        (device, allocator)
    }

    fn buffer(device: &mut Device<HeadlessBackend>, name: &str) -> BufferHandle {
        device
            .create_buffer(&BufferDesc {
                size: 256,
                usage: BufferUsage::TRANSFER_DST | BufferUsage::STORAGE,
                memory: MemoryUsage::GpuOnly,
                debug_name: name.to_string(),
            })
            .unwrap()
    }

    fn image(device: &mut Device<HeadlessBackend>) -> ImageHandle {
        device
            .create_image(&ImageDesc {
                extent: Extent3D { width: 16, height: 16, depth: 1 },
                usage: ImageUsage::TRANSFER_DST | ImageUsage::SAMPLED,
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn lifecycle_follows_the_state_machine() {
        let (device, mut allocator) = setup();
        let mut list = allocator.allocate(&device).unwrap();
        assert_eq!(list.state(), CommandListState::Initial);

        list.begin(&device, CommandListUsage::ONE_TIME_SUBMIT).unwrap();
        assert_eq!(list.state(), CommandListState::Recording);
        assert!(device.is_recording());

        list.end(&device).unwrap();
        assert_eq!(list.state(), CommandListState::Executable);
        assert!(!device.is_recording());

        list.reset(&device, false).unwrap();
        assert_eq!(list.state(), CommandListState::Initial);
    }

    #[test]
    fn reset_while_recording_returns_to_initial() {
        let (device, mut allocator) = setup();
        let mut list = allocator.allocate(&device).unwrap();
        list.begin(&device, CommandListUsage::empty()).unwrap();
        list.reset(&device, true).unwrap();
        assert_eq!(list.state(), CommandListState::Initial);
        assert!(!device.is_recording());

        // Can record again straight away
        list.begin(&device, CommandListUsage::empty()).unwrap();
        list.end(&device).unwrap();
    }

    #[test]
    #[should_panic(expected = "CommandList::end called while Initial")]
    fn end_without_begin_panics() {
        let (device, mut allocator) = setup();
        let mut list = allocator.allocate(&device).unwrap();
        let _ = list.end(&device);
    }

    #[test]
    #[should_panic(expected = "CommandList::begin called while Recording")]
    fn begin_twice_panics() {
        let (device, mut allocator) = setup();
        let mut list = allocator.allocate(&device).unwrap();
        list.begin(&device, CommandListUsage::empty()).unwrap();
        let _ = list.begin(&device, CommandListUsage::empty());
    }

    #[test]
    #[should_panic(expected = "already recording")]
    fn only_one_list_records_at_a_time() {
        let (device, mut allocator) = setup();
        let mut a = allocator.allocate(&device).unwrap();
        let mut b = allocator.allocate(&device).unwrap();
        a.begin(&device, CommandListUsage::empty()).unwrap();
        let _ = b.begin(&device, CommandListUsage::empty());
    }

    #[test]
    #[should_panic(expected = "CommandList::dispatch called while Executable")]
    fn recording_after_end_panics() {
        let (device, mut allocator) = setup();
        let mut list = allocator.allocate(&device).unwrap();
        list.begin(&device, CommandListUsage::empty()).unwrap();
        list.end(&device).unwrap();
        list.dispatch(&device, 1, 1, 1);
    }

    #[test]
    fn barriers_in_one_call_become_one_dependency() {
        let (mut device, mut allocator) = setup();
        let buffers: Vec<_> = (0..3).map(|i| buffer(&mut device, &format!("b{}", i))).collect();
        let images: Vec<_> = (0..2).map(|_| image(&mut device)).collect();

        let mut barriers = Barriers::new().memory(MemoryBarrier {
            src_stages: PipelineStages::HOST,
            src_access: AccessFlags::HOST_WRITE,
            dst_stages: PipelineStages::VERTEX_SHADER,
            dst_access: AccessFlags::UNIFORM_READ,
        });
        for &b in &buffers {
            barriers = barriers.buffer(
                BufferBarrier::whole(b)
                    .src(PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE)
                    .dst(PipelineStages::COMPUTE_SHADER, AccessFlags::SHADER_READ),
            );
        }
        for &i in &images {
            barriers = barriers.image(
                ImageBarrier::new(i, SubresourceRange::color())
                    .layouts(ImageLayout::Undefined, ImageLayout::TransferDst)
                    .src(PipelineStages::TOP_OF_PIPE, AccessFlags::empty())
                    .dst(PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE),
            );
        }

        let mut list = allocator.allocate(&device).unwrap();
        list.begin(&device, CommandListUsage::ONE_TIME_SUBMIT).unwrap();
        list.add_barriers(&mut device, &barriers);
        list.end(&device).unwrap();

        let commands = list.raw().commands();
        assert_eq!(commands.len(), 1);
        let HeadlessCommand::Barrier(entries) = &commands[0] else {
            panic!("expected a barrier, got {:?}", commands[0]);
        };
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0], BarrierEntry::Memory);
        for (entry, &b) in entries[1..4].iter().zip(&buffers) {
            assert_eq!(*entry, BarrierEntry::Buffer { buffer: device.buffer(b).raw().id() });
        }
        for (entry, &i) in entries[4..].iter().zip(&images) {
            assert_eq!(
                *entry,
                BarrierEntry::Image {
                    image: device.image(i).raw().id(),
                    old: ImageLayout::Undefined,
                    new: ImageLayout::TransferDst,
                }
            );
            assert_eq!(device.image(i).layout(), ImageLayout::TransferDst);
        }
    }

    #[test]
    fn empty_barrier_batch_records_nothing() {
        let (mut device, mut allocator) = setup();
        let mut list = allocator.allocate(&device).unwrap();
        list.begin(&device, CommandListUsage::empty()).unwrap();
        list.add_barriers(&mut device, &Barriers::new());
        list.end(&device).unwrap();
        assert!(list.raw().commands().is_empty());
    }

    #[test]
    fn execute_signals_fence_and_gpu_events() {
        let (mut device, mut allocator) = setup();
        let fence = device.create_fence(false).unwrap();
        let event = device.create_event().unwrap();

        let mut list = allocator.allocate(&device).unwrap();
        list.begin(&device, CommandListUsage::ONE_TIME_SUBMIT).unwrap();
        list.set_event(&device, event, PipelineStages::ALL_COMMANDS);
        list.end(&device).unwrap();

        CommandList::execute(
            &device,
            &[&list],
            &SubmitInfo {
                fence: Some(fence),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(device.wait_for_fence(fence, u64::MAX).unwrap());
        assert!(device.is_event_set(event).unwrap());
        assert_eq!(device.backend().stats().submissions, 1);
    }

    #[test]
    #[should_panic(expected = "executing a command list that is Recording")]
    fn executing_an_open_list_panics() {
        let (device, mut allocator) = setup();
        let mut list = allocator.allocate(&device).unwrap();
        list.begin(&device, CommandListUsage::empty()).unwrap();
        let _ = CommandList::execute(&device, &[&list], &SubmitInfo::default());
    }

    #[test]
    fn allocator_resolves_queue_family_once() {
        let device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let mut transfer = CommandAllocator::new(&device, QueueType::Transfer).unwrap();
        let list = transfer.allocate(&device).unwrap();
        assert_eq!(list.queue(), QueueType::Transfer);
        assert_eq!(list.queue_family(), device.backend().queue_family(QueueType::Transfer));
        transfer.free(&device, list);
        transfer.destroy(&device);
    }
}
