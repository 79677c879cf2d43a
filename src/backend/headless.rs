// Headless backend - software stand-in for a GPU
//
// No device, no window. Command buffers keep a readable log of what was
// recorded; submission completes instantly, so fences and semaphores are
// signalled the moment work is submitted. Misuse the real driver would
// hang or fault on (waiting on a binary semaphore nobody signalled, timeline
// values going backwards, submitting with a signalled fence) is an error.
//
// All simulated GPU state lives behind one mutex.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ptr::NonNull;

use super::*;

/// One recorded command, with native objects reduced to their ids
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessCommand {
    ClearColor { image: u64, layout: ImageLayout, color: [f32; 4] },
    ClearDepthStencil { image: u64, layout: ImageLayout, value: ClearDepthStencil },
    BeginRendering { area: Rect2D, color: Vec<u64>, depth: Option<u64> },
    EndRendering,
    Barrier(Vec<BarrierEntry>),
    CopyBuffer { src: u64, dst: u64, regions: Vec<BufferCopy> },
    CopyBufferToImage { src: u64, dst: u64, layout: ImageLayout },
    CopyImageToBuffer { src: u64, dst: u64, layout: ImageLayout },
    CopyImage { src: u64, dst: u64 },
    BindPipeline { pipeline: u64, bind_point: PipelineBindPoint },
    BindVertexBuffers { first_binding: u32, buffers: Vec<u64> },
    BindIndexBuffer { buffer: u64, index_type: IndexType },
    BindDescriptorGroup { group: u64, first_set: u32 },
    PushConstants { stages: ShaderStages, offset: u32, size: usize },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    DrawMeshTasks([u32; 3]),
    Dispatch([u32; 3]),
    SetEvent(u64),
    ResetEvent(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierEntry {
    Memory,
    Buffer { buffer: u64 },
    Image { image: u64, old: ImageLayout, new: ImageLayout },
}

/// Counters for what the simulated GPU has been asked to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub submissions: u64,
    pub command_lists: u64,
    pub fence_waits: u64,
    pub acquires: u64,
    pub presents: u64,
}

/// Opaque native object: samplers, pipelines, sync objects and so on
#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessObject {
    id: u64,
}

impl HeadlessObject {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
pub struct HeadlessBuffer {
    id: u64,
    data: Box<[u8]>,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessImage {
    id: u64,
}

impl HeadlessImage {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
pub struct HeadlessCommandBuffer {
    id: u64,
    recording: bool,
    commands: Vec<HeadlessCommand>,
}

impl HeadlessCommandBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Everything recorded since the last begin or reset
    pub fn commands(&self) -> &[HeadlessCommand] {
        &self.commands
    }
}

/// Stand-in for a window surface
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    forced_image_count: Option<u32>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return exactly `count` images regardless of what was requested
    pub fn with_forced_image_count(mut self, count: u32) -> Self {
        self.forced_image_count = Some(count);
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum SemaphoreState {
    Binary(bool),
    Timeline(u64),
}

#[derive(Debug)]
struct SwapState {
    image_count: u32,
    next: u32,
    out_of_date: bool,
    suboptimal: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    fences: HashMap<u64, bool>,
    semaphores: HashMap<u64, SemaphoreState>,
    events: HashMap<u64, bool>,
    /// (max groups, allocated groups)
    descriptor_pools: HashMap<u64, (u32, u32)>,
    descriptor_writes: HashMap<u64, usize>,
    swapchains: HashMap<u64, SwapState>,
    stats: HeadlessStats,
}

impl State {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn object(&mut self) -> HeadlessObject {
        HeadlessObject { id: self.id() }
    }
}

pub struct HeadlessBackend {
    adapter: AdapterInfo,
    state: Mutex<State>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// Discrete-style adapter: separate device-local and host-visible heaps
    pub fn new() -> Self {
        Self::with_adapter(AdapterInfo {
            name: "Headless Discrete".to_string(),
            discrete: true,
            memory_types: vec![
                MemoryProperties::DEVICE_LOCAL,
                MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT,
                MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT | MemoryProperties::HOST_CACHED,
            ],
        })
    }

    /// Integrated-style adapter with device-local host-visible memory
    pub fn integrated() -> Self {
        Self::with_adapter(AdapterInfo {
            name: "Headless Integrated".to_string(),
            discrete: false,
            memory_types: vec![
                MemoryProperties::DEVICE_LOCAL,
                MemoryProperties::DEVICE_LOCAL | MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT,
                MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT | MemoryProperties::HOST_CACHED,
            ],
        })
    }

    pub fn with_adapter(adapter: AdapterInfo) -> Self {
        Self {
            adapter,
            state: Mutex::new(State::default()),
        }
    }

    pub fn stats(&self) -> HeadlessStats {
        self.state.lock().stats
    }

    /// Make every live swapchain report out-of-date, as a window resize would
    pub fn invalidate_swapchains(&self) {
        for swap in self.state.lock().swapchains.values_mut() {
            swap.out_of_date = true;
        }
    }

    /// Keep every live swapchain usable but report it as suboptimal from
    /// the next acquire and present on
    pub fn mark_swapchains_suboptimal(&self) {
        for swap in self.state.lock().swapchains.values_mut() {
            swap.suboptimal = true;
        }
    }

    /// Number of descriptor writes applied to a group
    pub fn descriptor_writes(&self, group: &HeadlessObject) -> usize {
        self.state.lock().descriptor_writes.get(&group.id).copied().unwrap_or(0)
    }
}

impl Backend for HeadlessBackend {
    type Surface = HeadlessSurface;
    type Buffer = HeadlessBuffer;
    type Image = HeadlessImage;
    type Sampler = HeadlessObject;
    type ShaderModule = HeadlessObject;
    type Pipeline = HeadlessObject;
    type DescriptorPool = HeadlessObject;
    type DescriptorLayout = HeadlessObject;
    type DescriptorGroup = HeadlessObject;
    type Fence = HeadlessObject;
    type Semaphore = HeadlessObject;
    type Event = HeadlessObject;
    type CommandAllocator = HeadlessObject;
    type CommandBuffer = HeadlessCommandBuffer;
    type SwapChain = HeadlessObject;

    fn name(&self) -> &'static str {
        "headless"
    }

    fn adapter_info(&self) -> AdapterInfo {
        self.adapter.clone()
    }

    fn queue_family(&self, queue: QueueType) -> u32 {
        match queue {
            QueueType::Graphics => 0,
            QueueType::Compute => 1,
            QueueType::Transfer => 2,
        }
    }

    fn wait_idle(&self) -> Result<()> {
        // Work completes at submit time
        Ok(())
    }

    // ---------------------------------------------------------------- memory

    fn create_buffer(&self, desc: &BufferDesc, _memory: MemoryStrategy) -> Result<HeadlessBuffer> {
        let size = usize::try_from(desc.size).context("buffer too large for host memory")?;
        Ok(HeadlessBuffer {
            id: self.state.lock().id(),
            data: vec![0u8; size].into_boxed_slice(),
        })
    }

    fn destroy_buffer(&self, _buffer: HeadlessBuffer) {}

    fn map_buffer(&self, buffer: &mut HeadlessBuffer) -> Result<NonNull<u8>> {
        NonNull::new(buffer.data.as_mut_ptr()).context("buffer has no storage")
    }

    fn unmap_buffer(&self, _buffer: &mut HeadlessBuffer) {}

    fn create_image(&self, desc: &ImageDesc, _memory: MemoryStrategy) -> Result<(HeadlessImage, u64)> {
        let e = desc.extent;
        let size = e.width as u64
            * e.height as u64
            * e.depth as u64
            * desc.array_layers as u64
            * desc.format.bytes_per_texel() as u64;
        Ok((HeadlessImage { id: self.state.lock().id() }, size))
    }

    fn destroy_image(&self, _image: HeadlessImage) {}

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<HeadlessObject> {
        Ok(self.state.lock().object())
    }

    fn destroy_sampler(&self, _sampler: HeadlessObject) {}

    // ------------------------------------------------------------- pipelines

    fn create_shader_module(&self, _desc: &ShaderModuleDesc) -> Result<HeadlessObject> {
        Ok(self.state.lock().object())
    }

    fn destroy_shader_module(&self, _module: HeadlessObject) {}

    fn create_graphics_pipeline(
        &self,
        _desc: &GraphicsPipelineDesc,
        _stages: &[ShaderStageRef<'_, Self>],
        _layouts: &[&HeadlessObject],
    ) -> Result<HeadlessObject> {
        Ok(self.state.lock().object())
    }

    fn create_compute_pipeline(
        &self,
        _desc: &ComputePipelineDesc,
        _stage: ShaderStageRef<'_, Self>,
        _layouts: &[&HeadlessObject],
    ) -> Result<HeadlessObject> {
        Ok(self.state.lock().object())
    }

    fn create_ray_tracing_pipeline(
        &self,
        _desc: &RayTracingPipelineDesc,
        _stages: &[ShaderStageRef<'_, Self>],
        _layouts: &[&HeadlessObject],
    ) -> Result<HeadlessObject> {
        Ok(self.state.lock().object())
    }

    fn destroy_pipeline(&self, _pipeline: HeadlessObject) {}

    // ----------------------------------------------------------- descriptors

    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> Result<HeadlessObject> {
        let mut state = self.state.lock();
        let pool = state.object();
        state.descriptor_pools.insert(pool.id, (desc.max_groups, 0));
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: HeadlessObject) {
        self.state.lock().descriptor_pools.remove(&pool.id);
    }

    fn create_descriptor_layout(&self, _desc: &DescriptorLayoutDesc) -> Result<HeadlessObject> {
        Ok(self.state.lock().object())
    }

    fn destroy_descriptor_layout(&self, _layout: HeadlessObject) {}

    fn allocate_descriptor_group(&self, pool: &HeadlessObject, _layouts: &[&HeadlessObject]) -> Result<HeadlessObject> {
        let mut state = self.state.lock();
        let (max, used) = state
            .descriptor_pools
            .get_mut(&pool.id)
            .context("unknown descriptor pool")?;
        anyhow::ensure!(*used < *max, "descriptor pool out of groups ({} allocated)", max);
        *used += 1;
        Ok(state.object())
    }

    fn free_descriptor_group(&self, pool: &HeadlessObject, group: HeadlessObject) {
        let mut state = self.state.lock();
        if let Some((_, used)) = state.descriptor_pools.get_mut(&pool.id) {
            *used = used.saturating_sub(1);
        }
        state.descriptor_writes.remove(&group.id);
    }

    fn write_descriptor_group(&self, group: &HeadlessObject, writes: &[ResolvedDescriptorWrite<'_, Self>]) {
        *self.state.lock().descriptor_writes.entry(group.id).or_default() += writes.len();
    }

    // ---------------------------------------------------------- sync objects

    fn create_fence(&self, signalled: bool) -> Result<HeadlessObject> {
        let mut state = self.state.lock();
        let fence = state.object();
        state.fences.insert(fence.id, signalled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: HeadlessObject) {
        self.state.lock().fences.remove(&fence.id);
    }

    fn fence_status(&self, fence: &HeadlessObject) -> Result<bool> {
        self.state.lock().fences.get(&fence.id).copied().context("unknown fence")
    }

    fn wait_for_fence(&self, fence: &HeadlessObject, _timeout_ns: u64) -> Result<bool> {
        let mut state = self.state.lock();
        state.stats.fence_waits += 1;
        // Nothing is pending, so an unsignalled fence can only time out
        state.fences.get(&fence.id).copied().context("unknown fence")
    }

    fn reset_fence(&self, fence: &HeadlessObject) -> Result<()> {
        let mut state = self.state.lock();
        let signalled = state.fences.get_mut(&fence.id).context("unknown fence")?;
        *signalled = false;
        Ok(())
    }

    fn create_semaphore(&self, kind: SemaphoreKind, initial_value: u64) -> Result<HeadlessObject> {
        let mut state = self.state.lock();
        let semaphore = state.object();
        let value = match kind {
            SemaphoreKind::Binary => SemaphoreState::Binary(false),
            SemaphoreKind::Timeline => SemaphoreState::Timeline(initial_value),
        };
        state.semaphores.insert(semaphore.id, value);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: HeadlessObject) {
        self.state.lock().semaphores.remove(&semaphore.id);
    }

    fn semaphore_value(&self, semaphore: &HeadlessObject) -> Result<u64> {
        match self.state.lock().semaphores.get(&semaphore.id) {
            Some(SemaphoreState::Timeline(value)) => Ok(*value),
            Some(SemaphoreState::Binary(_)) => anyhow::bail!("binary semaphores have no value"),
            None => anyhow::bail!("unknown semaphore"),
        }
    }

    fn signal_semaphore(&self, semaphore: &HeadlessObject, value: u64) -> Result<()> {
        let mut state = self.state.lock();
        match state.semaphores.get_mut(&semaphore.id) {
            Some(SemaphoreState::Timeline(current)) => {
                anyhow::ensure!(value > *current, "timeline value {} does not advance past {}", value, current);
                *current = value;
                Ok(())
            }
            Some(SemaphoreState::Binary(_)) => anyhow::bail!("binary semaphores cannot be signalled from the host"),
            None => anyhow::bail!("unknown semaphore"),
        }
    }

    fn wait_for_semaphore(&self, semaphore: &HeadlessObject, value: u64, _timeout_ns: u64) -> Result<bool> {
        Ok(self.semaphore_value(semaphore)? >= value)
    }

    fn create_event(&self) -> Result<HeadlessObject> {
        let mut state = self.state.lock();
        let event = state.object();
        state.events.insert(event.id, false);
        Ok(event)
    }

    fn destroy_event(&self, event: HeadlessObject) {
        self.state.lock().events.remove(&event.id);
    }

    fn set_event(&self, event: &HeadlessObject) -> Result<()> {
        self.state.lock().events.insert(event.id, true);
        Ok(())
    }

    fn reset_event(&self, event: &HeadlessObject) -> Result<()> {
        self.state.lock().events.insert(event.id, false);
        Ok(())
    }

    fn event_status(&self, event: &HeadlessObject) -> Result<bool> {
        self.state.lock().events.get(&event.id).copied().context("unknown event")
    }

    // -------------------------------------------------------------- commands

    fn create_command_allocator(&self, _queue_family: u32) -> Result<HeadlessObject> {
        Ok(self.state.lock().object())
    }

    fn destroy_command_allocator(&self, _allocator: HeadlessObject) {}

    fn allocate_command_buffer(&self, _allocator: &HeadlessObject) -> Result<HeadlessCommandBuffer> {
        Ok(HeadlessCommandBuffer {
            id: self.state.lock().id(),
            recording: false,
            commands: Vec::new(),
        })
    }

    fn free_command_buffer(&self, _allocator: &HeadlessObject, _cmd: HeadlessCommandBuffer) {}

    fn begin_command_buffer(&self, cmd: &mut HeadlessCommandBuffer, _usage: CommandListUsage) -> Result<()> {
        cmd.commands.clear();
        cmd.recording = true;
        Ok(())
    }

    fn end_command_buffer(&self, cmd: &mut HeadlessCommandBuffer) -> Result<()> {
        anyhow::ensure!(cmd.recording, "command buffer {} is not recording", cmd.id);
        cmd.recording = false;
        Ok(())
    }

    fn reset_command_buffer(&self, cmd: &mut HeadlessCommandBuffer, _release_resources: bool) -> Result<()> {
        cmd.commands.clear();
        cmd.recording = false;
        Ok(())
    }

    fn cmd_clear_color_image(
        &self,
        cmd: &mut HeadlessCommandBuffer,
        image: &HeadlessImage,
        layout: ImageLayout,
        color: [f32; 4],
        _range: SubresourceRange,
    ) {
        cmd.commands.push(HeadlessCommand::ClearColor { image: image.id, layout, color });
    }

    fn cmd_clear_depth_stencil_image(
        &self,
        cmd: &mut HeadlessCommandBuffer,
        image: &HeadlessImage,
        layout: ImageLayout,
        value: ClearDepthStencil,
        _range: SubresourceRange,
    ) {
        cmd.commands.push(HeadlessCommand::ClearDepthStencil { image: image.id, layout, value });
    }

    fn cmd_begin_rendering(&self, cmd: &mut HeadlessCommandBuffer, info: &ResolvedRendering<'_, Self>) {
        cmd.commands.push(HeadlessCommand::BeginRendering {
            area: info.area,
            color: info.color.iter().map(|a| a.image.id).collect(),
            depth: info.depth.as_ref().map(|a| a.image.id),
        });
    }

    fn cmd_end_rendering(&self, cmd: &mut HeadlessCommandBuffer) {
        cmd.commands.push(HeadlessCommand::EndRendering);
    }

    fn cmd_pipeline_barrier(&self, cmd: &mut HeadlessCommandBuffer, barriers: &ResolvedBarriers<'_, Self>) {
        let memory = barriers.memory.iter().map(|_| BarrierEntry::Memory);
        let buffers = barriers.buffers.iter().map(|(b, _)| BarrierEntry::Buffer { buffer: b.id });
        let images = barriers.images.iter().map(|(i, b)| BarrierEntry::Image {
            image: i.id,
            old: b.old_layout,
            new: b.new_layout,
        });
        cmd.commands
            .push(HeadlessCommand::Barrier(memory.chain(buffers).chain(images).collect()));
    }

    fn cmd_copy_buffer(&self, cmd: &mut HeadlessCommandBuffer, src: &HeadlessBuffer, dst: &HeadlessBuffer, regions: &[BufferCopy]) {
        cmd.commands.push(HeadlessCommand::CopyBuffer {
            src: src.id,
            dst: dst.id,
            regions: regions.to_vec(),
        });
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: &mut HeadlessCommandBuffer,
        src: &HeadlessBuffer,
        dst: &HeadlessImage,
        dst_layout: ImageLayout,
        _regions: &[BufferImageCopy],
    ) {
        cmd.commands.push(HeadlessCommand::CopyBufferToImage {
            src: src.id,
            dst: dst.id,
            layout: dst_layout,
        });
    }

    fn cmd_copy_image_to_buffer(
        &self,
        cmd: &mut HeadlessCommandBuffer,
        src: &HeadlessImage,
        src_layout: ImageLayout,
        dst: &HeadlessBuffer,
        _regions: &[BufferImageCopy],
    ) {
        cmd.commands.push(HeadlessCommand::CopyImageToBuffer {
            src: src.id,
            dst: dst.id,
            layout: src_layout,
        });
    }

    fn cmd_copy_image(
        &self,
        cmd: &mut HeadlessCommandBuffer,
        src: &HeadlessImage,
        _src_layout: ImageLayout,
        dst: &HeadlessImage,
        _dst_layout: ImageLayout,
        _regions: &[ImageCopy],
    ) {
        cmd.commands.push(HeadlessCommand::CopyImage { src: src.id, dst: dst.id });
    }

    fn cmd_bind_pipeline(&self, cmd: &mut HeadlessCommandBuffer, bind_point: PipelineBindPoint, pipeline: &HeadlessObject) {
        cmd.commands.push(HeadlessCommand::BindPipeline {
            pipeline: pipeline.id,
            bind_point,
        });
    }

    fn cmd_bind_vertex_buffers(&self, cmd: &mut HeadlessCommandBuffer, first_binding: u32, buffers: &[(&HeadlessBuffer, u64)]) {
        cmd.commands.push(HeadlessCommand::BindVertexBuffers {
            first_binding,
            buffers: buffers.iter().map(|(b, _)| b.id).collect(),
        });
    }

    fn cmd_bind_index_buffer(&self, cmd: &mut HeadlessCommandBuffer, buffer: &HeadlessBuffer, _offset: u64, index_type: IndexType) {
        cmd.commands.push(HeadlessCommand::BindIndexBuffer {
            buffer: buffer.id,
            index_type,
        });
    }

    fn cmd_bind_descriptor_group(
        &self,
        cmd: &mut HeadlessCommandBuffer,
        _bind_point: PipelineBindPoint,
        _pipeline: &HeadlessObject,
        first_set: u32,
        group: &HeadlessObject,
    ) {
        cmd.commands.push(HeadlessCommand::BindDescriptorGroup {
            group: group.id,
            first_set,
        });
    }

    fn cmd_push_constants(
        &self,
        cmd: &mut HeadlessCommandBuffer,
        _pipeline: &HeadlessObject,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        cmd.commands.push(HeadlessCommand::PushConstants {
            stages,
            offset,
            size: data.len(),
        });
    }

    fn cmd_set_viewport(&self, cmd: &mut HeadlessCommandBuffer, viewport: Viewport) {
        cmd.commands.push(HeadlessCommand::SetViewport(viewport));
    }

    fn cmd_set_scissor(&self, cmd: &mut HeadlessCommandBuffer, scissor: Rect2D) {
        cmd.commands.push(HeadlessCommand::SetScissor(scissor));
    }

    fn cmd_draw(&self, cmd: &mut HeadlessCommandBuffer, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        cmd.commands.push(HeadlessCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn cmd_draw_indexed(
        &self,
        cmd: &mut HeadlessCommandBuffer,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        cmd.commands.push(HeadlessCommand::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn cmd_draw_mesh_tasks(&self, cmd: &mut HeadlessCommandBuffer, x: u32, y: u32, z: u32) {
        cmd.commands.push(HeadlessCommand::DrawMeshTasks([x, y, z]));
    }

    fn cmd_dispatch(&self, cmd: &mut HeadlessCommandBuffer, x: u32, y: u32, z: u32) {
        cmd.commands.push(HeadlessCommand::Dispatch([x, y, z]));
    }

    fn cmd_set_event(&self, cmd: &mut HeadlessCommandBuffer, event: &HeadlessObject, _stages: PipelineStages) {
        cmd.commands.push(HeadlessCommand::SetEvent(event.id));
    }

    fn cmd_reset_event(&self, cmd: &mut HeadlessCommandBuffer, event: &HeadlessObject, _stages: PipelineStages) {
        cmd.commands.push(HeadlessCommand::ResetEvent(event.id));
    }

    fn submit(
        &self,
        _queue: QueueType,
        cmds: &[&HeadlessCommandBuffer],
        waits: &[SemaphoreSubmit<'_, Self>],
        signals: &[SemaphoreSubmit<'_, Self>],
        fence: Option<&HeadlessObject>,
    ) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for wait in waits {
            match state.semaphores.get_mut(&wait.semaphore.id) {
                Some(SemaphoreState::Binary(signalled)) => {
                    anyhow::ensure!(*signalled, "wait on binary semaphore {} that was never signalled", wait.semaphore.id);
                    *signalled = false;
                }
                Some(SemaphoreState::Timeline(value)) => {
                    anyhow::ensure!(
                        *value >= wait.value,
                        "timeline wait for {} can never complete (semaphore at {})",
                        wait.value,
                        value
                    );
                }
                None => anyhow::bail!("unknown semaphore {}", wait.semaphore.id),
            }
        }

        for cmd in cmds {
            anyhow::ensure!(!cmd.recording, "command buffer {} submitted while recording", cmd.id);
            for command in &cmd.commands {
                match command {
                    HeadlessCommand::SetEvent(id) => {
                        state.events.insert(*id, true);
                    }
                    HeadlessCommand::ResetEvent(id) => {
                        state.events.insert(*id, false);
                    }
                    _ => {}
                }
            }
        }

        for signal in signals {
            match state.semaphores.get_mut(&signal.semaphore.id) {
                Some(SemaphoreState::Binary(signalled)) => {
                    anyhow::ensure!(!*signalled, "binary semaphore {} signalled twice", signal.semaphore.id);
                    *signalled = true;
                }
                Some(SemaphoreState::Timeline(value)) => {
                    anyhow::ensure!(
                        signal.value > *value,
                        "timeline signal {} does not advance past {}",
                        signal.value,
                        value
                    );
                    *value = signal.value;
                }
                None => anyhow::bail!("unknown semaphore {}", signal.semaphore.id),
            }
        }

        if let Some(fence) = fence {
            let signalled = state.fences.get_mut(&fence.id).context("unknown fence")?;
            anyhow::ensure!(!*signalled, "fence {} submitted while still signalled", fence.id);
            *signalled = true;
        }

        state.stats.submissions += 1;
        state.stats.command_lists += cmds.len() as u64;
        Ok(())
    }

    // ------------------------------------------------------------- swapchain

    fn create_swapchain(
        &self,
        surface: &HeadlessSurface,
        desc: &SwapChainDesc,
        old: Option<&HeadlessObject>,
    ) -> Result<NativeSwapChain<Self>> {
        anyhow::ensure!(!desc.extent.is_empty(), "cannot create a swapchain for a zero-sized surface");

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(old) = old {
            // A retired chain can no longer acquire
            if let Some(swap) = state.swapchains.get_mut(&old.id) {
                swap.out_of_date = true;
            }
        }

        let image_count = surface.forced_image_count.unwrap_or(desc.image_count);
        let raw = state.object();
        state.swapchains.insert(
            raw.id,
            SwapState {
                image_count,
                next: 0,
                out_of_date: false,
                suboptimal: false,
            },
        );
        let images = (0..image_count).map(|_| HeadlessImage { id: state.id() }).collect();
        let format = match desc.format {
            Format::Undefined => Format::B8G8R8A8Srgb,
            format => format,
        };

        Ok(NativeSwapChain {
            raw,
            images,
            format,
            extent: desc.extent,
        })
    }

    fn destroy_swapchain(&self, swapchain: HeadlessObject) {
        self.state.lock().swapchains.remove(&swapchain.id);
    }

    fn destroy_surface(&self, _surface: HeadlessSurface) {}

    fn acquire_next_image(&self, swapchain: &HeadlessObject, semaphore: &HeadlessObject, _timeout_ns: u64) -> Result<AcquireOutcome> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let swap = state.swapchains.get_mut(&swapchain.id).context("unknown swapchain")?;
        if swap.out_of_date {
            return Ok(AcquireOutcome::OutOfDate);
        }
        let index = swap.next;
        swap.next = (index + 1) % swap.image_count.max(1);
        let suboptimal = swap.suboptimal;

        match state.semaphores.get_mut(&semaphore.id) {
            Some(SemaphoreState::Binary(signalled)) => {
                anyhow::ensure!(!*signalled, "acquire semaphore {} is still signalled", semaphore.id);
                *signalled = true;
            }
            _ => anyhow::bail!("acquire needs a binary semaphore"),
        }
        state.stats.acquires += 1;
        if suboptimal {
            return Ok(AcquireOutcome::Suboptimal(index));
        }
        Ok(AcquireOutcome::Acquired(index))
    }

    fn present(&self, _queue: QueueType, swapchain: &HeadlessObject, image_index: u32, waits: &[&HeadlessObject]) -> Result<PresentOutcome> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for wait in waits {
            match state.semaphores.get_mut(&wait.id) {
                Some(SemaphoreState::Binary(signalled)) => {
                    anyhow::ensure!(*signalled, "present waits on semaphore {} that was never signalled", wait.id);
                    *signalled = false;
                }
                _ => anyhow::bail!("present can only wait on binary semaphores"),
            }
        }

        let swap = state.swapchains.get(&swapchain.id).context("unknown swapchain")?;
        if swap.out_of_date {
            return Ok(PresentOutcome::OutOfDate);
        }
        anyhow::ensure!(image_index < swap.image_count, "image index {} out of range", image_index);
        state.stats.presents += 1;
        if swap.suboptimal {
            return Ok(PresentOutcome::Suboptimal);
        }
        Ok(PresentOutcome::Presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_completes_immediately() {
        let backend = HeadlessBackend::new();
        let fence = backend.create_fence(false).unwrap();
        let timeline = backend.create_semaphore(SemaphoreKind::Timeline, 0).unwrap();

        let signal = SemaphoreSubmit::<HeadlessBackend> {
            semaphore: &timeline,
            kind: SemaphoreKind::Timeline,
            value: 4,
            stages: PipelineStages::ALL_COMMANDS,
        };
        backend.submit(QueueType::Graphics, &[], &[], &[signal], Some(&fence)).unwrap();

        assert!(backend.fence_status(&fence).unwrap());
        assert_eq!(backend.semaphore_value(&timeline).unwrap(), 4);
        assert_eq!(backend.stats().submissions, 1);
    }

    #[test]
    fn timeline_signals_must_strictly_increase() {
        let backend = HeadlessBackend::new();
        let timeline = backend.create_semaphore(SemaphoreKind::Timeline, 3).unwrap();

        assert!(backend.signal_semaphore(&timeline, 3).is_err());
        backend.signal_semaphore(&timeline, 4).unwrap();

        let repeat = SemaphoreSubmit::<HeadlessBackend> {
            semaphore: &timeline,
            kind: SemaphoreKind::Timeline,
            value: 4,
            stages: PipelineStages::ALL_COMMANDS,
        };
        let err = backend.submit(QueueType::Graphics, &[], &[], &[repeat], None).unwrap_err();
        assert!(err.to_string().contains("does not advance past 4"));
        assert_eq!(backend.semaphore_value(&timeline).unwrap(), 4);
    }

    #[test]
    fn waiting_on_an_unsignalled_binary_semaphore_fails() {
        let backend = HeadlessBackend::new();
        let binary = backend.create_semaphore(SemaphoreKind::Binary, 0).unwrap();
        let wait = SemaphoreSubmit::<HeadlessBackend> {
            semaphore: &binary,
            kind: SemaphoreKind::Binary,
            value: 0,
            stages: PipelineStages::TRANSFER,
        };
        let err = backend.submit(QueueType::Graphics, &[], &[wait], &[], None).unwrap_err();
        assert!(err.to_string().contains("never signalled"));
    }

    #[test]
    fn acquire_cycles_through_images() {
        let backend = HeadlessBackend::new();
        let desc = SwapChainDesc {
            extent: Extent2D::new(4, 4),
            image_count: 2,
            format: Format::Undefined,
            present_mode: PresentMode::Fifo,
        };
        let native = backend.create_swapchain(&HeadlessSurface::new(), &desc, None).unwrap();
        assert_eq!(native.format, Format::B8G8R8A8Srgb);
        let semaphore = backend.create_semaphore(SemaphoreKind::Binary, 0).unwrap();

        let mut indices = Vec::new();
        for _ in 0..3 {
            match backend.acquire_next_image(&native.raw, &semaphore, u64::MAX).unwrap() {
                AcquireOutcome::Acquired(index) => indices.push(index),
                other => panic!("unexpected {:?}", other),
            }
            backend.present(QueueType::Graphics, &native.raw, indices[indices.len() - 1], &[&semaphore]).unwrap();
        }
        assert_eq!(indices, vec![0, 1, 0]);
        assert_eq!(backend.stats().presents, 3);
    }

    #[test]
    fn zero_sized_swapchain_is_rejected() {
        let backend = HeadlessBackend::new();
        let desc = SwapChainDesc {
            extent: Extent2D::new(0, 720),
            image_count: 2,
            format: Format::B8G8R8A8Srgb,
            present_mode: PresentMode::Fifo,
        };
        assert!(backend.create_swapchain(&HeadlessSurface::new(), &desc, None).is_err());
    }
}
