// =============================================================================
// RENDERER - frame rotation over the RHI
// =============================================================================
//
// Drives one frame at a time through a rotation of FRAME_ROTATION slots.
// Each slot owns its acquire/complete semaphores, a fence, a command list and
// its copy of every dynamic buffer. The fence wait in STEP 2 is the only
// place the CPU blocks on the GPU, which bounds frames in flight.
//
// FRAME TIMELINE:
// ┌──────────────────────────────────────────────────────────────────────┐
// │  acquire ─> wait slot fence ─> record ─> execute ─> present ─> next  │
// └──────────────────────────────────────────────────────────────────────┘
//
// A shared timeline semaphore counts finished frames; staging buffers of
// static uploads are released once it passes the frame that consumed them.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::backend::Backend;
use crate::rhi::*;

pub const FRAME_ROTATION: usize = 3;

/// Generous bound on a single frame; hitting it means the GPU is hung
const FENCE_TIMEOUT_NS: u64 = 5_000_000_000;

/// Per-frame data every slot uploads before recording
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: Mat4,
    pub clear_color: Vec4,
    pub resolution: [f32; 2],
    pub time: f32,
    pub frame: u32,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY,
            clear_color: Vec4::ZERO,
            resolution: [0.0; 2],
            time: 0.0,
            frame: 0,
        }
    }
}

/// Index of a buffer that has one host-visible copy per rotation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DynamicBufferId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSource {
    Static(BufferHandle),
    Dynamic(DynamicBufferId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawItem {
    pub pipeline: PipelineHandle,
    pub vertex_buffer: Option<BufferSource>,
    pub index_buffer: Option<(BufferSource, IndexType)>,
    pub descriptor_group: Option<DescriptorGroupHandle>,
    pub push_constants: Vec<u8>,
    /// Vertices, or indices when an index buffer is bound
    pub count: u32,
    pub instance_count: u32,
}

impl DrawItem {
    pub fn new(pipeline: PipelineHandle, count: u32) -> Self {
        Self {
            pipeline,
            vertex_buffer: None,
            index_buffer: None,
            descriptor_group: None,
            push_constants: Vec::new(),
            count,
            instance_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { image_index: u32 },
    /// Surface has no area (minimized)
    Skipped,
    /// Swapchain went out of date on acquire; rebuilt next frame
    Resized,
}

/// Per-slot submit and fence-wait counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramePacing {
    pub submits: [u64; FRAME_ROTATION],
    pub fence_waits: [u64; FRAME_ROTATION],
}

impl FramePacing {
    /// Every slot has waited for all but at most its latest submit
    pub fn is_balanced(&self) -> bool {
        self.submits
            .iter()
            .zip(&self.fence_waits)
            .all(|(&s, &w)| s.abs_diff(w) <= 1)
    }

    pub fn total_submits(&self) -> u64 {
        self.submits.iter().sum()
    }

    pub fn total_fence_waits(&self) -> u64 {
        self.fence_waits.iter().sum()
    }
}

#[derive(Debug, Clone)]
pub struct RendererDesc {
    pub swapchain: SwapChainDesc,
    pub clear_color: [f32; 4],
}

struct FrameSlot<B: Backend> {
    acquire: SemaphoreHandle,
    complete: SemaphoreHandle,
    fence: FenceHandle,
    commands: CommandList<B>,
    submitted: bool,
}

struct DynamicBuffer {
    buffers: [BufferHandle; FRAME_ROTATION],
    usage: BufferUsage,
    contents: Vec<u8>,
}

struct PendingUpload {
    staging: BufferHandle,
    target: BufferHandle,
    size: u64,
    usage: BufferUsage,
}

/// Consumer stages for data that arrived through a transfer or host write
fn consumers(usage: BufferUsage) -> (PipelineStages, AccessFlags) {
    let mut stages = PipelineStages::empty();
    let mut access = AccessFlags::empty();
    if usage.contains(BufferUsage::VERTEX) {
        stages |= PipelineStages::VERTEX_INPUT;
        access |= AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if usage.contains(BufferUsage::INDEX) {
        stages |= PipelineStages::VERTEX_INPUT;
        access |= AccessFlags::INDEX_READ;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        stages |= PipelineStages::VERTEX_SHADER | PipelineStages::FRAGMENT_SHADER | PipelineStages::COMPUTE_SHADER;
        access |= AccessFlags::UNIFORM_READ;
    }
    if usage.contains(BufferUsage::STORAGE) {
        stages |= PipelineStages::VERTEX_SHADER | PipelineStages::FRAGMENT_SHADER | PipelineStages::COMPUTE_SHADER;
        access |= AccessFlags::SHADER_READ;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        stages |= PipelineStages::DRAW_INDIRECT;
        access |= AccessFlags::INDIRECT_COMMAND_READ;
    }
    if stages.is_empty() {
        (PipelineStages::ALL_COMMANDS, AccessFlags::MEMORY_READ)
    } else {
        (stages, access)
    }
}

pub struct Renderer<B: Backend> {
    device: Device<B>,
    swapchain: SwapChain<B>,
    allocator: CommandAllocator<B>,
    slots: Vec<FrameSlot<B>>,
    frame_index: usize,

    timeline: SemaphoreHandle,
    timeline_value: u64,

    pending_uploads: Vec<PendingUpload>,
    // (timeline value that frees it, staging buffer)
    staging_in_flight: Vec<(u64, BufferHandle)>,

    dynamic_buffers: Vec<DynamicBuffer>,
    frame_uniforms: DynamicBufferId,
    uniforms: FrameUniforms,

    draws: Vec<DrawItem>,
    clear_color: [f32; 4],
    window_extent: Extent2D,
    minimized: bool,
    frame_count: u64,
    pacing: FramePacing,
}

impl<B: Backend> Renderer<B> {
    pub fn new(mut device: Device<B>, surface: B::Surface, desc: &RendererDesc) -> Result<Self> {
        log::info!("Creating renderer ({} backend)", device.backend().name());

        let swapchain = SwapChain::new(&mut device, surface, &desc.swapchain)?;
        let mut allocator = CommandAllocator::new(&device, QueueType::Graphics)?;

        let mut slots = Vec::with_capacity(FRAME_ROTATION);
        for _ in 0..FRAME_ROTATION {
            slots.push(FrameSlot {
                acquire: device.create_semaphore(SemaphoreKind::Binary, 0)?,
                complete: device.create_semaphore(SemaphoreKind::Binary, 0)?,
                fence: device.create_fence(false)?,
                commands: allocator.allocate(&device)?,
                submitted: false,
            });
        }
        let timeline = device.create_semaphore(SemaphoreKind::Timeline, 0)?;

        let mut renderer = Self {
            device,
            swapchain,
            allocator,
            slots,
            frame_index: 0,
            timeline,
            timeline_value: 0,
            pending_uploads: Vec::new(),
            staging_in_flight: Vec::new(),
            dynamic_buffers: Vec::new(),
            frame_uniforms: DynamicBufferId(0),
            uniforms: FrameUniforms::default(),
            draws: Vec::new(),
            clear_color: desc.clear_color,
            window_extent: desc.swapchain.extent,
            minimized: desc.swapchain.extent.is_empty(),
            frame_count: 0,
            pacing: FramePacing::default(),
        };
        renderer.frame_uniforms = renderer.create_dynamic_buffer(
            std::mem::size_of::<FrameUniforms>() as u64,
            BufferUsage::UNIFORM,
            "frame uniforms",
        )?;

        log::info!("Renderer ready: {} frame slots", FRAME_ROTATION);
        Ok(renderer)
    }

    // =========================================================================
    // RESOURCES
    // =========================================================================

    /// Create a GPU-only buffer filled with `data`. The copy is recorded into
    /// the next frame together with a one-time barrier set.
    pub fn upload_static(&mut self, data: &[u8], usage: BufferUsage, name: &str) -> Result<BufferHandle> {
        anyhow::ensure!(!data.is_empty(), "static upload '{}' has no data", name);
        let size = data.len() as u64;

        let staging = self.device.create_buffer(&BufferDesc {
            size,
            usage: BufferUsage::TRANSFER_SRC,
            memory: MemoryUsage::CpuToGpu,
            debug_name: format!("{} (staging)", name),
        })?;
        if let Err(e) = self.device.write_buffer(staging, 0, data) {
            self.device.delete_buffer(staging);
            return Err(e);
        }

        let target = match self.device.create_buffer(&BufferDesc {
            size,
            usage: usage | BufferUsage::TRANSFER_DST,
            memory: MemoryUsage::GpuOnly,
            debug_name: name.to_string(),
        }) {
            Ok(target) => target,
            Err(e) => {
                self.device.delete_buffer(staging);
                return Err(e);
            }
        };

        log::debug!("Queued static upload '{}' ({} bytes)", name, size);
        self.pending_uploads.push(PendingUpload {
            staging,
            target,
            size,
            usage,
        });
        Ok(target)
    }

    /// Create a buffer with one host-visible copy per rotation slot
    pub fn create_dynamic_buffer(&mut self, size: u64, usage: BufferUsage, name: &str) -> Result<DynamicBufferId> {
        let mut buffers = Vec::with_capacity(FRAME_ROTATION);
        for slot in 0..FRAME_ROTATION {
            let created = self.device.create_buffer(&BufferDesc {
                size,
                usage,
                memory: MemoryUsage::CpuToGpu,
                debug_name: format!("{} [{}]", name, slot),
            });
            match created {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    for buffer in buffers {
                        self.device.delete_buffer(buffer);
                    }
                    return Err(e);
                }
            }
        }

        let id = DynamicBufferId(self.dynamic_buffers.len());
        self.dynamic_buffers.push(DynamicBuffer {
            buffers: [buffers[0], buffers[1], buffers[2]],
            usage,
            contents: Vec::new(),
        });
        Ok(id)
    }

    /// Replace the contents of a dynamic buffer. They reach the GPU in the
    /// next recorded frame, after that slot's fence has been waited on.
    pub fn write_dynamic(&mut self, id: DynamicBufferId, data: &[u8]) -> Result<()> {
        let dynamic = &mut self.dynamic_buffers[id.0];
        let capacity = self.device.buffer(dynamic.buffers[0]).size();
        anyhow::ensure!(
            data.len() as u64 <= capacity,
            "{} bytes written to a {} byte dynamic buffer",
            data.len(),
            capacity
        );
        dynamic.contents.clear();
        dynamic.contents.extend_from_slice(data);
        Ok(())
    }

    /// Copy of `id` that the next frame will use
    pub fn dynamic_buffer(&self, id: DynamicBufferId) -> BufferHandle {
        self.dynamic_buffers[id.0].buffers[self.frame_index]
    }

    /// Every slot's copy, e.g. to write one descriptor group per slot
    pub fn dynamic_buffers(&self, id: DynamicBufferId) -> [BufferHandle; FRAME_ROTATION] {
        self.dynamic_buffers[id.0].buffers
    }

    pub fn frame_uniforms_buffer(&self) -> DynamicBufferId {
        self.frame_uniforms
    }

    pub fn set_view_proj(&mut self, view_proj: Mat4) {
        self.uniforms.view_proj = view_proj;
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.uniforms.time = seconds;
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Draws recorded every frame. With none, frames are cleared only.
    pub fn set_draws(&mut self, draws: Vec<DrawItem>) {
        self.draws = draws;
    }

    /// Release staging buffers whose copies the GPU has finished
    pub fn retire_completed_uploads(&mut self) -> Result<usize> {
        if self.staging_in_flight.is_empty() {
            return Ok(0);
        }
        let completed = self.device.semaphore_value(self.timeline)?;
        let before = self.staging_in_flight.len();
        let device = &mut self.device;
        self.staging_in_flight.retain(|&(value, staging)| {
            if value <= completed {
                device.delete_buffer(staging);
                false
            } else {
                true
            }
        });
        let retired = before - self.staging_in_flight.len();
        if retired > 0 {
            log::debug!("Retired {} staging buffer(s) at timeline value {}", retired, completed);
        }
        Ok(retired)
    }

    // =========================================================================
    // RESIZE
    // =========================================================================

    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_extent = Extent2D::new(width, height);
        self.minimized = self.window_extent.is_empty();
        if !self.minimized {
            self.swapchain.mark_resized();
        }
    }

    fn rebuild_swapchain(&mut self) -> Result<()> {
        if self.window_extent.is_empty() {
            self.minimized = true;
            return Ok(());
        }
        self.swapchain.rebuild(&mut self.device, self.window_extent)
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame
    pub fn render_frame(&mut self) -> Result<FrameStatus> {
        // Skip rendering if minimized
        if self.minimized {
            return Ok(FrameStatus::Skipped);
        }

        // Handle resize if needed
        if self.swapchain.is_resized() {
            self.rebuild_swapchain()?;
            if self.minimized {
                return Ok(FrameStatus::Skipped);
            }
        }

        let slot_index = self.frame_index;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Acquire next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        let acquire = self.slots[slot_index].acquire;
        let Some(image_index) = self.swapchain.acquire_next_image(&self.device, acquire)? else {
            return Ok(FrameStatus::Resized);
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Wait for the frame that last used this slot
        // ─────────────────────────────────────────────────────────────────────
        if self.slots[slot_index].submitted {
            let fence = self.slots[slot_index].fence;
            let signalled = self.device.wait_for_fence(fence, FENCE_TIMEOUT_NS)?;
            anyhow::ensure!(signalled, "Timed out waiting for frame slot {}", slot_index);
            self.pacing.fence_waits[slot_index] += 1;
            self.device.reset_fence(fence)?;
            self.slots[slot_index].submitted = false;
        }
        self.retire_completed_uploads()?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Upload dynamic data and record
        // ─────────────────────────────────────────────────────────────────────
        self.uniforms.clear_color = Vec4::from_array(self.clear_color);
        let extent = self.swapchain.extent();
        self.uniforms.resolution = [extent.width as f32, extent.height as f32];
        self.uniforms.frame = self.frame_count as u32;
        let uniforms = self.uniforms;
        self.write_dynamic(self.frame_uniforms, bytemuck::bytes_of(&uniforms))?;
        self.flush_dynamic(slot_index)?;

        self.timeline_value += 1;
        self.record_frame(slot_index)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Execute
        // ─────────────────────────────────────────────────────────────────────
        let slot = &mut self.slots[slot_index];
        let waits = [SemaphoreWait {
            semaphore: slot.acquire,
            stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT | PipelineStages::TRANSFER,
            value: 0,
        }];
        let signals = [
            SemaphoreSignal {
                semaphore: slot.complete,
                value: 0,
            },
            SemaphoreSignal {
                semaphore: self.timeline,
                value: self.timeline_value,
            },
        ];
        CommandList::execute(
            &self.device,
            &[&slot.commands],
            &SubmitInfo {
                waits: &waits,
                signals: &signals,
                fence: Some(slot.fence),
            },
        )?;
        slot.submitted = true;
        self.pacing.submits[slot_index] += 1;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Present the image
        // ─────────────────────────────────────────────────────────────────────
        let complete = slot.complete;
        self.swapchain.present(&self.device, QueueType::Graphics, &[complete])?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Advance to next slot
        // ─────────────────────────────────────────────────────────────────────
        self.frame_index = (self.frame_index + 1) % FRAME_ROTATION;
        self.frame_count += 1;

        Ok(FrameStatus::Presented { image_index })
    }

    /// Write every dynamic buffer's contents into this slot's copy
    fn flush_dynamic(&mut self, slot_index: usize) -> Result<()> {
        for dynamic in &self.dynamic_buffers {
            if dynamic.contents.is_empty() {
                continue;
            }
            self.device
                .write_buffer(dynamic.buffers[slot_index], 0, &dynamic.contents)?;
        }
        Ok(())
    }

    fn record_frame(&mut self, slot_index: usize) -> Result<()> {
        let slot = &mut self.slots[slot_index];
        let cmd = &mut slot.commands;
        let device = &mut self.device;

        cmd.reset(device, false)?;
        cmd.begin(device, CommandListUsage::ONE_TIME_SUBMIT)?;

        // First-use static uploads, then their one-time barrier set
        if !self.pending_uploads.is_empty() {
            let mut barriers = Barriers::new();
            for upload in self.pending_uploads.drain(..) {
                cmd.copy_buffer(
                    device,
                    upload.staging,
                    upload.target,
                    &[BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size: upload.size,
                    }],
                );
                let (stages, access) = consumers(upload.usage);
                barriers = barriers.buffer(
                    BufferBarrier::whole(upload.target)
                        .src(PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE)
                        .dst(stages, access),
                );
                self.staging_in_flight.push((self.timeline_value, upload.staging));
            }
            cmd.add_barriers(device, &barriers);
        }

        // Host writes to dynamic buffers, plus the swapchain transition
        let (dynamic_stages, dynamic_access) = self
            .dynamic_buffers
            .iter()
            .filter(|d| !d.contents.is_empty())
            .map(|d| consumers(d.usage))
            .fold((PipelineStages::empty(), AccessFlags::empty()), |(s, a), (ds, da)| (s | ds, a | da));

        let target_layout = if self.draws.is_empty() {
            ImageLayout::TransferDst
        } else {
            ImageLayout::ColorAttachment
        };
        let mut barriers = Barriers::new().image(self.swapchain.acquire_barrier(target_layout));
        if !dynamic_stages.is_empty() {
            barriers = barriers.memory(MemoryBarrier {
                src_stages: PipelineStages::HOST,
                src_access: AccessFlags::HOST_WRITE,
                dst_stages: dynamic_stages,
                dst_access: dynamic_access,
            });
        }
        cmd.add_barriers(device, &barriers);

        let image = self.swapchain.image();
        if self.draws.is_empty() {
            // Clear only
            cmd.clear_color_image(device, image, self.clear_color, SubresourceRange::color());
        } else {
            let extent = self.swapchain.extent();
            let rendering = RenderingDesc::new(extent).color(RenderingAttachment::color(image, self.clear_color));
            cmd.begin_rendering(device, &rendering);
            cmd.set_viewport(device, Viewport::from(extent));
            cmd.set_scissor(device, Rect2D::from(extent));

            for draw in &self.draws {
                let resolve = |source: BufferSource| match source {
                    BufferSource::Static(buffer) => buffer,
                    BufferSource::Dynamic(id) => self.dynamic_buffers[id.0].buffers[slot_index],
                };

                cmd.bind_pipeline(device, draw.pipeline);
                if let Some(group) = draw.descriptor_group {
                    cmd.bind_descriptor_group(device, 0, group);
                }
                if !draw.push_constants.is_empty() {
                    let stages = device.pipeline(draw.pipeline).stages();
                    cmd.push_constants(device, stages, 0, &draw.push_constants);
                }
                if let Some(source) = draw.vertex_buffer {
                    cmd.bind_vertex_buffers(device, 0, &[(resolve(source), 0)]);
                }
                match draw.index_buffer {
                    Some((source, index_type)) => {
                        cmd.bind_index_buffer(device, resolve(source), 0, index_type);
                        cmd.draw_indexed(device, draw.count, draw.instance_count, 0, 0, 0);
                    }
                    None => cmd.draw(device, draw.count, draw.instance_count, 0, 0),
                }
            }
            cmd.end_rendering(device);
        }

        let barriers = Barriers::new().image(self.swapchain.present_barrier(target_layout));
        cmd.add_barriers(device, &barriers);

        cmd.end(device).context("Failed to finish frame recording")
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn device(&self) -> &Device<B> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device<B> {
        &mut self.device
    }

    pub fn swapchain(&self) -> &SwapChain<B> {
        &self.swapchain
    }

    pub fn pacing(&self) -> &FramePacing {
        &self.pacing
    }

    /// Rotation slot the next frame will use
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Timeline value the most recent frame signals on completion
    pub fn timeline_value(&self) -> u64 {
        self.timeline_value
    }

    pub fn completed_timeline_value(&self) -> Result<u64> {
        self.device.semaphore_value(self.timeline)
    }

    pub fn staging_in_flight(&self) -> usize {
        self.staging_in_flight.len()
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    /// Command list last recorded for `slot`
    pub fn frame_commands(&self, slot: usize) -> &CommandList<B> {
        &self.slots[slot].commands
    }

    /// Wait for the GPU, release everything the renderer created and hand the
    /// device back
    pub fn destroy(mut self) -> Device<B> {
        log::info!("Destroying renderer after {} frames", self.frame_count);
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle failed before renderer teardown: {:?}", e);
        }

        for slot in self.slots.drain(..) {
            self.allocator.free(&self.device, slot.commands);
            self.device.delete_semaphore(slot.acquire);
            self.device.delete_semaphore(slot.complete);
            self.device.delete_fence(slot.fence);
        }
        self.allocator.destroy(&self.device);
        self.device.delete_semaphore(self.timeline);

        for (_, staging) in self.staging_in_flight.drain(..) {
            self.device.delete_buffer(staging);
        }
        for upload in self.pending_uploads.drain(..) {
            self.device.delete_buffer(upload.staging);
        }
        for dynamic in self.dynamic_buffers.drain(..) {
            for buffer in dynamic.buffers {
                self.device.delete_buffer(buffer);
            }
        }

        self.swapchain.destroy(&mut self.device);
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_balance_tolerates_one_outstanding_submit() {
        let mut pacing = FramePacing::default();
        pacing.submits = [3, 3, 2];
        pacing.fence_waits = [2, 2, 2];
        assert!(pacing.is_balanced());
        pacing.submits[0] = 4;
        assert!(!pacing.is_balanced());
    }

    #[test]
    fn consumers_follow_usage() {
        assert_eq!(
            consumers(BufferUsage::VERTEX | BufferUsage::INDEX),
            (
                PipelineStages::VERTEX_INPUT,
                AccessFlags::VERTEX_ATTRIBUTE_READ | AccessFlags::INDEX_READ
            )
        );
        assert_eq!(
            consumers(BufferUsage::TRANSFER_SRC),
            (PipelineStages::ALL_COMMANDS, AccessFlags::MEMORY_READ)
        );
    }

    #[test]
    fn frame_uniforms_are_plain_bytes() {
        let uniforms = FrameUniforms::default();
        assert_eq!(bytemuck::bytes_of(&uniforms).len(), std::mem::size_of::<FrameUniforms>());
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 96);
    }
}
