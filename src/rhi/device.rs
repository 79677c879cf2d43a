// Device - owner of every resource pool
//
// Responsibilities:
// - Create/Delete per resource kind, routed to the compiled-in backend
// - Buffer Map/Unmap/Write/Read
// - Memory type queries used to place buffers and images
// - Device-wide wait idle
//
// The Device holds no locks. It is driven from one submitting thread.

use anyhow::{Context, Result};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::{AdapterInfo, Backend, MemoryStrategy, ResolvedDescriptor, ResolvedDescriptorWrite, ShaderStageRef};

use super::handle::*;
use super::resources::*;
use super::types::*;

/// One pool per resource kind.
///
/// A Device owns its primary set. Additional sets can be created for code
/// that wants to allocate without touching the primary pools; resources
/// created into such a set must be deleted through the same set.
pub struct ResourcePools<B: Backend> {
    pub(crate) buffers: Pool<kind::Buffer, Buffer<B>>,
    pub(crate) images: Pool<kind::Image, Image<B>>,
    pub(crate) samplers: Pool<kind::Sampler, Sampler<B>>,
    pub(crate) shader_modules: Pool<kind::ShaderModule, ShaderModule<B>>,
    pub(crate) pipelines: Pool<kind::Pipeline, Pipeline<B>>,
    pub(crate) descriptor_pools: Pool<kind::DescriptorPool, DescriptorPool<B>>,
    pub(crate) descriptor_layouts: Pool<kind::DescriptorLayout, DescriptorLayout<B>>,
    pub(crate) descriptor_groups: Pool<kind::DescriptorGroup, DescriptorGroup<B>>,
    pub(crate) fences: Pool<kind::Fence, Fence<B>>,
    pub(crate) semaphores: Pool<kind::Semaphore, Semaphore<B>>,
    pub(crate) events: Pool<kind::Event, Event<B>>,
}

impl<B: Backend> ResourcePools<B> {
    pub fn new(capacities: &PoolCapacities) -> Self {
        Self {
            buffers: Pool::with_capacity("buffer", capacities.buffers),
            images: Pool::with_capacity("image", capacities.images),
            samplers: Pool::with_capacity("sampler", capacities.samplers),
            shader_modules: Pool::with_capacity("shader module", capacities.shader_modules),
            pipelines: Pool::with_capacity("pipeline", capacities.pipelines),
            descriptor_pools: Pool::with_capacity("descriptor pool", capacities.descriptor_pools),
            descriptor_layouts: Pool::with_capacity("descriptor layout", capacities.descriptor_layouts),
            descriptor_groups: Pool::with_capacity("descriptor group", capacities.descriptor_groups),
            fences: Pool::with_capacity("fence", capacities.fences),
            semaphores: Pool::with_capacity("semaphore", capacities.semaphores),
            events: Pool::with_capacity("event", capacities.events),
        }
    }

    pub fn buffer(&self, handle: BufferHandle) -> &Buffer<B> {
        self.buffers.get(handle)
    }

    pub fn image(&self, handle: ImageHandle) -> &Image<B> {
        self.images.get(handle)
    }

    /// Live resources across every pool
    pub fn live_count(&self) -> usize {
        self.buffers.len()
            + self.images.len()
            + self.samplers.len()
            + self.shader_modules.len()
            + self.pipelines.len()
            + self.descriptor_pools.len()
            + self.descriptor_layouts.len()
            + self.descriptor_groups.len()
            + self.fences.len()
            + self.semaphores.len()
            + self.events.len()
    }
}

pub struct Device<B: Backend> {
    pub(crate) pools: ResourcePools<B>,
    capacities: PoolCapacities,
    adapter: AdapterInfo,
    recording: AtomicBool,
    backend: B,
}

impl<B: Backend> Device<B> {
    /// Wrap a backend. Pool sizes are fixed from here on.
    pub fn new(backend: B, capacities: PoolCapacities) -> Self {
        let adapter = backend.adapter_info();
        log::info!(
            "Device ready: {} on {} ({})",
            backend.name(),
            adapter.name,
            if adapter.discrete { "discrete" } else { "integrated" }
        );
        log::debug!("Pool capacities: {:?}", capacities);

        Self {
            pools: ResourcePools::new(&capacities),
            capacities,
            adapter,
            recording: AtomicBool::new(false),
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    pub fn is_discrete(&self) -> bool {
        self.adapter.discrete
    }

    pub fn capacities(&self) -> &PoolCapacities {
        &self.capacities
    }

    pub fn pools(&self) -> &ResourcePools<B> {
        &self.pools
    }

    /// Wait for the device to be idle (e.g., before cleanup or a swapchain rebuild)
    pub fn wait_idle(&self) -> Result<()> {
        self.backend.wait_idle()
    }

    // =========================================================================
    // MEMORY QUERIES
    // =========================================================================

    /// First memory type allowed by `type_bits` whose flags contain `properties`
    pub fn find_memory_type(&self, type_bits: u32, properties: MemoryProperties) -> Option<u32> {
        find_memory_type(&self.adapter, type_bits, properties)
    }

    pub fn has_memory_type(&self, properties: MemoryProperties) -> bool {
        self.find_memory_type(u32::MAX, properties).is_some()
    }

    /// Placement used for a given usage on this adapter
    pub fn memory_strategy(&self, usage: MemoryUsage) -> Result<MemoryStrategy> {
        memory_strategy(&self.adapter, usage)
    }

    // =========================================================================
    // BUFFERS
    // =========================================================================

    pub fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle> {
        insert_buffer(&self.backend, &self.adapter, &mut self.pools.buffers, desc)
    }

    /// Create into a caller-owned pool set
    pub fn create_buffer_in(&self, pools: &mut ResourcePools<B>, desc: &BufferDesc) -> Result<BufferHandle> {
        insert_buffer(&self.backend, &self.adapter, &mut pools.buffers, desc)
    }

    pub fn delete_buffer(&mut self, handle: BufferHandle) {
        remove_buffer(&self.backend, &mut self.pools.buffers, handle);
    }

    pub fn delete_buffer_in(&self, pools: &mut ResourcePools<B>, handle: BufferHandle) {
        remove_buffer(&self.backend, &mut pools.buffers, handle);
    }

    pub fn buffer(&self, handle: BufferHandle) -> &Buffer<B> {
        self.pools.buffers.get(handle)
    }

    /// Map a host-visible buffer. The pointer is valid until `unmap_buffer`.
    pub fn map_buffer(&mut self, handle: BufferHandle) -> Result<NonNull<u8>> {
        let buffer = self.pools.buffers.get_mut(handle);
        anyhow::ensure!(
            buffer.memory.is_host_visible(),
            "buffer '{}' is not host visible",
            buffer.desc.debug_name
        );
        let ptr = self.backend.map_buffer(&mut buffer.raw)?;
        buffer.mapped = true;
        Ok(ptr)
    }

    pub fn unmap_buffer(&mut self, handle: BufferHandle) {
        let buffer = self.pools.buffers.get_mut(handle);
        if buffer.mapped {
            self.backend.unmap_buffer(&mut buffer.raw);
            buffer.mapped = false;
        }
    }

    /// Copy `data` into a host-visible buffer at `offset`. A buffer that was
    /// already mapped stays mapped.
    pub fn write_buffer(&mut self, handle: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let (size, was_mapped) = {
            let buffer = self.pools.buffers.get(handle);
            (buffer.desc.size, buffer.mapped)
        };
        check_range(size, offset, data.len())?;

        let ptr = self.map_buffer(handle)?;
        // Safety: range checked against the buffer size above
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr().add(offset as usize), data.len());
        }
        if !was_mapped {
            self.unmap_buffer(handle);
        }
        Ok(())
    }

    /// Copy out of a host-visible buffer starting at `offset`
    pub fn read_buffer(&mut self, handle: BufferHandle, offset: u64, out: &mut [u8]) -> Result<()> {
        let (size, was_mapped) = {
            let buffer = self.pools.buffers.get(handle);
            (buffer.desc.size, buffer.mapped)
        };
        check_range(size, offset, out.len())?;

        let ptr = self.map_buffer(handle)?;
        // Safety: range checked against the buffer size above
        unsafe {
            std::ptr::copy_nonoverlapping(ptr.as_ptr().add(offset as usize), out.as_mut_ptr(), out.len());
        }
        if !was_mapped {
            self.unmap_buffer(handle);
        }
        Ok(())
    }

    // =========================================================================
    // IMAGES
    // =========================================================================

    pub fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageHandle> {
        insert_image(&self.backend, &self.adapter, &mut self.pools.images, desc)
    }

    pub fn create_image_in(&self, pools: &mut ResourcePools<B>, desc: &ImageDesc) -> Result<ImageHandle> {
        insert_image(&self.backend, &self.adapter, &mut pools.images, desc)
    }

    pub fn delete_image(&mut self, handle: ImageHandle) {
        remove_image(&self.backend, &mut self.pools.images, handle);
    }

    pub fn delete_image_in(&self, pools: &mut ResourcePools<B>, handle: ImageHandle) {
        remove_image(&self.backend, &mut pools.images, handle);
    }

    pub fn image(&self, handle: ImageHandle) -> &Image<B> {
        self.pools.images.get(handle)
    }

    /// Register an image whose memory belongs to someone else (swapchain)
    pub(crate) fn import_image(&mut self, raw: B::Image, desc: ImageDesc) -> Result<ImageHandle> {
        if let Err(e) = self.pools.images.ensure_space() {
            self.backend.destroy_image(raw);
            return Err(e);
        }
        self.pools.images.insert(Image {
            raw,
            desc,
            layout: ImageLayout::Undefined,
            allocated_size: 0,
            external: true,
        })
    }

    pub(crate) fn set_image_layout(&mut self, handle: ImageHandle, layout: ImageLayout) {
        self.pools.images.get_mut(handle).layout = layout;
    }

    // =========================================================================
    // SAMPLERS & SHADERS
    // =========================================================================

    pub fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        self.pools.samplers.ensure_space()?;
        let raw = self.backend.create_sampler(desc).context("Failed to create sampler")?;
        self.pools.samplers.insert(Sampler { raw, desc: desc.clone() })
    }

    pub fn delete_sampler(&mut self, handle: SamplerHandle) {
        let sampler = self.pools.samplers.remove(handle);
        self.backend.destroy_sampler(sampler.raw);
    }

    pub fn sampler(&self, handle: SamplerHandle) -> &Sampler<B> {
        self.pools.samplers.get(handle)
    }

    pub fn create_shader_module(&mut self, desc: &ShaderModuleDesc) -> Result<ShaderModuleHandle> {
        anyhow::ensure!(!desc.code.is_empty(), "shader module has no byte code");
        anyhow::ensure!(!desc.entry_point.is_empty(), "shader module has no entry point");
        anyhow::ensure!(desc.stage.bits().count_ones() == 1, "shader module must name exactly one stage");

        self.pools.shader_modules.ensure_space()?;
        let raw = self
            .backend
            .create_shader_module(desc)
            .with_context(|| format!("Failed to create {:?} shader module", desc.stage))?;
        let handle = self.pools.shader_modules.insert(ShaderModule { raw, desc: desc.clone() })?;
        log::debug!("Shader module {:?} ({:?}, entry '{}')", handle, desc.stage, desc.entry_point);
        Ok(handle)
    }

    pub fn delete_shader_module(&mut self, handle: ShaderModuleHandle) {
        let module = self.pools.shader_modules.remove(handle);
        self.backend.destroy_shader_module(module.raw);
    }

    pub fn shader_module(&self, handle: ShaderModuleHandle) -> &ShaderModule<B> {
        self.pools.shader_modules.get(handle)
    }

    // =========================================================================
    // PIPELINES
    // =========================================================================

    pub fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle> {
        self.pools.pipelines.ensure_space()?;

        let pools = &self.pools;
        let layouts: Vec<&B::DescriptorLayout> = desc
            .descriptor_layouts()
            .iter()
            .map(|&h| &pools.descriptor_layouts.get(h).raw)
            .collect();
        let stage = |h: ShaderModuleHandle| {
            let module = pools.shader_modules.get(h);
            ShaderStageRef::<B> { module: &module.raw, desc: &module.desc }
        };

        // Modules may be deleted once the pipeline exists
        let stages = match desc {
            PipelineDesc::Graphics(GraphicsPipelineDesc { shaders, .. })
            | PipelineDesc::RayTracing(RayTracingPipelineDesc { shaders, .. }) => shaders
                .iter()
                .fold(ShaderStages::empty(), |acc, &h| acc | pools.shader_modules.get(h).desc.stage),
            PipelineDesc::Compute(compute) => pools.shader_modules.get(compute.shader).desc.stage,
        };

        let raw = match desc {
            PipelineDesc::Graphics(graphics) => {
                anyhow::ensure!(!graphics.shaders.is_empty(), "graphics pipeline has no shader stages");
                anyhow::ensure!(
                    !graphics.color_formats.is_empty() || graphics.depth_format.is_some(),
                    "graphics pipeline has no attachments"
                );
                let stages: Vec<_> = graphics.shaders.iter().map(|&h| stage(h)).collect();
                self.backend
                    .create_graphics_pipeline(graphics, &stages, &layouts)
                    .context("Failed to create graphics pipeline")?
            }
            PipelineDesc::Compute(compute) => {
                let stage = stage(compute.shader);
                anyhow::ensure!(
                    stage.desc.stage == ShaderStages::COMPUTE,
                    "compute pipeline needs a compute shader, got {:?}",
                    stage.desc.stage
                );
                self.backend
                    .create_compute_pipeline(compute, stage, &layouts)
                    .context("Failed to create compute pipeline")?
            }
            PipelineDesc::RayTracing(rt) => {
                let stages: Vec<_> = rt.shaders.iter().map(|&h| stage(h)).collect();
                self.backend
                    .create_ray_tracing_pipeline(rt, &stages, &layouts)
                    .context("Failed to create ray tracing pipeline")?
            }
        };

        let handle = self.pools.pipelines.insert(Pipeline {
            raw,
            desc: desc.clone(),
            stages,
        })?;
        log::debug!("Pipeline {:?} ({:?})", handle, desc.bind_point());
        Ok(handle)
    }

    pub fn delete_pipeline(&mut self, handle: PipelineHandle) {
        let pipeline = self.pools.pipelines.remove(handle);
        self.backend.destroy_pipeline(pipeline.raw);
    }

    pub fn pipeline(&self, handle: PipelineHandle) -> &Pipeline<B> {
        self.pools.pipelines.get(handle)
    }

    // =========================================================================
    // DESCRIPTORS
    // =========================================================================

    pub fn create_descriptor_pool(&mut self, desc: &DescriptorPoolDesc) -> Result<DescriptorPoolHandle> {
        anyhow::ensure!(desc.max_groups > 0, "descriptor pool must allow at least one group");
        self.pools.descriptor_pools.ensure_space()?;
        let raw = self
            .backend
            .create_descriptor_pool(desc)
            .context("Failed to create descriptor pool")?;
        self.pools.descriptor_pools.insert(DescriptorPool { raw, desc: desc.clone() })
    }

    /// Groups allocated from the pool must be deleted first
    pub fn delete_descriptor_pool(&mut self, handle: DescriptorPoolHandle) {
        let pool = self.pools.descriptor_pools.remove(handle);
        self.backend.destroy_descriptor_pool(pool.raw);
    }

    pub fn descriptor_pool(&self, handle: DescriptorPoolHandle) -> &DescriptorPool<B> {
        self.pools.descriptor_pools.get(handle)
    }

    pub fn create_descriptor_layout(&mut self, desc: &DescriptorLayoutDesc) -> Result<DescriptorLayoutHandle> {
        self.pools.descriptor_layouts.ensure_space()?;
        let raw = self
            .backend
            .create_descriptor_layout(desc)
            .context("Failed to create descriptor set layout")?;
        self.pools.descriptor_layouts.insert(DescriptorLayout { raw, desc: desc.clone() })
    }

    pub fn delete_descriptor_layout(&mut self, handle: DescriptorLayoutHandle) {
        let layout = self.pools.descriptor_layouts.remove(handle);
        self.backend.destroy_descriptor_layout(layout.raw);
    }

    pub fn descriptor_layout(&self, handle: DescriptorLayoutHandle) -> &DescriptorLayout<B> {
        self.pools.descriptor_layouts.get(handle)
    }

    pub fn create_descriptor_group(&mut self, desc: &DescriptorGroupDesc) -> Result<DescriptorGroupHandle> {
        anyhow::ensure!(!desc.layouts.is_empty(), "descriptor group needs at least one layout");
        self.pools.descriptor_groups.ensure_space()?;

        let pool = &self.pools.descriptor_pools.get(desc.pool).raw;
        let layouts: Vec<&B::DescriptorLayout> = desc
            .layouts
            .iter()
            .map(|&h| &self.pools.descriptor_layouts.get(h).raw)
            .collect();
        let raw = self
            .backend
            .allocate_descriptor_group(pool, &layouts)
            .context("Failed to allocate descriptor group")?;
        self.pools.descriptor_groups.insert(DescriptorGroup { raw, desc: desc.clone() })
    }

    pub fn delete_descriptor_group(&mut self, handle: DescriptorGroupHandle) {
        let group = self.pools.descriptor_groups.remove(handle);
        let pool = &self.pools.descriptor_pools.get(group.desc.pool).raw;
        self.backend.free_descriptor_group(pool, group.raw);
    }

    pub fn descriptor_group(&self, handle: DescriptorGroupHandle) -> &DescriptorGroup<B> {
        self.pools.descriptor_groups.get(handle)
    }

    /// Point bindings of a group at buffers, images and samplers
    pub fn update_descriptor_group(&self, handle: DescriptorGroupHandle, writes: &[DescriptorWrite]) {
        let group = self.pools.descriptor_groups.get(handle);
        let resolved: Vec<ResolvedDescriptorWrite<'_, B>> = writes
            .iter()
            .map(|w| {
                assert!(
                    (w.set as usize) < group.desc.layouts.len(),
                    "descriptor write targets set {} of a {}-set group",
                    w.set,
                    group.desc.layouts.len()
                );
                let resource = match w.resource {
                    DescriptorResource::Buffer { buffer, offset, range } => ResolvedDescriptor::Buffer {
                        buffer: &self.pools.buffers.get(buffer).raw,
                        offset,
                        range,
                    },
                    DescriptorResource::Image { image, layout } => ResolvedDescriptor::Image {
                        image: &self.pools.images.get(image).raw,
                        layout,
                        sampler: None,
                    },
                    DescriptorResource::CombinedImageSampler { image, layout, sampler } => ResolvedDescriptor::Image {
                        image: &self.pools.images.get(image).raw,
                        layout,
                        sampler: Some(&self.pools.samplers.get(sampler).raw),
                    },
                    DescriptorResource::Sampler(sampler) => {
                        ResolvedDescriptor::Sampler(&self.pools.samplers.get(sampler).raw)
                    }
                };
                ResolvedDescriptorWrite {
                    set: w.set,
                    binding: w.binding,
                    array_element: w.array_element,
                    ty: w.ty,
                    resource,
                }
            })
            .collect();
        self.backend.write_descriptor_group(&group.raw, &resolved);
    }

    // =========================================================================
    // RECORDING GUARD
    // =========================================================================

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub(crate) fn begin_recording(&self) {
        let claimed = self
            .recording
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        assert!(claimed, "another command list is already recording on this device");
    }

    pub(crate) fn end_recording(&self) {
        self.recording.store(false, Ordering::Release);
    }

    /// Destroy every resource in a caller-owned pool set
    pub fn destroy_pools(&self, mut pools: ResourcePools<B>) {
        destroy_all(&self.backend, &mut pools);
    }
}

impl<B: Backend> Drop for Device<B> {
    fn drop(&mut self) {
        log::info!("Destroying device ({} live resources)...", self.pools.live_count());

        // Wait for the GPU before destroying anything it might still read
        if let Err(e) = self.backend.wait_idle() {
            log::error!("wait_idle failed during device teardown: {:?}", e);
        }
        destroy_all(&self.backend, &mut self.pools);
    }
}

// =============================================================================
// HELPERS
// =============================================================================

pub(crate) fn find_memory_type(adapter: &AdapterInfo, type_bits: u32, properties: MemoryProperties) -> Option<u32> {
    adapter
        .memory_types
        .iter()
        .enumerate()
        .find(|(i, flags)| *i < 32 && type_bits & (1 << i) != 0 && flags.contains(properties))
        .map(|(i, _)| i as u32)
}

/// DEVICE_LOCAL for GPU data; HOST_VISIBLE+HOST_COHERENT for uploads, except
/// on integrated adapters where device-local host-visible memory is preferred.
pub(crate) fn memory_strategy(adapter: &AdapterInfo, usage: MemoryUsage) -> Result<MemoryStrategy> {
    let host = MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT;
    let candidates: Vec<MemoryProperties> = match usage {
        MemoryUsage::GpuOnly => vec![MemoryProperties::DEVICE_LOCAL],
        MemoryUsage::CpuToGpu if !adapter.discrete => vec![MemoryProperties::DEVICE_LOCAL | host, host],
        MemoryUsage::CpuToGpu => vec![host],
        MemoryUsage::GpuToCpu => vec![host | MemoryProperties::HOST_CACHED, host],
    };

    candidates
        .into_iter()
        .find_map(|wanted| find_memory_type(adapter, u32::MAX, wanted))
        .map(|memory_type| MemoryStrategy {
            properties: adapter.memory_types[memory_type as usize],
            memory_type,
        })
        .with_context(|| format!("No memory type for {:?} on {}", usage, adapter.name))
}

fn check_range(size: u64, offset: u64, len: usize) -> Result<()> {
    let end = offset.checked_add(len as u64);
    anyhow::ensure!(
        matches!(end, Some(end) if end <= size),
        "range {}..{} exceeds buffer size {}",
        offset,
        offset.saturating_add(len as u64),
        size
    );
    Ok(())
}

fn insert_buffer<B: Backend>(
    backend: &B,
    adapter: &AdapterInfo,
    pool: &mut Pool<kind::Buffer, Buffer<B>>,
    desc: &BufferDesc,
) -> Result<BufferHandle> {
    anyhow::ensure!(desc.size > 0, "buffer '{}' has zero size", desc.debug_name);
    pool.ensure_space()?;

    let strategy = memory_strategy(adapter, desc.memory)?;
    let raw = backend
        .create_buffer(desc, strategy)
        .with_context(|| format!("Failed to create buffer '{}'", desc.debug_name))?;
    let handle = pool.insert(Buffer {
        raw,
        desc: desc.clone(),
        memory: strategy.properties,
        mapped: false,
    })?;
    log::debug!(
        "Buffer {:?} '{}': {} bytes, {:?}, {:?}",
        handle,
        desc.debug_name,
        desc.size,
        desc.usage,
        strategy.properties
    );
    Ok(handle)
}

fn remove_buffer<B: Backend>(backend: &B, pool: &mut Pool<kind::Buffer, Buffer<B>>, handle: BufferHandle) {
    let mut buffer = pool.remove(handle);
    if buffer.mapped {
        backend.unmap_buffer(&mut buffer.raw);
    }
    backend.destroy_buffer(buffer.raw);
}

fn insert_image<B: Backend>(
    backend: &B,
    adapter: &AdapterInfo,
    pool: &mut Pool<kind::Image, Image<B>>,
    desc: &ImageDesc,
) -> Result<ImageHandle> {
    let e = desc.extent;
    anyhow::ensure!(
        e.width > 0 && e.height > 0 && e.depth > 0,
        "image '{}' has zero extent",
        desc.debug_name
    );
    anyhow::ensure!(
        desc.mip_levels > 0 && desc.array_layers > 0,
        "image '{}' needs at least one mip and layer",
        desc.debug_name
    );
    anyhow::ensure!(desc.format != Format::Undefined, "image '{}' has no format", desc.debug_name);
    pool.ensure_space()?;

    let strategy = memory_strategy(adapter, desc.memory)?;
    let (raw, allocated_size) = backend
        .create_image(desc, strategy)
        .with_context(|| format!("Failed to create image '{}'", desc.debug_name))?;
    let handle = pool.insert(Image {
        raw,
        desc: desc.clone(),
        layout: ImageLayout::Undefined,
        allocated_size,
        external: false,
    })?;
    log::debug!(
        "Image {:?} '{}': {}x{}x{} {:?}, {} bytes",
        handle,
        desc.debug_name,
        e.width,
        e.height,
        e.depth,
        desc.format,
        allocated_size
    );
    Ok(handle)
}

fn remove_image<B: Backend>(backend: &B, pool: &mut Pool<kind::Image, Image<B>>, handle: ImageHandle) {
    let image = pool.remove(handle);
    backend.destroy_image(image.raw);
}

/// Reverse dependency order: groups before their pools, pipelines before
/// the layouts and shaders they were built from.
fn destroy_all<B: Backend>(backend: &B, pools: &mut ResourcePools<B>) {
    for group in pools.descriptor_groups.drain() {
        if pools.descriptor_pools.contains(group.desc.pool) {
            backend.free_descriptor_group(&pools.descriptor_pools.get(group.desc.pool).raw, group.raw);
        }
    }
    for pool in pools.descriptor_pools.drain() {
        backend.destroy_descriptor_pool(pool.raw);
    }
    for pipeline in pools.pipelines.drain() {
        backend.destroy_pipeline(pipeline.raw);
    }
    for layout in pools.descriptor_layouts.drain() {
        backend.destroy_descriptor_layout(layout.raw);
    }
    for module in pools.shader_modules.drain() {
        backend.destroy_shader_module(module.raw);
    }
    for sampler in pools.samplers.drain() {
        backend.destroy_sampler(sampler.raw);
    }
    for image in pools.images.drain() {
        backend.destroy_image(image.raw);
    }
    for mut buffer in pools.buffers.drain() {
        if buffer.mapped {
            backend.unmap_buffer(&mut buffer.raw);
        }
        backend.destroy_buffer(buffer.raw);
    }
    for event in pools.events.drain() {
        backend.destroy_event(event.raw);
    }
    for semaphore in pools.semaphores.drain() {
        backend.destroy_semaphore(semaphore.raw);
    }
    for fence in pools.fences.drain() {
        backend.destroy_fence(fence.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    fn upload_desc(size: u64) -> BufferDesc {
        BufferDesc {
            size,
            usage: BufferUsage::UNIFORM,
            memory: MemoryUsage::CpuToGpu,
            debug_name: "upload".to_string(),
        }
    }

    fn shader(device: &mut Device<HeadlessBackend>, stage: ShaderStages) -> ShaderModuleHandle {
        device
            .create_shader_module(&ShaderModuleDesc {
                code: vec![0x0723_0203, 0, 0, 0, 0],
                entry_point: "main".to_string(),
                stage,
            })
            .unwrap()
    }

    #[test]
    fn created_resources_keep_their_descriptor() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let desc = ImageDesc {
            format: Format::D32Sfloat,
            extent: Extent3D { width: 64, height: 32, depth: 1 },
            usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            debug_name: "depth".to_string(),
            ..Default::default()
        };
        let image = device.create_image(&desc).unwrap();
        assert_eq!(device.image(image).desc(), &desc);
        assert_eq!(device.image(image).layout(), ImageLayout::Undefined);
        assert_eq!(device.image(image).allocated_size(), 64 * 32 * 4);
        assert!(!device.image(image).is_external());

        let buffer = device.create_buffer(&upload_desc(128)).unwrap();
        assert_eq!(device.buffer(buffer).desc(), &upload_desc(128));
    }

    #[test]
    fn pool_capacity_is_a_hard_limit() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::uniform(2));
        let a = device.create_buffer(&upload_desc(16)).unwrap();
        device.create_buffer(&upload_desc(16)).unwrap();

        let err = device.create_buffer(&upload_desc(16)).unwrap_err();
        assert!(err.to_string().contains("buffer pool exhausted (capacity 2)"));

        device.delete_buffer(a);
        let c = device.create_buffer(&upload_desc(16)).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn every_pool_rejects_one_past_capacity() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::uniform(1));
        let exhausted = |result: Result<()>, label: &str| {
            let err = result.unwrap_err();
            assert!(
                err.to_string().contains(&format!("{} pool exhausted (capacity 1)", label)),
                "{}: {:#}",
                label,
                err
            );
        };

        device.create_buffer(&upload_desc(16)).unwrap();
        exhausted(device.create_buffer(&upload_desc(16)).map(drop), "buffer");

        device.create_image(&ImageDesc::default()).unwrap();
        exhausted(device.create_image(&ImageDesc::default()).map(drop), "image");

        device.create_sampler(&SamplerDesc::default()).unwrap();
        exhausted(device.create_sampler(&SamplerDesc::default()).map(drop), "sampler");

        let compute = shader(&mut device, ShaderStages::COMPUTE);
        let module = ShaderModuleDesc {
            code: vec![0x0723_0203],
            entry_point: "main".to_string(),
            stage: ShaderStages::COMPUTE,
        };
        exhausted(device.create_shader_module(&module).map(drop), "shader module");

        let pipeline = PipelineDesc::Compute(ComputePipelineDesc {
            shader: compute,
            descriptor_layouts: Vec::new(),
            push_constant_size: 0,
        });
        device.create_pipeline(&pipeline).unwrap();
        exhausted(device.create_pipeline(&pipeline).map(drop), "pipeline");

        // Room for two groups so only the group pool limits them
        let pool_desc = DescriptorPoolDesc {
            max_groups: 2,
            sizes: vec![(DescriptorType::UniformBuffer, 2)],
        };
        let pool = device.create_descriptor_pool(&pool_desc).unwrap();
        exhausted(device.create_descriptor_pool(&pool_desc).map(drop), "descriptor pool");

        let layout_desc = DescriptorLayoutDesc {
            bindings: vec![DescriptorBinding {
                binding: 0,
                ty: DescriptorType::UniformBuffer,
                count: 1,
                stages: ShaderStages::COMPUTE,
            }],
        };
        let layout = device.create_descriptor_layout(&layout_desc).unwrap();
        exhausted(device.create_descriptor_layout(&layout_desc).map(drop), "descriptor layout");

        let group_desc = DescriptorGroupDesc { pool, layouts: vec![layout] };
        device.create_descriptor_group(&group_desc).unwrap();
        exhausted(device.create_descriptor_group(&group_desc).map(drop), "descriptor group");

        device.create_fence(false).unwrap();
        exhausted(device.create_fence(false).map(drop), "fence");

        device.create_semaphore(SemaphoreKind::Binary, 0).unwrap();
        exhausted(device.create_semaphore(SemaphoreKind::Timeline, 0).map(drop), "semaphore");

        device.create_event().unwrap();
        exhausted(device.create_event().map(drop), "event");

        assert_eq!(device.pools().live_count(), 11);
    }

    #[test]
    fn memory_placement_depends_on_adapter() {
        let discrete = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let upload = discrete.memory_strategy(MemoryUsage::CpuToGpu).unwrap();
        assert!(upload.properties.is_host_visible());
        assert!(!upload.properties.contains(MemoryProperties::DEVICE_LOCAL));
        let readback = discrete.memory_strategy(MemoryUsage::GpuToCpu).unwrap();
        assert!(readback.properties.contains(MemoryProperties::HOST_CACHED));

        let integrated = Device::new(HeadlessBackend::integrated(), PoolCapacities::default());
        let upload = integrated.memory_strategy(MemoryUsage::CpuToGpu).unwrap();
        assert!(upload
            .properties
            .contains(MemoryProperties::DEVICE_LOCAL | MemoryProperties::HOST_VISIBLE));
        assert_eq!(integrated.find_memory_type(0b001, MemoryProperties::HOST_VISIBLE), None);
        assert!(integrated.has_memory_type(MemoryProperties::HOST_CACHED));
    }

    #[test]
    fn write_then_read_host_visible_buffer() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let buffer = device.create_buffer(&upload_desc(16)).unwrap();

        device.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 6];
        device.read_buffer(buffer, 2, &mut out).unwrap();
        assert_eq!(out, [0, 0, 1, 2, 3, 4]);
        assert!(!device.buffer(buffer).is_mapped());

        let err = device.write_buffer(buffer, 14, &[0; 4]).unwrap_err();
        assert!(err.to_string().contains("exceeds buffer size"));
    }

    #[test]
    fn gpu_only_buffers_cannot_be_mapped() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let buffer = device
            .create_buffer(&BufferDesc {
                size: 64,
                usage: BufferUsage::STORAGE,
                memory: MemoryUsage::GpuOnly,
                debug_name: "gpu".to_string(),
            })
            .unwrap();
        assert!(device.write_buffer(buffer, 0, &[1]).is_err());
    }

    #[test]
    fn zero_sized_resources_are_rejected() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        assert!(device.create_buffer(&upload_desc(0)).is_err());
        let flat = ImageDesc {
            extent: Extent3D { width: 0, height: 4, depth: 1 },
            ..Default::default()
        };
        assert!(device.create_image(&flat).is_err());
        assert_eq!(device.pools().live_count(), 0);
    }

    #[test]
    fn secondary_pools_are_independent() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let mut worker = ResourcePools::new(&PoolCapacities::uniform(4));

        let buffer = device.create_buffer_in(&mut worker, &upload_desc(32)).unwrap();
        let image = device.create_image_in(&mut worker, &ImageDesc::default()).unwrap();
        assert_eq!(worker.live_count(), 2);
        assert_eq!(device.pools().live_count(), 0);
        assert_eq!(worker.buffer(buffer).size(), 32);

        device.delete_buffer_in(&mut worker, buffer);
        assert_eq!(worker.live_count(), 1);
        assert!(worker.image(image).desc().usage.contains(ImageUsage::SAMPLED));
        device.destroy_pools(worker);
    }

    #[test]
    fn descriptor_group_updates_reach_the_backend() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let buffer = device.create_buffer(&upload_desc(256)).unwrap();
        let layout = device
            .create_descriptor_layout(&DescriptorLayoutDesc {
                bindings: vec![DescriptorBinding {
                    binding: 0,
                    ty: DescriptorType::UniformBuffer,
                    count: 1,
                    stages: ShaderStages::ALL_GRAPHICS,
                }],
            })
            .unwrap();
        let pool = device
            .create_descriptor_pool(&DescriptorPoolDesc {
                max_groups: 1,
                sizes: vec![(DescriptorType::UniformBuffer, 1)],
            })
            .unwrap();
        let group = device
            .create_descriptor_group(&DescriptorGroupDesc { pool, layouts: vec![layout] })
            .unwrap();

        device.update_descriptor_group(
            group,
            &[DescriptorWrite {
                set: 0,
                binding: 0,
                array_element: 0,
                ty: DescriptorType::UniformBuffer,
                resource: DescriptorResource::Buffer { buffer, offset: 0, range: 256 },
            }],
        );
        assert_eq!(device.backend().descriptor_writes(&device.descriptor_group(group).raw), 1);

        // Pool holds a single group
        let second = device.create_descriptor_group(&DescriptorGroupDesc { pool, layouts: vec![layout] });
        assert!(second.is_err());

        device.delete_descriptor_group(group);
        device.create_descriptor_group(&DescriptorGroupDesc { pool, layouts: vec![layout] }).unwrap();
    }

    #[test]
    fn compute_pipeline_requires_a_compute_shader() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let vertex = shader(&mut device, ShaderStages::VERTEX);
        let compute = shader(&mut device, ShaderStages::COMPUTE);

        let wrong = PipelineDesc::Compute(ComputePipelineDesc {
            shader: vertex,
            descriptor_layouts: Vec::new(),
            push_constant_size: 0,
        });
        assert!(device.create_pipeline(&wrong).is_err());

        let right = PipelineDesc::Compute(ComputePipelineDesc {
            shader: compute,
            descriptor_layouts: Vec::new(),
            push_constant_size: 16,
        });
        let pipeline = device.create_pipeline(&right).unwrap();
        assert_eq!(device.pipeline(pipeline).bind_point(), PipelineBindPoint::Compute);
        assert_eq!(device.pipeline(pipeline).stages(), ShaderStages::COMPUTE);
    }

    #[test]
    fn pipeline_stages_are_the_union_of_its_modules() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let task = shader(&mut device, ShaderStages::TASK);
        let mesh = shader(&mut device, ShaderStages::MESH);
        let fragment = shader(&mut device, ShaderStages::FRAGMENT);

        let pipeline = device
            .create_pipeline(&PipelineDesc::Graphics(GraphicsPipelineDesc {
                shaders: vec![task, mesh, fragment],
                color_formats: vec![Format::B8G8R8A8Srgb],
                push_constant_size: 16,
                ..Default::default()
            }))
            .unwrap();
        for module in [task, mesh, fragment] {
            device.delete_shader_module(module);
        }
        assert_eq!(
            device.pipeline(pipeline).stages(),
            ShaderStages::TASK | ShaderStages::MESH | ShaderStages::FRAGMENT
        );
    }

    #[test]
    #[should_panic(expected = "image handle 0 is not live")]
    fn use_after_delete_panics() {
        let mut device = Device::new(HeadlessBackend::new(), PoolCapacities::default());
        let image = device.create_image(&ImageDesc::default()).unwrap();
        device.delete_image(image);
        device.image(image);
    }
}
