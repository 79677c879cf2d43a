// Backend module - native API abstraction
//
// Design: one trait, selected at compile time. Every RHI object is generic
// over `B: Backend`, so calls dispatch statically with no virtual resource
// classes. The trait is deliberately thin: handles are already resolved to
// native objects by the Device before a backend sees them.

pub mod headless;
#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use headless::HeadlessBackend;
#[cfg(feature = "vulkan")]
pub use vulkan::VulkanBackend;

use anyhow::Result;
use std::ptr::NonNull;

use crate::rhi::barrier::{BufferBarrier, ImageBarrier, MemoryBarrier};
use crate::rhi::types::*;

/// Adapter facts the Device uses to pick memory strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub discrete: bool,
    /// Property flags of each memory type, indexed by memory type index
    pub memory_types: Vec<MemoryProperties>,
}

/// Concrete placement chosen by the Device for a buffer or image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStrategy {
    pub properties: MemoryProperties,
    pub memory_type: u32,
}

pub struct ShaderStageRef<'a, B: Backend> {
    pub module: &'a B::ShaderModule,
    pub desc: &'a ShaderModuleDesc,
}

pub enum ResolvedDescriptor<'a, B: Backend> {
    Buffer { buffer: &'a B::Buffer, offset: u64, range: u64 },
    Image { image: &'a B::Image, layout: ImageLayout, sampler: Option<&'a B::Sampler> },
    Sampler(&'a B::Sampler),
}

pub struct ResolvedDescriptorWrite<'a, B: Backend> {
    pub set: u32,
    pub binding: u32,
    pub array_element: u32,
    pub ty: DescriptorType,
    pub resource: ResolvedDescriptor<'a, B>,
}

/// One `add_barriers` call with handles resolved. Backends must emit it as
/// a single native dependency.
pub struct ResolvedBarriers<'a, B: Backend> {
    pub memory: &'a [MemoryBarrier],
    pub buffers: Vec<(&'a B::Buffer, &'a BufferBarrier)>,
    pub images: Vec<(&'a B::Image, &'a ImageBarrier)>,
}

pub struct ResolvedAttachment<'a, B: Backend> {
    pub image: &'a B::Image,
    pub layout: ImageLayout,
    pub load: LoadOp,
    pub store: StoreOp,
    pub clear: ClearValue,
    pub resolve: Option<(&'a B::Image, ImageLayout, ResolveMode)>,
}

pub struct ResolvedRendering<'a, B: Backend> {
    pub area: Rect2D,
    pub layers: u32,
    pub color: Vec<ResolvedAttachment<'a, B>>,
    pub depth: Option<ResolvedAttachment<'a, B>>,
    pub stencil: Option<ResolvedAttachment<'a, B>>,
}

pub struct SemaphoreSubmit<'a, B: Backend> {
    pub semaphore: &'a B::Semaphore,
    pub kind: SemaphoreKind,
    /// Ignored for binary semaphores
    pub value: u64,
    /// Only meaningful for waits
    pub stages: PipelineStages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(u32),
    Suboptimal(u32),
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

pub struct NativeSwapChain<B: Backend> {
    pub raw: B::SwapChain,
    pub images: Vec<B::Image>,
    pub format: Format,
    pub extent: Extent2D,
}

pub trait Backend: Sized {
    type Surface;
    type Buffer;
    type Image;
    type Sampler;
    type ShaderModule;
    type Pipeline;
    type DescriptorPool;
    type DescriptorLayout;
    type DescriptorGroup;
    type Fence;
    type Semaphore;
    type Event;
    type CommandAllocator;
    type CommandBuffer;
    type SwapChain;

    fn name(&self) -> &'static str;
    fn adapter_info(&self) -> AdapterInfo;
    fn queue_family(&self, queue: QueueType) -> u32;
    fn wait_idle(&self) -> Result<()>;

    // ---------------------------------------------------------------- memory
    fn create_buffer(&self, desc: &BufferDesc, memory: MemoryStrategy) -> Result<Self::Buffer>;
    fn destroy_buffer(&self, buffer: Self::Buffer);
    /// Pointer stays valid until `unmap_buffer`
    fn map_buffer(&self, buffer: &mut Self::Buffer) -> Result<NonNull<u8>>;
    fn unmap_buffer(&self, buffer: &mut Self::Buffer);

    /// Returns the image and the number of bytes allocated for it
    fn create_image(&self, desc: &ImageDesc, memory: MemoryStrategy) -> Result<(Self::Image, u64)>;
    fn destroy_image(&self, image: Self::Image);

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Self::Sampler>;
    fn destroy_sampler(&self, sampler: Self::Sampler);

    // ------------------------------------------------------------- pipelines
    fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<Self::ShaderModule>;
    fn destroy_shader_module(&self, module: Self::ShaderModule);

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
        stages: &[ShaderStageRef<'_, Self>],
        layouts: &[&Self::DescriptorLayout],
    ) -> Result<Self::Pipeline>;
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
        stage: ShaderStageRef<'_, Self>,
        layouts: &[&Self::DescriptorLayout],
    ) -> Result<Self::Pipeline>;
    fn create_ray_tracing_pipeline(
        &self,
        desc: &RayTracingPipelineDesc,
        stages: &[ShaderStageRef<'_, Self>],
        layouts: &[&Self::DescriptorLayout],
    ) -> Result<Self::Pipeline>;
    fn destroy_pipeline(&self, pipeline: Self::Pipeline);

    // ----------------------------------------------------------- descriptors
    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> Result<Self::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: Self::DescriptorPool);
    fn create_descriptor_layout(&self, desc: &DescriptorLayoutDesc) -> Result<Self::DescriptorLayout>;
    fn destroy_descriptor_layout(&self, layout: Self::DescriptorLayout);
    fn allocate_descriptor_group(
        &self,
        pool: &Self::DescriptorPool,
        layouts: &[&Self::DescriptorLayout],
    ) -> Result<Self::DescriptorGroup>;
    fn free_descriptor_group(&self, pool: &Self::DescriptorPool, group: Self::DescriptorGroup);
    fn write_descriptor_group(&self, group: &Self::DescriptorGroup, writes: &[ResolvedDescriptorWrite<'_, Self>]);

    // ---------------------------------------------------------- sync objects
    fn create_fence(&self, signalled: bool) -> Result<Self::Fence>;
    fn destroy_fence(&self, fence: Self::Fence);
    fn fence_status(&self, fence: &Self::Fence) -> Result<bool>;
    /// `Ok(false)` on timeout
    fn wait_for_fence(&self, fence: &Self::Fence, timeout_ns: u64) -> Result<bool>;
    fn reset_fence(&self, fence: &Self::Fence) -> Result<()>;

    fn create_semaphore(&self, kind: SemaphoreKind, initial_value: u64) -> Result<Self::Semaphore>;
    fn destroy_semaphore(&self, semaphore: Self::Semaphore);
    fn semaphore_value(&self, semaphore: &Self::Semaphore) -> Result<u64>;
    fn signal_semaphore(&self, semaphore: &Self::Semaphore, value: u64) -> Result<()>;
    /// `Ok(false)` on timeout
    fn wait_for_semaphore(&self, semaphore: &Self::Semaphore, value: u64, timeout_ns: u64) -> Result<bool>;

    fn create_event(&self) -> Result<Self::Event>;
    fn destroy_event(&self, event: Self::Event);
    fn set_event(&self, event: &Self::Event) -> Result<()>;
    fn reset_event(&self, event: &Self::Event) -> Result<()>;
    fn event_status(&self, event: &Self::Event) -> Result<bool>;

    // -------------------------------------------------------------- commands
    fn create_command_allocator(&self, queue_family: u32) -> Result<Self::CommandAllocator>;
    fn destroy_command_allocator(&self, allocator: Self::CommandAllocator);
    fn allocate_command_buffer(&self, allocator: &Self::CommandAllocator) -> Result<Self::CommandBuffer>;
    fn free_command_buffer(&self, allocator: &Self::CommandAllocator, cmd: Self::CommandBuffer);

    fn begin_command_buffer(&self, cmd: &mut Self::CommandBuffer, usage: CommandListUsage) -> Result<()>;
    fn end_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<()>;
    fn reset_command_buffer(&self, cmd: &mut Self::CommandBuffer, release_resources: bool) -> Result<()>;

    fn cmd_clear_color_image(
        &self,
        cmd: &mut Self::CommandBuffer,
        image: &Self::Image,
        layout: ImageLayout,
        color: [f32; 4],
        range: SubresourceRange,
    );
    fn cmd_clear_depth_stencil_image(
        &self,
        cmd: &mut Self::CommandBuffer,
        image: &Self::Image,
        layout: ImageLayout,
        value: ClearDepthStencil,
        range: SubresourceRange,
    );
    fn cmd_begin_rendering(&self, cmd: &mut Self::CommandBuffer, info: &ResolvedRendering<'_, Self>);
    fn cmd_end_rendering(&self, cmd: &mut Self::CommandBuffer);
    fn cmd_pipeline_barrier(&self, cmd: &mut Self::CommandBuffer, barriers: &ResolvedBarriers<'_, Self>);

    fn cmd_copy_buffer(&self, cmd: &mut Self::CommandBuffer, src: &Self::Buffer, dst: &Self::Buffer, regions: &[BufferCopy]);
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: &mut Self::CommandBuffer,
        src: &Self::Buffer,
        dst: &Self::Image,
        dst_layout: ImageLayout,
        regions: &[BufferImageCopy],
    );
    fn cmd_copy_image_to_buffer(
        &self,
        cmd: &mut Self::CommandBuffer,
        src: &Self::Image,
        src_layout: ImageLayout,
        dst: &Self::Buffer,
        regions: &[BufferImageCopy],
    );
    fn cmd_copy_image(
        &self,
        cmd: &mut Self::CommandBuffer,
        src: &Self::Image,
        src_layout: ImageLayout,
        dst: &Self::Image,
        dst_layout: ImageLayout,
        regions: &[ImageCopy],
    );

    fn cmd_bind_pipeline(&self, cmd: &mut Self::CommandBuffer, bind_point: PipelineBindPoint, pipeline: &Self::Pipeline);
    fn cmd_bind_vertex_buffers(&self, cmd: &mut Self::CommandBuffer, first_binding: u32, buffers: &[(&Self::Buffer, u64)]);
    fn cmd_bind_index_buffer(&self, cmd: &mut Self::CommandBuffer, buffer: &Self::Buffer, offset: u64, index_type: IndexType);
    fn cmd_bind_descriptor_group(
        &self,
        cmd: &mut Self::CommandBuffer,
        bind_point: PipelineBindPoint,
        pipeline: &Self::Pipeline,
        first_set: u32,
        group: &Self::DescriptorGroup,
    );
    fn cmd_push_constants(
        &self,
        cmd: &mut Self::CommandBuffer,
        pipeline: &Self::Pipeline,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    );
    fn cmd_set_viewport(&self, cmd: &mut Self::CommandBuffer, viewport: Viewport);
    fn cmd_set_scissor(&self, cmd: &mut Self::CommandBuffer, scissor: Rect2D);

    fn cmd_draw(&self, cmd: &mut Self::CommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn cmd_draw_indexed(
        &self,
        cmd: &mut Self::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_draw_mesh_tasks(&self, cmd: &mut Self::CommandBuffer, x: u32, y: u32, z: u32);
    fn cmd_dispatch(&self, cmd: &mut Self::CommandBuffer, x: u32, y: u32, z: u32);

    fn cmd_set_event(&self, cmd: &mut Self::CommandBuffer, event: &Self::Event, stages: PipelineStages);
    fn cmd_reset_event(&self, cmd: &mut Self::CommandBuffer, event: &Self::Event, stages: PipelineStages);

    fn submit(
        &self,
        queue: QueueType,
        cmds: &[&Self::CommandBuffer],
        waits: &[SemaphoreSubmit<'_, Self>],
        signals: &[SemaphoreSubmit<'_, Self>],
        fence: Option<&Self::Fence>,
    ) -> Result<()>;

    // ------------------------------------------------------------- swapchain
    fn create_swapchain(
        &self,
        surface: &Self::Surface,
        desc: &SwapChainDesc,
        old: Option<&Self::SwapChain>,
    ) -> Result<NativeSwapChain<Self>>;
    fn destroy_swapchain(&self, swapchain: Self::SwapChain);
    fn destroy_surface(&self, surface: Self::Surface);
    fn acquire_next_image(
        &self,
        swapchain: &Self::SwapChain,
        semaphore: &Self::Semaphore,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome>;
    fn present(
        &self,
        queue: QueueType,
        swapchain: &Self::SwapChain,
        image_index: u32,
        waits: &[&Self::Semaphore],
    ) -> Result<PresentOutcome>;
}
