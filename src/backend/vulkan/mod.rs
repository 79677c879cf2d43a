// Vulkan backend
//
// Vulkan 1.3 with dynamic rendering, synchronization2 and timeline
// semaphores. Memory goes through gpu-allocator.

mod command;
pub mod convert;
mod descriptor;
mod device;
mod pipeline;
mod resources;
mod surface;
mod swapchain;

pub use descriptor::VulkanDescriptorGroup;
pub use pipeline::VulkanPipeline;
pub use resources::{VulkanBuffer, VulkanImage, VulkanShaderModule};

use anyhow::{Context, Result};
use ash::extensions::{ext, khr};
use ash::vk;
use gpu_allocator::vulkan::Allocator;
use parking_lot::Mutex;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use crate::backend::*;
use crate::rhi::types::*;

#[derive(Clone, Copy)]
struct Queue {
    raw: vk::Queue,
    family: u32,
}

pub struct VulkanBackend {
    // Dropped by hand, before the device
    allocator: ManuallyDrop<Mutex<Allocator>>,
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    instance: ash::Instance,
    entry: ash::Entry,

    // Graphics, compute, transfer
    queues: [Queue; 3],
    // Queue access must be externally synchronized
    queue_lock: Mutex<()>,

    surface_loader: khr::Surface,
    swapchain_loader: khr::Swapchain,
    mesh_shader: Option<ext::MeshShader>,

    debug_utils: ext::DebugUtils,
    messenger: Option<vk::DebugUtilsMessengerEXT>,

    adapter: AdapterInfo,
    properties: vk::PhysicalDeviceProperties,
}

impl VulkanBackend {
    fn queue(&self, queue: QueueType) -> vk::Queue {
        self.queues[queue as usize].raw
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn supports_mesh_shading(&self) -> bool {
        self.mesh_shader.is_some()
    }
}

fn wait_result(result: ash::prelude::VkResult<()>, what: &str) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(vk::Result::TIMEOUT) => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to wait for {}", what)),
    }
}

impl Backend for VulkanBackend {
    type Surface = vk::SurfaceKHR;
    type Buffer = VulkanBuffer;
    type Image = VulkanImage;
    type Sampler = vk::Sampler;
    type ShaderModule = VulkanShaderModule;
    type Pipeline = VulkanPipeline;
    type DescriptorPool = vk::DescriptorPool;
    type DescriptorLayout = vk::DescriptorSetLayout;
    type DescriptorGroup = VulkanDescriptorGroup;
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type Event = vk::Event;
    type CommandAllocator = vk::CommandPool;
    type CommandBuffer = vk::CommandBuffer;
    type SwapChain = vk::SwapchainKHR;

    fn name(&self) -> &'static str {
        "vulkan"
    }

    fn adapter_info(&self) -> AdapterInfo {
        self.adapter.clone()
    }

    fn queue_family(&self, queue: QueueType) -> u32 {
        self.queues[queue as usize].family
    }

    fn wait_idle(&self) -> Result<()> {
        let _guard = self.queue_lock.lock();
        unsafe { self.device.device_wait_idle() }.context("device_wait_idle failed")
    }

    // =========================================================================
    // MEMORY
    // =========================================================================

    fn create_buffer(&self, desc: &BufferDesc, memory: MemoryStrategy) -> Result<Self::Buffer> {
        self.new_buffer(desc, memory)
    }

    fn destroy_buffer(&self, buffer: Self::Buffer) {
        self.release_buffer(buffer);
    }

    fn map_buffer(&self, buffer: &mut Self::Buffer) -> Result<NonNull<u8>> {
        self.mapped_ptr(buffer)
    }

    fn unmap_buffer(&self, _buffer: &mut Self::Buffer) {
        // Persistently mapped
    }

    fn create_image(&self, desc: &ImageDesc, memory: MemoryStrategy) -> Result<(Self::Image, u64)> {
        self.new_image(desc, memory)
    }

    fn destroy_image(&self, image: Self::Image) {
        self.release_image(image);
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Self::Sampler> {
        self.new_sampler(desc)
    }

    fn destroy_sampler(&self, sampler: Self::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    // =========================================================================
    // PIPELINES
    // =========================================================================

    fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<Self::ShaderModule> {
        self.new_shader_module(desc)
    }

    fn destroy_shader_module(&self, module: Self::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module.raw, None) };
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
        stages: &[ShaderStageRef<'_, Self>],
        layouts: &[&Self::DescriptorLayout],
    ) -> Result<Self::Pipeline> {
        self.new_graphics_pipeline(desc, stages, layouts)
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
        stage: ShaderStageRef<'_, Self>,
        layouts: &[&Self::DescriptorLayout],
    ) -> Result<Self::Pipeline> {
        self.new_compute_pipeline(desc, stage, layouts)
    }

    fn create_ray_tracing_pipeline(
        &self,
        _desc: &RayTracingPipelineDesc,
        _stages: &[ShaderStageRef<'_, Self>],
        _layouts: &[&Self::DescriptorLayout],
    ) -> Result<Self::Pipeline> {
        anyhow::bail!("Ray tracing pipelines are not supported by the Vulkan backend yet")
    }

    fn destroy_pipeline(&self, pipeline: Self::Pipeline) {
        self.release_pipeline(pipeline);
    }

    // =========================================================================
    // DESCRIPTORS
    // =========================================================================

    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> Result<Self::DescriptorPool> {
        self.new_descriptor_pool(desc)
    }

    fn destroy_descriptor_pool(&self, pool: Self::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn create_descriptor_layout(&self, desc: &DescriptorLayoutDesc) -> Result<Self::DescriptorLayout> {
        self.new_descriptor_layout(desc)
    }

    fn destroy_descriptor_layout(&self, layout: Self::DescriptorLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn allocate_descriptor_group(
        &self,
        pool: &Self::DescriptorPool,
        layouts: &[&Self::DescriptorLayout],
    ) -> Result<Self::DescriptorGroup> {
        self.allocate_sets(*pool, layouts)
    }

    fn free_descriptor_group(&self, pool: &Self::DescriptorPool, group: Self::DescriptorGroup) {
        self.free_sets(*pool, group);
    }

    fn write_descriptor_group(&self, group: &Self::DescriptorGroup, writes: &[ResolvedDescriptorWrite<'_, Self>]) {
        self.write_sets(group, writes);
    }

    // =========================================================================
    // SYNC OBJECTS
    // =========================================================================

    fn create_fence(&self, signalled: bool) -> Result<Self::Fence> {
        let flags = if signalled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&create_info, None) }.context("Failed to create fence")
    }

    fn destroy_fence(&self, fence: Self::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn fence_status(&self, fence: &Self::Fence) -> Result<bool> {
        unsafe { self.device.get_fence_status(*fence) }.context("Failed to query fence")
    }

    fn wait_for_fence(&self, fence: &Self::Fence, timeout_ns: u64) -> Result<bool> {
        wait_result(unsafe { self.device.wait_for_fences(&[*fence], true, timeout_ns) }, "fence")
    }

    fn reset_fence(&self, fence: &Self::Fence) -> Result<()> {
        unsafe { self.device.reset_fences(&[*fence]) }.context("Failed to reset fence")
    }

    fn create_semaphore(&self, kind: SemaphoreKind, initial_value: u64) -> Result<Self::Semaphore> {
        let semaphore_type = match kind {
            SemaphoreKind::Binary => vk::SemaphoreType::BINARY,
            SemaphoreKind::Timeline => vk::SemaphoreType::TIMELINE,
        };
        let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(semaphore_type)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info);
        unsafe { self.device.create_semaphore(&create_info, None) }.context("Failed to create semaphore")
    }

    fn destroy_semaphore(&self, semaphore: Self::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn semaphore_value(&self, semaphore: &Self::Semaphore) -> Result<u64> {
        unsafe { self.device.get_semaphore_counter_value(*semaphore) }.context("Failed to read semaphore value")
    }

    fn signal_semaphore(&self, semaphore: &Self::Semaphore, value: u64) -> Result<()> {
        let signal_info = vk::SemaphoreSignalInfo::builder().semaphore(*semaphore).value(value);
        unsafe { self.device.signal_semaphore(&signal_info) }.context("Failed to signal semaphore")
    }

    fn wait_for_semaphore(&self, semaphore: &Self::Semaphore, value: u64, timeout_ns: u64) -> Result<bool> {
        let semaphores = [*semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);
        wait_result(unsafe { self.device.wait_semaphores(&wait_info, timeout_ns) }, "semaphore")
    }

    fn create_event(&self) -> Result<Self::Event> {
        let create_info = vk::EventCreateInfo::builder();
        unsafe { self.device.create_event(&create_info, None) }.context("Failed to create event")
    }

    fn destroy_event(&self, event: Self::Event) {
        unsafe { self.device.destroy_event(event, None) };
    }

    fn set_event(&self, event: &Self::Event) -> Result<()> {
        unsafe { self.device.set_event(*event) }.context("Failed to set event")
    }

    fn reset_event(&self, event: &Self::Event) -> Result<()> {
        unsafe { self.device.reset_event(*event) }.context("Failed to reset event")
    }

    fn event_status(&self, event: &Self::Event) -> Result<bool> {
        unsafe { self.device.get_event_status(*event) }.context("Failed to query event")
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    fn create_command_allocator(&self, queue_family: u32) -> Result<Self::CommandAllocator> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        unsafe { self.device.create_command_pool(&create_info, None) }.context("Failed to create command pool")
    }

    fn destroy_command_allocator(&self, allocator: Self::CommandAllocator) {
        unsafe { self.device.destroy_command_pool(allocator, None) };
    }

    fn allocate_command_buffer(&self, allocator: &Self::CommandAllocator) -> Result<Self::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(*allocator)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&allocate_info) }
            .context("Failed to allocate command buffer")?;
        buffers.into_iter().next().context("Driver returned no command buffer")
    }

    fn free_command_buffer(&self, allocator: &Self::CommandAllocator, cmd: Self::CommandBuffer) {
        unsafe { self.device.free_command_buffers(*allocator, &[cmd]) };
    }

    fn begin_command_buffer(&self, cmd: &mut Self::CommandBuffer, usage: CommandListUsage) -> Result<()> {
        let mut flags = vk::CommandBufferUsageFlags::empty();
        if usage.contains(CommandListUsage::ONE_TIME_SUBMIT) {
            flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
        }
        if usage.contains(CommandListUsage::SIMULTANEOUS_USE) {
            flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
        }
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { self.device.begin_command_buffer(*cmd, &begin_info) }.context("Failed to begin command buffer")
    }

    fn end_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<()> {
        unsafe { self.device.end_command_buffer(*cmd) }.context("Failed to end command buffer")
    }

    fn reset_command_buffer(&self, cmd: &mut Self::CommandBuffer, release_resources: bool) -> Result<()> {
        let flags = if release_resources {
            vk::CommandBufferResetFlags::RELEASE_RESOURCES
        } else {
            vk::CommandBufferResetFlags::empty()
        };
        unsafe { self.device.reset_command_buffer(*cmd, flags) }.context("Failed to reset command buffer")
    }

    fn cmd_clear_color_image(
        &self,
        cmd: &mut Self::CommandBuffer,
        image: &Self::Image,
        layout: ImageLayout,
        color: [f32; 4],
        range: SubresourceRange,
    ) {
        let clear = vk::ClearColorValue { float32: color };
        unsafe {
            self.device.cmd_clear_color_image(
                *cmd,
                image.raw,
                convert::image_layout(layout),
                &clear,
                &[convert::subresource_range(range)],
            )
        };
    }

    fn cmd_clear_depth_stencil_image(
        &self,
        cmd: &mut Self::CommandBuffer,
        image: &Self::Image,
        layout: ImageLayout,
        value: ClearDepthStencil,
        range: SubresourceRange,
    ) {
        let clear = vk::ClearDepthStencilValue {
            depth: value.depth,
            stencil: value.stencil,
        };
        unsafe {
            self.device.cmd_clear_depth_stencil_image(
                *cmd,
                image.raw,
                convert::image_layout(layout),
                &clear,
                &[convert::subresource_range(range)],
            )
        };
    }

    fn cmd_begin_rendering(&self, cmd: &mut Self::CommandBuffer, info: &ResolvedRendering<'_, Self>) {
        self.record_begin_rendering(*cmd, info);
    }

    fn cmd_end_rendering(&self, cmd: &mut Self::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(*cmd) };
    }

    fn cmd_pipeline_barrier(&self, cmd: &mut Self::CommandBuffer, barriers: &ResolvedBarriers<'_, Self>) {
        self.record_barriers(*cmd, barriers);
    }

    fn cmd_copy_buffer(&self, cmd: &mut Self::CommandBuffer, src: &Self::Buffer, dst: &Self::Buffer, regions: &[BufferCopy]) {
        let regions: Vec<vk::BufferCopy> = regions
            .iter()
            .map(|r| vk::BufferCopy {
                src_offset: r.src_offset,
                dst_offset: r.dst_offset,
                size: r.size,
            })
            .collect();
        unsafe { self.device.cmd_copy_buffer(*cmd, src.raw, dst.raw, &regions) };
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: &mut Self::CommandBuffer,
        src: &Self::Buffer,
        dst: &Self::Image,
        dst_layout: ImageLayout,
        regions: &[BufferImageCopy],
    ) {
        let regions: Vec<vk::BufferImageCopy> = regions.iter().map(convert::buffer_image_copy).collect();
        unsafe {
            self.device
                .cmd_copy_buffer_to_image(*cmd, src.raw, dst.raw, convert::image_layout(dst_layout), &regions)
        };
    }

    fn cmd_copy_image_to_buffer(
        &self,
        cmd: &mut Self::CommandBuffer,
        src: &Self::Image,
        src_layout: ImageLayout,
        dst: &Self::Buffer,
        regions: &[BufferImageCopy],
    ) {
        let regions: Vec<vk::BufferImageCopy> = regions.iter().map(convert::buffer_image_copy).collect();
        unsafe {
            self.device
                .cmd_copy_image_to_buffer(*cmd, src.raw, convert::image_layout(src_layout), dst.raw, &regions)
        };
    }

    fn cmd_copy_image(
        &self,
        cmd: &mut Self::CommandBuffer,
        src: &Self::Image,
        src_layout: ImageLayout,
        dst: &Self::Image,
        dst_layout: ImageLayout,
        regions: &[ImageCopy],
    ) {
        let regions: Vec<vk::ImageCopy> = regions
            .iter()
            .map(|r| vk::ImageCopy {
                src_subresource: convert::subresource_layers(r.src_subresource),
                src_offset: convert::offset3d(r.src_offset),
                dst_subresource: convert::subresource_layers(r.dst_subresource),
                dst_offset: convert::offset3d(r.dst_offset),
                extent: convert::extent3d(r.extent),
            })
            .collect();
        unsafe {
            self.device.cmd_copy_image(
                *cmd,
                src.raw,
                convert::image_layout(src_layout),
                dst.raw,
                convert::image_layout(dst_layout),
                &regions,
            )
        };
    }

    fn cmd_bind_pipeline(&self, cmd: &mut Self::CommandBuffer, bind_point: PipelineBindPoint, pipeline: &Self::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(*cmd, convert::bind_point(bind_point), pipeline.raw)
        };
    }

    fn cmd_bind_vertex_buffers(&self, cmd: &mut Self::CommandBuffer, first_binding: u32, buffers: &[(&Self::Buffer, u64)]) {
        let raw: Vec<vk::Buffer> = buffers.iter().map(|(b, _)| b.raw).collect();
        let offsets: Vec<u64> = buffers.iter().map(|&(_, offset)| offset).collect();
        unsafe { self.device.cmd_bind_vertex_buffers(*cmd, first_binding, &raw, &offsets) };
    }

    fn cmd_bind_index_buffer(&self, cmd: &mut Self::CommandBuffer, buffer: &Self::Buffer, offset: u64, index_type: IndexType) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(*cmd, buffer.raw, offset, convert::index_type(index_type))
        };
    }

    fn cmd_bind_descriptor_group(
        &self,
        cmd: &mut Self::CommandBuffer,
        bind_point: PipelineBindPoint,
        pipeline: &Self::Pipeline,
        first_set: u32,
        group: &Self::DescriptorGroup,
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                *cmd,
                convert::bind_point(bind_point),
                pipeline.layout,
                first_set,
                group.sets(),
                &[],
            )
        };
    }

    fn cmd_push_constants(
        &self,
        cmd: &mut Self::CommandBuffer,
        pipeline: &Self::Pipeline,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(*cmd, pipeline.layout, convert::shader_stages(stages), offset, data)
        };
    }

    fn cmd_set_viewport(&self, cmd: &mut Self::CommandBuffer, viewport: Viewport) {
        let viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.device.cmd_set_viewport(*cmd, 0, &[viewport]) };
    }

    fn cmd_set_scissor(&self, cmd: &mut Self::CommandBuffer, scissor: Rect2D) {
        unsafe { self.device.cmd_set_scissor(*cmd, 0, &[convert::rect2d(scissor)]) };
    }

    fn cmd_draw(&self, cmd: &mut Self::CommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device
                .cmd_draw(*cmd, vertex_count, instance_count, first_vertex, first_instance)
        };
    }

    fn cmd_draw_indexed(
        &self,
        cmd: &mut Self::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                *cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    fn cmd_draw_mesh_tasks(&self, cmd: &mut Self::CommandBuffer, x: u32, y: u32, z: u32) {
        match &self.mesh_shader {
            Some(mesh_shader) => unsafe { mesh_shader.cmd_draw_mesh_tasks(*cmd, x, y, z) },
            None => log::error!("draw_mesh_tasks recorded but VK_EXT_mesh_shader is not enabled"),
        }
    }

    fn cmd_dispatch(&self, cmd: &mut Self::CommandBuffer, x: u32, y: u32, z: u32) {
        unsafe { self.device.cmd_dispatch(*cmd, x, y, z) };
    }

    fn cmd_set_event(&self, cmd: &mut Self::CommandBuffer, event: &Self::Event, stages: PipelineStages) {
        let barrier = vk::MemoryBarrier2::builder()
            .src_stage_mask(convert::stages(stages))
            .build();
        let dependency_info = vk::DependencyInfo::builder().memory_barriers(std::slice::from_ref(&barrier));
        unsafe { self.device.cmd_set_event2(*cmd, *event, &dependency_info) };
    }

    fn cmd_reset_event(&self, cmd: &mut Self::CommandBuffer, event: &Self::Event, stages: PipelineStages) {
        unsafe { self.device.cmd_reset_event2(*cmd, *event, convert::stages(stages)) };
    }

    fn submit(
        &self,
        queue: QueueType,
        cmds: &[&Self::CommandBuffer],
        waits: &[SemaphoreSubmit<'_, Self>],
        signals: &[SemaphoreSubmit<'_, Self>],
        fence: Option<&Self::Fence>,
    ) -> Result<()> {
        let cmds: Vec<vk::CommandBuffer> = cmds.iter().map(|&&c| c).collect();
        let fence = fence.copied().unwrap_or_else(vk::Fence::null);
        self.submit_to_queue(queue, &cmds, waits, signals, fence)
    }

    // =========================================================================
    // SWAPCHAIN
    // =========================================================================

    fn create_swapchain(
        &self,
        surface: &Self::Surface,
        desc: &SwapChainDesc,
        old: Option<&Self::SwapChain>,
    ) -> Result<NativeSwapChain<Self>> {
        self.new_swapchain(*surface, desc, old.copied().unwrap_or_else(vk::SwapchainKHR::null))
    }

    fn destroy_swapchain(&self, swapchain: Self::SwapChain) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn destroy_surface(&self, surface: Self::Surface) {
        unsafe { self.surface_loader.destroy_surface(surface, None) };
    }

    fn acquire_next_image(
        &self,
        swapchain: &Self::SwapChain,
        semaphore: &Self::Semaphore,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome> {
        self.acquire(*swapchain, *semaphore, timeout_ns)
    }

    fn present(
        &self,
        queue: QueueType,
        swapchain: &Self::SwapChain,
        image_index: u32,
        waits: &[&Self::Semaphore],
    ) -> Result<PresentOutcome> {
        let waits: Vec<vk::Semaphore> = waits.iter().map(|&&s| s).collect();
        self.present_image(self.queue(queue), *swapchain, image_index, &waits)
    }
}
