// Command recording - synchronization2 barriers, dynamic rendering, submission

use anyhow::{Context, Result};
use ash::vk;

use super::resources::VulkanImage;
use super::{convert, VulkanBackend};
use crate::backend::{ResolvedAttachment, ResolvedBarriers, ResolvedRendering, SemaphoreSubmit};
use crate::rhi::types::*;

fn attachment_info(attachment: &ResolvedAttachment<'_, VulkanBackend>) -> vk::RenderingAttachmentInfo {
    let image: &VulkanImage = attachment.image;
    let mut info = vk::RenderingAttachmentInfo::builder()
        .image_view(image.view)
        .image_layout(convert::image_layout(attachment.layout))
        .load_op(convert::load_op(attachment.load))
        .store_op(convert::store_op(attachment.store))
        .clear_value(convert::clear_value(attachment.clear));

    if let Some((target, layout, mode)) = attachment.resolve {
        info = info
            .resolve_mode(convert::resolve_mode(mode))
            .resolve_image_view(target.view)
            .resolve_image_layout(convert::image_layout(layout));
    }
    info.build()
}

impl VulkanBackend {
    /// Everything in `barriers` goes out as one `vkCmdPipelineBarrier2`
    pub(super) fn record_barriers(&self, cmd: vk::CommandBuffer, barriers: &ResolvedBarriers<'_, Self>) {
        let memory: Vec<vk::MemoryBarrier2> = barriers
            .memory
            .iter()
            .map(|b| {
                vk::MemoryBarrier2::builder()
                    .src_stage_mask(convert::stages(b.src_stages))
                    .src_access_mask(convert::access(b.src_access))
                    .dst_stage_mask(convert::stages(b.dst_stages))
                    .dst_access_mask(convert::access(b.dst_access))
                    .build()
            })
            .collect();

        let buffers: Vec<vk::BufferMemoryBarrier2> = barriers
            .buffers
            .iter()
            .map(|(buffer, b)| {
                vk::BufferMemoryBarrier2::builder()
                    .src_stage_mask(convert::stages(b.src_stages))
                    .src_access_mask(convert::access(b.src_access))
                    .dst_stage_mask(convert::stages(b.dst_stages))
                    .dst_access_mask(convert::access(b.dst_access))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(buffer.raw)
                    .offset(b.offset)
                    .size(b.size)
                    .build()
            })
            .collect();

        let images: Vec<vk::ImageMemoryBarrier2> = barriers
            .images
            .iter()
            .map(|(image, b)| {
                vk::ImageMemoryBarrier2::builder()
                    .src_stage_mask(convert::stages(b.src_stages))
                    .src_access_mask(convert::access(b.src_access))
                    .dst_stage_mask(convert::stages(b.dst_stages))
                    .dst_access_mask(convert::access(b.dst_access))
                    .old_layout(convert::image_layout(b.old_layout))
                    .new_layout(convert::image_layout(b.new_layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image.raw)
                    .subresource_range(convert::subresource_range(b.range))
                    .build()
            })
            .collect();

        let dependency_info = vk::DependencyInfo::builder()
            .memory_barriers(&memory)
            .buffer_memory_barriers(&buffers)
            .image_memory_barriers(&images);

        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dependency_info) };
    }

    pub(super) fn record_begin_rendering(&self, cmd: vk::CommandBuffer, rendering: &ResolvedRendering<'_, Self>) {
        let colors: Vec<vk::RenderingAttachmentInfo> = rendering.color.iter().map(attachment_info).collect();
        let depth = rendering.depth.as_ref().map(attachment_info);
        let stencil = rendering.stencil.as_ref().map(attachment_info);

        let mut info = vk::RenderingInfo::builder()
            .render_area(convert::rect2d(rendering.area))
            .layer_count(rendering.layers)
            .color_attachments(&colors);
        if let Some(depth) = depth.as_ref() {
            info = info.depth_attachment(depth);
        }
        if let Some(stencil) = stencil.as_ref() {
            info = info.stencil_attachment(stencil);
        }

        unsafe { self.device.cmd_begin_rendering(cmd, &info) };
    }

    /// Queue submission with timeline values. Binary semaphores carry a 0
    /// placeholder so the value arrays line up with the semaphore arrays.
    pub(super) fn submit_to_queue(
        &self,
        queue: QueueType,
        cmds: &[vk::CommandBuffer],
        waits: &[SemaphoreSubmit<'_, Self>],
        signals: &[SemaphoreSubmit<'_, Self>],
        fence: vk::Fence,
    ) -> Result<()> {
        let value = |s: &SemaphoreSubmit<'_, Self>| match s.kind {
            SemaphoreKind::Binary => 0,
            SemaphoreKind::Timeline => s.value,
        };

        let wait_semaphores: Vec<vk::Semaphore> = waits.iter().map(|w| *w.semaphore).collect();
        let wait_values: Vec<u64> = waits.iter().map(value).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = waits.iter().map(|w| convert::stages_legacy(w.stages)).collect();
        let signal_semaphores: Vec<vk::Semaphore> = signals.iter().map(|s| *s.semaphore).collect();
        let signal_values: Vec<u64> = signals.iter().map(value).collect();

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::builder()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(cmds)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info)
            .build();

        let queue = self.queue(queue);
        let _guard = self.queue_lock.lock();
        unsafe { self.device.queue_submit(queue, &[submit_info], fence) }.context("Failed to submit command buffers")
    }
}
