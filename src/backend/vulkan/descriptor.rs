// Descriptor pools, layouts and groups

use anyhow::{Context, Result};
use ash::vk;

use super::{convert, VulkanBackend};
use crate::backend::{ResolvedDescriptor, ResolvedDescriptorWrite};
use crate::rhi::types::*;

/// One descriptor set per layout, in layout order
pub struct VulkanDescriptorGroup {
    pub(super) sets: Vec<vk::DescriptorSet>,
}

impl VulkanDescriptorGroup {
    pub fn sets(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }
}

enum Info {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

impl VulkanBackend {
    /// Every set of every group comes out of `max_groups`
    pub(super) fn new_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> Result<vk::DescriptorPool> {
        let sizes: Vec<vk::DescriptorPoolSize> = desc
            .sizes
            .iter()
            .map(|&(ty, count)| vk::DescriptorPoolSize {
                ty: convert::descriptor_type(ty),
                descriptor_count: count,
            })
            .collect();

        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(desc.max_groups)
            .pool_sizes(&sizes);

        unsafe { self.device.create_descriptor_pool(&create_info, None) }.context("Failed to create descriptor pool")
    }

    pub(super) fn new_descriptor_layout(&self, desc: &DescriptorLayoutDesc) -> Result<vk::DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(b.binding)
                    .descriptor_type(convert::descriptor_type(b.ty))
                    .descriptor_count(b.count)
                    .stage_flags(convert::shader_stages(b.stages))
                    .build()
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        unsafe { self.device.create_descriptor_set_layout(&create_info, None) }
            .context("Failed to create descriptor set layout")
    }

    pub(super) fn allocate_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[&vk::DescriptorSetLayout],
    ) -> Result<VulkanDescriptorGroup> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = layouts.iter().map(|&&l| l).collect();
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info) }
            .context("Failed to allocate descriptor sets")?;
        Ok(VulkanDescriptorGroup { sets })
    }

    pub(super) fn free_sets(&self, pool: vk::DescriptorPool, group: VulkanDescriptorGroup) {
        if let Err(e) = unsafe { self.device.free_descriptor_sets(pool, &group.sets) } {
            log::error!("Failed to free descriptor sets: {:?}", e);
        }
    }

    pub(super) fn write_sets(&self, group: &VulkanDescriptorGroup, writes: &[ResolvedDescriptorWrite<'_, Self>]) {
        // Infos are collected first so the writes can point into a stable Vec
        let infos: Vec<Info> = writes
            .iter()
            .map(|w| match &w.resource {
                ResolvedDescriptor::Buffer { buffer, offset, range } => Info::Buffer(vk::DescriptorBufferInfo {
                    buffer: buffer.raw,
                    offset: *offset,
                    range: *range,
                }),
                ResolvedDescriptor::Image { image, layout, sampler } => Info::Image(vk::DescriptorImageInfo {
                    sampler: sampler.map_or(vk::Sampler::null(), |&s| s),
                    image_view: image.view,
                    image_layout: convert::image_layout(*layout),
                }),
                ResolvedDescriptor::Sampler(sampler) => Info::Image(vk::DescriptorImageInfo {
                    sampler: **sampler,
                    image_view: vk::ImageView::null(),
                    image_layout: vk::ImageLayout::UNDEFINED,
                }),
            })
            .collect();

        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .zip(&infos)
            .map(|(w, info)| {
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(group.sets[w.set as usize])
                    .dst_binding(w.binding)
                    .dst_array_element(w.array_element)
                    .descriptor_type(convert::descriptor_type(w.ty));
                match info {
                    Info::Buffer(b) => write.buffer_info(std::slice::from_ref(b)).build(),
                    Info::Image(i) => write.image_info(std::slice::from_ref(i)).build(),
                }
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) };
    }
}
