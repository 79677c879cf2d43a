// Pipelines - dynamic rendering, no render pass objects
//
// Viewport and scissor are always dynamic state so a pipeline survives
// swapchain rebuilds untouched.

use anyhow::{Context, Result};
use ash::vk;

use super::resources::VulkanShaderModule;
use super::{convert, VulkanBackend};
use crate::backend::ShaderStageRef;
use crate::rhi::types::*;

pub struct VulkanPipeline {
    pub(super) raw: vk::Pipeline,
    pub(super) layout: vk::PipelineLayout,
}

impl VulkanPipeline {
    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

fn stage_info(stage: &ShaderStageRef<'_, VulkanBackend>) -> vk::PipelineShaderStageCreateInfo {
    let module: &VulkanShaderModule = stage.module;
    vk::PipelineShaderStageCreateInfo::builder()
        .stage(convert::shader_stages(stage.desc.stage))
        .module(module.raw)
        .name(&module.entry_point)
        .build()
}

impl VulkanBackend {
    fn create_pipeline_layout(
        &self,
        layouts: &[&vk::DescriptorSetLayout],
        push_constant_size: u32,
        push_stages: vk::ShaderStageFlags,
    ) -> Result<vk::PipelineLayout> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = layouts.iter().map(|&&l| l).collect();
        let push_constant_ranges: Vec<vk::PushConstantRange> = if push_constant_size > 0 {
            vec![vk::PushConstantRange {
                stage_flags: push_stages,
                offset: 0,
                size: push_constant_size,
            }]
        } else {
            Vec::new()
        };

        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        unsafe { self.device.create_pipeline_layout(&layout_info, None) }.context("Failed to create pipeline layout")
    }

    pub(super) fn new_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc,
        stages: &[ShaderStageRef<'_, Self>],
        layouts: &[&vk::DescriptorSetLayout],
    ) -> Result<VulkanPipeline> {
        // Shader stages
        let shader_stages: Vec<_> = stages.iter().map(stage_info).collect();
        let push_stages = stages
            .iter()
            .fold(vk::ShaderStageFlags::empty(), |acc, s| acc | convert::shader_stages(s.desc.stage));

        // Vertex input
        let bindings: Vec<_> = desc
            .vertex_layout
            .bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: if b.per_instance {
                    vk::VertexInputRate::INSTANCE
                } else {
                    vk::VertexInputRate::VERTEX
                },
            })
            .collect();
        let attributes: Vec<_> = desc
            .vertex_layout
            .attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: convert::format(a.format),
                offset: a.offset,
            })
            .collect();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        // Input assembly
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(convert::topology(desc.topology))
            .primitive_restart_enable(false);

        // Viewport and scissor are set while recording
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        // Rasterization
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(convert::polygon_mode(desc.polygon_mode))
            .line_width(1.0)
            .cull_mode(convert::cull_mode(desc.cull_mode))
            .front_face(convert::front_face(desc.front_face))
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(desc.depth.test)
            .depth_write_enable(desc.depth.write)
            .depth_compare_op(convert::compare_op(desc.depth.compare))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        // Straight alpha blending when enabled, opaque otherwise
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(desc.blend)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build();
        let color_blend_attachments = vec![color_blend_attachment; desc.color_formats.len()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        // Attachment formats replace the render pass
        let color_formats: Vec<vk::Format> = desc.color_formats.iter().map(|&f| convert::format(f)).collect();
        let depth_format = desc.depth_format.unwrap_or(Format::Undefined);
        let stencil_format = if depth_format.has_stencil() {
            depth_format
        } else {
            Format::Undefined
        };
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(convert::format(depth_format))
            .stencil_attachment_format(convert::format(stencil_format));

        let pipeline_layout = self.create_pipeline_layout(layouts, desc.push_constant_size, push_stages)?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(pipeline_layout)
            .push_next(&mut rendering_info)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        match pipelines {
            Ok(pipelines) => Ok(VulkanPipeline {
                raw: pipelines[0],
                layout: pipeline_layout,
            }),
            Err((_, e)) => {
                unsafe { self.device.destroy_pipeline_layout(pipeline_layout, None) };
                Err(e).context("Failed to create graphics pipeline")
            }
        }
    }

    pub(super) fn new_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
        stage: ShaderStageRef<'_, Self>,
        layouts: &[&vk::DescriptorSetLayout],
    ) -> Result<VulkanPipeline> {
        let pipeline_layout =
            self.create_pipeline_layout(layouts, desc.push_constant_size, vk::ShaderStageFlags::COMPUTE)?;

        let pipeline_info = vk::ComputePipelineCreateInfo::builder()
            .stage(stage_info(&stage))
            .layout(pipeline_layout)
            .build();

        let pipelines = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        match pipelines {
            Ok(pipelines) => Ok(VulkanPipeline {
                raw: pipelines[0],
                layout: pipeline_layout,
            }),
            Err((_, e)) => {
                unsafe { self.device.destroy_pipeline_layout(pipeline_layout, None) };
                Err(e).context("Failed to create compute pipeline")
            }
        }
    }

    pub(super) fn release_pipeline(&self, pipeline: VulkanPipeline) {
        unsafe {
            self.device.destroy_pipeline(pipeline.raw, None);
            self.device.destroy_pipeline_layout(pipeline.layout, None);
        }
    }
}
