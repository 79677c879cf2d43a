// Conversions from RHI types to Vulkan values

use ash::vk;

use crate::rhi::types::*;

pub fn format(format: Format) -> vk::Format {
    match format {
        Format::Undefined => vk::Format::UNDEFINED,
        Format::R8Unorm => vk::Format::R8_UNORM,
        Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
        Format::R16G16B16A16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
        Format::R32Sfloat => vk::Format::R32_SFLOAT,
        Format::R32G32Sfloat => vk::Format::R32G32_SFLOAT,
        Format::R32G32B32Sfloat => vk::Format::R32G32B32_SFLOAT,
        Format::R32G32B32A32Sfloat => vk::Format::R32G32B32A32_SFLOAT,
        Format::D32Sfloat => vk::Format::D32_SFLOAT,
        Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        Format::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Formats the RHI does not name come back as Undefined
pub fn format_from_vk(format: vk::Format) -> Format {
    match format {
        vk::Format::R8_UNORM => Format::R8Unorm,
        vk::Format::R8G8B8A8_UNORM => Format::R8G8B8A8Unorm,
        vk::Format::R8G8B8A8_SRGB => Format::R8G8B8A8Srgb,
        vk::Format::B8G8R8A8_UNORM => Format::B8G8R8A8Unorm,
        vk::Format::B8G8R8A8_SRGB => Format::B8G8R8A8Srgb,
        vk::Format::R16G16B16A16_SFLOAT => Format::R16G16B16A16Sfloat,
        vk::Format::R32_SFLOAT => Format::R32Sfloat,
        vk::Format::R32G32_SFLOAT => Format::R32G32Sfloat,
        vk::Format::R32G32B32_SFLOAT => Format::R32G32B32Sfloat,
        vk::Format::R32G32B32A32_SFLOAT => Format::R32G32B32A32Sfloat,
        vk::Format::D32_SFLOAT => Format::D32Sfloat,
        vk::Format::D24_UNORM_S8_UINT => Format::D24UnormS8Uint,
        vk::Format::D32_SFLOAT_S8_UINT => Format::D32SfloatS8Uint,
        _ => Format::Undefined,
    }
}

pub fn image_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    for (ours, theirs) in [
        (BufferUsage::TRANSFER_SRC, vk::BufferUsageFlags::TRANSFER_SRC),
        (BufferUsage::TRANSFER_DST, vk::BufferUsageFlags::TRANSFER_DST),
        (BufferUsage::UNIFORM, vk::BufferUsageFlags::UNIFORM_BUFFER),
        (BufferUsage::STORAGE, vk::BufferUsageFlags::STORAGE_BUFFER),
        (BufferUsage::INDEX, vk::BufferUsageFlags::INDEX_BUFFER),
        (BufferUsage::VERTEX, vk::BufferUsageFlags::VERTEX_BUFFER),
        (BufferUsage::INDIRECT, vk::BufferUsageFlags::INDIRECT_BUFFER),
    ] {
        if usage.contains(ours) {
            flags |= theirs;
        }
    }
    flags
}

pub fn image_usage(usage: ImageUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    for (ours, theirs) in [
        (ImageUsage::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
        (ImageUsage::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
        (ImageUsage::SAMPLED, vk::ImageUsageFlags::SAMPLED),
        (ImageUsage::STORAGE, vk::ImageUsageFlags::STORAGE),
        (ImageUsage::COLOR_ATTACHMENT, vk::ImageUsageFlags::COLOR_ATTACHMENT),
        (ImageUsage::DEPTH_STENCIL_ATTACHMENT, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
    ] {
        if usage.contains(ours) {
            flags |= theirs;
        }
    }
    flags
}

pub fn access(access: AccessFlags) -> vk::AccessFlags2 {
    let mut flags = vk::AccessFlags2::empty();
    for (ours, theirs) in [
        (AccessFlags::INDIRECT_COMMAND_READ, vk::AccessFlags2::INDIRECT_COMMAND_READ),
        (AccessFlags::INDEX_READ, vk::AccessFlags2::INDEX_READ),
        (AccessFlags::VERTEX_ATTRIBUTE_READ, vk::AccessFlags2::VERTEX_ATTRIBUTE_READ),
        (AccessFlags::UNIFORM_READ, vk::AccessFlags2::UNIFORM_READ),
        (AccessFlags::SHADER_READ, vk::AccessFlags2::SHADER_READ),
        (AccessFlags::SHADER_WRITE, vk::AccessFlags2::SHADER_WRITE),
        (AccessFlags::COLOR_ATTACHMENT_READ, vk::AccessFlags2::COLOR_ATTACHMENT_READ),
        (AccessFlags::COLOR_ATTACHMENT_WRITE, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE),
        (AccessFlags::DEPTH_STENCIL_READ, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ),
        (AccessFlags::DEPTH_STENCIL_WRITE, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE),
        (AccessFlags::TRANSFER_READ, vk::AccessFlags2::TRANSFER_READ),
        (AccessFlags::TRANSFER_WRITE, vk::AccessFlags2::TRANSFER_WRITE),
        (AccessFlags::HOST_READ, vk::AccessFlags2::HOST_READ),
        (AccessFlags::HOST_WRITE, vk::AccessFlags2::HOST_WRITE),
        (AccessFlags::MEMORY_READ, vk::AccessFlags2::MEMORY_READ),
        (AccessFlags::MEMORY_WRITE, vk::AccessFlags2::MEMORY_WRITE),
    ] {
        if access.contains(ours) {
            flags |= theirs;
        }
    }
    flags
}

pub fn stages(stages: PipelineStages) -> vk::PipelineStageFlags2 {
    let mut flags = vk::PipelineStageFlags2::empty();
    for (ours, theirs) in [
        (PipelineStages::TOP_OF_PIPE, vk::PipelineStageFlags2::TOP_OF_PIPE),
        (PipelineStages::DRAW_INDIRECT, vk::PipelineStageFlags2::DRAW_INDIRECT),
        (PipelineStages::VERTEX_INPUT, vk::PipelineStageFlags2::VERTEX_INPUT),
        (PipelineStages::VERTEX_SHADER, vk::PipelineStageFlags2::VERTEX_SHADER),
        (PipelineStages::TASK_SHADER, vk::PipelineStageFlags2::TASK_SHADER_EXT),
        (PipelineStages::MESH_SHADER, vk::PipelineStageFlags2::MESH_SHADER_EXT),
        (PipelineStages::FRAGMENT_SHADER, vk::PipelineStageFlags2::FRAGMENT_SHADER),
        (PipelineStages::EARLY_FRAGMENT_TESTS, vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS),
        (PipelineStages::LATE_FRAGMENT_TESTS, vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS),
        (PipelineStages::COLOR_ATTACHMENT_OUTPUT, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT),
        (PipelineStages::COMPUTE_SHADER, vk::PipelineStageFlags2::COMPUTE_SHADER),
        (PipelineStages::TRANSFER, vk::PipelineStageFlags2::TRANSFER),
        (PipelineStages::BOTTOM_OF_PIPE, vk::PipelineStageFlags2::BOTTOM_OF_PIPE),
        (PipelineStages::HOST, vk::PipelineStageFlags2::HOST),
        (PipelineStages::RAY_TRACING_SHADER, vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR),
        (PipelineStages::ALL_GRAPHICS, vk::PipelineStageFlags2::ALL_GRAPHICS),
        (PipelineStages::ALL_COMMANDS, vk::PipelineStageFlags2::ALL_COMMANDS),
    ] {
        if stages.contains(ours) {
            flags |= theirs;
        }
    }
    flags
}

/// Legacy stage mask for `vkQueueSubmit` wait stages. Every stage we name
/// has the same bit in both flag sets.
pub fn stages_legacy(s: PipelineStages) -> vk::PipelineStageFlags {
    vk::PipelineStageFlags::from_raw(stages(s).as_raw() as u32)
}

pub fn shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    for (ours, theirs) in [
        (ShaderStages::VERTEX, vk::ShaderStageFlags::VERTEX),
        (ShaderStages::FRAGMENT, vk::ShaderStageFlags::FRAGMENT),
        (ShaderStages::COMPUTE, vk::ShaderStageFlags::COMPUTE),
        (ShaderStages::TASK, vk::ShaderStageFlags::TASK_EXT),
        (ShaderStages::MESH, vk::ShaderStageFlags::MESH_EXT),
        (ShaderStages::RAYGEN, vk::ShaderStageFlags::RAYGEN_KHR),
        (ShaderStages::MISS, vk::ShaderStageFlags::MISS_KHR),
        (ShaderStages::CLOSEST_HIT, vk::ShaderStageFlags::CLOSEST_HIT_KHR),
        (ShaderStages::ANY_HIT, vk::ShaderStageFlags::ANY_HIT_KHR),
    ] {
        if stages.contains(ours) {
            flags |= theirs;
        }
    }
    flags
}

pub fn aspects(aspects: ImageAspects) -> vk::ImageAspectFlags {
    let mut flags = vk::ImageAspectFlags::empty();
    if aspects.contains(ImageAspects::COLOR) {
        flags |= vk::ImageAspectFlags::COLOR;
    }
    if aspects.contains(ImageAspects::DEPTH) {
        flags |= vk::ImageAspectFlags::DEPTH;
    }
    if aspects.contains(ImageAspects::STENCIL) {
        flags |= vk::ImageAspectFlags::STENCIL;
    }
    flags
}

pub fn subresource_range(range: SubresourceRange) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspects(range.aspects),
        base_mip_level: range.base_mip_level,
        level_count: range.level_count,
        base_array_layer: range.base_array_layer,
        layer_count: range.layer_count,
    }
}

pub fn subresource_layers(layers: SubresourceLayers) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspects(layers.aspects),
        mip_level: layers.mip_level,
        base_array_layer: layers.base_array_layer,
        layer_count: layers.layer_count,
    }
}

pub fn extent3d(e: Extent3D) -> vk::Extent3D {
    vk::Extent3D {
        width: e.width,
        height: e.height,
        depth: e.depth,
    }
}

pub fn offset3d(o: Offset3D) -> vk::Offset3D {
    vk::Offset3D { x: o.x, y: o.y, z: o.z }
}

pub fn rect2d(r: Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: r.x, y: r.y },
        extent: vk::Extent2D {
            width: r.extent.width,
            height: r.extent.height,
        },
    }
}

pub fn buffer_image_copy(c: &BufferImageCopy) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: c.buffer_offset,
        buffer_row_length: c.buffer_row_length,
        buffer_image_height: c.buffer_image_height,
        image_subresource: subresource_layers(c.image_subresource),
        image_offset: offset3d(c.image_offset),
        image_extent: extent3d(c.image_extent),
    }
}

pub fn load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub fn store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn resolve_mode(mode: ResolveMode) -> vk::ResolveModeFlags {
    match mode {
        ResolveMode::None => vk::ResolveModeFlags::NONE,
        ResolveMode::SampleZero => vk::ResolveModeFlags::SAMPLE_ZERO,
        ResolveMode::Average => vk::ResolveModeFlags::AVERAGE,
        ResolveMode::Min => vk::ResolveModeFlags::MIN,
        ResolveMode::Max => vk::ResolveModeFlags::MAX,
    }
}

pub fn clear_value(value: ClearValue) -> vk::ClearValue {
    match value {
        ClearValue::Color(float32) => vk::ClearValue {
            color: vk::ClearColorValue { float32 },
        },
        ClearValue::DepthStencil(ds) => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: ds.depth,
                stencil: ds.stencil,
            },
        },
    }
}

pub fn bind_point(point: PipelineBindPoint) -> vk::PipelineBindPoint {
    match point {
        PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
        PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
        PipelineBindPoint::RayTracing => vk::PipelineBindPoint::RAY_TRACING_KHR,
    }
}

pub fn index_type(ty: IndexType) -> vk::IndexType {
    match ty {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

pub fn present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

pub fn filter(f: Filter) -> vk::Filter {
    match f {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_mode(f: Filter) -> vk::SamplerMipmapMode {
    match f {
        Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
        Filter::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

pub fn compare_op(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn topology(t: PrimitiveTopology) -> vk::PrimitiveTopology {
    match t {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

pub fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub fn front_face(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub fn polygon_mode(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
    }
}

pub fn descriptor_type(ty: DescriptorType) -> vk::DescriptorType {
    match ty {
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
    }
}

pub fn image_type(ty: ImageType) -> (vk::ImageType, vk::ImageViewType) {
    match ty {
        ImageType::D1 => (vk::ImageType::TYPE_1D, vk::ImageViewType::TYPE_1D),
        ImageType::D2 => (vk::ImageType::TYPE_2D, vk::ImageViewType::TYPE_2D),
        ImageType::D3 => (vk::ImageType::TYPE_3D, vk::ImageViewType::TYPE_3D),
        ImageType::Cube => (vk::ImageType::TYPE_2D, vk::ImageViewType::CUBE),
    }
}

pub fn samples(count: u32) -> vk::SampleCountFlags {
    match count {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

pub fn memory_properties(flags: vk::MemoryPropertyFlags) -> MemoryProperties {
    let mut props = MemoryProperties::empty();
    for (theirs, ours) in [
        (vk::MemoryPropertyFlags::DEVICE_LOCAL, MemoryProperties::DEVICE_LOCAL),
        (vk::MemoryPropertyFlags::HOST_VISIBLE, MemoryProperties::HOST_VISIBLE),
        (vk::MemoryPropertyFlags::HOST_COHERENT, MemoryProperties::HOST_COHERENT),
        (vk::MemoryPropertyFlags::HOST_CACHED, MemoryProperties::HOST_CACHED),
    ] {
        if flags.contains(theirs) {
            props |= ours;
        }
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_survive_the_trip_through_vulkan() {
        for f in [Format::B8G8R8A8Srgb, Format::D24UnormS8Uint, Format::R32G32B32Sfloat] {
            assert_eq!(format_from_vk(format(f)), f);
        }
        assert_eq!(format_from_vk(vk::Format::BC7_SRGB_BLOCK), Format::Undefined);
    }

    #[test]
    fn legacy_stage_bits_match_sync2() {
        let s = PipelineStages::TRANSFER | PipelineStages::COLOR_ATTACHMENT_OUTPUT;
        assert_eq!(
            stages_legacy(s),
            vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
    }

    #[test]
    fn depth_stencil_range_has_both_aspects() {
        let range = subresource_range(SubresourceRange::single(Format::D32SfloatS8Uint.aspects()));
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
    }
}
