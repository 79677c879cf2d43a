// Backend-neutral enums, flags and creation descriptors
//
// Everything a caller hands to the Device or a CommandList is expressed in
// these types. Backends translate them to native values.

use bitflags::bitflags;

use super::handle::{BufferHandle, DescriptorLayoutHandle, DescriptorPoolHandle, ImageHandle, SamplerHandle, ShaderModuleHandle};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
        const INDIRECT = 1 << 6;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const SHADER_READ = 1 << 4;
        const SHADER_WRITE = 1 << 5;
        const COLOR_ATTACHMENT_READ = 1 << 6;
        const COLOR_ATTACHMENT_WRITE = 1 << 7;
        const DEPTH_STENCIL_READ = 1 << 8;
        const DEPTH_STENCIL_WRITE = 1 << 9;
        const TRANSFER_READ = 1 << 10;
        const TRANSFER_WRITE = 1 << 11;
        const HOST_READ = 1 << 12;
        const HOST_WRITE = 1 << 13;
        const MEMORY_READ = 1 << 14;
        const MEMORY_WRITE = 1 << 15;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const TASK_SHADER = 1 << 4;
        const MESH_SHADER = 1 << 5;
        const FRAGMENT_SHADER = 1 << 6;
        const EARLY_FRAGMENT_TESTS = 1 << 7;
        const LATE_FRAGMENT_TESTS = 1 << 8;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 9;
        const COMPUTE_SHADER = 1 << 10;
        const TRANSFER = 1 << 11;
        const BOTTOM_OF_PIPE = 1 << 12;
        const HOST = 1 << 13;
        const RAY_TRACING_SHADER = 1 << 14;
        const ALL_GRAPHICS = 1 << 15;
        const ALL_COMMANDS = 1 << 16;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const TASK = 1 << 3;
        const MESH = 1 << 4;
        const RAYGEN = 1 << 5;
        const MISS = 1 << 6;
        const CLOSEST_HIT = 1 << 7;
        const ANY_HIT = 1 << 8;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageAspects: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryProperties: u32 {
        const DEVICE_LOCAL = 1 << 0;
        const HOST_VISIBLE = 1 << 1;
        const HOST_COHERENT = 1 << 2;
        const HOST_CACHED = 1 << 3;
    }

    /// Usage hints passed to `CommandList::begin`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandListUsage: u32 {
        const ONE_TIME_SUBMIT = 1 << 0;
        const SIMULTANEOUS_USE = 1 << 1;
    }
}

impl MemoryProperties {
    pub fn is_host_visible(self) -> bool {
        self.contains(Self::HOST_VISIBLE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Undefined,
    R8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    R16G16B16A16Sfloat,
    R32Sfloat,
    R32G32Sfloat,
    R32G32B32Sfloat,
    R32G32B32A32Sfloat,
    D32Sfloat,
    D24UnormS8Uint,
    D32SfloatS8Uint,
}

impl Format {
    pub fn is_depth(self) -> bool {
        matches!(self, Format::D32Sfloat | Format::D24UnormS8Uint | Format::D32SfloatS8Uint)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32SfloatS8Uint)
    }

    pub fn aspects(self) -> ImageAspects {
        match (self.is_depth(), self.has_stencil()) {
            (true, true) => ImageAspects::DEPTH | ImageAspects::STENCIL,
            (true, false) => ImageAspects::DEPTH,
            _ => ImageAspects::COLOR,
        }
    }

    /// Size of one texel (or one vertex attribute) in bytes
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Format::Undefined => 0,
            Format::R8Unorm => 1,
            Format::R8G8B8A8Unorm
            | Format::R8G8B8A8Srgb
            | Format::B8G8R8A8Unorm
            | Format::B8G8R8A8Srgb
            | Format::R32Sfloat
            | Format::D32Sfloat
            | Format::D24UnormS8Uint => 4,
            Format::R16G16B16A16Sfloat | Format::R32G32Sfloat | Format::D32SfloatS8Uint => 8,
            Format::R32G32B32Sfloat => 12,
            Format::R32G32B32A32Sfloat => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageType {
    D1,
    #[default]
    D2,
    D3,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
    RayTracing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    Load,
    Clear,
    #[default]
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    Store,
    #[default]
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResolveMode {
    #[default]
    None,
    SampleZero,
    Average,
    Min,
    Max,
}

/// Where a buffer or image should live. The Device turns this into concrete
/// memory properties depending on the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryUsage {
    #[default]
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    #[default]
    Fifo,
    FifoRelaxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SemaphoreKind {
    #[default]
    Binary,
    Timeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformBuffer,
    StorageBuffer,
}

// -----------------------------------------------------------------------------
// Geometry helpers
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Default for Extent3D {
    fn default() -> Self {
        Self { width: 1, height: 1, depth: 1 }
    }
}

impl From<Extent2D> for Extent3D {
    fn from(e: Extent2D) -> Self {
        Self { width: e.width, height: e.height, depth: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub extent: Extent2D,
}

impl From<Extent2D> for Rect2D {
    fn from(extent: Extent2D) -> Self {
        Self { x: 0, y: 0, extent }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl From<Extent2D> for Viewport {
    fn from(e: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: e.width as f32,
            height: e.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub aspects: ImageAspects,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    /// First mip level and array layer of the given aspects
    pub fn single(aspects: ImageAspects) -> Self {
        Self {
            aspects,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    pub fn color() -> Self {
        Self::single(ImageAspects::COLOR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceLayers {
    pub aspects: ImageAspects,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl SubresourceLayers {
    pub fn color() -> Self {
        Self {
            aspects: ImageAspects::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearDepthStencil {
    pub depth: f32,
    pub stencil: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil(ClearDepthStencil),
}

// -----------------------------------------------------------------------------
// Copy regions
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    /// Texels per row in the buffer; 0 means tightly packed
    pub buffer_row_length: u32,
    pub buffer_image_height: u32,
    pub image_subresource: SubresourceLayers,
    pub image_offset: Offset3D,
    pub image_extent: Extent3D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCopy {
    pub src_subresource: SubresourceLayers,
    pub src_offset: Offset3D,
    pub dst_subresource: SubresourceLayers,
    pub dst_offset: Offset3D,
    pub extent: Extent3D,
}

// -----------------------------------------------------------------------------
// Resource descriptors
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryUsage,
    pub debug_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDesc {
    pub image_type: ImageType,
    pub format: Format,
    pub extent: Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: u32,
    pub usage: ImageUsage,
    pub memory: MemoryUsage,
    pub debug_name: String,
}

impl Default for ImageDesc {
    fn default() -> Self {
        Self {
            image_type: ImageType::D2,
            format: Format::R8G8B8A8Unorm,
            extent: Extent3D::default(),
            mip_levels: 1,
            array_layers: 1,
            samples: 1,
            usage: ImageUsage::SAMPLED,
            memory: MemoryUsage::GpuOnly,
            debug_name: String::new(),
        }
    }
}

impl ImageDesc {
    /// Full subresource range covering every mip and layer
    pub fn full_range(&self) -> SubresourceRange {
        SubresourceRange {
            aspects: self.format.aspects(),
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: Filter,
    pub address_mode: AddressMode,
    pub max_anisotropy: Option<f32>,
    pub compare: Option<CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_filter: Filter::Linear,
            address_mode: AddressMode::Repeat,
            max_anisotropy: None,
            compare: None,
            min_lod: 0.0,
            max_lod: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderModuleDesc {
    /// SPIR-V words
    pub code: Vec<u32>,
    pub entry_point: String,
    pub stage: ShaderStages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub per_instance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: CompareOp,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GraphicsPipelineDesc {
    pub shaders: Vec<ShaderModuleHandle>,
    pub vertex_layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth: DepthState,
    pub blend: bool,
    pub color_formats: Vec<Format>,
    pub depth_format: Option<Format>,
    pub descriptor_layouts: Vec<DescriptorLayoutHandle>,
    pub push_constant_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePipelineDesc {
    pub shader: ShaderModuleHandle,
    pub descriptor_layouts: Vec<DescriptorLayoutHandle>,
    pub push_constant_size: u32,
}

/// Ray tracing is only stubbed: the descriptor is accepted but backends may
/// refuse to build it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RayTracingPipelineDesc {
    pub shaders: Vec<ShaderModuleHandle>,
    pub descriptor_layouts: Vec<DescriptorLayoutHandle>,
    pub max_recursion_depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineDesc {
    Graphics(GraphicsPipelineDesc),
    Compute(ComputePipelineDesc),
    RayTracing(RayTracingPipelineDesc),
}

impl PipelineDesc {
    pub fn bind_point(&self) -> PipelineBindPoint {
        match self {
            PipelineDesc::Graphics(_) => PipelineBindPoint::Graphics,
            PipelineDesc::Compute(_) => PipelineBindPoint::Compute,
            PipelineDesc::RayTracing(_) => PipelineBindPoint::RayTracing,
        }
    }

    pub fn descriptor_layouts(&self) -> &[DescriptorLayoutHandle] {
        match self {
            PipelineDesc::Graphics(d) => &d.descriptor_layouts,
            PipelineDesc::Compute(d) => &d.descriptor_layouts,
            PipelineDesc::RayTracing(d) => &d.descriptor_layouts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorPoolDesc {
    pub max_groups: u32,
    pub sizes: Vec<(DescriptorType, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub count: u32,
    pub stages: ShaderStages,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorLayoutDesc {
    pub bindings: Vec<DescriptorBinding>,
}

/// A group is one descriptor set per layout, bound together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorGroupDesc {
    pub pool: DescriptorPoolHandle,
    pub layouts: Vec<DescriptorLayoutHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    Buffer { buffer: BufferHandle, offset: u64, range: u64 },
    Image { image: ImageHandle, layout: ImageLayout },
    CombinedImageSampler { image: ImageHandle, layout: ImageLayout, sampler: SamplerHandle },
    Sampler(SamplerHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    /// Index of the set inside the group
    pub set: u32,
    pub binding: u32,
    pub array_element: u32,
    pub ty: DescriptorType,
    pub resource: DescriptorResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub extent: Extent2D,
    pub image_count: u32,
    pub format: Format,
    pub present_mode: PresentMode,
}

/// Static capacity of every resource pool owned by a Device
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct PoolCapacities {
    pub buffers: u32,
    pub images: u32,
    pub samplers: u32,
    pub shader_modules: u32,
    pub pipelines: u32,
    pub descriptor_pools: u32,
    pub descriptor_layouts: u32,
    pub descriptor_groups: u32,
    pub fences: u32,
    pub semaphores: u32,
    pub events: u32,
}

impl Default for PoolCapacities {
    fn default() -> Self {
        Self {
            buffers: 4096,
            images: 4096,
            samplers: 256,
            shader_modules: 512,
            pipelines: 512,
            descriptor_pools: 64,
            descriptor_layouts: 256,
            descriptor_groups: 4096,
            fences: 64,
            semaphores: 128,
            events: 64,
        }
    }
}

impl PoolCapacities {
    /// Same capacity for every kind, handy for tests
    pub fn uniform(capacity: u32) -> Self {
        Self {
            buffers: capacity,
            images: capacity,
            samplers: capacity,
            shader_modules: capacity,
            pipelines: capacity,
            descriptor_pools: capacity,
            descriptor_layouts: capacity,
            descriptor_groups: capacity,
            fences: capacity,
            semaphores: capacity,
            events: capacity,
        }
    }
}
