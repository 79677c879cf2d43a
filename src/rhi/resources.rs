// Resource records stored in the Device pools
//
// Each record pairs the backend object with the descriptor it was created
// from, so `Device::buffer(h).desc()` always reflects creation state.

use crate::backend::Backend;

use super::types::*;

pub struct Buffer<B: Backend> {
    pub(crate) raw: B::Buffer,
    pub(crate) desc: BufferDesc,
    pub(crate) memory: MemoryProperties,
    pub(crate) mapped: bool,
}

impl<B: Backend> Buffer<B> {
    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn memory_properties(&self) -> MemoryProperties {
        self.memory
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn raw(&self) -> &B::Buffer {
        &self.raw
    }
}

pub struct Image<B: Backend> {
    pub(crate) raw: B::Image,
    pub(crate) desc: ImageDesc,
    pub(crate) layout: ImageLayout,
    pub(crate) allocated_size: u64,
    /// Owned by a swapchain; deleting releases the view only
    pub(crate) external: bool,
}

impl<B: Backend> Image<B> {
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    /// Layout the most recently recorded barrier moved this image to
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    pub fn allocated_size(&self) -> u64 {
        self.allocated_size
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn raw(&self) -> &B::Image {
        &self.raw
    }
}

pub struct Sampler<B: Backend> {
    pub(crate) raw: B::Sampler,
    pub(crate) desc: SamplerDesc,
}

impl<B: Backend> Sampler<B> {
    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

pub struct ShaderModule<B: Backend> {
    pub(crate) raw: B::ShaderModule,
    pub(crate) desc: ShaderModuleDesc,
}

impl<B: Backend> ShaderModule<B> {
    pub fn desc(&self) -> &ShaderModuleDesc {
        &self.desc
    }

    pub fn stage(&self) -> ShaderStages {
        self.desc.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.desc.entry_point
    }
}

pub struct Pipeline<B: Backend> {
    pub(crate) raw: B::Pipeline,
    pub(crate) desc: PipelineDesc,
    pub(crate) stages: ShaderStages,
}

impl<B: Backend> Pipeline<B> {
    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }

    /// Union of the stages the pipeline was built from. Push constants must
    /// name exactly these.
    pub fn stages(&self) -> ShaderStages {
        self.stages
    }

    pub fn bind_point(&self) -> PipelineBindPoint {
        self.desc.bind_point()
    }
}

pub struct DescriptorPool<B: Backend> {
    pub(crate) raw: B::DescriptorPool,
    pub(crate) desc: DescriptorPoolDesc,
}

impl<B: Backend> DescriptorPool<B> {
    pub fn desc(&self) -> &DescriptorPoolDesc {
        &self.desc
    }
}

pub struct DescriptorLayout<B: Backend> {
    pub(crate) raw: B::DescriptorLayout,
    pub(crate) desc: DescriptorLayoutDesc,
}

impl<B: Backend> DescriptorLayout<B> {
    pub fn desc(&self) -> &DescriptorLayoutDesc {
        &self.desc
    }
}

pub struct DescriptorGroup<B: Backend> {
    pub(crate) raw: B::DescriptorGroup,
    pub(crate) desc: DescriptorGroupDesc,
}

impl<B: Backend> DescriptorGroup<B> {
    pub fn desc(&self) -> &DescriptorGroupDesc {
        &self.desc
    }
}

pub struct Fence<B: Backend> {
    pub(crate) raw: B::Fence,
    /// Set once a wait or status query has seen the fence signalled;
    /// cleared by reset. Only used to police the reset contract.
    pub(crate) observed_signalled: bool,
}

pub struct Semaphore<B: Backend> {
    pub(crate) raw: B::Semaphore,
    pub(crate) kind: SemaphoreKind,
}

impl<B: Backend> Semaphore<B> {
    pub fn kind(&self) -> SemaphoreKind {
        self.kind
    }
}

pub struct Event<B: Backend> {
    pub(crate) raw: B::Event,
}
