// Barrier descriptors
//
// Barriers are purely declarative: the caller states source and destination
// stages/access (and layouts for images). Nothing here remembers what state a
// resource was last left in.

use super::handle::{BufferHandle, ImageHandle};
use super::types::{AccessFlags, ImageLayout, PipelineStages, SubresourceRange};

/// Execution + memory dependency not tied to a single resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_stages: PipelineStages,
    pub dst_access: AccessFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub offset: u64,
    /// `u64::MAX` covers the rest of the buffer
    pub size: u64,
    pub src_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_stages: PipelineStages,
    pub dst_access: AccessFlags,
}

impl BufferBarrier {
    pub fn whole(buffer: BufferHandle) -> Self {
        Self {
            buffer,
            offset: 0,
            size: u64::MAX,
            src_stages: PipelineStages::empty(),
            src_access: AccessFlags::empty(),
            dst_stages: PipelineStages::empty(),
            dst_access: AccessFlags::empty(),
        }
    }

    pub fn src(mut self, stages: PipelineStages, access: AccessFlags) -> Self {
        self.src_stages = stages;
        self.src_access = access;
        self
    }

    pub fn dst(mut self, stages: PipelineStages, access: AccessFlags) -> Self {
        self.dst_stages = stages;
        self.dst_access = access;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub range: SubresourceRange,
    pub src_stages: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_stages: PipelineStages,
    pub dst_access: AccessFlags,
}

impl ImageBarrier {
    pub fn new(image: ImageHandle, range: SubresourceRange) -> Self {
        Self {
            image,
            old_layout: ImageLayout::Undefined,
            new_layout: ImageLayout::Undefined,
            range,
            src_stages: PipelineStages::empty(),
            src_access: AccessFlags::empty(),
            dst_stages: PipelineStages::empty(),
            dst_access: AccessFlags::empty(),
        }
    }

    pub fn layouts(mut self, old: ImageLayout, new: ImageLayout) -> Self {
        self.old_layout = old;
        self.new_layout = new;
        self
    }

    pub fn src(mut self, stages: PipelineStages, access: AccessFlags) -> Self {
        self.src_stages = stages;
        self.src_access = access;
        self
    }

    pub fn dst(mut self, stages: PipelineStages, access: AccessFlags) -> Self {
        self.dst_stages = stages;
        self.dst_access = access;
        self
    }
}

/// Everything passed to one `CommandList::add_barriers` call. Submitted to
/// the backend as a single dependency, each list in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Barriers {
    pub memory: Vec<MemoryBarrier>,
    pub buffers: Vec<BufferBarrier>,
    pub images: Vec<ImageBarrier>,
}

impl Barriers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory(mut self, barrier: MemoryBarrier) -> Self {
        self.memory.push(barrier);
        self
    }

    pub fn buffer(mut self, barrier: BufferBarrier) -> Self {
        self.buffers.push(barrier);
        self
    }

    pub fn image(mut self, barrier: ImageBarrier) -> Self {
        self.images.push(barrier);
        self
    }

    pub fn len(&self) -> usize {
        self.memory.len() + self.buffers.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
