use crate::gpu::{BackendError, GpuBackend};
use crate::types::{BufferTarget, BufferUsage};

/// A static vertex buffer filled once from `f32` data.
pub struct VertexBuffer<B: GpuBackend + ?Sized> {
    name: String,
    handle: B::Buffer,
    target: BufferTarget,
    usage: BufferUsage,
    len: usize,
}

impl<B: GpuBackend + ?Sized> VertexBuffer<B> {
    pub(crate) fn new(
        backend: &mut B,
        name: &str,
        target: BufferTarget,
        data: &[f32],
        usage: BufferUsage,
    ) -> Result<Self, BackendError> {
        let handle = backend.create_buffer(name, target, usage, bytemuck::cast_slice(data))?;
        Ok(Self {
            name: name.to_string(),
            handle,
            target,
            usage,
            len: data.len(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &B::Buffer {
        &self.handle
    }

    pub fn target(&self) -> BufferTarget {
        self.target
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Number of `f32` values uploaded.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_in_bytes(&self) -> u64 {
        (self.len * std::mem::size_of::<f32>()) as u64
    }
}
