//! Named, create-once ownership of every GPU resource a viewport uses.
//!
//! Registration takes a caller-chosen name and hands back a typed id; the
//! render path works with ids, names are for setup and diagnostics. Nothing
//! here panics or returns a hard error for a missing name: misses are logged
//! and come back as `None`, collisions keep the original resource.
//!
//! The registry owns its backend. Resources are released by dropping them,
//! which happens in [`ResourceRegistry::teardown`] or when the registry drops.

use std::collections::HashMap;
use std::fmt;

use crate::buffer::VertexBuffer;
use crate::gpu::{BindingValue, DrawCall, GpuBackend};
use crate::program::{AttributeLocation, LinkedProgram, UniformLocation};
use crate::shader::{CompiledShader, ShaderLanguage, ShaderSource, ShaderStage};
use crate::texture::{Texture, TextureSource};
use crate::types::{BufferTarget, BufferUsage};

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Key);

        impl $name {
            pub fn index(self) -> usize {
                self.0.index
            }

            /// Bumped each time the slot is reused.
            pub fn generation(self) -> u32 {
                self.0.generation
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}.{}", stringify!($name), self.0.index, self.0.generation)
            }
        }
    };
}

resource_id!(
    /// Handle to a compiled shader.
    ShaderId
);
resource_id!(
    /// Handle to a linked (or failed) program.
    ProgramId
);
resource_id!(
    /// Handle to a texture.
    TextureId
);
resource_id!(
    /// Handle to a vertex buffer.
    BufferId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Key {
    index: usize,
    generation: u32,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Name-indexed slots. Emptied slots are reused under a new generation, so an
/// id taken before a delete never reaches the entry that replaced it.
struct Table<T> {
    kind: &'static str,
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    names: HashMap<String, Key>,
}

impl<T> Table<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            free: Vec::new(),
            names: HashMap::new(),
        }
    }

    fn index_of(&self, name: &str) -> Option<Key> {
        self.names.get(name).copied()
    }

    fn insert(&mut self, name: &str, value: T) -> Key {
        let key = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation = slot.generation.wrapping_add(1);
                slot.value = Some(value);
                Key {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                Key {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        };
        self.names.insert(name.to_string(), key);
        key
    }

    fn slot(&self, key: Key) -> Option<&Slot<T>> {
        self.slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)
    }

    fn get(&self, key: Key) -> Option<&T> {
        self.slot(key).and_then(|slot| slot.value.as_ref())
    }

    fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    fn remove(&mut self, name: &str) -> Option<T> {
        let key = self.names.remove(name)?;
        let value = self.slots.get_mut(key.index)?.value.take();
        if value.is_some() {
            self.free.push(key.index);
        }
        value
    }

    fn len(&self) -> usize {
        self.names.len()
    }

    /// Drops every entry; the emptied slots are reused by later inserts.
    fn clear(&mut self) {
        self.names.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                self.free.push(index);
            }
        }
    }
}

/// Everything [`ResourceRegistry::draw`] needs, by id.
#[derive(Debug, Clone)]
pub struct DrawRequest<'a> {
    pub program: ProgramId,
    pub attributes: Vec<(AttributeLocation, BufferId)>,
    pub uniforms: Vec<(UniformLocation, &'a [u8])>,
    /// `(texture location, sampler location, texture)`.
    pub textures: Vec<(UniformLocation, UniformLocation, TextureId)>,
    pub vertex_count: u32,
    pub clear_color: wgpu::Color,
}

#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    #[error("program {0} is not registered")]
    UnknownProgram(ProgramId),
    #[error("program '{name}' did not link")]
    ProgramNotLinked { name: String },
    #[error("buffer {0} is not registered")]
    UnknownBuffer(BufferId),
    #[error("texture {0} is not registered")]
    UnknownTexture(TextureId),
    #[error(transparent)]
    Backend(#[from] crate::gpu::BackendError),
}

pub struct ResourceRegistry<B: GpuBackend> {
    // Field order is drop order: programs before the shaders they came from,
    // every resource before the backend.
    programs: Table<LinkedProgram<B>>,
    shaders: Table<CompiledShader<B>>,
    textures: Table<Texture<B>>,
    buffers: Table<VertexBuffer<B>>,
    texture_format: wgpu::TextureFormat,
    lookup_misses: usize,
    backend: B,
}

impl<B: GpuBackend> ResourceRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            programs: Table::new("program"),
            shaders: Table::new("shader"),
            textures: Table::new("texture"),
            buffers: Table::new("buffer"),
            texture_format: wgpu::TextureFormat::Rgba8Unorm,
            lookup_misses: 0,
            backend,
        }
    }

    /// Format used by textures registered from now on.
    pub fn with_texture_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.texture_format = format;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn collision<T>(table: &Table<T>, name: &str) -> Option<Key> {
        let key = table.index_of(name)?;
        tracing::warn!(name, kind = table.kind, "already registered; keeping the existing one");
        Some(key)
    }

    /// Compiles `code` as a WGSL shader for `stage` and stores it under `name`.
    pub fn register_shader(
        &mut self,
        name: &str,
        stage: ShaderStage,
        code: &str,
    ) -> Option<ShaderId> {
        self.register_shader_source(ShaderSource {
            name: name.to_string(),
            stage,
            language: ShaderLanguage::Wgsl,
            code: code.to_string().into(),
        })
    }

    pub fn register_shader_source(&mut self, source: ShaderSource) -> Option<ShaderId> {
        if let Some(key) = Self::collision(&self.shaders, &source.name) {
            return Some(ShaderId(key));
        }
        match CompiledShader::new(&mut self.backend, &source) {
            Ok(shader) => {
                tracing::debug!(name = %source.name, stage = %source.stage, "compiled shader");
                Some(ShaderId(self.shaders.insert(&source.name, shader)))
            }
            Err(err) => {
                tracing::error!(name = %source.name, error = %err, "shader compilation failed");
                None
            }
        }
    }

    /// Links the named shaders into a program.
    ///
    /// Unknown shader names are skipped; a program missing a stage still gets
    /// registered, in the failed state.
    pub fn register_program(&mut self, name: &str, shader_names: &[&str]) -> Option<ProgramId> {
        if let Some(key) = Self::collision(&self.programs, name) {
            return Some(ProgramId(key));
        }
        let shaders: Vec<&CompiledShader<B>> = shader_names
            .iter()
            .filter_map(|shader| {
                let found = self
                    .shaders
                    .index_of(shader)
                    .and_then(|key| self.shaders.get(key));
                if found.is_none() {
                    tracing::debug!(program = name, shader, "skipping unknown shader");
                }
                found
            })
            .collect();

        let program = LinkedProgram::link(&mut self.backend, name, &shaders);
        match program.failure_log() {
            Some(log) => tracing::error!(name, log, "program link failed"),
            None => tracing::debug!(name, "linked program"),
        }
        Some(ProgramId(self.programs.insert(name, program)))
    }

    /// Creates a placeholder texture under `name`.
    pub fn register_texture(&mut self, name: &str) -> Option<TextureId> {
        if let Some(key) = Self::collision(&self.textures, name) {
            return Some(TextureId(key));
        }
        match Texture::placeholder(&mut self.backend, name, self.texture_format) {
            Ok(texture) => Some(TextureId(self.textures.insert(name, texture))),
            Err(err) => {
                tracing::error!(name, error = %err, "failed to create texture");
                None
            }
        }
    }

    pub fn register_buffer(
        &mut self,
        name: &str,
        target: BufferTarget,
        data: &[f32],
        usage: BufferUsage,
    ) -> Option<BufferId> {
        if let Some(key) = Self::collision(&self.buffers, name) {
            return Some(BufferId(key));
        }
        match VertexBuffer::new(&mut self.backend, name, target, data, usage) {
            Ok(buffer) => Some(BufferId(self.buffers.insert(name, buffer))),
            Err(err) => {
                tracing::error!(name, error = %err, "failed to create buffer");
                None
            }
        }
    }

    /// Replaces the content of texture `name`. Returns whether an upload happened.
    pub fn update_texture(&mut self, name: &str, source: &TextureSource) -> bool {
        match self.texture_id(name) {
            Some(id) => self.update_texture_by_id(id, source),
            None => false,
        }
    }

    pub fn update_texture_by_id(&mut self, id: TextureId, source: &TextureSource) -> bool {
        let format = self.texture_format;
        let Some(texture) = self.textures.get_mut(id.0) else {
            tracing::warn!(%id, "texture not registered");
            self.lookup_misses += 1;
            return false;
        };
        match texture.set_content(&mut self.backend, source, format) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(name = texture.name(), error = %err, "texture update rejected");
                false
            }
        }
    }

    /// Releases texture `name`. Its id stays dead.
    pub fn delete_texture(&mut self, name: &str) -> bool {
        match self.textures.remove(name) {
            Some(texture) => {
                drop(texture);
                true
            }
            None => {
                tracing::warn!(name, "cannot delete unknown texture");
                self.lookup_misses += 1;
                false
            }
        }
    }

    pub fn get_program(&mut self, name: &str) -> Option<&mut LinkedProgram<B>> {
        let id = self.program_id(name)?;
        self.programs.get_mut(id.0)
    }

    pub fn get_texture(&mut self, name: &str) -> Option<&Texture<B>> {
        let id = self.texture_id(name)?;
        self.textures.get(id.0)
    }

    pub fn get_buffer(&mut self, name: &str) -> Option<&VertexBuffer<B>> {
        let id = self.buffer_id(name)?;
        self.buffers.get(id.0)
    }

    pub fn program_id(&mut self, name: &str) -> Option<ProgramId> {
        self.lookup(|registry| registry.programs.index_of(name), "program", name)
            .map(ProgramId)
    }

    pub fn texture_id(&mut self, name: &str) -> Option<TextureId> {
        self.lookup(|registry| registry.textures.index_of(name), "texture", name)
            .map(TextureId)
    }

    pub fn buffer_id(&mut self, name: &str) -> Option<BufferId> {
        self.lookup(|registry| registry.buffers.index_of(name), "buffer", name)
            .map(BufferId)
    }

    pub fn shader_id(&mut self, name: &str) -> Option<ShaderId> {
        self.lookup(|registry| registry.shaders.index_of(name), "shader", name)
            .map(ShaderId)
    }

    fn lookup(
        &mut self,
        find: impl FnOnce(&Self) -> Option<Key>,
        kind: &'static str,
        name: &str,
    ) -> Option<Key> {
        let found = find(self);
        if found.is_none() {
            tracing::warn!(name, kind, "not registered");
            self.lookup_misses += 1;
        }
        found
    }

    pub fn program(&self, id: ProgramId) -> Option<&LinkedProgram<B>> {
        self.programs.get(id.0)
    }

    pub fn program_mut(&mut self, id: ProgramId) -> Option<&mut LinkedProgram<B>> {
        self.programs.get_mut(id.0)
    }

    pub fn shader(&self, id: ShaderId) -> Option<&CompiledShader<B>> {
        self.shaders.get(id.0)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture<B>> {
        self.textures.get(id.0)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&VertexBuffer<B>> {
        self.buffers.get(id.0)
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of name or id lookups that found nothing.
    pub fn lookup_misses(&self) -> usize {
        self.lookup_misses
    }

    /// Issues one draw with the resources named in `request`.
    ///
    /// Absent locations are skipped.
    pub fn draw(&mut self, request: &DrawRequest<'_>) -> Result<(), DrawError> {
        let program = self
            .programs
            .get(request.program.0)
            .ok_or(DrawError::UnknownProgram(request.program))?;
        let handle = program.handle().ok_or_else(|| DrawError::ProgramNotLinked {
            name: program.name().to_string(),
        })?;

        let mut vertex_buffers = Vec::with_capacity(request.attributes.len());
        for (location, id) in &request.attributes {
            let AttributeLocation::Found(slot) = location else {
                continue;
            };
            let buffer = self.buffers.get(id.0).ok_or(DrawError::UnknownBuffer(*id))?;
            vertex_buffers.push((*slot, buffer.handle()));
        }

        let mut bindings = Vec::new();
        for (location, bytes) in &request.uniforms {
            if let UniformLocation::Found(slot) = location {
                bindings.push(BindingValue::Uniform {
                    slot: *slot,
                    bytes: *bytes,
                });
            }
        }
        for (texture_location, sampler_location, id) in &request.textures {
            let texture = self.textures.get(id.0).ok_or(DrawError::UnknownTexture(*id))?;
            if let UniformLocation::Found(slot) = texture_location {
                bindings.push(BindingValue::Texture {
                    slot: *slot,
                    texture: texture.handle(),
                });
            }
            if let UniformLocation::Found(slot) = sampler_location {
                bindings.push(BindingValue::Sampler {
                    slot: *slot,
                    texture: texture.handle(),
                });
            }
        }

        self.backend.draw(DrawCall {
            program: handle,
            vertex_buffers,
            bindings,
            vertex_count: request.vertex_count,
            clear_color: request.clear_color,
        })?;
        Ok(())
    }

    /// Releases every shader, program, texture and buffer. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        let released = self.programs.len()
            + self.shaders.len()
            + self.textures.len()
            + self.buffers.len();
        self.programs.clear();
        self.shaders.clear();
        self.textures.clear();
        self.buffers.clear();
        if released > 0 {
            tracing::debug!(released, "registry torn down");
        }
    }
}

impl<B: GpuBackend> Drop for ResourceRegistry<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equirect::{EQUIRECTANGULAR_WGSL, FULLSCREEN_TRIANGLE_WGSL};
    use crate::gpu::HeadlessBackend;
    use crate::texture::{PixelFormat, PixelImage};

    fn registry() -> ResourceRegistry<HeadlessBackend> {
        ResourceRegistry::new(HeadlessBackend::new(64, 32))
    }

    #[test]
    fn shader_compile_failure_stores_nothing() {
        let mut registry = registry();
        assert!(registry
            .register_shader("bad", ShaderStage::Vertex, "not wgsl at all")
            .is_none());
        assert_eq!(registry.shader_count(), 0);
        assert!(registry.shader_id("bad").is_none());
    }

    #[test]
    fn shader_collision_keeps_first() {
        let mut registry = registry();
        let probe = registry.backend().probe();
        let first = registry
            .register_shader("vs", ShaderStage::Vertex, FULLSCREEN_TRIANGLE_WGSL)
            .unwrap();
        let first_handle = registry.shader(first).unwrap().handle().id();
        // a different, even broken, source under the same name is ignored
        let second = registry
            .register_shader("vs", ShaderStage::Fragment, "garbage")
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.shader(second).unwrap().handle().id(), first_handle);
        assert_eq!(probe.stats().shaders.created, 1);
    }

    #[test]
    fn program_skips_unknown_shaders_and_fails_link() {
        let mut registry = registry();
        registry.register_shader("fs", ShaderStage::Fragment, EQUIRECTANGULAR_WGSL);
        let id = registry.register_program("main", &["missing_vs", "fs"]).unwrap();
        let program = registry.program(id).unwrap();
        assert!(!program.is_linked());
        assert!(program.failure_log().is_some());
    }

    #[test]
    fn update_and_delete_unknown_textures_are_noops() {
        let mut registry = registry();
        let source = TextureSource::Still(PixelImage::new(1, 1, PixelFormat::Rgba8, vec![0; 4]));
        assert!(!registry.update_texture("ghost", &source));
        assert!(!registry.delete_texture("ghost"));
        assert_eq!(registry.lookup_misses(), 2);
    }

    #[test]
    fn deleted_texture_releases_and_id_stays_dead() {
        let mut registry = registry();
        let probe = registry.backend().probe();
        let id = registry.register_texture("pano").unwrap();
        assert!(registry.delete_texture("pano"));
        assert_eq!(probe.stats().textures.released, 1);
        assert!(registry.texture(id).is_none());

        let again = registry.register_texture("pano").unwrap();
        assert_ne!(id, again);
        assert_eq!(registry.texture_count(), 1);
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut registry = registry();
        let probe = registry.backend().probe();
        registry.register_texture("a");
        registry.register_buffer(
            "b",
            BufferTarget::VertexAttributes,
            &[0.0, 1.0],
            BufferUsage::Static,
        );
        registry.teardown();
        registry.teardown();
        let stats = probe.stats();
        assert_eq!(stats.textures.released, 1);
        assert_eq!(stats.buffers.released, 1);
        assert_eq!(registry.texture_count() + registry.buffer_count(), 0);

        drop(registry);
        assert_eq!(probe.stats().live(), 0);
    }

    #[test]
    fn ids_from_before_teardown_stay_dead() {
        let mut registry = registry();
        let old = registry.register_texture("pano").unwrap();
        registry.teardown();
        let new = registry.register_texture("pano").unwrap();
        assert_ne!(old, new);
        assert!(registry.texture(old).is_none());
    }

    #[test]
    fn delete_and_register_cycles_reuse_one_slot() {
        let mut registry = registry();
        let first = registry.register_texture("pano").unwrap();
        let mut latest = first;
        for _ in 0..100 {
            assert!(registry.delete_texture("pano"));
            latest = registry.register_texture("pano").unwrap();
        }

        assert_eq!(registry.textures.slots.len(), 1);
        assert_eq!(latest.index(), first.index());
        assert_eq!(latest.generation(), 100);
        assert!(registry.texture(first).is_none());
        assert!(registry.texture(latest).is_some());
        assert_eq!(latest.to_string(), "TextureId#0.100");
    }
}
