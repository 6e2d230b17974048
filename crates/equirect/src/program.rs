//! Program linking and WebGL-style attribute/uniform locations.
//!
//! Linking checks the stage interfaces on the CPU (one vertex stage, one
//! fragment stage, every fragment input fed by a vertex output, no binding
//! declared twice with different kinds) before the backend builds a pipeline.
//! A program that fails keeps its diagnostic and can never be drawn with.
//!
//! Locations are looked up by name once and cached. Names the shaders do not
//! declare resolve to [`AttributeLocation::Absent`] / [`UniformLocation::Absent`];
//! those are safe to pass along and turn later binds into no-ops.

use std::collections::HashMap;

use crate::gpu::{BackendError, GpuBackend};
use crate::shader::{
    CompiledShader, InterfaceVariable, ResourceKind, ResourceSlot, ShaderModule, ShaderStage,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum LinkError {
    #[error("no {0} shader supplied")]
    MissingStage(ShaderStage),
    #[error("more than one {0} shader supplied")]
    DuplicateStage(ShaderStage),
    #[error("fragment input '{name}' at location {location} is not written by the vertex stage")]
    UnmatchedVarying { name: String, location: u32 },
    #[error("group {group} binding {binding} is declared as both {first:?} and {second:?}")]
    ResourceConflict {
        group: u32,
        binding: u32,
        first: ResourceKind,
        second: ResourceKind,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Vertex attribute resolved against a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSlot {
    /// Shader `@location`.
    pub location: u32,
    /// Vertex buffer slot the pipeline reads this attribute from.
    pub slot: u32,
    pub format: wgpu::VertexFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeLocation {
    Found(AttributeSlot),
    Absent,
}

impl AttributeLocation {
    pub fn is_absent(&self) -> bool {
        matches!(self, AttributeLocation::Absent)
    }
}

/// Uniform resource resolved against a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformLocation {
    Found(UniformSlot),
    Absent,
}

impl UniformLocation {
    pub fn is_absent(&self) -> bool {
        matches!(self, UniformLocation::Absent)
    }
}

/// The combined interface of a vertex/fragment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLayout {
    pub vertex_entry: String,
    pub fragment_entry: String,
    /// Vertex inputs ordered by location; index in this list is the buffer slot.
    pub attributes: Vec<InterfaceVariable>,
    /// Every bound resource of both stages, ordered by group then binding.
    pub resources: Vec<ResourceSlot>,
}

impl ProgramLayout {
    pub fn attribute(&self, name: &str) -> Option<AttributeSlot> {
        self.attributes
            .iter()
            .enumerate()
            .find(|(_, attribute)| attribute.name == name)
            .and_then(|(slot, attribute)| {
                Some(AttributeSlot {
                    location: attribute.location,
                    slot: slot as u32,
                    format: attribute.format?,
                })
            })
    }

    pub fn uniform(&self, name: &str) -> Option<UniformSlot> {
        self.resources
            .iter()
            .find(|resource| resource.name == name)
            .map(|resource| UniformSlot {
                group: resource.group,
                binding: resource.binding,
                kind: resource.kind,
            })
    }

    /// Distinct bind groups used by the program, ascending.
    pub fn groups(&self) -> Vec<u32> {
        let mut groups: Vec<u32> = self.resources.iter().map(|resource| resource.group).collect();
        groups.dedup();
        groups
    }
}

/// Checks that `shaders` form exactly one vertex/fragment pair with matching
/// interfaces and returns their combined layout.
pub fn link_layout(shaders: &[&ShaderModule]) -> Result<ProgramLayout, LinkError> {
    let vertex = single_stage(shaders, ShaderStage::Vertex)?;
    let fragment = single_stage(shaders, ShaderStage::Fragment)?;

    for input in &fragment.interface().inputs {
        let fed = vertex
            .interface()
            .outputs
            .iter()
            .any(|output| output.location == input.location);
        if !fed {
            return Err(LinkError::UnmatchedVarying {
                name: input.name.clone(),
                location: input.location,
            });
        }
    }

    let mut resources: Vec<ResourceSlot> = Vec::new();
    for slot in vertex
        .interface()
        .resources
        .iter()
        .chain(&fragment.interface().resources)
    {
        match resources
            .iter()
            .find(|known| known.group == slot.group && known.binding == slot.binding)
        {
            Some(known) if known.kind != slot.kind => {
                return Err(LinkError::ResourceConflict {
                    group: slot.group,
                    binding: slot.binding,
                    first: known.kind,
                    second: slot.kind,
                });
            }
            Some(_) => {}
            None => resources.push(slot.clone()),
        }
    }
    resources.sort_by_key(|slot| (slot.group, slot.binding));

    Ok(ProgramLayout {
        vertex_entry: vertex.interface().entry_point.clone(),
        fragment_entry: fragment.interface().entry_point.clone(),
        attributes: vertex.interface().inputs.clone(),
        resources,
    })
}

fn single_stage<'a>(
    shaders: &[&'a ShaderModule],
    stage: ShaderStage,
) -> Result<&'a ShaderModule, LinkError> {
    let mut matching = shaders.iter().filter(|shader| shader.stage() == stage);
    let first = matching.next().ok_or(LinkError::MissingStage(stage))?;
    if matching.next().is_some() {
        return Err(LinkError::DuplicateStage(stage));
    }
    Ok(first)
}

pub enum ProgramState<P> {
    Linked { handle: P, layout: ProgramLayout },
    /// Link failed; holds the diagnostic.
    Failed(String),
}

/// A linked (or failed) program and its location caches.
pub struct LinkedProgram<B: GpuBackend + ?Sized> {
    name: String,
    state: ProgramState<B::Program>,
    attributes: HashMap<String, AttributeLocation>,
    uniforms: HashMap<String, UniformLocation>,
}

impl<B: GpuBackend + ?Sized> LinkedProgram<B> {
    /// Links `shaders` into a program. Never fails outright: problems leave the
    /// program in the failed state with the diagnostic attached.
    pub(crate) fn link(backend: &mut B, name: &str, shaders: &[&CompiledShader<B>]) -> Self {
        let state = match Self::try_link(backend, shaders) {
            Ok((handle, layout)) => ProgramState::Linked { handle, layout },
            Err(err) => ProgramState::Failed(err.to_string()),
        };
        Self {
            name: name.to_string(),
            state,
            attributes: HashMap::new(),
            uniforms: HashMap::new(),
        }
    }

    fn try_link(
        backend: &mut B,
        shaders: &[&CompiledShader<B>],
    ) -> Result<(B::Program, ProgramLayout), LinkError> {
        let modules: Vec<&ShaderModule> = shaders.iter().map(|shader| shader.module()).collect();
        let layout = link_layout(&modules)?;

        let stage_handle = |stage| {
            shaders
                .iter()
                .find(|shader| shader.module().stage() == stage)
                .map(|shader| shader.handle())
                .ok_or(LinkError::MissingStage(stage))
        };
        let vertex = stage_handle(ShaderStage::Vertex)?;
        let fragment = stage_handle(ShaderStage::Fragment)?;

        let handle = backend.link_program(&layout, vertex, fragment)?;
        Ok((handle, layout))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_linked(&self) -> bool {
        matches!(self.state, ProgramState::Linked { .. })
    }

    /// Backend handle; `None` when linking failed.
    pub fn handle(&self) -> Option<&B::Program> {
        match &self.state {
            ProgramState::Linked { handle, .. } => Some(handle),
            ProgramState::Failed(_) => None,
        }
    }

    pub fn layout(&self) -> Option<&ProgramLayout> {
        match &self.state {
            ProgramState::Linked { layout, .. } => Some(layout),
            ProgramState::Failed(_) => None,
        }
    }

    pub fn failure_log(&self) -> Option<&str> {
        match &self.state {
            ProgramState::Failed(log) => Some(log),
            ProgramState::Linked { .. } => None,
        }
    }

    /// Resolves and caches the location of attribute `name`.
    pub fn with_attribute(&mut self, name: &str) -> AttributeLocation {
        if let Some(location) = self.attributes.get(name) {
            return *location;
        }
        let location = match self.layout().and_then(|layout| layout.attribute(name)) {
            Some(slot) => AttributeLocation::Found(slot),
            None => {
                tracing::warn!(program = %self.name, attribute = name, "attribute not found in program");
                AttributeLocation::Absent
            }
        };
        self.attributes.insert(name.to_string(), location);
        location
    }

    /// Resolves and caches the location of uniform `name`.
    pub fn with_uniform(&mut self, name: &str) -> UniformLocation {
        if let Some(location) = self.uniforms.get(name) {
            return *location;
        }
        let location = match self.layout().and_then(|layout| layout.uniform(name)) {
            Some(slot) => UniformLocation::Found(slot),
            None => {
                tracing::warn!(program = %self.name, uniform = name, "uniform not found in program");
                UniformLocation::Absent
            }
        };
        self.uniforms.insert(name.to_string(), location);
        location
    }

    /// Cached location of an attribute previously passed to
    /// [`with_attribute`](Self::with_attribute).
    pub fn attribute_location(&self, name: &str) -> AttributeLocation {
        self.attributes.get(name).copied().unwrap_or_else(|| {
            tracing::warn!(program = %self.name, attribute = name, "attribute was never registered");
            AttributeLocation::Absent
        })
    }

    /// Cached location of a uniform previously passed to
    /// [`with_uniform`](Self::with_uniform).
    pub fn uniform_location(&self, name: &str) -> UniformLocation {
        self.uniforms.get(name).copied().unwrap_or_else(|| {
            tracing::warn!(program = %self.name, uniform = name, "uniform was never registered");
            UniformLocation::Absent
        })
    }
}
