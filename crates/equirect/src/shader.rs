//! Shader front-end: parsing, validation, and interface reflection.
//!
//! Sources are compiled through naga before any GPU object exists, so a bad
//! shader is reported with a full diagnostic and never reaches the backend.
//! Reflection records the entry point, its location-bound inputs/outputs and
//! the resource bindings it declares; programs resolve attribute and uniform
//! names against that record.

use std::borrow::Cow;
use std::fmt;

use wgpu::naga;
use wgpu::naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};

use crate::gpu::{BackendError, GpuBackend};

/// Pipeline stage a shader is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub(crate) fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Source language accepted by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderLanguage {
    #[default]
    Wgsl,
    /// Vulkan-flavoured GLSL 450, parsed by naga's GLSL frontend.
    Glsl,
}

/// Immutable description of a shader to register.
#[derive(Debug, Clone)]
pub struct ShaderSource {
    /// Registry key; must be unique among shaders.
    pub name: String,
    pub stage: ShaderStage,
    pub language: ShaderLanguage,
    pub code: Cow<'static, str>,
}

impl ShaderSource {
    pub fn wgsl(
        name: impl Into<String>,
        stage: ShaderStage,
        code: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            name: name.into(),
            stage,
            language: ShaderLanguage::Wgsl,
            code: code.into(),
        }
    }

    pub fn glsl(
        name: impl Into<String>,
        stage: ShaderStage,
        code: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            name: name.into(),
            stage,
            language: ShaderLanguage::Glsl,
            code: code.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to parse {stage} shader '{name}':\n{log}")]
    Parse {
        name: String,
        stage: ShaderStage,
        log: String,
    },
    #[error("{stage} shader '{name}' failed validation:\n{log}")]
    Validation {
        name: String,
        stage: ShaderStage,
        log: String,
    },
    #[error("shader '{name}' declares no {stage} entry point")]
    MissingEntryPoint { name: String, stage: ShaderStage },
    #[error("GPU rejected shader '{name}': {source}")]
    Backend {
        name: String,
        #[source]
        source: BackendError,
    },
}

/// A location-bound stage input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceVariable {
    pub name: String,
    pub location: u32,
    /// Vertex fetch format, when the type maps onto one.
    pub format: Option<wgpu::VertexFormat>,
}

/// What a bound global resource is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    UniformBuffer { size: u64 },
    StorageBuffer,
    Texture,
    Sampler,
    Other,
}

/// A `@group/@binding` global declared by a shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSlot {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
}

/// Reflected interface of a single-stage shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderInterface {
    pub entry_point: String,
    pub inputs: Vec<InterfaceVariable>,
    pub outputs: Vec<InterfaceVariable>,
    pub resources: Vec<ResourceSlot>,
}

impl ShaderInterface {
    fn reflect(module: &naga::Module, stage: ShaderStage) -> Option<Self> {
        let entry = module
            .entry_points
            .iter()
            .find(|entry| entry.stage == stage.to_naga())?;

        let mut inputs = Vec::new();
        for argument in &entry.function.arguments {
            collect_locations(
                module,
                argument.name.as_deref(),
                argument.ty,
                argument.binding.as_ref(),
                &mut inputs,
            );
        }
        inputs.sort_by_key(|variable| variable.location);

        let mut outputs = Vec::new();
        if let Some(result) = &entry.function.result {
            collect_locations(module, None, result.ty, result.binding.as_ref(), &mut outputs);
        }
        outputs.sort_by_key(|variable| variable.location);

        let resources = module
            .global_variables
            .iter()
            .filter_map(|(_, variable)| {
                let binding = variable.binding.as_ref()?;
                Some(ResourceSlot {
                    name: variable.name.clone().unwrap_or_default(),
                    group: binding.group,
                    binding: binding.binding,
                    kind: resource_kind(module, variable),
                })
            })
            .collect();

        Some(Self {
            entry_point: entry.name.clone(),
            inputs,
            outputs,
            resources,
        })
    }

    pub fn input(&self, name: &str) -> Option<&InterfaceVariable> {
        self.inputs.iter().find(|variable| variable.name == name)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceSlot> {
        self.resources.iter().find(|slot| slot.name == name)
    }
}

/// Validated shader IR plus its reflected interface.
#[derive(Debug)]
pub struct ShaderModule {
    name: String,
    stage: ShaderStage,
    module: naga::Module,
    info: ModuleInfo,
    interface: ShaderInterface,
}

impl ShaderModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn interface(&self) -> &ShaderInterface {
        &self.interface
    }

    pub fn naga_module(&self) -> &naga::Module {
        &self.module
    }

    pub fn module_info(&self) -> &ModuleInfo {
        &self.info
    }
}

/// Parses and validates `source`, then reflects its interface.
///
/// This is CPU-only; no GPU object is created.
pub fn compile(source: &ShaderSource) -> Result<ShaderModule, ShaderError> {
    let parse_error = |log: String| ShaderError::Parse {
        name: source.name.clone(),
        stage: source.stage,
        log,
    };

    let module = match source.language {
        ShaderLanguage::Wgsl => naga::front::wgsl::parse_str(&source.code)
            .map_err(|err| parse_error(err.emit_to_string(&source.code)))?,
        ShaderLanguage::Glsl => {
            let mut frontend = naga::front::glsl::Frontend::default();
            let options = naga::front::glsl::Options::from(source.stage.to_naga());
            frontend
                .parse(&options, &source.code)
                .map_err(|err| parse_error(err.emit_to_string(&source.code)))?
        }
    };

    let info = Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|err| ShaderError::Validation {
            name: source.name.clone(),
            stage: source.stage,
            log: err.emit_to_string(&source.code),
        })?;

    let interface =
        ShaderInterface::reflect(&module, source.stage).ok_or_else(|| {
            ShaderError::MissingEntryPoint {
                name: source.name.clone(),
                stage: source.stage,
            }
        })?;

    Ok(ShaderModule {
        name: source.name.clone(),
        stage: source.stage,
        module,
        info,
        interface,
    })
}

/// A shader that made it through the front-end and onto the GPU.
pub struct CompiledShader<B: GpuBackend + ?Sized> {
    module: ShaderModule,
    handle: B::Shader,
}

impl<B: GpuBackend + ?Sized> CompiledShader<B> {
    /// Runs the front-end and hands the validated IR to `backend`.
    pub(crate) fn new(backend: &mut B, source: &ShaderSource) -> Result<Self, ShaderError> {
        let module = compile(source)?;
        let handle = backend
            .create_shader(&module)
            .map_err(|source| ShaderError::Backend {
                name: module.name.clone(),
                source,
            })?;
        Ok(Self { module, handle })
    }

    pub fn module(&self) -> &ShaderModule {
        &self.module
    }

    pub fn handle(&self) -> &B::Shader {
        &self.handle
    }
}

fn collect_locations(
    module: &naga::Module,
    name: Option<&str>,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<InterfaceVariable>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push(InterfaceVariable {
            name: name.unwrap_or_default().to_string(),
            location: *location,
            format: vertex_format(&module.types[ty].inner),
        }),
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(
                        module,
                        member.name.as_deref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn vertex_format(inner: &naga::TypeInner) -> Option<wgpu::VertexFormat> {
    use naga::{ScalarKind, VectorSize};
    use wgpu::VertexFormat;

    let (kind, width, size) = match *inner {
        naga::TypeInner::Scalar(scalar) => (scalar.kind, scalar.width, None),
        naga::TypeInner::Vector { size, scalar } => (scalar.kind, scalar.width, Some(size)),
        _ => return None,
    };
    if width != 4 {
        return None;
    }

    let format = match (kind, size) {
        (ScalarKind::Float, None) => VertexFormat::Float32,
        (ScalarKind::Float, Some(VectorSize::Bi)) => VertexFormat::Float32x2,
        (ScalarKind::Float, Some(VectorSize::Tri)) => VertexFormat::Float32x3,
        (ScalarKind::Float, Some(VectorSize::Quad)) => VertexFormat::Float32x4,
        (ScalarKind::Sint, None) => VertexFormat::Sint32,
        (ScalarKind::Sint, Some(VectorSize::Bi)) => VertexFormat::Sint32x2,
        (ScalarKind::Sint, Some(VectorSize::Tri)) => VertexFormat::Sint32x3,
        (ScalarKind::Sint, Some(VectorSize::Quad)) => VertexFormat::Sint32x4,
        (ScalarKind::Uint, None) => VertexFormat::Uint32,
        (ScalarKind::Uint, Some(VectorSize::Bi)) => VertexFormat::Uint32x2,
        (ScalarKind::Uint, Some(VectorSize::Tri)) => VertexFormat::Uint32x3,
        (ScalarKind::Uint, Some(VectorSize::Quad)) => VertexFormat::Uint32x4,
        _ => return None,
    };
    Some(format)
}

fn resource_kind(module: &naga::Module, variable: &naga::GlobalVariable) -> ResourceKind {
    let inner = &module.types[variable.ty].inner;
    match variable.space {
        naga::AddressSpace::Uniform => ResourceKind::UniformBuffer {
            size: u64::from(inner.size(module.to_ctx())),
        },
        naga::AddressSpace::Storage { .. } => ResourceKind::StorageBuffer,
        naga::AddressSpace::Handle => match inner {
            naga::TypeInner::Image { .. } => ResourceKind::Texture,
            naga::TypeInner::Sampler { .. } => ResourceKind::Sampler,
            _ => ResourceKind::Other,
        },
        _ => ResourceKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equirect::{EQUIRECTANGULAR_WGSL, FULLSCREEN_TRIANGLE_WGSL};

    #[test]
    fn reflects_fullscreen_triangle_inputs() {
        let source = ShaderSource::wgsl("vs", ShaderStage::Vertex, FULLSCREEN_TRIANGLE_WGSL);
        let module = compile(&source).unwrap();
        let interface = module.interface();
        assert_eq!(interface.entry_point, "vs_main");

        let position = interface.input("a_position").unwrap();
        assert_eq!(position.location, 0);
        assert_eq!(position.format, Some(wgpu::VertexFormat::Float32x2));

        assert_eq!(interface.outputs.len(), 1);
        assert_eq!(interface.outputs[0].name, "tex_coord");
        assert!(interface.resources.is_empty());
    }

    #[test]
    fn reflects_equirectangular_resources() {
        let source = ShaderSource::wgsl("fs", ShaderStage::Fragment, EQUIRECTANGULAR_WGSL);
        let module = compile(&source).unwrap();
        let interface = module.interface();

        let view = interface.resource("u_view").unwrap();
        assert_eq!((view.group, view.binding), (0, 0));
        assert_eq!(view.kind, ResourceKind::UniformBuffer { size: 32 });
        assert_eq!(
            interface.resource("u_texture").map(|slot| slot.kind),
            Some(ResourceKind::Texture)
        );
        assert_eq!(
            interface.resource("u_sampler").map(|slot| slot.kind),
            Some(ResourceKind::Sampler)
        );
        assert_eq!(interface.inputs[0].location, 0);
    }

    #[test]
    fn syntax_errors_carry_a_diagnostic() {
        let source = ShaderSource::wgsl("broken", ShaderStage::Vertex, "fn vs_main( {");
        match compile(&source) {
            Err(ShaderError::Parse { name, log, .. }) => {
                assert_eq!(name, "broken");
                assert!(!log.is_empty());
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_stage_is_reported() {
        let source = ShaderSource::wgsl("vs", ShaderStage::Fragment, FULLSCREEN_TRIANGLE_WGSL);
        assert!(matches!(
            compile(&source),
            Err(ShaderError::MissingEntryPoint { .. })
        ));
    }

    #[test]
    fn type_errors_fail_validation() {
        let code = r"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    let a: f32 = 1.0;
    let b: u32 = 2u;
    return vec4<f32>(a + b);
}
";
        let source = ShaderSource::wgsl("bad-types", ShaderStage::Fragment, code);
        assert!(compile(&source).is_err());
    }
}
