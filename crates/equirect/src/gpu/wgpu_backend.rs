use std::borrow::Cow;

use anyhow::Result;
use wgpu::util::DeviceExt;

use crate::program::ProgramLayout;
use crate::shader::{ResourceKind, ShaderModule};
use crate::texture::{SamplingPolicy, TextureImage};
use crate::types::{BufferTarget, BufferUsage, SurfaceOptions};

use super::context::GpuContext;
use super::{BackendError, BindingValue, DrawCall, GpuBackend};

/// Uniform buffers are allocated in 16-byte steps.
const UNIFORM_ALIGNMENT: u64 = 16;

pub struct WgpuShader {
    module: wgpu::ShaderModule,
}

pub struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
    layout: ProgramLayout,
    bind_group_layouts: Vec<(u32, wgpu::BindGroupLayout)>,
    /// `(group, binding, buffer)` for every uniform block.
    uniform_buffers: Vec<(u32, u32, wgpu::Buffer)>,
}

impl WgpuProgram {
    fn uniform_buffer(&self, group: u32, binding: u32) -> Option<&wgpu::Buffer> {
        self.uniform_buffers
            .iter()
            .find(|(g, b, _)| *g == group && *b == binding)
            .map(|(_, _, buffer)| buffer)
    }
}

pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    sampling: SamplingPolicy,
}

pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
}

/// [`GpuBackend`] on a real device presenting to a window surface.
pub struct WgpuBackend {
    context: GpuContext,
}

impl WgpuBackend {
    /// Opens a device able to present to `target`.
    ///
    /// Failing here means there is no usable GPU context; callers surface it
    /// to the user instead of trying to render.
    pub fn new<T>(target: T, initial_size: (u32, u32), options: SurfaceOptions) -> Result<Self>
    where
        T: wgpu::WindowHandle + 'static,
    {
        let context = GpuContext::new(target, initial_size, options)?;
        Ok(Self { context })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.context.config.format
    }

    /// Runs `f` inside a validation and an out-of-memory error scope.
    fn scoped<T>(&self, f: impl FnOnce(&GpuContext) -> T) -> Result<T, BackendError> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.context);
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(error) => Err(BackendError::from(error)),
            None => Ok(value),
        }
    }

    fn check_dimensions(&self, image: &TextureImage) -> Result<(), BackendError> {
        let limit = self.context.max_texture_dimension;
        if image.width > limit || image.height > limit {
            return Err(BackendError::TooLarge {
                what: format!("texture '{}' ({}x{})", image.label, image.width, image.height),
                limit,
            });
        }
        Ok(())
    }
}

fn create_sampler(device: &wgpu::Device, label: &str, policy: SamplingPolicy) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: policy.address_u,
        address_mode_v: policy.address_v,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: policy.mag_filter,
        min_filter: policy.min_filter,
        mipmap_filter: policy.mipmap_filter,
        ..Default::default()
    })
}

fn upload_levels(queue: &wgpu::Queue, texture: &wgpu::Texture, image: &TextureImage) {
    let mut width = image.width;
    let mut height = image.height;
    for (level, pixels) in image.levels.iter().enumerate() {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: level as u32,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        width = (width / 2).max(1);
        height = (height / 2).max(1);
    }
}

fn allocate_texture(context: &GpuContext, image: &TextureImage) -> WgpuTexture {
    let texture = context.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&image.label),
        size: wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: image.level_count(),
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: image.format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    upload_levels(&context.queue, &texture, image);
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = create_sampler(&context.device, &image.label, image.sampling);
    WgpuTexture {
        texture,
        view,
        sampler,
        sampling: image.sampling,
    }
}

impl GpuBackend for WgpuBackend {
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type Texture = WgpuTexture;
    type Buffer = WgpuBuffer;

    fn create_shader(&mut self, module: &ShaderModule) -> Result<Self::Shader, BackendError> {
        let module = self.scoped(|context| {
            context
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(module.name()),
                    source: wgpu::ShaderSource::Naga(Cow::Owned(module.naga_module().clone())),
                })
        })?;
        Ok(WgpuShader { module })
    }

    fn link_program(
        &mut self,
        layout: &ProgramLayout,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<Self::Program, BackendError> {
        let mut attributes = Vec::with_capacity(layout.attributes.len());
        for attribute in &layout.attributes {
            let format = attribute.format.ok_or_else(|| {
                BackendError::Unsupported(format!(
                    "vertex input '{}' has no vertex fetch format",
                    attribute.name
                ))
            })?;
            attributes.push((
                format.size(),
                [wgpu::VertexAttribute {
                    format,
                    offset: 0,
                    shader_location: attribute.location,
                }],
            ));
        }
        let vertex_buffers: Vec<wgpu::VertexBufferLayout<'_>> = attributes
            .iter()
            .map(|(stride, attribute)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attribute,
            })
            .collect();

        let surface_format = self.context.config.format;
        self.scoped(|context| {
            let pipeline = context
                .device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("equirectangular pipeline"),
                    layout: None,
                    vertex: wgpu::VertexState {
                        module: &vertex.module,
                        entry_point: Some(&layout.vertex_entry),
                        buffers: &vertex_buffers,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        strip_index_format: None,
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: None,
                        polygon_mode: wgpu::PolygonMode::Fill,
                        unclipped_depth: false,
                        conservative: false,
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    fragment: Some(wgpu::FragmentState {
                        module: &fragment.module,
                        entry_point: Some(&layout.fragment_entry),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: surface_format,
                            blend: Some(wgpu::BlendState::REPLACE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    multiview: None,
                    cache: None,
                });

            let bind_group_layouts = layout
                .groups()
                .into_iter()
                .map(|group| (group, pipeline.get_bind_group_layout(group)))
                .collect();

            let uniform_buffers = layout
                .resources
                .iter()
                .filter_map(|resource| match resource.kind {
                    ResourceKind::UniformBuffer { size } => {
                        let size = size.max(1).div_ceil(UNIFORM_ALIGNMENT) * UNIFORM_ALIGNMENT;
                        let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
                            label: Some(&resource.name),
                            size,
                            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                            mapped_at_creation: false,
                        });
                        Some((resource.group, resource.binding, buffer))
                    }
                    _ => None,
                })
                .collect();

            WgpuProgram {
                pipeline,
                layout: layout.clone(),
                bind_group_layouts,
                uniform_buffers,
            }
        })
    }

    fn create_texture(&mut self, image: &TextureImage) -> Result<Self::Texture, BackendError> {
        self.check_dimensions(image)?;
        self.scoped(|context| allocate_texture(context, image))
    }

    fn write_texture(
        &mut self,
        texture: &mut Self::Texture,
        image: &TextureImage,
    ) -> Result<(), BackendError> {
        self.check_dimensions(image)?;
        let same_shape = texture.texture.width() == image.width
            && texture.texture.height() == image.height
            && texture.texture.format() == image.format
            && texture.texture.mip_level_count() == image.level_count();

        if same_shape {
            self.scoped(|context| {
                upload_levels(&context.queue, &texture.texture, image);
                if texture.sampling != image.sampling {
                    texture.sampler = create_sampler(&context.device, &image.label, image.sampling);
                    texture.sampling = image.sampling;
                }
            })
        } else {
            *texture = self.scoped(|context| allocate_texture(context, image))?;
            Ok(())
        }
    }

    fn create_buffer(
        &mut self,
        label: &str,
        target: BufferTarget,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<Self::Buffer, BackendError> {
        let usages = match target {
            BufferTarget::VertexAttributes => wgpu::BufferUsages::VERTEX,
        };
        let usages = match usage {
            BufferUsage::Static => usages,
        };
        let buffer = self.scoped(|context| {
            context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage: usages,
                })
        })?;
        Ok(WgpuBuffer { buffer })
    }

    fn surface_size(&self) -> (u32, u32) {
        self.context.size()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
    }

    fn draw(&mut self, call: DrawCall<'_, Self>) -> Result<(), BackendError> {
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                return Err(BackendError::Surface("surface lost; reconfigured".to_string()));
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(BackendError::OutOfMemory("surface texture".to_string()));
            }
            Err(err) => return Err(BackendError::Surface(err.to_string())),
        };

        let program = call.program;
        let result = self.scoped(|context| -> Result<(), BackendError> {
            for binding in &call.bindings {
                if let BindingValue::Uniform { slot, bytes } = binding {
                    let Some(buffer) = program.uniform_buffer(slot.group, slot.binding) else {
                        continue;
                    };
                    let mut padded = bytes.to_vec();
                    padded.resize(bytes.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
                    padded.truncate(buffer.size() as usize);
                    context.queue.write_buffer(buffer, 0, &padded);
                }
            }

            let mut bind_groups = Vec::with_capacity(program.bind_group_layouts.len());
            for (group, group_layout) in &program.bind_group_layouts {
                let mut entries = Vec::new();
                for resource in program.layout.resources.iter().filter(|r| r.group == *group) {
                    let resource_binding = match resource.kind {
                        ResourceKind::UniformBuffer { .. } => program
                            .uniform_buffer(resource.group, resource.binding)
                            .map(|buffer| buffer.as_entire_binding()),
                        ResourceKind::Texture => call.bindings.iter().find_map(|value| match value {
                            BindingValue::Texture { slot, texture }
                                if slot.group == resource.group && slot.binding == resource.binding =>
                            {
                                Some(wgpu::BindingResource::TextureView(&texture.view))
                            }
                            _ => None,
                        }),
                        ResourceKind::Sampler => call.bindings.iter().find_map(|value| match value {
                            BindingValue::Sampler { slot, texture }
                                if slot.group == resource.group && slot.binding == resource.binding =>
                            {
                                Some(wgpu::BindingResource::Sampler(&texture.sampler))
                            }
                            _ => None,
                        }),
                        ResourceKind::StorageBuffer | ResourceKind::Other => None,
                    };
                    let resource_binding = resource_binding.ok_or(BackendError::MissingBinding {
                        group: resource.group,
                        binding: resource.binding,
                    })?;
                    entries.push(wgpu::BindGroupEntry {
                        binding: resource.binding,
                        resource: resource_binding,
                    });
                }
                let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("equirectangular bind group"),
                    layout: group_layout,
                    entries: &entries,
                });
                bind_groups.push((*group, bind_group));
            }

            let view = frame
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            let mut encoder =
                context
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("render encoder"),
                    });
            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("equirectangular pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(call.clear_color),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
                render_pass.set_pipeline(&program.pipeline);
                for (group, bind_group) in &bind_groups {
                    render_pass.set_bind_group(*group, bind_group, &[]);
                }
                for (attribute, buffer) in &call.vertex_buffers {
                    render_pass.set_vertex_buffer(attribute.slot, buffer.buffer.slice(..));
                }
                render_pass.draw(0..call.vertex_count, 0..1);
            }
            context.queue.submit(Some(encoder.finish()));
            Ok(())
        });

        match result {
            Ok(Ok(())) => {
                frame.present();
                Ok(())
            }
            Ok(Err(err)) | Err(err) => Err(err),
        }
    }
}
