use equirect::equirect::{
    BUFFER_NAME, FULLSCREEN_TRIANGLE, PROGRAM_NAME, TEXTURE_NAME, VERTEX_SHADER_NAME,
};
use equirect::gpu::{HeadlessBackend, HeadlessProbe, RecordedBinding};
use equirect::texture::{PixelFormat, PixelImage, TextureSource, PLACEHOLDER_PIXEL};
use equirect::{
    EquirectangularRenderer, ManualFrameClock, RenderError, RendererSettings, ShaderStage,
    TickOutcome, Viewport, ViewportState,
};

fn renderer(width: u32, height: u32) -> (EquirectangularRenderer<HeadlessBackend>, HeadlessProbe) {
    let backend = HeadlessBackend::new(width, height);
    let probe = backend.probe();
    (
        EquirectangularRenderer::new(backend, RendererSettings::default()),
        probe,
    )
}

#[test]
fn render_before_initialize_is_rejected() {
    let (mut renderer, probe) = renderer(64, 64);
    assert!(matches!(renderer.render(), Err(RenderError::Uninitialized)));
    assert_eq!(probe.draw_count(), 0);
}

#[test]
fn initialize_then_render_draws_without_lookup_misses() {
    let (mut renderer, probe) = renderer(800, 400);
    renderer.initialize().unwrap();
    renderer.render().unwrap();

    assert_eq!(renderer.registry().lookup_misses(), 0);
    let draw = probe.last_draw().unwrap();
    assert_eq!(draw.vertex_count, 3);
    assert_eq!(draw.clear_color, wgpu::Color::WHITE);
    assert_eq!(draw.vertex_buffers.len(), 1);
    assert!(draw
        .bindings
        .iter()
        .any(|binding| matches!(binding, RecordedBinding::Texture { binding: 1, .. })));
    assert!(draw
        .bindings
        .iter()
        .any(|binding| matches!(binding, RecordedBinding::Sampler { binding: 2, .. })));
}

#[test]
fn registered_resources_round_trip_by_name() {
    let (mut renderer, _probe) = renderer(64, 64);
    renderer.initialize().unwrap();
    let registry = renderer.registry_mut();

    assert!(registry.get_program(PROGRAM_NAME).unwrap().is_linked());
    let buffer = registry.get_buffer(BUFFER_NAME).unwrap();
    assert_eq!(buffer.len(), FULLSCREEN_TRIANGLE.len());
    assert_eq!(buffer.size_in_bytes(), 24);
    let texture = registry.get_texture(TEXTURE_NAME).unwrap();
    assert!(!texture.is_initialized());
    assert_eq!(texture.handle().pixels(), Some(&PLACEHOLDER_PIXEL[..]));
    assert_eq!(registry.lookup_misses(), 0);

    assert!(registry.get_texture("nope").is_none());
    assert_eq!(registry.lookup_misses(), 1);
}

#[test]
fn duplicate_registration_keeps_the_first_handle() {
    let (mut renderer, probe) = renderer(64, 64);
    renderer.initialize().unwrap();
    let registry = renderer.registry_mut();

    let texture = registry.texture_id(TEXTURE_NAME).unwrap();
    let handle = registry.texture(texture).unwrap().handle().id();
    assert_eq!(registry.register_texture(TEXTURE_NAME), Some(texture));
    assert_eq!(registry.texture(texture).unwrap().handle().id(), handle);

    let buffer = registry.buffer_id(BUFFER_NAME).unwrap();
    let buffer_handle = registry.buffer(buffer).unwrap().handle().id();
    assert_eq!(
        registry.register_buffer(
            BUFFER_NAME,
            equirect::BufferTarget::VertexAttributes,
            &[0.0; 12],
            equirect::BufferUsage::Static,
        ),
        Some(buffer)
    );
    assert_eq!(registry.buffer(buffer).unwrap().handle().id(), buffer_handle);
    assert_eq!(registry.buffer(buffer).unwrap().len(), 6);

    let shader = registry.shader_id(VERTEX_SHADER_NAME).unwrap();
    assert_eq!(
        registry.register_shader(VERTEX_SHADER_NAME, ShaderStage::Vertex, "fn nope() {}"),
        Some(shader)
    );

    let stats = probe.stats();
    assert_eq!(stats.textures.created, 1);
    assert_eq!(stats.buffers.created, 1);
    assert_eq!(stats.shaders.created, 2);
}

#[test]
fn cleanup_releases_everything_exactly_once() {
    let (mut renderer, probe) = renderer(64, 64);
    renderer.initialize().unwrap();
    renderer.render().unwrap();
    renderer.cleanup();
    renderer.cleanup();

    let stats = probe.stats();
    assert_eq!(stats.shaders.released, stats.shaders.created);
    assert_eq!(stats.programs.released, stats.programs.created);
    assert_eq!(stats.textures.released, stats.textures.created);
    assert_eq!(stats.buffers.released, stats.buffers.created);
    assert_eq!(stats.live(), 0);
    assert!(matches!(renderer.render(), Err(RenderError::Uninitialized)));
}

#[test]
fn failed_draw_does_not_block_later_frames() {
    let (mut renderer, probe) = renderer(64, 64);
    renderer.initialize().unwrap();
    renderer.registry_mut().backend_mut().set_fail_draws(true);
    assert!(matches!(renderer.render(), Err(RenderError::Draw(_))));

    renderer.registry_mut().backend_mut().set_fail_draws(false);
    renderer.render().unwrap();
    let stats = probe.stats();
    assert_eq!(stats.failed_draws, 1);
    assert_eq!(stats.draws.len(), 1);
}

#[test]
fn texture_updates_follow_the_mipmap_policy() {
    let (mut renderer, _probe) = renderer(64, 64);
    renderer.initialize().unwrap();

    let square = PixelImage::new(256, 256, PixelFormat::Rgba8, vec![90; 256 * 256 * 4]);
    assert!(renderer.update_texture_source(&TextureSource::Still(square)));
    let texture = renderer.registry_mut().get_texture(TEXTURE_NAME).unwrap();
    assert!(texture.is_power_of_two());
    assert!(texture.sampling().mipmapped);
    assert_eq!(texture.sampling().mipmap_filter, wgpu::FilterMode::Linear);

    let frame = PixelImage::new(300, 200, PixelFormat::Rgb8, vec![10; 300 * 200 * 3]);
    assert!(renderer.update_texture_source(&TextureSource::VideoFrame { frame, sequence: 1 }));
    let texture = renderer.registry_mut().get_texture(TEXTURE_NAME).unwrap();
    assert!(!texture.is_power_of_two());
    let sampling = texture.sampling();
    assert!(!sampling.mipmapped);
    assert_eq!(sampling.min_filter, wgpu::FilterMode::Linear);
    assert_eq!(sampling.address_u, wgpu::AddressMode::ClampToEdge);
    assert_eq!(sampling.address_v, wgpu::AddressMode::ClampToEdge);
    assert_eq!(texture.last_sequence(), Some(1));
}

#[test]
fn stopping_a_viewport_cancels_the_pending_frame() {
    let (renderer, probe) = renderer(64, 64);
    let mut viewport = Viewport::new(renderer, ManualFrameClock::new());
    viewport.start().unwrap();

    let first = viewport.clock_mut().fire().unwrap();
    assert_eq!(viewport.tick(first), TickOutcome::Rendered);
    let pending = viewport.pending_frame().unwrap();

    viewport.stop();
    assert_eq!(viewport.state(), ViewportState::Stopped);
    assert_eq!(viewport.clock().cancelled(), &[pending]);
    assert!(viewport.clock().pending().is_empty());
    assert_eq!(viewport.tick(pending), TickOutcome::Ignored);

    viewport.stop();
    assert_eq!(probe.stats().live(), 0);
    assert_eq!(probe.draw_count(), 1);
}
