use std::path::Path;

use anyhow::{Context, Result};
use equirect::{CameraSettings, ColorSpaceMode, RendererSettings, SurfaceOptions};
use viewconfig::{ColorSpace, ViewerConfig};

use crate::cli::Args;

/// Everything the viewer needs once the config file and CLI overrides are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerSettings {
    pub window_size: (u32, u32),
    pub title: String,
    pub renderer: RendererSettings,
    pub surface: SurfaceOptions,
}

pub fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    let Some(path) = path else {
        return Ok(ViewerConfig::default());
    };
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found; using defaults");
    }
    let config = ViewerConfig::load_or_default(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded viewer config");
    Ok(config)
}

/// Applies CLI overrides on top of `config`.
pub fn resolve_settings(args: &Args, config: &ViewerConfig) -> ViewerSettings {
    let color_space = map_color_space(args.color_space.unwrap_or(config.render.color_space));
    let [r, g, b, a] = config.render.clear_color;

    let camera = CameraSettings {
        field_of_view: args.fov.unwrap_or(config.camera.field_of_view),
        zoom_sensitivity: config.camera.zoom_sensitivity,
        pitch_sensitivity: config.camera.pitch_sensitivity,
        yaw_sensitivity: config.camera.yaw_sensitivity,
        roll_sensitivity: config.camera.roll_sensitivity,
    };

    ViewerSettings {
        window_size: args
            .size
            .unwrap_or((config.window.width, config.window.height)),
        title: config.window.title.clone(),
        renderer: RendererSettings {
            clear_color: wgpu::Color { r, g, b, a },
            color_space,
            camera,
        },
        surface: SurfaceOptions {
            color_space,
            vsync: config.render.vsync,
        },
    }
}

pub fn map_color_space(value: ColorSpace) -> ColorSpaceMode {
    match value {
        ColorSpace::Gamma => ColorSpaceMode::Gamma,
        ColorSpace::Linear => ColorSpaceMode::Linear,
    }
}
