use std::path::Path;

use anyhow::{Context, Result};
use equirect::projection::render_view;
use equirect::{Camera, PixelImage};
use image::ImageFormat;

use crate::bootstrap::ViewerSettings;

/// Renders one view of `panorama` on the CPU and writes it to `output` as PNG.
pub fn write_snapshot(panorama: &PixelImage, settings: &ViewerSettings, output: &Path) -> Result<()> {
    let source = panorama
        .to_rgba()
        .context("panorama cannot be converted to RGBA")?;
    let camera = Camera::new(settings.renderer.camera);
    let (width, height) = settings.window_size;
    let view = render_view(&source, width, height, &camera);

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    view.save_with_format(output, ImageFormat::Png)
        .with_context(|| format!("failed to write snapshot {}", output.display()))?;
    tracing::info!(
        path = %output.display(),
        width,
        height,
        fov = camera.field_of_view(),
        "snapshot written"
    );
    Ok(())
}
