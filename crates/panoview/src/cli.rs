use std::path::PathBuf;

use clap::Parser;
use viewconfig::ColorSpace;

#[derive(Parser, Debug)]
#[command(
    name = "panoview",
    author,
    version,
    about = "Equirectangular panorama viewer",
    arg_required_else_help = false
)]
pub struct Args {
    /// Panorama image (PNG, JPEG, BMP or GIF) in equirectangular layout.
    #[arg(value_name = "IMAGE")]
    pub image: Option<PathBuf>,

    /// Play every image in DIR, sorted by file name, as a looping frame sequence.
    #[arg(long, value_name = "DIR", conflicts_with = "image")]
    pub frames: Option<PathBuf>,

    /// Frame rate for `--frames` playback.
    #[arg(long, value_name = "FPS", value_parser = parse_fps, default_value_t = 30.0)]
    pub fps: f32,

    /// Viewer configuration TOML; can also be supplied via `PANOVIEW_CONFIG`.
    #[arg(long, value_name = "FILE", env = "PANOVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the window (or snapshot) resolution, e.g. `1280x720`.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Initial field of view in degrees.
    #[arg(long, value_name = "DEGREES")]
    pub fov: Option<f32>,

    /// Output color space handling: `gamma` or `linear`.
    #[arg(long, value_name = "MODE", value_parser = parse_color_space)]
    pub color_space: Option<ColorSpace>,

    /// Render a single view to PNG on the CPU and exit without opening a window.
    #[arg(long, value_name = "PNG")]
    pub snapshot: Option<PathBuf>,
}

pub fn parse() -> Args {
    Args::parse()
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32), String> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1920x1080".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}' in size specification", width.trim()))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}' in size specification", height.trim()))?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }

    Ok((width, height))
}

pub fn parse_fps(value: &str) -> Result<f32, String> {
    let fps: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid frame rate '{}'", value.trim()))?;
    if !fps.is_finite() || fps <= 0.0 {
        return Err(format!("frame rate must be positive, got {fps}"));
    }
    Ok(fps)
}

pub fn parse_color_space(value: &str) -> Result<ColorSpace, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("color space must not be empty".to_string());
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "gamma" | "srgb-off" => Ok(ColorSpace::Gamma),
        "linear" | "srgb" => Ok(ColorSpace::Linear),
        other => Err(format!(
            "unknown color space '{other}'; expected gamma or linear"
        )),
    }
}
