use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use equirect::{PixelImage, TextureSource, ViewportEvents};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// Decodes a panorama from disk.
pub fn load_panorama(path: &Path) -> Result<PixelImage> {
    let decoded = image::open(path)
        .with_context(|| format!("failed to decode panorama {}", path.display()))?
        .to_rgba8();
    tracing::info!(
        path = %path.display(),
        width = decoded.width(),
        height = decoded.height(),
        "loaded panorama"
    );
    Ok(PixelImage::from_rgba(decoded))
}

/// Image files of a directory in file-name order.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<PathBuf>,
}

impl FrameSequence {
    pub fn discover(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("failed to read frame directory {}", dir.display()))?;
        let mut frames = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_frame_file(&path) {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            bail!("no image frames found in {}", dir.display());
        }
        frames.sort();
        tracing::debug!(dir = %dir.display(), count = frames.len(), "discovered frames");
        Ok(Self { frames })
    }

    pub fn first(&self) -> &Path {
        &self.frames[0]
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.frames
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            FRAME_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Decodes `frames` on a background thread and posts one `VideoFrame` per
/// period, looping until the viewport goes away.
pub fn spawn_player(frames: FrameSequence, fps: f32, events: ViewportEvents) -> Result<JoinHandle<()>> {
    let period = Duration::from_secs_f32(1.0 / fps);
    thread::Builder::new()
        .name("panoview-frames".to_string())
        .spawn(move || play(&frames, period, &events))
        .context("failed to spawn frame player thread")
}

fn play(frames: &FrameSequence, period: Duration, events: &ViewportEvents) {
    let mut sequence = 0u64;
    let mut deadline = Instant::now();
    loop {
        let mut decoded_any = false;
        for path in frames.paths() {
            let frame = match image::open(path) {
                Ok(decoded) => PixelImage::from_rgba(decoded.to_rgba8()),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping undecodable frame");
                    continue;
                }
            };
            decoded_any = true;
            sequence += 1;
            if !events.texture(TextureSource::VideoFrame { frame, sequence }) {
                tracing::debug!(sequence, "viewport closed; frame player exiting");
                return;
            }
            deadline += period;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            } else {
                deadline = now;
            }
        }
        if !decoded_any {
            tracing::error!("no frame in the sequence could be decoded; stopping playback");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32, pixel: [u8; 4]) {
        RgbaImage::from_pixel(width, height, Rgba(pixel))
            .save(path)
            .unwrap();
    }

    #[test]
    fn discover_sorts_and_filters_frames() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("frame_002.png"), 2, 1, [0, 0, 0, 255]);
        write_png(&dir.path().join("frame_001.PNG"), 2, 1, [0, 0, 0, 255]);
        fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let frames = FrameSequence::discover(dir.path()).unwrap();
        assert_eq!(frames.paths().len(), 2);
        assert!(frames.first().ends_with("frame_001.PNG"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(FrameSequence::discover(dir.path()).is_err());
        assert!(FrameSequence::discover(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn load_panorama_decodes_rgba() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pano.png");
        write_png(&path, 4, 2, [10, 20, 30, 255]);

        let image = load_panorama(&path).unwrap();
        assert_eq!((image.width, image.height), (4, 2));
        assert_eq!(&image.pixels[..4], &[10, 20, 30, 255]);
        assert!(load_panorama(&dir.path().join("nope.png")).is_err());
    }
}
