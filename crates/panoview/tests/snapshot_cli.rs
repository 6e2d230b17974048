use std::fs;
use std::path::Path;
use std::process::Command;

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

fn write_panorama(path: &Path, pixel: [u8; 4]) {
    RgbaImage::from_pixel(128, 64, Rgba(pixel)).save(path).unwrap();
}

fn panoview() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_panoview"));
    command.env_remove("PANOVIEW_CONFIG").env("RUST_LOG", "warn");
    command
}

#[test]
fn snapshot_writes_png_at_requested_size() {
    let root = TempDir::new().unwrap();
    let panorama = root.path().join("pano.png");
    let output = root.path().join("shots/view.png");
    write_panorama(&panorama, [200, 100, 50, 255]);

    let status = panoview()
        .arg(&panorama)
        .args(["--size", "48x24", "--fov", "60", "--snapshot"])
        .arg(&output)
        .status()
        .expect("failed to run panoview --snapshot");

    assert!(status.success());
    let written = image::open(&output).unwrap().to_rgba8();
    assert_eq!(written.dimensions(), (48, 24));
    assert_eq!(*written.get_pixel(24, 12), Rgba([200, 100, 50, 255]));
}

#[test]
fn snapshot_uses_config_window_size_and_first_frame() {
    let root = TempDir::new().unwrap();
    let frames = root.path().join("frames");
    fs::create_dir_all(&frames).unwrap();
    write_panorama(&frames.join("0001.png"), [0, 255, 0, 255]);
    write_panorama(&frames.join("0002.png"), [255, 0, 0, 255]);

    let config = root.path().join("panoview.toml");
    fs::write(&config, "[window]\nwidth = 20\nheight = 10\n").unwrap();
    let output = root.path().join("frame.png");

    let status = panoview()
        .args(["--frames"])
        .arg(&frames)
        .arg("--config")
        .arg(&config)
        .arg("--snapshot")
        .arg(&output)
        .status()
        .expect("failed to run panoview with frames");

    assert!(status.success());
    let written = image::open(&output).unwrap().to_rgba8();
    assert_eq!(written.dimensions(), (20, 10));
    assert!(written.pixels().all(|pixel| *pixel == Rgba([0, 255, 0, 255])));
}

#[test]
fn invalid_config_fails_before_rendering() {
    let root = TempDir::new().unwrap();
    let panorama = root.path().join("pano.png");
    write_panorama(&panorama, [1, 2, 3, 255]);
    let config = root.path().join("bad.toml");
    fs::write(&config, "version = 7\n").unwrap();
    let output = root.path().join("never.png");

    let result = panoview()
        .arg(&panorama)
        .arg("--config")
        .arg(&config)
        .arg("--snapshot")
        .arg(&output)
        .output()
        .expect("failed to run panoview with bad config");

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("unsupported config version"), "stderr: {stderr}");
    assert!(!output.exists());
}

#[test]
fn snapshot_without_a_source_is_rejected() {
    let root = TempDir::new().unwrap();
    let status = panoview()
        .arg("--snapshot")
        .arg(root.path().join("out.png"))
        .status()
        .expect("failed to run panoview");
    assert!(!status.success());
}
