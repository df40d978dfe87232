//! Image store: discover, decode, and letterbox source images onto the
//! fixed panel canvas.
//!
//! A single corrupt image never aborts a load; it is logged and recorded
//! in the [`LoadReport`]. Only an empty result is an error.

use crate::PanelConfig;
use crate::frame::RasterImage;
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extensions we try to decode (compared case-insensitively).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no decodable images found in {}", dir.display())]
    NoImagesFound { dir: PathBuf },
}

/// Information about a single image file, as reported over HTTP.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ImageEntry {
    /// Filename (e.g., "sunset.png")
    pub name: String,
    /// File size in bytes
    pub size: u64,
}

/// One decoded, canvas-sized image and the name it was loaded from.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedImage {
    pub id: String,
    pub image: RasterImage,
}

/// A file that was listed but could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedImage {
    pub id: String,
    pub reason: String,
}

/// Result of a folder load: everything that decoded, plus warnings.
///
/// # Rust concept: errors as data
/// A bad file is not an `Err` for the whole load. It becomes a
/// [`SkippedImage`] value, so the caller can log or report it while the
/// good images are still used. Only "nothing at all" is an `Err`.
#[derive(Clone, Debug, Default)]
pub struct LoadReport {
    pub images: Vec<LoadedImage>,
    pub skipped: Vec<SkippedImage>,
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
}

/// Scan `dir` for supported image files, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_images(dir: &Path) -> Vec<ImageEntry> {
    let mut entries = Vec::new();

    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => return entries,
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_supported_image(&path) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();

        entries.push(ImageEntry { name, size });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

/// Decode one file and fit it onto the panel canvas.
pub fn load_image(path: &Path, panel: PanelConfig) -> Result<RasterImage, image::ImageError> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(letterbox(&img.to_rgb8(), panel))
}

/// Resize preserving aspect ratio so the image fits the canvas, then
/// center it on black.
pub fn letterbox(img: &RgbImage, panel: PanelConfig) -> RasterImage {
    let (w, h) = img.dimensions();
    if (w, h) == (panel.cols, panel.rows) {
        return RasterImage::from_rgb(img.clone());
    }

    let (fit_w, fit_h) = fit_within(w, h, panel.cols, panel.rows);
    let resized = imageops::resize(img, fit_w, fit_h, FilterType::Lanczos3);

    let mut canvas = RgbImage::new(panel.cols, panel.rows);
    let x = (panel.cols - fit_w) / 2;
    let y = (panel.rows - fit_h) / 2;
    imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
    RasterImage::from_rgb(canvas)
}

/// Largest `(w, h)` with the source aspect ratio that fits in the box.
fn fit_within(src_w: u32, src_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let scale = f64::min(max_w as f64 / src_w as f64, max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

/// Load every supported image in `dir`, in name order.
///
/// Files that fail to decode are skipped with a warning. Fails with
/// [`StoreError::NoImagesFound`] if the folder is missing or nothing in it
/// decodes.
pub fn load_all(dir: &Path, panel: PanelConfig) -> Result<LoadReport, StoreError> {
    let mut report = LoadReport::default();

    for entry in list_images(dir) {
        let path = dir.join(&entry.name);
        match load_image(&path, panel) {
            Ok(image) => {
                tracing::debug!("Loaded {}", entry.name);
                report.images.push(LoadedImage {
                    id: entry.name,
                    image,
                });
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {}", entry.name, e);
                report.skipped.push(SkippedImage {
                    id: entry.name,
                    reason: e.to_string(),
                });
            }
        }
    }

    if report.images.is_empty() {
        return Err(StoreError::NoImagesFound {
            dir: dir.to_path_buf(),
        });
    }

    tracing::info!(
        "Loaded {} images from {} ({} skipped)",
        report.images.len(),
        dir.display(),
        report.skipped.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use image::Rgb;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"fake").unwrap();
    }

    fn create_png(dir: &Path, name: &str, w: u32, h: u32, rgb: [u8; 3]) {
        RgbImage::from_pixel(w, h, Rgb(rgb))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn list_images_finds_supported_formats() {
        let tmp = TempDir::new().unwrap();
        for name in [
            "photo.png",
            "pic.jpg",
            "shot.JPEG",
            "anim.gif",
            "raw.bmp",
            "new.webp",
            "readme.txt",
        ] {
            create_file(tmp.path(), name);
        }

        let names: Vec<String> = list_images(tmp.path()).into_iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            vec!["anim.gif", "new.webp", "photo.png", "pic.jpg", "raw.bmp", "shot.JPEG"]
        );
    }

    #[test]
    fn list_images_returns_empty_when_no_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(list_images(&tmp.path().join("missing")).is_empty());
    }

    #[test]
    fn load_all_skips_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        create_png(tmp.path(), "a.png", 64, 64, [255, 0, 0]);
        create_png(tmp.path(), "b.png", 20, 10, [0, 255, 0]);
        create_png(tmp.path(), "c.png", 10, 40, [0, 0, 255]);
        create_file(tmp.path(), "broken.png");

        let panel = PanelConfig::new(64, 64);
        let report = load_all(tmp.path(), panel).unwrap();

        assert_eq!(report.images.len(), 3);
        for loaded in &report.images {
            assert_eq!((loaded.image.width(), loaded.image.height()), (64, 64));
        }
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, "broken.png");

        let ids: Vec<&str> = report.images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn load_all_missing_dir_is_no_images_found() {
        let tmp = TempDir::new().unwrap();
        let err = load_all(&tmp.path().join("nope"), PanelConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::NoImagesFound { .. }));
    }

    #[test]
    fn load_all_only_corrupt_is_no_images_found() {
        let tmp = TempDir::new().unwrap();
        create_file(tmp.path(), "broken.jpg");
        assert!(load_all(tmp.path(), PanelConfig::default()).is_err());
    }

    #[test]
    fn wide_image_is_letterboxed_and_centered() {
        let img = RgbImage::from_pixel(32, 16, Rgb([255, 0, 0]));
        let raster = letterbox(&img, PanelConfig::new(64, 64));

        assert_eq!((raster.width(), raster.height()), (64, 64));
        // Scaled to 64x32, centered vertically: rows 16..48 hold the image.
        assert_eq!(raster.pixel(32, 2), Color::BLACK);
        assert_eq!(raster.pixel(32, 61), Color::BLACK);
        let center = raster.pixel(32, 32);
        assert!(center.r > 200 && center.g < 30 && center.b < 30);
    }

    #[test]
    fn tall_image_is_pillarboxed() {
        let img = RgbImage::from_pixel(10, 40, Rgb([0, 0, 255]));
        let raster = letterbox(&img, PanelConfig::new(64, 64));
        assert_eq!(raster.pixel(2, 32), Color::BLACK);
        assert_eq!(raster.pixel(61, 32), Color::BLACK);
        assert!(raster.pixel(32, 32).b > 200);
    }

    #[rstest]
    #[case(32, 16, 64, 64, (64, 32))]
    #[case(10, 40, 64, 64, (16, 64))]
    #[case(128, 128, 64, 32, (32, 32))]
    #[case(64, 64, 64, 64, (64, 64))]
    fn fit_within_preserves_aspect(
        #[case] w: u32,
        #[case] h: u32,
        #[case] max_w: u32,
        #[case] max_h: u32,
        #[case] expected: (u32, u32),
    ) {
        assert_eq!(fit_within(w, h, max_w, max_h), expected);
    }
}
