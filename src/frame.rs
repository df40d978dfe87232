//! Raster buffers: immutable source images and per-step output frames.
//!
//! Both are packed RGB24, row-major, origin top-left, and always the size
//! of the panel canvas.

use crate::{Color, PanelConfig};
use image::RgbImage;
use std::sync::Arc;

/// An immutable, canvas-sized RGB image.
///
/// Cloning is cheap (the pixels sit behind an `Arc`), so sequences and the
/// render thread can share the same pixels without copying. Transitions
/// derive new [`Frame`]s and never touch these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl RasterImage {
    /// Wrap an already canvas-sized `RgbImage`.
    pub fn from_rgb(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw().into(),
        }
    }

    /// A single-colour image covering the whole panel.
    pub fn solid(panel: PanelConfig, color: Color) -> Self {
        let rgb = [color.r, color.g, color.b];
        let data: Vec<u8> = std::iter::repeat_n(rgb, panel.pixel_count() as usize)
            .flatten()
            .collect();
        Self {
            width: panel.cols,
            height: panel.rows,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        pixel_at(&self.data, self.width, x, y)
    }
}

/// One instant of display output.
///
/// Owned by whichever step produced it until it is handed to the
/// presenter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// An all-zero frame. This is exact black, not a scaled approximation.
    pub fn black(panel: PanelConfig) -> Self {
        Self {
            width: panel.cols,
            height: panel.rows,
            data: vec![0; panel.frame_byte_count()],
        }
    }

    pub(crate) fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height * 3) as usize);
        Self {
            width,
            height,
            data,
        }
    }

    /// Copy a source image unchanged.
    pub fn from_image(image: &RasterImage) -> Self {
        Self::from_raw(image.width, image.height, image.as_bytes().to_vec())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        pixel_at(&self.data, self.width, x, y)
    }

    /// Overwrite this frame with `other`, reusing the allocation.
    pub fn copy_from(&mut self, other: &Frame) {
        self.width = other.width;
        self.height = other.height;
        self.data.clear();
        self.data.extend_from_slice(&other.data);
    }

    pub fn fill_black(&mut self) {
        self.data.fill(0);
    }

    pub fn is_black(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// Sum of all channel values; a cheap brightness measure.
    pub fn total_intensity(&self) -> u64 {
        self.data.iter().map(|&b| b as u64).sum()
    }
}

fn pixel_at(data: &[u8], width: u32, x: u32, y: u32) -> Color {
    let offset = ((y * width + x) * 3) as usize;
    Color::new(data[offset], data[offset + 1], data[offset + 2])
}
