//! Double-buffered presentation onto a physical (or simulated) panel.
//!
//! The [`Presenter`] owns both buffers. A frame is copied into the back
//! buffer, the panel swaps it on at vsync, and only then do the buffers
//! trade roles. Exactly one thread owns the presenter, which is what keeps
//! `present` calls serialized.

use crate::PanelConfig;
use crate::config::ConfigError;
use crate::frame::Frame;

/// A display sink with a vsync-aligned swap.
pub trait Panel {
    fn size(&self) -> PanelConfig;

    /// Scan out `frame`. Returns once it is the buffer being displayed.
    fn swap(&mut self, frame: &Frame);

    /// Set the coarse panel brightness (1-100).
    fn set_brightness(&mut self, level: u8);
}

/// Owns the front/back frame pair and the panel they are shown on.
pub struct Presenter<P: Panel> {
    panel: P,
    front: Frame,
    back: Frame,
    brightness: u8,
    presented: u64,
}

impl<P: Panel> Presenter<P> {
    pub fn new(mut panel: P, brightness: u8) -> Result<Self, ConfigError> {
        if !(1..=100).contains(&brightness) {
            return Err(ConfigError::InvalidBrightness(brightness));
        }
        panel.set_brightness(brightness);
        let size = panel.size();
        Ok(Self {
            panel,
            front: Frame::black(size),
            back: Frame::black(size),
            brightness,
            presented: 0,
        })
    }

    /// Copy `frame` into the back buffer and swap it on screen.
    pub fn present(&mut self, frame: &Frame) {
        self.back.copy_from(frame);
        self.flip();
    }

    /// Show exact black.
    pub fn clear(&mut self) {
        self.back.fill_black();
        self.flip();
    }

    fn flip(&mut self) {
        self.panel.swap(&self.back);
        std::mem::swap(&mut self.front, &mut self.back);
        self.presented += 1;
    }

    /// Change the panel brightness and re-show the front frame at the new
    /// level, so the change is visible during a hold.
    pub fn set_brightness(&mut self, level: u8) -> Result<(), ConfigError> {
        if !(1..=100).contains(&level) {
            return Err(ConfigError::InvalidBrightness(level));
        }
        if level != self.brightness {
            self.brightness = level;
            self.panel.set_brightness(level);
            self.back.copy_from(&self.front);
            self.flip();
            tracing::info!("Brightness set to {}", level);
        }
        Ok(())
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// The frame currently on screen.
    pub fn front(&self) -> &Frame {
        &self.front
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented
    }

    pub fn size(&self) -> PanelConfig {
        self.panel.size()
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }
}

// ── Software panels ──────────────────────────────────────────────────

/// Panel that keeps every frame it was asked to show. Used in tests and
/// for inspecting a run without hardware.
#[derive(Debug, Default)]
pub struct RecordingPanel {
    size: PanelConfig,
    pub frames: Vec<Frame>,
    pub brightness_changes: Vec<u8>,
}

impl RecordingPanel {
    pub fn new(size: PanelConfig) -> Self {
        Self {
            size,
            frames: Vec::new(),
            brightness_changes: Vec::new(),
        }
    }
}

impl Panel for RecordingPanel {
    fn size(&self) -> PanelConfig {
        self.size
    }

    fn swap(&mut self, frame: &Frame) {
        self.frames.push(frame.clone());
    }

    fn set_brightness(&mut self, level: u8) {
        self.brightness_changes.push(level);
    }
}

/// Panel that discards frames. Backs `--headless` runs.
#[derive(Debug)]
pub struct NullPanel {
    size: PanelConfig,
}

impl NullPanel {
    pub fn new(size: PanelConfig) -> Self {
        Self { size }
    }
}

impl Panel for NullPanel {
    fn size(&self) -> PanelConfig {
        self.size
    }

    fn swap(&mut self, frame: &Frame) {
        tracing::trace!("Headless swap ({} bytes)", frame.as_bytes().len());
    }

    fn set_brightness(&mut self, level: u8) {
        tracing::debug!("Headless brightness {}", level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use crate::frame::RasterImage;
    use pretty_assertions::assert_eq;

    fn presenter() -> Presenter<RecordingPanel> {
        Presenter::new(RecordingPanel::new(PanelConfig::new(4, 4)), 75).unwrap()
    }

    #[test]
    fn new_applies_initial_brightness() {
        let p = presenter();
        assert_eq!(p.panel().brightness_changes, vec![75]);
        assert!(p.front().is_black());
    }

    #[test]
    fn new_rejects_zero_brightness() {
        let panel = RecordingPanel::new(PanelConfig::new(4, 4));
        assert!(Presenter::new(panel, 0).is_err());
    }

    #[test]
    fn present_swaps_front_buffer() {
        let mut p = presenter();
        let img = RasterImage::solid(PanelConfig::new(4, 4), Color::new(10, 20, 30));
        let frame = Frame::from_image(&img);

        p.present(&frame);
        assert_eq!(p.front(), &frame);
        assert_eq!(p.frames_presented(), 1);
        assert_eq!(p.panel().frames, vec![frame]);
    }

    #[test]
    fn clear_presents_exact_black() {
        let mut p = presenter();
        let img = RasterImage::solid(PanelConfig::new(4, 4), Color::new(255, 255, 255));
        p.present(&Frame::from_image(&img));
        p.clear();
        assert!(p.front().is_black());
        assert!(p.panel().frames.last().unwrap().is_black());
    }

    #[test]
    fn set_brightness_validates_and_skips_no_ops() {
        let mut p = presenter();
        assert!(p.set_brightness(101).is_err());
        p.set_brightness(75).unwrap();
        p.set_brightness(40).unwrap();
        assert_eq!(p.brightness(), 40);
        assert_eq!(p.panel().brightness_changes, vec![75, 40]);
    }

    #[test]
    fn brightness_change_reshows_front_frame() {
        let mut p = presenter();
        let img = RasterImage::solid(PanelConfig::new(4, 4), Color::new(10, 20, 30));
        let frame = Frame::from_image(&img);
        p.present(&frame);

        p.set_brightness(10).unwrap();
        assert_eq!(p.panel().frames, vec![frame.clone(), frame.clone()]);
        assert_eq!(p.front(), &frame);

        // No change, no swap.
        p.set_brightness(10).unwrap();
        assert_eq!(p.panel().frames.len(), 2);
    }
}
