//! Slideshow configuration: one value object handed to the core at
//! construction time.
//!
//! The CLI and environment are folded into a [`SlideshowConfig`] by `main`.
//! Nothing inside the core reads global configuration; it is validated once
//! and then passed by reference.

use crate::PanelConfig;
use std::time::Duration;
use thiserror::Error;

/// How one slide gives way to the next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FadeMode {
    /// Fade out to true black, then fade the next image in.
    #[default]
    Sequential,
    /// Blend both images in linear light; the panel never goes dark.
    Crossfade,
}

/// Ease curve applied to transition progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Easing {
    Linear,
    /// Quadratic ease-in-out.
    Quadratic,
    /// `t²(3-2t)`
    #[default]
    Smoothstep,
}

impl Easing {
    /// Map progress in [0,1] to an eased level in [0,1].
    ///
    /// Every curve is monotonic and fixes both endpoints.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::Quadratic => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - 2.0 * (1.0 - t) * (1.0 - t)
                }
            }
            Easing::Smoothstep => t * t * (3.0 - 2.0 * t),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("gamma exponent must be a finite number greater than 0, got {0}")]
    InvalidGamma(f64),
    #[error("frame rate must be a finite number greater than 0, got {0}")]
    InvalidFps(f64),
    #[error("{name} must be a finite, non-negative number of seconds, got {value}")]
    InvalidDuration { name: &'static str, value: f64 },
    #[error("{name} of {value}s is out of range (at most {max}s)")]
    DurationOutOfRange {
        name: &'static str,
        value: f64,
        max: f64,
    },
    #[error("brightness must be between 1 and 100, got {0}")]
    InvalidBrightness(u8),
    #[error("panel size must be non-zero, got {cols}x{rows}")]
    InvalidPanel { rows: u32, cols: u32 },
}

/// Everything the transition engine and slideshow controller need.
#[derive(Clone, Debug, PartialEq)]
pub struct SlideshowConfig {
    pub panel: PanelConfig,
    /// Seconds each image is fully shown.
    pub hold_secs: f64,
    /// Per-image hold overrides, keyed by image identifier (file name).
    pub hold_overrides: Vec<(String, f64)>,
    /// Number of animation steps per fade. `0` means an instantaneous cut.
    pub fade_steps: u32,
    /// Fade frame rate.
    pub fps: f64,
    pub gamma: f64,
    /// Panel brightness (1-100).
    pub brightness: u8,
    pub shuffle: bool,
    pub fade_mode: FadeMode,
    pub easing: Easing,
    /// Pause on the black frame between fade-out and fade-in.
    pub black_pause_secs: f64,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            panel: PanelConfig::default(),
            hold_secs: 15.0,
            hold_overrides: Vec::new(),
            fade_steps: 30,
            fps: 30.0,
            gamma: 2.2,
            brightness: 75,
            shuffle: false,
            fade_mode: FadeMode::default(),
            easing: Easing::default(),
            black_pause_secs: 0.0,
        }
    }
}

impl SlideshowConfig {
    /// Reject semantically invalid settings. Nothing is clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(ConfigError::InvalidGamma(self.gamma));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(ConfigError::InvalidFps(self.fps));
        }
        check_secs("frame interval", 1.0 / self.fps)?;
        check_secs("hold duration", self.hold_secs)?;
        check_secs("black pause", self.black_pause_secs)?;
        for (_, secs) in &self.hold_overrides {
            check_secs("per-image hold duration", *secs)?;
        }
        if !(1..=100).contains(&self.brightness) {
            return Err(ConfigError::InvalidBrightness(self.brightness));
        }
        if self.panel.rows == 0 || self.panel.cols == 0 {
            return Err(ConfigError::InvalidPanel {
                rows: self.panel.rows,
                cols: self.panel.cols,
            });
        }
        Ok(())
    }

    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs_f64(self.hold_secs)
    }

    /// Hold for a specific image, falling back to the uniform hold.
    pub fn hold_for(&self, id: &str) -> Duration {
        self.hold_overrides
            .iter()
            .find(|(name, _)| name == id)
            .map(|(_, secs)| Duration::from_secs_f64(*secs))
            .unwrap_or_else(|| self.hold_duration())
    }

    pub fn black_pause(&self) -> Duration {
        Duration::from_secs_f64(self.black_pause_secs)
    }

    /// Wall-clock time between animation ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }
}

/// Longest hold, pause or frame interval accepted. Deadlines are computed
/// as `Instant + duration`, which must not overflow.
pub const MAX_DURATION_SECS: f64 = 7.0 * 24.0 * 3600.0;

fn check_secs(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidDuration { name, value });
    }
    match Duration::try_from_secs_f64(value) {
        Ok(_) if value <= MAX_DURATION_SECS => Ok(()),
        _ => Err(ConfigError::DurationOutOfRange {
            name,
            value,
            max: MAX_DURATION_SECS,
        }),
    }
}
