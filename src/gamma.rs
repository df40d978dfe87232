//! Forward/inverse gamma lookup tables over the 8-bit channel domain.

use crate::config::ConfigError;

/// Precomputed `to_gamma` / `to_linear` tables for one gamma exponent.
///
/// Built once at startup and shared read-only; rebuilding only happens if
/// the exponent changes.
#[derive(Clone, Debug, PartialEq)]
pub struct GammaTable {
    gamma: f64,
    to_gamma: [u8; 256],
    to_linear: [u8; 256],
}

impl GammaTable {
    /// Build both tables for `gamma`.
    ///
    /// `to_gamma[v] = round(255 * (v/255)^gamma)` and
    /// `to_linear[v] = round(255 * (v/255)^(1/gamma))`, both clamped to
    /// `0..=255`.
    pub fn new(gamma: f64) -> Result<Self, ConfigError> {
        if !gamma.is_finite() || gamma <= 0.0 {
            return Err(ConfigError::InvalidGamma(gamma));
        }
        Ok(Self::build(gamma))
    }

    fn build(gamma: f64) -> Self {
        let mut to_gamma = [0u8; 256];
        let mut to_linear = [0u8; 256];
        for v in 0..256 {
            let x = v as f64 / 255.0;
            to_gamma[v] = quantize(x.powf(gamma));
            to_linear[v] = quantize(x.powf(1.0 / gamma));
        }

        Self {
            gamma,
            to_gamma,
            to_linear,
        }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    #[inline]
    pub fn to_gamma(&self, v: u8) -> u8 {
        self.to_gamma[v as usize]
    }

    #[inline]
    pub fn to_linear(&self, v: u8) -> u8 {
        self.to_linear[v as usize]
    }
}

impl Default for GammaTable {
    fn default() -> Self {
        Self::build(2.2)
    }
}

fn quantize(x: f64) -> u8 {
    (x * 255.0).round().clamp(0.0, 255.0) as u8
}
