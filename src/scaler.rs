//! Perceptual brightness scaling in linear light.
//!
//! Each channel is linearized with [`GammaTable::to_linear`], multiplied by
//! an 8.8 fixed-point factor, clamped, and re-encoded with
//! [`GammaTable::to_gamma`]. Scaling the encoded values directly makes fades
//! visibly jump near black.

use crate::frame::{Frame, RasterImage};
use crate::gamma::GammaTable;

/// Convert a factor in [0,1] to 8.8 fixed point (`0..=256`).
#[inline]
pub fn fixed_factor(factor: f64) -> u32 {
    (factor.clamp(0.0, 1.0) * 256.0).round() as u32
}

/// Scale `image` by `factor` and return a new frame.
///
/// `factor == 0` is exact black; `factor == 1` reproduces the source within
/// one unit per channel (the LUT round trip).
pub fn scale(image: &RasterImage, factor: f64, lut: &GammaTable) -> Frame {
    let mut out = blank_for(image);
    scale_into(&mut out, image, factor, lut);
    out
}

/// Like [`scale`], but writes into an existing frame.
pub fn scale_into(out: &mut Frame, image: &RasterImage, factor: f64, lut: &GammaTable) {
    let f = fixed_factor(factor);
    if f == 0 {
        out.fill_black();
        return;
    }

    for (dst, &src) in out.as_bytes_mut().iter_mut().zip(image.as_bytes()) {
        let linear = (lut.to_linear(src) as u32 * f) >> 8;
        *dst = lut.to_gamma(linear.min(255) as u8);
    }
}

/// Blend two images in linear light.
///
/// `a` contributes `factor_a`, `b` contributes `factor_b`; the linear sum is
/// clamped before re-encoding. With `(1, 0)` or `(0, 1)` the result equals
/// `scale(a, 1)` or `scale(b, 1)` exactly.
pub fn crossfade(
    a: &RasterImage,
    factor_a: f64,
    b: &RasterImage,
    factor_b: f64,
    lut: &GammaTable,
) -> Frame {
    let mut out = blank_for(a);
    crossfade_into(&mut out, a, factor_a, b, factor_b, lut);
    out
}

pub fn crossfade_into(
    out: &mut Frame,
    a: &RasterImage,
    factor_a: f64,
    b: &RasterImage,
    factor_b: f64,
    lut: &GammaTable,
) {
    let fa = fixed_factor(factor_a);
    let fb = fixed_factor(factor_b);

    let pixels = out
        .as_bytes_mut()
        .iter_mut()
        .zip(a.as_bytes().iter().zip(b.as_bytes()));
    for (dst, (&pa, &pb)) in pixels {
        let sum = (lut.to_linear(pa) as u32 * fa + lut.to_linear(pb) as u32 * fb) >> 8;
        *dst = lut.to_gamma(sum.min(255) as u8);
    }
}

fn blank_for(image: &RasterImage) -> Frame {
    let len = (image.width() * image.height() * 3) as usize;
    Frame::from_raw(image.width(), image.height(), vec![0; len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Color, PanelConfig};
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    /// Every channel value appears somewhere in the image.
    fn gradient_image() -> RasterImage {
        let img = RgbImage::from_fn(16, 16, |x, y| {
            let v = (y * 16 + x) as u8;
            Rgb([v, 255 - v, v / 2])
        });
        RasterImage::from_rgb(img)
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(0.5, 128)]
    #[case(1.0, 256)]
    #[case(-3.0, 0)]
    #[case(7.0, 256)]
    fn fixed_factor_cases(#[case] factor: f64, #[case] expected: u32) {
        assert_eq!(fixed_factor(factor), expected);
    }

    #[rstest]
    #[case(1.0)]
    #[case(2.2)]
    #[case(2.8)]
    fn zero_factor_is_exact_black(#[case] gamma: f64) {
        let lut = GammaTable::new(gamma).unwrap();
        assert!(scale(&gradient_image(), 0.0, &lut).is_black());
    }

    #[rstest]
    #[case(1.0)]
    #[case(1.8)]
    #[case(2.2)]
    #[case(2.4)]
    fn full_factor_reproduces_source(#[case] gamma: f64) {
        let lut = GammaTable::new(gamma).unwrap();
        let src = gradient_image();
        let out = scale(&src, 1.0, &lut);
        for (&o, &s) in out.as_bytes().iter().zip(src.as_bytes()) {
            assert!((o as i16 - s as i16).abs() <= 1, "{s} -> {o}");
        }
    }

    #[test]
    fn scaling_is_monotonic_in_factor() {
        let lut = GammaTable::default();
        let src = gradient_image();
        let mut last = 0;
        for i in 0..=20 {
            let total = scale(&src, i as f64 / 20.0, &lut).total_intensity();
            assert!(total >= last);
            last = total;
        }
    }

    #[test]
    fn half_factor_halves_linear_light() {
        // 255 * 128 >> 8 = 127 linear, re-encoded: 255 * (127/255)^2.2 = 55.02
        let lut = GammaTable::new(2.2).unwrap();
        let white = RasterImage::solid(PanelConfig::new(1, 1), Color::new(255, 255, 255));
        let px = scale(&white, 0.5, &lut).pixel(0, 0);
        assert_eq!(px, Color::new(55, 55, 55));
    }

    #[test]
    fn crossfade_endpoints_match_scale() {
        let lut = GammaTable::default();
        let a = gradient_image();
        let b = RasterImage::solid(PanelConfig::new(16, 16), Color::new(200, 10, 90));

        assert_eq!(crossfade(&a, 1.0, &b, 0.0, &lut), scale(&a, 1.0, &lut));
        assert_eq!(crossfade(&a, 0.0, &b, 1.0, &lut), scale(&b, 1.0, &lut));
    }

    #[test]
    fn crossfade_sum_is_clamped() {
        let lut = GammaTable::default();
        let white = RasterImage::solid(PanelConfig::new(2, 2), Color::new(255, 255, 255));
        let out = crossfade(&white, 1.0, &white, 1.0, &lut);
        assert_eq!(out.pixel(1, 1), Color::new(255, 255, 255));
    }

    #[test]
    fn scale_into_reuses_buffer() {
        let lut = GammaTable::default();
        let src = gradient_image();
        let mut out = scale(&src, 1.0, &lut);
        scale_into(&mut out, &src, 0.0, &lut);
        assert!(out.is_black());
    }
}
