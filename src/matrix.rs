//! HUB75 panel driver over `rpi-led-matrix`.
//!
//! The C library is not thread-safe, so a [`MatrixPanel`] must live on the
//! single render thread that owns the [`crate::presenter::Presenter`].

use crate::frame::Frame;
use crate::presenter::Panel;
use crate::{Color, PanelConfig};
use rpi_led_matrix::{LedCanvas, LedMatrix, LedMatrixOptions, LedRuntimeOptions};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("failed to initialize LED matrix: {0}")]
    Init(String),
}

/// Create a matrix configured for our hardware:
/// Pi Zero 2 W + Adafruit Bonnet + configurable panel size.
fn create_matrix(panel: PanelConfig) -> Result<LedMatrix, PanelError> {
    let mut options = LedMatrixOptions::new();
    options.set_rows(panel.rows);
    options.set_cols(panel.cols);
    options.set_hardware_mapping("adafruit-hat");

    // Full 8-bit depth; the gamma LUT path needs every level.
    options
        .set_pwm_bits(8)
        .map_err(|e| PanelError::Init(e.to_string()))?;
    options.set_pwm_lsb_nanoseconds(130); // ~143Hz refresh

    let mut rt_options = LedRuntimeOptions::new();
    rt_options.set_gpio_slowdown(2); // Pi Zero 2 W requires slowdown=2

    LedMatrix::new(Some(options), Some(rt_options)).map_err(|e| PanelError::Init(e.to_string()))
}

/// The physical panel. Swaps are vsync-aligned by the library.
pub struct MatrixPanel {
    matrix: LedMatrix,
    canvas: Option<LedCanvas>,
    size: PanelConfig,
    brightness: u8,
}

impl MatrixPanel {
    /// Open the panel. Failure is fatal to the caller; there is no retry.
    pub fn open(size: PanelConfig) -> Result<Self, PanelError> {
        let matrix = create_matrix(size)?;
        let canvas = matrix.offscreen_canvas();
        tracing::info!("LED matrix initialized ({}x{})", size.cols, size.rows);
        Ok(Self {
            matrix,
            canvas: Some(canvas),
            size,
            brightness: 100,
        })
    }
}

impl Panel for MatrixPanel {
    fn size(&self) -> PanelConfig {
        self.size
    }

    fn swap(&mut self, frame: &Frame) {
        let Some(mut canvas) = self.canvas.take() else {
            return;
        };

        let bytes = frame.as_bytes();
        for y in 0..self.size.rows {
            for x in 0..self.size.cols {
                let offset = ((y * self.size.cols + x) * 3) as usize;
                let c = Color::new(bytes[offset], bytes[offset + 1], bytes[offset + 2])
                    .apply_brightness(self.brightness);
                canvas.set(x as i32, y as i32, &c.into());
            }
        }

        // Blocks until the next vsync and hands back the old front canvas.
        self.canvas = Some(self.matrix.swap(canvas));
    }

    fn set_brightness(&mut self, level: u8) {
        self.brightness = level.min(100);
    }
}
