//! Gamma-correct image slideshow for RGB LED matrix panels.
//!
//! The crate is split the way the display pipeline runs:
//! - [`store`] loads a folder of images onto the fixed panel canvas
//! - [`gamma`] and [`scaler`] dim frames in linear light
//! - [`transition`] sequences fades against a fixed frame clock ([`pacing`])
//! - [`presenter`] owns the double-buffered panel
//! - [`slideshow`] drives show → transition → show
//!
//! Everything around that core (HTTP, the control socket, the CLI) only
//! delivers images and display-parameter changes into it.

pub mod config;
pub mod control;
pub mod frame;
pub mod gamma;
#[cfg(feature = "hardware")]
pub mod matrix;
pub mod pacing;
pub mod presenter;
pub mod scaler;
pub mod server;
pub mod slideshow;
pub mod status;
pub mod store;
pub mod transition;

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

// ── Panel configuration ────────────────────────────────────────────

/// Configuration for the LED panel dimensions.
///
/// Every [`frame::RasterImage`] and [`frame::Frame`] in the pipeline has
/// exactly these dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelConfig {
    pub rows: u32,
    pub cols: u32,
}

impl PanelConfig {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Total number of pixels on the panel.
    pub fn pixel_count(&self) -> u32 {
        self.rows * self.cols
    }

    /// Number of bytes needed for a raw RGB frame (3 bytes per pixel).
    pub fn frame_byte_count(&self) -> usize {
        (self.rows * self.cols * 3) as usize
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self { rows: 64, cols: 64 }
    }
}

// ── Color ──────────────────────────────────────────────────────────

/// Our own color type, decoupled from the hardware crate.
///
/// At the hardware boundary, we convert via `Into<LedColor>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Apply the coarse panel brightness (0-100) to this color.
    ///
    /// This is the panel-level multiplier. Smooth fades never go through
    /// here; they are done in linear light by [`scaler`].
    pub fn apply_brightness(self, brightness: u8) -> Self {
        if brightness >= 100 {
            return self;
        }
        Self {
            r: ((self.r as u16 * brightness as u16) / 100) as u8,
            g: ((self.g as u16 * brightness as u16) / 100) as u8,
            b: ((self.b as u16 * brightness as u16) / 100) as u8,
        }
    }
}

/// Convert our Color to the hardware crate's LedColor at the boundary.
#[cfg(feature = "hardware")]
impl From<Color> for rpi_led_matrix::LedColor {
    fn from(c: Color) -> Self {
        rpi_led_matrix::LedColor {
            red: c.r,
            green: c.g,
            blue: c.b,
        }
    }
}

// ── Shutdown ───────────────────────────────────────────────────────

/// Cooperative shutdown flag with a prompt, bounded-latency wait.
///
/// Frame pacing and hold waits sleep on this instead of `thread::sleep`,
/// so a Ctrl+C wakes them immediately rather than after the current hold.
///
/// # Rust concept: Mutex + Condvar
/// A `Condvar` lets a thread sleep until another thread changes shared
/// state. It is always paired with a `Mutex` guarding that state (here a
/// `bool`). `wait_timeout_while` re-checks the predicate after every
/// wake-up, so spurious wake-ups are harmless, and `notify_all` in
/// `trigger` wakes every sleeper at once. The pair sits behind an `Arc` so
/// every clone shares the same flag.
#[derive(Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter.
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for up to `timeout`. Returns `true` if shutdown was requested
    /// before or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }

    /// Block until shutdown is requested.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = cvar
            .wait_while(guard, |stopped| !*stopped)
            .unwrap_or_else(|e| e.into_inner());
    }
}

/// Set up a Ctrl+C handler that triggers `shutdown`.
pub fn setup_signal_handler(shutdown: &Shutdown) -> Result<(), ctrlc::Error> {
    let s = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown requested");
        s.trigger();
    })
}

// ── Tests ──────────────────────────────────────────────────────────
