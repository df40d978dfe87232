//! Display status shared between the render thread (writer) and the HTTP
//! handlers (readers).

use serde::Serialize;
use std::sync::{Arc, Mutex};

/// What the display is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Idle,
    Showing,
    Transitioning,
    Off,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct DisplayStatus {
    /// Current display state
    pub state: DisplayState,
    /// Identifier (file name) of the image on screen
    pub current_image: Option<String>,
    /// Position of the current image in the sequence
    pub index: Option<usize>,
    /// Number of images in the active sequence
    pub total_images: usize,
    /// Current panel brightness (1-100)
    pub brightness: u8,
    /// Animation frames that missed their deadline since startup
    pub overruns: u64,
    /// Server version
    pub version: String,
}

impl DisplayStatus {
    pub fn new(brightness: u8) -> Self {
        Self {
            state: DisplayState::Idle,
            current_image: None,
            index: None,
            total_images: 0,
            brightness,
            overruns: 0,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn set_idle(&mut self) {
        self.state = DisplayState::Idle;
        self.current_image = None;
        self.index = None;
    }
}

pub type SharedStatus = Arc<Mutex<DisplayStatus>>;

pub fn shared(brightness: u8) -> SharedStatus {
    Arc::new(Mutex::new(DisplayStatus::new(brightness)))
}

/// Mutate the shared status. A poisoned lock still yields the data; the
/// status is informational only.
pub fn update(status: &SharedStatus, f: impl FnOnce(&mut DisplayStatus)) {
    let mut guard = status.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard);
}

pub fn snapshot(status: &SharedStatus) -> DisplayStatus {
    status.lock().unwrap_or_else(|e| e.into_inner()).clone()
}
