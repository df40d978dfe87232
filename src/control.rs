//! Control plane: commands from the outside world to the render thread.
//!
//! HTTP handlers and the Unix datagram socket both push [`ControlCommand`]s
//! into one `mpsc` channel. The render thread owns the receiving
//! [`ControlQueue`] and polls it between frames; it never blocks on it.
//!
//! Socket protocol (one command per datagram, UTF-8 text):
//! `brightness:<1-100>`, `on`, `off`, `next`, `rescan`.

use crate::Shutdown;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// Default path of the control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/ledctl.sock";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    /// Set panel brightness (1-100). Applies immediately, even mid-fade.
    SetBrightness(u8),
    /// Cut the current hold short and move to the next image.
    Next,
    /// Fade to black and stay dark until `On`.
    Off,
    On,
    /// Reload the image folder.
    Rescan,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("unknown control command {0:?}")]
    Unknown(String),
    #[error("brightness must be an integer between 1 and 100, got {0:?}")]
    InvalidBrightness(String),
}

/// Parse one control datagram.
pub fn parse_command(text: &str) -> Result<ControlCommand, ControlError> {
    let text = text.trim();
    if let Some(value) = text.strip_prefix("brightness:") {
        let level: u8 = value
            .trim()
            .parse()
            .map_err(|_| ControlError::InvalidBrightness(value.to_string()))?;
        if !(1..=100).contains(&level) {
            return Err(ControlError::InvalidBrightness(value.to_string()));
        }
        return Ok(ControlCommand::SetBrightness(level));
    }

    match text {
        "on" => Ok(ControlCommand::On),
        "off" => Ok(ControlCommand::Off),
        "next" => Ok(ControlCommand::Next),
        "rescan" => Ok(ControlCommand::Rescan),
        other => Err(ControlError::Unknown(other.to_string())),
    }
}

/// Create a connected sender / queue pair.
pub fn channel() -> (Sender<ControlCommand>, ControlQueue) {
    let (tx, rx) = mpsc::channel();
    (tx, ControlQueue { rx })
}

/// Receiving end of the control channel, owned by the render thread.
pub struct ControlQueue {
    rx: Receiver<ControlCommand>,
}

impl ControlQueue {
    /// Next pending command, if any. Never blocks.
    pub fn poll(&self) -> Option<ControlCommand> {
        match self.rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Listen for control datagrams on a Unix socket until shutdown.
///
/// A stale socket file from a previous run is replaced. Malformed
/// datagrams are logged and dropped.
#[cfg(unix)]
pub fn spawn_socket_listener(
    path: &Path,
    tx: Sender<ControlCommand>,
    shutdown: Shutdown,
) -> std::io::Result<JoinHandle<()>> {
    use std::os::unix::net::UnixDatagram;

    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let socket = UnixDatagram::bind(path)?;
    // Bounded wait so shutdown is noticed promptly.
    socket.set_read_timeout(Some(Duration::from_millis(200)))?;
    tracing::info!("Control socket listening on {}", path.display());

    let path: PathBuf = path.to_path_buf();
    let handle = std::thread::Builder::new()
        .name("control-socket".into())
        .spawn(move || {
            let mut buf = [0u8; 256];
            while !shutdown.is_triggered() {
                let len = match socket.recv(&mut buf) {
                    Ok(len) => len,
                    Err(e)
                        if matches!(
                            e.kind(),
                            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        tracing::error!("Control socket receive failed: {}", e);
                        break;
                    }
                };

                let text = String::from_utf8_lossy(&buf[..len]);
                match parse_command(&text) {
                    Ok(cmd) => {
                        tracing::info!("Control socket: {:?}", cmd);
                        if tx.send(cmd).is_err() {
                            tracing::info!("Render thread gone, closing control socket");
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Control socket: {}", e),
                }
            }

            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!("Could not remove {}: {}", path.display(), e);
            }
        })?;

    Ok(handle)
}
