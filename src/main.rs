//! LED matrix slideshow
//!
//! Loads a folder of images and cycles through them on the panel with
//! gamma-correct fades, while an HTTP API and a Unix control socket on the
//! Pi accept brightness, next, on/off and rescan commands.
//!
//! ## Architecture
//! - **Render thread** (std::thread): owns the LED matrix and runs the slideshow
//! - **Rescan thread**: the only writer of the published image sequence
//! - **Control socket thread**: turns datagrams into commands
//! - **HTTP server** (tokio/axum): accepts API requests, sends commands via channel
//!
//! ## Usage
//! ```sh
//! sudo ./target/release/led-slideshow --image-dir /home/pi/matrix_images --fps 30
//! LED_SLIDESHOW_HEADLESS=true cargo run --no-default-features
//! ```

use clap::Parser;
use led_slideshow::config::{ConfigError, Easing, FadeMode, SlideshowConfig};
use led_slideshow::control::{self, ControlCommand, ControlQueue};
use led_slideshow::pacing::SystemClock;
use led_slideshow::presenter::{NullPanel, Panel, Presenter};
use led_slideshow::server::{self, AppState};
use led_slideshow::slideshow::{self, SequenceHandle, SlideSequence, SlideshowController};
use led_slideshow::status::{self, SharedStatus};
use led_slideshow::store::{self, StoreError};
use led_slideshow::transition::Stage;
use led_slideshow::{PanelConfig, Shutdown};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// LED matrix image slideshow
#[derive(Debug, Parser)]
#[command(name = "led-slideshow")]
#[command(about = "Gamma-correct fading image slideshow for an RGB LED matrix")]
#[command(version)]
struct Args {
    /// Folder of images to show
    #[arg(long, env = "LED_SLIDESHOW_IMAGE_DIR", default_value = "matrix_images")]
    image_dir: PathBuf,

    /// Number of rows on the LED panel
    #[arg(long, env = "LED_SLIDESHOW_ROWS", default_value = "64")]
    rows: u32,

    /// Number of columns on the LED panel
    #[arg(long, env = "LED_SLIDESHOW_COLS", default_value = "64")]
    cols: u32,

    /// Seconds each image is fully shown
    #[arg(long, env = "LED_SLIDESHOW_HOLD_SECS", default_value = "15")]
    hold_secs: f64,

    /// Per-image hold as NAME=SECS; repeatable
    #[arg(
        long = "hold-override",
        env = "LED_SLIDESHOW_HOLD_OVERRIDES",
        value_delimiter = ',',
        value_parser = parse_hold_override
    )]
    hold_overrides: Vec<(String, f64)>,

    /// Animation steps per fade (0 = instant cut)
    #[arg(long, env = "LED_SLIDESHOW_FADE_STEPS", default_value = "30")]
    fade_steps: u32,

    /// Fade frame rate
    #[arg(long, env = "LED_SLIDESHOW_FPS", default_value = "30")]
    fps: f64,

    /// Display gamma exponent
    #[arg(long, env = "LED_SLIDESHOW_GAMMA", default_value = "2.2")]
    gamma: f64,

    /// Panel brightness (1-100)
    #[arg(long, env = "LED_SLIDESHOW_BRIGHTNESS", default_value = "75")]
    brightness: u8,

    /// Shuffle the image order once at load
    #[arg(long, env = "LED_SLIDESHOW_SHUFFLE")]
    shuffle: bool,

    #[arg(long, env = "LED_SLIDESHOW_FADE_MODE", value_enum, default_value_t = FadeMode::Sequential)]
    fade_mode: FadeMode,

    #[arg(long, env = "LED_SLIDESHOW_EASING", value_enum, default_value_t = Easing::Smoothstep)]
    easing: Easing,

    /// Seconds to stay black between fade-out and fade-in
    #[arg(long, env = "LED_SLIDESHOW_BLACK_PAUSE_SECS", default_value = "0")]
    black_pause_secs: f64,

    /// Reload the folder every N seconds when its contents change (0 = off)
    #[arg(long, env = "LED_SLIDESHOW_RESCAN_SECS", default_value = "0")]
    rescan_secs: u64,

    /// Port to listen on
    #[arg(long, env = "LED_SLIDESHOW_PORT", default_value = "8080")]
    port: u16,

    /// Unix datagram socket for text control commands
    #[arg(long, env = "LED_SLIDESHOW_CONTROL_SOCKET", default_value = control::DEFAULT_SOCKET_PATH)]
    control_socket: PathBuf,

    /// Run without the panel (frames are counted, not shown)
    #[arg(long, env = "LED_SLIDESHOW_HEADLESS")]
    headless: bool,
}

impl Args {
    fn slideshow_config(&self) -> SlideshowConfig {
        SlideshowConfig {
            panel: PanelConfig::new(self.rows, self.cols),
            hold_secs: self.hold_secs,
            hold_overrides: self.hold_overrides.clone(),
            fade_steps: self.fade_steps,
            fps: self.fps,
            gamma: self.gamma,
            brightness: self.brightness,
            shuffle: self.shuffle,
            fade_mode: self.fade_mode,
            easing: self.easing,
            black_pause_secs: self.black_pause_secs,
        }
    }
}

fn parse_hold_override(s: &str) -> Result<(String, f64), String> {
    let (name, secs) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=SECS, got {s:?}"))?;
    let secs: f64 = secs
        .trim()
        .parse()
        .map_err(|_| format!("invalid seconds in {s:?}"))?;
    Ok((name.trim().to_string(), secs))
}

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[cfg(feature = "hardware")]
    #[error(transparent)]
    Panel(#[from] led_slideshow::matrix::PanelError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("render thread exited during startup")]
    RenderThreadGone,
}

/// Everything the render thread needs to build its controller.
struct RenderSetup {
    config: SlideshowConfig,
    sequences: SequenceHandle,
    controls: ControlQueue,
    status: SharedStatus,
    shutdown: Shutdown,
    rescan: Sender<()>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), StartupError> {
    let config = args.slideshow_config();
    config.validate()?;

    let image_dir = args.image_dir.canonicalize().unwrap_or_else(|_| {
        tracing::warn!("Could not canonicalize image dir, using as-is");
        args.image_dir.clone()
    });

    tracing::info!("LED Slideshow v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Panel: {}x{}", config.panel.cols, config.panel.rows);
    tracing::info!("Image dir: {}", image_dir.display());
    tracing::info!(
        "Hold {}s, {} fade steps at {} fps, gamma {}, brightness {}",
        config.hold_secs,
        config.fade_steps,
        config.fps,
        config.gamma,
        config.brightness
    );

    let report = store::load_all(&image_dir, config.panel)?;
    let sequence = SlideSequence::from_report(report, &config).ok_or_else(|| {
        StoreError::NoImagesFound {
            dir: image_dir.clone(),
        }
    })?;
    let sequences = SequenceHandle::new(sequence);

    let shutdown = Shutdown::new();
    led_slideshow::setup_signal_handler(&shutdown)?;

    // All control sources feed this one channel; only the render thread reads it.
    let (command_tx, controls) = control::channel();
    let status = status::shared(config.brightness);

    let rescan_interval = (args.rescan_secs > 0).then(|| Duration::from_secs(args.rescan_secs));
    let (rescan_tx, rescan_handle) = slideshow::spawn_rescanner(
        image_dir.clone(),
        config.clone(),
        sequences.clone(),
        rescan_interval,
        shutdown.clone(),
    )?;

    let socket_handle = spawn_control_socket(&args.control_socket, &command_tx, &shutdown);

    let setup = RenderSetup {
        config,
        sequences,
        controls,
        status: status.clone(),
        shutdown: shutdown.clone(),
        rescan: rescan_tx,
    };
    let (ready_tx, ready_rx) = mpsc::channel();
    let headless = args.headless;
    let render_handle = std::thread::Builder::new()
        .name("render".into())
        .spawn(move || render_thread(setup, headless, ready_tx))?;

    // Panel and controller construction happen on the render thread.
    match ready_rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            shutdown.trigger();
            join("render", render_handle);
            return Err(e);
        }
        Err(_) => {
            shutdown.trigger();
            join("render", render_handle);
            return Err(StartupError::RenderThreadGone);
        }
    }

    let app = server::create_router(AppState {
        command_tx,
        status,
        image_dir,
    });

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            shutdown.trigger();
            join("render", render_handle);
            return Err(e.into());
        }
    };
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);

    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::task::spawn_blocking(move || server_shutdown.wait()).await {
                tracing::error!("Shutdown watcher failed: {}", e);
            }
        })
        .await;
    if let Err(e) = &served {
        tracing::error!("Server error: {}", e);
    }

    shutdown.trigger();
    join("render", render_handle);
    join("rescan", rescan_handle);
    if let Some(handle) = socket_handle {
        join("control socket", handle);
    }
    tracing::info!("Goodbye");

    served.map_err(StartupError::from)
}

#[cfg(unix)]
fn spawn_control_socket(
    path: &std::path::Path,
    tx: &Sender<ControlCommand>,
    shutdown: &Shutdown,
) -> Option<JoinHandle<()>> {
    match control::spawn_socket_listener(path, tx.clone(), shutdown.clone()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(
                "Control socket {} unavailable, continuing without it: {}",
                path.display(),
                e
            );
            None
        }
    }
}

#[cfg(not(unix))]
fn spawn_control_socket(
    _path: &std::path::Path,
    _tx: &Sender<ControlCommand>,
    _shutdown: &Shutdown,
) -> Option<JoinHandle<()>> {
    None
}

fn join(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!("{} thread panicked", name);
    }
}

/// Open the panel on this thread and run the slideshow until shutdown.
fn render_thread(setup: RenderSetup, headless: bool, ready: Sender<Result<(), StartupError>>) {
    let size = setup.config.panel;

    #[cfg(feature = "hardware")]
    if !headless {
        match led_slideshow::matrix::MatrixPanel::open(size) {
            Ok(panel) => return drive(panel, setup, ready),
            Err(e) => {
                report_ready(&ready, Err(e.into()));
                return;
            }
        }
    }

    if !headless {
        tracing::warn!("Built without the hardware feature; running headless");
    }
    drive(NullPanel::new(size), setup, ready)
}

fn drive<P: Panel>(panel: P, setup: RenderSetup, ready: Sender<Result<(), StartupError>>) {
    match build_controller(panel, setup) {
        Ok(mut controller) => {
            report_ready(&ready, Ok(()));
            controller.run();
        }
        Err(e) => report_ready(&ready, Err(e.into())),
    }
}

fn build_controller<P: Panel>(
    panel: P,
    setup: RenderSetup,
) -> Result<SlideshowController<P, SystemClock>, ConfigError> {
    let presenter = Presenter::new(panel, setup.config.brightness)?;
    let stage = Stage::new(presenter, SystemClock, setup.shutdown)
        .with_controls(setup.controls)
        .with_status(setup.status);
    Ok(SlideshowController::new(&setup.config, stage, setup.sequences)?.with_rescan(setup.rescan))
}

fn report_ready(ready: &Sender<Result<(), StartupError>>, result: Result<(), StartupError>) {
    if ready.send(result).is_err() {
        tracing::warn!("Startup listener gone before the render thread reported");
    }
}
