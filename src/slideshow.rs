//! Slideshow controller: show → transition → show, forever.
//!
//! The controller owns the [`Stage`] (and so the panel) on the render
//! thread. Image sequences arrive through a [`SequenceHandle`]: a loader
//! builds a complete [`SlideSequence`] and publishes it in one swap, and
//! the controller picks it up at the next slide boundary. A partially
//! loaded sequence is never visible.

use crate::config::{ConfigError, SlideshowConfig};
use crate::control::ControlCommand;
use crate::frame::RasterImage;
use crate::pacing::Clock;
use crate::presenter::Panel;
use crate::status::{self, DisplayState};
use crate::store::{self, LoadReport};
use crate::transition::{CONTROL_POLL, Cancelled, Stage, TransitionEngine};
use crate::Shutdown;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// One image in the show and how long it stays up.
#[derive(Clone, Debug, PartialEq)]
pub struct Slide {
    pub id: String,
    pub image: RasterImage,
    pub hold: Duration,
}

/// An ordered, non-empty list of slides.
#[derive(Clone, Debug, PartialEq)]
pub struct SlideSequence {
    slides: Vec<Slide>,
}

impl SlideSequence {
    /// Build from a load report, applying per-image holds and shuffling if
    /// configured. Returns `None` for an empty report.
    pub fn from_report(report: LoadReport, config: &SlideshowConfig) -> Option<Self> {
        let mut slides: Vec<Slide> = report
            .images
            .into_iter()
            .map(|loaded| Slide {
                hold: config.hold_for(&loaded.id),
                id: loaded.id,
                image: loaded.image,
            })
            .collect();

        if slides.is_empty() {
            return None;
        }
        if config.shuffle {
            slides.shuffle(&mut rand::rng());
        }
        Some(Self { slides })
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn get(&self, index: usize) -> &Slide {
        &self.slides[index % self.slides.len()]
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.slides.iter().position(|s| s.id == id)
    }

    /// Identifiers in sorted order, independent of shuffling.
    pub fn sorted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slides.iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids
    }
}

/// Single-writer/single-reader handoff of whole sequences.
///
/// `publish` swaps in a fully built sequence; `load` returns whichever
/// complete sequence was published last.
///
/// # Rust concept: `Arc<Mutex<Arc<T>>>`
/// The outer `Arc<Mutex<..>>` is the shared slot. The inner `Arc<T>` is the
/// value in it. `load` clones the inner `Arc` and releases the lock, so the
/// render thread can hold an old sequence for as long as it likes while the
/// rescanner puts a new one in the slot. Nobody ever sees a half-built
/// sequence because the swap is a single pointer assignment under the lock.
/// The `AtomicU64` generation lets the reader notice a publish without
/// taking the lock on every frame.
#[derive(Clone)]
pub struct SequenceHandle {
    current: Arc<Mutex<Arc<SlideSequence>>>,
    generation: Arc<AtomicU64>,
}

impl SequenceHandle {
    pub fn new(initial: SlideSequence) -> Self {
        Self {
            current: Arc::new(Mutex::new(Arc::new(initial))),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publish(&self, sequence: SlideSequence) {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(sequence);
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn load(&self) -> Arc<SlideSequence> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Bumped on every publish.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Why a hold ended.
enum HoldEnd {
    Elapsed,
    Next,
}

pub struct SlideshowController<P: Panel, C: Clock> {
    engine: TransitionEngine,
    stage: Stage<P, C>,
    sequences: SequenceHandle,
    sequence: Arc<SlideSequence>,
    generation: u64,
    index: usize,
    /// The slide on screen; kept separately so a newly published sequence
    /// can't pull it out from under a fade.
    current: Slide,
    rescan: Option<Sender<()>>,
}

impl<P: Panel, C: Clock> SlideshowController<P, C> {
    pub fn new(
        config: &SlideshowConfig,
        stage: Stage<P, C>,
        sequences: SequenceHandle,
    ) -> Result<Self, ConfigError> {
        let engine = TransitionEngine::new(config)?;
        let generation = sequences.generation();
        let sequence = sequences.load();
        let current = sequence.get(0).clone();
        Ok(Self {
            engine,
            stage,
            sequences,
            sequence,
            generation,
            index: 0,
            current,
            rescan: None,
        })
    }

    /// Forward `rescan` control requests to a background loader.
    pub fn with_rescan(mut self, rescan: Sender<()>) -> Self {
        self.rescan = Some(rescan);
        self
    }

    pub fn stage(&self) -> &Stage<P, C> {
        &self.stage
    }

    pub fn engine(&self) -> &TransitionEngine {
        &self.engine
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Move to the next slide, wrapping at the end. Returns the new index.
    pub fn advance(&mut self) -> usize {
        self.index = (self.index + 1) % self.sequence.len();
        self.index
    }

    pub fn current_hold_duration(&self) -> Duration {
        self.current.hold
    }

    /// Run until shutdown, then leave the panel black.
    pub fn run(&mut self) {
        tracing::info!(
            "Slideshow starting with {} images ({:?} fades)",
            self.sequence.len(),
            self.engine.mode()
        );

        // Both only return once shutdown is requested.
        if self.start().is_ok() {
            while self.step().is_ok() {}
        }

        self.stage.presenter.clear();
        status::update(&self.stage.status, |s| s.set_idle());
        tracing::info!(
            "Slideshow stopped after {} frames; panel cleared",
            self.stage.presenter.frames_presented()
        );
    }

    /// Fade the first slide in from black.
    pub fn start(&mut self) -> Result<(), Cancelled> {
        tracing::info!("Displaying {}", self.current.id);
        self.publish_status(DisplayState::Transitioning);
        let report = self.engine.fade_in(&mut self.stage, &self.current.image)?;
        self.record_overruns(report.overruns);
        self.publish_status(DisplayState::Showing);
        Ok(())
    }

    /// Hold the current slide, then transition to the next one.
    pub fn step(&mut self) -> Result<(), Cancelled> {
        if let HoldEnd::Next = self.hold()? {
            tracing::info!("Advancing on request");
        }

        self.pick_up_new_sequence();
        let next_index = self.advance();
        let next = self.sequence.get(next_index).clone();

        tracing::info!("Displaying {}", next.id);
        self.publish_status(DisplayState::Transitioning);
        let report = self
            .engine
            .transition(&mut self.stage, &self.current.image, &next.image)?;
        self.record_overruns(report.overruns);

        self.current = next;
        self.publish_status(DisplayState::Showing);
        Ok(())
    }

    /// Wait out the current hold, answering control commands.
    fn hold(&mut self) -> Result<HoldEnd, Cancelled> {
        let mut deadline = self.stage.clock.now() + self.current.hold;
        loop {
            match self.stage.wait_until(deadline, CONTROL_POLL)? {
                None => return Ok(HoldEnd::Elapsed),
                Some(ControlCommand::Next) => return Ok(HoldEnd::Next),
                Some(ControlCommand::Off) => {
                    self.go_dark()?;
                    deadline = self.stage.clock.now() + self.current.hold;
                }
                Some(ControlCommand::On) => {
                    tracing::debug!("Already on");
                }
                Some(ControlCommand::Rescan) => self.request_rescan(),
                // Applied by `next_control` and never handed out.
                Some(ControlCommand::SetBrightness(_)) => {}
            }
        }
    }

    /// Fade to black and stay there until `On`, then fade back in.
    fn go_dark(&mut self) -> Result<(), Cancelled> {
        tracing::info!("Display off");
        self.publish_status(DisplayState::Transitioning);
        let report = self
            .engine
            .fade_to_black(&mut self.stage, &self.current.image)?;
        self.record_overruns(report.overruns);
        self.publish_status(DisplayState::Off);

        loop {
            let until = self.stage.clock.now() + CONTROL_POLL;
            match self.stage.wait_until(until, CONTROL_POLL)? {
                Some(ControlCommand::On) => break,
                Some(ControlCommand::Rescan) => self.request_rescan(),
                Some(other) => tracing::debug!("Display off, ignoring {:?}", other),
                None => {}
            }
        }

        tracing::info!("Display on");
        self.pick_up_new_sequence();
        self.publish_status(DisplayState::Transitioning);
        let report = self.engine.fade_in(&mut self.stage, &self.current.image)?;
        self.record_overruns(report.overruns);
        self.publish_status(DisplayState::Showing);
        Ok(())
    }

    fn request_rescan(&self) {
        match &self.rescan {
            Some(tx) => {
                if tx.send(()).is_err() {
                    tracing::warn!("Rescan requested but the loader has stopped");
                }
            }
            None => tracing::warn!("Rescan requested but no loader is running"),
        }
    }

    /// Switch to the latest published sequence, keeping our place if the
    /// current image is still in it.
    fn pick_up_new_sequence(&mut self) {
        let generation = self.sequences.generation();
        if generation == self.generation {
            return;
        }
        self.generation = generation;
        self.sequence = self.sequences.load();
        self.index = self
            .sequence
            .position(&self.current.id)
            .unwrap_or(self.index % self.sequence.len());
        tracing::info!(
            "Switched to new sequence of {} images",
            self.sequence.len()
        );
    }

    fn record_overruns(&self, overruns: u32) {
        if overruns > 0 {
            tracing::warn!("Transition had {} late frames", overruns);
        }
    }

    fn publish_status(&self, state: DisplayState) {
        let id = self.current.id.clone();
        let index = self.index;
        let total = self.sequence.len();
        status::update(&self.stage.status, |s| {
            s.state = state;
            s.current_image = Some(id);
            s.index = Some(index);
            s.total_images = total;
        });
    }
}

// ── Background rescan ────────────────────────────────────────────────

/// Load `dir` and build a sequence, or `None` if nothing decodes.
pub fn load_sequence(dir: &Path, config: &SlideshowConfig) -> Option<SlideSequence> {
    match store::load_all(dir, config.panel) {
        Ok(report) => SlideSequence::from_report(report, config),
        Err(e) => {
            tracing::warn!("Rescan: {}", e);
            None
        }
    }
}

/// Longest the rescanner sleeps before looking at shutdown again.
const RESCAN_WAKE: Duration = Duration::from_millis(200);

/// File names in `dir` that the store would try to load, in name order.
fn listed_names(dir: &Path) -> Vec<String> {
    store::list_images(dir).into_iter().map(|e| e.name).collect()
}

/// Spawn the single writer of `sequences`.
///
/// It reloads the folder when asked through the returned sender (always
/// publishes) and, with `interval` set, periodically. A periodic check
/// compares the folder listing with the one seen at the last reload,
/// undecodable files included, and only reloads when it differs. A failed
/// reload keeps the previous sequence.
pub fn spawn_rescanner(
    dir: PathBuf,
    config: SlideshowConfig,
    sequences: SequenceHandle,
    interval: Option<Duration>,
    shutdown: Shutdown,
) -> std::io::Result<(Sender<()>, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel::<()>();

    let handle = std::thread::Builder::new()
        .name("rescan".into())
        .spawn(move || {
            let mut last_listed = listed_names(&dir);
            let mut next_due = interval.map(|i| Instant::now() + i);
            let tick = interval.map_or(RESCAN_WAKE, |i| i.min(RESCAN_WAKE));
            while !shutdown.is_triggered() {
                let forced = match rx.recv_timeout(tick) {
                    Ok(()) => true,
                    Err(RecvTimeoutError::Timeout) => false,
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                let due = next_due.is_some_and(|t| Instant::now() >= t);
                if !forced && !due {
                    continue;
                }
                if let Some(i) = interval {
                    next_due = Some(Instant::now() + i);
                }

                let listed = listed_names(&dir);
                if !forced && listed == last_listed {
                    continue;
                }
                // Recorded even if nothing decodes, so a broken folder is
                // not reloaded again until it changes.
                last_listed = listed;

                if let Some(sequence) = load_sequence(&dir, &config) {
                    tracing::info!("Rescan published {} images", sequence.len());
                    sequences.publish(sequence);
                }
            }
        })?;

    Ok((tx, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{self, ControlCommand};
    use crate::pacing::ManualClock;
    use crate::presenter::{Presenter, RecordingPanel};
    use crate::store::LoadedImage;
    use crate::{Color, PanelConfig};
    use pretty_assertions::assert_eq;

    const PANEL: PanelConfig = PanelConfig { rows: 4, cols: 4 };

    fn config() -> SlideshowConfig {
        SlideshowConfig {
            panel: PANEL,
            hold_secs: 1.0,
            fade_steps: 4,
            fps: 20.0,
            ..Default::default()
        }
    }

    fn report(names: &[&str]) -> LoadReport {
        LoadReport {
            images: names
                .iter()
                .enumerate()
                .map(|(i, name)| LoadedImage {
                    id: name.to_string(),
                    image: RasterImage::solid(PANEL, Color::new(50 * (i as u8 + 1), 0, 0)),
                })
                .collect(),
            skipped: Vec::new(),
        }
    }

    fn sequence(names: &[&str]) -> SlideSequence {
        SlideSequence::from_report(report(names), &config()).unwrap()
    }

    fn controller(names: &[&str]) -> SlideshowController<RecordingPanel, ManualClock> {
        let presenter = Presenter::new(RecordingPanel::new(PANEL), 75).unwrap();
        let stage = Stage::new(presenter, ManualClock::new(), Shutdown::new());
        SlideshowController::new(&config(), stage, SequenceHandle::new(sequence(names))).unwrap()
    }

    #[test]
    fn advance_is_cyclic() {
        let mut c = controller(&["a", "b", "c"]);
        let start = c.current_index();
        let visited: Vec<usize> = (0..3).map(|_| c.advance()).collect();
        assert_eq!(visited, vec![1, 2, 0]);
        assert_eq!(c.current_index(), start);
    }

    #[test]
    fn empty_report_builds_no_sequence() {
        assert!(SlideSequence::from_report(LoadReport::default(), &config()).is_none());
    }

    #[test]
    fn per_image_hold_override() {
        let cfg = SlideshowConfig {
            hold_overrides: vec![("b".to_string(), 3.0)],
            ..config()
        };
        let seq = SlideSequence::from_report(report(&["a", "b"]), &cfg).unwrap();
        assert_eq!(seq.get(0).hold, Duration::from_secs(1));
        assert_eq!(seq.get(1).hold, Duration::from_secs(3));
    }

    #[test]
    fn shuffle_keeps_every_image() {
        let cfg = SlideshowConfig {
            shuffle: true,
            ..config()
        };
        let seq = SlideSequence::from_report(report(&["a", "b", "c", "d"]), &cfg).unwrap();
        assert_eq!(seq.sorted_ids(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn step_holds_then_transitions() {
        let mut c = controller(&["a", "b"]);
        c.start().unwrap();
        assert_eq!(c.stage().presenter.panel().frames.len(), 4);

        c.step().unwrap();
        assert_eq!(c.current_index(), 1);
        // 4 fade-in + 9 transition frames.
        assert_eq!(c.stage().presenter.panel().frames.len(), 13);
        // 0.2s fade in, 1s hold, 0.45s transition.
        assert_eq!(c.stage().clock.elapsed(), Duration::from_millis(1650));
        assert_eq!(status::snapshot(&c.stage().status).state, DisplayState::Showing);
    }

    #[test]
    fn next_command_cuts_hold_short() {
        let (tx, queue) = control::channel();
        let presenter = Presenter::new(RecordingPanel::new(PANEL), 75).unwrap();
        let stage = Stage::new(presenter, ManualClock::new(), Shutdown::new()).with_controls(queue);
        let mut c =
            SlideshowController::new(&config(), stage, SequenceHandle::new(sequence(&["a", "b"])))
                .unwrap();

        tx.send(ControlCommand::Next).unwrap();
        c.step().unwrap();
        assert_eq!(c.current_index(), 1);
        // No hold time, just the 9-frame transition.
        assert_eq!(c.stage().clock.elapsed(), Duration::from_millis(450));
    }

    #[test]
    fn brightness_during_hold_reaches_panel_at_once() {
        let (tx, queue) = control::channel();
        let presenter = Presenter::new(RecordingPanel::new(PANEL), 75).unwrap();
        let stage = Stage::new(presenter, ManualClock::new(), Shutdown::new()).with_controls(queue);
        let mut c =
            SlideshowController::new(&config(), stage, SequenceHandle::new(sequence(&["a", "b"])))
                .unwrap();
        c.start().unwrap();

        tx.send(ControlCommand::SetBrightness(10)).unwrap();
        let until = c.stage.clock.now() + Duration::from_millis(500);
        assert_eq!(c.stage.wait_until(until, CONTROL_POLL), Ok(None));

        let panel = c.stage().presenter.panel();
        assert_eq!(panel.brightness_changes, vec![75, 10]);
        // The held frame is swapped again so the new level is scanned out.
        assert_eq!(panel.frames.len(), 5);
        assert_eq!(panel.frames[4], panel.frames[3]);
        assert_eq!(status::snapshot(&c.stage().status).brightness, 10);
    }

    #[test]
    fn off_then_on_fades_out_and_back_in() {
        let (tx, queue) = control::channel();
        let presenter = Presenter::new(RecordingPanel::new(PANEL), 75).unwrap();
        let stage = Stage::new(presenter, ManualClock::new(), Shutdown::new()).with_controls(queue);
        let mut c =
            SlideshowController::new(&config(), stage, SequenceHandle::new(sequence(&["a", "b"])))
                .unwrap();

        tx.send(ControlCommand::Off).unwrap();
        tx.send(ControlCommand::On).unwrap();
        c.step().unwrap();

        let frames = &c.stage().presenter.panel().frames;
        // Off: 4 fade + black; On: 4 fade in; then the regular 9-frame transition.
        assert_eq!(frames.len(), 18);
        assert!(frames[4].is_black());
        assert_eq!(frames[8], frames[0]);
    }

    #[test]
    fn published_sequence_is_picked_up_at_slide_boundary() {
        let mut c = controller(&["a", "b"]);
        c.sequences.publish(sequence(&["a", "b", "c"]));
        assert_eq!(c.sequence.len(), 2);

        c.step().unwrap();
        assert_eq!(c.sequence.len(), 3);
        assert_eq!(c.current.id, "b");
    }

    #[test]
    fn shutdown_leaves_panel_black() {
        let mut c = controller(&["a", "b"]);
        c.stage.shutdown.trigger();
        c.run();
        assert!(c.stage().presenter.front().is_black());
        assert_eq!(status::snapshot(&c.stage().status).state, DisplayState::Idle);
    }

    #[test]
    fn sequence_handle_swaps_whole_sequences() {
        let handle = SequenceHandle::new(sequence(&["a"]));
        let before = handle.load();
        let generation = handle.generation();

        handle.publish(sequence(&["x", "y"]));
        assert_eq!(handle.generation(), generation + 1);
        assert_eq!(before.len(), 1);
        assert_eq!(handle.load().len(), 2);
    }

    #[test]
    fn rescanner_publishes_on_request() {
        use image::{Rgb, RgbImage};
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        let save = |name: &str| {
            RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]))
                .save(tmp.path().join(name))
                .unwrap();
        };
        save("a.png");

        let cfg = config();
        let handle = SequenceHandle::new(load_sequence(tmp.path(), &cfg).unwrap());
        let shutdown = Shutdown::new();
        let (tx, join) = spawn_rescanner(
            tmp.path().to_path_buf(),
            cfg,
            handle.clone(),
            None,
            shutdown.clone(),
        )
        .unwrap();

        save("b.png");
        tx.send(()).unwrap();
        for _ in 0..200 {
            if handle.generation() > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handle.load().sorted_ids(), vec!["a.png", "b.png"]);

        shutdown.trigger();
        join.join().unwrap();
    }

    #[test]
    fn periodic_rescan_ignores_unchanged_folder_with_corrupt_file() {
        use image::{Rgb, RgbImage};
        use tempfile::TempDir;

        let tmp = TempDir::new().unwrap();
        let save = |name: &str| {
            RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]))
                .save(tmp.path().join(name))
                .unwrap();
        };
        save("a.png");
        std::fs::write(tmp.path().join("broken.png"), b"not a png").unwrap();

        let cfg = config();
        let handle = SequenceHandle::new(load_sequence(tmp.path(), &cfg).unwrap());
        let shutdown = Shutdown::new();
        let (_tx, join) = spawn_rescanner(
            tmp.path().to_path_buf(),
            cfg,
            handle.clone(),
            Some(Duration::from_millis(20)),
            shutdown.clone(),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(handle.generation(), 0);

        // Write then rename, so the rescanner never lists a half-written file.
        let partial = tmp.path().join("b.partial");
        RgbImage::from_pixel(4, 4, Rgb([40, 50, 60]))
            .save_with_format(&partial, image::ImageFormat::Png)
            .unwrap();
        std::fs::rename(&partial, tmp.path().join("b.png")).unwrap();
        for _ in 0..200 {
            if handle.generation() > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handle.generation(), 1);
        assert_eq!(handle.load().sorted_ids(), vec!["a.png", "b.png"]);

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(handle.generation(), 1);

        shutdown.trigger();
        join.join().unwrap();
    }
}
