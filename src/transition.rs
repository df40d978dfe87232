//! Transition engine: fades and crossfades as a paced sequence of frames.
//!
//! A sequential transition with `N` steps presents `2N + 1` frames:
//!
//! ```text
//! FadingOut  i = 0..N      level = 1 - ease(i/N)   (first frame is full A)
//! AtBlack                  exact black, then the optional pause
//! FadingIn   i = 1..=N     level = ease(i/N)       (last frame is full B)
//! ```
//!
//! A crossfade presents `N + 1` frames, blending A and B in linear light.
//! `N = 0` is a hard cut: one frame of B at full level.
//!
//! Every frame is followed by a pacing wait against `start + (i+1)/fps`.
//! Control commands are polled between frames; brightness applies at once,
//! anything else is deferred until the transition finishes.

use crate::Shutdown;
use crate::config::{ConfigError, Easing, FadeMode, SlideshowConfig};
use crate::control::{ControlCommand, ControlQueue};
use crate::frame::{Frame, RasterImage};
use crate::gamma::GammaTable;
use crate::pacing::{Clock, FramePacer, Pace};
use crate::presenter::{Panel, Presenter};
use crate::scaler;
use crate::status::{self, SharedStatus};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often waits wake up to look at the control queue.
pub const CONTROL_POLL: Duration = Duration::from_millis(50);

/// Where the engine is within a transition. `progress` is in [0,1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransitionState {
    Idle,
    FadingOut(f64),
    AtBlack,
    FadingIn(f64),
    CrossFading(f64),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("transition cancelled by shutdown")]
pub struct Cancelled;

/// Frame and timing counts for one finished transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransitionReport {
    pub frames: u32,
    pub overruns: u32,
}

impl TransitionReport {
    fn absorb(&mut self, other: TransitionReport) {
        self.frames += other.frames;
        self.overruns += other.overruns;
    }
}

// ── Stage ────────────────────────────────────────────────────────────

/// Everything the single render thread owns: the presenter, its clock, the
/// shutdown signal, and the control queue it polls.
pub struct Stage<P: Panel, C: Clock> {
    pub presenter: Presenter<P>,
    pub clock: C,
    pub shutdown: Shutdown,
    pub status: SharedStatus,
    controls: Option<ControlQueue>,
    deferred: VecDeque<ControlCommand>,
}

impl<P: Panel, C: Clock> Stage<P, C> {
    pub fn new(presenter: Presenter<P>, clock: C, shutdown: Shutdown) -> Self {
        let status = status::shared(presenter.brightness());
        Self {
            presenter,
            clock,
            shutdown,
            status,
            controls: None,
            deferred: VecDeque::new(),
        }
    }

    pub fn with_controls(mut self, controls: ControlQueue) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn with_status(mut self, status: SharedStatus) -> Self {
        let brightness = self.presenter.brightness();
        status::update(&status, |s| s.brightness = brightness);
        self.status = status;
        self
    }

    /// Next control command that needs the caller's attention.
    ///
    /// Deferred commands come first. Brightness changes are applied here
    /// and never returned.
    pub fn next_control(&mut self) -> Option<ControlCommand> {
        if let Some(cmd) = self.deferred.pop_front() {
            return Some(cmd);
        }
        let controls = self.controls.as_ref()?;
        while let Some(cmd) = controls.poll() {
            match cmd {
                ControlCommand::SetBrightness(level) => {
                    apply_brightness(&mut self.presenter, &self.status, level)
                }
                other => return Some(other),
            }
        }
        None
    }

    /// Put a command back for the next [`Stage::next_control`] call.
    pub fn defer(&mut self, cmd: ControlCommand) {
        self.deferred.push_back(cmd);
    }

    /// Poll controls mid-transition: only brightness acts now.
    fn pump_controls(&mut self) {
        let Some(controls) = self.controls.as_ref() else {
            return;
        };
        while let Some(cmd) = controls.poll() {
            match cmd {
                ControlCommand::SetBrightness(level) => {
                    apply_brightness(&mut self.presenter, &self.status, level)
                }
                ControlCommand::Next => {
                    tracing::debug!("Ignoring next request during transition");
                }
                other => self.deferred.push_back(other),
            }
        }
    }

    /// Sleep until `deadline` with transition rules for controls: brightness
    /// applies, `Next` is dropped, the rest waits for the caller.
    fn pause_until(&mut self, deadline: Instant, poll: Duration) -> Result<(), Cancelled> {
        loop {
            self.pump_controls();
            let now = self.clock.now();
            if now >= deadline {
                return Ok(());
            }
            if !self.clock.sleep_until(deadline.min(now + poll), &self.shutdown) {
                return Err(Cancelled);
            }
        }
    }

    /// Sleep until `deadline` while still answering controls.
    ///
    /// Returns early with the first command the caller must act on.
    pub fn wait_until(
        &mut self,
        deadline: Instant,
        poll: Duration,
    ) -> Result<Option<ControlCommand>, Cancelled> {
        loop {
            if let Some(cmd) = self.next_control() {
                return Ok(Some(cmd));
            }
            let now = self.clock.now();
            if now >= deadline {
                return Ok(None);
            }
            let wake = deadline.min(now + poll);
            if !self.clock.sleep_until(wake, &self.shutdown) {
                return Err(Cancelled);
            }
        }
    }
}

fn apply_brightness<P: Panel>(presenter: &mut Presenter<P>, status: &SharedStatus, level: u8) {
    match presenter.set_brightness(level) {
        Ok(()) => status::update(status, |s| s.brightness = level),
        Err(e) => tracing::warn!("Ignoring brightness change: {}", e),
    }
}

// ── Engine ───────────────────────────────────────────────────────────

pub struct TransitionEngine {
    lut: GammaTable,
    steps: u32,
    interval: Duration,
    easing: Easing,
    mode: FadeMode,
    black_pause: Duration,
    state: TransitionState,
    scratch: Frame,
}

impl TransitionEngine {
    pub fn new(config: &SlideshowConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            lut: GammaTable::new(config.gamma)?,
            steps: config.fade_steps,
            interval: config.frame_interval(),
            easing: config.easing,
            mode: config.fade_mode,
            black_pause: config.black_pause(),
            state: TransitionState::Idle,
            scratch: Frame::black(config.panel),
        })
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    pub fn gamma_table(&self) -> &GammaTable {
        &self.lut
    }

    pub fn mode(&self) -> FadeMode {
        self.mode
    }

    /// Move from `from` (on screen) to `to` using the configured mode.
    pub fn transition<P: Panel, C: Clock>(
        &mut self,
        stage: &mut Stage<P, C>,
        from: &RasterImage,
        to: &RasterImage,
    ) -> Result<TransitionReport, Cancelled> {
        let result = if self.steps == 0 {
            self.cut(stage, to)
        } else {
            match self.mode {
                FadeMode::Sequential => self.sequential(stage, from, to),
                FadeMode::Crossfade => self.crossfade(stage, from, to),
            }
        };
        self.state = TransitionState::Idle;

        if let Ok(report) = &result {
            tracing::debug!(
                "Transition done: {} frames, {} overruns",
                report.frames,
                report.overruns
            );
        }
        result
    }

    fn sequential<P: Panel, C: Clock>(
        &mut self,
        stage: &mut Stage<P, C>,
        from: &RasterImage,
        to: &RasterImage,
    ) -> Result<TransitionReport, Cancelled> {
        let mut report = self.fade_to_black(stage, from)?;
        report.absorb(self.fade_in(stage, to)?);
        Ok(report)
    }

    /// Fade `image` out and finish on an exact black frame, followed by the
    /// configured pause.
    pub fn fade_to_black<P: Panel, C: Clock>(
        &mut self,
        stage: &mut Stage<P, C>,
        image: &RasterImage,
    ) -> Result<TransitionReport, Cancelled> {
        let mut pacer = FramePacer::new(stage.clock.now(), self.interval);
        let mut frames = 0;

        for i in 0..self.steps {
            let progress = i as f64 / self.steps as f64;
            self.state = TransitionState::FadingOut(progress);
            let level = 1.0 - self.easing.apply(progress);
            scaler::scale_into(&mut self.scratch, image, level, &self.lut);
            stage.presenter.present(&self.scratch);
            frames += 1;
            self.pace(stage, &mut pacer)?;
        }

        // LUT rounding can leave residue near zero; black is enforced here.
        self.state = TransitionState::AtBlack;
        stage.presenter.clear();
        frames += 1;
        self.pace(stage, &mut pacer)?;

        if !self.black_pause.is_zero() {
            let until = stage.clock.now() + self.black_pause;
            stage.pause_until(until, CONTROL_POLL)?;
        }

        Ok(TransitionReport {
            frames,
            overruns: pacer.overruns(),
        })
    }

    /// Fade `image` in from black. Presents `steps` frames, the last at full
    /// level, or a single full frame when `steps` is 0.
    pub fn fade_in<P: Panel, C: Clock>(
        &mut self,
        stage: &mut Stage<P, C>,
        image: &RasterImage,
    ) -> Result<TransitionReport, Cancelled> {
        if self.steps == 0 {
            return self.cut(stage, image);
        }

        let mut pacer = FramePacer::new(stage.clock.now(), self.interval);
        for i in 1..=self.steps {
            let progress = i as f64 / self.steps as f64;
            self.state = TransitionState::FadingIn(progress);
            let level = self.easing.apply(progress);
            scaler::scale_into(&mut self.scratch, image, level, &self.lut);
            stage.presenter.present(&self.scratch);
            self.pace(stage, &mut pacer)?;
        }
        self.state = TransitionState::Idle;

        Ok(TransitionReport {
            frames: self.steps,
            overruns: pacer.overruns(),
        })
    }

    fn crossfade<P: Panel, C: Clock>(
        &mut self,
        stage: &mut Stage<P, C>,
        from: &RasterImage,
        to: &RasterImage,
    ) -> Result<TransitionReport, Cancelled> {
        let mut pacer = FramePacer::new(stage.clock.now(), self.interval);

        for i in 0..=self.steps {
            let progress = i as f64 / self.steps as f64;
            self.state = TransitionState::CrossFading(progress);
            let eased = self.easing.apply(progress);
            scaler::crossfade_into(&mut self.scratch, from, 1.0 - eased, to, eased, &self.lut);
            stage.presenter.present(&self.scratch);
            self.pace(stage, &mut pacer)?;
        }

        Ok(TransitionReport {
            frames: self.steps + 1,
            overruns: pacer.overruns(),
        })
    }

    /// Instantaneous switch: one frame of `image` at full level.
    fn cut<P: Panel, C: Clock>(
        &mut self,
        stage: &mut Stage<P, C>,
        image: &RasterImage,
    ) -> Result<TransitionReport, Cancelled> {
        scaler::scale_into(&mut self.scratch, image, 1.0, &self.lut);
        stage.presenter.present(&self.scratch);
        stage.pump_controls();
        if stage.shutdown.is_triggered() {
            return Err(Cancelled);
        }
        Ok(TransitionReport {
            frames: 1,
            overruns: 0,
        })
    }

    fn pace<P: Panel, C: Clock>(
        &mut self,
        stage: &mut Stage<P, C>,
        pacer: &mut FramePacer,
    ) -> Result<(), Cancelled> {
        stage.pump_controls();
        match pacer.wait(&stage.clock, &stage.shutdown) {
            Pace::Cancelled => {
                self.state = TransitionState::Idle;
                Err(Cancelled)
            }
            Pace::Overrun(_) => {
                status::update(&stage.status, |s| s.overruns += 1);
                Ok(())
            }
            Pace::OnTime => Ok(()),
        }
    }
}
