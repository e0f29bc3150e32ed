//! Script replay.
//!
//! [`PlaybackController::run`] walks a script strictly in order. Every step is
//! normalized, dispatched and logged on its own; a failing step is recorded (with a
//! screenshot when an error directory is set) and playback moves on. Pause and stop
//! requests arrive through a [`PlaybackHandle`] and are honoured between steps.

use crate::config::EngineConfig;
use crate::errors::StepError;
use crate::input::{InputDriver, InputSynthesizer};
use crate::locator::LocatorResolver;
use crate::ocr::OcrEngine;
use crate::report::{ReportBuilder, RunReport};
use crate::screen::Screen;
use crate::step::{Action, Locator, Point, Script, Step};
use crate::store::ReportStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
}

const PHASE_IDLE: u8 = 0;
const PHASE_RUNNING: u8 = 1;
const PHASE_COMPLETED: u8 = 2;
const PHASE_STOPPED: u8 = 3;

#[derive(Debug, Default)]
struct Flags {
    paused: AtomicBool,
    stopped: AtomicBool,
    phase: AtomicU8,
}

/// Lock-free control surface for a running playback. Clones share the same flags.
#[derive(Debug, Clone, Default)]
pub struct PlaybackHandle {
    flags: Arc<Flags>,
}

impl PlaybackHandle {
    pub fn pause(&self) {
        self.flags.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    /// Flips the pause flag and returns the new value.
    pub fn toggle_pause(&self) -> bool {
        !self.flags.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.flags.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.flags.stopped.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PlaybackState {
        match self.flags.phase.load(Ordering::SeqCst) {
            PHASE_RUNNING if self.is_paused() => PlaybackState::Paused,
            PHASE_RUNNING => PlaybackState::Running,
            PHASE_COMPLETED => PlaybackState::Completed,
            PHASE_STOPPED => PlaybackState::Stopped,
            _ => PlaybackState::Idle,
        }
    }

    fn begin(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
        self.flags.stopped.store(false, Ordering::SeqCst);
        self.flags.phase.store(PHASE_RUNNING, Ordering::SeqCst);
    }

    fn finish(&self) {
        let phase = if self.is_stopped() {
            PHASE_STOPPED
        } else {
            PHASE_COMPLETED
        };
        self.flags.paused.store(false, Ordering::SeqCst);
        self.flags.phase.store(phase, Ordering::SeqCst);
    }
}

/// Replays scripts against a screen and an input driver.
#[derive(Clone)]
pub struct PlaybackController {
    config: EngineConfig,
    resolver: LocatorResolver,
    input: InputSynthesizer,
    screen: Arc<dyn Screen>,
    reports: Option<Arc<dyn ReportStore>>,
    error_dir: Option<PathBuf>,
    handle: PlaybackHandle,
}

impl PlaybackController {
    pub fn new(config: EngineConfig, screen: Arc<dyn Screen>, driver: Arc<dyn InputDriver>) -> Self {
        Self {
            resolver: LocatorResolver::new(config.clone(), screen.clone()),
            input: InputSynthesizer::new(driver, &config),
            config,
            screen,
            reports: None,
            error_dir: None,
            handle: PlaybackHandle::default(),
        }
    }

    /// Enables text locators.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.resolver = self.resolver.with_ocr(ocr);
        self
    }

    /// Every finished run is handed to `store`.
    pub fn with_report_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.reports = Some(store);
        self
    }

    /// Failed steps leave a `step_<i>_error.png` screenshot in `dir`.
    pub fn with_error_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.error_dir = Some(dir.into());
        self
    }

    pub fn handle(&self) -> PlaybackHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.handle.state()
    }

    pub fn pause(&self) {
        self.handle.pause();
    }

    pub fn resume(&self) {
        self.handle.resume();
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Runs `script` on a dedicated thread.
    pub fn spawn(&self, script: Script, script_id: Option<String>) -> std::io::Result<JoinHandle<RunReport>> {
        let controller = self.clone();
        thread::Builder::new()
            .name("retrace-playback".to_string())
            .spawn(move || controller.run(&script.steps, script_id))
    }

    /// Replays `steps` and returns the report. Step failures never escape.
    #[instrument(skip(self, steps), fields(steps = steps.len()))]
    pub fn run(&self, steps: &[Step], script_id: Option<String>) -> RunReport {
        let total = steps.len();
        let started = Instant::now();
        let mut report = ReportBuilder::new(script_id, total);
        let mut last_step_time: Option<f64> = None;

        self.handle.begin();
        info!("Starting playback of {} steps", total);

        for (offset, step) in steps.iter().enumerate() {
            let index = offset + 1;
            if self.handle.is_stopped() || !self.wait_while_paused() {
                info!("Playback stopped before step {}/{}", index, total);
                break;
            }

            if let Some(time) = step.time {
                if let Some(previous) = last_step_time {
                    self.reproduce_gap(time - previous);
                }
                last_step_time = Some(time);
            }
            if self.handle.is_stopped() {
                info!("Playback stopped before step {}/{}", index, total);
                break;
            }

            debug!("Step {}/{}: {}", index, total, step.action);
            match self.execute(step) {
                Ok(()) => report.record_success(index, step.action.as_str()),
                Err(e) => {
                    error!("Step {}/{} ({}) failed: {}", index, total, step.action, e);
                    let screenshot = self.capture_failure(index);
                    report.record_failure(index, &e, screenshot);
                }
            }
        }

        let report = report.finish(started.elapsed(), self.handle.is_stopped());
        self.handle.finish();
        info!(
            "Playback finished: {}/{} steps succeeded in {:.2}s",
            report.succeeded_count, report.total_steps, report.duration_seconds
        );

        if let Some(store) = &self.reports {
            if let Err(e) = store.save(&report) {
                warn!("Failed to save run report: {}", e);
            }
        }
        report
    }

    /// Normalizes and dispatches one step.
    pub fn execute(&self, step: &Step) -> Result<(), StepError> {
        if let Some(field) = &step.malformed {
            return Err(invalid(step, field));
        }
        match &step.action {
            Action::Other(name) => Err(StepError::UnknownAction(name.clone())),
            Action::Click => {
                let point = self.locate(step)?;
                Ok(self.input.click(point)?)
            }
            Action::Move => {
                let point = self.locate(step)?;
                Ok(self.input.move_to(point)?)
            }
            Action::MouseDown => {
                let point = self.locate(step)?;
                Ok(self.input.mouse_down(point)?)
            }
            Action::MouseUp => {
                let point = self.locate(step)?;
                Ok(self.input.mouse_up(point)?)
            }
            Action::Assert => {
                let locator = locator_of(step)?;
                self.resolver
                    .resolve(&locator)
                    .map(|point| debug!("Assertion held at {}", point))
                    .map_err(|e| StepError::AssertionFailed(e.to_string()))
            }
            Action::Scroll => {
                let point = step
                    .literal_position()
                    .ok_or_else(|| invalid(step, "position"))?;
                let delta = step.delta.ok_or_else(|| invalid(step, "delta"))?;
                Ok(self.input.scroll(point, delta)?)
            }
            Action::Keyboard => {
                let key = step.key.as_deref().ok_or_else(|| invalid(step, "key"))?;
                Ok(self.input.type_text(key)?)
            }
            Action::Drag => {
                let start = step
                    .start_position
                    .ok_or_else(|| invalid(step, "start_position"))?;
                let end = step
                    .end_position
                    .ok_or_else(|| invalid(step, "end_position"))?;
                Ok(self.input.drag(start, end, self.config.drag_duration())?)
            }
        }
    }

    fn locate(&self, step: &Step) -> Result<Point, StepError> {
        let locator = locator_of(step)?;
        Ok(self.resolver.resolve(&locator)?)
    }

    /// Blocks while paused. Returns false if a stop arrives in the meantime.
    fn wait_while_paused(&self) -> bool {
        if self.handle.is_paused() {
            info!("Playback paused");
            while self.handle.is_paused() {
                if self.handle.is_stopped() {
                    return false;
                }
                thread::sleep(self.config.pause_poll_interval());
            }
            info!("Playback resumed");
        }
        !self.handle.is_stopped()
    }

    /// Sleeps for a recorded gap when it is positive and shorter than `max_step_gap`.
    /// The sleep is cut short by a stop request.
    fn reproduce_gap(&self, gap: f64) {
        if !(gap > 0.0 && gap < self.config.max_step_gap) {
            return;
        }
        debug!("Waiting {:.3}s to reproduce recorded timing", gap);
        let deadline = Instant::now() + Duration::from_secs_f64(gap);
        let slice = self
            .config
            .pause_poll_interval()
            .max(Duration::from_millis(1));
        loop {
            let now = Instant::now();
            if now >= deadline || self.handle.is_stopped() {
                break;
            }
            thread::sleep(slice.min(deadline - now));
        }
    }

    fn capture_failure(&self, index: usize) -> Option<PathBuf> {
        let dir = self.error_dir.as_deref()?;
        match save_screenshot(self.screen.as_ref(), dir, index) {
            Ok(path) => {
                info!("Saved failure screenshot {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Failed to save screenshot for step {}: {}", index, e);
                None
            }
        }
    }
}

fn locator_of(step: &Step) -> Result<Locator, StepError> {
    step.effective_locator().ok_or(StepError::MissingLocator)
}

fn invalid(step: &Step, field: &str) -> StepError {
    StepError::InvalidStep {
        action: step.action.to_string(),
        field: field.to_string(),
    }
}

fn save_screenshot(screen: &dyn Screen, dir: &Path, index: usize) -> Result<PathBuf, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("{}: {e}", dir.display()))?;
    let shot = screen.capture().map_err(|e| e.to_string())?;
    let path = dir.join(format!("step_{index}_error.png"));
    shot.image
        .save_with_format(&path, image::ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(path)
}
