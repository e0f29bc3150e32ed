use crate::error::{RecorderError, Result};
use crate::events::RecorderEvent;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use rdev::Key;
use retrace::keys::recorded_name;
use retrace::{
    Action, EngineConfig, HookEvent, ImageStore, InputHook, Locator, MouseButton, Point, Screen, Step,
    TimedEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often consumer threads wake up to check for a stop request.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Recorder tunables
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Delay between `start` and the first recorded event
    pub countdown_seconds: u32,

    /// Press/release closer than this (pixels) is a click, otherwise a drag
    pub click_distance: f64,

    /// Side of the square template captured around each click (pixels)
    pub image_region_size: u32,

    /// Ends the recording; never recorded itself
    pub stop_key: Key,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RecorderConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            countdown_seconds: config.countdown_seconds,
            click_distance: config.click_distance,
            image_region_size: config.image_region_size,
            stop_key: Key::Escape,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Arming,
    Recording,
}

/// Whether the session wants more events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlow {
    Continue,
    Stop,
}

/// Recording logic without threads: feed it events, read back steps.
pub struct RecordingSession {
    config: RecorderConfig,
    screen: Arc<dyn Screen>,
    images: Arc<dyn ImageStore>,
    steps: Vec<Step>,
    drag_start: Option<Point>,
    /// Index of the `mouseDown` step a short release turns into a click.
    pending_down: Option<usize>,
}

impl RecordingSession {
    pub fn new(config: RecorderConfig, screen: Arc<dyn Screen>, images: Arc<dyn ImageStore>) -> Self {
        Self {
            config,
            screen,
            images,
            steps: Vec::new(),
            drag_start: None,
            pending_down: None,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    pub fn handle(&mut self, event: &HookEvent, time: f64) -> SessionFlow {
        match event {
            HookEvent::ButtonPress { button, position } => self.on_press(*button, *position, time),
            HookEvent::ButtonRelease { button, position } => {
                self.on_release(*button, *position, time)
            }
            HookEvent::Move { position } => {
                if self.drag_start.is_some() {
                    self.steps.push(Step::move_to(*position, time));
                }
            }
            HookEvent::Wheel {
                position, delta_y, ..
            } => {
                if *delta_y != 0 {
                    self.steps.push(Step::scroll(*position, *delta_y, time));
                }
            }
            HookEvent::KeyPress { key, text } => {
                if *key == self.config.stop_key {
                    info!("Stop key pressed");
                    return SessionFlow::Stop;
                }
                let name = text.clone().unwrap_or_else(|| recorded_name(*key));
                self.steps.push(Step::keyboard(name, time));
            }
            HookEvent::KeyRelease { .. } => {}
        }
        SessionFlow::Continue
    }

    fn on_press(&mut self, button: MouseButton, position: Point, time: f64) {
        self.drag_start = Some(position);
        let mut step = Step::mouse_down(position, time);
        step.button = Some(button_name(button));
        self.pending_down = Some(self.steps.len());
        self.steps.push(step);
    }

    fn on_release(&mut self, button: MouseButton, position: Point, time: f64) {
        let start = self.drag_start.take().unwrap_or(position);
        let pending = self.pending_down.take();

        if start.distance(position) < self.config.click_distance {
            let mut click = Step::click(self.click_locator(position, time), time);
            click.button = Some(button_name(button));
            match pending {
                Some(index) if index < self.steps.len() => {
                    // Jitter between press and release is not part of a click.
                    let tail = self.steps.split_off(index + 1);
                    self.steps
                        .extend(tail.into_iter().filter(|step| step.action != Action::Move));
                    self.steps[index] = click;
                }
                _ => self.steps.push(click),
            }
            debug!("Recorded click at {}", position);
        } else {
            let mut step = Step::mouse_up(position, time);
            step.button = Some(button_name(button));
            self.steps.push(step);
            debug!("Recorded drag {} -> {}", start, position);
        }
    }

    /// Image locator with the click point as fallback; coordinates alone when the
    /// template cannot be captured or stored.
    fn click_locator(&self, position: Point, time: f64) -> Locator {
        let template = self
            .screen
            .capture_region(position, self.config.image_region_size)
            .map_err(|e| e.to_string())
            .and_then(|image| {
                self.images
                    .save_template(&image, time)
                    .map_err(|e| e.to_string())
            });
        match template {
            Ok(path) => Locator::image(path, Some(position)),
            Err(e) => {
                warn!("Recording click at {} without template: {}", position, e);
                Locator::coords(position)
            }
        }
    }
}

fn button_name(button: MouseButton) -> String {
    match button {
        MouseButton::Left => "Button.left",
        MouseButton::Right => "Button.right",
        MouseButton::Middle => "Button.middle",
    }
    .to_string()
}

struct Shared {
    state: Mutex<RecorderState>,
    /// The step buffer; pointer and keyboard consumers both write through it.
    session: Mutex<Option<RecordingSession>>,
    finalized: Mutex<Option<Vec<Step>>>,
    stop: AtomicBool,
    stop_key: Key,
    listeners: Mutex<Vec<Sender<RecorderEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn state(&self) -> RecorderState {
        *lock(&self.state)
    }

    fn publish(&self, event: RecorderEvent) {
        lock(&self.listeners).retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_state(&self, state: RecorderState) {
        *lock(&self.state) = state;
        self.publish(RecorderEvent::StateChanged(state));
    }

    /// Feeds one event to the session, stamped with the time the OS saw it.
    fn handle(&self, event: &HookEvent, time: f64) {
        match self.state() {
            RecorderState::Recording => {}
            RecorderState::Arming if self.is_stop_key(event) => {
                info!("Stop key pressed during countdown");
                self.finish(true);
                return;
            }
            _ => return,
        }
        let (flow, count) = {
            let mut session = lock(&self.session);
            let Some(session) = session.as_mut() else {
                return;
            };
            let before = session.steps().len();
            let flow = session.handle(event, time);
            let after = session.steps().len();
            (flow, (after != before || is_release(event)).then_some(after))
        };
        if let Some(count) = count {
            self.publish(RecorderEvent::StepRecorded(count));
        }
        if flow == SessionFlow::Stop {
            self.finish(true);
        }
    }

    fn is_stop_key(&self, event: &HookEvent) -> bool {
        matches!(event, HookEvent::KeyPress { key, .. } if *key == self.stop_key)
    }

    /// Ends the recording once; later calls are no-ops.
    fn finish(&self, by_key: bool) {
        let mut state = lock(&self.state);
        self.stop.store(true, Ordering::SeqCst);
        let Some(session) = lock(&self.session).take() else {
            return;
        };
        *state = RecorderState::Idle;
        drop(state);

        let steps = session.into_steps();
        let count = steps.len();
        *lock(&self.finalized) = Some(steps);
        info!("Recording stopped with {} steps", count);
        self.publish(RecorderEvent::StateChanged(RecorderState::Idle));
        self.publish(RecorderEvent::Stopped {
            steps: count,
            by_key,
        });
    }
}

fn is_release(event: &HookEvent) -> bool {
    matches!(event, HookEvent::ButtonRelease { .. })
}

/// Records steps from an [`InputHook`].
///
/// The hook must be started by the caller; the recorder only subscribes to it.
pub struct Recorder {
    hook: InputHook,
    config: RecorderConfig,
    screen: Arc<dyn Screen>,
    images: Arc<dyn ImageStore>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Recorder {
    pub fn new(
        hook: InputHook,
        config: RecorderConfig,
        screen: Arc<dyn Screen>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        let stop_key = config.stop_key;
        Self {
            hook,
            config,
            screen,
            images,
            shared: Arc::new(Shared {
                state: Mutex::new(RecorderState::Idle),
                session: Mutex::new(None),
                finalized: Mutex::new(None),
                stop: AtomicBool::new(false),
                stop_key,
                listeners: Mutex::new(Vec::new()),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.shared.state()
    }

    /// Receiver for progress notifications.
    pub fn subscribe(&self) -> Receiver<RecorderEvent> {
        let (tx, rx) = channel::unbounded();
        lock(&self.shared.listeners).push(tx);
        rx
    }

    /// Snapshot of the steps recorded so far.
    pub fn steps(&self) -> Vec<Step> {
        match lock(&self.shared.session).as_ref() {
            Some(session) => session.steps().to_vec(),
            None => lock(&self.shared.finalized).clone().unwrap_or_default(),
        }
    }

    /// Clears the buffer, then records after the countdown.
    pub fn start(&self) -> Result<()> {
        let current = self.state();
        if current != RecorderState::Idle {
            return Err(RecorderError::AlreadyActive(current));
        }
        // Consumers of a previous run exit on their own once stopped.
        self.join_workers();
        {
            let mut state = lock(&self.shared.state);
            if *state != RecorderState::Idle {
                return Err(RecorderError::AlreadyActive(*state));
            }
            *lock(&self.shared.session) = Some(RecordingSession::new(
                self.config.clone(),
                self.screen.clone(),
                self.images.clone(),
            ));
            *lock(&self.shared.finalized) = None;
            self.shared.stop.store(false, Ordering::SeqCst);
            *state = RecorderState::Arming;
        }
        info!(
            "Recording starts in {} second(s)",
            self.config.countdown_seconds
        );
        self.shared.publish(RecorderEvent::StateChanged(RecorderState::Arming));

        match self.spawn_workers() {
            Ok(workers) => {
                lock(&self.workers).extend(workers);
                Ok(())
            }
            Err(e) => {
                self.shared.finish(false);
                Err(e)
            }
        }
    }

    /// Stops recording and returns the steps. Calling it again returns the same steps.
    pub fn stop(&self) -> Vec<Step> {
        self.shared.finish(false);
        self.join_workers();
        lock(&self.shared.finalized).clone().unwrap_or_default()
    }

    fn spawn_workers(&self) -> Result<Vec<JoinHandle<()>>> {
        let mut workers = vec![
            self.spawn_consumer("retrace-recorder-pointer", is_pointer_event)?,
            self.spawn_consumer("retrace-recorder-keyboard", is_key_event)?,
        ];
        if self.config.countdown_seconds == 0 {
            self.shared.set_state(RecorderState::Recording);
        } else {
            let shared = self.shared.clone();
            let seconds = self.config.countdown_seconds;
            workers.push(
                thread::Builder::new()
                    .name("retrace-recorder-countdown".to_string())
                    .spawn(move || countdown(shared, seconds))?,
            );
        }
        Ok(workers)
    }

    fn spawn_consumer(&self, name: &str, wants: fn(&HookEvent) -> bool) -> Result<JoinHandle<()>> {
        let events = self.hook.subscribe();
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || consume(shared, events, wants))?;
        Ok(handle)
    }

    fn join_workers(&self) {
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.join_workers();
    }
}

fn is_pointer_event(event: &HookEvent) -> bool {
    !is_key_event(event)
}

fn is_key_event(event: &HookEvent) -> bool {
    matches!(event, HookEvent::KeyPress { .. } | HookEvent::KeyRelease { .. })
}

fn consume(shared: Arc<Shared>, events: Receiver<TimedEvent>, wants: fn(&HookEvent) -> bool) {
    while !shared.stop.load(Ordering::SeqCst) {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(timed) if wants(&timed.event) => shared.handle(&timed.event, timed.time),
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn countdown(shared: Arc<Shared>, seconds: u32) {
    for remaining in (1..=seconds).rev() {
        if shared.stop.load(Ordering::SeqCst) {
            return;
        }
        shared.publish(RecorderEvent::Countdown(remaining));
        thread::sleep(COUNTDOWN_TICK);
    }
    let mut state = lock(&shared.state);
    if *state == RecorderState::Arming && !shared.stop.load(Ordering::SeqCst) {
        *state = RecorderState::Recording;
        drop(state);
        info!("Recording");
        shared.publish(RecorderEvent::StateChanged(RecorderState::Recording));
    }
}
