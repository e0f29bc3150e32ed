use crate::recorder::RecorderState;

/// Progress notifications published by a [`crate::Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    StateChanged(RecorderState),
    /// Seconds left before recording begins.
    Countdown(u32),
    /// A step was added or replaced; carries the new step count.
    StepRecorded(usize),
    /// Recording ended. `by_key` is true when the stop key ended it.
    Stopped { steps: usize, by_key: bool },
}

