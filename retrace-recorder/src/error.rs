use crate::recorder::RecorderState;
use retrace::HookError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Recorder is already active ({0:?})")]
    AlreadyActive(RecorderState),

    #[error("Failed to start recorder thread: {0}")]
    Thread(#[from] std::io::Error),

    #[error("Input hook error: {0}")]
    Hook(#[from] HookError),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
