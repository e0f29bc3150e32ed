//! Recorder for retrace scripts
//!
//! Turns OS input events from a [`retrace::InputHook`] into replayable steps. Clicks
//! capture a template image around the pointer so playback can find the target again
//! even if it moved.

pub mod error;
pub mod events;
pub mod recorder;

pub use error::*;
pub use events::RecorderEvent;
pub use recorder::*;
