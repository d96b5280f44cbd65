//! # Testing
//!
//! Seams for exercising reconcilers without an API server: an in-memory
//! store wrapped in a [`Harness`], a tracker and an event recorder that keep
//! what they were asked to do, and factories for the objects the
//! reconcilers read.

pub mod factories;
mod harness;
mod recorders;

pub use harness::Harness;
pub use recorders::{RecordedEvent, RecordingRecorder, RecordingTracker};
