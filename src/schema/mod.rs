//! checkin.landmark_frame.v1 recordings
//!
//! Recorded landmark frames stand in for a live camera and face model: the
//! replay collaborators feed them through the same controller that drives a
//! real session.

mod adapter;
mod frame_record;
mod replay;

pub use adapter::*;
pub use frame_record::*;
pub use replay::*;
