//! checkin-signals - On-device wellness signals from facial geometry
//!
//! Turns a stream of face-landmark frames into five 1-5 wellness scores for a
//! daily check-in through a deterministic pipeline: feature extraction →
//! smoothing or windowed sampling → threshold classification → check-in draft.
//!
//! ## Modules
//!
//! - **Signal core**: [`features`], [`smoother`], [`window`], [`classifier`]
//! - **Lifecycle**: [`pipeline::ModeController`] drives camera, model and
//!   sessions through the [`capture`] collaborator traits
//! - **Outputs**: [`draft`] (shared check-in scores) and [`encoder`] (snapshots)
//! - **Recordings**: [`schema`] reads `checkin.landmark_frame.v1` frames and
//!   replays them through the controller

pub mod capture;
pub mod classifier;
pub mod config;
pub mod draft;
pub mod encoder;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod schema;
pub mod session;
pub mod smoother;
pub mod types;
pub mod window;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use capture::{CaptureDevice, CaptureHandle, LandmarkModel, ModelLoader, VideoFrame};
pub use classifier::Classifier;
pub use config::PipelineConfig;
pub use draft::{CheckinDraft, DraftHandle};
pub use encoder::{CheckinSnapshot, SnapshotEncoder};
pub use error::SignalError;
pub use features::{FeatureExtractor, SessionMemory};
pub use pipeline::{FrameProcessor, ModeController, Toggled};
pub use smoother::Smoother;
pub use types::*;
pub use window::SamplingWindow;

// Schema exports
pub use schema::{FrameRecord, FrameRecordAdapter, ReplaySource, FRAME_SCHEMA_VERSION};

/// Library version embedded in every snapshot
pub const CHECKIN_SIGNALS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for snapshots
pub const PRODUCER_NAME: &str = "checkin-signals";
