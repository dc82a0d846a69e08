//! facesnap-core — auto-capture decision engine.
//!
//! Judges each camera frame's face against a quality gate, counts
//! consecutive acceptable frames, and arms a debounced capture once the
//! streak is long enough. Automatic and manual captures share one gate so
//! they never overlap. The engine is sans-IO: timers go through the
//! [`Scheduler`] trait and the capture itself is run by the caller.

pub mod config;
pub mod engine;
pub mod quality;
pub mod scheduler;
pub mod state;

pub use config::{ConfigError, EngineConfig, StreakBreakPolicy};
pub use engine::{AutoCapture, CaptureTicket};
pub use quality::{assess, evaluate, FaceBounds, FaceObservation, QualityThresholds, Rejection};
pub use scheduler::{ManualScheduler, Scheduler, TimerId};
pub use state::{EngineState, Phase, Trigger};
