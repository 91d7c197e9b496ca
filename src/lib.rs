//! Wrist IMU motion analytics.
//!
//! A [`MotionSession`] takes one [`Sample`] at a time and returns form feedback for the
//! selected exercise together with step, activity, speed and calorie metrics.

pub mod config;
pub mod error;
pub mod features;
pub mod health;
pub mod history;
pub mod inference;
pub mod pose;
pub mod session;
pub mod stability;
pub mod steps;

#[cfg(feature = "torch")]
pub mod torch_model;

#[cfg(feature = "python")]
mod python;

pub use config::{AnalyzerMode, EngineConfig, ProfileUpdate, UserProfile};
pub use error::{ClassifierError, EngineError, EngineResult};
pub use features::{FeatureVector, RawTimestamp, Sample};
pub use inference::{Activity, ActivityModel, Classification, ClassifierBridge};
pub use pose::{Cue, Exercise, ExerciseThresholds};
pub use session::{MotionSession, SampleAnalysis, SessionMetrics, SessionSummary};
pub use steps::{StepDetector, StepDetectorConfig};

#[cfg(feature = "torch")]
pub use torch_model::TorchActivityModel;
