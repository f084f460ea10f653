// src/lib.rs - Pose smoothing and player setup readiness tracking
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod history;
pub mod pipeline;
pub mod pose;
pub mod setup_detector;
pub mod setup_manager;
pub mod setup_tracker;
pub mod smoothing;
pub mod targets;

pub use config::AppConfig;
pub use error::{ConfigError, DataError};
pub use pipeline::{FrameResult, SetupPipeline};
pub use pose::{BodyPose, FrameGeometry, JointIndex, PoseFrame, PoseNode, Rect};
pub use setup_tracker::{SetupStateType, SetupSummary};
