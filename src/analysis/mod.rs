//! Analysis Collaborators
//!
//! Pure, pipeline-agnostic building blocks consumed by the concrete stages:
//!
//! - `entropy`: Shannon entropy calculation and profile building
//! - `frame`: best-effort binary frame header metadata extraction
//! - `detector`: statistical anomaly detectors over feature vectors
//!
//! Nothing in this module knows about jobs, queues, or circuit breakers.

pub mod detector;
pub mod entropy;
pub mod frame;

pub use detector::{
    AnomalyDetector, DetectorError, NearestNeighborDetector, ZScoreDetector,
};
pub use entropy::{build_profile, EntropyCalculator, EntropyError};
pub use frame::{FrameSchema, FRAME_HEADER_SIZE};
