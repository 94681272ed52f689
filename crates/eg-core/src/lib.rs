//! # eg-core
//!
//! Core types for e/γ energy calibration: the error type, the candidate
//! capability traits, and the seams to the external collaborators
//! (correction retriever, E–p combiner, random-number service).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    CalibrationMode, CorrectionKey, DetId, FourMomentum, GainState, StreamId, UncertaintyBundle,
    UncertaintySources,
};

/// Workspace version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
