//! # eg-calib
//!
//! Energy calibration engine for reconstructed electrons and photons.
//!
//! This crate provides:
//! - [`CorrectionTable`]: a binned scale/smearing retriever loaded from JSON.
//! - [`EnergyCalibrator`]: scale correction (data) or Gaussian smearing
//!   (simulation), generic over the candidate capability traits in
//!   [`eg_core::traits`].
//! - [`EpCombiner`]: inverse-variance E–p combination for electrons.
//! - [`ElectronProducer`] / [`PhotonProducer`]: per-event batch drivers that
//!   publish corrected collections plus parallel uncertainty maps.
//! - [`StreamRngRegistry`]: per-stream random engines for simulation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod calibrator;
pub mod candidate;
pub mod combiner;
pub mod correction;
pub mod producer;
pub mod rechit;
pub mod rng;

pub use calibrator::EnergyCalibrator;
pub use candidate::{Electron, Photon};
pub use combiner::EpCombiner;
pub use correction::CorrectionTable;
pub use producer::{
    produce_events, ElectronProducer, Event, EventProducer, NamedValueMap, PhotonProducer,
    Products,
};
pub use rechit::{EcalRecHit, EcalRecHitCollection, RecHitFlag};
pub use rng::StreamRngRegistry;
