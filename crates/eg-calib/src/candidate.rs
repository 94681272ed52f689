//! Electron and photon candidates.
//!
//! Only the attributes the calibration reads or writes are modelled; any
//! identity fields ride along untouched.

use eg_core::traits::{EgammaCandidate, TrackMatchedCandidate};
use eg_core::{DetId, FourMomentum};
use serde::{Deserialize, Serialize};

/// Reconstructed electron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Electron {
    /// Supercluster pseudorapidity.
    pub sc_eta: f64,
    /// Full 5x5 R9.
    pub r9: f64,
    /// Barrel / endcap.
    pub is_barrel: bool,
    /// Supercluster seed crystal.
    pub seed_id: DetId,
    /// Corrected calorimeter energy.
    pub ecal_energy: f64,
    /// Error on `ecal_energy`.
    pub ecal_energy_error: f64,
    /// Track momentum magnitude at the vertex.
    pub track_momentum: f64,
    /// Error on `track_momentum`.
    pub track_momentum_error: f64,
    /// Candidate four-momentum.
    pub p4: FourMomentum,
    /// Error on the four-momentum energy after E–p combination.
    #[serde(default)]
    pub p4_error: f64,
    /// Electric charge.
    #[serde(default)]
    pub charge: i32,
}

impl EgammaCandidate for Electron {
    fn sc_eta(&self) -> f64 {
        self.sc_eta
    }

    fn r9(&self) -> f64 {
        self.r9
    }

    fn is_barrel(&self) -> bool {
        self.is_barrel
    }

    fn seed_id(&self) -> DetId {
        self.seed_id
    }

    fn ecal_energy(&self) -> f64 {
        self.ecal_energy
    }

    fn ecal_energy_error(&self) -> f64 {
        self.ecal_energy_error
    }

    fn set_ecal_energy(&mut self, energy: f64, error: f64) {
        self.ecal_energy = energy;
        self.ecal_energy_error = error;
    }
}

impl TrackMatchedCandidate for Electron {
    fn track_momentum(&self) -> f64 {
        self.track_momentum
    }

    fn track_momentum_error(&self) -> f64 {
        self.track_momentum_error
    }

    fn p4(&self) -> FourMomentum {
        self.p4
    }

    fn correct_momentum(&mut self, p4: FourMomentum, track_error: f64, p4_error: f64) {
        self.p4 = p4;
        self.track_momentum_error = track_error;
        self.p4_error = p4_error;
    }
}

/// Reconstructed photon.
///
/// The calibrated energy lives in the regression slot; setting it also
/// rescales the four-momentum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photon {
    /// Supercluster pseudorapidity.
    pub sc_eta: f64,
    /// Full 5x5 R9.
    pub r9: f64,
    /// Barrel / endcap.
    pub is_barrel: bool,
    /// Supercluster seed crystal.
    pub seed_id: DetId,
    /// Regression-corrected energy.
    pub energy: f64,
    /// Error on `energy`.
    pub energy_error: f64,
    /// Candidate four-momentum.
    pub p4: FourMomentum,
}

impl EgammaCandidate for Photon {
    fn sc_eta(&self) -> f64 {
        self.sc_eta
    }

    fn r9(&self) -> f64 {
        self.r9
    }

    fn is_barrel(&self) -> bool {
        self.is_barrel
    }

    fn seed_id(&self) -> DetId {
        self.seed_id
    }

    fn ecal_energy(&self) -> f64 {
        self.energy
    }

    fn ecal_energy_error(&self) -> f64 {
        self.energy_error
    }

    fn set_ecal_energy(&mut self, energy: f64, error: f64) {
        self.energy = energy;
        self.energy_error = error;
        self.p4 = self.p4.with_energy(energy);
    }
}
