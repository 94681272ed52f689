//! Core traits for egcalib
//!
//! The calibration routine is generic over a candidate capability set
//! ([`EgammaCandidate`], [`TrackMatchedCandidate`]) and talks to its
//! collaborators through [`CorrectionLookup`], [`MomentumCombiner`] and
//! [`RandomService`]. Everything is bound at compile time except the random
//! service, which is injected per batch.

use std::sync::Arc;

use crate::types::{CorrectionKey, DetId, FourMomentum, StreamId, UncertaintySources};

/// Capabilities shared by every calibratable e/γ candidate.
pub trait EgammaCandidate: Clone {
    /// Supercluster pseudorapidity.
    fn sc_eta(&self) -> f64;

    /// Full 5x5 R9 shower-shape ratio.
    fn r9(&self) -> f64;

    /// `true` in the barrel, `false` in the endcaps.
    fn is_barrel(&self) -> bool;

    /// Seed crystal of the supercluster.
    fn seed_id(&self) -> DetId;

    /// Calorimeter energy currently attached to the candidate.
    fn ecal_energy(&self) -> f64;

    /// Error on [`EgammaCandidate::ecal_energy`].
    fn ecal_energy_error(&self) -> f64;

    /// Overwrite the calorimeter energy and its error.
    fn set_ecal_energy(&mut self, energy: f64, error: f64);
}

/// Electron-only capabilities: an independent track momentum and a
/// four-momentum that can be replaced by the E–p combination.
pub trait TrackMatchedCandidate: EgammaCandidate {
    /// Track momentum magnitude at the vertex.
    fn track_momentum(&self) -> f64;

    /// Error on the track momentum.
    fn track_momentum_error(&self) -> f64;

    /// Current four-momentum.
    fn p4(&self) -> FourMomentum;

    /// Replace the four-momentum and record the errors that go with it.
    fn correct_momentum(&mut self, p4: FourMomentum, track_error: f64, p4_error: f64);
}

/// Energy scale and smearing retriever.
///
/// Lookups are pure and must never fail: bins that are undefined for the key
/// resolve to neutral values (scale 1, zero uncertainty, zero sigma).
pub trait CorrectionLookup: Send + Sync {
    /// Central multiplicative scale factor for real data.
    fn scale_correction(&self, key: &CorrectionKey) -> f64;

    /// Scale factor shifted up by one standard deviation of `sources`
    /// (combined in quadrature).
    fn scale_correction_uncertainty(&self, key: &CorrectionKey, sources: UncertaintySources)
        -> f64;

    /// Relative smearing width for simulation.
    ///
    /// `n_sigma_rho` / `n_sigma_phi` shift the constant term and the phase;
    /// pass `(0.0, 0.0)` for the central value.
    fn smearing_sigma(&self, key: &CorrectionKey, n_sigma_rho: f64, n_sigma_phi: f64) -> f64;
}

impl<L: CorrectionLookup + ?Sized> CorrectionLookup for Arc<L> {
    fn scale_correction(&self, key: &CorrectionKey) -> f64 {
        (**self).scale_correction(key)
    }

    fn scale_correction_uncertainty(
        &self,
        key: &CorrectionKey,
        sources: UncertaintySources,
    ) -> f64 {
        (**self).scale_correction_uncertainty(key, sources)
    }

    fn smearing_sigma(&self, key: &CorrectionKey, n_sigma_rho: f64, n_sigma_phi: f64) -> f64 {
        (**self).smearing_sigma(key, n_sigma_rho, n_sigma_phi)
    }
}

/// Merges the calorimeter energy with the track momentum.
pub trait MomentumCombiner<C: TrackMatchedCandidate>: Send + Sync {
    /// Combined energy and its error. Reads the candidate only.
    fn combine(&self, candidate: &C) -> (f64, f64);
}

/// Process-wide source of per-stream random engines.
///
/// Implementations must be safe to call concurrently from different
/// streams.
pub trait RandomService: Send + Sync {
    /// Draw one standard-normal deviate from the engine owned by `stream`.
    fn standard_normal(&self, stream: StreamId) -> f64;
}
