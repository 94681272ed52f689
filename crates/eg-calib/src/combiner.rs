//! E–p combination for electrons.

use eg_core::traits::{MomentumCombiner, TrackMatchedCandidate};

/// Default pull above which the track momentum is ignored.
pub const DEFAULT_MAX_EP_PULL: f64 = 3.0;

/// Inverse-variance combination of the calorimeter energy and the track
/// momentum.
///
/// Falls back to the calorimeter measurement when either error is unusable or
/// when E and p disagree by more than `max_ep_pull` combined standard
/// deviations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpCombiner {
    max_ep_pull: f64,
}

impl Default for EpCombiner {
    fn default() -> Self {
        Self { max_ep_pull: DEFAULT_MAX_EP_PULL }
    }
}

impl EpCombiner {
    /// Combiner with a custom compatibility cut.
    pub fn new(max_ep_pull: f64) -> Self {
        Self { max_ep_pull }
    }

    /// Combine raw measurements.
    pub fn combine_values(&self, e: f64, e_err: f64, p: f64, p_err: f64) -> (f64, f64) {
        let usable = |x: f64, s: f64| x.is_finite() && s.is_finite() && s > 0.0 && x > 0.0;
        if !usable(e, e_err) {
            return (e, e_err);
        }
        if !usable(p, p_err) {
            return (e, e_err);
        }
        let pull = (e - p).abs() / e_err.hypot(p_err);
        if pull > self.max_ep_pull {
            return (e, e_err);
        }
        let w_e = 1.0 / (e_err * e_err);
        let w_p = 1.0 / (p_err * p_err);
        let w = w_e + w_p;
        ((e * w_e + p * w_p) / w, w.sqrt().recip())
    }
}

impl<C: TrackMatchedCandidate> MomentumCombiner<C> for EpCombiner {
    fn combine(&self, candidate: &C) -> (f64, f64) {
        self.combine_values(
            candidate.ecal_energy(),
            candidate.ecal_energy_error(),
            candidate.track_momentum(),
            candidate.track_momentum_error(),
        )
    }
}
