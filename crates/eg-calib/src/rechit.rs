//! Calorimeter rec-hits and seed gain-state derivation.

use eg_core::{DetId, GainState};
use serde::{Deserialize, Serialize};

/// Rec-hit status flags. Discriminants are bit positions in the hit's
/// flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecHitFlag {
    /// Channel ok.
    Good = 0,
    /// Poor reconstruction.
    PoorReco = 1,
    /// Out of time.
    OutOfTime = 2,
    /// Faulty hardware.
    FaultyHardware = 3,
    /// Noisy channel.
    Noisy = 4,
    /// Poor calibration.
    PoorCalib = 5,
    /// Saturated.
    Saturated = 6,
    /// Dead channel.
    Dead = 10,
    /// Killed channel.
    Killed = 11,
    /// Spike-like.
    Weird = 14,
    /// Double-spike-like.
    DiWeird = 15,
    /// Readout switched to gain 6.
    HasSwitchToGain6 = 16,
    /// Readout switched to gain 1.
    HasSwitchToGain1 = 17,
}

impl RecHitFlag {
    fn mask(self) -> u32 {
        1u32 << (self as u32)
    }
}

/// One calorimeter hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecHitRepr", into = "RecHitRepr")]
pub struct EcalRecHit {
    /// Crystal id.
    pub id: DetId,
    /// Reconstructed energy.
    pub energy: f64,
    flag_bits: u32,
}

#[derive(Serialize, Deserialize)]
struct RecHitRepr {
    id: DetId,
    #[serde(default)]
    energy: f64,
    #[serde(default)]
    flags: Vec<RecHitFlag>,
}

impl From<RecHitRepr> for EcalRecHit {
    fn from(r: RecHitRepr) -> Self {
        let mut hit = EcalRecHit::new(r.id, r.energy);
        for f in r.flags {
            hit.set_flag(f);
        }
        hit
    }
}

impl From<EcalRecHit> for RecHitRepr {
    fn from(h: EcalRecHit) -> Self {
        const ALL: [RecHitFlag; 13] = [
            RecHitFlag::Good,
            RecHitFlag::PoorReco,
            RecHitFlag::OutOfTime,
            RecHitFlag::FaultyHardware,
            RecHitFlag::Noisy,
            RecHitFlag::PoorCalib,
            RecHitFlag::Saturated,
            RecHitFlag::Dead,
            RecHitFlag::Killed,
            RecHitFlag::Weird,
            RecHitFlag::DiWeird,
            RecHitFlag::HasSwitchToGain6,
            RecHitFlag::HasSwitchToGain1,
        ];
        let flags = ALL.into_iter().filter(|f| h.check_flag(*f)).collect();
        RecHitRepr { id: h.id, energy: h.energy, flags }
    }
}

impl EcalRecHit {
    /// Hit without flags.
    pub fn new(id: DetId, energy: f64) -> Self {
        Self { id, energy, flag_bits: 0 }
    }

    /// Builder-style flag setter.
    pub fn with_flag(mut self, flag: RecHitFlag) -> Self {
        self.set_flag(flag);
        self
    }

    /// Set `flag`.
    pub fn set_flag(&mut self, flag: RecHitFlag) {
        self.flag_bits |= flag.mask();
    }

    /// `true` if `flag` is set.
    pub fn check_flag(&self, flag: RecHitFlag) -> bool {
        self.flag_bits & flag.mask() != 0
    }

    /// Gain-switch bits of this crystal.
    pub fn gain_state(&self) -> GainState {
        let mut gain = GainState::NONE;
        if self.check_flag(RecHitFlag::HasSwitchToGain6) {
            gain |= GainState::GAIN6;
        }
        if self.check_flag(RecHitFlag::HasSwitchToGain1) {
            gain |= GainState::GAIN1;
        }
        gain
    }
}

/// Hits sorted by crystal id for `O(log n)` lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<EcalRecHit>", into = "Vec<EcalRecHit>")]
pub struct EcalRecHitCollection {
    hits: Vec<EcalRecHit>,
}

impl From<Vec<EcalRecHit>> for EcalRecHitCollection {
    fn from(mut hits: Vec<EcalRecHit>) -> Self {
        hits.sort_by_key(|h| h.id);
        hits.dedup_by_key(|h| h.id);
        Self { hits }
    }
}

impl From<EcalRecHitCollection> for Vec<EcalRecHit> {
    fn from(c: EcalRecHitCollection) -> Self {
        c.hits
    }
}

impl EcalRecHitCollection {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// `true` if there are no hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Hit for `id`, if present.
    pub fn find(&self, id: DetId) -> Option<&EcalRecHit> {
        self.hits.binary_search_by_key(&id, |h| h.id).ok().map(|i| &self.hits[i])
    }

    /// Gain state of the seed crystal. A missing hit yields [`GainState::NONE`].
    pub fn gain_state_at(&self, seed: DetId) -> GainState {
        self.find(seed).map(EcalRecHit::gain_state).unwrap_or(GainState::NONE)
    }
}
