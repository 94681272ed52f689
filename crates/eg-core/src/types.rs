//! Common data types for egcalib

use serde::{Deserialize, Serialize};

/// Raw calorimeter cell identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetId(pub u32);

/// Identifier of one worker execution stream.
///
/// Random engines are handed out per stream so that concurrent batches never
/// share an engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StreamId(pub u32);

/// Readout gain-switch state of the seed crystal.
///
/// Bit 0 is set when the seed switched to gain 6, bit 1 when it switched to
/// gain 1. Used only as a correction lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GainState(u8);

impl GainState {
    /// No gain switch (gain 12).
    pub const NONE: Self = Self(0);
    /// Seed switched to gain 6.
    pub const GAIN6: Self = Self(0x01);
    /// Seed switched to gain 1.
    pub const GAIN1: Self = Self(0x02);

    /// Build from raw bits; bits above 0x3 are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x03)
    }

    /// Raw bitmask value (0..=3).
    pub fn bits(self) -> u8 {
        self.0
    }

    /// `true` if every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for GainState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for GainState {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Which branch of the correction algorithm runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Simulated data: stochastic smearing.
    Simulation,
    /// Real data: deterministic scale correction.
    Data,
}

impl CalibrationMode {
    /// Mode from an `is_mc` style flag.
    pub fn from_is_mc(is_mc: bool) -> Self {
        if is_mc {
            Self::Simulation
        } else {
            Self::Data
        }
    }

    /// `true` for [`CalibrationMode::Simulation`].
    pub fn is_simulation(self) -> bool {
        matches!(self, Self::Simulation)
    }
}

/// Bitwise-combinable selection of scale uncertainty sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UncertaintySources(u8);

impl UncertaintySources {
    /// Statistical uncertainty of the scale fit.
    pub const STAT: Self = Self(1);
    /// Systematic uncertainty.
    pub const SYST: Self = Self(2);
    /// Gain-switch uncertainty.
    pub const GAIN: Self = Self(4);

    /// Build from raw bits; unknown bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x07)
    }

    /// Raw bitmask.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// `true` if every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for UncertaintySources {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Arguments of every correction lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionKey {
    /// Run number.
    pub run: u32,
    /// Barrel (`true`) or endcap (`false`).
    pub is_barrel: bool,
    /// Shower-shape variable (full 5x5 R9).
    pub r9: f64,
    /// |η| of the supercluster.
    pub abs_eta: f64,
    /// Transverse energy.
    pub et: f64,
    /// Seed gain-switch bits.
    pub gain: GainState,
}

/// Lorentz four-vector `(px, py, pz, E)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourMomentum {
    /// x component.
    pub px: f64,
    /// y component.
    pub py: f64,
    /// z component.
    pub pz: f64,
    /// Energy component.
    pub e: f64,
}

impl FourMomentum {
    /// Create a four-vector.
    pub fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// Massless four-vector from `(E, η, φ)`.
    pub fn from_energy_eta_phi(energy: f64, eta: f64, phi: f64) -> Self {
        let pt = energy / eta.cosh();
        Self { px: pt * phi.cos(), py: pt * phi.sin(), pz: pt * eta.sinh(), e: energy }
    }

    /// Magnitude of the three-momentum.
    pub fn p(&self) -> f64 {
        (self.px * self.px + self.py * self.py + self.pz * self.pz).sqrt()
    }

    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    /// Scale every component so that the energy becomes `energy`.
    ///
    /// A zero-energy vector cannot be rescaled and is returned as
    /// `(0, 0, 0, energy)`.
    pub fn with_energy(&self, energy: f64) -> Self {
        if self.e == 0.0 {
            return Self { px: 0.0, py: 0.0, pz: 0.0, e: energy };
        }
        let k = energy / self.e;
        Self { px: self.px * k, py: self.py * k, pz: self.pz * k, e: energy }
    }
}

/// Ordered per-candidate uncertainty values.
///
/// Electrons carry 3 entries (stat, syst, gain); photons carry 10 (scale
/// stat/syst/gain up/down, resolution ρ/φ up/down). In simulation mode every
/// entry repeats the central value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UncertaintyBundle(Vec<f64>);

impl UncertaintyBundle {
    /// Wrap an ordered list of values.
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// `n` copies of `value`.
    pub fn repeated(value: f64, n: usize) -> Self {
        Self(vec![value; n])
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in order.
    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

impl std::ops::Index<usize> for UncertaintyBundle {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}
