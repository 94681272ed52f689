//! Binned energy-scale and smearing corrections.
//!
//! The table is a versioned JSON document:
//!
//! ```json
//! {
//!   "schema_version": "egcalib_corrections_v0",
//!   "scales": [
//!     { "runs": [273158, 275376], "region": "barrel", "r9": [0.0, 0.94],
//!       "abs_eta": [0.0, 1.0], "et": [0.0, 1e4], "gain": 0,
//!       "scale": 1.0021, "err_stat": 0.0004, "err_syst": 0.001, "err_gain": 0.0 }
//!   ],
//!   "smearings": [
//!     { "region": "barrel", "r9": [0.0, 0.94], "abs_eta": [0.0, 1.0],
//!       "rho": 0.0082, "err_rho": 0.0003, "phi": 1.5708, "err_phi": 0.1, "e_mean": 6.6 }
//!   ]
//! }
//! ```
//!
//! Ranges are half-open `[lo, hi)`, run ranges are inclusive. Omitted ranges
//! match everything, an omitted `gain` matches any gain state. The first
//! matching bin wins; keys with no matching bin get neutral values.

use std::path::Path;

use eg_core::traits::CorrectionLookup;
use eg_core::{CalibrationMode, CorrectionKey, Error, Result, UncertaintySources};
use serde::{Deserialize, Serialize};

/// Schema tag accepted by [`CorrectionTable::from_json_str`].
pub const CORRECTIONS_V0: &str = "egcalib_corrections_v0";

/// Detector region selector of a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Barrel only.
    Barrel,
    /// Endcaps only.
    Endcap,
    /// Both.
    #[default]
    Any,
}

impl Region {
    fn matches(self, is_barrel: bool) -> bool {
        match self {
            Region::Barrel => is_barrel,
            Region::Endcap => !is_barrel,
            Region::Any => true,
        }
    }
}

fn full_range() -> [f64; 2] {
    [f64::NEG_INFINITY, f64::INFINITY]
}

fn all_runs() -> [u32; 2] {
    [0, u32::MAX]
}

fn in_range(r: &[f64; 2], x: f64) -> bool {
    x >= r[0] && x < r[1]
}

/// Bin selector shared by scale and smearing entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinSelector {
    /// Region.
    #[serde(default)]
    pub region: Region,
    /// R9 range.
    #[serde(default = "full_range")]
    pub r9: [f64; 2],
    /// |η| range.
    #[serde(default = "full_range")]
    pub abs_eta: [f64; 2],
    /// E_T range.
    #[serde(default = "full_range")]
    pub et: [f64; 2],
    /// Exact gain bits, or any gain when absent.
    #[serde(default)]
    pub gain: Option<u8>,
}

impl BinSelector {
    fn matches(&self, key: &CorrectionKey) -> bool {
        self.region.matches(key.is_barrel)
            && in_range(&self.r9, key.r9)
            && in_range(&self.abs_eta, key.abs_eta)
            && in_range(&self.et, key.et)
            && self.gain.map_or(true, |g| g == key.gain.bits())
    }

    fn validate(&self, what: &str, idx: usize) -> Result<()> {
        for (name, r) in [("r9", &self.r9), ("abs_eta", &self.abs_eta), ("et", &self.et)] {
            if r[0].is_nan() || r[1].is_nan() || r[0] > r[1] {
                return Err(Error::Validation(format!(
                    "{what}[{idx}]: invalid {name} range [{}, {}]",
                    r[0], r[1]
                )));
            }
        }
        if let Some(g) = self.gain {
            if g > 3 {
                return Err(Error::Validation(format!(
                    "{what}[{idx}]: gain must be 0..=3, got {g}"
                )));
            }
        }
        Ok(())
    }
}

/// One scale bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleBin {
    /// Inclusive run range.
    #[serde(default = "all_runs")]
    pub runs: [u32; 2],
    /// Kinematic / detector selector.
    #[serde(flatten)]
    pub bin: BinSelector,
    /// Central scale.
    pub scale: f64,
    /// Statistical uncertainty on `scale`.
    #[serde(default)]
    pub err_stat: f64,
    /// Systematic uncertainty on `scale`.
    #[serde(default)]
    pub err_syst: f64,
    /// Gain-switch uncertainty on `scale`.
    #[serde(default)]
    pub err_gain: f64,
}

/// One smearing bin.
///
/// `sigma = sqrt((rho·sin φ)² + (rho·e_mean·cos φ)² / E_T)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmearingBin {
    /// Kinematic / detector selector.
    #[serde(flatten)]
    pub bin: BinSelector,
    /// Total relative smearing amplitude.
    pub rho: f64,
    /// Uncertainty on `rho`.
    #[serde(default)]
    pub err_rho: f64,
    /// Split between constant and stochastic terms (π/2 = pure constant).
    #[serde(default = "default_phi")]
    pub phi: f64,
    /// Uncertainty on `phi`.
    #[serde(default)]
    pub err_phi: f64,
    /// Mean energy of the bin, scales the stochastic term.
    #[serde(default)]
    pub e_mean: f64,
}

fn default_phi() -> f64 {
    std::f64::consts::FRAC_PI_2
}

impl SmearingBin {
    fn sigma(&self, et: f64, n_sigma_rho: f64, n_sigma_phi: f64) -> f64 {
        let rho = self.rho + n_sigma_rho * self.err_rho;
        let phi = self.phi + n_sigma_phi * self.err_phi;
        let const_term = rho * phi.sin();
        let alpha = rho * self.e_mean * phi.cos();
        if et > 0.0 {
            (const_term * const_term + alpha * alpha / et).sqrt()
        } else {
            const_term.abs()
        }
    }
}

#[derive(Debug, Deserialize)]
struct CorrectionFile {
    schema_version: String,
    #[serde(default)]
    scales: Vec<ScaleBin>,
    #[serde(default)]
    smearings: Vec<SmearingBin>,
}

/// Immutable correction table.
///
/// In simulation mode the scale lookups are switched off (scale 1), in data
/// mode the smearing lookups are (sigma 0); see [`CorrectionTable::with_mode`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionTable {
    scales: Vec<ScaleBin>,
    smearings: Vec<SmearingBin>,
    do_scale: bool,
    do_smearings: bool,
}

impl CorrectionTable {
    /// Build from bins. Both lookups start enabled.
    pub fn new(scales: Vec<ScaleBin>, smearings: Vec<SmearingBin>) -> Result<Self> {
        let table = Self { scales, smearings, do_scale: true, do_smearings: true };
        table.validate()?;
        Ok(table)
    }

    /// Parse a `egcalib_corrections_v0` document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CorrectionFile = serde_json::from_str(json)?;
        if file.schema_version != CORRECTIONS_V0 {
            return Err(Error::Validation(format!(
                "unsupported correction schema_version '{}' (expected '{CORRECTIONS_V0}')",
                file.schema_version
            )));
        }
        Self::new(file.scales, file.smearings)
    }

    /// Load a correction file from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&json)?;
        tracing::info!(
            path = %path.display(),
            n_scales = table.scales.len(),
            n_smearings = table.smearings.len(),
            "correction table loaded"
        );
        Ok(table)
    }

    /// Gate the lookups for a calibration mode.
    pub fn with_mode(mut self, mode: CalibrationMode) -> Self {
        self.do_scale = !mode.is_simulation();
        self.do_smearings = mode.is_simulation();
        self
    }

    /// Number of scale bins.
    pub fn n_scale_bins(&self) -> usize {
        self.scales.len()
    }

    /// Number of smearing bins.
    pub fn n_smearing_bins(&self) -> usize {
        self.smearings.len()
    }

    fn validate(&self) -> Result<()> {
        for (i, s) in self.scales.iter().enumerate() {
            s.bin.validate("scales", i)?;
            if s.runs[0] > s.runs[1] {
                return Err(Error::Validation(format!(
                    "scales[{i}]: invalid run range [{}, {}]",
                    s.runs[0], s.runs[1]
                )));
            }
            let values = [s.scale, s.err_stat, s.err_syst, s.err_gain];
            if values.iter().any(|v| !v.is_finite()) || s.scale <= 0.0 {
                return Err(Error::Validation(format!(
                    "scales[{i}]: scale must be finite and > 0 with finite errors"
                )));
            }
        }
        for (i, s) in self.smearings.iter().enumerate() {
            s.bin.validate("smearings", i)?;
            let values = [s.rho, s.err_rho, s.phi, s.err_phi, s.e_mean];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(Error::Validation(format!("smearings[{i}]: non-finite parameter")));
            }
        }
        Ok(())
    }

    fn find_scale(&self, key: &CorrectionKey) -> Option<&ScaleBin> {
        if !self.do_scale {
            return None;
        }
        self.scales
            .iter()
            .find(|s| key.run >= s.runs[0] && key.run <= s.runs[1] && s.bin.matches(key))
    }

    fn find_smearing(&self, key: &CorrectionKey) -> Option<&SmearingBin> {
        if !self.do_smearings {
            return None;
        }
        self.smearings.iter().find(|s| s.bin.matches(key))
    }
}

impl CorrectionLookup for CorrectionTable {
    fn scale_correction(&self, key: &CorrectionKey) -> f64 {
        self.find_scale(key).map_or(1.0, |s| s.scale)
    }

    fn scale_correction_uncertainty(
        &self,
        key: &CorrectionKey,
        sources: UncertaintySources,
    ) -> f64 {
        let Some(s) = self.find_scale(key) else {
            return 1.0;
        };
        let mut var = 0.0;
        if sources.contains(UncertaintySources::STAT) {
            var += s.err_stat * s.err_stat;
        }
        if sources.contains(UncertaintySources::SYST) {
            var += s.err_syst * s.err_syst;
        }
        if sources.contains(UncertaintySources::GAIN) {
            var += s.err_gain * s.err_gain;
        }
        s.scale + var.sqrt()
    }

    fn smearing_sigma(&self, key: &CorrectionKey, n_sigma_rho: f64, n_sigma_phi: f64) -> f64 {
        self.find_smearing(key).map_or(0.0, |s| s.sigma(key.et, n_sigma_rho, n_sigma_phi))
    }
}
