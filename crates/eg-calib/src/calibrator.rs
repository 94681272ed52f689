//! Energy calibrator for electrons and photons.
//!
//! One algorithm serves both candidate kinds:
//!
//! - **Data**: `E' = E·scale`, `σ' = hypot(σ·scale, sigma·E')`.
//! - **Simulation**: `corr = 1 + sigma·g` with `g ~ N(0, 1)`,
//!   `E' = E·corr`, `σ' = hypot(σ·corr, sigma·E')`.
//!
//! Electrons then go through the E–p combiner; photons keep `E'`.
//! Calibration is not idempotent: running it again on a corrected candidate
//! applies the correction a second time.

use eg_core::traits::{
    CorrectionLookup, EgammaCandidate, MomentumCombiner, RandomService, TrackMatchedCandidate,
};
use eg_core::{
    CalibrationMode, CorrectionKey, Error, Result, StreamId, UncertaintyBundle,
    UncertaintySources,
};

use crate::rechit::EcalRecHitCollection;
use crate::rng::StreamRngRegistry;

/// Entries in an electron uncertainty bundle: stat, syst, gain.
pub const ELECTRON_BUNDLE_LEN: usize = 3;

/// Entries in a photon uncertainty bundle: scale stat/syst/gain up/down,
/// resolution ρ up/down, resolution φ up/down.
pub const PHOTON_BUNDLE_LEN: usize = 10;

/// Lookup results for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Corrections {
    scale: f64,
    sigma: f64,
    scale_stat: f64,
    scale_syst: f64,
    scale_gain: f64,
}

impl Corrections {
    fn variants(&self) -> [f64; 3] {
        [self.scale_stat, self.scale_syst, self.scale_gain]
    }
}

/// Scale/smearing calibrator, generic over its correction lookup.
#[derive(Debug)]
pub struct EnergyCalibrator<L> {
    lookup: L,
    mode: CalibrationMode,
    synchronization: bool,
    private_rng: Option<StreamRngRegistry>,
}

impl<L: CorrectionLookup> EnergyCalibrator<L> {
    /// Calibrator in `mode`. With `synchronization` every deviate is 1.0.
    pub fn new(lookup: L, mode: CalibrationMode, synchronization: bool) -> Self {
        Self { lookup, mode, synchronization, private_rng: None }
    }

    /// Install private engines derived from `seed`, one per stream.
    ///
    /// Private engines take precedence over the shared service. Stream `s`
    /// draws from an engine seeded with `seed + s`, so each stream keeps its
    /// own sequence however events are scheduled across streams.
    pub fn with_private_rng(mut self, seed: u64) -> Self {
        self.private_rng = Some(StreamRngRegistry::new(seed));
        self
    }

    /// Constructed calibration mode.
    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    /// `true` in synchronization mode.
    pub fn synchronization(&self) -> bool {
        self.synchronization
    }

    /// `true` if a private engine is installed.
    pub fn has_private_rng(&self) -> bool {
        self.private_rng.is_some()
    }

    /// The correction lookup.
    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Standard-normal deviate.
    ///
    /// Synchronization mode returns exactly 1.0. Otherwise the private engine
    /// of `stream` is used if installed, else the engine `rng` owns for
    /// `stream`. With neither available this is a configuration error.
    pub fn gauss(&self, stream: StreamId, rng: Option<&dyn RandomService>) -> Result<f64> {
        if self.synchronization {
            return Ok(1.0);
        }
        if let Some(private) = &self.private_rng {
            return Ok(private.standard_normal(stream));
        }
        match rng {
            Some(service) => Ok(service.standard_normal(stream)),
            None => Err(Error::Configuration(
                "energy smearing requires a random-number service (per-stream engines), \
                 which is not configured. Configure the service, install a private engine, \
                 or enable synchronization mode."
                    .to_string(),
            )),
        }
    }

    fn corrections<C: EgammaCandidate>(
        &self,
        candidate: &C,
        run: u32,
        rec_hits: &EcalRecHitCollection,
    ) -> Corrections {
        let abs_eta = candidate.sc_eta().abs();
        let key = CorrectionKey {
            run,
            is_barrel: candidate.is_barrel(),
            r9: candidate.r9(),
            abs_eta,
            et: candidate.ecal_energy() / abs_eta.cosh(),
            gain: rec_hits.gain_state_at(candidate.seed_id()),
        };
        Corrections {
            scale: self.lookup.scale_correction(&key),
            sigma: self.lookup.smearing_sigma(&key, 0.0, 0.0),
            scale_stat: self.lookup.scale_correction_uncertainty(&key, UncertaintySources::STAT),
            scale_syst: self.lookup.scale_correction_uncertainty(&key, UncertaintySources::SYST),
            scale_gain: self.lookup.scale_correction_uncertainty(&key, UncertaintySources::GAIN),
        }
    }

    fn corrected_energy<C: EgammaCandidate>(
        &self,
        candidate: &C,
        corr: &Corrections,
        mode: CalibrationMode,
        stream: StreamId,
        rng: Option<&dyn RandomService>,
    ) -> Result<(f64, f64)> {
        let factor = match mode {
            CalibrationMode::Simulation => 1.0 + corr.sigma * self.gauss(stream, rng)?,
            CalibrationMode::Data => corr.scale,
        };
        let energy = candidate.ecal_energy() * factor;
        let error = (candidate.ecal_energy_error() * factor).hypot(corr.sigma * energy);
        Ok((energy, error))
    }

    /// Calibrate an electron in place.
    ///
    /// Returns the combined momentum for the stat, syst and gain scale
    /// variants (data). In simulation the central combined value is repeated
    /// three times.
    pub fn calibrate_electron<E, M>(
        &self,
        electron: &mut E,
        combiner: &M,
        run: u32,
        rec_hits: &EcalRecHitCollection,
        stream: StreamId,
        rng: Option<&dyn RandomService>,
    ) -> Result<UncertaintyBundle>
    where
        E: TrackMatchedCandidate,
        M: MomentumCombiner<E> + ?Sized,
    {
        let corr = self.corrections(electron, run, rec_hits);
        let (energy, error) = self.corrected_energy(electron, &corr, self.mode, stream, rng)?;

        let (combined, bundle) = match self.mode {
            CalibrationMode::Simulation => {
                electron.set_ecal_energy(energy, error);
                let combined = combiner.combine(electron);
                (combined, UncertaintyBundle::repeated(combined.0, ELECTRON_BUNDLE_LEN))
            }
            CalibrationMode::Data => {
                let mut values = Vec::with_capacity(ELECTRON_BUNDLE_LEN);
                for variant in corr.variants() {
                    electron.set_ecal_energy(energy * variant / corr.scale, error);
                    values.push(combiner.combine(electron).0);
                }
                electron.set_ecal_energy(energy, error);
                (combiner.combine(electron), UncertaintyBundle::new(values))
            }
        };

        let p4 = electron.p4().with_energy(combined.0);
        let track_error = electron.track_momentum_error();
        electron.correct_momentum(p4, track_error, combined.1);

        tracing::trace!(
            run,
            scale = corr.scale,
            sigma = corr.sigma,
            energy,
            combined = combined.0,
            "electron calibrated"
        );
        Ok(bundle)
    }

    /// Calibrate a photon in place using the constructed mode.
    pub fn calibrate_photon<P: EgammaCandidate>(
        &self,
        photon: &mut P,
        run: u32,
        rec_hits: &EcalRecHitCollection,
        stream: StreamId,
        rng: Option<&dyn RandomService>,
    ) -> Result<UncertaintyBundle> {
        self.calibrate_photon_with_mode(self.mode, photon, run, rec_hits, stream, rng)
    }

    /// Calibrate a photon in place with an explicit mode.
    ///
    /// The mode picks the branch only; the lookup keeps whatever gating it
    /// was built with.
    pub fn calibrate_photon_with_mode<P: EgammaCandidate>(
        &self,
        mode: CalibrationMode,
        photon: &mut P,
        run: u32,
        rec_hits: &EcalRecHitCollection,
        stream: StreamId,
        rng: Option<&dyn RandomService>,
    ) -> Result<UncertaintyBundle> {
        let corr = self.corrections(photon, run, rec_hits);
        let (energy, error) = self.corrected_energy(photon, &corr, mode, stream, rng)?;

        let bundle = match mode {
            CalibrationMode::Simulation => UncertaintyBundle::repeated(energy, PHOTON_BUNDLE_LEN),
            CalibrationMode::Data => {
                let mut values = Vec::with_capacity(PHOTON_BUNDLE_LEN);
                for variant in corr.variants() {
                    let ratio = variant / corr.scale;
                    values.push(energy * ratio);
                    values.push(energy * (2.0 - ratio));
                }
                // Data is never smeared: resolution variations leave it alone.
                values.extend([energy; 4]);
                UncertaintyBundle::new(values)
            }
        };

        photon.set_ecal_energy(energy, error);

        tracing::trace!(run, scale = corr.scale, sigma = corr.sigma, energy, "photon calibrated");
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Electron, Photon};
    use crate::combiner::EpCombiner;
    use crate::rechit::{EcalRecHit, RecHitFlag};
    use approx::assert_relative_eq;
    use eg_core::{DetId, FourMomentum, GainState};
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Mutex;

    /// Fixed answers, remembering the gain bits of the last query.
    struct FixedLookup {
        scale: f64,
        stat: f64,
        syst: f64,
        gain: f64,
        sigma: f64,
        last_gain: AtomicU8,
    }

    impl FixedLookup {
        fn new(scale: f64, stat: f64, syst: f64, gain: f64, sigma: f64) -> Self {
            Self { scale, stat, syst, gain, sigma, last_gain: AtomicU8::new(0xff) }
        }
    }

    impl CorrectionLookup for FixedLookup {
        fn scale_correction(&self, key: &CorrectionKey) -> f64 {
            self.last_gain.store(key.gain.bits(), Ordering::SeqCst);
            self.scale
        }

        fn scale_correction_uncertainty(
            &self,
            _key: &CorrectionKey,
            sources: UncertaintySources,
        ) -> f64 {
            match sources.bits() {
                1 => self.stat,
                2 => self.syst,
                4 => self.gain,
                _ => self.scale,
            }
        }

        fn smearing_sigma(&self, _key: &CorrectionKey, _rho: f64, _phi: f64) -> f64 {
            self.sigma
        }
    }

    /// Returns the calorimeter energy untouched, counting calls.
    #[derive(Default)]
    struct EcalOnly {
        seen: Mutex<Vec<f64>>,
    }

    impl MomentumCombiner<Electron> for EcalOnly {
        fn combine(&self, c: &Electron) -> (f64, f64) {
            self.seen.lock().unwrap().push(c.ecal_energy);
            (c.ecal_energy, c.ecal_energy_error)
        }
    }

    struct ConstService(f64);

    impl RandomService for ConstService {
        fn standard_normal(&self, _stream: StreamId) -> f64 {
            self.0
        }
    }

    fn electron(energy: f64, error: f64) -> Electron {
        Electron {
            sc_eta: 0.8,
            r9: 0.95,
            is_barrel: true,
            seed_id: DetId(11),
            ecal_energy: energy,
            ecal_energy_error: error,
            track_momentum: energy,
            track_momentum_error: 5.0,
            p4: FourMomentum::from_energy_eta_phi(energy, 0.8, 0.3),
            p4_error: 0.0,
            charge: 1,
        }
    }

    fn photon(energy: f64, error: f64) -> Photon {
        Photon {
            sc_eta: -1.9,
            r9: 0.85,
            is_barrel: false,
            seed_id: DetId(22),
            energy,
            energy_error: error,
            p4: FourMomentum::from_energy_eta_phi(energy, -1.9, 2.2),
        }
    }

    fn scenario_lookup() -> FixedLookup {
        FixedLookup::new(1.02, 1.01, 1.03, 1.0, 0.01)
    }

    #[test]
    fn test_data_electron_scenario() {
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Data, false);
        let combiner = EcalOnly::default();
        let mut ele = electron(100.0, 1.0);
        let hits = EcalRecHitCollection::new();

        let bundle = cal
            .calibrate_electron(&mut ele, &combiner, 1, &hits, StreamId(0), None)
            .unwrap();

        let seen = combiner.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 4);
        assert_relative_eq!(seen[0], 100.98, epsilon = 1e-9);
        assert_relative_eq!(seen[1], 103.02, epsilon = 1e-9);
        assert_relative_eq!(seen[2], 100.0, epsilon = 1e-9);
        assert_relative_eq!(seen[3], 102.0, epsilon = 1e-9);

        assert_eq!(bundle.len(), ELECTRON_BUNDLE_LEN);
        assert_relative_eq!(bundle[0], 100.98, epsilon = 1e-9);
        assert_relative_eq!(bundle[1], 103.02, epsilon = 1e-9);
        assert_relative_eq!(bundle[2], 100.0, epsilon = 1e-9);

        assert_relative_eq!(ele.ecal_energy, 102.0, epsilon = 1e-9);
        assert_relative_eq!(ele.ecal_energy_error, 1.02f64.hypot(1.02), epsilon = 1e-9);
        assert_relative_eq!(ele.ecal_energy_error, 1.4425, epsilon = 1e-4);
        assert_relative_eq!(ele.p4.e, 102.0, epsilon = 1e-9);
        assert_relative_eq!(ele.p4.p(), 102.0, epsilon = 1e-9);
        assert_relative_eq!(ele.p4_error, ele.ecal_energy_error, epsilon = 1e-12);
        assert_eq!(ele.track_momentum_error, 5.0);
    }

    #[test]
    fn test_data_electron_with_ep_combiner_keeps_direction() {
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Data, false);
        let mut ele = electron(100.0, 1.0);
        let before = ele.p4;
        let hits = EcalRecHitCollection::new();
        cal.calibrate_electron(&mut ele, &EpCombiner::default(), 1, &hits, StreamId(0), None)
            .unwrap();
        assert_relative_eq!(ele.p4.px / ele.p4.py, before.px / before.py, epsilon = 1e-12);
        assert!(ele.p4.e > 100.0 && ele.p4.e < 102.0);
    }

    #[test]
    fn test_simulation_photon_synchronization_scenario() {
        let lookup = FixedLookup::new(1.0, 1.0, 1.0, 1.0, 0.02);
        let cal = EnergyCalibrator::new(lookup, CalibrationMode::Simulation, true);
        let mut pho = photon(50.0, 1.0);

        let hits = EcalRecHitCollection::new();
        let bundle = cal.calibrate_photon(&mut pho, 1, &hits, StreamId(0), None).unwrap();

        assert_relative_eq!(pho.energy, 50.0 * 1.02, epsilon = 1e-12);
        assert_relative_eq!(pho.energy_error, 1.02f64.hypot(0.02 * 51.0), epsilon = 1e-12);
        assert_relative_eq!(pho.p4.e, 51.0, epsilon = 1e-12);
        assert_eq!(bundle.len(), PHOTON_BUNDLE_LEN);
        assert!(bundle.values().iter().all(|&v| v == pho.energy));
    }

    #[test]
    fn test_simulation_electron_bundle_repeats_combined_value() {
        // Documented behaviour: simulation carries no per-source estimate.
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Simulation, true);
        let mut ele = electron(100.0, 1.0);
        let hits = EcalRecHitCollection::new();
        let bundle = cal
            .calibrate_electron(&mut ele, &EpCombiner::default(), 1, &hits, StreamId(0), None)
            .unwrap();
        assert_eq!(bundle.len(), ELECTRON_BUNDLE_LEN);
        assert_eq!(bundle[0], bundle[1]);
        assert_eq!(bundle[1], bundle[2]);
        assert_relative_eq!(bundle[0], ele.p4.e, epsilon = 1e-12);
        assert_relative_eq!(ele.ecal_energy, 101.0, epsilon = 1e-12);
    }

    #[test]
    fn test_synchronization_deviate_is_one() {
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Simulation, true)
            .with_private_rng(1);
        for s in 0..10 {
            assert_eq!(cal.gauss(StreamId(s), None).unwrap(), 1.0);
        }
    }

    #[test]
    fn test_missing_random_service_is_configuration_error() {
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Simulation, false);
        let mut pho = photon(50.0, 1.0);
        let before = pho.clone();
        let err = cal
            .calibrate_photon(&mut pho, 1, &EcalRecHitCollection::new(), StreamId(0), None)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("random-number service"));
        assert_eq!(pho, before);
    }

    #[test]
    fn test_data_mode_needs_no_random_service() {
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Data, false);
        let mut pho = photon(50.0, 1.0);
        let hits = EcalRecHitCollection::new();
        assert!(cal.calibrate_photon(&mut pho, 1, &hits, StreamId(0), None).is_ok());
    }

    #[test]
    fn test_private_rng_beats_service() {
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Simulation, false)
            .with_private_rng(9);
        let reference = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Simulation, false)
            .with_private_rng(9);
        let service = ConstService(100.0);
        let g = cal.gauss(StreamId(0), Some(&service)).unwrap();
        assert_eq!(g, reference.gauss(StreamId(0), None).unwrap());
        assert_ne!(g, 100.0);
        assert!(cal.has_private_rng());
        assert!(!cal.synchronization());
    }

    #[test]
    fn test_private_engines_are_per_stream() {
        let make = || {
            EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Simulation, false)
                .with_private_rng(21)
        };
        let a = make();
        let b = make();

        // interleaving other streams does not disturb stream 0
        let a0: Vec<f64> = (0..4).map(|_| a.gauss(StreamId(0), None).unwrap()).collect();
        let _ = b.gauss(StreamId(5), None).unwrap();
        let b0: Vec<f64> = (0..4)
            .map(|_| {
                let g = b.gauss(StreamId(0), None).unwrap();
                let _ = b.gauss(StreamId(1), None).unwrap();
                g
            })
            .collect();
        assert_eq!(a0, b0);
        assert_ne!(a.gauss(StreamId(1), None).unwrap(), a.gauss(StreamId(2), None).unwrap());
    }

    #[test]
    fn test_service_deviate_drives_smearing() {
        let lookup = FixedLookup::new(1.0, 1.0, 1.0, 1.0, 0.05);
        let cal = EnergyCalibrator::new(lookup, CalibrationMode::Simulation, false);
        let mut pho = photon(40.0, 0.0);
        let hits = EcalRecHitCollection::new();
        cal.calibrate_photon(&mut pho, 1, &hits, StreamId(3), Some(&ConstService(-2.0))).unwrap();
        assert_relative_eq!(pho.energy, 40.0 * 0.9, epsilon = 1e-12);
        assert_relative_eq!(pho.energy_error, 0.05 * 36.0, epsilon = 1e-12);
    }

    #[test]
    fn test_data_photon_bundle_layout() {
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Data, false);
        let mut pho = photon(100.0, 1.0);
        let hits = EcalRecHitCollection::new();
        let b = cal.calibrate_photon(&mut pho, 1, &hits, StreamId(0), None).unwrap();
        assert_eq!(b.len(), PHOTON_BUNDLE_LEN);
        assert_relative_eq!(b[0], 100.98, epsilon = 1e-9);
        assert_relative_eq!(b[1], 103.02, epsilon = 1e-9);
        assert_relative_eq!(b[2], 103.02, epsilon = 1e-9);
        assert_relative_eq!(b[3], 100.98, epsilon = 1e-9);
        assert_relative_eq!(b[4], 100.0, epsilon = 1e-9);
        assert_relative_eq!(b[5], 104.0, epsilon = 1e-9);
        for i in 6..10 {
            assert_relative_eq!(b[i], 102.0, epsilon = 1e-9);
        }
        assert_relative_eq!(pho.energy, 102.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mode_override_for_photons() {
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Simulation, true);
        let mut pho = photon(100.0, 1.0);
        cal.calibrate_photon_with_mode(
            CalibrationMode::Data,
            &mut pho,
            1,
            &EcalRecHitCollection::new(),
            StreamId(0),
            None,
        )
        .unwrap();
        assert_relative_eq!(pho.energy, 102.0, epsilon = 1e-9);
    }

    #[test]
    fn test_calibration_is_not_idempotent() {
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Data, false);
        let hits = EcalRecHitCollection::new();
        let mut pho = photon(100.0, 1.0);
        cal.calibrate_photon(&mut pho, 1, &hits, StreamId(0), None).unwrap();
        let once = pho.energy;
        cal.calibrate_photon(&mut pho, 1, &hits, StreamId(0), None).unwrap();
        assert_relative_eq!(once, 102.0, epsilon = 1e-9);
        assert_relative_eq!(pho.energy, 100.0 * 1.02 * 1.02, epsilon = 1e-9);
        assert!(pho.energy > once);
    }

    #[test]
    fn test_seed_gain_state_reaches_lookup() {
        let cal = EnergyCalibrator::new(scenario_lookup(), CalibrationMode::Data, false);
        let seed = EcalRecHit::new(DetId(22), 300.0)
            .with_flag(RecHitFlag::HasSwitchToGain6)
            .with_flag(RecHitFlag::HasSwitchToGain1);
        let hits = EcalRecHitCollection::from(vec![seed]);
        let mut pho = photon(100.0, 1.0);
        cal.calibrate_photon(&mut pho, 1, &hits, StreamId(0), None).unwrap();
        assert_eq!(
            cal.lookup().last_gain.load(Ordering::SeqCst),
            (GainState::GAIN6 | GainState::GAIN1).bits()
        );

        let mut other = photon(100.0, 1.0);
        other.seed_id = DetId(23);
        cal.calibrate_photon(&mut other, 1, &hits, StreamId(0), None).unwrap();
        assert_eq!(cal.lookup().last_gain.load(Ordering::SeqCst), 0);
    }
}
