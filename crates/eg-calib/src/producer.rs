//! Per-event batch drivers.
//!
//! A producer copies every input candidate into a fresh output collection,
//! calibrates the copy, and appends each uncertainty-bundle entry to its
//! named parallel array. Products are returned only once the whole event has
//! been processed, so a fatal error publishes nothing.

use std::collections::BTreeMap;

use eg_core::traits::{
    CorrectionLookup, EgammaCandidate, MomentumCombiner, RandomService, TrackMatchedCandidate,
};
use eg_core::{CalibrationMode, Result, StreamId, UncertaintyBundle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::calibrator::EnergyCalibrator;
use crate::combiner::EpCombiner;
use crate::rechit::EcalRecHitCollection;

/// Output names of the electron uncertainty maps, in bundle order.
pub const ELECTRON_UNCERTAINTY_NAMES: [&str; 3] =
    ["EGMscaleStatUncertainty", "EGMscaleSystUncertainty", "EGMscaleGainUncertainty"];

/// Output names of the photon uncertainty maps, in bundle order.
pub const PHOTON_UNCERTAINTY_NAMES: [&str; 10] = [
    "EGMscaleStatUpUncertainty",
    "EGMscaleStatDownUncertainty",
    "EGMscaleSystUpUncertainty",
    "EGMscaleSystDownUncertainty",
    "EGMscaleGainUpUncertainty",
    "EGMscaleGainDownUncertainty",
    "EGMresolutionRhoUpUncertainty",
    "EGMresolutionRhoDownUncertainty",
    "EGMresolutionPhiUpUncertainty",
    "EGMresolutionPhiDownUncertainty",
];

/// One event: a candidate collection plus the rec-hits it points into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<T> {
    /// Run number.
    pub run: u32,
    /// Execution stream this event is processed on.
    #[serde(default)]
    pub stream: StreamId,
    /// `true` for collision data, `false` for simulation.
    #[serde(default)]
    pub is_real_data: bool,
    /// Input candidates.
    pub candidates: Vec<T>,
    /// Barrel rec-hits.
    #[serde(default)]
    pub rec_hits_eb: EcalRecHitCollection,
    /// Endcap rec-hits.
    #[serde(default)]
    pub rec_hits_ee: EcalRecHitCollection,
}

impl<T> Event<T> {
    /// Rec-hit collection for a region.
    pub fn rec_hits(&self, is_barrel: bool) -> &EcalRecHitCollection {
        if is_barrel {
            &self.rec_hits_eb
        } else {
            &self.rec_hits_ee
        }
    }
}

/// Float values aligned by position with a candidate collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValueMap {
    /// Product name.
    pub name: String,
    /// One value per output candidate.
    pub values: Vec<f64>,
}

/// Everything one event publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Products<T> {
    /// Calibrated candidates, same order as the input.
    pub candidates: Vec<T>,
    /// Uncertainty maps, one per source.
    pub uncertainties: Vec<NamedValueMap>,
}

impl<T> Products<T> {
    /// Number of output candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// `true` if no candidates were produced.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Values of the uncertainty map called `name`.
    pub fn uncertainty(&self, name: &str) -> Option<&[f64]> {
        self.uncertainties.iter().find(|m| m.name == name).map(|m| m.values.as_slice())
    }
}

/// Something that turns one event into products.
pub trait EventProducer<T>: Sync {
    /// Calibrate one event.
    fn produce(&self, event: &Event<T>, rng: Option<&dyn RandomService>) -> Result<Products<T>>;
}

fn collect_products<T, F>(event: &Event<T>, names: &[&str], mut calibrate: F) -> Result<Products<T>>
where
    T: EgammaCandidate,
    F: FnMut(&mut T, &EcalRecHitCollection) -> Result<UncertaintyBundle>,
{
    let n = event.candidates.len();
    let mut out: Vec<T> = Vec::with_capacity(n);
    let mut columns: Vec<Vec<f64>> = names.iter().map(|_| Vec::with_capacity(n)).collect();

    for candidate in &event.candidates {
        let mut copy = candidate.clone();
        let hits = event.rec_hits(copy.is_barrel());
        let bundle = calibrate(&mut copy, hits)?;
        debug_assert_eq!(bundle.len(), names.len());
        for (column, value) in columns.iter_mut().zip(bundle.values()) {
            column.push(*value);
        }
        out.push(copy);
    }

    let uncertainties = names
        .iter()
        .zip(columns)
        .map(|(name, values)| NamedValueMap { name: (*name).to_string(), values })
        .collect();
    Ok(Products { candidates: out, uncertainties })
}

/// Electron batch driver.
#[derive(Debug)]
pub struct ElectronProducer<L, M = EpCombiner> {
    calibrator: EnergyCalibrator<L>,
    combiner: M,
}

impl<L: CorrectionLookup, M> ElectronProducer<L, M> {
    /// Driver around a calibrator and a combiner.
    pub fn new(calibrator: EnergyCalibrator<L>, combiner: M) -> Self {
        Self { calibrator, combiner }
    }

    /// The calibrator.
    pub fn calibrator(&self) -> &EnergyCalibrator<L> {
        &self.calibrator
    }

    /// Calibrate every electron of `event`.
    pub fn produce<E>(
        &self,
        event: &Event<E>,
        rng: Option<&dyn RandomService>,
    ) -> Result<Products<E>>
    where
        E: TrackMatchedCandidate,
        M: MomentumCombiner<E>,
    {
        let products = collect_products(event, &ELECTRON_UNCERTAINTY_NAMES, |ele, hits| {
            let stream = event.stream;
            self.calibrator.calibrate_electron(ele, &self.combiner, event.run, hits, stream, rng)
        })?;
        tracing::debug!(run = event.run, n = products.len(), "electrons calibrated");
        Ok(products)
    }
}

impl<L, M, E> EventProducer<E> for ElectronProducer<L, M>
where
    L: CorrectionLookup,
    M: MomentumCombiner<E>,
    E: TrackMatchedCandidate + Sync,
{
    fn produce(&self, event: &Event<E>, rng: Option<&dyn RandomService>) -> Result<Products<E>> {
        ElectronProducer::produce(self, event, rng)
    }
}

/// Photon batch driver.
#[derive(Debug)]
pub struct PhotonProducer<L> {
    calibrator: EnergyCalibrator<L>,
    auto_data_type: bool,
}

impl<L: CorrectionLookup> PhotonProducer<L> {
    /// Driver around a calibrator.
    ///
    /// With `auto_data_type` the event's real-data flag decides the branch
    /// instead of the calibrator's constructed mode.
    pub fn new(calibrator: EnergyCalibrator<L>, auto_data_type: bool) -> Self {
        Self { calibrator, auto_data_type }
    }

    /// The calibrator.
    pub fn calibrator(&self) -> &EnergyCalibrator<L> {
        &self.calibrator
    }

    /// Mode applied to `event`.
    pub fn effective_mode<T>(&self, event: &Event<T>) -> CalibrationMode {
        if self.auto_data_type {
            CalibrationMode::from_is_mc(!event.is_real_data)
        } else {
            self.calibrator.mode()
        }
    }

    /// Calibrate every photon of `event`.
    pub fn produce<P: EgammaCandidate>(
        &self,
        event: &Event<P>,
        rng: Option<&dyn RandomService>,
    ) -> Result<Products<P>> {
        let mode = self.effective_mode(event);
        if mode != self.calibrator.mode() {
            tracing::debug!(run = event.run, ?mode, "event data type overrides calibrator mode");
        }
        let products = collect_products(event, &PHOTON_UNCERTAINTY_NAMES, |pho, hits| {
            let stream = event.stream;
            self.calibrator.calibrate_photon_with_mode(mode, pho, event.run, hits, stream, rng)
        })?;
        tracing::debug!(run = event.run, n = products.len(), "photons calibrated");
        Ok(products)
    }
}

impl<L, P> EventProducer<P> for PhotonProducer<L>
where
    L: CorrectionLookup,
    P: EgammaCandidate + Sync,
{
    fn produce(&self, event: &Event<P>, rng: Option<&dyn RandomService>) -> Result<Products<P>> {
        PhotonProducer::produce(self, event, rng)
    }
}

/// Calibrate many events in parallel.
///
/// Events sharing a stream run sequentially in input order, so each stream
/// consumes its random engine exactly as a sequential loop would. Distinct
/// streams fan out over the rayon pool. Output order matches `events`. The
/// first error aborts.
pub fn produce_events<T, P>(
    producer: &P,
    events: &[Event<T>],
    rng: Option<&dyn RandomService>,
) -> Result<Vec<Products<T>>>
where
    T: Send + Sync,
    P: EventProducer<T>,
{
    let mut by_stream: BTreeMap<StreamId, Vec<usize>> = BTreeMap::new();
    for (i, event) in events.iter().enumerate() {
        by_stream.entry(event.stream).or_default().push(i);
    }
    tracing::info!(n_events = events.len(), n_streams = by_stream.len(), "calibrating events");

    let per_stream: Vec<Vec<(usize, Products<T>)>> = by_stream
        .into_values()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|indices| {
            indices
                .into_iter()
                .map(|i| producer.produce(&events[i], rng).map(|products| (i, products)))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let mut ordered: Vec<(usize, Products<T>)> = per_stream.into_iter().flatten().collect();
    ordered.sort_unstable_by_key(|(i, _)| *i);
    Ok(ordered.into_iter().map(|(_, products)| products).collect())
}
