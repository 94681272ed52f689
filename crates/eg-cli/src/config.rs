//! Calibration job configuration and framework-style event records.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eg_calib::{EcalRecHitCollection, Event};
use eg_core::{CalibrationMode, StreamId};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationConfig {
    /// Name of the candidate collection inside each input event.
    pub input_tag: String,
    /// Correction table (relative paths resolve against the config file).
    pub correction_file: PathBuf,
    /// Simulated input: smear instead of scaling.
    pub is_mc: bool,
    /// Force every Gaussian deviate to 1.0.
    #[serde(default)]
    pub is_synchronization: bool,
    /// Seed of a private per-instance engine (wins over the stream service).
    #[serde(default)]
    pub private_rng_seed: Option<u64>,
    /// Base seed of the per-stream random service. Absent means no service.
    #[serde(default)]
    pub rng_base_seed: Option<u64>,
    /// Photons only: let each event's real-data flag pick the branch.
    #[serde(default = "default_true")]
    pub auto_data_type: bool,
    #[serde(default = "default_rec_hits_eb")]
    pub rec_hit_collection_eb: String,
    #[serde(default = "default_rec_hits_ee")]
    pub rec_hit_collection_ee: String,
    /// Maximum E–p pull before the combiner ignores the track.
    #[serde(default = "default_max_ep_pull")]
    pub max_ep_pull: f64,
}

fn default_true() -> bool {
    true
}

fn default_rec_hits_eb() -> String {
    "reducedEcalRecHitsEB".to_string()
}

fn default_rec_hits_ee() -> String {
    "reducedEcalRecHitsEE".to_string()
}

fn default_max_ep_pull() -> f64 {
    eg_calib::combiner::DEFAULT_MAX_EP_PULL
}

impl CalibrationConfig {
    pub fn mode(&self) -> CalibrationMode {
        CalibrationMode::from_is_mc(self.is_mc)
    }
}

/// Read a config from YAML (default) or JSON (`.json` extension).
pub fn read_config(path: &Path) -> Result<CalibrationConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let mut cfg: CalibrationConfig = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        serde_yaml_ng::from_slice(&bytes)?
    };
    if cfg.correction_file.is_relative() {
        if let Some(dir) = path.parent() {
            cfg.correction_file = dir.join(&cfg.correction_file);
        }
    }
    Ok(cfg)
}

/// One event as handed over by the surrounding framework: named candidate
/// collections and named rec-hit collections.
#[derive(Debug, Clone, Deserialize)]
pub struct InputEvent<T> {
    pub run: u32,
    #[serde(default)]
    pub stream: StreamId,
    #[serde(default)]
    pub is_real_data: bool,
    pub collections: BTreeMap<String, Vec<T>>,
    #[serde(default)]
    pub rec_hits: BTreeMap<String, EcalRecHitCollection>,
}

pub fn read_events<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<InputEvent<T>>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let events: Vec<InputEvent<T>> = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing events from {}", path.display()))?;
    Ok(events)
}

/// Select the configured collections out of each input event.
pub fn select_events<T>(
    cfg: &CalibrationConfig,
    input: Vec<InputEvent<T>>,
) -> Result<Vec<Event<T>>> {
    input
        .into_iter()
        .enumerate()
        .map(|(i, mut ev)| {
            let candidates = ev.collections.remove(&cfg.input_tag).ok_or_else(|| {
                anyhow::anyhow!("event {i} (run {}): no collection '{}'", ev.run, cfg.input_tag)
            })?;
            let mut take_hits = |tag: &str| {
                ev.rec_hits.remove(tag).unwrap_or_else(|| {
                    tracing::warn!(
                        event = i,
                        tag,
                        "rec-hit collection missing, assuming no gain switch"
                    );
                    EcalRecHitCollection::new()
                })
            };
            let rec_hits_eb = take_hits(&cfg.rec_hit_collection_eb);
            let rec_hits_ee = take_hits(&cfg.rec_hit_collection_ee);
            Ok(Event {
                run: ev.run,
                stream: ev.stream,
                is_real_data: ev.is_real_data,
                candidates,
                rec_hits_eb,
                rec_hits_ee,
            })
        })
        .collect()
}
