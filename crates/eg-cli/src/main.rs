//! egcalib CLI

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eg_calib::{
    produce_events, CorrectionTable, Electron, ElectronProducer, EnergyCalibrator, EpCombiner,
    Photon, PhotonProducer, Products, StreamRngRegistry,
};
use eg_core::traits::RandomService;

use config::{read_config, read_events, select_events, CalibrationConfig};

#[derive(Parser)]
#[command(name = "egcalib")]
#[command(about = "egcalib - electron/photon energy scale and smearing corrections")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate electron collections
    Electrons {
        /// Job configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Input events (JSON array)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto). Results do not depend on the thread count.
        #[arg(long, default_value = "1")]
        threads: usize,
    },

    /// Calibrate photon collections
    Photons {
        /// Job configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Input events (JSON array)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto). Results do not depend on the thread count.
        #[arg(long, default_value = "1")]
        threads: usize,
    },

    /// Parse and validate a correction table
    ValidateCorrections {
        /// Correction table (JSON)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Electrons { config, input, output, threads } => {
            cmd_electrons(&config, &input, output.as_ref(), threads)
        }
        Commands::Photons { config, input, output, threads } => {
            cmd_photons(&config, &input, output.as_ref(), threads)
        }
        Commands::ValidateCorrections { input } => cmd_validate_corrections(&input),
        Commands::Version => {
            println!("egcalib {}", eg_core::VERSION);
            Ok(())
        }
    }
}

/// Everything shared by the electron and photon jobs.
struct Job {
    cfg: CalibrationConfig,
    table: Arc<CorrectionTable>,
    correction_sha256: String,
    rng: Option<StreamRngRegistry>,
}

impl Job {
    fn load(config: &Path, threads: usize) -> Result<Self> {
        if threads > 0 {
            // Best-effort; if a global pool already exists, keep going.
            let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
        }

        tracing::info!(path = %config.display(), "loading config");
        let cfg = read_config(config)?;
        let bytes = std::fs::read(&cfg.correction_file)
            .with_context(|| format!("reading corrections {}", cfg.correction_file.display()))?;
        let table = CorrectionTable::from_json_str(std::str::from_utf8(&bytes)?)
            .with_context(|| format!("loading corrections {}", cfg.correction_file.display()))?
            .with_mode(cfg.mode());
        tracing::info!(
            n_scales = table.n_scale_bins(),
            n_smearings = table.n_smearing_bins(),
            mode = ?cfg.mode(),
            "correction table loaded"
        );

        let rng = cfg.rng_base_seed.map(StreamRngRegistry::new);
        Ok(Self { table: Arc::new(table), correction_sha256: sha256_hex(&bytes), rng, cfg })
    }

    fn calibrator(&self) -> EnergyCalibrator<Arc<CorrectionTable>> {
        let calibrator = EnergyCalibrator::new(
            Arc::clone(&self.table),
            self.cfg.mode(),
            self.cfg.is_synchronization,
        );
        let calibrator = match self.cfg.private_rng_seed {
            Some(seed) => calibrator.with_private_rng(seed),
            None => calibrator,
        };
        tracing::info!(
            synchronization = calibrator.synchronization(),
            private_rng = calibrator.has_private_rng(),
            stream_service = self.rng.is_some(),
            "calibrator configured"
        );
        calibrator
    }

    fn rng(&self) -> Option<&dyn RandomService> {
        self.rng.as_ref().map(|r| r as &dyn RandomService)
    }

    fn report<T: Serialize>(&self, products: &[Products<T>], runs: &[u32]) -> serde_json::Value {
        let events: Vec<serde_json::Value> = products
            .iter()
            .zip(runs)
            .map(|(p, run)| {
                serde_json::json!({
                    "run": run,
                    "candidates": p.candidates,
                    "uncertainties": p.uncertainties,
                })
            })
            .collect();
        serde_json::json!({
            "input_tag": self.cfg.input_tag,
            "mode": self.cfg.mode(),
            "synchronization": self.cfg.is_synchronization,
            "correction_file": self.cfg.correction_file,
            "correction_sha256": self.correction_sha256,
            "n_events": events.len(),
            "events": events,
        })
    }
}

fn cmd_electrons(
    config: &Path,
    input: &Path,
    output: Option<&PathBuf>,
    threads: usize,
) -> Result<()> {
    let job = Job::load(config, threads)?;
    let events = select_events(&job.cfg, read_events::<Electron>(input)?)?;
    tracing::info!(n_events = events.len(), "events loaded");

    let producer =
        ElectronProducer::new(job.calibrator(), EpCombiner::new(job.cfg.max_ep_pull));
    let products = produce_events(&producer, &events, job.rng())?;

    let runs: Vec<u32> = events.iter().map(|e| e.run).collect();
    write_json(output, job.report(&products, &runs))
}

fn cmd_photons(
    config: &Path,
    input: &Path,
    output: Option<&PathBuf>,
    threads: usize,
) -> Result<()> {
    let job = Job::load(config, threads)?;
    let events = select_events(&job.cfg, read_events::<Photon>(input)?)?;
    tracing::info!(n_events = events.len(), "events loaded");

    let producer = PhotonProducer::new(job.calibrator(), job.cfg.auto_data_type);
    let products = produce_events(&producer, &events, job.rng())?;

    let runs: Vec<u32> = events.iter().map(|e| e.run).collect();
    write_json(output, job.report(&products, &runs))
}

fn cmd_validate_corrections(input: &Path) -> Result<()> {
    let table = CorrectionTable::from_path(input)
        .with_context(|| format!("validating {}", input.display()))?;
    let bytes = std::fs::read(input)?;
    let output_json = serde_json::json!({
        "valid": true,
        "n_scale_bins": table.n_scale_bins(),
        "n_smearing_bins": table.n_smearing_bins(),
        "sha256": sha256_hex(&bytes),
    });
    write_json(None, output_json)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
