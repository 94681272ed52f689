//! Per-stream random engines.
//!
//! Stream `s` is seeded with `base_seed + s`, so a given stream replays the
//! same deviates no matter how streams are scheduled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use eg_core::traits::RandomService;
use eg_core::StreamId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Process-wide registry handing out one engine per stream.
#[derive(Debug)]
pub struct StreamRngRegistry {
    base_seed: u64,
    engines: Mutex<HashMap<StreamId, Arc<Mutex<StdRng>>>>,
}

impl StreamRngRegistry {
    /// Registry whose stream `s` engine is seeded with `base_seed + s`.
    pub fn new(base_seed: u64) -> Self {
        Self { base_seed, engines: Mutex::new(HashMap::new()) }
    }

    /// Engine owned by `stream`, created on first use.
    pub fn engine(&self, stream: StreamId) -> Arc<Mutex<StdRng>> {
        let mut engines = self.engines.lock().expect("rng registry mutex poisoned");
        let engine = engines.entry(stream).or_insert_with(|| {
            tracing::debug!(stream = stream.0, "creating stream engine");
            let seed = self.base_seed.wrapping_add(u64::from(stream.0));
            Arc::new(Mutex::new(StdRng::seed_from_u64(seed)))
        });
        Arc::clone(engine)
    }

    /// Number of streams that have drawn so far.
    pub fn n_streams(&self) -> usize {
        self.engines.lock().expect("rng registry mutex poisoned").len()
    }
}

impl RandomService for StreamRngRegistry {
    fn standard_normal(&self, stream: StreamId) -> f64 {
        let engine = self.engine(stream);
        let mut rng = engine.lock().expect("stream engine mutex poisoned");
        StandardNormal.sample(&mut *rng)
    }
}
