//! Logging and observability helpers.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. Host applications that bring
/// their own subscriber can skip this; `try_init` keeps it idempotent.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("schemabot=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_ansi(false)
        .try_init();
}

/// Per-call log sampler. Fetchers emit one debug line per column or index
/// row; sampling keeps default verbosity quiet on wide schemas while still
/// leaving a trace of the shape.
pub struct Sampler {
    every: u64,
    counter: AtomicU64,
}

impl Sampler {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            counter: AtomicU64::new(0),
        }
    }

    /// True on the first hit and then once per `every` hits.
    pub fn hit(&self) -> bool {
        self.counter.fetch_add(1, Ordering::Relaxed) % self.every == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_fires_on_first_and_every_nth() {
        let sampler = Sampler::new(3);
        let hits: Vec<bool> = (0..7).map(|_| sampler.hit()).collect();
        assert_eq!(hits, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn sampler_tolerates_zero() {
        let sampler = Sampler::new(0);
        assert!(sampler.hit());
        assert!(sampler.hit());
    }
}
