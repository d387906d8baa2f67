//! Shared handle to the currently active predictor
//!
//! The registry holds a single slot with the active predictor and the
//! timestamp of the last successful retrain. The slot is replaced as a
//! whole by one atomic pointer swap, so readers always observe a
//! consistent pair and never wait on a writer.

use crate::predictor::Predictor;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Consistent view of the registry slot
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub predictor: Option<Arc<Predictor>>,
    /// Unix seconds of the last successful (re)load, 0 if never
    pub last_retrain_timestamp: i64,
}

/// Lock-free registry of the active predictor
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    slot: Arc<ArcSwap<RegistrySnapshot>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// Create an empty registry with no active predictor
    pub fn new() -> Self {
        Self {
            slot: Arc::new(ArcSwap::from_pointee(RegistrySnapshot::default())),
        }
    }

    /// The active predictor, if any
    pub fn current(&self) -> Option<Arc<Predictor>> {
        self.slot.load().predictor.clone()
    }

    /// Both slot fields from the same generation
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::clone(&self.slot.load())
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.load().predictor.is_some()
    }

    /// Replace the active predictor and its retrain timestamp in one swap
    pub fn publish(&self, predictor: Predictor, last_retrain_timestamp: i64) -> Arc<Predictor> {
        let predictor = Arc::new(predictor);
        self.slot.store(Arc::new(RegistrySnapshot {
            predictor: Some(Arc::clone(&predictor)),
            last_retrain_timestamp,
        }));
        predictor
    }
}
