use std::sync::{Arc, RwLock};

/// Counters kept by the uplink and the log shipper.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Payload bytes of successful series submissions.
    pub sent_series_bytes: u64,
    /// Series in successful submissions.
    pub sent_series: u64,
    /// Series dropped after repeated submission failure.
    pub sent_series_errors: u64,
    /// Series merged into an identity already in the store.
    pub store_aggregations: u64,
    /// Bytes of successfully shipped log output.
    pub sent_logs_bytes: u64,
    /// Failed log shipments.
    pub sent_logs_errors: u64,
}

/// Shared, cloneable handle on the client counters.
#[derive(Debug, Default, Clone)]
pub struct Stats {
    inner: Arc<RwLock<Snapshot>>,
}

impl Stats {
    /// Fresh zeroed counters.
    pub fn new() -> Stats {
        Stats::default()
    }

    /// Mutate the counters under the write lock.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut snapshot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut snapshot)
    }

    /// A copy of the current counters.
    pub fn snapshot(&self) -> Snapshot {
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }
}
