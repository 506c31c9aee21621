//! Metrics for the chain synchronizer.

use std::time::Duration;

use vise::{Buckets, Counter, EncodeLabelSet, EncodeLabelValue, Family, Histogram, Metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue, EncodeLabelSet)]
#[metrics(label = "stage", rename_all = "snake_case")]
pub(super) enum SyncStage {
    FetchEvents,
    ProcessBatches,
    Persist,
}

#[derive(Debug, Metrics)]
#[metrics(prefix = "rollup_synchronizer")]
pub(super) struct SynchronizerMetrics {
    /// Number of base-chain blocks synchronized.
    pub blocks_synced: Counter,
    /// Number of reorgs handled.
    pub reorgs: Counter,
    /// Latency of one block sync, split by stage.
    #[metrics(buckets = Buckets::LATENCIES)]
    pub sync_stage: Family<SyncStage, Histogram<Duration>>,
}

#[vise::register]
pub(super) static METRICS: vise::Global<SynchronizerMetrics> = vise::Global::new();
