use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

pub const COUCHREP_BATCHES_PROCESSED_TOTAL: &str = "couchrep_batches_processed_total";
pub const COUCHREP_REVISIONS_CHECKED_TOTAL: &str = "couchrep_revisions_checked_total";
pub const COUCHREP_MISSING_REVISIONS_TOTAL: &str = "couchrep_missing_revisions_total";
pub const COUCHREP_BATCH_SIZE: &str = "couchrep_batch_size";
pub const COUCHREP_REVS_DIFF_DURATION_SECONDS: &str = "couchrep_revs_diff_duration_seconds";
pub const COUCHREP_ACTIVE_WORKERS: &str = "couchrep_active_workers";
pub const REPLICATION_ID_LABEL: &str = "replication_id";

/// Register metrics emitted by couchrep. This should be called before starting a worker pool.
/// It is safe to call this method multiple times, the metrics are registered only once.
pub(crate) fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            COUCHREP_BATCHES_PROCESSED_TOTAL,
            Unit::Count,
            "Total number of change batches whose missing revisions were computed"
        );

        describe_counter!(
            COUCHREP_REVISIONS_CHECKED_TOTAL,
            Unit::Count,
            "Total number of distinct document revisions sent to the target in revision diffs"
        );

        describe_counter!(
            COUCHREP_MISSING_REVISIONS_TOTAL,
            Unit::Count,
            "Total number of revisions reported missing by the target"
        );

        describe_gauge!(
            COUCHREP_BATCH_SIZE,
            Unit::Count,
            "Number of change events in the last batch acquired by a worker"
        );

        describe_histogram!(
            COUCHREP_REVS_DIFF_DURATION_SECONDS,
            Unit::Seconds,
            "Time taken in seconds by a revision diff round trip to the target"
        );

        describe_gauge!(
            COUCHREP_ACTIVE_WORKERS,
            Unit::Count,
            "Number of replication workers currently running"
        );
    });
}
