use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn setup_metrics_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus recorder installs with static config")
}

/// Sync progress metrics (SPEC_FULL.md §1's ambient observability stack,
/// repurposed from the teacher's HTTP-request metrics onto the sync loop).
#[derive(Clone)]
pub struct Metrics {
    pub prometheus_handle: PrometheusHandle,
}

impl Metrics {
    pub fn new(prometheus_handle: PrometheusHandle) -> Self {
        Self { prometheus_handle }
    }

    pub fn record_block_imported(&self) {
        metrics::increment_counter!("blocks_imported_total");
    }

    pub fn record_sync_progress(&self, current_height: i64, target_height: i64) {
        metrics::gauge!("sync_current_height", current_height as f64);
        metrics::gauge!("sync_target_height", target_height as f64);

        let progress = if target_height > 0 {
            (current_height as f64 / target_height as f64) * 100.0
        } else {
            0.0
        };
        metrics::gauge!("sync_progress_percentage", progress);
    }

    pub fn record_tx_in_flight(&self, count: u64) {
        metrics::gauge!("tx_in_flight", count as f64);
    }
}
