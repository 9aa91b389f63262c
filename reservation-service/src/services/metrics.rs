use crate::numbering::Series;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        tracing::error!("Failed to install Prometheus recorder: {}", e);
        AppError::InternalError(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))
    })?;

    if METRICS_HANDLE.set(handle).is_err() {
        tracing::warn!("Metrics handle already initialized");
    }

    metrics::describe_counter!(
        "sequence_allocations_total",
        "Invoice and receipt numbers handed out, by series"
    );
    metrics::describe_counter!(
        "sequence_conflicts_total",
        "Writes rejected because the allocated number was already taken, by series"
    );
    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_allocation(series: Series) {
    metrics::counter!("sequence_allocations_total", "series" => series.label()).increment(1);
}

pub fn record_conflict(series: Series) {
    metrics::counter!("sequence_conflicts_total", "series" => series.label()).increment(1);
}
