//! Prometheus metrics for local predictions
//!
//! Provides:
//! - Prediction latency histogram and prediction/error counters
//! - Resource load counters labelled by the source that resolved them

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<Option<LocalMetricsInner>> = OnceLock::new();

struct LocalMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions: IntCounter,
    prediction_errors: IntCounter,
    resources_loaded: IntCounterVec,
    load_failures: IntCounter,
}

impl LocalMetricsInner {
    fn register() -> prometheus::Result<Self> {
        Ok(Self {
            prediction_latency_seconds: register_histogram!(
                "bigml_local_prediction_latency_seconds",
                "Time spent computing a local prediction",
                LATENCY_BUCKETS.to_vec()
            )?,
            predictions: register_int_counter!(
                "bigml_local_predictions_total",
                "Total number of local predictions computed"
            )?,
            prediction_errors: register_int_counter!(
                "bigml_local_prediction_errors_total",
                "Total number of local predictions that failed"
            )?,
            resources_loaded: register_int_counter_vec!(
                "bigml_local_resources_loaded_total",
                "Resources resolved for local use, by source",
                &["source"]
            )?,
            load_failures: register_int_counter!(
                "bigml_local_load_failures_total",
                "Resources that failed to load"
            )?,
        })
    }
}

/// Handle to the global local prediction metrics.
///
/// Clones share the same underlying metrics. When registration fails (a
/// metric with the same name already registered elsewhere) every recording
/// becomes a no-op.
#[derive(Clone)]
pub struct LocalMetrics {
    _private: (),
}

impl Default for LocalMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match LocalMetricsInner::register() {
            Ok(inner) => Some(inner),
            Err(err) => {
                warn!(error = %err, "Failed to register local prediction metrics");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&LocalMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    /// Record the outcome of a prediction that started at `started`
    pub fn observe_prediction(&self, started: Instant, success: bool) {
        let Some(inner) = self.inner() else {
            return;
        };
        inner
            .prediction_latency_seconds
            .observe(started.elapsed().as_secs_f64());
        if success {
            inner.predictions.inc();
        } else {
            inner.prediction_errors.inc();
        }
    }

    /// Count a resource resolved from `source`
    pub fn inc_resources_loaded(&self, source: &str) {
        if let Some(inner) = self.inner() {
            inner.resources_loaded.with_label_values(&[source]).inc();
        }
    }

    pub fn inc_load_failures(&self) {
        if let Some(inner) = self.inner() {
            inner.load_failures.inc();
        }
    }

    /// Predictions recorded so far
    pub fn predictions_total(&self) -> u64 {
        self.inner().map_or(0, |inner| inner.predictions.get())
    }

    /// Resources recorded for `source` so far
    pub fn resources_loaded(&self, source: &str) -> u64 {
        self.inner().map_or(0, |inner| {
            inner.resources_loaded.with_label_values(&[source]).get()
        })
    }
}
