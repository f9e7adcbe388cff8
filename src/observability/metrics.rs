use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Token endpoint
    pub acquisitions: IntCounter,
    pub acquisition_failures: IntCounterVec,
    pub acquisition_duration: HistogramVec,

    // Validation endpoint, label: valid | invalid
    pub validations: IntCounterVec,

    // Token file
    pub store_write_failures: IntCounter,

    // Refresh
    pub refreshes_scheduled: IntCounter,
    pub token_outdated_at_unix: IntGauge,

    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("credentialagent".into()), None)
            .expect("valid registry prefix");

        let metrics = Arc::new(Self {
            acquisitions: IntCounter::new("token_acquisitions_total", "Client-credentials exchanges attempted").expect("metric"),
            acquisition_failures: IntCounterVec::new(Opts::new("token_acquisition_failures_total", "Failed exchanges by reason"), &["reason"]).expect("metric"),
            acquisition_duration: HistogramVec::new(HistogramOpts::new("token_acquisition_duration_seconds", "Exchange duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]), &["result"]).expect("metric"),
            validations: IntCounterVec::new(Opts::new("token_validations_total", "Cached token validations by result"), &["result"]).expect("metric"),
            store_write_failures: IntCounter::new("token_store_write_failures_total", "Token file writes that failed").expect("metric"),
            refreshes_scheduled: IntCounter::new("token_refreshes_scheduled_total", "Refresh timers armed").expect("metric"),
            token_outdated_at_unix: IntGauge::new("token_outdated_at_unix_seconds", "When the published token is due for refresh").expect("metric"),
            up: IntGauge::new("up", "1 if service is healthy").expect("metric"),
            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics.acquisitions.clone()),
            Box::new(metrics.acquisition_failures.clone()),
            Box::new(metrics.acquisition_duration.clone()),
            Box::new(metrics.validations.clone()),
            Box::new(metrics.store_write_failures.clone()),
            Box::new(metrics.refreshes_scheduled.clone()),
            Box::new(metrics.token_outdated_at_unix.clone()),
            Box::new(metrics.up.clone()),
        ];
        for collector in collectors {
            reg.register(collector).expect("metric names are unique");
        }

        metrics
    }
}
