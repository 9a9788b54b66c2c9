use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

#[derive(Clone)]
pub struct CatalogMetrics {
    pub registry: Registry,
    pub events_total: IntCounterVec,
    pub event_retries_total: IntCounter,
    pub publish_failures_total: IntCounter,
    pub stock_rejections_total: IntCounterVec,
    pub ingest_duration_seconds: Histogram,
    pub http_errors_total: IntCounterVec,
}

impl CatalogMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let events_total = IntCounterVec::new(
            Opts::new("catalog_events_total", "Inbound catalog events by topic, action and outcome"),
            &["topic", "action", "outcome"],
        ).expect("catalog_events_total definition");
        let event_retries_total = IntCounter::new(
            "catalog_event_retries_total",
            "Retries of inbound events after transient failures",
        ).expect("catalog_event_retries_total definition");
        let publish_failures_total = IntCounter::new(
            "catalog_publish_failures_total",
            "Derived product.created events that could not be published",
        ).expect("catalog_publish_failures_total definition");
        let stock_rejections_total = IntCounterVec::new(
            Opts::new("catalog_stock_rejections_total", "Reserve/release/set-stock calls rejected by the ledger"),
            &["reason"],
        ).expect("catalog_stock_rejections_total definition");
        let ingest_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "catalog_ingest_duration_seconds",
                "Time spent applying one inbound catalog event"
            ).buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
        ).expect("catalog_ingest_duration_seconds definition");
        let http_errors_total = IntCounterVec::new(
            Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)"
            ),
            &["service", "code", "status"]
        ).expect("http_errors_total definition");
        let _ = registry.register(Box::new(events_total.clone()));
        let _ = registry.register(Box::new(event_retries_total.clone()));
        let _ = registry.register(Box::new(publish_failures_total.clone()));
        let _ = registry.register(Box::new(stock_rejections_total.clone()));
        let _ = registry.register(Box::new(ingest_duration_seconds.clone()));
        let _ = registry.register(Box::new(http_errors_total.clone()));
        CatalogMetrics {
            registry,
            events_total,
            event_retries_total,
            publish_failures_total,
            stock_rejections_total,
            ingest_duration_seconds,
            http_errors_total,
        }
    }

    pub fn record_event(&self, topic: &str, action: &str, outcome: &str) {
        self.events_total.with_label_values(&[topic, action, outcome]).inc();
    }
}

impl Default for CatalogMetrics {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_catalog_families() {
        let metrics = CatalogMetrics::new();
        metrics.record_event("product.events", "create", "applied");
        metrics.stock_rejections_total.with_label_values(&["insufficient_stock"]).inc();
        let names: Vec<String> = metrics.registry.gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"catalog_events_total".to_string()));
        assert!(names.contains(&"catalog_stock_rejections_total".to_string()));
    }
}
