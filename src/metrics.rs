//! Metrics and tracing hooks.
//!
//! With the `metrics` feature, [`METRICS`] holds OpenTelemetry instruments backed
//! by a Prometheus registry that the host process can expose. With the `tracing`
//! feature, [`tracing_helpers`] provides the spans wrapped around lifecycle
//! operations and statement execution.

#[cfg(feature = "metrics")]
pub use self::otel::{AuditMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use std::time::Duration;

    pub static METRICS: Lazy<AuditMetrics> = Lazy::new(AuditMetrics::init);

    pub struct AuditMetrics {
        /// Registry the Prometheus exporter writes into.
        pub registry: prometheus::Registry,
        provider: SdkMeterProvider,
        pub statements_total: Counter<u64>,
        pub ddl_duration: Histogram<f64>,
        pub triggers_created_total: Counter<u64>,
        pub tables_skipped_total: Counter<u64>,
        pub tables_failed_total: Counter<u64>,
        pub triggers_dropped_total: Counter<u64>,
    }

    impl AuditMetrics {
        pub fn init() -> Self {
            let registry = prometheus::Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
                Err(e) => {
                    log::warn!("Audit metrics: prometheus exporter unavailable: {}", e);
                    SdkMeterProvider::builder().build()
                }
            };
            let meter = provider.meter("lifeguard_audit");

            let statements_total = meter
                .u64_counter("audit_statements_total")
                .with_description("Statements executed by the audit engine")
                .build();
            let ddl_duration = meter
                .f64_histogram("audit_ddl_duration_seconds")
                .with_description("Duration of audit engine statements")
                .build();
            let triggers_created_total = meter
                .u64_counter("audit_triggers_created_total")
                .with_description("Triggers created or replaced")
                .build();
            let tables_skipped_total = meter
                .u64_counter("audit_tables_skipped_total")
                .with_description("Tables skipped as ineligible")
                .build();
            let tables_failed_total = meter
                .u64_counter("audit_tables_failed_total")
                .with_description("Tables whose trigger setup failed")
                .build();
            let triggers_dropped_total = meter
                .u64_counter("audit_triggers_dropped_total")
                .with_description("Existing triggers dropped")
                .build();

            Self {
                registry,
                provider,
                statements_total,
                ddl_duration,
                triggers_created_total,
                tables_skipped_total,
                tables_failed_total,
                triggers_dropped_total,
            }
        }

        pub fn provider(&self) -> &SdkMeterProvider {
            &self.provider
        }

        pub fn record_statement(&self, elapsed: Duration, ok: bool) {
            let outcome = KeyValue::new("outcome", if ok { "ok" } else { "error" });
            self.statements_total.add(1, &[outcome]);
            self.ddl_duration.record(elapsed.as_secs_f64(), &[]);
        }

        /// One table got its three triggers.
        pub fn record_created(&self, table: &str) {
            self.triggers_created_total
                .add(3, &[KeyValue::new("table", table.to_string())]);
        }

        pub fn record_skipped(&self) {
            self.tables_skipped_total.add(1, &[]);
        }

        pub fn record_failed(&self, table: &str) {
            self.tables_failed_total
                .add(1, &[KeyValue::new("table", table.to_string())]);
        }

        pub fn record_dropped(&self, count: u64) {
            if count > 0 {
                self.triggers_dropped_total.add(count, &[]);
            }
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    /// Longest statement prefix attached to a span.
    const STATEMENT_PREVIEW: usize = 120;

    fn preview(sql: &str) -> &str {
        let sql = sql.trim_start();
        match sql.char_indices().nth(STATEMENT_PREVIEW) {
            Some((idx, _)) => &sql[..idx],
            None => sql,
        }
    }

    pub fn execute_statement_span(sql: &str) -> Span {
        info_span!("audit.execute", statement = preview(sql))
    }

    pub fn create_triggers_span(table: &str) -> Span {
        info_span!("audit.create_triggers", table = table)
    }

    pub fn drop_triggers_span(table: &str) -> Span {
        info_span!("audit.drop_triggers", table = table)
    }

    pub fn migration_batch_span(tables: usize) -> Span {
        info_span!("audit.migration_batch", touched_tables = tables)
    }

}
