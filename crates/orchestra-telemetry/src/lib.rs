//! Span/metric plumbing shared across orchestra-core components.
//!
//! Provides a small vendor-neutral span/metric model plus a `tracing-subscriber`
//! bootstrap helper, so every component instruments itself the same way instead
//! of reaching for its own ad-hoc logging.

#![cfg_attr(not(feature = "std"), no_std)]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

/// Trace ID (128-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId(pub u128);

/// Span ID (64-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanId(pub u64);

/// Span context
#[derive(Debug, Clone)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
}

/// Span attributes
pub type Attributes = BTreeMap<String, String>;

/// Span status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error,
    Unset,
}

/// A completed or in-flight span
#[derive(Debug, Clone)]
pub struct Span {
    pub context: SpanContext,
    pub name: String,
    pub start_time_ms: u64,
    pub end_time_ms: Option<u64>,
    pub attributes: Attributes,
    pub status: SpanStatus,
}

/// Metric value
#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
}

/// Metric sample
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
    pub timestamp_ms: u64,
    pub attributes: Attributes,
}

/// In-process buffer of spans/metrics, optionally drained to an OTLP collector.
///
/// Mirrors the wider codebase's convention of keeping the hot path allocation-free
/// (`no_std` + `alloc`) and gating the network-facing exporter behind `std`.
#[derive(Default)]
pub struct Tracer {
    spans: Vec<Span>,
    metrics: Vec<Metric>,
    #[cfg(feature = "std")]
    exporter: Option<OtlpExporter>,
}

impl Tracer {
    pub fn new() -> Self {
        Self {
            spans: Vec::new(),
            metrics: Vec::new(),
            #[cfg(feature = "std")]
            exporter: None,
        }
    }

    #[cfg(feature = "std")]
    pub fn with_otlp_exporter(endpoint: String) -> Self {
        Self {
            spans: Vec::new(),
            metrics: Vec::new(),
            exporter: Some(OtlpExporter::new(endpoint)),
        }
    }

    pub fn record_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn record_metric(&mut self, metric: Metric) {
        self.metrics.push(metric);
    }

    /// Flush buffered spans/metrics to the configured exporter, if any.
    #[cfg(feature = "std")]
    pub fn export(&mut self) -> Result<(), String> {
        if let Some(ref exporter) = self.exporter {
            exporter.export_spans(&self.spans)?;
            exporter.export_metrics(&self.metrics)?;
            self.spans.clear();
            self.metrics.clear();
        }
        Ok(())
    }
}

/// Minimal OTLP-over-HTTP exporter. Kept deliberately small: the control plane
/// is expected to prefer the `tracing-opentelemetry` layer wired up in
/// [`init_tracing`] for anything beyond ad-hoc span export.
#[cfg(feature = "std")]
pub struct OtlpExporter {
    endpoint: String,
}

#[cfg(feature = "std")]
impl OtlpExporter {
    pub fn new(endpoint: String) -> Self {
        Self { endpoint }
    }

    pub fn export_spans(&self, spans: &[Span]) -> Result<(), String> {
        if spans.is_empty() {
            return Ok(());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|e| e.to_string())?;
        let payload: Vec<_> = spans
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "start_time_ms": s.start_time_ms,
                    "end_time_ms": s.end_time_ms,
                    "attributes": s.attributes,
                })
            })
            .collect();
        let url = format!("{}/v1/traces", self.endpoint.trim_end_matches('/'));
        client
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn export_metrics(&self, metrics: &[Metric]) -> Result<(), String> {
        if metrics.is_empty() {
            return Ok(());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .map_err(|e| e.to_string())?;
        let url = format!("{}/v1/metrics", self.endpoint.trim_end_matches('/'));
        client.post(&url).json(&metrics_json(metrics)).send().map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[cfg(feature = "std")]
fn metrics_json(metrics: &[Metric]) -> Vec<serde_json::Value> {
    metrics
        .iter()
        .map(|m| {
            let value = match &m.value {
                MetricValue::Counter(c) => serde_json::json!({"counter": c}),
                MetricValue::Gauge(g) => serde_json::json!({"gauge": g}),
            };
            serde_json::json!({
                "name": m.name,
                "timestamp_ms": m.timestamp_ms,
                "value": value,
                "attributes": m.attributes,
            })
        })
        .collect()
}

/// Install the process-wide `tracing` subscriber: an `EnvFilter` driven by
/// `RUST_LOG` (default `info`) plus a formatting layer, and, when `otlp_endpoint`
/// is set, an OpenTelemetry export layer.
#[cfg(feature = "std")]
pub fn init_tracing(otlp_endpoint: Option<&str>) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    if let Some(endpoint) = otlp_endpoint {
        let tracer = match build_otlp_tracer(endpoint) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("otlp tracer init failed, continuing without OTLP export: {e}");
                registry.init();
                return;
            }
        };
        registry.with(tracing_opentelemetry::layer().with_tracer(tracer)).init();
    } else {
        registry.init();
    }
}

#[cfg(feature = "std")]
fn build_otlp_tracer(
    endpoint: &str,
) -> Result<opentelemetry_sdk::trace::Tracer, opentelemetry::trace::TraceError> {
    use opentelemetry_otlp::WithExportConfig;

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .http()
                .with_endpoint(endpoint),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
}
