//! Request counters exposed on `/debug/vars`.
//!
//! Counters live in a per-application Prometheus [`Registry`]; the JSON
//! snapshot is rendered from the gathered families.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

const REQUESTS_RECEIVED: &str = "marquee_requests_received_total";
const RESPONSES_SENT: &str = "marquee_responses_sent_total";
const PROCESSING_TIME: &str = "marquee_processing_time_microseconds_total";
const RESPONSES_BY_STATUS: &str = "marquee_responses_by_status_total";
const STATUS_LABEL: &str = "status";

/// Prometheus-backed request counters.
pub struct Metrics {
    registry: Registry,
    requests_received: IntCounter,
    responses_sent: IntCounter,
    processing_time_us: IntCounter,
    responses_by_status: IntCounterVec,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_received: u64,
    pub responses_sent: u64,
    pub processing_time_us: u64,
    pub responses_by_status: BTreeMap<String, u64>,
}

impl Metrics {
    /// Create the counters and register them with a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_received =
            IntCounter::with_opts(Opts::new(REQUESTS_RECEIVED, "Requests received"))?;
        let responses_sent = IntCounter::with_opts(Opts::new(RESPONSES_SENT, "Responses sent"))?;
        let processing_time_us = IntCounter::with_opts(Opts::new(
            PROCESSING_TIME,
            "Time spent handling requests, in microseconds",
        ))?;
        let responses_by_status = IntCounterVec::new(
            Opts::new(RESPONSES_BY_STATUS, "Responses sent by HTTP status"),
            &[STATUS_LABEL],
        )?;

        registry.register(Box::new(requests_received.clone()))?;
        registry.register(Box::new(responses_sent.clone()))?;
        registry.register(Box::new(processing_time_us.clone()))?;
        registry.register(Box::new(responses_by_status.clone()))?;

        Ok(Self {
            registry,
            requests_received,
            responses_sent,
            processing_time_us,
            responses_by_status,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn request_started(&self) {
        self.requests_received.inc();
    }

    fn response_sent(&self, status: u16, elapsed_us: u64) {
        self.responses_sent.inc();
        self.processing_time_us.inc_by(elapsed_us);
        self.responses_by_status
            .with_label_values(&[status.to_string().as_str()])
            .inc();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut responses_by_status = BTreeMap::new();
        for family in self.registry.gather() {
            if family.name() != RESPONSES_BY_STATUS {
                continue;
            }
            for metric in &family.metric {
                let status = metric
                    .label
                    .iter()
                    .find(|pair| pair.name() == STATUS_LABEL)
                    .map(|pair| pair.value().to_string());
                if let Some(status) = status {
                    responses_by_status.insert(status, metric.counter.value() as u64);
                }
            }
        }

        MetricsSnapshot {
            requests_received: self.requests_received.get(),
            responses_sent: self.responses_sent.get(),
            processing_time_us: self.processing_time_us.get(),
            responses_by_status,
        }
    }
}

/// Axum middleware: counts the request and its response.
pub async fn track(State(metrics): State<Arc<Metrics>>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    metrics.request_started();
    let response = next.run(request).await;
    let elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
    metrics.response_sent(response.status().as_u16(), elapsed_us);
    response
}
