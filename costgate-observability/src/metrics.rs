use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// How a request ended, as recorded in `graphql_requests_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Data returned, no errors
    Success,
    /// Data returned alongside field errors
    Partial,
    /// Stopped by a plugin before execution
    Rejected,
    /// Failed parsing, operation resolution or variable coercion
    Invalid,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Rejected => "rejected",
            Outcome::Invalid => "invalid",
        }
    }
}

/// Metrics collector; every recording method is a no-op when disabled.
///
/// When `enabled = false` no prometheus Registry is created and no counters
/// are allocated.
pub struct MetricsCollector {
    enabled: bool,
    registry: Option<Registry>,
    pub requests_total: Option<IntCounterVec>,
    pub request_duration: Option<HistogramVec>,
    pub operation_complexity: Option<Histogram>,
}

impl MetricsCollector {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool, namespace: &str) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("graphql_requests_total", "Total GraphQL requests").namespace(namespace),
            &["outcome"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("graphql_request_duration_seconds", "Request latency")
                .namespace(namespace)
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
            &["outcome"],
        )?;

        let operation_complexity = Histogram::with_opts(
            HistogramOpts::new("graphql_operation_complexity", "Estimated operation complexity")
                .namespace(namespace)
                .buckets(prometheus::exponential_buckets(1.0, 4.0, 10)?),
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(operation_complexity.clone()))?;

        tracing::debug!(namespace, "Prometheus metrics enabled");

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            requests_total: Some(requests_total),
            request_duration: Some(request_duration),
            operation_complexity: Some(operation_complexity),
        })
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            registry: None,
            requests_total: None,
            request_duration: None,
            operation_complexity: None,
        }
    }

    /// Record a finished request (no-op when disabled).
    #[inline]
    pub fn record_request(&self, outcome: Outcome, duration_secs: f64) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.requests_total {
            counter.with_label_values(&[outcome.as_str()]).inc();
        }
        if let Some(ref hist) = self.request_duration {
            hist.with_label_values(&[outcome.as_str()]).observe(duration_secs);
        }
    }

    /// Record an operation's complexity score (no-op when disabled).
    #[inline]
    pub fn observe_complexity(&self, score: f64) {
        if let Some(ref hist) = self.operation_complexity {
            hist.observe(score);
        }
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        if let Some(ref registry) = self.registry {
            let encoder = TextEncoder::new();
            let metric_families = registry.gather();
            let mut buffer = Vec::new();
            encoder.encode(&metric_families, &mut buffer).unwrap_or(());
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::disabled()
    }
}
