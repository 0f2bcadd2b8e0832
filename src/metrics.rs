//! Prometheus metrics collection for slircd-tree.
//!
//! Exposed on the `/metrics` HTTP endpoint.
//!
//! - `slircd_servers_known` - Servers in the tree, including this one
//! - `slircd_links_direct` - Established direct links
//! - `slircd_netsplits_total` - Servers lost to splits
//! - `slircd_ping_timeouts_total` - Direct links dropped for not answering PING
//! - `slircd_burst_duration_seconds` - Burst duration of direct links
//! - `slircd_s2s_lines_total{direction}` - S2S lines sent and received
//! - `slircd_link_errors_total{error}` - Links that ended in an error

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Gauges
// ========================================================================

pub static SERVERS_KNOWN: OnceLock<IntGauge> = OnceLock::new();

pub static LINKS_DIRECT: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Counters
// ========================================================================

pub static NETSPLITS: OnceLock<IntCounter> = OnceLock::new();

pub static PING_TIMEOUTS: OnceLock<IntCounter> = OnceLock::new();

pub static S2S_LINES: OnceLock<IntCounterVec> = OnceLock::new();

pub static LINK_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

pub static BURST_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
/// Recording before `init` is a silent no-op.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::error!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(SERVERS_KNOWN, IntGauge::new("slircd_servers_known", "Servers in the spanning tree"));
    register!(LINKS_DIRECT, IntGauge::new("slircd_links_direct", "Established direct server links"));
    register!(NETSPLITS, IntCounter::new("slircd_netsplits_total", "Servers lost to netsplits"));
    register!(PING_TIMEOUTS, IntCounter::new("slircd_ping_timeouts_total", "Direct links dropped for ping timeout"));
    register!(S2S_LINES, IntCounterVec::new(Opts::new("slircd_s2s_lines_total", "S2S lines by direction"), &["direction"]));
    register!(LINK_ERRORS, IntCounterVec::new(Opts::new("slircd_link_errors_total", "Links closed by error kind"), &["error"]));
    register!(BURST_DURATION, Histogram::with_opts(
        HistogramOpts::new("slircd_burst_duration_seconds", "Burst duration of direct links")
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

#[inline]
pub fn set_topology(servers: usize, direct_links: usize) {
    if let Some(g) = SERVERS_KNOWN.get() {
        g.set(servers as i64);
    }
    if let Some(g) = LINKS_DIRECT.get() {
        g.set(direct_links as i64);
    }
}

#[inline]
pub fn record_netsplit(servers_lost: usize) {
    if let Some(c) = NETSPLITS.get() {
        c.inc_by(servers_lost as u64);
    }
}

#[inline]
pub fn record_ping_timeout() {
    if let Some(c) = PING_TIMEOUTS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_burst(duration_ms: i64) {
    if let Some(h) = BURST_DURATION.get() {
        h.observe(duration_ms.max(0) as f64 / 1000.0);
    }
}

/// Count one S2S line. `direction` is `"in"` or `"out"`.
#[inline]
pub fn record_line(direction: &str) {
    if let Some(c) = S2S_LINES.get() {
        c.with_label_values(&[direction]).inc();
    }
}

#[inline]
pub fn record_link_error(error: &str) {
    if let Some(c) = LINK_ERRORS.get() {
        c.with_label_values(&[error]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();

        set_topology(3, 2);
        record_netsplit(2);
        record_burst(1500);
        record_line("in");
        record_link_error("loop");

        // Other tests share the global registry, so only check presence.
        let output = gather_metrics();
        assert!(output.contains("slircd_servers_known"));
        assert!(output.contains("slircd_links_direct"));
        assert!(output.contains("slircd_s2s_lines_total"));
        assert!(output.contains("slircd_burst_duration_seconds"));
    }
}
