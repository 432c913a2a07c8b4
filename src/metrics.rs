//! Prometheus metrics for the simulator and validation harness.

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_int_counter, CounterVec, Encoder, IntCounter, TextEncoder};
use std::net::SocketAddr;

lazy_static! {
    pub static ref TICKS_TOTAL: IntCounter =
        register_int_counter!("cip_sim_ticks_total", "Total number of engine ticks processed").unwrap();

    pub static ref READS_TOTAL: IntCounter =
        register_int_counter!("cip_sim_reads_total", "Total number of tag/assembly reads served").unwrap();

    pub static ref WRITES_TOTAL: IntCounter =
        register_int_counter!("cip_sim_writes_total", "Total number of tag/assembly writes served").unwrap();

    pub static ref VALIDATOR_FINDINGS_TOTAL: CounterVec = register_counter_vec!(
        "cip_sim_validator_findings_total",
        "Validator findings by severity",
        &["severity"]
    )
    .unwrap();

    pub static ref EVALUATOR_GRADES_TOTAL: CounterVec = register_counter_vec!(
        "cip_sim_evaluator_grades_total",
        "Packet evaluator grades",
        &["grade"]
    )
    .unwrap();
}

/// Serves Prometheus text-format metrics plus a liveness probe, bound to a
/// caller-supplied address rather than a bare port so it can share a
/// loopback or container-internal interface with the rest of the process.
pub struct MetricsServer {
    bind_addr: SocketAddr,
}

impl MetricsServer {
    pub fn bind(bind_addr: &str) -> anyhow::Result<Self> {
        Ok(Self { bind_addr: bind_addr.parse()? })
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let app = Router::new().route("/metrics", get(render_metrics)).route("/healthz", get(healthz));
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn render_metrics() -> String {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer).expect("prometheus metric families always encode");
    String::from_utf8(buffer).expect("prometheus text encoding is always valid utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn render_metrics_includes_registered_series() {
        TICKS_TOTAL.inc();
        let body = render_metrics().await;
        assert!(body.contains("cip_sim_ticks_total"));
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        assert_eq!(healthz().await, "ok");
    }

    #[test]
    fn bind_rejects_an_unparseable_address() {
        assert!(MetricsServer::bind("not-an-address").is_err());
    }
}
