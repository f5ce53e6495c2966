//! Prometheus metrics for the cluster monitor
//!
//! Point-in-time gauges mirroring the latest snapshot plus counters for
//! cycles, alerts and deliveries. Exposed via a minimal HTTP endpoint for
//! scraping; no time-series storage happens here.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::OnceLock;

use crate::alert::AlertEvent;
use crate::cluster::ClusterSnapshot;
use crate::notify::DeliveryResult;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    // Snapshot gauges
    pub writer_nodes: IntGauge,
    pub replica_nodes: IntGauge,
    pub unhealthy_nodes: IntGauge,
    pub max_replication_lag_bytes: IntGauge,
    pub failover_ready: IntGauge,

    // Loop counters
    pub cycles_total: IntCounter,
    pub cycle_errors_total: IntCounter,
    pub probes_total: IntCounterVec,
    pub alerts_fired_total: IntCounterVec,
    pub deliveries_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let writer_nodes = IntGauge::new(
            "argus_cluster_writer_nodes",
            "Writer nodes observed in the latest cycle",
        )
        .unwrap();

        let replica_nodes = IntGauge::new(
            "argus_cluster_replica_nodes",
            "Replica nodes observed in the latest cycle",
        )
        .unwrap();

        let unhealthy_nodes = IntGauge::new(
            "argus_cluster_unhealthy_nodes",
            "Unhealthy nodes observed in the latest cycle",
        )
        .unwrap();

        let max_replication_lag_bytes = IntGauge::new(
            "argus_cluster_max_replication_lag_bytes",
            "Maximum replication lag observed in the latest cycle",
        )
        .unwrap();

        let failover_ready = IntGauge::new(
            "argus_cluster_failover_ready",
            "Whether the cluster was failover-ready in the latest cycle (0/1)",
        )
        .unwrap();

        let cycles_total =
            IntCounter::new("argus_cycles_total", "Total polling cycles completed").unwrap();

        let cycle_errors_total = IntCounter::new(
            "argus_cycle_errors_total",
            "Total polling cycles that failed with an unexpected error",
        )
        .unwrap();

        let probes_total = IntCounterVec::new(
            Opts::new("argus_probes_total", "Total node probes by result"),
            &["result"], // ok, degraded, unreachable
        )
        .unwrap();

        let alerts_fired_total = IntCounterVec::new(
            Opts::new("argus_alerts_fired_total", "Total alert events by rule"),
            &["rule", "severity"],
        )
        .unwrap();

        let deliveries_total = IntCounterVec::new(
            Opts::new(
                "argus_deliveries_total",
                "Total notification deliveries by channel and result",
            ),
            &["channel", "result"],
        )
        .unwrap();

        registry.register(Box::new(writer_nodes.clone())).unwrap();
        registry.register(Box::new(replica_nodes.clone())).unwrap();
        registry
            .register(Box::new(unhealthy_nodes.clone()))
            .unwrap();
        registry
            .register(Box::new(max_replication_lag_bytes.clone()))
            .unwrap();
        registry.register(Box::new(failover_ready.clone())).unwrap();
        registry.register(Box::new(cycles_total.clone())).unwrap();
        registry
            .register(Box::new(cycle_errors_total.clone()))
            .unwrap();
        registry.register(Box::new(probes_total.clone())).unwrap();
        registry
            .register(Box::new(alerts_fired_total.clone()))
            .unwrap();
        registry
            .register(Box::new(deliveries_total.clone()))
            .unwrap();

        Self {
            registry,
            writer_nodes,
            replica_nodes,
            unhealthy_nodes,
            max_replication_lag_bytes,
            failover_ready,
            cycles_total,
            cycle_errors_total,
            probes_total,
            alerts_fired_total,
            deliveries_total,
        }
    }

    /// Update the point-in-time gauges from a fresh snapshot
    pub fn record_snapshot(&self, snapshot: &ClusterSnapshot) {
        self.writer_nodes.set(snapshot.writer_count as i64);
        self.replica_nodes.set(snapshot.replica_count as i64);
        self.unhealthy_nodes.set(snapshot.unhealthy_count as i64);
        self.max_replication_lag_bytes
            .set(snapshot.max_lag_bytes.unwrap_or(0) as i64);
        self.failover_ready
            .set(if snapshot.failover_ready { 1 } else { 0 });
        self.cycles_total.inc();

        for node in &snapshot.nodes {
            let result = if !node.reachable {
                "unreachable"
            } else if node.last_error.is_some() {
                "degraded"
            } else {
                "ok"
            };
            self.probes_total.with_label_values(&[result]).inc();
        }
    }

    pub fn record_cycle_error(&self) {
        self.cycle_errors_total.inc();
    }

    pub fn record_alert(&self, event: &AlertEvent) {
        self.alerts_fired_total
            .with_label_values(&[&event.rule, &event.severity.to_string()])
            .inc();
    }

    pub fn record_delivery(&self, result: &DeliveryResult) {
        let outcome = if result.success { "success" } else { "failure" };
        self.deliveries_total
            .with_label_values(&[&result.kind, outcome])
            .inc();
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(addr: &str) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tracing::{error, info};

    async fn handle_request(
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        match req.uri().path() {
            "/metrics" => {
                let body = metrics().gather();
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                    .body(Full::new(Bytes::from(body)))
                    .unwrap())
            }
            "/health" => Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from("OK")))
                .unwrap()),
            _ => Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::from("Not Found")))
                .unwrap()),
        }
    }

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!(error = %e, "Metrics server connection error");
            }
        });
    }
}
