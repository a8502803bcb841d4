//! monitord — the endpoint monitor daemon.
//!
//! Single binary that assembles the monitor:
//! - Probe loop (interval ticks → bounded GET → metrics)
//! - Metrics sink (Prometheus registry)
//! - Grafana annotations
//! - HTTP API (`/metrics`, `/exec`)
//!
//! # Usage
//!
//! ```text
//! monitord --url https://example.com/ --interval 30s --timeout 5s --port 8080
//! monitord --config /etc/monitor/monitor.toml --token "$GRAFANA_TOKEN"
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use monitor_annotations::{AnnotationSink, GrafanaAnnotations};
use monitor_api::{ApiState, build_router};
use monitor_core::MonitorConfig;
use monitor_metrics::ProbeMetrics;
use monitor_probe::{IntervalTicks, ProbeService, run_probe_loop, system_time_provider};

#[derive(Parser)]
#[command(name = "monitord", about = "Endpoint monitor daemon")]
struct Cli {
    /// Path to a monitor.toml file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// URL to be monitored.
    #[arg(long)]
    url: Option<String>,

    /// Grafana API token. Enables failure annotations.
    #[arg(long)]
    token: Option<String>,

    /// Grafana host.
    #[arg(long)]
    host: Option<String>,

    /// Port for the metrics API.
    #[arg(long)]
    port: Option<u16>,

    /// Probe interval, e.g. "1m".
    #[arg(long)]
    interval: Option<String>,

    /// Per-probe timeout, e.g. "30s".
    #[arg(long)]
    timeout: Option<String>,

    /// Accept invalid TLS certificates on the probed URL.
    #[arg(long)]
    insecure: bool,

    /// Program `/exec` may run. Repeat to allow several.
    #[arg(long = "allow-exec")]
    allow_exec: Vec<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::from_file(path)?,
            None => MonitorConfig::default(),
        };

        if let Some(url) = self.url {
            config.probe.url = url;
        }
        if let Some(interval) = self.interval {
            config.probe.interval = interval;
        }
        if let Some(timeout) = self.timeout {
            config.probe.timeout = timeout;
        }
        if self.insecure {
            config.probe.insecure_skip_verify = true;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        config.server.exec_allowed_commands.extend(self.allow_exec);
        if let Some(host) = self.host {
            config.grafana.host = host;
        }
        if let Some(token) = self.token {
            config.grafana.api_token = token;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,monitord=debug,monitor=debug")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    run(config).await
}

async fn run(config: MonitorConfig) -> anyhow::Result<()> {
    info!("endpoint monitor starting");

    let interval = config.probe.interval()?;
    let timeout = config.probe.timeout()?;

    // ── Initialize subsystems ──────────────────────────────────

    let metrics = Arc::new(ProbeMetrics::new().context("failed to build metrics registry")?);

    let annotations: Arc<dyn AnnotationSink> = Arc::new(GrafanaAnnotations::new(
        config.grafana.clone(),
        reqwest::Client::new(),
    ));

    let probe_client = reqwest::Client::builder()
        .danger_accept_invalid_certs(config.probe.insecure_skip_verify)
        .build()
        .context("failed to build probe HTTP client")?;

    let mut service = ProbeService::new(metrics.clone(), probe_client, timeout, system_time_provider());
    if config.grafana.is_enabled() {
        service = service.with_annotations(annotations.clone());
        info!(host = %config.grafana.host, "grafana annotations enabled");
    }
    let service = Arc::new(service);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start probe loop ───────────────────────────────────────

    let url = config.probe.url.clone();
    info!(%url, interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX), "probe loop scheduled");
    let probe_handle = tokio::spawn(async move {
        run_probe_loop(IntervalTicks::new(interval), service, url, shutdown_rx).await
    });

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState::new(
        metrics,
        annotations,
        config.server.exec_allowed_commands.clone(),
    ));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "API server starting");

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await.context("API server failed")?;

    // Let an in-flight probe finish on its own deadline.
    let probes = probe_handle.await.context("probe loop panicked")?;

    info!(probes, "endpoint monitor stopped");
    Ok(())
}
