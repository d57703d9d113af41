// Powerlog Exporter - Prometheus exporter for Modbus energy meters
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Powerlog Exporter
//!
//! Polls an energy meter over Modbus and serves its readings to Prometheus.
//!
//! ## Usage
//!
//! ```bash
//! # Meter on the first serial port, metrics on :8080
//! powerlog-exporter --dev /dev/ttyS0
//!
//! # Meter behind a Modbus TCP gateway
//! powerlog-exporter --tcp 192.168.1.20:502 --device-name garage
//! ```

mod metrics;
mod transport;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use metrics::encode_metrics;
use powerlog::{MetricSet, PollCycle, PollerConfig, Scheduler, DEFAULT_ENERGY_RATE_LIMIT};
use prometheus::Registry;
use serde::Serialize;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;
use transport::{ModbusSource, SerialSettings};

/// Powerlog Prometheus Exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// TTY device to use
    #[arg(long, default_value = "/dev/ttyS0")]
    dev: String,

    /// Modbus TCP address to use instead of the serial device
    #[arg(long)]
    tcp: Option<SocketAddr>,

    /// Serial baud rate
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Modbus slave address of the meter
    #[arg(long, default_value_t = 1)]
    slave_id: u8,

    /// Timeout of a single Modbus request, in seconds
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,

    /// Value of the device_name label
    #[arg(long, default_value = "mains")]
    device_name: String,

    /// Poll period in seconds
    #[arg(long, default_value_t = 10)]
    poll_interval_secs: u64,

    /// Maximum credible energy increase per second (kWh/s)
    #[arg(long, default_value_t = DEFAULT_ENERGY_RATE_LIMIT)]
    energy_rate_limit: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            device_name: self.device_name.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            energy_rate_limit: self.energy_rate_limit,
            ..Default::default()
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Exporter startup errors
#[derive(Debug, thiserror::Error)]
enum ExporterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error(transparent)]
    Powerlog(#[from] powerlog::Error),
}

/// Application state shared across handlers.
struct AppState {
    registry: Registry,
    device_name: String,
    start_time: Instant,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Powerlog Exporter v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), ExporterError> {
    let config = args.poller_config();

    let source = match args.tcp {
        Some(addr) => ModbusSource::tcp(addr, args.slave_id, args.timeout()).await?,
        None => {
            let settings = SerialSettings {
                path: args.dev.clone(),
                baud_rate: args.baud,
                slave_id: args.slave_id,
            };
            ModbusSource::rtu(&settings, args.timeout())?
        }
    };

    let registry = Registry::new();
    let metrics = MetricSet::new(&registry, &config)?;

    let listener = TcpListener::bind(args.addr).await?;

    let running = Scheduler::new(PollCycle::new(source, metrics), config.poll_interval)
        .start()
        .await;

    let state = Arc::new(AppState {
        registry,
        device_name: config.device_name,
        start_time: Instant::now(),
    });

    info!("Starting server on http://{}", args.addr);
    info!("Metrics endpoint: http://{}/metrics", args.addr);

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Drain the poller even if the server failed
    running.stop().await?;
    served?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
}

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Powerlog Exporter</title>
</head>
<body>
    <h1>Powerlog Exporter</h1>
    <p>Prometheus exporter for Modbus energy meters.</p>
    <ul>
        <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
        <li><a href="/health">/health</a> - Health check</li>
        <li><a href="/status">/status</a> - Status information (JSON)</li>
    </ul>
</body>
</html>"#,
    )
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match encode_metrics(&state.registry) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Could not encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    device_name: String,
    uptime_secs: u64,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        device_name: state.device_name.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
