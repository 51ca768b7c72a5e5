//! Control Plane Operator
//!
//! Places control plane nodes on hypervisors and periodically reconciles
//! every known node against its hypervisor's port reservations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Operator Binary                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────┐   ┌──────────────────┐   ┌────────────────┐  │
//! │  │ Manifest File  │──▶│    Registries    │──▶│ Specs (stdout/ │  │
//! │  │  (YAML CRDs)   │   │ hv / cluster /   │   │  manifest file)│  │
//! │  └────────────────┘   │      node        │   └────────────────┘  │
//! │                       └────────┬─────────┘                        │
//! │                    ┌───────────┴───────────┐                      │
//! │                    │ Reconcile Loop        │                      │
//! │                    │ (interval + timeout)  │                      │
//! │                    └───────────────────────┘                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │        Health Server (/healthz)  │  Metrics Server (/metrics)     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use controlplane_operator::{
    specs, ClusterReconciler, Error, Metrics, OperatorConfig, PortReservationReconciler,
    Registries, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Control Plane Operator - hypervisor placement and port reconciliation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Manifest file with hypervisors, clusters and nodes
    #[arg(long, env = "MANIFESTS")]
    manifests: Option<PathBuf>,

    /// Reconcile interval in seconds
    #[arg(long, env = "RECONCILE_INTERVAL", default_value = "30")]
    reconcile_interval_secs: u64,

    /// Maximum duration of one reconciliation pass in seconds
    #[arg(long, env = "PASS_TIMEOUT", default_value = "20")]
    pass_timeout_secs: u64,

    /// Write the aggregated specs back to the manifest file after every pass
    #[arg(long, env = "PERSIST")]
    persist: bool,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Run a single pass, print the aggregated specs and exit
    #[arg(long)]
    once: bool,

    /// Print the custom resource definitions and exit
    #[arg(long)]
    print_crds: bool,
}

impl Args {
    fn config(&self) -> Result<OperatorConfig> {
        let config = OperatorConfig {
            manifests: self.manifests.clone(),
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            pass_timeout: Duration::from_secs(self.pass_timeout_secs),
            persist: self.persist,
            health_addr: parse_addr("health", &self.health_addr)?,
            metrics_addr: parse_addr("metrics", &self.metrics_addr)?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_addr(server: &str, addr: &str) -> Result<SocketAddr> {
    addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid {} server address {}: {}", server, addr, e))
    })
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crds {
        return print_crds();
    }

    // Initialize logging
    init_logging(&args);

    let config = args.config()?;

    info!("Starting Control Plane Operator");
    info!("  Version: {}", controlplane_operator::VERSION);
    info!("  Manifests: {:?}", config.manifests);
    info!("  Reconcile interval: {:?}", config.reconcile_interval);
    info!("  Pass timeout: {:?}", config.pass_timeout);

    let registries = match &config.manifests {
        Some(path) => Registries::from_file(path).await?,
        None => {
            warn!("No manifest file given, starting with empty registries");
            Registries::new()
        }
    };

    let metrics = Metrics::new()?;
    let node_reconciler = PortReservationReconciler::new();
    let reconciler = ClusterReconciler::new(
        &registries.hypervisors,
        &registries.clusters,
        &registries.nodes,
        &node_reconciler,
    )
    .with_metrics(&metrics);

    if args.once {
        run_pass(&reconciler, &metrics, &config).await?;
        print!("{}", reconciler.specs()?);
        return Ok(());
    }

    // Start health server
    let health_addr = config.health_addr;
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = config.metrics_addr;
    let server_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, server_metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    let mut interval = tokio::time::interval(config.reconcile_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_pass(&reconciler, &metrics, &config).await {
                    error!("Reconciliation pass failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!("Operator shutdown complete");
    Ok(())
}

/// One reconciliation pass bounded by the pass timeout, followed by the
/// optional write-back of the aggregated specs
async fn run_pass(
    reconciler: &ClusterReconciler<'_>,
    metrics: &Metrics,
    config: &OperatorConfig,
) -> Result<()> {
    match tokio::time::timeout(config.pass_timeout, reconciler.reconcile()).await {
        Ok(summary) => info!(
            "Reconciled {} nodes in {:?}",
            summary.visited, summary.duration
        ),
        Err(_) => {
            metrics.reconcile_timeouts.inc();
            warn!(
                "Reconciliation pass exceeded {:?}, continuing with next pass",
                config.pass_timeout
            );
        }
    }

    if let (true, Some(path)) = (config.persist, &config.manifests) {
        let document = reconciler.specs()?;
        tokio::fs::write(path, document).await?;
        info!("Wrote specs to {}", path.display());
    }
    Ok(())
}

fn print_crds() -> Result<()> {
    print!("{}", specs::crd_specs()?);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(status: hyper::StatusCode, body: &'static str) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(hyper::Body::from(body));
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: SocketAddr) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => text_response(StatusCode::OK, "ok"),
                _ => text_response(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: SocketAddr, metrics: Metrics) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.render() {
                            Ok((content_type, buffer)) => {
                                let mut response = Response::new(Body::from(buffer));
                                if let Ok(value) = HeaderValue::from_str(&content_type) {
                                    response.headers_mut().insert(CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                error!("Failed to render metrics: {}", e);
                                text_response(StatusCode::INTERNAL_SERVER_ERROR, "error")
                            }
                        },
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
