//! dynabridge server: a DynamoDB-compatible data API over a relational
//! backend.
//!
//! # Usage
//!
//! ```text
//! DYNABRIDGE_CONFIG=config.yaml dynabridge-server
//! ```
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DYNABRIDGE_CONFIG` | *(unset)* | Path to the YAML config file |
//! | `LISTEN_ADDR` | `0.0.0.0:9050` | Bind address |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained filter (overrides `LOG_LEVEL`) |

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dynabridge_core::backend::memory::MemoryBackend;
use dynabridge_core::backend::Backend;
use dynabridge_core::config::AdapterConfig;
use dynabridge_core::engine::Engine;
use dynabridge_core::handler::EngineHandler;
use dynabridge_core::schema::{
    self, SharedSchema, CONFIG_MANAGER_TABLE, TABLE_DDL_REGISTRY,
};
use dynabridge_http::AdapterHttpService;

/// Initialize the tracing subscriber: `RUST_LOG` when set, else the
/// configured log level.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Construct the backend. The in-memory store keeps local runs and CI
/// self-contained; a real deployment substitutes a driver for the managed
/// SQL backend behind the same trait.
fn build_backend() -> Arc<dyn Backend> {
    let backend = MemoryBackend::new();
    backend.register_table(TABLE_DDL_REGISTRY, "tableName", Some("column".to_owned()));
    backend.register_table(CONFIG_MANAGER_TABLE, "tableName", None);
    Arc::new(backend)
}

/// Accept loop with graceful drain on ctrl-c.
async fn serve<H>(listener: TcpListener, service: AdapterHttpService<H>) -> Result<()>
where
    H: dynabridge_http::AdapterHandler,
{
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AdapterConfig::load().context("failed to load configuration")?;
    init_tracing(&config.server.log_level)?;

    let backend = build_backend();

    let registry = schema::bootstrap(backend.as_ref())
        .await
        .context("schema bootstrap failed")?;
    let table_count = registry.table_names().len();
    let schema = SharedSchema::new(registry);
    info!(tables = table_count, "schema registry loaded");

    let engine = Engine::new(backend, schema, config.clone());
    let handler = EngineHandler::new(Arc::new(engine));
    let service = AdapterHttpService::new(Arc::new(handler));

    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.listen_addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, version = env!("CARGO_PKG_VERSION"), "starting dynabridge server");
    serve(listener, service).await
}
