use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contrato_core::constants::DEFAULT_TEMPLATE_DATA_DIR;
use contrato_core::{CoreConfig, TemplateService, max_segments_from_env_value};

mod rest;

/// Main entry point for the contrato REST server
///
/// # Environment Variables
/// - `CONTRATO_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CONTRATO_DATA_DIR`: Directory for templates and backups (default: "template_data")
/// - `CONTRATO_MAX_SEGMENTS`: Segments per paragraph before review reports fragmentation
///   (default: 64)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("contrato_run=info".parse()?)
                .add_directive("contrato_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CONTRATO_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = std::env::var("CONTRATO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_TEMPLATE_DATA_DIR));
    let max_segments = max_segments_from_env_value(std::env::var("CONTRATO_MAX_SEGMENTS").ok())?;

    let cfg = Arc::new(CoreConfig::new(data_dir, max_segments)?);
    let service = TemplateService::new(cfg)?;

    tracing::info!(
        "++ Starting contrato REST on {} (data in {})",
        rest_addr,
        service.config().template_data_dir().display()
    );

    let app = rest::router(service);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
