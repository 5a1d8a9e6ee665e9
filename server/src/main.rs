// server/src/main.rs
use anyhow::{Context, Result};
use digit_softmax::{logging, service, ServiceConfig};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(Level::INFO);
    let config = ServiceConfig::from_env();
    info!("=== Softmax Digit Prediction Service ===");
    info!(model_path = %config.model_path.display(), addr = %config.bind_addr, "starting");
    service::serve(config)
        .await
        .context("prediction service stopped with an error")
}
