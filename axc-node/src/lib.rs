use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod cadence;
pub mod callbacks;
pub mod dispatch;
pub mod identity;
pub mod node;
pub mod pioneer;
pub mod status;
pub mod tasks;
pub mod wire;

pub use node::Node;

/// Loads `config_path`, constructs the node and runs it until the process
/// receives a shutdown signal.
pub async fn run_node(config_path: PathBuf) -> Result<()> {
    init_logging();
    let cfg = axc_config::NodeConfig::load(&config_path)?;
    info!(node_id = %cfg.node_id, config = ?config_path, "starting axc node");

    let node = Node::new(cfg).await?;
    node.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    Ok(())
}

fn init_logging() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
