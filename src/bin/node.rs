use anyhow::Result;
use quorumchain::{config::NodeConfig, mode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/node.toml".to_string());
    let cfg = NodeConfig::load(&path)?;

    mode::node::run(cfg).await
}
