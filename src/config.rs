use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,                    // ex "node1"
    pub grpc_listen: String,                // ex 0.0.0.0:50051
    pub leader: bool,                       // statically configured role
    pub leader_addr: String,                // ex http://node1:50051
    pub peers: Vec<String>,                 // every other node, ex ["http://node2:50051"]
    pub db_path: String,                    // ex data/node1
    pub genesis_path: String,               // ex config/genesis.dat
    pub batch_size: usize,                  // ex 10
    pub batch_timeout_ms: u64,              // ex 5000
}

impl NodeConfig {
    pub fn load(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config file `{}`", path))?;
        let cfg: NodeConfig = toml::from_str(&s)
            .with_context(|| format!("parsing `{}` as TOML", path))?;

        Ok(cfg)
    }

    pub fn total_nodes(&self) -> usize {
        self.peers.len() + 1
    }
}
