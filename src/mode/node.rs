use crate::{
    config::NodeConfig,
    consensus::Engine,
    genesis,
    grpc::make_server,
    ledger::Ledger,
    network::GrpcAdapter,
    storage::BlockStore,
};
use anyhow::{Context, Result};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tonic::transport::Server;
use tracing::info;

pub async fn run(cfg: NodeConfig) -> Result<()> {
    let store = BlockStore::open(&cfg.db_path)
        .with_context(|| format!("opening block store at `{}`", cfg.db_path))?;

    genesis::bootstrap_if_empty(&store, Path::new(&cfg.genesis_path))
        .context("loading genesis block")?;

    let ledger = Ledger::new(store.clone());
    ledger
        .rebuild_from_log()
        .context("rebuilding balances from the block log")?;

    let net = Arc::new(GrpcAdapter::new(cfg.leader_addr.clone(), cfg.peers.clone()));
    let engine = Engine::new(&cfg, store, ledger, net)?;

    if !cfg.leader {
        // A follower must not serve until it has a consistent view of the
        // chain; exhausting the retry budget here is fatal.
        Arc::clone(&engine)
            .sync_from_leader()
            .await
            .context("initial sync from leader")?;
    }

    let addr: SocketAddr = cfg
        .grpc_listen
        .parse()
        .context("invalid grpc_listen address")?;
    info!(node = %cfg.node_id, leader = cfg.leader, %addr, "node listening");

    Server::builder()
        .add_service(make_server(engine))
        .serve(addr)
        .await
        .context("gRPC server")?;

    Ok(())
}
