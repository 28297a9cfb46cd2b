use anyhow::{Context, Result, bail};
use quorumchain::pb::{BalanceRequest, node_service_client::NodeServiceClient};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(address) = args.next() else {
        bail!("usage: get-balance <address-hex> [node-addr]");
    };
    let addr = args
        .next()
        .unwrap_or_else(|| "http://127.0.0.1:50051".to_string());

    let mut client = NodeServiceClient::connect(addr)
        .await
        .context("connecting to node")?;
    let reply = client
        .get_balance(BalanceRequest { address })
        .await?
        .into_inner();

    println!("{} {}", reply.address, reply.balance);
    Ok(())
}
