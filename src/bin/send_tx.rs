use anyhow::{Context, Result, bail};
use quorumchain::{block::Transaction, crypto, pb::node_service_client::NodeServiceClient};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(wallet), Some(receiver), Some(amount)) = (args.next(), args.next(), args.next())
    else {
        bail!("usage: send-tx <wallet-dir> <receiver-hex> <amount> [node-addr]");
    };
    let addr = args
        .next()
        .unwrap_or_else(|| "http://127.0.0.1:50051".to_string());

    let signing_key = crypto::load_signing_key(Path::new(&wallet))?;
    let receiver = hex::decode(&receiver).context("receiver address must be hex")?;
    let amount: f64 = amount.parse().context("amount must be a number")?;

    let sender = crypto::address_of(&signing_key.verifying_key());
    let mut tx = Transaction::new(sender, receiver, amount);
    crypto::sign_transaction(&mut tx, &signing_key);

    let mut client = NodeServiceClient::connect(addr)
        .await
        .context("connecting to node")?;
    let reply = client.send_transaction(tx.to_proto()).await?.into_inner();

    if !reply.ok {
        bail!("node refused the transaction: {}", reply.message);
    }
    println!("transaction accepted: {}", reply.message);
    Ok(())
}
