use crate::{
    block::Block,
    consensus::{Network, Vote},
    error::ChainError,
    pb::{self, node_service_client::NodeServiceClient},
};
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, warn};

const SEND_ATTEMPTS: u32 = 3;
const SEND_RETRY_DELAY: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// gRPC implementation of the engine's [`Network`] seam. Broadcasts fan
/// out on one task per peer with a small retry budget; a peer that answers
/// with a refusal is final and not retried, a peer that cannot be reached
/// is dropped after the budget with a log line. Sync-on-reconnect is the
/// backstop for anything missed.
pub struct GrpcAdapter {
    leader_addr: String,
    peer_addrs: Vec<String>,
}

impl GrpcAdapter {
    pub fn new(leader_addr: String, peer_addrs: Vec<String>) -> Self {
        Self {
            leader_addr,
            peer_addrs,
        }
    }

    async fn connect(addr: &str) -> Result<NodeServiceClient<Channel>, ChainError> {
        let endpoint = Endpoint::from_shared(addr.to_string())
            .map_err(|e| ChainError::Network(format!("{addr}: {e}")))?
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ChainError::Network(format!("{addr}: {e}")))?;
        Ok(NodeServiceClient::new(channel))
    }

    async fn propose_to(addr: &str, block: pb::Block) -> Result<pb::Ack, ChainError> {
        let mut client = Self::connect(addr).await?;
        Ok(client
            .propose_block(block)
            .await
            .map_err(|e| ChainError::Network(format!("{addr}: {e}")))?
            .into_inner())
    }

    async fn vote_to(addr: &str, vote: pb::Vote) -> Result<pb::Ack, ChainError> {
        let mut client = Self::connect(addr).await?;
        Ok(client
            .vote_block(vote)
            .await
            .map_err(|e| ChainError::Network(format!("{addr}: {e}")))?
            .into_inner())
    }

    async fn commit_to(addr: &str, block: pb::Block) -> Result<pb::Ack, ChainError> {
        let mut client = Self::connect(addr).await?;
        Ok(client
            .commit_block(block)
            .await
            .map_err(|e| ChainError::Network(format!("{addr}: {e}")))?
            .into_inner())
    }
}

#[async_trait::async_trait]
impl Network for GrpcAdapter {
    async fn broadcast_proposal(&self, block: Block) {
        debug!(
            peers = self.peer_addrs.len(),
            height = block.height,
            "broadcasting proposal"
        );
        let msg = block.to_proto();
        for addr in self.peer_addrs.clone() {
            let msg = msg.clone();
            tokio::spawn(async move {
                for attempt in 1..=SEND_ATTEMPTS {
                    match GrpcAdapter::propose_to(&addr, msg.clone()).await {
                        Ok(ack) if ack.ok => {
                            debug!(%addr, "proposal delivered");
                            return;
                        }
                        Ok(ack) => {
                            // An explicit rejection, not a lost peer.
                            warn!(%addr, reason = %ack.message, "peer rejected proposal");
                            return;
                        }
                        Err(err) => {
                            warn!(%addr, attempt, %err, "proposal send failed");
                            tokio::time::sleep(SEND_RETRY_DELAY).await;
                        }
                    }
                }
                warn!(%addr, "giving up on proposal broadcast");
            });
        }
    }

    async fn send_vote(&self, vote: Vote) {
        let msg = pb::Vote {
            voter_id: vote.voter_id.clone(),
            block_hash: vote.block_hash.to_vec(),
            height: vote.height,
            approved: vote.approved,
        };
        let addr = self.leader_addr.clone();
        for attempt in 1..=SEND_ATTEMPTS {
            match Self::vote_to(&addr, msg.clone()).await {
                Ok(ack) if ack.ok => {
                    debug!(%addr, hash = %hex::encode(vote.block_hash), "vote delivered");
                    return;
                }
                Ok(ack) => {
                    warn!(%addr, reason = %ack.message, "leader refused vote");
                    return;
                }
                Err(err) => {
                    warn!(%addr, attempt, %err, "vote send failed");
                    tokio::time::sleep(SEND_RETRY_DELAY).await;
                }
            }
        }
        warn!(%addr, "giving up on vote send");
    }

    async fn broadcast_commit(&self, block: Block) {
        debug!(
            peers = self.peer_addrs.len(),
            height = block.height,
            "broadcasting commit"
        );
        let msg = block.to_proto();
        for addr in self.peer_addrs.clone() {
            let msg = msg.clone();
            tokio::spawn(async move {
                for attempt in 1..=SEND_ATTEMPTS {
                    match GrpcAdapter::commit_to(&addr, msg.clone()).await {
                        Ok(ack) if ack.ok => {
                            debug!(%addr, "commit notified");
                            return;
                        }
                        Ok(ack) => {
                            warn!(%addr, reason = %ack.message, "peer refused commit");
                            return;
                        }
                        Err(err) => {
                            warn!(%addr, attempt, %err, "commit notify failed");
                            tokio::time::sleep(SEND_RETRY_DELAY).await;
                        }
                    }
                }
                warn!(%addr, "giving up on commit broadcast");
            });
        }
    }

    async fn fetch_blocks_from(&self, height: u64) -> Result<Vec<Block>, ChainError> {
        let mut client = Self::connect(&self.leader_addr).await?;
        let reply = client
            .get_block_from_height(pb::HeightRequest {
                from_height: height,
            })
            .await
            .map_err(|e| ChainError::Network(format!("{}: {e}", self.leader_addr)))?
            .into_inner();

        let mut blocks = Vec::with_capacity(reply.blocks.len());
        for pb_block in reply.blocks {
            let block = Block::from_proto(pb_block)
                .map_err(|e| ChainError::Network(format!("bad block from leader: {e}")))?;
            blocks.push(block);
        }
        Ok(blocks)
    }
}
