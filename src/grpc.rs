use tonic::{Request, Response, Status};
use crate::{
    block::{Block, Transaction},
    consensus::{Engine, Vote},
    pb::{
        self, Ack, BalanceRequest, BalanceResponse, BlockList, HeightRequest,
        node_service_server::{NodeService, NodeServiceServer},
    },
};
use anyhow::anyhow;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct NodeSvc {
    pub engine: Arc<Engine>,
}

fn ack(ok: bool, message: impl Into<String>) -> Response<Ack> {
    Response::new(Ack {
        ok,
        message: message.into(),
    })
}

fn vote_from_proto(vote: pb::Vote) -> anyhow::Result<Vote> {
    let block_hash: [u8; 32] = vote
        .block_hash
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("vote block hash must be 32 bytes"))?;
    Ok(Vote {
        voter_id: vote.voter_id,
        block_hash,
        height: vote.height,
        approved: vote.approved,
    })
}

#[tonic::async_trait]
impl NodeService for NodeSvc {
    async fn send_transaction(
        &self,
        req: Request<pb::Transaction>,
    ) -> Result<Response<Ack>, Status> {
        let tx = Transaction::from_proto(req.into_inner());
        match self.engine.clone().submit_transaction(tx).await {
            Ok(()) => Ok(ack(true, "transaction accepted")),
            Err(err) => Ok(ack(false, err.to_string())),
        }
    }

    async fn propose_block(&self, req: Request<pb::Block>) -> Result<Response<Ack>, Status> {
        if self.engine.is_leader() {
            return Ok(ack(false, "the leader does not take proposals"));
        }

        let block = match Block::from_proto(req.into_inner()) {
            Ok(block) => block,
            Err(err) => return Ok(ack(false, format!("malformed block: {err}"))),
        };

        match self.engine.clone().handle_proposed_block(block).await {
            Ok(()) => Ok(ack(true, "block verified, vote on its way")),
            Err(err) => {
                warn!(%err, "proposal rejected");
                Ok(ack(false, err.to_string()))
            }
        }
    }

    async fn vote_block(&self, req: Request<pb::Vote>) -> Result<Response<Ack>, Status> {
        if !self.engine.is_leader() {
            return Ok(ack(false, "votes go to the leader"));
        }

        let vote = match vote_from_proto(req.into_inner()) {
            Ok(vote) => vote,
            Err(err) => return Ok(ack(false, format!("malformed vote: {err}"))),
        };

        match self.engine.clone().handle_vote(vote).await {
            Ok(()) => Ok(ack(true, "vote counted")),
            Err(err) => Ok(ack(false, err.to_string())),
        }
    }

    async fn commit_block(&self, req: Request<pb::Block>) -> Result<Response<Ack>, Status> {
        if self.engine.is_leader() {
            // The leader committed on its own quorum already.
            return Ok(ack(true, "leader commits on quorum"));
        }

        let block = match Block::from_proto(req.into_inner()) {
            Ok(block) => block,
            Err(err) => return Ok(ack(false, format!("malformed block: {err}"))),
        };

        match self.engine.commit_block(&block) {
            Ok(()) => Ok(ack(true, "block committed")),
            Err(err) => {
                warn!(%err, "commit refused");
                Ok(ack(false, err.to_string()))
            }
        }
    }

    async fn get_block_from_height(
        &self,
        req: Request<HeightRequest>,
    ) -> Result<Response<BlockList>, Status> {
        let from = req.into_inner().from_height;
        let blocks = self
            .engine
            .store()
            .blocks_from(from)
            .map_err(|e| Status::internal(e.to_string()))?;

        Ok(Response::new(BlockList {
            blocks: blocks.iter().map(Block::to_proto).collect(),
        }))
    }

    async fn get_balance(
        &self,
        req: Request<BalanceRequest>,
    ) -> Result<Response<BalanceResponse>, Status> {
        let address = req.into_inner().address;
        let balance = self
            .engine
            .ledger()
            .get_balance(&address)
            .map_err(|e| Status::internal(e.to_string()))?;

        Ok(Response::new(BalanceResponse { address, balance }))
    }
}

pub fn make_server(engine: Arc<Engine>) -> NodeServiceServer<NodeSvc> {
    NodeServiceServer::new(NodeSvc { engine })
}
