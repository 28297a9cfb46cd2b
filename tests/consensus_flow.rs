//! End-to-end protocol scenarios over an in-process cluster. Adapters
//! route RPCs between engines directly and can drop a chosen follower's
//! votes to simulate a network failure.

use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use quorumchain::{
    block::{Block, Transaction},
    config::NodeConfig,
    consensus::{Engine, Network, Vote},
    crypto,
    error::ChainError,
    ledger::Ledger,
    storage::BlockStore,
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

#[derive(Default)]
struct Cluster {
    engines: Mutex<HashMap<String, Arc<Engine>>>,
    leader_id: Mutex<String>,
    lost_votes: Mutex<HashSet<String>>,
}

impl Cluster {
    fn register(&self, engine: &Arc<Engine>) {
        if engine.is_leader() {
            *self.leader_id.lock() = engine.node_id().to_string();
        }
        self.engines
            .lock()
            .insert(engine.node_id().to_string(), Arc::clone(engine));
    }

    fn leader(&self) -> Arc<Engine> {
        let id = self.leader_id.lock().clone();
        self.engines.lock().get(&id).cloned().expect("leader registered")
    }

    fn peers_of(&self, node_id: &str) -> Vec<Arc<Engine>> {
        self.engines
            .lock()
            .values()
            .filter(|e| e.node_id() != node_id)
            .cloned()
            .collect()
    }

    fn drop_votes_from(&self, node_id: &str) {
        self.lost_votes.lock().insert(node_id.to_string());
    }
}

struct TestAdapter {
    cluster: Arc<Cluster>,
    node_id: String,
}

#[async_trait::async_trait]
impl Network for TestAdapter {
    async fn broadcast_proposal(&self, block: Block) {
        for peer in self.cluster.peers_of(&self.node_id) {
            let _ = peer.handle_proposed_block(block.clone()).await;
        }
    }

    async fn send_vote(&self, vote: Vote) {
        if self.cluster.lost_votes.lock().contains(&self.node_id) {
            return;
        }
        let _ = self.cluster.leader().handle_vote(vote).await;
    }

    async fn broadcast_commit(&self, block: Block) {
        for peer in self.cluster.peers_of(&self.node_id) {
            let _ = peer.commit_block(&block);
        }
    }

    async fn fetch_blocks_from(&self, height: u64) -> Result<Vec<Block>, ChainError> {
        self.cluster.leader().store().blocks_from(height)
    }
}

struct TestNode {
    _dir: tempfile::TempDir,
    engine: Arc<Engine>,
}

fn make_node(
    cluster: &Arc<Cluster>,
    id: &str,
    leader: bool,
    peer_count: usize,
    genesis: Option<&Block>,
) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let cfg = NodeConfig {
        node_id: id.to_string(),
        grpc_listen: "127.0.0.1:0".to_string(),
        leader,
        leader_addr: "http://127.0.0.1:1".to_string(),
        peers: (0..peer_count)
            .map(|i| format!("http://127.0.0.1:{}", 50052 + i))
            .collect(),
        db_path: dir.path().join("db").to_string_lossy().into_owned(),
        genesis_path: dir.path().join("genesis.dat").to_string_lossy().into_owned(),
        batch_size: 1,
        batch_timeout_ms: 50,
    };

    let store = BlockStore::open(&cfg.db_path).unwrap();
    if let Some(genesis) = genesis {
        store.save_block(genesis).unwrap();
    }
    let ledger = Ledger::new(store.clone());
    ledger.rebuild_from_log().unwrap();

    let net = Arc::new(TestAdapter {
        cluster: Arc::clone(cluster),
        node_id: id.to_string(),
    });
    let engine = Engine::new(&cfg, store, ledger, net).unwrap();
    cluster.register(&engine);

    TestNode { _dir: dir, engine }
}

fn genesis_with(allocs: &[(&[u8], f64)]) -> Block {
    let txs = allocs
        .iter()
        .map(|(addr, amount)| Transaction::mint(addr.to_vec(), *amount))
        .collect();
    Block::build(txs, Vec::new(), 0)
}

fn signed_transfer(key: &SigningKey, receiver: &[u8], amount: f64) -> Transaction {
    let sender = crypto::address_of(&key.verifying_key());
    let mut tx = Transaction::new(sender, receiver.to_vec(), amount);
    crypto::sign_transaction(&mut tx, key);
    tx
}

async fn wait_for_height(engine: &Arc<Engine>, height: u64) {
    for _ in 0..150 {
        if let Some(tip) = engine.latest_block() {
            if tip.height >= height {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for height {height}");
}

fn balance(engine: &Arc<Engine>, address: &[u8]) -> f64 {
    engine.ledger().get_balance(&hex::encode(address)).unwrap()
}

#[tokio::test]
async fn single_node_commits_its_own_batch() {
    let cluster = Arc::new(Cluster::default());
    let (alice_key, alice_vk) = crypto::generate_keypair();
    let alice = crypto::address_of(&alice_vk);
    let bob = [0xB0u8; 20];

    let genesis = genesis_with(&[(&alice, 100.0)]);
    let node = make_node(&cluster, "solo", true, 0, Some(&genesis));

    node.engine
        .clone()
        .submit_transaction(signed_transfer(&alice_key, &bob, 10.0))
        .await
        .unwrap();

    wait_for_height(&node.engine, 1).await;

    assert_eq!(node.engine.latest_block().unwrap().height, 1);
    assert_eq!(balance(&node.engine, &alice), 90.0);
    assert_eq!(balance(&node.engine, &bob), 10.0);
}

#[tokio::test]
async fn quorum_commits_despite_one_lost_vote() {
    let cluster = Arc::new(Cluster::default());
    let (alice_key, alice_vk) = crypto::generate_keypair();
    let alice = crypto::address_of(&alice_vk);
    let bob = [0xB0u8; 20];

    let genesis = genesis_with(&[(&alice, 100.0)]);
    let leader = make_node(&cluster, "node1", true, 2, Some(&genesis));
    let follower_a = make_node(&cluster, "node2", false, 2, Some(&genesis));
    let follower_b = make_node(&cluster, "node3", false, 2, Some(&genesis));

    // node3 validates and votes, but its vote never arrives.
    cluster.drop_votes_from("node3");

    leader
        .engine
        .clone()
        .submit_transaction(signed_transfer(&alice_key, &bob, 10.0))
        .await
        .unwrap();

    for node in [&leader, &follower_a, &follower_b] {
        wait_for_height(&node.engine, 1).await;
        assert_eq!(balance(&node.engine, &alice), 90.0);
        assert_eq!(balance(&node.engine, &bob), 10.0);
    }
}

#[tokio::test]
async fn late_follower_syncs_the_whole_chain() {
    let cluster = Arc::new(Cluster::default());
    let (alice_key, alice_vk) = crypto::generate_keypair();
    let alice = crypto::address_of(&alice_vk);
    let bob = [0xB0u8; 20];
    let carol = [0xC0u8; 20];

    let genesis = genesis_with(&[(&alice, 100.0)]);
    let leader = make_node(&cluster, "node1", true, 0, Some(&genesis));

    leader
        .engine
        .clone()
        .submit_transaction(signed_transfer(&alice_key, &bob, 10.0))
        .await
        .unwrap();
    wait_for_height(&leader.engine, 1).await;

    leader
        .engine
        .clone()
        .submit_transaction(signed_transfer(&alice_key, &carol, 5.0))
        .await
        .unwrap();
    wait_for_height(&leader.engine, 2).await;

    // Joins with a completely empty store; genesis comes over the wire too.
    let follower = make_node(&cluster, "node2", false, 1, None);
    follower.engine.clone().sync_from_leader().await.unwrap();

    assert_eq!(
        follower.engine.latest_block().unwrap().current_block_hash,
        leader.engine.latest_block().unwrap().current_block_hash
    );
    for addr in [&alice[..], &bob[..], &carol[..]] {
        assert_eq!(balance(&follower.engine, addr), balance(&leader.engine, addr));
    }
    assert_eq!(balance(&follower.engine, &alice), 85.0);
}

#[tokio::test]
async fn tampered_transaction_is_rejected_and_never_voted_on() {
    let cluster = Arc::new(Cluster::default());
    let (alice_key, alice_vk) = crypto::generate_keypair();
    let alice = crypto::address_of(&alice_vk);
    let bob = [0xB0u8; 20];

    let genesis = genesis_with(&[(&alice, 100.0)]);
    let leader = make_node(&cluster, "node1", true, 1, Some(&genesis));
    let follower = make_node(&cluster, "node2", false, 1, Some(&genesis));

    // Amount doctored after signing; the root matches the doctored digest,
    // so only the signature check can catch it.
    let mut tx = signed_transfer(&alice_key, &bob, 10.0);
    tx.amount = 90.0;
    let block = Block::build(vec![tx], genesis.current_block_hash.to_vec(), 1);

    let err = follower
        .engine
        .clone()
        .handle_proposed_block(block)
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::InvalidSignature));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(follower.engine.latest_block().unwrap().height, 0);
    assert_eq!(leader.engine.latest_block().unwrap().height, 0);
}

#[tokio::test]
async fn commit_is_idempotent() {
    let cluster = Arc::new(Cluster::default());
    let (alice_key, alice_vk) = crypto::generate_keypair();
    let alice = crypto::address_of(&alice_vk);
    let bob = [0xB0u8; 20];

    let genesis = genesis_with(&[(&alice, 100.0)]);
    let node = make_node(&cluster, "solo", true, 0, Some(&genesis));

    let block = Block::build(
        vec![signed_transfer(&alice_key, &bob, 10.0)],
        genesis.current_block_hash.to_vec(),
        1,
    );

    node.engine.commit_block(&block).unwrap();
    node.engine.commit_block(&block).unwrap();

    assert_eq!(node.engine.latest_block().unwrap().height, 1);
    assert_eq!(balance(&node.engine, &alice), 90.0);
    assert_eq!(balance(&node.engine, &bob), 10.0);
    assert_eq!(node.engine.store().blocks_from(0).unwrap().len(), 2);
}

#[tokio::test]
async fn vote_for_unknown_block_is_reported() {
    let cluster = Arc::new(Cluster::default());
    let genesis = genesis_with(&[(&[0xAAu8; 20][..], 100.0)]);
    let node = make_node(&cluster, "node1", true, 1, Some(&genesis));

    let vote = Vote {
        voter_id: "node2".to_string(),
        block_hash: [7u8; 32],
        height: 1,
        approved: true,
    };
    let err = node.engine.clone().handle_vote(vote).await.unwrap_err();
    assert!(matches!(err, ChainError::BlockNotFound(_)));
}
