pub mod block;          // Transaction and Block types, hashing, wire conversions
pub mod config;         // loads node.toml
pub mod consensus;      // propose/vote/commit engine and the Network seam
pub mod crypto;         // hashing (blake3), ed25519 signing, addresses
pub mod error;          // ChainError taxonomy
pub mod genesis;        // height-0 block construction and first-boot bootstrap
pub mod ledger;         // account balances, derived from the block log
pub mod mode;           // per-role orchestration logic
pub mod storage;        // sled block store
pub mod trie;           // digest trie over transaction hashes, inclusion proofs
pub mod validate;       // block validation
#[cfg(feature = "grpc")]
pub mod pb {
    tonic::include_proto!("quorumchain");
}
#[cfg(feature = "grpc")]
pub mod grpc;           // NodeService server (tonic/prost stubs)
#[cfg(feature = "grpc")]
pub mod network;        // gRPC adapter behind consensus::Network
