#[cfg(feature = "grpc")]
pub mod node;
