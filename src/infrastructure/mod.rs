//! Adapters for the ports in [`crate::domain::ports`].

pub mod backend;
pub mod in_memory;
pub mod keypair;
pub mod rpc;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
