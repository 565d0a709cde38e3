//! High-level SDK for RDS.
//!
//! One storage API over IPFS and Swarm. Use [`factory`] to build a single
//! backend adapter, or a [`Manager`] that holds several and routes reads
//! by the format of the address.
//!
//! ```no_run
//! # async fn demo() -> rds_sdk::RdsResult<()> {
//! use rds_sdk::{BackendKind, FetchOptions, Manager, PutOptions};
//! use rds_sdk::{IpfsConfig, ProviderOptions, SwarmConfig};
//!
//! let mut manager = Manager::new();
//! manager.add_provider(BackendKind::Ipfs, ProviderOptions::from(IpfsConfig::default()))?;
//! manager.add_provider(BackendKind::Swarm, ProviderOptions::from(SwarmConfig::default()))?;
//!
//! let cid = manager.put("hello", PutOptions::default()).await?;
//! let fetched = manager.get(&cid, FetchOptions::default()).await?;
//! assert!(fetched.is_file());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod manager;
pub mod options;
pub mod storage;

pub use backend::Backend;
pub use config::ManagerConfig;
pub use manager::Manager;
pub use options::{IpfsOptions, ProviderOptions, SwarmOptions};
pub use storage::{factory, Storage};

// Re-export the types callers need alongside the SDK
pub use rds_ipfs::{IpfsConfig, IpfsProvider};
pub use rds_swarm::{SwarmConfig, SwarmProvider};
pub use rds_types::{
    classify, Address, BackendKind, Directory, DirectoryArrayEntry, DirectoryEntry, EntryStream,
    FetchOptions, Fetched, FileData, PutInput, PutOptions, RdsError, RdsResult, StreamEntry,
};
