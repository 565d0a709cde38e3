use std::sync::Arc;

use rds_ipfs::{IpfsApi, IpfsConfig};
use rds_swarm::{BzzApi, SwarmConfig};
use rds_types::BackendKind;

use crate::config::ManagerConfig;

/// How to reach an IPFS node.
#[derive(Clone)]
pub enum IpfsOptions {
    /// Connect over the node's HTTP API.
    Http(IpfsConfig),
    /// Use an already constructed client.
    Client(Arc<dyn IpfsApi>),
}

/// How to reach a Swarm node.
#[derive(Clone)]
pub enum SwarmOptions {
    /// Connect over the node's bzz HTTP gateway.
    Http(SwarmConfig),
    /// Use an already constructed client.
    Client(Arc<dyn BzzApi>),
}

/// Everything the factory can build.
#[derive(Clone)]
pub enum ProviderOptions {
    Ipfs(IpfsOptions),
    Swarm(SwarmOptions),
    Manager(ManagerConfig),
}

impl ProviderOptions {
    pub fn ipfs_client(client: Arc<dyn IpfsApi>) -> Self {
        Self::Ipfs(IpfsOptions::Client(client))
    }

    pub fn swarm_client(client: Arc<dyn BzzApi>) -> Self {
        Self::Swarm(SwarmOptions::Client(client))
    }

    /// Backend these options configure; `None` for a manager.
    pub fn kind(&self) -> Option<BackendKind> {
        match self {
            Self::Ipfs(_) => Some(BackendKind::Ipfs),
            Self::Swarm(_) => Some(BackendKind::Swarm),
            Self::Manager(_) => None,
        }
    }
}

impl From<IpfsConfig> for ProviderOptions {
    fn from(config: IpfsConfig) -> Self {
        Self::Ipfs(IpfsOptions::Http(config))
    }
}

impl From<SwarmConfig> for ProviderOptions {
    fn from(config: SwarmConfig) -> Self {
        Self::Swarm(SwarmOptions::Http(config))
    }
}

impl From<ManagerConfig> for ProviderOptions {
    fn from(config: ManagerConfig) -> Self {
        Self::Manager(config)
    }
}
