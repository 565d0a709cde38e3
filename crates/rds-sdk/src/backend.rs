use rds_ipfs::IpfsProvider;
use rds_swarm::SwarmProvider;
use rds_types::{
    Address, BackendKind, EntryStream, FetchOptions, Fetched, PutInput, PutOptions, RdsResult,
};

use crate::options::{IpfsOptions, SwarmOptions};

/// A registered backend adapter.
#[derive(Clone)]
pub enum Backend {
    Ipfs(IpfsProvider),
    Swarm(SwarmProvider),
}

impl Backend {
    pub fn ipfs(options: IpfsOptions) -> RdsResult<Self> {
        let provider = match options {
            IpfsOptions::Http(config) => IpfsProvider::connect(&config)?,
            IpfsOptions::Client(client) => IpfsProvider::new(client),
        };
        Ok(Self::Ipfs(provider))
    }

    pub fn swarm(options: SwarmOptions) -> RdsResult<Self> {
        let provider = match options {
            SwarmOptions::Http(config) => SwarmProvider::connect(&config)?,
            SwarmOptions::Client(client) => SwarmProvider::new(client),
        };
        Ok(Self::Swarm(provider))
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Ipfs(p) => p.kind(),
            Self::Swarm(p) => p.kind(),
        }
    }

    pub async fn put(&self, input: impl Into<PutInput>, options: PutOptions) -> RdsResult<Address> {
        match self {
            Self::Ipfs(p) => p.put(input, options).await,
            Self::Swarm(p) => p.put(input, options).await,
        }
    }

    pub async fn get(&self, address: &str, options: FetchOptions) -> RdsResult<Fetched> {
        match self {
            Self::Ipfs(p) => p.get(address, options).await,
            Self::Swarm(p) => p.get(address, options).await,
        }
    }

    pub async fn get_readable(&self, address: &str, options: FetchOptions) -> RdsResult<EntryStream> {
        match self {
            Self::Ipfs(p) => p.get_readable(address, options).await,
            Self::Swarm(p) => p.get_readable(address, options).await,
        }
    }
}

impl From<IpfsProvider> for Backend {
    fn from(provider: IpfsProvider) -> Self {
        Self::Ipfs(provider)
    }
}

impl From<SwarmProvider> for Backend {
    fn from(provider: SwarmProvider) -> Self {
        Self::Swarm(provider)
    }
}
