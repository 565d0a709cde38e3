use rds_ipfs::IpfsProvider;
use rds_swarm::SwarmProvider;
use rds_types::{Address, EntryStream, FetchOptions, Fetched, PutInput, PutOptions, RdsResult};
use tracing::debug;

use crate::backend::Backend;
use crate::manager::Manager;
use crate::options::ProviderOptions;

/// Anything the factory builds. All variants expose the same storage
/// contract.
#[derive(Clone)]
pub enum Storage {
    Ipfs(IpfsProvider),
    Swarm(SwarmProvider),
    Manager(Manager),
}

/// Build a backend adapter, or a manager, from `options`.
pub fn factory(options: ProviderOptions) -> RdsResult<Storage> {
    let storage = match options {
        ProviderOptions::Ipfs(options) => Backend::ipfs(options)?.into(),
        ProviderOptions::Swarm(options) => Backend::swarm(options)?.into(),
        ProviderOptions::Manager(config) => Storage::Manager(Manager::from_config(config)?),
    };
    debug!(target: "rds::manager", storage = storage.name(), "constructed storage");
    Ok(storage)
}

impl Storage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ipfs(_) => "ipfs",
            Self::Swarm(_) => "swarm",
            Self::Manager(_) => "manager",
        }
    }

    pub fn as_manager(&self) -> Option<&Manager> {
        match self {
            Self::Manager(manager) => Some(manager),
            _ => None,
        }
    }

    pub fn into_manager(self) -> Option<Manager> {
        match self {
            Self::Manager(manager) => Some(manager),
            _ => None,
        }
    }

    pub async fn put(&self, input: impl Into<PutInput>, options: PutOptions) -> RdsResult<Address> {
        match self {
            Self::Ipfs(p) => p.put(input, options).await,
            Self::Swarm(p) => p.put(input, options).await,
            Self::Manager(m) => m.put(input, options).await,
        }
    }

    pub async fn get(&self, address: impl AsRef<str>, options: FetchOptions) -> RdsResult<Fetched> {
        let address = address.as_ref();
        match self {
            Self::Ipfs(p) => p.get(address, options).await,
            Self::Swarm(p) => p.get(address, options).await,
            Self::Manager(m) => m.get(address, options).await,
        }
    }

    pub async fn get_readable(
        &self,
        address: impl AsRef<str>,
        options: FetchOptions,
    ) -> RdsResult<EntryStream> {
        let address = address.as_ref();
        match self {
            Self::Ipfs(p) => p.get_readable(address, options).await,
            Self::Swarm(p) => p.get_readable(address, options).await,
            Self::Manager(m) => m.get_readable(address, options).await,
        }
    }
}

impl From<Backend> for Storage {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Ipfs(provider) => Self::Ipfs(provider),
            Backend::Swarm(provider) => Self::Swarm(provider),
        }
    }
}
