use std::collections::BTreeMap;

use rds_types::{
    classify, Address, BackendKind, EntryStream, FetchOptions, Fetched, PutInput, PutOptions,
    RdsError, RdsResult,
};
use tracing::{debug, info};

use crate::backend::Backend;
use crate::config::ManagerConfig;
use crate::options::ProviderOptions;

/// Routes storage calls between registered backends.
///
/// `put` goes to the active backend, which is the first one registered
/// until [`make_active`](Self::make_active) says otherwise. `get` and
/// `get_readable` go to whichever backend the address format belongs to,
/// regardless of which one is active.
///
/// Registration takes `&mut self` and is meant to happen during setup;
/// afterwards the manager can be shared behind an `Arc`.
#[derive(Clone, Default)]
pub struct Manager {
    providers: BTreeMap<BackendKind, Backend>,
    active: Option<BackendKind>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manager with every backend `config` names.
    pub fn from_config(config: ManagerConfig) -> RdsResult<Self> {
        let mut manager = Self::new();
        if let Some(ipfs) = config.ipfs {
            manager.add_provider(BackendKind::Ipfs, ProviderOptions::from(ipfs))?;
        }
        if let Some(swarm) = config.swarm {
            manager.add_provider(BackendKind::Swarm, ProviderOptions::from(swarm))?;
        }
        if let Some(active) = config.active {
            manager.make_active(active)?;
        }
        Ok(manager)
    }

    /// Construct and register the backend for `kind`.
    ///
    /// Registering a kind again replaces its backend. Options for another
    /// kind, or for a manager, are a type error.
    pub fn add_provider(&mut self, kind: BackendKind, options: ProviderOptions) -> RdsResult<()> {
        let backend = match (kind, options) {
            (BackendKind::Ipfs, ProviderOptions::Ipfs(options)) => Backend::ipfs(options)?,
            (BackendKind::Swarm, ProviderOptions::Swarm(options)) => Backend::swarm(options)?,
            (kind, ProviderOptions::Manager(_)) => {
                return Err(RdsError::type_error(format!(
                    "{} provider cannot be configured with manager options!",
                    kind.display_name()
                )));
            }
            (kind, options) => {
                let given = options.kind().map_or("unknown", |k| k.display_name());
                return Err(RdsError::type_error(format!(
                    "{} provider cannot be configured with {given} options!",
                    kind.display_name()
                )));
            }
        };
        self.register(backend);
        Ok(())
    }

    /// Register an already constructed backend.
    pub fn register(&mut self, backend: impl Into<Backend>) {
        let backend = backend.into();
        let kind = backend.kind();
        if self.active.is_none() {
            self.active = Some(kind);
        }
        info!(target: "rds::manager", %kind, active = ?self.active, "registered provider");
        self.providers.insert(kind, backend);
    }

    pub fn make_active(&mut self, kind: BackendKind) -> RdsResult<()> {
        if !self.providers.contains_key(&kind) {
            return Err(RdsError::provider(format!("{kind} is not registered provider!")));
        }
        debug!(target: "rds::manager", %kind, "switching active provider");
        self.active = Some(kind);
        Ok(())
    }

    pub fn active_kind(&self) -> Option<BackendKind> {
        self.active
    }

    pub fn active_provider(&self) -> Option<&Backend> {
        self.active.and_then(|kind| self.providers.get(&kind))
    }

    pub fn provider(&self, kind: BackendKind) -> Option<&Backend> {
        self.providers.get(&kind)
    }

    /// Registered kinds, in a stable order.
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.providers.keys().copied().collect()
    }

    /// Store `input` with the active backend.
    pub async fn put(&self, input: impl Into<PutInput>, options: PutOptions) -> RdsResult<Address> {
        let backend = self.active_provider().ok_or_else(|| {
            RdsError::provider("Before putting any data, you have to first add some provider!")
        })?;
        backend.put(input, options).await
    }

    /// Fetch `address` from the backend its format belongs to.
    pub async fn get(&self, address: impl AsRef<str>, options: FetchOptions) -> RdsResult<Fetched> {
        let address = address.as_ref();
        self.route(address)?.get(address, options).await
    }

    /// Stream `address` from the backend its format belongs to.
    pub async fn get_readable(
        &self,
        address: impl AsRef<str>,
        options: FetchOptions,
    ) -> RdsResult<EntryStream> {
        let address = address.as_ref();
        self.route(address)?.get_readable(address, options).await
    }

    fn route(&self, address: &str) -> RdsResult<&Backend> {
        let kind = classify(address)
            .ok_or_else(|| RdsError::value("Address does not have expected format"))?;
        debug!(target: "rds::manager", %address, %kind, "routing fetch");
        self.providers.get(&kind).ok_or_else(|| {
            RdsError::provider(format!(
                "You wanted to fetch {} address, but you haven't registered {} provider!",
                kind.display_name(),
                kind.display_name()
            ))
        })
    }
}
