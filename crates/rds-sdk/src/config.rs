use rds_ipfs::IpfsConfig;
use rds_swarm::SwarmConfig;
use rds_types::{BackendKind, RdsError, RdsResult};
use serde::{Deserialize, Serialize};

/// Declarative [`Manager`](crate::Manager) setup.
///
/// ```toml
/// active = "swarm"
///
/// [ipfs]
/// url = "http://127.0.0.1:5001"
///
/// [swarm]
/// url = "http://localhost:8500"
/// timeout_ms = 30000
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Backend receiving `put`. Defaults to the first configured one.
    pub active: Option<BackendKind>,
    pub ipfs: Option<IpfsConfig>,
    pub swarm: Option<SwarmConfig>,
}

impl ManagerConfig {
    pub fn from_toml_str(s: &str) -> RdsResult<Self> {
        toml::from_str(s).map_err(|e| RdsError::value(format!("invalid manager config: {e}")))
    }

    pub fn to_toml_string(&self) -> RdsResult<String> {
        toml::to_string(self).map_err(|e| RdsError::value(format!("invalid manager config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = ManagerConfig::from_toml_str(
            r#"
            active = "swarm"

            [ipfs]
            url = "http://ipfs.local:5001"

            [swarm]
            timeout_ms = 30000
            "#,
        )
        .unwrap();
        assert_eq!(config.active, Some(BackendKind::Swarm));
        assert_eq!(config.ipfs.unwrap().url, "http://ipfs.local:5001");
        let swarm = config.swarm.unwrap();
        assert_eq!(swarm.url, SwarmConfig::default().url);
        assert_eq!(swarm.timeout_ms, Some(30000));
    }

    #[test]
    fn empty_config_registers_nothing() {
        let config = ManagerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ManagerConfig::default());
    }

    #[test]
    fn unknown_backend_is_value_error() {
        let err = ManagerConfig::from_toml_str(r#"active = "local""#).unwrap_err();
        assert!(err.is_value());
    }

    #[test]
    fn toml_roundtrip() {
        let config = ManagerConfig {
            active: Some(BackendKind::Ipfs),
            ipfs: Some(IpfsConfig::new("http://node:5001")),
            swarm: None,
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(ManagerConfig::from_toml_str(&text).unwrap(), config);
    }
}
