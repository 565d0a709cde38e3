use std::fmt;
use std::str::FromStr;

use cid::Cid;
use serde::{Deserialize, Serialize};

use crate::error::RdsError;

/// Opaque address of stored content in one backend's namespace.
pub type Address = String;

/// Length of a Swarm content hash in hex characters.
pub const SWARM_HASH_LENGTH: usize = 64;

/// The storage backends RDS can talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Content-identifier addressed DAG store.
    Ipfs,
    /// Manifest based swarm store.
    Swarm,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ipfs => "ipfs",
            Self::Swarm => "swarm",
        }
    }

    /// Human readable backend name, used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ipfs => "IPFS",
            Self::Swarm => "Swarm",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = RdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipfs" => Ok(Self::Ipfs),
            "swarm" => Ok(Self::Swarm),
            other => Err(RdsError::value(format!("unknown provider: {other}"))),
        }
    }
}

/// Returns `true` if `address` parses as a content identifier.
pub fn is_cid(address: &str) -> bool {
    Cid::try_from(address).is_ok()
}

/// Decide which backend owns `address`.
///
/// A parsable content identifier belongs to IPFS. Anything else that is
/// exactly [`SWARM_HASH_LENGTH`] characters long belongs to Swarm. All other
/// inputs are unrecognized and yield `None`. This is a heuristic: the two
/// address spaces are disjoint by convention only.
pub fn classify(address: &str) -> Option<BackendKind> {
    if is_cid(address) {
        return Some(BackendKind::Ipfs);
    }
    if address.chars().count() == SWARM_HASH_LENGTH {
        return Some(BackendKind::Swarm);
    }
    None
}
