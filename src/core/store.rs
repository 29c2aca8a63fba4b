//! Purpose: Capability traits for the underlying cluster client.
//! Exports: `StoreClient`, `Connector`, `ClientConfig`, `Host`.
//! Role: Seam between the connection layer and concrete backends.
//! Invariants: Multi-key calls return one record per input key, in input order.
//! Invariants: A missing record is a `Record::missing`, not an error.
use crate::core::error::Error;
use crate::core::policy::Policy;
use crate::core::profile::ConnectionProfile;
use crate::core::record::{Bins, Record, RecordKey, WriteMeta};

type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Host {
    pub name: String,
    pub port: u16,
}

/// Seed nodes handed to `Connector::connect`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    pub hosts: Vec<Host>,
}

impl ClientConfig {
    pub fn from_profile(profile: &ConnectionProfile) -> Self {
        Self {
            hosts: vec![Host {
                name: profile.host.clone(),
                port: profile.port,
            }],
        }
    }
}

pub trait StoreClient: Send + Sync {
    fn exists(&self, key: &RecordKey, policy: &Policy) -> ApiResult<Record>;

    fn exists_many(&self, keys: &[RecordKey], policy: &Policy) -> ApiResult<Vec<Record>> {
        keys.iter().map(|key| self.exists(key, policy)).collect()
    }

    fn get(&self, key: &RecordKey, policy: &Policy) -> ApiResult<Record>;

    fn get_many(&self, keys: &[RecordKey], policy: &Policy) -> ApiResult<Vec<Record>> {
        keys.iter().map(|key| self.get(key, policy)).collect()
    }

    fn put(&self, key: &RecordKey, bins: &Bins, meta: &WriteMeta, policy: &Policy)
    -> ApiResult<()>;

    fn touch(&self, key: &RecordKey, ttl: i64, policy: Option<&Policy>) -> ApiResult<()>;

    fn close(&self) -> ApiResult<()>;

    fn is_connected(&self) -> bool;
}

pub trait Connector: Send + Sync {
    /// Open a client against the seed nodes; blocks on network I/O.
    fn connect(&self, config: &ClientConfig) -> ApiResult<Box<dyn StoreClient>>;
}
