//! Purpose: Resolve named connection profiles to seed-node addresses.
//! Exports: `ConnectionProfile`, `ProfileRegistry`, `StaticProfiles`, `EnvProfiles`.
//! Role: Read-only collaborator consulted once per connection session.
//! Invariants: Only host and port are used; credentials are never read.
//! Invariants: Unknown identifiers fail with `ProfileNotFound`.
use crate::core::error::{Error, ErrorKind};
use std::collections::HashMap;
use url::Url;

pub const DEFAULT_CONN_ID: &str = "aerospike_default";
pub const DEFAULT_PORT: u16 = 3000;
pub const CONN_ENV_PREFIX: &str = "AEROSTEP_CONN_";

type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionProfile {
    pub identifier: String,
    pub host: String,
    pub port: u16,
}

impl ConnectionProfile {
    pub fn new(identifier: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            identifier: identifier.into(),
            host: host.into(),
            port,
        }
    }
}

pub trait ProfileRegistry: Send + Sync {
    fn resolve(&self, identifier: &str) -> ApiResult<ConnectionProfile>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticProfiles {
    profiles: HashMap<String, ConnectionProfile>,
}

impl StaticProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: ConnectionProfile) -> Self {
        self.profiles.insert(profile.identifier.clone(), profile);
        self
    }
}

impl ProfileRegistry for StaticProfiles {
    fn resolve(&self, identifier: &str) -> ApiResult<ConnectionProfile> {
        self.profiles
            .get(identifier)
            .cloned()
            .ok_or_else(|| profile_not_found(identifier))
    }
}

/// Profiles read from `AEROSTEP_CONN_<ID>=aerospike://host[:port]` variables.
#[derive(Clone, Debug)]
pub struct EnvProfiles {
    prefix: String,
}

impl EnvProfiles {
    pub fn new() -> Self {
        Self {
            prefix: CONN_ENV_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn var_name(&self, identifier: &str) -> String {
        let suffix: String = identifier
            .chars()
            .map(|ch| match ch {
                '-' | '.' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{suffix}", self.prefix)
    }
}

impl Default for EnvProfiles {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRegistry for EnvProfiles {
    fn resolve(&self, identifier: &str) -> ApiResult<ConnectionProfile> {
        let var = self.var_name(identifier);
        let value = std::env::var(&var).map_err(|_| {
            profile_not_found(identifier).with_hint(format!("Set {var}=aerospike://host:port."))
        })?;
        parse_profile_uri(identifier, &value)
    }
}

pub(crate) fn parse_profile_uri(identifier: &str, raw: &str) -> ApiResult<ConnectionProfile> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("aerospike://{raw}")
    };
    let url = Url::parse(&candidate).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid connection uri for profile '{identifier}'"))
            .with_source(err)
    })?;
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("connection uri for profile '{identifier}' has no host")));
        }
    };
    Ok(ConnectionProfile {
        identifier: identifier.to_string(),
        host,
        port: url.port().unwrap_or(DEFAULT_PORT),
    })
}

fn profile_not_found(identifier: &str) -> Error {
    Error::new(ErrorKind::ProfileNotFound)
        .with_message(format!("connection profile '{identifier}' is not defined"))
}
