//! Purpose: Own the lifecycle of one cluster client per connection id.
//! Exports: `ConnectionManager`, `ScopedConnection`, `ConnectionState`, `ConnectionCheck`.
//! Role: Resolves the profile, opens the client lazily, and releases it deterministically.
//! Invariants: At most one live client per manager; repeated acquire returns the same client.
//! Invariants: After release the manager holds no client and no profile.
//! Invariants: A scoped connection is released on every exit path, including panics.
use crate::core::error::{Error, ErrorKind};
use crate::core::gateway::RecordGateway;
use crate::core::profile::{ConnectionProfile, ProfileRegistry};
use crate::core::store::{ClientConfig, Connector, StoreClient};
use std::error::Error as StdError;
use std::sync::Arc;
use tracing::{debug, info, warn};

type ApiResult<T> = Result<T, Error>;

pub const CONNECTION_OK_MESSAGE: &str = "Connection successfully tested";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Outcome of a connectivity probe, suitable for a connection-editor "test" button.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionCheck {
    pub success: bool,
    pub message: String,
}

pub struct ConnectionManager {
    conn_id: String,
    registry: Arc<dyn ProfileRegistry>,
    connector: Arc<dyn Connector>,
    profile: Option<ConnectionProfile>,
    client: Option<Box<dyn StoreClient>>,
}

impl ConnectionManager {
    pub fn new(
        conn_id: impl Into<String>,
        registry: Arc<dyn ProfileRegistry>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            conn_id: conn_id.into(),
            registry,
            connector,
            profile: None,
            client: None,
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn state(&self) -> ConnectionState {
        if self.client.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// Profile of the open session, if any.
    pub fn profile(&self) -> Option<&ConnectionProfile> {
        self.profile.as_ref()
    }

    pub fn acquire(&mut self) -> ApiResult<&dyn StoreClient> {
        let client = match self.client.take() {
            Some(client) => client,
            None => self.open()?,
        };
        Ok(&**self.client.insert(client))
    }

    pub fn release(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        self.profile = None;
        if let Err(err) = client.close() {
            warn!(conn_id = %self.conn_id, error = %err, "failed to close client cleanly");
        }
        debug!(conn_id = %self.conn_id, "released connection");
    }

    /// Gateway over the current client; operations fail with `NotConnected` while closed.
    pub fn gateway(&self) -> RecordGateway<'_> {
        RecordGateway::new(self.client.as_deref())
    }

    pub fn scoped(&mut self) -> ApiResult<ScopedConnection<'_>> {
        self.acquire()?;
        Ok(ScopedConnection { manager: self })
    }

    pub fn with_connection<T>(
        &mut self,
        f: impl FnOnce(RecordGateway<'_>) -> ApiResult<T>,
    ) -> ApiResult<T> {
        let scope = self.scoped()?;
        f(scope.gateway())
    }

    /// Probe connectivity; a session that was already open stays open.
    pub fn test_connection(&mut self) -> ConnectionCheck {
        let was_open = self.client.is_some();
        let outcome = self.acquire().and_then(|client| {
            if client.is_connected() {
                Ok(())
            } else {
                Err(Error::new(ErrorKind::NotConnected)
                    .with_message("client reports it is not connected to the cluster"))
            }
        });
        if !was_open {
            self.release();
        }
        match outcome {
            Ok(()) => ConnectionCheck {
                success: true,
                message: CONNECTION_OK_MESSAGE.to_string(),
            },
            Err(err) => ConnectionCheck {
                success: false,
                message: failure_reason(&err),
            },
        }
    }

    fn open(&mut self) -> ApiResult<Box<dyn StoreClient>> {
        let profile = self.registry.resolve(&self.conn_id).map_err(|err| {
            Error::new(ErrorKind::Connection)
                .with_message(format!(
                    "failed to resolve connection profile '{}'",
                    self.conn_id
                ))
                .with_source(err)
        })?;
        let config = ClientConfig::from_profile(&profile);
        info!(conn_id = %self.conn_id, "Hosts: {}:{}", profile.host, profile.port);
        let client = self.connector.connect(&config).map_err(|err| {
            Error::new(ErrorKind::Connection)
                .with_message(format!(
                    "failed to connect to {}:{}",
                    profile.host, profile.port
                ))
                .with_source(err)
        })?;
        self.profile = Some(profile);
        Ok(client)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.release();
    }
}

/// Open connection that is released when dropped.
pub struct ScopedConnection<'m> {
    manager: &'m mut ConnectionManager,
}

impl ScopedConnection<'_> {
    pub fn gateway(&self) -> RecordGateway<'_> {
        self.manager.gateway()
    }

    pub fn profile(&self) -> Option<&ConnectionProfile> {
        self.manager.profile()
    }
}

impl Drop for ScopedConnection<'_> {
    fn drop(&mut self) {
        self.manager.release();
    }
}

/// Messages of the whole cause chain, outermost first.
fn failure_reason(err: &Error) -> String {
    let mut parts = vec![message_of(err)];
    let mut cur = err.source();
    while let Some(source) = cur {
        match source.downcast_ref::<Error>() {
            Some(inner) => parts.push(message_of(inner)),
            None => parts.push(source.to_string()),
        }
        cur = source.source();
    }
    parts.join(": ")
}

fn message_of(err: &Error) -> String {
    err.message()
        .map_or_else(|| err.to_string(), str::to_string)
}
