//! Purpose: Define the stable public Rust API boundary for aerostep.
//! Exports: Record model, connection lifecycle, gateway, steps, and backends.
//! Role: Public, additive-only surface used by the CLI and embedding orchestrators.
//! Invariants: Callers reach storage only through `ConnectionManager` and `RecordGateway`.
//! Invariants: Step outputs are plain JSON values.

mod provider;
mod rest;
mod steps;

pub use crate::core::connection::{
    CONNECTION_OK_MESSAGE, ConnectionCheck, ConnectionManager, ConnectionState, ScopedConnection,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::gateway::RecordGateway;
pub use crate::core::memory::{MemoryClient, MemoryCluster, MemoryConnector};
pub use crate::core::normalize::{all_exist, record_mapping, records_to_mappings};
pub use crate::core::policy::{self, Policy};
pub use crate::core::profile::{
    CONN_ENV_PREFIX, ConnectionProfile, DEFAULT_CONN_ID, DEFAULT_PORT, EnvProfiles,
    ProfileRegistry, StaticProfiles,
};
pub use crate::core::record::{
    Bins, ERASE, Record, RecordKey, RecordMetadata, RecordRequest, RecordResult,
    TTL_DONT_UPDATE, TTL_NAMESPACE_DEFAULT, TTL_NEVER_EXPIRE, WriteMeta,
};
pub use crate::core::store::{ClientConfig, Connector, Host, StoreClient};
pub use provider::{FieldBehaviour, ProviderInfo, field_behaviour, provider_info};
pub use rest::{RestClient, RestConnector};
pub use steps::{Operator, PollStep, ReadStep, Sensor, TaskContext, UI_COLOR, WriteStep};
