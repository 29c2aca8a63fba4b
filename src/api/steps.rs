//! Purpose: Orchestrator-facing write, read and existence-poll steps.
//! Exports: `TaskContext`, `Operator`, `Sensor`, `WriteStep`, `ReadStep`, `PollStep`.
//! Role: Each invocation opens a scoped connection, runs one gateway call, and
//! returns plain structured data.
//! Invariants: Every step releases its connection before returning, success or failure.
//! Invariants: Step outputs contain only JSON values (mappings, lists, scalars, null).
//! Invariants: An unmet poll condition is `Ok(false)`, never an error.
use crate::core::connection::ConnectionManager;
use crate::core::error::Error;
use crate::core::normalize::{all_exist, records_to_mappings};
use crate::core::policy::Policy;
use crate::core::profile::{DEFAULT_CONN_ID, ProfileRegistry};
use crate::core::record::{Bins, Record, RecordRequest, RecordResult, WriteMeta};
use crate::core::store::Connector;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

type ApiResult<T> = Result<T, Error>;

pub const UI_COLOR: &str = "#66c3ff";

/// Per-invocation environment handed to steps by the orchestrator.
#[derive(Clone)]
pub struct TaskContext {
    task_id: String,
    registry: Arc<dyn ProfileRegistry>,
    connector: Arc<dyn Connector>,
}

impl TaskContext {
    pub fn new(
        task_id: impl Into<String>,
        registry: Arc<dyn ProfileRegistry>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            registry,
            connector,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Fresh, closed connection manager for `conn_id`.
    pub fn connection(&self, conn_id: &str) -> ConnectionManager {
        ConnectionManager::new(conn_id, self.registry.clone(), self.connector.clone())
    }
}

/// A step whose return value becomes the recorded output of the task.
pub trait Operator {
    fn execute(&self, context: &TaskContext) -> ApiResult<Value>;
}

/// A condition re-evaluated by the scheduler until it reports `true` or times out.
pub trait Sensor {
    fn poke(&self, context: &TaskContext) -> ApiResult<bool>;
}

fn default_conn_id() -> String {
    DEFAULT_CONN_ID.to_string()
}

/// Create a record or add/erase bins on an existing one.
#[derive(Clone, Debug, Deserialize)]
pub struct WriteStep {
    namespace: String,
    set: String,
    key: String,
    bins: Bins,
    #[serde(default)]
    metadata: Option<WriteMeta>,
    #[serde(default = "Policy::exists_ignore")]
    policy: Policy,
    #[serde(default = "default_conn_id")]
    conn_id: String,
}

impl WriteStep {
    pub const TEMPLATE_FIELDS: &'static [&'static str] = &["key", "bins", "metadata"];

    pub fn new(
        namespace: impl Into<String>,
        set: impl Into<String>,
        key: impl Into<String>,
        bins: Bins,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            key: key.into(),
            bins,
            metadata: None,
            policy: Policy::exists_ignore(),
            conn_id: default_conn_id(),
        }
    }

    pub fn with_metadata(mut self, metadata: WriteMeta) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_conn_id(mut self, conn_id: impl Into<String>) -> Self {
        self.conn_id = conn_id.into();
        self
    }
}

impl Operator for WriteStep {
    fn execute(&self, context: &TaskContext) -> ApiResult<Value> {
        let mut connection = context.connection(&self.conn_id);
        connection.with_connection(|gateway| {
            info!(task_id = context.task_id(), "Storing {} as key", self.key);
            gateway.put(
                &self.namespace,
                &self.set,
                &self.key,
                &self.bins,
                &self.metadata.unwrap_or_default(),
                &self.policy,
            )?;
            info!(task_id = context.task_id(), "Stored key successfully");
            Ok(Value::Null)
        })
    }
}

/// Read one or many records and emit them as plain mappings.
#[derive(Clone, Debug, Deserialize)]
pub struct ReadStep {
    namespace: String,
    set: String,
    key: RecordRequest,
    #[serde(default = "Policy::key_send")]
    policy: Policy,
    #[serde(default = "default_conn_id")]
    conn_id: String,
}

impl ReadStep {
    pub const TEMPLATE_FIELDS: &'static [&'static str] = &["key"];

    pub fn new(
        namespace: impl Into<String>,
        set: impl Into<String>,
        key: impl Into<RecordRequest>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            key: key.into(),
            policy: Policy::key_send(),
            conn_id: default_conn_id(),
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_conn_id(mut self, conn_id: impl Into<String>) -> Self {
        self.conn_id = conn_id.into();
        self
    }

    /// One mapping per record; a single-key read still yields a one-element list.
    pub fn parse_records(records: &RecordResult<Record>) -> Vec<Value> {
        records_to_mappings(records)
    }
}

impl Operator for ReadStep {
    fn execute(&self, context: &TaskContext) -> ApiResult<Value> {
        let mut connection = context.connection(&self.conn_id);
        connection.with_connection(|gateway| {
            info!(task_id = context.task_id(), "Fetching key");
            let records = gateway.get_record(&self.namespace, &self.set, &self.key, &self.policy)?;
            let parsed = Self::parse_records(&records);
            info!(task_id = context.task_id(), "Got {} records", parsed.len());
            Ok(Value::Array(parsed))
        })
    }
}

/// Existence sensor: satisfied once every requested key exists.
#[derive(Clone, Debug, Deserialize)]
pub struct PollStep {
    namespace: String,
    set: String,
    key: RecordRequest,
    #[serde(default = "Policy::key_send")]
    policy: Policy,
    #[serde(default = "default_conn_id")]
    conn_id: String,
}

impl PollStep {
    pub const TEMPLATE_FIELDS: &'static [&'static str] = &["key"];

    pub fn new(
        namespace: impl Into<String>,
        set: impl Into<String>,
        key: impl Into<RecordRequest>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            key: key.into(),
            policy: Policy::key_send(),
            conn_id: default_conn_id(),
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_conn_id(mut self, conn_id: impl Into<String>) -> Self {
        self.conn_id = conn_id.into();
        self
    }

    pub fn parse_records(records: &RecordResult<Record>) -> bool {
        all_exist(records)
    }
}

impl Sensor for PollStep {
    fn poke(&self, context: &TaskContext) -> ApiResult<bool> {
        let mut connection = context.connection(&self.conn_id);
        connection.with_connection(|gateway| {
            info!(task_id = context.task_id(), "Poking {} keys", self.key.len());
            let records = gateway.exists(&self.namespace, &self.set, &self.key, &self.policy)?;
            Ok(Self::parse_records(&records))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Operator, PollStep, ReadStep, Sensor, TaskContext, WriteStep};
    use crate::core::error::ErrorKind;
    use crate::core::memory::{MemoryCluster, MemoryConnector};
    use crate::core::policy::{self, Policy};
    use crate::core::profile::{ConnectionProfile, StaticProfiles};
    use crate::core::record::{Bins, ERASE, RecordRequest, WriteMeta};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn context(cluster: &MemoryCluster) -> TaskContext {
        let registry = StaticProfiles::new()
            .with_profile(ConnectionProfile::new("aerospike_default", "127.0.0.1", 3000));
        TaskContext::new(
            "unit",
            Arc::new(registry),
            Arc::new(MemoryConnector::new(cluster.clone())),
        )
    }

    fn bins(value: Value) -> Bins {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn write_then_read_round_trips_bins() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        let output = WriteStep::new("test", "demo", "k1", bins(json!({"bin1": "value1"})))
            .with_metadata(WriteMeta::with_ttl(0))
            .execute(&ctx)
            .expect("write");
        assert_eq!(output, Value::Null);

        let output = ReadStep::new("test", "demo", "k1").execute(&ctx).expect("read");
        let records = output.as_array().expect("array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["bins"], json!({"bin1": "value1"}));
        assert_eq!(records[0]["namespace"], json!("test"));
        assert_eq!(records[0]["metadata"]["gen"], json!(1));
        assert_eq!(cluster.live_clients(), 0);
    }

    #[test]
    fn read_of_missing_keys_omits_bins() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        let output = ReadStep::new("test", "demo", vec!["a", "b"])
            .execute(&ctx)
            .expect("read");
        let records = output.as_array().expect("array");
        assert_eq!(records.len(), 2);
        for record in records {
            assert_eq!(record["metadata"], Value::Null);
            assert!(record.get("bins").is_none());
        }
    }

    #[test]
    fn erase_through_write_step_deletes_record() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        WriteStep::new("test", "demo", "k1", bins(json!({"only": 1})))
            .execute(&ctx)
            .expect("write");
        let mut erase = Bins::new();
        erase.insert("only".to_string(), ERASE);
        WriteStep::new("test", "demo", "k1", erase)
            .execute(&ctx)
            .expect("erase");
        assert!(!PollStep::new("test", "demo", "k1").poke(&ctx).expect("poke"));
    }

    #[test]
    fn poll_requires_every_key() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        WriteStep::new("test", "demo", "k1", bins(json!({"a": 1})))
            .execute(&ctx)
            .expect("write");

        let sensor = PollStep::new("test", "demo", vec!["k1", "k2"]);
        assert!(!sensor.poke(&ctx).expect("poke"));

        WriteStep::new("test", "demo", "k2", bins(json!({"a": 2})))
            .execute(&ctx)
            .expect("write");
        assert!(sensor.poke(&ctx).expect("poke"));
        assert_eq!(cluster.live_clients(), 0);
        assert_eq!(cluster.connects(), 4);
    }

    #[test]
    fn failing_write_releases_connection() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        let step = WriteStep::new("test", "demo", "k1", bins(json!({"a": 1})))
            .with_policy(Policy::new().with(policy::EXISTS, policy::EXISTS_UPDATE_ONLY));
        let err = step.execute(&ctx).expect_err("update only");
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(cluster.live_clients(), 0);
    }

    #[test]
    fn unknown_connection_id_surfaces_connection_error() {
        let cluster = MemoryCluster::new();
        let ctx = context(&cluster);
        let err = PollStep::new("test", "demo", "k1")
            .with_conn_id("elsewhere")
            .poke(&ctx)
            .expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn steps_deserialize_with_defaults() {
        let step: ReadStep =
            serde_json::from_value(json!({"namespace": "test", "set": "demo", "key": ["a"]}))
                .expect("step");
        assert_eq!(step.key, RecordRequest::many(["a"]));
        assert_eq!(step.conn_id, "aerospike_default");
        assert_eq!(step.policy, Policy::key_send());

        let step: WriteStep = serde_json::from_value(json!({
            "namespace": "test", "set": "demo", "key": "k", "bins": {"a": 1},
            "metadata": {"ttl": 60}
        }))
        .expect("step");
        assert_eq!(step.policy, Policy::exists_ignore());
        assert_eq!(step.metadata, Some(WriteMeta::with_ttl(60)));
    }

    #[test]
    fn template_fields_match_step_kind() {
        assert_eq!(WriteStep::TEMPLATE_FIELDS, &["key", "bins", "metadata"]);
        assert_eq!(ReadStep::TEMPLATE_FIELDS, &["key"]);
        assert_eq!(PollStep::TEMPLATE_FIELDS, &["key"]);
    }
}
