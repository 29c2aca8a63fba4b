//! Purpose: Opaque per-operation policy bag forwarded to the store client.
//! Exports: `Policy` and the well-known entry names/values.
//! Role: Carries consistency/key-echo/exists settings without interpreting them.
//! Invariants: Policies are immutable values; defaults are built fresh per call.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KEY: &str = "key";
pub const KEY_SEND: &str = "send";
pub const KEY_DIGEST: &str = "digest";

pub const EXISTS: &str = "exists";
pub const EXISTS_IGNORE: &str = "ignore";
pub const EXISTS_CREATE_ONLY: &str = "create_only";
pub const EXISTS_UPDATE_ONLY: &str = "update_only";
pub const EXISTS_REPLACE: &str = "replace";
pub const EXISTS_REPLACE_ONLY: &str = "replace_only";

/// Write-side generation check; `WriteMeta.generation` is ignored unless set.
pub const GEN: &str = "gen";
pub const GEN_IGNORE: &str = "ignore";
pub const GEN_EQ: &str = "eq";
pub const GEN_GT: &str = "gt";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policy {
    entries: Map<String, Value>,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default for reads and existence checks: echo the user key back.
    pub fn key_send() -> Self {
        Self::new().with(KEY, KEY_SEND)
    }

    /// Default for writes: create or update regardless of prior existence.
    pub fn exists_ignore() -> Self {
        Self::new().with(EXISTS, EXISTS_IGNORE)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.entries.get(name).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Map<String, Value>> for Policy {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}
