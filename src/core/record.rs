//! Purpose: Record addressing and result types shared by every backend.
//! Exports: `RecordKey`, `RecordRequest`, `RecordResult`, `Record`, `RecordMetadata`,
//! `WriteMeta`, `Bins`, `ERASE`, TTL constants.
//! Role: Typed replacement for tuple-shaped client results.
//! Invariants: A `RecordResult` has the arity of the `RecordRequest` that produced it.
//! Invariants: `Record::bins` is `Some` only for a found record with at least one bin.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Named fields of a record.
pub type Bins = Map<String, Value>;

/// Bin value that removes the bin when written. Erasing the last bin deletes the record.
pub const ERASE: Value = Value::Null;

/// Keep the namespace default expiration.
pub const TTL_NAMESPACE_DEFAULT: i64 = 0;
pub const TTL_NEVER_EXPIRE: i64 = -1;
/// Leave the record's current expiration untouched.
pub const TTL_DONT_UPDATE: i64 = -2;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RecordKey {
    namespace: String,
    set: String,
    user_key: String,
}

impl RecordKey {
    pub fn new(
        namespace: impl Into<String>,
        set: impl Into<String>,
        user_key: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set: set.into(),
            user_key: user_key.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn set(&self) -> &str {
        &self.set
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.set, self.user_key)
    }
}

/// Which records an operation addresses inside one namespace/set pair.
///
/// The variant decides the shape of the answer: `One` yields
/// `RecordResult::Single`, `Many` yields `RecordResult::Many` in input order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordRequest {
    One(String),
    Many(Vec<String>),
}

impl RecordRequest {
    pub fn one(key: impl Into<String>) -> Self {
        Self::One(key.into())
    }

    pub fn many<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Many(keys.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            RecordRequest::One(_) => 1,
            RecordRequest::Many(keys) => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_many(&self) -> bool {
        matches!(self, RecordRequest::Many(_))
    }

    pub fn keys(&self, namespace: &str, set: &str) -> Vec<RecordKey> {
        match self {
            RecordRequest::One(key) => vec![RecordKey::new(namespace, set, key.as_str())],
            RecordRequest::Many(keys) => keys
                .iter()
                .map(|key| RecordKey::new(namespace, set, key.as_str()))
                .collect(),
        }
    }
}

impl From<&str> for RecordRequest {
    fn from(key: &str) -> Self {
        Self::One(key.to_string())
    }
}

impl From<String> for RecordRequest {
    fn from(key: String) -> Self {
        Self::One(key)
    }
}

impl From<Vec<String>> for RecordRequest {
    fn from(keys: Vec<String>) -> Self {
        Self::Many(keys)
    }
}

impl From<Vec<&str>> for RecordRequest {
    fn from(keys: Vec<&str>) -> Self {
        Self::many(keys)
    }
}

/// Server-side bookkeeping returned alongside a found record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(rename = "gen")]
    pub generation: u32,
    /// Remaining seconds before expiry; `u32::MAX` when the record never expires.
    pub ttl: u32,
}

/// Write-side metadata: expiration and expected generation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct WriteMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(default, rename = "gen", skip_serializing_if = "Option::is_none")]
    pub generation: Option<u32>,
}

impl WriteMeta {
    pub fn with_ttl(ttl: i64) -> Self {
        Self {
            ttl: Some(ttl),
            generation: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    key: RecordKey,
    metadata: Option<RecordMetadata>,
    bins: Option<Bins>,
}

impl Record {
    pub fn missing(key: RecordKey) -> Self {
        Self {
            key,
            metadata: None,
            bins: None,
        }
    }

    pub fn found(key: RecordKey, metadata: RecordMetadata, bins: Bins) -> Self {
        Self {
            key,
            metadata: Some(metadata),
            bins: if bins.is_empty() { None } else { Some(bins) },
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn metadata(&self) -> Option<&RecordMetadata> {
        self.metadata.as_ref()
    }

    pub fn bins(&self) -> Option<&Bins> {
        self.bins.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.metadata.is_some()
    }

    /// Existence-check view of the record: key and metadata only.
    pub fn into_existence(self) -> Self {
        Self { bins: None, ..self }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordResult<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> RecordResult<T> {
    pub fn len(&self) -> usize {
        match self {
            RecordResult::Single(_) => 1,
            RecordResult::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            RecordResult::Single(item) => std::slice::from_ref(item).iter(),
            RecordResult::Many(items) => items.iter(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            RecordResult::Single(item) => vec![item],
            RecordResult::Many(items) => items,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> RecordResult<U> {
        match self {
            RecordResult::Single(item) => RecordResult::Single(f(item)),
            RecordResult::Many(items) => RecordResult::Many(items.into_iter().map(f).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Bins, Record, RecordKey, RecordMetadata, RecordRequest, RecordResult};
    use serde_json::json;

    #[test]
    fn request_keys_share_namespace_and_set() {
        let request = RecordRequest::from(vec!["k1", "k2"]);
        let keys = request.keys("test", "demo");
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].to_string(), "test/demo/k1");
        assert_eq!(keys[1].user_key(), "k2");
        assert!(request.is_many());
    }

    #[test]
    fn request_deserializes_string_or_list() {
        let one: RecordRequest = serde_json::from_value(json!("k1")).expect("one");
        assert_eq!(one, RecordRequest::one("k1"));
        let many: RecordRequest = serde_json::from_value(json!(["k1", "k2"])).expect("many");
        assert_eq!(many, RecordRequest::many(["k1", "k2"]));
    }

    #[test]
    fn found_record_without_bins_has_no_bins() {
        let key = RecordKey::new("test", "demo", "k1");
        let meta = RecordMetadata {
            generation: 1,
            ttl: 10,
        };
        let record = Record::found(key, meta, Bins::new());
        assert!(record.exists());
        assert!(record.bins().is_none());
    }

    #[test]
    fn single_result_iterates_once() {
        let result = RecordResult::Single(7);
        assert_eq!(result.iter().copied().collect::<Vec<_>>(), vec![7]);
        assert_eq!(result.into_vec(), vec![7]);
    }
}
