//! Purpose: Turn typed record results into transport-safe JSON and poll verdicts.
//! Exports: `record_mapping`, `records_to_mappings`, `all_exist`.
//! Role: Shared by the read step (mappings) and the poll step (boolean).
//! Invariants: Output order matches result order; a single result becomes a one-element list.
//! Invariants: A record without bins yields a mapping with no `bins` entry.
use crate::core::record::{Record, RecordMetadata, RecordResult};
use serde_json::{Map, Value, json};

pub fn record_mapping(record: &Record) -> Map<String, Value> {
    let key = record.key();
    let mut mapping = Map::new();
    mapping.insert("namespace".to_string(), json!(key.namespace()));
    mapping.insert("set".to_string(), json!(key.set()));
    mapping.insert("key".to_string(), json!(key.user_key()));
    mapping.insert(
        "metadata".to_string(),
        record.metadata().map_or(Value::Null, metadata_value),
    );
    if let Some(bins) = record.bins() {
        mapping.insert("bins".to_string(), Value::Object(bins.clone()));
    }
    mapping
}

pub fn records_to_mappings(result: &RecordResult<Record>) -> Vec<Value> {
    result
        .iter()
        .map(|record| Value::Object(record_mapping(record)))
        .collect()
}

/// True when every addressed record exists; partial presence is "not yet".
pub fn all_exist(result: &RecordResult<Record>) -> bool {
    match result {
        RecordResult::Single(record) => record.exists(),
        RecordResult::Many(records) => records.iter().all(Record::exists),
    }
}

fn metadata_value(metadata: &RecordMetadata) -> Value {
    json!({ "gen": metadata.generation, "ttl": metadata.ttl })
}
