//! Purpose: Static metadata describing this integration to an orchestrator.
//! Exports: `ProviderInfo`, `provider_info`, `FieldBehaviour`, `field_behaviour`.
//! Role: Informational only; nothing in the record path reads it.
//! Invariants: Credential fields stay hidden; only host and port are edited.
use crate::core::profile::DEFAULT_PORT;
use serde::Serialize;
use std::collections::BTreeMap;

pub const CONN_TYPE: &str = "aerospike";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProviderInfo {
    pub package_name: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub conn_type: &'static str,
}

pub fn provider_info() -> ProviderInfo {
    ProviderInfo {
        package_name: env!("CARGO_PKG_NAME"),
        name: "Aerospike Provider",
        description: "Read, write and poll Aerospike records as pipeline steps.",
        version: env!("CARGO_PKG_VERSION"),
        conn_type: CONN_TYPE,
    }
}

/// How the connection-profile editor should render its form.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldBehaviour {
    pub hidden_fields: Vec<&'static str>,
    pub relabeling: BTreeMap<&'static str, &'static str>,
    pub placeholders: BTreeMap<&'static str, String>,
}

pub fn field_behaviour() -> FieldBehaviour {
    FieldBehaviour {
        hidden_fields: vec!["schema", "login", "password"],
        relabeling: BTreeMap::from([("host", "host"), ("port", "port")]),
        placeholders: BTreeMap::from([
            ("port", DEFAULT_PORT.to_string()),
            (
                "host",
                "cluster node address (The client will learn about the other nodes in the \
                 cluster from the seed node)"
                    .to_string(),
            ),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::{field_behaviour, provider_info};

    #[test]
    fn credentials_are_hidden() {
        let behaviour = field_behaviour();
        assert_eq!(behaviour.hidden_fields, vec!["schema", "login", "password"]);
        assert_eq!(behaviour.placeholders.get("port").map(String::as_str), Some("3000"));
        assert!(behaviour.placeholders["host"].contains("seed node"));
    }

    #[test]
    fn provider_info_serializes_snake_case() {
        let value = serde_json::to_value(provider_info()).expect("json");
        assert_eq!(value["package_name"], "aerostep");
        assert_eq!(value["conn_type"], "aerospike");
    }
}
