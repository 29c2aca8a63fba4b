//! Purpose: Uniform single/multi-key record access over an open client.
//! Exports: `RecordGateway`.
//! Role: Builds record keys, dispatches to single or batch client calls, checks result shape.
//! Invariants: Never opens a connection; an absent or closed client fails with `NotConnected`.
//! Invariants: `RecordRequest::One` yields `Single`, `RecordRequest::Many` yields `Many`
//! with one record per input key in input order.
//! Invariants: Parameter order is always namespace, set, key, payload, policy.
use crate::core::error::{Error, ErrorKind};
use crate::core::policy::Policy;
use crate::core::record::{Bins, Record, RecordKey, RecordRequest, RecordResult, WriteMeta};
use crate::core::store::StoreClient;
use tracing::debug;

type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Copy)]
pub struct RecordGateway<'a> {
    client: Option<&'a dyn StoreClient>,
}

impl<'a> RecordGateway<'a> {
    pub fn new(client: Option<&'a dyn StoreClient>) -> Self {
        Self { client }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some_and(|client| client.is_connected())
    }

    pub fn exists(
        &self,
        namespace: &str,
        set: &str,
        request: &RecordRequest,
        policy: &Policy,
    ) -> ApiResult<RecordResult<Record>> {
        let client = self.client()?;
        debug!(namespace, set, keys = request.len(), "checking existence");
        let result = match request {
            RecordRequest::One(key) => {
                let key = RecordKey::new(namespace, set, key.as_str());
                let record = client.exists(&key, policy)?;
                RecordResult::Single(check_key(record, &key, 0)?)
            }
            RecordRequest::Many(_) => {
                let keys = request.keys(namespace, set);
                let records = client.exists_many(&keys, policy)?;
                RecordResult::Many(check_batch(records, &keys, "exists")?)
            }
        };
        Ok(result.map(Record::into_existence))
    }

    pub fn get_record(
        &self,
        namespace: &str,
        set: &str,
        request: &RecordRequest,
        policy: &Policy,
    ) -> ApiResult<RecordResult<Record>> {
        let client = self.client()?;
        debug!(namespace, set, keys = request.len(), "reading records");
        match request {
            RecordRequest::One(key) => {
                let key = RecordKey::new(namespace, set, key.as_str());
                let record = client.get(&key, policy)?;
                Ok(RecordResult::Single(check_key(record, &key, 0)?))
            }
            RecordRequest::Many(_) => {
                let keys = request.keys(namespace, set);
                let records = client.get_many(&keys, policy)?;
                Ok(RecordResult::Many(check_batch(records, &keys, "get")?))
            }
        }
    }

    pub fn put(
        &self,
        namespace: &str,
        set: &str,
        key: &str,
        bins: &Bins,
        meta: &WriteMeta,
        policy: &Policy,
    ) -> ApiResult<()> {
        let client = self.client()?;
        let key = RecordKey::new(namespace, set, key);
        debug!(key = %key, bins = bins.len(), "writing record");
        client.put(&key, bins, meta, policy)
    }

    /// Reset a record's expiration without touching its bins.
    pub fn touch(
        &self,
        namespace: &str,
        set: &str,
        key: &str,
        ttl: i64,
        policy: Option<&Policy>,
    ) -> ApiResult<()> {
        let client = self.client()?;
        let key = RecordKey::new(namespace, set, key);
        debug!(key = %key, ttl, "touching record");
        client.touch(&key, ttl, policy)
    }

    fn client(&self) -> ApiResult<&'a dyn StoreClient> {
        match self.client {
            Some(client) if client.is_connected() => Ok(client),
            Some(_) => Err(Error::new(ErrorKind::NotConnected)
                .with_message("client connection has been closed")),
            None => Err(Error::new(ErrorKind::NotConnected)
                .with_message("client must be connected before issuing record operations")
                .with_hint("Acquire the connection (or open a scoped connection) first.")),
        }
    }
}

fn check_batch(records: Vec<Record>, keys: &[RecordKey], op: &str) -> ApiResult<Vec<Record>> {
    if records.len() != keys.len() {
        return Err(Error::new(ErrorKind::MalformedResult).with_message(format!(
            "{op} returned {} records for {} keys",
            records.len(),
            keys.len()
        )));
    }
    records
        .into_iter()
        .zip(keys)
        .enumerate()
        .map(|(index, (record, key))| check_key(record, key, index))
        .collect()
}

fn check_key(record: Record, expected: &RecordKey, index: usize) -> ApiResult<Record> {
    if record.key() != expected {
        return Err(Error::new(ErrorKind::MalformedResult)
            .with_message(format!(
                "record {index} carries key {}, expected {expected}",
                record.key()
            ))
            .with_key(expected.to_string()));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::RecordGateway;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::memory::{MemoryCluster, MemoryConnector};
    use crate::core::policy::Policy;
    use crate::core::record::{
        Bins, Record, RecordKey, RecordMetadata, RecordRequest, RecordResult, WriteMeta,
    };
    use crate::core::store::{ClientConfig, Connector, Host, StoreClient};
    use serde_json::json;

    fn memory_client(cluster: &MemoryCluster) -> Box<dyn StoreClient> {
        let config = ClientConfig {
            hosts: vec![Host {
                name: "localhost".to_string(),
                port: 3000,
            }],
        };
        MemoryConnector::new(cluster.clone())
            .connect(&config)
            .expect("connect")
    }

    fn bins(value: serde_json::Value) -> Bins {
        value.as_object().cloned().expect("object")
    }

    /// Returns the first requested key only, regardless of how many were asked for.
    struct TruncatingClient;

    impl StoreClient for TruncatingClient {
        fn exists(&self, key: &RecordKey, _policy: &Policy) -> Result<Record, Error> {
            Ok(Record::missing(key.clone()))
        }

        fn exists_many(&self, keys: &[RecordKey], policy: &Policy) -> Result<Vec<Record>, Error> {
            keys.iter().take(1).map(|key| self.exists(key, policy)).collect()
        }

        fn get(&self, key: &RecordKey, _policy: &Policy) -> Result<Record, Error> {
            let meta = RecordMetadata {
                generation: 1,
                ttl: 1,
            };
            Ok(Record::found(
                RecordKey::new(key.namespace(), key.set(), "other"),
                meta,
                Bins::new(),
            ))
        }

        fn put(&self, _: &RecordKey, _: &Bins, _: &WriteMeta, _: &Policy) -> Result<(), Error> {
            Ok(())
        }

        fn touch(&self, _: &RecordKey, _: i64, _: Option<&Policy>) -> Result<(), Error> {
            Ok(())
        }

        fn close(&self) -> Result<(), Error> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[test]
    fn operations_without_client_fail_not_connected() {
        let gateway = RecordGateway::new(None);
        let request = RecordRequest::one("k1");
        let policy = Policy::key_send();

        let errors = [
            gateway.exists("test", "demo", &request, &policy).err(),
            gateway.get_record("test", "demo", &request, &policy).err(),
            gateway
                .put("test", "demo", "k1", &Bins::new(), &WriteMeta::default(), &policy)
                .err(),
            gateway.touch("test", "demo", "k1", 10, None).err(),
        ];
        for err in errors {
            assert_eq!(err.expect("error").kind(), ErrorKind::NotConnected);
        }
    }

    #[test]
    fn closed_client_fails_not_connected() {
        let cluster = MemoryCluster::new();
        let client = memory_client(&cluster);
        client.close().expect("close");
        let gateway = RecordGateway::new(Some(client.as_ref()));
        let err = gateway
            .get_record("test", "demo", &RecordRequest::one("k1"), &Policy::key_send())
            .expect_err("closed");
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[test]
    fn single_request_yields_single_result() {
        let cluster = MemoryCluster::new();
        let client = memory_client(&cluster);
        let gateway = RecordGateway::new(Some(client.as_ref()));
        let result = gateway
            .exists("test", "demo", &RecordRequest::one("k1"), &Policy::key_send())
            .expect("exists");
        assert!(matches!(result, RecordResult::Single(ref record) if !record.exists()));
    }

    #[test]
    fn many_request_yields_ordered_many_result() {
        let cluster = MemoryCluster::new();
        let client = memory_client(&cluster);
        let gateway = RecordGateway::new(Some(client.as_ref()));
        gateway
            .put(
                "test",
                "demo",
                "k2",
                &bins(json!({"bin1": "value1"})),
                &WriteMeta::default(),
                &Policy::exists_ignore(),
            )
            .expect("put");

        let request = RecordRequest::many(["k3", "k2", "k1"]);
        let result = gateway
            .get_record("test", "demo", &request, &Policy::key_send())
            .expect("get");
        let RecordResult::Many(records) = result else {
            panic!("expected many");
        };
        let keys: Vec<_> = records.iter().map(|r| r.key().user_key()).collect();
        assert_eq!(keys, vec!["k3", "k2", "k1"]);
        assert_eq!(records[1].bins(), Some(&bins(json!({"bin1": "value1"}))));
        assert!(!records[0].exists());
    }

    #[test]
    fn exists_never_carries_bins() {
        let cluster = MemoryCluster::new();
        let client = memory_client(&cluster);
        let gateway = RecordGateway::new(Some(client.as_ref()));
        gateway
            .put(
                "test",
                "demo",
                "k1",
                &bins(json!({"a": 1})),
                &WriteMeta::default(),
                &Policy::exists_ignore(),
            )
            .expect("put");
        let result = gateway
            .exists("test", "demo", &RecordRequest::many(["k1"]), &Policy::key_send())
            .expect("exists");
        assert!(result.iter().all(|record| record.exists() && record.bins().is_none()));
    }

    #[test]
    fn short_batch_is_malformed() {
        let client = TruncatingClient;
        let gateway = RecordGateway::new(Some(&client));
        let err = gateway
            .exists("test", "demo", &RecordRequest::many(["k1", "k2"]), &Policy::key_send())
            .expect_err("short");
        assert_eq!(err.kind(), ErrorKind::MalformedResult);
        assert!(err.message().unwrap_or_default().contains("1 records for 2 keys"));
    }

    #[test]
    fn mismatched_key_is_malformed() {
        let client = TruncatingClient;
        let gateway = RecordGateway::new(Some(&client));
        let err = gateway
            .get_record("test", "demo", &RecordRequest::one("k1"), &Policy::key_send())
            .expect_err("mismatch");
        assert_eq!(err.kind(), ErrorKind::MalformedResult);
        assert_eq!(err.key(), Some("test/demo/k1"));
    }
}
