//! Purpose: Blocking HTTP backend for a REST gateway fronting the cluster.
//! Exports: `RestConnector`, `RestClient`.
//! Role: Implements the store capabilities over JSON requests sent with `ureq`.
//! Invariants: Gateway base URL is `scheme://host:port/`; only http and https are accepted.
//! Invariants: HTTP 404 on a record read means "missing", never an error.
//! Invariants: Response bodies that are not record objects fail with `MalformedResult`.
//! Notes: Multi-key calls are issued one key at a time, in input order.
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind};
use crate::core::policy::{
    EXISTS, EXISTS_CREATE_ONLY, EXISTS_IGNORE, EXISTS_REPLACE, EXISTS_REPLACE_ONLY,
    EXISTS_UPDATE_ONLY, GEN, GEN_EQ, GEN_GT, GEN_IGNORE, KEY, KEY_SEND, Policy,
};
use crate::core::record::{Bins, Record, RecordKey, RecordMetadata, WriteMeta};
use crate::core::store::{ClientConfig, Connector, StoreClient};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

type ApiResult<T> = Result<T, Error>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct RestConnector {
    scheme: String,
    timeout: Duration,
}

impl RestConnector {
    pub fn new() -> Self {
        Self {
            scheme: "http".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for RestConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for RestConnector {
    fn connect(&self, config: &ClientConfig) -> ApiResult<Box<dyn StoreClient>> {
        let seed = config
            .hosts
            .first()
            .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("no seed hosts configured"))?;
        let base_url = normalize_base_url(&seed_url(&self.scheme, &seed.name, seed.port))?;
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let client = RestClient {
            base_url,
            agent,
            connected: AtomicBool::new(false),
        };
        client.probe()?;
        client.connected.store(true, Ordering::SeqCst);
        Ok(Box::new(client))
    }
}

pub struct RestClient {
    base_url: Url,
    agent: ureq::Agent,
    connected: AtomicBool,
}

#[derive(Deserialize)]
struct GatewayError {
    message: Option<String>,
}

impl RestClient {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn probe(&self) -> ApiResult<()> {
        let url = build_url(&self.base_url, &["v1", "cluster"])?;
        debug!(url = %url, "probing gateway");
        match self.agent.get(url.as_str()).call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, resp)) => Err(Error::new(ErrorKind::Connection)
                .with_message(format!(
                    "gateway rejected cluster probe: {}",
                    error_detail(code, resp)
                ))),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Connection)
                .with_message("gateway is unreachable")
                .with_source(err)),
        }
    }

    fn ensure_connected(&self) -> ApiResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::NotConnected).with_message("client has been closed"))
        }
    }

    fn record_url(&self, area: &str, key: &RecordKey) -> ApiResult<Url> {
        build_url(
            &self.base_url,
            &["v1", area, key.namespace(), key.set(), key.user_key()],
        )
    }

    fn read(&self, key: &RecordKey, policy: &Policy) -> ApiResult<Record> {
        self.ensure_connected()?;
        let url = self.record_url("kvs", key)?;
        let mut request = self
            .agent
            .get(url.as_str())
            .set("Accept", "application/json");
        for (name, value) in policy_query(policy) {
            request = request.query(&name, &value);
        }
        match request.call() {
            Ok(resp) => {
                let body = resp.into_string().map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to read response body")
                        .with_key(key.to_string())
                        .with_source(err)
                })?;
                let value: Value = serde_json::from_str(&body).map_err(|err| {
                    Error::new(ErrorKind::MalformedResult)
                        .with_message("gateway returned invalid json")
                        .with_key(key.to_string())
                        .with_source(err)
                })?;
                record_from_value(key, &value)
            }
            Err(ureq::Error::Status(404, _)) => Ok(Record::missing(key.clone())),
            Err(err) => Err(request_error(err, key)),
        }
    }
}

impl StoreClient for RestClient {
    fn exists(&self, key: &RecordKey, policy: &Policy) -> ApiResult<Record> {
        self.read(key, policy).map(Record::into_existence)
    }

    fn get(&self, key: &RecordKey, policy: &Policy) -> ApiResult<Record> {
        self.read(key, policy)
    }

    fn put(
        &self,
        key: &RecordKey,
        bins: &Bins,
        meta: &WriteMeta,
        policy: &Policy,
    ) -> ApiResult<()> {
        self.ensure_connected()?;
        let url = self.record_url("kvs", key)?;
        let mut request = self
            .agent
            .put(url.as_str())
            .set("Content-Type", "application/json");
        for (name, value) in policy_query(policy) {
            request = request.query(&name, &value);
        }
        if let Some(ttl) = meta.ttl {
            request = request.query("expiration", &ttl.to_string());
        }
        if let Some(generation) = meta.generation {
            request = request.query("generation", &generation.to_string());
        }
        let payload = Value::Object(bins.clone()).to_string();
        request
            .send_string(&payload)
            .map(|_| ())
            .map_err(|err| request_error(err, key))
    }

    fn touch(&self, key: &RecordKey, ttl: i64, policy: Option<&Policy>) -> ApiResult<()> {
        self.ensure_connected()?;
        let url = self.record_url("operate", key)?;
        let mut request = self
            .agent
            .post(url.as_str())
            .set("Content-Type", "application/json")
            .query("expiration", &ttl.to_string());
        if let Some(policy) = policy {
            for (name, value) in policy_query(policy) {
                request = request.query(&name, &value);
            }
        }
        let payload = json!({ "opsList": [{ "operationType": "TOUCH", "opValues": {} }] });
        request
            .send_string(&payload.to_string())
            .map(|_| ())
            .map_err(|err| request_error(err, key))
    }

    fn close(&self) -> ApiResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

fn normalize_base_url(raw: &str) -> ApiResult<Url> {
    let mut url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid gateway base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(
            Error::new(ErrorKind::Usage).with_message("gateway url must use http or https scheme")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// IPv6 literals need brackets in the authority.
fn seed_url(scheme: &str, host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("{scheme}://[{host}]:{port}")
    } else {
        format!("{scheme}://{host}:{port}")
    }
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("gateway url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

/// Query parameters for a policy: well-known entries are renamed, other scalars pass through.
fn policy_query(policy: &Policy) -> Vec<(String, String)> {
    let mut params = Vec::new();
    for (name, value) in policy.iter() {
        match (name, value) {
            (KEY, Value::String(mode)) => {
                params.push(("sendKey".to_string(), (mode == KEY_SEND).to_string()));
            }
            (EXISTS, Value::String(action)) => {
                params.push(("recordExistsAction".to_string(), exists_action(action)));
            }
            (GEN, Value::String(mode)) => {
                params.push(("generationPolicy".to_string(), generation_policy(mode)));
            }
            (_, Value::String(text)) => params.push((name.to_string(), text.clone())),
            (_, Value::Number(number)) => params.push((name.to_string(), number.to_string())),
            (_, Value::Bool(flag)) => params.push((name.to_string(), flag.to_string())),
            _ => {}
        }
    }
    params
}

fn exists_action(action: &str) -> String {
    match action {
        EXISTS_IGNORE => "UPDATE".to_string(),
        EXISTS_CREATE_ONLY => "CREATE_ONLY".to_string(),
        EXISTS_UPDATE_ONLY => "UPDATE_ONLY".to_string(),
        EXISTS_REPLACE => "REPLACE".to_string(),
        EXISTS_REPLACE_ONLY => "REPLACE_ONLY".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

fn generation_policy(mode: &str) -> String {
    match mode {
        GEN_IGNORE => "NONE".to_string(),
        GEN_EQ => "EXPECT_GEN_EQUAL".to_string(),
        GEN_GT => "EXPECT_GEN_GT".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

fn record_from_value(key: &RecordKey, value: &Value) -> ApiResult<Record> {
    let malformed = || {
        Error::new(ErrorKind::MalformedResult)
            .with_message(format!(
                "expected record object with generation and ttl, got {}",
                shape_of(value)
            ))
            .with_key(key.to_string())
    };
    let object = value.as_object().ok_or_else(malformed)?;
    let generation = object
        .get("generation")
        .and_then(Value::as_u64)
        .and_then(|generation| u32::try_from(generation).ok())
        .ok_or_else(malformed)?;
    let ttl = object
        .get("ttl")
        .and_then(Value::as_i64)
        .ok_or_else(malformed)?;
    let ttl = if ttl < 0 {
        u32::MAX
    } else {
        u32::try_from(ttl).unwrap_or(u32::MAX - 1)
    };
    let bins = match object.get("bins") {
        Some(Value::Object(bins)) => bins.clone(),
        Some(Value::Null) | None => Bins::new(),
        Some(_) => return Err(malformed()),
    };
    Ok(Record::found(key.clone(), RecordMetadata { generation, ttl }, bins))
}

fn shape_of(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("array of {} elements", items.len()),
        Value::Object(map) if map.is_empty() => "empty object".to_string(),
        Value::Object(_) => "object without record fields".to_string(),
    }
}

fn request_error(err: ureq::Error, key: &RecordKey) -> Error {
    match err {
        ureq::Error::Status(code, resp) => Error::new(ErrorKind::Store)
            .with_message(error_detail(code, resp))
            .with_key(key.to_string()),
        ureq::Error::Transport(err) => Error::new(ErrorKind::Io)
            .with_message("request failed")
            .with_key(key.to_string())
            .with_source(err),
    }
}

fn error_detail(status: u16, response: ureq::Response) -> String {
    let body = response.into_string().unwrap_or_default();
    match serde_json::from_str::<GatewayError>(&body) {
        Ok(GatewayError {
            message: Some(message),
        }) => format!("gateway error status {status}: {message}"),
        _ => format!("gateway error status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        RestConnector, build_url, normalize_base_url, policy_query, record_from_value, seed_url,
    };
    use crate::core::error::ErrorKind;
    use crate::core::policy::{self, Policy};
    use crate::core::record::RecordKey;
    use crate::core::store::{ClientConfig, Connector, Host};
    use serde_json::json;

    fn key() -> RecordKey {
        RecordKey::new("test", "demo", "k1")
    }

    #[test]
    fn base_url_rejects_other_schemes() {
        let err = normalize_base_url("ftp://localhost:3000").expect_err("scheme");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let url = normalize_base_url("http://localhost:3000/extra?x=1").expect("url");
        assert_eq!(url.as_str(), "http://localhost:3000/");
    }

    #[test]
    fn ipv6_seed_hosts_are_bracketed() {
        let url = normalize_base_url(&seed_url("http", "::1", 8080)).expect("url");
        assert_eq!(url.as_str(), "http://[::1]:8080/");
        let url = normalize_base_url(&seed_url("http", "[fe80::1]", 3000)).expect("url");
        assert_eq!(url.as_str(), "http://[fe80::1]:3000/");
        let url = normalize_base_url(&seed_url("https", "db.internal", 3000)).expect("url");
        assert_eq!(url.as_str(), "https://db.internal:3000/");
    }

    #[test]
    fn record_url_escapes_user_keys() {
        let base = normalize_base_url("http://localhost:8080").expect("url");
        let url = build_url(&base, &["v1", "kvs", "test", "demo", "a b/c"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/v1/kvs/test/demo/a%20b%2Fc");
    }

    #[test]
    fn policy_query_translates_known_entries() {
        let policy = Policy::key_send()
            .with(policy::EXISTS, policy::EXISTS_CREATE_ONLY)
            .with("totalTimeout", 500)
            .with("nested", json!({"ignored": true}));
        let mut params = policy_query(&policy);
        params.sort();
        assert_eq!(
            params,
            vec![
                ("recordExistsAction".to_string(), "CREATE_ONLY".to_string()),
                ("sendKey".to_string(), "true".to_string()),
                ("totalTimeout".to_string(), "500".to_string()),
            ]
        );
    }

    #[test]
    fn gen_policy_maps_to_generation_policy_param() {
        let params = policy_query(&Policy::new().with(policy::GEN, policy::GEN_EQ));
        assert_eq!(
            params,
            vec![("generationPolicy".to_string(), "EXPECT_GEN_EQUAL".to_string())]
        );
        let params = policy_query(&Policy::exists_ignore());
        assert!(params.iter().all(|(name, _)| name != "generationPolicy"));
    }

    #[test]
    fn record_body_decodes_bins_and_metadata() {
        let body = json!({"bins": {"bin1": "value1"}, "generation": 4, "ttl": -1});
        let record = record_from_value(&key(), &body).expect("record");
        let meta = record.metadata().expect("meta");
        assert_eq!(meta.generation, 4);
        assert_eq!(meta.ttl, u32::MAX);
        assert_eq!(record.bins().and_then(|bins| bins.get("bin1")), Some(&json!("value1")));
    }

    #[test]
    fn record_body_without_bins_is_found_without_bins() {
        let body = json!({"generation": 1, "ttl": 30});
        let record = record_from_value(&key(), &body).expect("record");
        assert!(record.exists());
        assert!(record.bins().is_none());
    }

    #[test]
    fn empty_object_is_malformed() {
        let err = record_from_value(&key(), &json!({})).expect_err("malformed");
        assert_eq!(err.kind(), ErrorKind::MalformedResult);
        assert!(err.message().unwrap_or_default().contains("empty object"));

        let tuple = json!([["test", "demo", "k1"], null]);
        let err = record_from_value(&key(), &tuple).expect_err("array");
        assert!(err.message().unwrap_or_default().contains("array of 2 elements"));
    }

    #[test]
    fn unreachable_gateway_fails_to_connect() {
        let config = ClientConfig {
            hosts: vec![Host {
                name: "127.0.0.1".to_string(),
                port: 9,
            }],
        };
        let err = RestConnector::new()
            .with_timeout(std::time::Duration::from_millis(500))
            .connect(&config)
            .err()
            .expect("unreachable");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
