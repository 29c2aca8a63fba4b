//! Purpose: Route parsed CLI commands to the record steps.
//! Role: Converts CLI arguments into step values; `main.rs` owns parsing and output policy.
//! Invariants: JSON arguments are validated before any connection is opened.
use super::{Command, RunOutcome, emit_json};
use aerostep::api::{
    Bins, Error, ErrorKind, Operator, Policy, PollStep, ReadStep, RecordKey, RecordRequest,
    Sensor, TaskContext, WriteMeta, WriteStep, field_behaviour, provider_info, to_exit_code,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub(super) fn dispatch_command(
    command: Command,
    context: &TaskContext,
    conn_id: &str,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Put {
            namespace,
            set,
            key,
            bins,
            metadata,
            policy,
        } => {
            let bins: Bins = parse_json_arg("--bins", &bins)?;
            let mut step = WriteStep::new(&namespace, &set, &key, bins).with_conn_id(conn_id);
            if let Some(metadata) = metadata {
                step = step.with_metadata(parse_json_arg::<WriteMeta>("--metadata", &metadata)?);
            }
            if let Some(policy) = policy {
                step = step.with_policy(parse_json_arg::<Policy>("--policy", &policy)?);
            }
            step.execute(context)?;
            let stored = RecordKey::new(namespace, set, key);
            emit_json(json!({ "stored": stored.to_string() }));
            Ok(RunOutcome::ok())
        }
        Command::Get {
            namespace,
            set,
            keys,
            list,
            policy,
        } => {
            let mut step = ReadStep::new(namespace, set, record_request(keys, list)?)
                .with_conn_id(conn_id);
            if let Some(policy) = policy {
                step = step.with_policy(parse_json_arg::<Policy>("--policy", &policy)?);
            }
            emit_json(step.execute(context)?);
            Ok(RunOutcome::ok())
        }
        Command::Exists {
            namespace,
            set,
            keys,
            list,
            policy,
        } => {
            let mut sensor = PollStep::new(namespace, set, record_request(keys, list)?)
                .with_conn_id(conn_id);
            if let Some(policy) = policy {
                sensor = sensor.with_policy(parse_json_arg::<Policy>("--policy", &policy)?);
            }
            let exists = sensor.poke(context)?;
            emit_json(json!({ "exists": exists }));
            Ok(RunOutcome::ok())
        }
        Command::Touch {
            namespace,
            set,
            key,
            ttl,
            policy,
        } => {
            let policy = policy
                .map(|raw| parse_json_arg::<Policy>("--policy", &raw))
                .transpose()?;
            let mut connection = context.connection(conn_id);
            connection.with_connection(|gateway| {
                gateway.touch(&namespace, &set, &key, ttl, policy.as_ref())
            })?;
            let touched = RecordKey::new(namespace, set, key);
            emit_json(json!({ "touched": touched.to_string(), "ttl": ttl }));
            Ok(RunOutcome::ok())
        }
        Command::TestConnection => {
            let check = context.connection(conn_id).test_connection();
            emit_json(json!({ "success": check.success, "message": check.message }));
            if check.success {
                Ok(RunOutcome::ok())
            } else {
                Ok(RunOutcome::with_code(to_exit_code(ErrorKind::Connection)))
            }
        }
        Command::ProviderInfo => {
            emit_json(json!({
                "provider": provider_info(),
                "field_behaviour": field_behaviour(),
            }));
            Ok(RunOutcome::ok())
        }
    }
}

fn record_request(keys: Vec<String>, list: bool) -> Result<RecordRequest, Error> {
    match keys.len() {
        0 => Err(Error::new(ErrorKind::Usage).with_message("at least one key is required")),
        1 if !list => Ok(RecordRequest::one(keys.into_iter().next().unwrap_or_default())),
        _ => Ok(RecordRequest::many(keys)),
    }
}

fn parse_json_arg<T: DeserializeOwned>(flag: &str, raw: &str) -> Result<T, Error> {
    let value: Value = serde_json::from_str(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{flag} is not valid JSON"))
            .with_hint(format!("Pass a JSON object, e.g. {flag} '{{\"name\": \"value\"}}'."))
            .with_source(err)
    })?;
    if !value.is_object() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{flag} must be a JSON object")));
    }
    serde_json::from_value(value).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{flag} has an unexpected shape"))
            .with_source(err)
    })
}
