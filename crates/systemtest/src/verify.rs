//! Checks over the JSON lines printed by the verifiable producer and consumer.

use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::cluster::ClusterApi;
use crate::diagnostics::indent;
use crate::poll::job_pod_name;
use crate::{Error, Result};

fn json_records(log: &str) -> Result<Vec<Value>> {
    let line = Regex::new(r"(?m)^\{.*\}$").map_err(|e| Error::Configuration(e.to_string()))?;
    Ok(line
        .find_iter(log)
        .filter_map(|m| serde_json::from_str(m.as_str()).ok())
        .collect())
}

fn text(record: &Value, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn expect_count(record: &Value, field: &str, expected: u32, what: &str) -> Result<()> {
    let actual = text(record, field);
    if actual == expected.to_string() {
        Ok(())
    } else {
        Err(Error::HardFailure {
            description: what.to_string(),
            reason: format!("expected {field}={expected}, got {actual:?}"),
        })
    }
}

/// Verify a ping log: the producer sent and had acked, and the consumer
/// consumed, exactly `messages` records.
pub fn check_pings(messages: u32, log: &str) -> Result<()> {
    let mut produced = false;
    let mut consumed = false;
    for record in json_records(log)? {
        match text(&record, "name").as_str() {
            "tool_data" => {
                expect_count(&record, "sent", messages, "producer")?;
                expect_count(&record, "acked", messages, "producer")?;
                produced = true;
            }
            "records_consumed" => {
                expect_count(&record, "count", messages, "consumer")?;
                consumed = true;
            }
            _ => {}
        }
    }
    if !produced {
        return Err(Error::HardFailure {
            description: "producer".to_string(),
            reason: "The producer didn't send any messages (no tool_data message)".to_string(),
        });
    }
    if !consumed {
        return Err(no_records_consumed());
    }
    Ok(())
}

/// Verify a consumer log consumed exactly `messages` records.
pub fn check_records_consumed(messages: u32, log: &str) -> Result<()> {
    let mut consumed = false;
    for record in json_records(log)? {
        if text(&record, "name") == "records_consumed" {
            expect_count(&record, "count", messages, "consumer")?;
            consumed = true;
        }
    }
    if consumed {
        Ok(())
    } else {
        Err(no_records_consumed())
    }
}

fn no_records_consumed() -> Error {
    Error::HardFailure {
        description: "consumer".to_string(),
        reason: "The consumer didn't consume any messages (no records_consumed message)".to_string(),
    }
}

/// Fetch the log of `job`'s pod and run `check` over it, dumping the log on failure.
pub async fn check_job_output(
    cluster: &dyn ClusterApi,
    namespace: &str,
    job: &str,
    check: impl FnOnce(&str) -> Result<()>,
) -> Result<()> {
    let pod = job_pod_name(cluster, namespace, job).await?;
    let log = cluster.pod_logs(namespace, &pod, None).await?;
    check(&log).inspect_err(|_| {
        info!(pod = %pod, "log from pod:\n----\n{}\n----", indent(&log));
    })
}
