//! Wire schema for the line-delimited JSON event stream a playbook process
//! writes to stdout: one JSON object per line, with a `type` discriminant.
//! A final line carries per-host stats. Unparsable lines are logged, not
//! fed to the reducer.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    PlayStart { play: String },
    PlayNoHosts,
    TaskStart {
        task: String,
        #[serde(default)]
        no_log: bool,
        #[serde(default)]
        args: Option<Value>,
    },
    TaskStartOnHost { task: String, host: String },
    TaskOk { task: String, host: String, result: Value },
    TaskOkItem {
        task: String,
        host: String,
        result: Value,
        #[serde(default)]
        item: Option<Value>,
    },
    TaskSkipped { task: String, host: String },
    TaskRetry { task: String, host: String, attempt: u32 },
    TaskFailed { task: String, host: String, result: Value },
    HostUnreachable { task: String, host: String, result: Value },
    VarPrompt { var: String },
    Stats { host_stats: BTreeMap<String, Value> },
}
