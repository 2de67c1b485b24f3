//! Best-effort progress events interleaved with the final outcome.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A sanitised task result dict, as handed to [`ProgressEvent::TaskCompletedOnHost`]
/// and [`ProgressEvent::TaskFailedOnHost`]. Kept as opaque JSON: the reducer
/// doesn't need to interpret its shape, only to classify and forward it.
pub type TaskResult = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProgressEvent {
    PlayStarted { play_name: String },
    PlayMatchedNoHosts { play_name: String },
    TaskStarted {
        task_name: String,
        args_hidden: bool,
        args: Option<serde_json::Value>,
    },
    TaskStartedOnHost { task_name: String, host: String },
    TaskCompletedOnHost {
        task_name: String,
        host: String,
        result: TaskResult,
        item_label: Option<String>,
    },
    TaskFailedOnHost {
        task_name: String,
        host: String,
        result: TaskResult,
    },
    TaskSkippedOnHost { task_name: String, host: String },
    TaskRetryOnHost { task_name: String, host: String, attempt: u32 },
    HostUnreachable { task_name: String, host: String, result: TaskResult },
    VarPrompt { var_name: String },
    PlaybookResult {
        plays: Vec<String>,
        host_stats: BTreeMap<String, serde_json::Value>,
    },
}
