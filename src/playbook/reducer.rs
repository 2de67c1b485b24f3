//! The callback-as-reducer: a pure fold over the playbook's event stream.
//!
//! The upstream executor registered mutable callback objects on the
//! playbook runner; here that becomes `(State, Event) -> State` with an
//! outbound `emit` closure for progress events. The reducer and the runner
//! share no mutable state.

use crate::cmd::CommandError;
use crate::errors::{FailureCode, FailureDetails};
use crate::playbook::event::RawEvent;
use crate::progress::{ProgressEvent, TaskResult};
use crate::request::TopologyMap;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum PlaybookError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("playbook process exited without emitting a final result")]
    NoResult,
    #[error("{0}")]
    Reduced(FailureDetails),
}

#[derive(Debug, Clone)]
pub struct ReducerConfig {
    pub output_prefix: String,
    pub topology_prefix: String,
    pub log_progress_events: bool,
}

/// Final, classified result of reducing one playbook run.
#[derive(Debug, Clone)]
pub struct ReducerOutcome {
    pub failed: bool,
    pub unreachable: bool,
    pub failure: Option<FailureDetails>,
    pub outputs: BTreeMap<String, Value>,
    pub associated_topology: TopologyMap,
}

impl ReducerOutcome {
    pub fn is_success(&self) -> bool {
        !self.failed && !self.unreachable
    }
}

pub struct EventReducer {
    config: ReducerConfig,
    failed: bool,
    unreachable: bool,
    failure: Option<FailureDetails>,
    outputs: BTreeMap<String, Value>,
    associated_topology: TopologyMap,
    plays: Vec<String>,
    last_play: Option<String>,
    saw_stats: bool,
}

impl EventReducer {
    pub fn new(config: ReducerConfig) -> Self {
        EventReducer {
            config,
            failed: false,
            unreachable: false,
            failure: None,
            outputs: BTreeMap::new(),
            associated_topology: TopologyMap::new(),
            plays: Vec::new(),
            last_play: None,
            saw_stats: false,
        }
    }

    pub fn handle(&mut self, event: RawEvent, emit: &mut dyn FnMut(ProgressEvent)) {
        match event {
            RawEvent::PlayStart { play } => {
                self.plays.push(play.clone());
                self.last_play = Some(play.clone());
                self.send(emit, ProgressEvent::PlayStarted { play_name: play });
            }
            RawEvent::PlayNoHosts => {
                let play_name = self.last_play.clone().unwrap_or_default();
                self.send(emit, ProgressEvent::PlayMatchedNoHosts { play_name });
            }
            RawEvent::TaskStart { task, no_log, args } => {
                self.send(
                    emit,
                    ProgressEvent::TaskStarted {
                        task_name: task,
                        args_hidden: no_log,
                        args: if no_log { None } else { args },
                    },
                );
            }
            RawEvent::TaskStartOnHost { task, host } => {
                self.send(emit, ProgressEvent::TaskStartedOnHost { task_name: task, host });
            }
            RawEvent::TaskOk { task, host, result } => {
                self.extract_facts(&result);
                self.send(
                    emit,
                    ProgressEvent::TaskCompletedOnHost {
                        task_name: task,
                        host,
                        result: as_result_dict(&result),
                        item_label: None,
                    },
                );
            }
            RawEvent::TaskOkItem { task, host, result, item } => {
                self.extract_facts(&result);
                self.send(
                    emit,
                    ProgressEvent::TaskCompletedOnHost {
                        task_name: task,
                        host,
                        result: as_result_dict(&result),
                        item_label: Some(item_label(item.as_ref())),
                    },
                );
            }
            RawEvent::TaskSkipped { task, host } => {
                self.send(emit, ProgressEvent::TaskSkippedOnHost { task_name: task, host });
            }
            RawEvent::TaskRetry { task, host, attempt } => {
                self.send(emit, ProgressEvent::TaskRetryOnHost { task_name: task, host, attempt });
            }
            RawEvent::TaskFailed { task, host, result } => {
                if is_unreachable(&result) {
                    self.mark_unreachable(&task, &result);
                    self.send(
                        emit,
                        ProgressEvent::HostUnreachable {
                            task_name: task,
                            host,
                            result: as_result_dict(&result),
                        },
                    );
                } else {
                    self.mark_failed(&task, &result);
                    self.send(
                        emit,
                        ProgressEvent::TaskFailedOnHost {
                            task_name: task,
                            host,
                            result: as_result_dict(&result),
                        },
                    );
                }
            }
            RawEvent::HostUnreachable { task, host, result } => {
                self.mark_unreachable(&task, &result);
                self.send(
                    emit,
                    ProgressEvent::HostUnreachable {
                        task_name: task,
                        host,
                        result: as_result_dict(&result),
                    },
                );
            }
            RawEvent::VarPrompt { var } => {
                self.send(emit, ProgressEvent::VarPrompt { var_name: var.clone() });
                // prompts can never be satisfied by an unattended run
                self.failed = true;
                self.failure.get_or_insert(FailureDetails::new(
                    FailureCode::InternalError,
                    format!("playbook requested an interactive variable prompt for '{var}'"),
                ));
            }
            RawEvent::Stats { host_stats } => {
                self.saw_stats = true;
                self.send(
                    emit,
                    ProgressEvent::PlaybookResult {
                        plays: self.plays.clone(),
                        host_stats,
                    },
                );
            }
        }
    }

    fn send(&self, emit: &mut dyn FnMut(ProgressEvent), event: ProgressEvent) {
        if self.config.log_progress_events {
            emit(event);
        }
    }

    fn mark_failed(&mut self, task: &str, result: &Value) {
        if self.failed || self.unreachable {
            return;
        }
        self.failed = true;
        self.failure = Some(FailureDetails::new(
            FailureCode::InfrastructureError,
            format!("task {task} failed: {result}"),
        ));
    }

    fn mark_unreachable(&mut self, task: &str, result: &Value) {
        if self.failed || self.unreachable {
            return;
        }
        self.unreachable = true;
        self.failure = Some(FailureDetails::new(
            FailureCode::ResourceNotFound,
            format!("Resource unreachable (task {task} failed: {result})"),
        ));
    }

    fn extract_facts(&mut self, result: &Value) {
        let facts_list = gather_facts(result);
        for facts in facts_list {
            let Value::Object(map) = facts else { continue };
            for (key, value) in map {
                if let Some(rest) = key.strip_prefix(self.config.output_prefix.as_str()) {
                    self.outputs.insert(rest.to_string(), value);
                } else if let Some(rest) = key.strip_prefix(self.config.topology_prefix.as_str()) {
                    self.insert_topology_from_encoded(rest, &value);
                } else if key == "associated_topology" {
                    if let Value::Object(entries) = &value {
                        for (name, entry) in entries {
                            if let Some(topology_entry) = decode_topology_object(entry) {
                                self.associated_topology.insert(name.clone(), topology_entry);
                            }
                        }
                    }
                }
            }
        }
    }

    fn insert_topology_from_encoded(&mut self, name: &str, value: &Value) {
        let Some(encoded) = value.as_str() else {
            tracing::warn!(name, "topology fact value is not a string, skipping");
            return;
        };

        match encoded.rsplit_once("__") {
            Some((id, ty)) if !id.is_empty() && !ty.is_empty() => {
                self.associated_topology.insert(
                    name.to_string(),
                    crate::request::TopologyEntry {
                        id: id.to_string(),
                        entry_type: ty.to_string(),
                    },
                );
            }
            _ => {
                tracing::warn!(name, encoded, "malformed associated topology encoding, skipping");
            }
        }
    }

    pub fn finish(self) -> Result<ReducerOutcome, PlaybookError> {
        if !self.saw_stats && !self.failed && !self.unreachable {
            return Err(PlaybookError::NoResult);
        }

        Ok(ReducerOutcome {
            failed: self.failed,
            unreachable: self.unreachable,
            failure: self.failure,
            outputs: self.outputs,
            associated_topology: self.associated_topology,
        })
    }
}

fn gather_facts(result: &Value) -> Vec<Value> {
    let mut out = Vec::new();
    if let Some(facts) = result.get("ansible_facts") {
        out.push(facts.clone());
    }
    if let Some(Value::Array(results)) = result.get("results") {
        for item in results {
            if let Some(facts) = item.get("ansible_facts") {
                out.push(facts.clone());
            }
        }
    }
    out
}

fn decode_topology_object(entry: &Value) -> Option<crate::request::TopologyEntry> {
    Some(crate::request::TopologyEntry {
        id: entry.get("id")?.as_str()?.to_string(),
        entry_type: entry.get("type")?.as_str()?.to_string(),
    })
}

fn as_result_dict(result: &Value) -> TaskResult {
    match result {
        Value::Object(map) => map.clone().into_iter().collect(),
        other => BTreeMap::from([("value".to_string(), other.clone())]),
    }
}

fn item_label(item: Option<&Value>) -> String {
    match item {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn is_unreachable(result: &Value) -> bool {
    let msg = result.get("msg").and_then(Value::as_str).unwrap_or("");
    if msg.contains("Timeout") && msg.contains("waiting for privilege escalation prompt") {
        return true;
    }

    let stderr = result.get("module_stderr").and_then(Value::as_str).unwrap_or("");
    stderr.starts_with("ssh:") && stderr.contains("Host is unreachable")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reducer() -> EventReducer {
        EventReducer::new(ReducerConfig {
            output_prefix: "output__".to_string(),
            topology_prefix: "associated_topology__".to_string(),
            log_progress_events: true,
        })
    }

    #[test]
    fn happy_path_extracts_output() {
        let mut r = reducer();
        let mut events = Vec::new();
        r.handle(RawEvent::PlayStart { play: "install".to_string() }, &mut |e| events.push(e));
        r.handle(
            RawEvent::TaskOk {
                task: "set facts".to_string(),
                host: "web1".to_string(),
                result: serde_json::json!({"ansible_facts": {"output__msg": "hello there!"}}),
            },
            &mut |e| events.push(e),
        );
        r.handle(
            RawEvent::Stats {
                host_stats: BTreeMap::new(),
            },
            &mut |e| events.push(e),
        );

        let outcome = r.finish().unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.outputs.get("msg").unwrap(), "hello there!");
        assert!(matches!(events[0], ProgressEvent::PlayStarted { .. }));
    }

    #[test]
    fn topology_extraction_splits_on_last_double_underscore() {
        let mut r = reducer();
        r.handle(
            RawEvent::TaskOk {
                task: "create".to_string(),
                host: "web1".to_string(),
                result: serde_json::json!({"ansible_facts": {
                    "associated_topology__apache1": "12345678__Openstack",
                    "associated_topology__apache2": "910111213__Openstack",
                    "output__public_ip": "10.21.28.94"
                }}),
            },
            &mut |_| {},
        );
        r.handle(RawEvent::Stats { host_stats: BTreeMap::new() }, &mut |_| {});

        let outcome = r.finish().unwrap();
        assert_eq!(outcome.associated_topology["apache1"].id, "12345678");
        assert_eq!(outcome.associated_topology["apache1"].entry_type, "Openstack");
        assert_eq!(outcome.outputs["public_ip"], "10.21.28.94");
    }

    #[test]
    fn malformed_topology_encoding_is_skipped_not_failed() {
        let mut r = reducer();
        r.handle(
            RawEvent::TaskOk {
                task: "create".to_string(),
                host: "web1".to_string(),
                result: serde_json::json!({"ansible_facts": {"associated_topology__x": "abc"}}),
            },
            &mut |_| {},
        );
        r.handle(RawEvent::Stats { host_stats: BTreeMap::new() }, &mut |_| {});

        let outcome = r.finish().unwrap();
        assert!(outcome.is_success());
        assert!(outcome.associated_topology.is_empty());
    }

    #[test]
    fn timeout_waiting_for_privilege_escalation_is_unreachable_not_failed() {
        let mut r = reducer();
        r.handle(
            RawEvent::TaskFailed {
                task: "connect".to_string(),
                host: "web1".to_string(),
                result: serde_json::json!({"msg": "Timeout (12s) waiting for privilege escalation prompt"}),
            },
            &mut |_| {},
        );
        r.handle(RawEvent::Stats { host_stats: BTreeMap::new() }, &mut |_| {});

        let outcome = r.finish().unwrap();
        assert!(outcome.unreachable);
        assert!(!outcome.failed);
        assert_eq!(outcome.failure.unwrap().code, FailureCode::ResourceNotFound);
    }

    #[test]
    fn first_failure_wins() {
        let mut r = reducer();
        r.handle(
            RawEvent::TaskFailed {
                task: "first".to_string(),
                host: "web1".to_string(),
                result: serde_json::json!({"msg": "invalid machine"}),
            },
            &mut |_| {},
        );
        r.handle(
            RawEvent::TaskFailed {
                task: "second".to_string(),
                host: "web1".to_string(),
                result: serde_json::json!({"msg": "some other problem"}),
            },
            &mut |_| {},
        );
        r.handle(RawEvent::Stats { host_stats: BTreeMap::new() }, &mut |_| {});

        let outcome = r.finish().unwrap();
        assert!(outcome.failed);
        assert!(outcome.failure.unwrap().description.contains("first"));
    }

    #[test]
    fn no_log_hides_args() {
        let mut r = reducer();
        let mut events = Vec::new();
        r.handle(
            RawEvent::TaskStart {
                task: "login".to_string(),
                no_log: true,
                args: Some(serde_json::json!({"password": "secret"})),
            },
            &mut |e| events.push(e),
        );

        match &events[0] {
            ProgressEvent::TaskStarted { args_hidden, args, .. } => {
                assert!(*args_hidden);
                assert!(args.is_none());
            }
            _ => panic!("expected TaskStarted"),
        }
    }

    #[test]
    fn no_result_without_stats_is_an_error() {
        let r = reducer();
        assert!(matches!(r.finish(), Err(PlaybookError::NoResult)));
    }
}
