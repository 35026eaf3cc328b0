//! Task lifecycle for asynchronous command invocations.
//!
//! A [`TaskHandle`] is the only way a running body communicates: every
//! mutation updates the status under a lock, then enqueues a snapshot on
//! the handle's update channel. Interactive invocations share the UI
//! channel consumed by the listener; sequence steps get a private channel
//! the player blocks on.

pub mod listener;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

pub const STATUS_INITIATED: &str = "initiated";

/// Snapshot of one asynchronous invocation.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    /// Session-scoped ordinal, e.g. "#1".
    pub id: String,
    /// Fully-qualified name of the owning command.
    pub cmd: String,
    /// Latest human-readable progress line.
    pub message: String,
    pub error: Option<String>,
    pub done: bool,
    /// Opaque completion payload; for request commands, the decoded
    /// response body.
    pub result: Option<Value>,
    /// Append-only accumulated output.
    pub output: String,
    pub created_at: DateTime<Utc>,
}

impl TaskStatus {
    fn new(id: String, cmd: String) -> Self {
        Self {
            id,
            cmd,
            message: STATUS_INITIATED.to_string(),
            error: None,
            done: false,
            result: None,
            output: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }
}

/// Updater handed to async bodies. Cloneable; all clones share one status.
#[derive(Clone)]
pub struct TaskHandle {
    status: Arc<Mutex<TaskStatus>>,
    tx: Option<UnboundedSender<TaskStatus>>,
}

impl TaskHandle {
    pub fn new(id: String, cmd: String, tx: UnboundedSender<TaskStatus>) -> Self {
        Self {
            status: Arc::new(Mutex::new(TaskStatus::new(id, cmd))),
            tx: Some(tx),
        }
    }

    /// Updater for contexts with no tracked task; updates go nowhere.
    pub fn noop() -> Self {
        Self {
            status: Arc::new(Mutex::new(TaskStatus::new(String::new(), String::new()))),
            tx: None,
        }
    }

    pub fn id(&self) -> String {
        self.status.lock().expect("task lock").id.clone()
    }

    pub fn snapshot(&self) -> TaskStatus {
        self.status.lock().expect("task lock").clone()
    }

    fn send_update(&self) {
        if let Some(tx) = &self.tx {
            let snapshot = self.snapshot();
            let _ = tx.send(snapshot);
        }
    }

    pub fn update_message(&self, msg: impl Into<String>) {
        self.status.lock().expect("task lock").message = msg.into();
        self.send_update();
    }

    pub fn append_output(&self, output: &str) {
        if output.is_empty() {
            return;
        }
        {
            let mut status = self.status.lock().expect("task lock");
            if status.output.is_empty() {
                status.output = output.to_string();
            } else {
                status.output.push('\n');
                status.output.push_str(output);
            }
        }
        self.send_update();
    }

    /// Stores the result without signalling; pair with `complete`.
    pub fn set_result(&self, result: Value) {
        self.status.lock().expect("task lock").result = Some(result);
    }

    pub fn result(&self) -> Option<Value> {
        self.status.lock().expect("task lock").result.clone()
    }

    pub fn fail(&self, err: impl std::fmt::Display) {
        {
            let mut status = self.status.lock().expect("task lock");
            status.error = Some(err.to_string());
            if status.message == STATUS_INITIATED {
                status.message = "Task failed".to_string();
            }
        }
        self.send_update();
    }

    pub fn complete(&self, result: Option<Value>) {
        {
            let mut status = self.status.lock().expect("task lock");
            if result.is_some() {
                status.result = result;
            }
            status.done = true;
            if status.message == STATUS_INITIATED {
                status.message = "Task completed".to_string();
            }
        }
        self.send_update();
    }

    pub fn complete_with_message(&self, msg: impl Into<String>, result: Option<Value>) {
        {
            let mut status = self.status.lock().expect("task lock");
            status.message = msg.into();
            if result.is_some() {
                status.result = result;
            }
            status.done = true;
        }
        self.send_update();
    }
}

/// Registry of every task started this session, kept for `$ls tasks`
/// introspection after completion.
#[derive(Default)]
pub struct TaskBoard {
    tasks: BTreeMap<String, TaskStatus>,
    /// Tasks whose terminal state has already been rendered; the
    /// completion render fires at most once per task.
    rendered: Vec<String>,
}

impl TaskBoard {
    /// Next session-scoped task id.
    pub fn next_id(&self) -> String {
        format!("#{}", self.tasks.len() + 1)
    }

    pub fn insert(&mut self, status: TaskStatus) {
        self.tasks.insert(status.id.clone(), status);
    }

    /// Fold an update snapshot into the board. Returns true when this
    /// update is the task's first terminal transition.
    pub fn fold(&mut self, update: TaskStatus) -> bool {
        let id = update.id.clone();
        let terminal = update.is_terminal();
        self.tasks.insert(id.clone(), update);
        terminal && self.mark_rendered(&id)
    }

    /// Record that a task's terminal state was shown. Returns true the
    /// first time a given id is marked.
    pub fn mark_rendered(&mut self, id: &str) -> bool {
        if self.rendered.iter().any(|r| r == id) {
            return false;
        }
        self.rendered.push(id.to_string());
        true
    }

    pub fn get(&self, id: &str) -> Option<&TaskStatus> {
        self.tasks.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &TaskStatus> {
        self.tasks.values()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}
