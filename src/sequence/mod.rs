//! Named, replayable command sequences.
//!
//! A sequence is an ordered list of recorded steps, persisted as plain
//! token lists. Playback state (tasks, failure flags) lives in per-run
//! clones so the stored template is never mutated.

pub mod expand;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::task::TaskHandle;

/// One recorded command line. Exactly this shape is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub cmd: Vec<String>,
}

impl Step {
    pub fn numbered(n: usize, cmd: Vec<String>) -> Self {
        Self {
            name: format!("step #{n}"),
            cmd,
        }
    }
}

/// Per-run state for one step during playback; cloned from the stored
/// template so runs never leak into it.
pub struct RunStep {
    pub step: Step,
    pub has_failed: bool,
    pub task: Option<TaskHandle>,
}

impl RunStep {
    pub fn from_template(step: &Step) -> Self {
        Self {
            step: step.clone(),
            has_failed: false,
            task: None,
        }
    }
}
