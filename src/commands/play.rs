//! `$play <name>` — sequence playback.
//!
//! Playback itself is an async task; each stored step is expanded,
//! dispatched through the normal root resolver inside a step-flagged
//! invocation, and awaited on its own private channel before the next
//! step starts. One failure cascades over every remaining step.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::command::{suggest, AsyncHandler, Command, CommandBuilder, Invocation, OutputSink};
use crate::error::SequenceError;
use crate::repl::Shell;
use crate::sequence::{expand, RunStep};
use crate::task::TaskHandle;

pub fn command() -> CommandBuilder {
    CommandBuilder::new("$play")
        .desc("replay a recorded sequence")
        .suggest_with(|shell, tokens| {
            let search = tokens.last().map(String::as_str).unwrap_or("");
            let names = shell.store().names();
            let items =
                suggest::filter_prefixed(names.iter().map(String::as_str), search, " ");
            (items, search.len())
        })
        .run_async(PlayCommand)
}

struct PlayCommand;

#[async_trait]
impl AsyncHandler for PlayCommand {
    async fn execute(&self, _cmd: Arc<Command>, inv: Invocation, shell: Arc<Shell>) {
        let task = inv.task();
        let Some(name) = inv.args.first().cloned() else {
            task.fail("usage: $play <sequence>");
            return;
        };
        match play(&name, &task, &shell).await {
            Ok(count) => task.complete_with_message(
                format!("sequence '{name}' completed ({count} steps)"),
                None,
            ),
            Err(e) => task.fail(e),
        }
    }
}

/// Run a stored sequence to completion. Nested command output is captured
/// and only surfaced (through the playback task) on failure.
pub(crate) async fn play(
    name: &str,
    task: &TaskHandle,
    shell: &Arc<Shell>,
) -> Result<usize, SequenceError> {
    let (out, captured) = OutputSink::capture();
    let result = run_steps(name, task, shell, out).await;
    if result.is_err() {
        let buf = captured.lock().expect("capture lock").clone();
        if !buf.trim().is_empty() {
            task.append_output(buf.trim_end());
        }
    }
    result
}

async fn run_steps(
    name: &str,
    task: &TaskHandle,
    shell: &Arc<Shell>,
    out: OutputSink,
) -> Result<usize, SequenceError> {
    let steps = shell
        .store()
        .get(name)
        .ok_or_else(|| SequenceError::NotFound(name.to_string()))?;

    // Per-run clones; the stored template never sees run state.
    let mut runs: Vec<RunStep> = steps.iter().map(RunStep::from_template).collect();
    let mut results: Vec<Option<Value>> = vec![None; runs.len()];
    let mut failure: Option<SequenceError> = None;

    for i in 0..runs.len() {
        let step_name = runs[i].step.name.clone();

        // Cascade: a failed predecessor skips everything after it.
        if i > 0 && runs[i - 1].has_failed {
            runs[i].has_failed = true;
            debug!(sequence = name, step = %step_name, "skipped after earlier failure");
            continue;
        }

        task.update_message(format!("running {step_name}"));
        let expanded = expand::expand_tokens(&runs[i].step.cmd, &results, shell.envs())
            .map_err(|(token, source)| SequenceError::Expansion {
                step: step_name.clone(),
                token,
                source,
            })?;

        // Private completion channel; the shared UI never sees step tasks.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let step_task = TaskHandle::new(step_name.clone(), runs[i].step.cmd.join(" "), tx);
        runs[i].task = Some(step_task.clone());

        let dispatched = shell
            .dispatch_step(expanded, step_task.clone(), out.clone())
            .await;
        while rx.try_recv().is_ok() {}

        let status = step_task.snapshot();
        let reason = match dispatched {
            Err(e) => Some(e.to_string()),
            Ok(()) => status.error.clone(),
        };
        match reason {
            Some(reason) => {
                runs[i].has_failed = true;
                failure = Some(SequenceError::StepFailed {
                    sequence: name.to_string(),
                    step: step_name,
                    reason,
                });
            }
            None => results[i] = status.result,
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(runs.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, Registry};
    use crate::env::EnvManager;
    use crate::error::ShellError;
    use crate::net::RequestManager;
    use crate::sequence::store::SequenceStore;
    use serde_json::json;
    use std::sync::Mutex;

    struct Emit;

    #[async_trait]
    impl AsyncHandler for Emit {
        async fn execute(&self, _cmd: Arc<Command>, inv: Invocation, _shell: Arc<Shell>) {
            inv.task().complete_with_message(
                "done",
                Some(json!({
                    "data": {"id": 42},
                    "items": [
                        {"id": 5, "name": "a"},
                        {"id": 5, "name": "b"},
                        {"id": 6, "name": "c"}
                    ]
                })),
            );
        }
    }

    struct Boom;

    #[async_trait]
    impl AsyncHandler for Boom {
        async fn execute(&self, _cmd: Arc<Command>, inv: Invocation, _shell: Arc<Shell>) {
            inv.task().fail("exploded");
        }
    }

    fn play_shell(log: Arc<Mutex<Vec<String>>>) -> Arc<Shell> {
        let mut registry = Registry::new();
        registry.register(CommandBuilder::new("emit").run_async(Emit));
        registry.register(CommandBuilder::new("boom").run_async(Boom));
        registry.register(CommandBuilder::new("note").sync(
            move |_: &Arc<Command>, inv: &Invocation, _: &Arc<Shell>| -> Result<(), ShellError> {
                let line = inv.args.join(" ");
                inv.out.line(&line);
                log.lock().unwrap().push(line);
                Ok(())
            },
        ));
        Shell::new(
            registry,
            EnvManager::new(),
            SequenceStore::in_memory(),
            RequestManager::new(),
            "test".to_string(),
        )
    }

    fn record(shell: &Arc<Shell>, name: &str, lines: &[&str]) {
        shell.store().register(name).unwrap();
        for line in lines {
            shell
                .store()
                .append_step(name, line.split_whitespace().map(str::to_string).collect())
                .unwrap();
        }
    }

    fn task_pair() -> (TaskHandle, mpsc::UnboundedReceiver<crate::task::TaskStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TaskHandle::new("#1".into(), "$play".into(), tx), rx)
    }

    #[tokio::test]
    async fn test_step_reference_expansion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shell = play_shell(log.clone());
        record(&shell, "s", &["emit", "note id={{$1.data.id}}"]);

        let (task, _rx) = task_pair();
        let count = play("s", &task, &shell).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(log.lock().unwrap().as_slice(), ["id=42".to_string()]);
    }

    #[tokio::test]
    async fn test_array_filter_expansion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shell = play_shell(log.clone());
        record(&shell, "s", &["emit", "note names={{$1.items.id=5.name}}"]);

        let (task, _rx) = task_pair();
        play("s", &task, &shell).await.unwrap();
        assert_eq!(log.lock().unwrap().as_slice(), ["names=a,b".to_string()]);
    }

    #[tokio::test]
    async fn test_cascade_failure_skips_remaining_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shell = play_shell(log.clone());
        record(&shell, "s", &["boom", "note x", "note y"]);

        let (task, _rx) = task_pair();
        let err = play("s", &task, &shell).await.unwrap_err();
        match err {
            SequenceError::StepFailed { step, reason, .. } => {
                assert_eq!(step, "step #1");
                assert!(reason.contains("exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expansion_error_aborts_playback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shell = play_shell(log.clone());
        record(&shell, "s", &["note {{missing}}", "note x"]);

        let (task, _rx) = task_pair();
        let err = play("s", &task, &shell).await.unwrap_err();
        assert!(matches!(err, SequenceError::Expansion { .. }));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_sequence() {
        let shell = play_shell(Arc::new(Mutex::new(Vec::new())));
        let (task, _rx) = task_pair();
        assert!(matches!(
            play("nope", &task, &shell).await,
            Err(SequenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_nested_output_surfaced_only_on_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let shell = play_shell(log.clone());
        record(&shell, "ok", &["note hello"]);
        record(&shell, "bad", &["note hello", "boom"]);

        let (task, _rx) = task_pair();
        play("ok", &task, &shell).await.unwrap();
        assert!(task.snapshot().output.is_empty());

        let (task, _rx) = task_pair();
        play("bad", &task, &shell).await.unwrap_err();
        assert!(task.snapshot().output.contains("hello"));
    }
}
