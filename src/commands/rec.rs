//! `$rec [live] <name>` — the sequence recorder.
//!
//! Starting a recording registers an empty sequence and pushes a mode
//! that captures every line not addressed to the recorder itself. The
//! sequence only survives an explicit `$finalize`; leaving the mode any
//! other way discards it.

use std::sync::Arc;

use crate::command::{Command, CommandBuilder, Invocation};
use crate::error::ShellError;
use crate::repl::{ModeFrame, Shell};

pub fn command() -> CommandBuilder {
    CommandBuilder::new("$rec")
        .desc("record a command sequence")
        .captures_unresolved()
        .in_mode(
            CommandBuilder::new("$finalize")
                .desc("persist the recording and leave the mode")
                .sync(finalize),
        )
        .in_mode(
            CommandBuilder::new("$is_eq")
                .desc("assert two values are equivalent")
                .sync(is_eq),
        )
        .on_mode_exit(discard_unfinalized)
        .sync(start)
}

fn start(cmd: &Arc<Command>, inv: &Invocation, shell: &Arc<Shell>) -> Result<(), ShellError> {
    let live = inv.args.first().map(String::as_str) == Some("live");
    let name = inv
        .args
        .get(usize::from(live))
        .ok_or_else(|| ShellError::Exec("usage: $rec [live] <name>".to_string()))?
        .clone();

    if let Some(rec) = shell.recording() {
        return Err(ShellError::Exec(format!(
            "already recording '{}'",
            rec.name
        )));
    }

    shell.store().register(&name)?;
    shell.start_recording(&name, live);
    // Root commands stay reachable for completion: the lines typed while
    // recording are root commands. Capture still wins at dispatch time.
    shell.push_mode(ModeFrame {
        display_name: format!("$rec[{name}:1]"),
        command: cmd.clone(),
        allow_root_cmds: true,
    });
    inv.out.line(format!(
        "recording '{name}'{} — $finalize to keep, EOF to discard",
        if live { " (live)" } else { "" }
    ));
    Ok(())
}

fn finalize(_cmd: &Arc<Command>, inv: &Invocation, shell: &Arc<Shell>) -> Result<(), ShellError> {
    let rec = shell
        .take_recording()
        .ok_or_else(|| ShellError::Exec("no active recording".to_string()))?;

    if let Err(e) = shell.store().finalize(&rec.name) {
        // Keep the session alive so more steps can be added.
        shell.start_recording(&rec.name, rec.live);
        return Err(e.into());
    }
    inv.out.line(format!(
        "sequence '{}' saved ({} steps)",
        rec.name,
        shell.store().step_count(&rec.name)
    ));
    shell.pop_mode();
    Ok(())
}

/// Checkpoint assertion: recorded mid-sequence (typically with expanded
/// placeholders on both sides) to verify a replay is on track.
fn is_eq(_cmd: &Arc<Command>, inv: &Invocation, _shell: &Arc<Shell>) -> Result<(), ShellError> {
    let [a, b] = inv.args.as_slice() else {
        return Err(ShellError::Exec("usage: $is_eq <left> <right>".to_string()));
    };
    if a != b {
        return Err(ShellError::Exec(format!(
            "inequivalent values '{a}' and '{b}'"
        )));
    }
    inv.out.line(format!("equivalent: '{a}'"));
    Ok(())
}

fn discard_unfinalized(shell: &Arc<Shell>) {
    if let Some(rec) = shell.take_recording() {
        shell.store().discard(&rec.name);
        println!("discarded unfinalized sequence '{}'", rec.name);
    }
}

#[cfg(test)]
mod tests {
    use crate::command::{CommandBuilder, Registry};
    use crate::commands::tests::test_shell;
    use crate::env::EnvManager;
    use crate::net::RequestManager;
    use crate::repl::Shell;
    use crate::sequence::store::SequenceStore;

    #[tokio::test]
    async fn test_record_and_finalize() {
        let shell = test_shell();
        shell.dispatch("$rec seqA").unwrap();
        assert_eq!(shell.mode_depth(), 1);
        // The display shows the step about to be recorded.
        assert!(shell.prompt().starts_with("$rec[seqA:1]"));

        shell.dispatch("get users").unwrap();
        assert!(shell.prompt().starts_with("$rec[seqA:2]"));

        shell.dispatch("$finalize").unwrap();
        assert_eq!(shell.mode_depth(), 0);
        assert!(shell.recording().is_none());

        let steps = shell.store().get("seqA").unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].cmd, vec!["get".to_string(), "users".to_string()]);
    }

    #[tokio::test]
    async fn test_exit_without_finalize_discards() {
        let shell = test_shell();
        shell.dispatch("$rec seqA").unwrap();
        shell.dispatch("get users").unwrap();

        shell.pop_mode();
        assert!(shell.store().get("seqA").is_none());
        assert!(shell.recording().is_none());
    }

    #[tokio::test]
    async fn test_finalize_empty_recording_stays_in_mode() {
        let shell = test_shell();
        shell.dispatch("$rec seqA").unwrap();
        assert!(shell.dispatch("$finalize").is_err());
        assert_eq!(shell.mode_depth(), 1);
        assert!(shell.recording().is_some());
    }

    #[tokio::test]
    async fn test_nested_rec_line_is_captured() {
        let shell = test_shell();
        shell.dispatch("$rec seqA").unwrap();
        // The recorder captures the second `$rec` line as a step rather
        // than starting a nested session.
        shell.dispatch("$rec seqB").unwrap();
        assert_eq!(shell.store().step_count("seqA"), 1);
        assert!(shell.store().get("seqB").is_none());
    }

    #[tokio::test]
    async fn test_is_eq_asserts_values() {
        let shell = test_shell();
        shell.dispatch("$rec seqA").unwrap();
        shell.dispatch("get users").unwrap();

        // Addressed to the recorder itself, so it runs instead of being
        // recorded.
        shell.dispatch("$is_eq 42 42").unwrap();
        let err = shell.dispatch("$is_eq 42 41").unwrap_err();
        assert_eq!(err.to_string(), "inequivalent values '42' and '41'");
        assert_eq!(shell.store().step_count("seqA"), 1);
    }

    #[tokio::test]
    async fn test_root_commands_suggested_while_recording() {
        let mut registry = Registry::new();
        crate::commands::register_builtins(&mut registry);
        registry.register(CommandBuilder::new("get").sub(CommandBuilder::new("users")));
        let shell = Shell::new(
            registry,
            EnvManager::new(),
            SequenceStore::in_memory(),
            RequestManager::new(),
            "test".to_string(),
        );

        shell.dispatch("$rec seqA").unwrap();
        let items = shell.suggestions("ge");
        assert!(items.contains(&"t ".to_string()));
        // Deeper completion reaches into the root command too.
        let items = shell.suggestions("get ");
        assert!(items.contains(&"users ".to_string()));

        // Capture still wins at dispatch time.
        shell.dispatch("get users").unwrap();
        assert_eq!(shell.store().step_count("seqA"), 1);
    }
}
