//! `$ls` — introspection: variables, tasks, sequences.

use std::sync::Arc;

use colored::Colorize;

use crate::command::{Command, CommandBuilder, Invocation};
use crate::error::ShellError;
use crate::repl::Shell;

pub fn command() -> CommandBuilder {
    CommandBuilder::new("$ls")
        .desc("list shell state")
        .sub(
            CommandBuilder::new("vars")
                .desc("variables in the active environment")
                .sync(ls_vars),
        )
        .sub(CommandBuilder::new("tasks").desc("all tasks this session").sync(ls_tasks))
        .sub(
            CommandBuilder::new("sequences")
                .desc("stored sequences")
                .sync(ls_sequences),
        )
}

fn ls_vars(_cmd: &Arc<Command>, inv: &Invocation, shell: &Arc<Shell>) -> Result<(), ShellError> {
    let vars = shell.envs().active_vars();
    inv.out
        .line(format!("environment '{}':", shell.envs().active_env()));
    if vars.is_empty() {
        inv.out.line("  (no variables set)");
        return Ok(());
    }
    let mut names: Vec<_> = vars.keys().collect();
    names.sort();
    for name in names {
        inv.out.line(format!("  {name} = {}", vars[name]));
    }
    Ok(())
}

fn ls_tasks(_cmd: &Arc<Command>, inv: &Invocation, shell: &Arc<Shell>) -> Result<(), ShellError> {
    let board = shell.board().lock().expect("board lock");
    if board.is_empty() {
        inv.out.line("no tasks started yet");
        return Ok(());
    }
    for status in board.all() {
        let glyph = if status.error.is_some() {
            "✗".red().to_string()
        } else if status.done {
            "✓".green().to_string()
        } else {
            "…".yellow().to_string()
        };
        inv.out
            .line(format!("{glyph} {} {} — {}", status.id, status.cmd, status.message));
        for line in status.output.lines() {
            inv.out.line(format!("    {line}"));
        }
    }
    Ok(())
}

fn ls_sequences(
    _cmd: &Arc<Command>,
    inv: &Invocation,
    shell: &Arc<Shell>,
) -> Result<(), ShellError> {
    let names = shell.store().names();
    if names.is_empty() {
        inv.out.line("no sequences recorded yet");
        return Ok(());
    }
    for name in names {
        inv.out.line(format!(
            "{name} ({} steps)",
            shell.store().step_count(&name)
        ));
    }
    Ok(())
}
