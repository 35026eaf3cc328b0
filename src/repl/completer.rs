//! rustyline integration: tab completion and the foreground-swap key.

use std::sync::Arc;

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Cmd, ConditionalEventHandler, Event, EventContext, RepeatCount};

use super::Shell;

/// Line helper backed by the shell's suggestion engine. Suggestions are
/// remainders, so completion always inserts at the cursor.
pub struct ShellHelper {
    shell: Arc<Shell>,
}

impl ShellHelper {
    pub fn new(shell: Arc<Shell>) -> Self {
        Self { shell }
    }
}

impl rustyline::Helper for ShellHelper {}

impl Highlighter for ShellHelper {}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        None
    }
}

impl Validator for ShellHelper {}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let candidates = self
            .shell
            .suggestions(&line[..pos])
            .into_iter()
            .map(|remainder| Pair {
                display: remainder.trim_end().to_string(),
                replacement: remainder,
            })
            .collect();
        Ok((pos, candidates))
    }
}

/// Ctrl-F: background the foreground task, or re-foreground the last
/// backgrounded one. Only reads the registers; the listener applies the
/// swap.
pub struct SwapKeyHandler {
    shell: Arc<Shell>,
}

impl SwapKeyHandler {
    pub fn new(shell: Arc<Shell>) -> Self {
        Self { shell }
    }
}

impl ConditionalEventHandler for SwapKeyHandler {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        _ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        let fg = self.shell.fg();
        if fg.foreground().is_some() {
            let _ = self.shell.ui().background.send(());
        } else if let Some(id) = fg.backgrounded() {
            let _ = self.shell.ui().foreground.send(id);
        }
        Some(Cmd::Noop)
    }
}
