//! Shell orchestrator: owns the services, the mode stack, and dispatch.
//!
//! Every service (registry, environments, sequence store, request client,
//! task board) is constructed once in `main` and handed to the shell by
//! value; command bodies reach them through the `Arc<Shell>` they are
//! given per invocation. Nothing in here is a process-wide singleton.

pub mod completer;

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::{
    resolver, suggest, Action, Command, Invocation, OutputSink, Registry,
};
use crate::env::EnvManager;
use crate::error::{ResolveError, ShellError};
use crate::net::RequestManager;
use crate::sequence::store::SequenceStore;
use crate::task::listener::{self, FgState, UiChannels};
use crate::task::{TaskBoard, TaskHandle};
use crate::token;

/// One pushed command context.
pub struct ModeFrame {
    pub display_name: String,
    pub command: Arc<Command>,
    pub allow_root_cmds: bool,
}

/// In-progress recording session.
#[derive(Clone)]
pub struct Recording {
    pub name: String,
    pub live: bool,
}

#[derive(Default)]
struct ShellState {
    modes: Vec<ModeFrame>,
    recording: Option<Recording>,
    prompt: String,
    quit: bool,
}

pub struct Shell {
    registry: Registry,
    envs: EnvManager,
    store: SequenceStore,
    requests: RequestManager,
    board: Arc<Mutex<TaskBoard>>,
    ui: UiChannels,
    fg: FgState,
    state: Mutex<ShellState>,
    cancel: CancellationToken,
}

impl Shell {
    /// Construct the shell and start its task listener. Must be called
    /// inside a tokio runtime.
    pub fn new(
        registry: Registry,
        envs: EnvManager,
        store: SequenceStore,
        requests: RequestManager,
        prompt: String,
    ) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let board = Arc::new(Mutex::new(TaskBoard::default()));
        let fg = FgState::default();
        let ui = listener::spawn(board.clone(), fg.clone(), cancel.child_token());

        Arc::new(Self {
            registry,
            envs,
            store,
            requests,
            board,
            ui,
            fg,
            state: Mutex::new(ShellState {
                prompt,
                ..ShellState::default()
            }),
            cancel,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn envs(&self) -> &EnvManager {
        &self.envs
    }

    pub fn store(&self) -> &SequenceStore {
        &self.store
    }

    pub fn requests(&self) -> &RequestManager {
        &self.requests
    }

    pub fn board(&self) -> &Arc<Mutex<TaskBoard>> {
        &self.board
    }

    pub fn ui(&self) -> &UiChannels {
        &self.ui
    }

    pub fn fg(&self) -> &FgState {
        &self.fg
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // ----- prompt & lifecycle -------------------------------------------

    pub fn prompt(&self) -> String {
        let state = self.state.lock().expect("shell lock");
        let base = state
            .modes
            .last()
            .map(|m| m.display_name.clone())
            .unwrap_or_else(|| state.prompt.clone());
        format!("{base} ({}) > ", self.envs.active_env())
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.state.lock().expect("shell lock").prompt = prompt.into();
    }

    pub fn request_quit(&self) {
        self.state.lock().expect("shell lock").quit = true;
        self.cancel.cancel();
    }

    pub fn should_quit(&self) -> bool {
        self.state.lock().expect("shell lock").quit
    }

    // ----- mode stack ---------------------------------------------------

    pub fn push_mode(&self, frame: ModeFrame) {
        debug!(mode = %frame.display_name, "entering mode");
        self.state.lock().expect("shell lock").modes.push(frame);
    }

    /// Pop the active mode, running its cleanup hook. With an empty stack
    /// this is a quit request (one EOF per level).
    pub fn pop_mode(self: &Arc<Self>) {
        let frame = self.state.lock().expect("shell lock").modes.pop();
        match frame {
            Some(frame) => {
                debug!(mode = %frame.display_name, "leaving mode");
                frame.command.run_cleanup(self);
            }
            None => self.request_quit(),
        }
    }

    pub fn active_mode(&self) -> Option<(Arc<Command>, bool)> {
        self.state
            .lock()
            .expect("shell lock")
            .modes
            .last()
            .map(|m| (m.command.clone(), m.allow_root_cmds))
    }

    pub fn mode_depth(&self) -> usize {
        self.state.lock().expect("shell lock").modes.len()
    }

    pub fn is_active_mode(&self, cmd: &Arc<Command>) -> bool {
        self.state
            .lock()
            .expect("shell lock")
            .modes
            .last()
            .map(|m| Arc::ptr_eq(&m.command, cmd))
            .unwrap_or(false)
    }

    pub fn set_mode_display(&self, display: impl Into<String>) {
        if let Some(top) = self.state.lock().expect("shell lock").modes.last_mut() {
            top.display_name = display.into();
        }
    }

    // ----- recording ----------------------------------------------------

    pub fn start_recording(&self, name: impl Into<String>, live: bool) {
        self.state.lock().expect("shell lock").recording = Some(Recording {
            name: name.into(),
            live,
        });
    }

    pub fn recording(&self) -> Option<Recording> {
        self.state.lock().expect("shell lock").recording.clone()
    }

    /// Ends the recording session without deciding its fate; the caller
    /// either finalized or discards the sequence.
    pub fn take_recording(&self) -> Option<Recording> {
        self.state.lock().expect("shell lock").recording.take()
    }

    // ----- dispatch -----------------------------------------------------

    /// Dispatch one interactive line.
    pub fn dispatch(self: &Arc<Self>, line: &str) -> Result<(), ShellError> {
        let tokens = token::tokenize(line);
        let Some(first) = tokens.first() else {
            return Ok(());
        };

        // A capturing mode (the recorder) claims every line that is not
        // one of its own in-mode commands.
        if let Some((mode_cmd, _)) = self.active_mode() {
            if mode_cmd.captures_unresolved() && !mode_cmd.in_mode_cmds().contains_key(first) {
                return self.capture_line(tokens);
            }
        }

        let (cmd, args) = self.resolve_line(&tokens)?;
        self.run(cmd, tokens, args, OutputSink::Stdout)
    }

    /// Resolve a line against the active mode (merged sub + in-mode maps,
    /// plus root names when allowed) or the root registry.
    fn resolve_line(
        self: &Arc<Self>,
        tokens: &[String],
    ) -> Result<(Arc<Command>, Vec<String>), ShellError> {
        let first = tokens.first().ok_or(ResolveError::Empty)?;

        if let Some((mode_cmd, allow_root)) = self.active_mode() {
            let merged = resolver::merged_mode_map(&mode_cmd);
            if merged.contains_key(first) {
                let (cmd, args) = resolver::walk_args(&mode_cmd, &merged, tokens);
                resolver::check_runnable(&cmd, &args)?;
                return Ok((cmd, args));
            }
            if !allow_root {
                return Err(ResolveError::InvalidCommand(first.clone()).into());
            }
        }

        self.resolve_root(tokens)
    }

    /// Root-registry resolution, bypassing any active mode.
    pub fn resolve_root(
        &self,
        tokens: &[String],
    ) -> Result<(Arc<Command>, Vec<String>), ShellError> {
        let first = tokens.first().ok_or(ResolveError::Empty)?;
        let root = self
            .registry
            .get(first)
            .cloned()
            .ok_or_else(|| ResolveError::InvalidCommand(first.clone()))?;
        let (cmd, args) = resolver::resolve(&root, &tokens[1..]);
        resolver::check_runnable(&cmd, &args)?;
        Ok((cmd, args))
    }

    /// Record a line into the active recording; with live recording it is
    /// also executed immediately as a root-level command.
    fn capture_line(self: &Arc<Self>, tokens: Vec<String>) -> Result<(), ShellError> {
        let Some(rec) = self.recording() else {
            return Err(ShellError::Exec("no active recording".to_string()));
        };
        let count = self.store.append_step(&rec.name, tokens.clone())?;
        // The display carries the upcoming step number, not the count.
        self.set_mode_display(format!("$rec[{}:{}]", rec.name, count + 1));
        println!("recorded step #{count}");

        if rec.live {
            let (cmd, args) = self.resolve_root(&tokens)?;
            return self.run(cmd, tokens, args, OutputSink::Stdout);
        }
        Ok(())
    }

    fn run(
        self: &Arc<Self>,
        cmd: Arc<Command>,
        raw_tokens: Vec<String>,
        args: Vec<String>,
        out: OutputSink,
    ) -> Result<(), ShellError> {
        // Zero-argument invocation of a mode-capable command enters the
        // mode instead of running the body.
        if cmd.enters_mode_without_args() && args.is_empty() && !self.is_active_mode(&cmd) {
            self.push_mode(ModeFrame {
                display_name: cmd.fqn().to_string(),
                command: cmd.clone(),
                allow_root_cmds: cmd.allow_root_cmds_in_mode(),
            });
            return Ok(());
        }

        match cmd.action().clone() {
            Action::Group => {
                print_group(&cmd, &out);
                Ok(())
            }
            Action::Sync(handler) => {
                let inv = Invocation {
                    cancel: self.cancel.child_token(),
                    raw_tokens,
                    args,
                    task: None,
                    is_seq_step: false,
                    out,
                };
                handler.execute(&cmd, &inv, self)
            }
            Action::Async(handler) => {
                self.spawn_task(cmd, handler, raw_tokens, args);
                Ok(())
            }
        }
    }

    /// Start an async body as a tracked foreground task.
    fn spawn_task(
        self: &Arc<Self>,
        cmd: Arc<Command>,
        handler: Arc<dyn crate::command::AsyncHandler>,
        raw_tokens: Vec<String>,
        args: Vec<String>,
    ) {
        let task = {
            let mut board = self.board.lock().expect("board lock");
            let id = board.next_id();
            let task = TaskHandle::new(id, cmd.fqn().to_string(), self.ui.updates.clone());
            board.insert(task.snapshot());
            task
        };
        let _ = self.ui.foreground.send(task.id());

        let inv = Invocation {
            cancel: self.cancel.child_token(),
            raw_tokens,
            args,
            task: Some(task.clone()),
            is_seq_step: false,
            out: OutputSink::Stdout,
        };
        let shell = self.clone();
        let body = tokio::spawn(async move { handler.execute(cmd, inv, shell).await });

        // Panic guard: a crashed body still terminates its task.
        tokio::spawn(async move {
            match body.await {
                Err(e) => task.fail(format!("task aborted: {e}")),
                Ok(()) if !task.snapshot().is_terminal() => task.complete(None),
                Ok(()) => {}
            }
        });
    }

    /// Dispatch one already-expanded sequence step and wait for it to
    /// finish. Steps always resolve from the root registry, never through
    /// the active mode. Async bodies report through `task`; sync failures
    /// are returned directly.
    pub async fn dispatch_step(
        self: &Arc<Self>,
        tokens: Vec<String>,
        task: TaskHandle,
        out: OutputSink,
    ) -> Result<(), ShellError> {
        let (cmd, args) = self.resolve_root(&tokens)?;

        match cmd.action().clone() {
            Action::Group => {
                print_group(&cmd, &out);
                Ok(())
            }
            Action::Sync(handler) => {
                let inv = Invocation {
                    cancel: self.cancel.child_token(),
                    raw_tokens: tokens,
                    args,
                    task: Some(task),
                    is_seq_step: true,
                    out,
                };
                handler.execute(&cmd, &inv, self)
            }
            Action::Async(handler) => {
                let inv = Invocation {
                    cancel: self.cancel.child_token(),
                    raw_tokens: tokens,
                    args,
                    task: Some(task.clone()),
                    is_seq_step: true,
                    out,
                };
                let shell = self.clone();
                let cmd2 = cmd.clone();
                let body =
                    tokio::spawn(async move { handler.execute(cmd2, inv, shell).await });
                if let Err(e) = body.await {
                    task.fail(format!("task aborted: {e}"));
                }
                Ok(())
            }
        }
    }

    // ----- suggestions --------------------------------------------------

    /// Completion candidates for a partial line: each is the remainder to
    /// append at the cursor.
    pub fn suggestions(self: &Arc<Self>, line: &str) -> Vec<String> {
        let mut tokens = token::tokenize(line);
        if line.is_empty() || line.ends_with(char::is_whitespace) {
            tokens.push(String::new());
        }
        let last = tokens.last().cloned().unwrap_or_default();

        // An unclosed {{ wins over command completion.
        if let Some(partial) = suggest::variable_search(&last) {
            return self
                .envs
                .matching_vars(partial)
                .into_iter()
                .map(|name| format!("{}}}}}", &name[partial.len()..]))
                .collect();
        }

        let first = &tokens[0];
        if tokens.len() == 1 {
            return self.first_word_suggestions(first);
        }

        let root = match self.lookup_first(first) {
            Some(cmd) => cmd,
            None => return Vec::new(),
        };
        if let Some(hook) = root.suggest_override() {
            let (items, _) = hook(self, &tokens[1..]);
            return items;
        }
        let (items, _) = suggest::for_command(&root, &tokens[1..]);
        items
    }

    fn lookup_first(&self, first: &str) -> Option<Arc<Command>> {
        if let Some((mode_cmd, allow_root)) = self.active_mode() {
            let merged = resolver::merged_mode_map(&mode_cmd);
            if let Some(cmd) = merged.get(first) {
                return Some(cmd.clone());
            }
            if !allow_root {
                return None;
            }
        }
        self.registry.get(first).cloned()
    }

    fn first_word_suggestions(&self, search: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut include_root = true;

        if let Some((mode_cmd, allow_root)) = self.active_mode() {
            names.extend(resolver::merged_mode_map(&mode_cmd).keys().cloned());
            include_root = allow_root;
        }
        if include_root {
            names.extend(self.registry.cmds().keys().cloned());
        }
        suggest::filter_prefixed(names.iter().map(String::as_str), search, " ")
    }
}

fn print_group(cmd: &Command, out: &OutputSink) {
    if cmd.sub_cmds().is_empty() {
        out.line(format!("{} has no sub-commands", cmd.fqn()));
        return;
    }
    out.line(format!("{}:", cmd.fqn()));
    for (name, sub) in cmd.sub_cmds() {
        out.line(format!("  {:<16} {}", name, sub.desc()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBuilder;

    fn shell_with(registry: Registry) -> Arc<Shell> {
        Shell::new(
            registry,
            EnvManager::new(),
            SequenceStore::in_memory(),
            RequestManager::new(),
            "test".to_string(),
        )
    }

    fn noop_sync() -> impl Fn(
        &Arc<Command>,
        &Invocation,
        &Arc<Shell>,
    ) -> Result<(), ShellError>
           + Send
           + Sync {
        |_, _, _| Ok(())
    }

    #[tokio::test]
    async fn test_invalid_root_command() {
        let shell = shell_with(Registry::new());
        let err = shell.dispatch("bogus").unwrap_err();
        assert_eq!(err.to_string(), "invalid command 'bogus'");
    }

    #[tokio::test]
    async fn test_incomplete_command() {
        let mut registry = Registry::new();
        registry.register(
            CommandBuilder::new("get").sub(CommandBuilder::new("users").sync(noop_sync())),
        );
        let shell = shell_with(registry);
        let err = shell.dispatch("get bogus").unwrap_err();
        assert_eq!(err.to_string(), "incomplete/invalid command");
        assert!(shell.dispatch("get users").is_ok());
    }

    #[tokio::test]
    async fn test_zero_arg_invocation_enters_mode() {
        let mut registry = Registry::new();
        registry.register(
            CommandBuilder::new("$draft")
                .enters_mode_without_args()
                .sync(noop_sync()),
        );
        let shell = shell_with(registry);

        shell.dispatch("$draft").unwrap();
        assert_eq!(shell.mode_depth(), 1);
        assert!(shell.prompt().starts_with("$draft"));

        shell.pop_mode();
        assert_eq!(shell.mode_depth(), 0);
        assert!(!shell.should_quit());

        // EOF at root quits.
        shell.pop_mode();
        assert!(shell.should_quit());
    }

    #[tokio::test]
    async fn test_mode_blocks_root_commands_unless_allowed() {
        let mut registry = Registry::new();
        registry.register(CommandBuilder::new("visible").sync(noop_sync()));
        registry.register(
            CommandBuilder::new("closed")
                .enters_mode_without_args()
                .in_mode(CommandBuilder::new("inner").sync(noop_sync())),
        );
        let shell = shell_with(registry);

        shell.dispatch("closed").unwrap();
        assert!(shell.dispatch("inner").is_ok());
        let err = shell.dispatch("visible").unwrap_err();
        assert_eq!(err.to_string(), "invalid command 'visible'");
    }

    #[tokio::test]
    async fn test_open_mode_falls_through_to_root() {
        let mut registry = Registry::new();
        registry.register(CommandBuilder::new("visible").sync(noop_sync()));
        registry.register(
            CommandBuilder::new("open")
                .enters_mode_without_args()
                .allow_root_cmds_in_mode(),
        );
        let shell = shell_with(registry);

        shell.dispatch("open").unwrap();
        assert!(shell.dispatch("visible").is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_runs_on_pop() {
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen = flag.clone();
        let mut registry = Registry::new();
        registry.register(
            CommandBuilder::new("m")
                .enters_mode_without_args()
                .on_mode_exit(move |_| seen.store(true, std::sync::atomic::Ordering::SeqCst)),
        );
        let shell = shell_with(registry);

        shell.dispatch("m").unwrap();
        shell.pop_mode();
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_first_word_suggestions_merge_mode_and_root() {
        let mut registry = Registry::new();
        registry.register(CommandBuilder::new("visible").sync(noop_sync()));
        registry.register(
            CommandBuilder::new("open")
                .enters_mode_without_args()
                .allow_root_cmds_in_mode()
                .in_mode(CommandBuilder::new("vim").sync(noop_sync())),
        );
        let shell = shell_with(registry);
        shell.dispatch("open").unwrap();

        let items = shell.suggestions("vi");
        assert!(items.contains(&"sible ".to_string()));
        assert!(items.contains(&"m ".to_string()));
    }

    #[tokio::test]
    async fn test_variable_suggestions() {
        let shell = shell_with(Registry::new());
        shell.envs().set_var("host", "api.local");
        shell.envs().set_var("hostname", "other");
        let items = shell.suggestions("get users url={{hos");
        assert_eq!(items, vec!["t}}".to_string(), "tname}}".to_string()]);
    }
}
