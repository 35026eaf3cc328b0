//! Command tree nodes and the root registry.
//!
//! A [`Command`] is a singleton tree node registered once at startup and
//! shared across all invocations. Per-invocation state never lives on the
//! node; it travels in the [`Invocation`] context. Whether a command runs
//! inline or on the task engine is a tagged variant of its [`Action`],
//! inspected once at dispatch time.

pub mod resolver;
pub mod suggest;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ShellError;
use crate::repl::Shell;
use crate::task::TaskHandle;

/// Synchronous command body; runs inline on the read loop.
pub trait SyncHandler: Send + Sync {
    fn execute(
        &self,
        cmd: &Arc<Command>,
        inv: &Invocation,
        shell: &Arc<Shell>,
    ) -> Result<(), ShellError>;
}

/// Asynchronous command body; runs on the task engine. Never returns errors
/// through the call stack — failures go through the invocation's task.
#[async_trait]
pub trait AsyncHandler: Send + Sync {
    async fn execute(&self, cmd: Arc<Command>, inv: Invocation, shell: Arc<Shell>);
}

/// Override hook for commands with custom completion (e.g. sequence names).
pub type SuggestFn =
    dyn Fn(&Arc<Shell>, &[String]) -> (Vec<String>, usize) + Send + Sync;

/// Hook run when a mode built on this command is popped.
pub type CleanupFn = dyn Fn(&Arc<Shell>) + Send + Sync;

/// What executing a command means.
#[derive(Clone)]
pub enum Action {
    /// Pure grouping node; with no arguments it lists its sub-commands,
    /// with unconsumed arguments resolution reports an incomplete command.
    Group,
    Sync(Arc<dyn SyncHandler>),
    Async(Arc<dyn AsyncHandler>),
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Group => write!(f, "Group"),
            Action::Sync(_) => write!(f, "Sync"),
            Action::Async(_) => write!(f, "Async"),
        }
    }
}

impl<F> SyncHandler for F
where
    F: Fn(&Arc<Command>, &Invocation, &Arc<Shell>) -> Result<(), ShellError> + Send + Sync,
{
    fn execute(
        &self,
        cmd: &Arc<Command>,
        inv: &Invocation,
        shell: &Arc<Shell>,
    ) -> Result<(), ShellError> {
        self(cmd, inv, shell)
    }
}

/// Where user-visible command output goes. Playback swaps stdout for a
/// capture buffer so nested output can be surfaced only on failure.
#[derive(Clone)]
pub enum OutputSink {
    Stdout,
    Capture(Arc<Mutex<String>>),
}

impl OutputSink {
    pub fn capture() -> (Self, Arc<Mutex<String>>) {
        let buf = Arc::new(Mutex::new(String::new()));
        (Self::Capture(buf.clone()), buf)
    }

    pub fn line(&self, text: impl AsRef<str>) {
        match self {
            Self::Stdout => println!("{}", text.as_ref()),
            Self::Capture(buf) => {
                let mut buf = buf.lock().expect("capture lock");
                buf.push_str(text.as_ref());
                buf.push('\n');
            }
        }
    }
}

/// Per-call execution context. Carries everything a body needs so that
/// concurrent invocations of the same command cannot cross-contaminate.
pub struct Invocation {
    /// Cancellable lifetime, derived from the shell's root token.
    pub cancel: CancellationToken,
    /// Tokens as originally typed.
    pub raw_tokens: Vec<String>,
    /// Argument tokens left after resolution (already expanded for steps).
    pub args: Vec<String>,
    /// Tracked task for async bodies; `None` gives a no-op updater.
    pub task: Option<TaskHandle>,
    /// Set when this invocation replays a sequence step.
    pub is_seq_step: bool,
    pub out: OutputSink,
}

impl Invocation {
    pub fn task(&self) -> TaskHandle {
        self.task.clone().unwrap_or_else(TaskHandle::noop)
    }
}

/// A named node in the command tree.
pub struct Command {
    name: String,
    desc: String,
    fqn: String,
    sub_cmds: BTreeMap<String, Arc<Command>>,
    in_mode_cmds: BTreeMap<String, Arc<Command>>,
    /// `key=` parameter names this command accepts, for suggestions.
    params: Vec<String>,
    enters_mode_without_args: bool,
    allow_root_cmds_in_mode: bool,
    /// The mode body claims lines that do not resolve to an in-mode
    /// command (the recorder does this to capture steps).
    captures_unresolved: bool,
    action: Action,
    suggest_override: Option<Arc<SuggestFn>>,
    cleanup: Option<Arc<CleanupFn>>,
}

impl Command {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// Space-joined path from the root, fixed at registration.
    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    pub fn sub_cmds(&self) -> &BTreeMap<String, Arc<Command>> {
        &self.sub_cmds
    }

    pub fn in_mode_cmds(&self) -> &BTreeMap<String, Arc<Command>> {
        &self.in_mode_cmds
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn enters_mode_without_args(&self) -> bool {
        self.enters_mode_without_args
    }

    pub fn allow_root_cmds_in_mode(&self) -> bool {
        self.allow_root_cmds_in_mode
    }

    pub fn captures_unresolved(&self) -> bool {
        self.captures_unresolved
    }

    pub fn suggest_override(&self) -> Option<&Arc<SuggestFn>> {
        self.suggest_override.as_ref()
    }

    pub fn run_cleanup(self: &Arc<Self>, shell: &Arc<Shell>) {
        if let Some(cleanup) = &self.cleanup {
            cleanup(shell);
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self.action, Action::Async(_))
    }
}

/// Builder for command trees. `seal` assigns fully-qualified names by
/// walking the finished tree, so nodes never need parent back-pointers.
pub struct CommandBuilder {
    name: String,
    desc: String,
    params: Vec<String>,
    subs: Vec<CommandBuilder>,
    in_mode: Vec<CommandBuilder>,
    enters_mode_without_args: bool,
    allow_root_cmds_in_mode: bool,
    captures_unresolved: bool,
    action: Action,
    suggest_override: Option<Arc<SuggestFn>>,
    cleanup: Option<Arc<CleanupFn>>,
}

impl CommandBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: String::new(),
            params: Vec::new(),
            subs: Vec::new(),
            in_mode: Vec::new(),
            enters_mode_without_args: false,
            allow_root_cmds_in_mode: false,
            captures_unresolved: false,
            action: Action::Group,
            suggest_override: None,
            cleanup: None,
        }
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn params(mut self, params: &[&str]) -> Self {
        self.params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn sub(mut self, child: CommandBuilder) -> Self {
        self.subs.push(child);
        self
    }

    pub fn in_mode(mut self, child: CommandBuilder) -> Self {
        self.in_mode.push(child);
        self
    }

    pub fn enters_mode_without_args(mut self) -> Self {
        self.enters_mode_without_args = true;
        self
    }

    pub fn allow_root_cmds_in_mode(mut self) -> Self {
        self.allow_root_cmds_in_mode = true;
        self
    }

    pub fn captures_unresolved(mut self) -> Self {
        self.captures_unresolved = true;
        self
    }

    pub fn sync(mut self, handler: impl SyncHandler + 'static) -> Self {
        self.action = Action::Sync(Arc::new(handler));
        self
    }

    pub fn run_async(mut self, handler: impl AsyncHandler + 'static) -> Self {
        self.action = Action::Async(Arc::new(handler));
        self
    }

    pub fn suggest_with(
        mut self,
        f: impl Fn(&Arc<Shell>, &[String]) -> (Vec<String>, usize) + Send + Sync + 'static,
    ) -> Self {
        self.suggest_override = Some(Arc::new(f));
        self
    }

    pub fn on_mode_exit(mut self, f: impl Fn(&Arc<Shell>) + Send + Sync + 'static) -> Self {
        self.cleanup = Some(Arc::new(f));
        self
    }

    pub fn seal(self, parent_fqn: &str) -> Arc<Command> {
        let fqn = if parent_fqn.is_empty() {
            self.name.clone()
        } else {
            format!("{parent_fqn} {}", self.name)
        };

        let sub_cmds = self
            .subs
            .into_iter()
            .map(|b| {
                let child = b.seal(&fqn);
                (child.name.clone(), child)
            })
            .collect();
        let in_mode_cmds = self
            .in_mode
            .into_iter()
            .map(|b| {
                let child = b.seal(&fqn);
                (child.name.clone(), child)
            })
            .collect();

        Arc::new(Command {
            name: self.name,
            desc: self.desc,
            fqn,
            sub_cmds,
            in_mode_cmds,
            params: self.params,
            enters_mode_without_args: self.enters_mode_without_args,
            allow_root_cmds_in_mode: self.allow_root_cmds_in_mode,
            captures_unresolved: self.captures_unresolved,
            action: self.action,
            suggest_override: self.suggest_override,
            cleanup: self.cleanup,
        })
    }
}

/// Root-level command registry, built once at startup and passed into the
/// shell by reference.
#[derive(Default)]
pub struct Registry {
    cmds: BTreeMap<String, Arc<Command>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, builder: CommandBuilder) {
        let cmd = builder.seal("");
        self.cmds.insert(cmd.name.clone(), cmd);
    }

    /// Insert an already-sealed root command, replacing any previous one
    /// with the same name.
    pub fn upsert(&mut self, cmd: Arc<Command>) {
        self.cmds.insert(cmd.name.clone(), cmd);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Command>> {
        self.cmds.get(name)
    }

    pub fn cmds(&self) -> &BTreeMap<String, Arc<Command>> {
        &self.cmds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fqn_is_space_joined_path() {
        let cmd = CommandBuilder::new("get")
            .sub(CommandBuilder::new("users").sub(CommandBuilder::new("active")))
            .seal("");
        let users = cmd.sub_cmds().get("users").unwrap();
        let active = users.sub_cmds().get("active").unwrap();
        assert_eq!(cmd.fqn(), "get");
        assert_eq!(users.fqn(), "get users");
        assert_eq!(active.fqn(), "get users active");
    }

    #[test]
    fn test_registry_upsert_replaces() {
        let mut reg = Registry::new();
        reg.register(CommandBuilder::new("get").desc("first"));
        reg.register(CommandBuilder::new("get").desc("second"));
        assert_eq!(reg.get("get").unwrap().desc(), "second");
        assert_eq!(reg.cmds().len(), 1);
    }
}
