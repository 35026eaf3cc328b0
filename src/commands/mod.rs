//! Built-in shell commands (`$`-prefixed, so they never collide with
//! catalog request commands).

pub mod ls;
pub mod play;
pub mod rec;
pub mod set;

use std::sync::Arc;

use crate::command::{Command, CommandBuilder, Invocation, Registry};
use crate::error::ShellError;
use crate::repl::Shell;

pub fn register_builtins(registry: &mut Registry) {
    registry.register(rec::command());
    registry.register(play::command());
    registry.register(ls::command());
    registry.register(set::command());
    registry.register(exit_command());
}

fn exit_command() -> CommandBuilder {
    CommandBuilder::new("$exit").desc("quit the shell").sync(
        |_: &Arc<Command>, _: &Invocation, shell: &Arc<Shell>| -> Result<(), ShellError> {
            shell.request_quit();
            Ok(())
        },
    )
}
