//! `$set` — mutate shell state: variables, active environment, prompt.

use std::sync::Arc;

use crate::command::{Command, CommandBuilder, Invocation};
use crate::error::ShellError;
use crate::repl::Shell;
use crate::token;

pub fn command() -> CommandBuilder {
    CommandBuilder::new("$set")
        .desc("set shell state")
        .sub(
            CommandBuilder::new("var")
                .desc("set variables in the active environment (key=value ...)")
                .sync(set_var),
        )
        .sub(
            CommandBuilder::new("env")
                .desc("switch the active environment")
                .sync(set_env),
        )
        .sub(
            CommandBuilder::new("prompt")
                .desc("change the root prompt")
                .sync(set_prompt),
        )
}

fn set_var(_cmd: &Arc<Command>, inv: &Invocation, shell: &Arc<Shell>) -> Result<(), ShellError> {
    let pairs = token::key_vals(&inv.args)?;
    if pairs.is_empty() {
        return Err(ShellError::Exec(
            "usage: $set var key=value [key=value ...]".to_string(),
        ));
    }
    for (key, value) in pairs {
        shell.envs().set_var(&key, &value);
        inv.out.line(format!("{key} = {value}"));
    }
    Ok(())
}

fn set_env(_cmd: &Arc<Command>, inv: &Invocation, shell: &Arc<Shell>) -> Result<(), ShellError> {
    let name = inv
        .args
        .first()
        .ok_or_else(|| ShellError::Exec("usage: $set env <name>".to_string()))?;
    shell.envs().switch_env(name);
    inv.out.line(format!("active environment: {name}"));
    Ok(())
}

fn set_prompt(_cmd: &Arc<Command>, inv: &Invocation, shell: &Arc<Shell>) -> Result<(), ShellError> {
    if inv.args.is_empty() {
        return Err(ShellError::Exec("usage: $set prompt <text>".to_string()));
    }
    shell.set_prompt(inv.args.join(" "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::commands::tests::test_shell;

    #[tokio::test]
    async fn test_set_var_with_quoted_value() {
        let shell = test_shell();
        shell.dispatch("$set var name='John Doe' host=api.local").unwrap();
        assert_eq!(
            shell.envs().get_var("name").as_deref(),
            Some("John Doe")
        );
        assert_eq!(shell.envs().get_var("host").as_deref(), Some("api.local"));
    }

    #[tokio::test]
    async fn test_set_env_switches() {
        let shell = test_shell();
        shell.dispatch("$set var token=abc").unwrap();
        shell.dispatch("$set env staging").unwrap();
        assert_eq!(shell.envs().active_env(), "staging");
        assert_eq!(shell.envs().get_var("token"), None);
    }

    #[tokio::test]
    async fn test_set_prompt() {
        let shell = test_shell();
        shell.dispatch("$set prompt api shell").unwrap();
        assert!(shell.prompt().starts_with("api shell"));
    }
}
