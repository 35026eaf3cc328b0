use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Editor, EventHandler, KeyEvent};

use reqshell::command::Registry;
use reqshell::commands;
use reqshell::config::{AppCfg, Flags};
use reqshell::env::EnvManager;
use reqshell::net::{self, RequestManager};
use reqshell::repl::completer::{ShellHelper, SwapKeyHandler};
use reqshell::repl::Shell;
use reqshell::sequence::store::SequenceStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cfg = AppCfg::from_flags(Flags::parse())?;

    let mut registry = Registry::new();
    commands::register_builtins(&mut registry);
    net::catalog::register(&mut registry, net::catalog::load(&cfg.requests_path)?);

    let shell = Shell::new(
        registry,
        EnvManager::new(),
        SequenceStore::load(&cfg.sequences_path)?,
        RequestManager::new(),
        cfg.prompt,
    );

    let mut rl: Editor<ShellHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(ShellHelper::new(shell.clone())));
    rl.bind_sequence(
        KeyEvent::ctrl('f'),
        EventHandler::Conditional(Box::new(SwapKeyHandler::new(shell.clone()))),
    );
    let history_path = cfg.config_dir.join("history.txt");
    let _ = rl.load_history(&history_path);

    loop {
        match rl.readline(&shell.prompt()) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                if let Err(e) = shell.dispatch(line) {
                    eprintln!("{}", e.to_string().red());
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            // One EOF pops one mode level; EOF at the root quits.
            Err(ReadlineError::Eof) => shell.pop_mode(),
            Err(e) => {
                eprintln!("read error: {e}");
                break;
            }
        }
        if shell.should_quit() {
            break;
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}
