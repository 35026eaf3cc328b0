//! reqshell — an interactive shell for composing and firing HTTP requests.
//!
//! The core is a command-dispatch engine: lines are tokenized, resolved
//! against a registered command tree (respecting the active mode), and
//! executed either inline or as tracked asynchronous tasks with
//! foreground/background swapping. On top of that sit recordable,
//! replayable command sequences with cross-step result references.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use reqshell::command::Registry;
//! use reqshell::env::EnvManager;
//! use reqshell::net::RequestManager;
//! use reqshell::repl::Shell;
//! use reqshell::sequence::store::SequenceStore;
//!
//! # #[tokio::main] async fn main() {
//! let mut registry = Registry::new();
//! reqshell::commands::register_builtins(&mut registry);
//! let shell = Shell::new(
//!     registry,
//!     EnvManager::new(),
//!     SequenceStore::in_memory(),
//!     RequestManager::new(),
//!     "reqshell".to_string(),
//! );
//! shell.dispatch("$set var host=api.local").unwrap();
//! # }
//! ```

pub mod command;
pub mod commands;
pub mod config;
pub mod env;
pub mod error;
pub mod net;
pub mod repl;
pub mod sequence;
pub mod task;
pub mod token;

pub use error::ShellError;
pub use repl::Shell;
