//! Error types for the shell, using thiserror for proper error chains.
//!
//! The taxonomy mirrors how errors actually travel through the REPL:
//! resolution and parse errors are reported inline and never kill the read
//! loop; async execution errors only ever surface through a task's terminal
//! state; sequence errors are always wrapped with the failing step's
//! identity before they reach the user.

use thiserror::Error;

/// Top-level error type for a single dispatched line.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("{0}")]
    Exec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tokenizer / key-value parameter errors.
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("unclosed quote starting at: {0}")]
    UnclosedQuote(String),
}

/// Command-resolution errors. Non-fatal, reported inline.
#[derive(Error, Debug, PartialEq)]
pub enum ResolveError {
    #[error("no command provided")]
    Empty,

    #[error("invalid command '{0}'")]
    InvalidCommand(String),

    #[error("incomplete/invalid command")]
    Incomplete,
}

/// Environment / variable errors.
#[derive(Error, Debug, PartialEq)]
pub enum EnvError {
    #[error("circular dependency detected, failed to expand variable: {0}")]
    CircularVariable(String),

    #[error("variable '{0}' not found")]
    UnknownVariable(String),
}

/// Placeholder-expansion errors raised while preparing a sequence step.
#[derive(Error, Debug)]
pub enum ExpandError {
    #[error("invalid step expansion format: {0}")]
    BadFormat(String),

    #[error("step {step} is out of range (sequence has {len} steps)")]
    StepOutOfRange { step: usize, len: usize },

    #[error("step {0} has no result available")]
    NoResult(usize),

    #[error("key '{0}' not found in response body")]
    KeyNotFound(String),

    #[error("expected array at '{0}'")]
    NotAnArray(String),

    #[error("field '{0}' not found in matching object")]
    FieldNotFound(String),

    #[error("no matching items found for {property}={value}")]
    NoMatches { property: String, value: String },

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Sequence lifecycle and playback errors.
#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("sequence '{0}' not found")]
    NotFound(String),

    #[error("sequence '{0}' already exists")]
    AlreadyExists(String),

    #[error("cannot finalize sequence '{0}', no steps were added")]
    Empty(String),

    #[error("failed to expand token '{token}' in {step}: {source}")]
    Expansion {
        step: String,
        token: String,
        #[source]
        source: ExpandError,
    },

    #[error("sequence '{sequence}' failed at {step}: {reason}")]
    StepFailed {
        sequence: String,
        step: String,
        reason: String,
    },
}

/// Durable sequence-store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read sequence store: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write sequence store: {0}")]
    Write(#[source] std::io::Error),

    #[error("malformed sequence store: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// HTTP collaborator errors.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("cannot finalize request draft, url and method not set")]
    DraftIncomplete,

    #[error("unsupported http method '{0}'")]
    BadMethod(String),

    #[error("request failed: {0}")]
    Send(#[from] reqwest::Error),
}
