//! Single UI actor for task output.
//!
//! Exactly one tokio task owns the terminal below the prompt: it selects
//! over status updates, foreground requests, and background requests, so
//! the spinner, the foreground/background registers, and completion
//! rendering can never race. Everything else only sends on the channels
//! or reads the shared registers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{TaskBoard, TaskStatus};

/// Senders feeding the listener. Cloneable; held by the shell and the
/// key-event handler.
#[derive(Clone)]
pub struct UiChannels {
    pub updates: UnboundedSender<TaskStatus>,
    pub foreground: UnboundedSender<String>,
    pub background: UnboundedSender<()>,
}

/// Shared foreground/background registers. The listener is the only
/// writer; the Ctrl-F key handler reads them to decide which request to
/// send.
#[derive(Clone, Default)]
pub struct FgState {
    pub curr_fg: Arc<Mutex<Option<String>>>,
    pub last_bg: Arc<Mutex<Option<String>>>,
}

impl FgState {
    pub fn foreground(&self) -> Option<String> {
        self.curr_fg.lock().expect("fg lock").clone()
    }

    pub fn backgrounded(&self) -> Option<String> {
        self.last_bg.lock().expect("fg lock").clone()
    }
}

fn spinner_for(status: &TaskStatus) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("spinner template"),
    );
    pb.set_message(format!("{} {}", status.id, status.message));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// One-line-plus-output rendering of a finished task.
pub fn render_result(status: &TaskStatus) -> String {
    let elapsed = Utc::now()
        .signed_duration_since(status.created_at)
        .num_milliseconds() as f64
        / 1000.0;

    if let Some(err) = &status.error {
        let mut out = format!("{} {} {err}", status.id.bold(), "failed:".red());
        if !status.output.is_empty() {
            out.push('\n');
            out.push_str(&status.output);
        }
        return out;
    }

    let mut out = format!(
        "{} {} {}",
        status.id.bold(),
        status.message.green(),
        format!("({elapsed:.1}s)").dimmed()
    );
    if !status.output.is_empty() {
        out.push('\n');
        out.push_str(&status.output);
    } else if let Some(result) = &status.result {
        out.push('\n');
        out.push_str(
            &serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string()),
        );
    }
    out
}

/// Spawn the listener actor. Returns the channels that feed it.
pub fn spawn(
    board: Arc<Mutex<TaskBoard>>,
    fg: FgState,
    cancel: CancellationToken,
) -> UiChannels {
    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel::<TaskStatus>();
    let (fg_tx, mut fg_rx) = mpsc::unbounded_channel::<String>();
    let (bg_tx, mut bg_rx) = mpsc::unbounded_channel::<()>();

    tokio::spawn(async move {
        let mut spinner: Option<ProgressBar> = None;

        loop {
            tokio::select! {
                Some(update) = updates_rx.recv() => {
                    handle_update(&board, &fg, &mut spinner, update);
                }
                Some(id) = fg_rx.recv() => {
                    handle_foreground(&board, &fg, &mut spinner, id);
                }
                Some(()) = bg_rx.recv() => {
                    handle_background(&fg, &mut spinner);
                }
                _ = cancel.cancelled() => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    break;
                }
                else => break,
            }
        }
        debug!("task listener stopped");
    });

    UiChannels {
        updates: updates_tx,
        foreground: fg_tx,
        background: bg_tx,
    }
}

fn handle_update(
    board: &Arc<Mutex<TaskBoard>>,
    fg: &FgState,
    spinner: &mut Option<ProgressBar>,
    update: TaskStatus,
) {
    let id = update.id.clone();
    let is_fg = fg.foreground().as_deref() == Some(id.as_str());
    let first_terminal = board.lock().expect("board lock").fold(update.clone());

    if !is_fg {
        // Background tasks finish quietly; their result waits on the
        // board until inspected or foregrounded.
        if update.is_terminal() {
            debug!(task = %id, "background task finished");
        }
        return;
    }

    if update.is_terminal() {
        if let Some(pb) = spinner.take() {
            pb.finish_and_clear();
        }
        if first_terminal {
            println!("{}", render_result(&update));
        }
        *fg.curr_fg.lock().expect("fg lock") = None;
    } else if let Some(pb) = spinner {
        pb.set_message(format!("{id} {}", update.message));
    }
}

fn handle_foreground(
    board: &Arc<Mutex<TaskBoard>>,
    fg: &FgState,
    spinner: &mut Option<ProgressBar>,
    id: String,
) {
    let status = board.lock().expect("board lock").get(&id).cloned();
    let Some(status) = status else {
        debug!(task = %id, "foreground request for unknown task");
        return;
    };

    {
        let mut last_bg = fg.last_bg.lock().expect("fg lock");
        if last_bg.as_deref() == Some(id.as_str()) {
            *last_bg = None;
        }
    }

    if status.is_terminal() {
        // An explicit request always shows the outcome, even if the
        // completion was already rendered live.
        board.lock().expect("board lock").mark_rendered(&id);
        println!("{}", render_result(&status));
        return;
    }

    *fg.curr_fg.lock().expect("fg lock") = Some(id);
    if let Some(pb) = spinner.take() {
        pb.finish_and_clear();
    }
    *spinner = Some(spinner_for(&status));
}

fn handle_background(fg: &FgState, spinner: &mut Option<ProgressBar>) {
    let Some(id) = fg.curr_fg.lock().expect("fg lock").take() else {
        return;
    };
    if let Some(pb) = spinner.take() {
        pb.finish_and_clear();
    }
    *fg.last_bg.lock().expect("fg lock") = Some(id.clone());
    println!("{}", format!("{id} moved to background (Ctrl+F to resume)").dimmed());
}
