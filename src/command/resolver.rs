//! Tree resolution: mapping a token stream onto the deepest matching
//! command node by exact literal lookup. Prefix and fuzzy matching belong
//! to the suggestion engine, never to resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ResolveError;

use super::{Action, Command};

/// Walk from `cmd` down the tree, consuming one token per exact sub-command
/// match. `first_map` is the lookup map for the first hop (callers merge
/// in-mode commands into it when a mode is active); deeper hops use each
/// node's own sub-command map. Returns the unconsumed tokens and the
/// deepest node reached.
pub fn walk(
    cmd: &Arc<Command>,
    first_map: &BTreeMap<String, Arc<Command>>,
    tokens: &[String],
) -> (Vec<String>, Arc<Command>) {
    let Some(first) = tokens.first() else {
        return (Vec::new(), cmd.clone());
    };

    match first_map.get(first) {
        Some(child) => walk(child, child.sub_cmds(), &tokens[1..]),
        None => (tokens.to_vec(), cmd.clone()),
    }
}

/// Resolve `tokens` against `root`'s sub-commands, returning the resolved
/// command and its argument tokens (the tail the walk did not consume).
pub fn resolve(root: &Arc<Command>, tokens: &[String]) -> (Arc<Command>, Vec<String>) {
    walk_args(root, root.sub_cmds(), tokens)
}

/// Like [`resolve`], with an explicit first-hop map (mode dispatch merges
/// sub-commands with in-mode commands).
pub fn walk_args(
    root: &Arc<Command>,
    first_map: &BTreeMap<String, Arc<Command>>,
    tokens: &[String],
) -> (Arc<Command>, Vec<String>) {
    let (remaining, cmd) = walk(root, first_map, tokens);
    (cmd, remaining)
}

/// A grouping node with unconsumed tokens is an incomplete command: the
/// tokens matched part of a hierarchy but never reached anything runnable.
pub fn check_runnable(cmd: &Command, args: &[String]) -> Result<(), ResolveError> {
    if matches!(cmd.action(), Action::Group) && !args.is_empty() {
        return Err(ResolveError::Incomplete);
    }
    Ok(())
}

/// Merge a mode command's sub-commands with its in-mode commands for
/// first-hop resolution.
pub fn merged_mode_map(cmd: &Command) -> BTreeMap<String, Arc<Command>> {
    let mut map = cmd.sub_cmds().clone();
    for (name, sub) in cmd.in_mode_cmds() {
        map.insert(name.clone(), sub.clone());
    }
    map
}
