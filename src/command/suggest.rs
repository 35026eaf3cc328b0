//! Completion suggestions for partially typed lines.
//!
//! The engine walks to the deepest matched node, treats the last token as
//! the search string, and returns candidates with the matched prefix
//! stripped so the editor only appends the remainder. Commands get a
//! trailing space, parameters a trailing `=`, and parameter names already
//! used earlier on the line are filtered out.

use std::sync::Arc;

use crate::token;

use super::resolver::walk;
use super::Command;

/// Prefix-filter `candidates` against `search`, dropping exact matches, and
/// return each with the matched prefix stripped plus `suffix` appended.
pub fn filter_prefixed<'a>(
    candidates: impl Iterator<Item = &'a str>,
    search: &str,
    suffix: &str,
) -> Vec<String> {
    let mut out: Vec<String> = candidates
        .filter(|name| name.starts_with(search) && *name != search)
        .map(|name| format!("{}{suffix}", &name[search.len()..]))
        .collect();
    out.sort();
    out
}

/// Suggestions for a command node given the tokens typed after its name.
/// Returns the remainders plus the matched-prefix length (offset).
pub fn for_command(cmd: &Arc<Command>, tokens: &[String]) -> (Vec<String>, usize) {
    let (remaining, node) = walk(cmd, cmd.sub_cmds(), tokens);

    // Several unconsumed tokens can still be parameter positions, but only
    // for a parameter-bearing command.
    if remaining.len() > 1 {
        if node.params().is_empty() {
            return (Vec::new(), 0);
        }
        return param_suggestions(&node, tokens, remaining.last());
    }

    let search = remaining.first().map(String::as_str).unwrap_or("");
    let mut items = filter_prefixed(
        node.sub_cmds().keys().map(String::as_str),
        search,
        " ",
    );
    if !node.params().is_empty() {
        let (mut params, _) = param_suggestions(&node, tokens, remaining.first());
        items.append(&mut params);
    }
    (items, search.len())
}

/// Unused `key=` parameter names. The search string is the last token as
/// long as it does not already contain `=`.
fn param_suggestions(
    node: &Arc<Command>,
    typed: &[String],
    last: Option<&String>,
) -> (Vec<String>, usize) {
    let search = match last {
        Some(tok) if !tok.contains('=') => tok.as_str(),
        Some(_) => return (Vec::new(), 0),
        None => "",
    };

    let used = token::typed_keys(typed);
    let items = filter_prefixed(
        node.params()
            .iter()
            .map(String::as_str)
            .filter(|p| !used.iter().any(|u| u == p)),
        search,
        "=",
    );
    (items, search.len())
}

/// Whether the last token is an unclosed `{{var` reference; returns the
/// partial variable name.
pub fn variable_search(last_token: &str) -> Option<&str> {
    let idx = last_token.rfind("{{")?;
    let tail = &last_token[idx + 2..];
    if tail.contains("}}") {
        return None;
    }
    Some(tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandBuilder;

    fn toks(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn tree() -> Arc<Command> {
        CommandBuilder::new("get")
            .sub(CommandBuilder::new("users").params(&["limit", "offset"]))
            .sub(CommandBuilder::new("user-roles"))
            .seal("")
    }

    #[test]
    fn test_prefix_stripped_with_delimiter() {
        let root = tree();
        let (items, offset) = for_command(&root, &toks(&["use"]));
        assert_eq!(items, vec!["r-roles ".to_string(), "rs ".to_string()]);
        assert_eq!(offset, 3);
    }

    #[test]
    fn test_exact_match_excluded() {
        let root = tree();
        let (items, _) = for_command(&root, &toks(&["user-roles"]));
        assert!(items.is_empty());
    }

    #[test]
    fn test_param_suggestions_with_delimiter() {
        let root = tree();
        let (items, offset) = for_command(&root, &toks(&["users", "li"]));
        assert_eq!(items, vec!["mit=".to_string()]);
        assert_eq!(offset, 2);
    }

    #[test]
    fn test_used_params_filtered() {
        let root = tree();
        let (items, _) = for_command(&root, &toks(&["users", "limit=5", "o"]));
        assert_eq!(items, vec!["ffset=".to_string()]);
    }

    #[test]
    fn test_empty_search_lists_all() {
        let root = tree();
        let (items, offset) = for_command(&root, &[]);
        assert_eq!(offset, 0);
        assert!(items.contains(&"users ".to_string()));
        assert!(items.contains(&"user-roles ".to_string()));
    }

    #[test]
    fn test_variable_search() {
        assert_eq!(variable_search("url={{ho"), Some("ho"));
        assert_eq!(variable_search("url={{host}}"), None);
        assert_eq!(variable_search("plain"), None);
    }
}
