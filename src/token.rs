//! Line tokenizer and `key=value` parameter parser.
//!
//! Tokenization is a plain whitespace split. On top of that sits the quoted
//! span recombiner: a token like `name='John` opens a span that swallows the
//! following tokens (rejoined with single spaces) until one of them ends
//! with the same quote character. The key/value parser then splits each
//! recombined token on the first `=`; tokens without `=` are positional and
//! ignored here.

use std::collections::HashMap;

use crate::error::ParseError;

/// Split a line into whitespace-separated tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Whether a token of the form `key='...` opens a quoted span, returning the
/// quote character if so.
fn opens_quote(token: &str) -> Option<char> {
    let (_, value) = token.split_once('=')?;
    let quote = value.chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    // `key='v'` is already closed.
    if value.len() >= 2 && value.ends_with(quote) {
        return None;
    }
    Some(quote)
}

/// Recombine tokens that belong to one quoted `key='...'` span.
pub fn recombine_quoted(tokens: &[String]) -> Result<Vec<String>, ParseError> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut open: Option<(char, String, String)> = None;

    for token in tokens {
        match open.take() {
            None => match opens_quote(token) {
                Some(quote) => open = Some((quote, token.clone(), token.clone())),
                None => out.push(token.clone()),
            },
            Some((quote, start, mut acc)) => {
                acc.push(' ');
                acc.push_str(token);
                if token.ends_with(quote) {
                    out.push(acc);
                } else {
                    open = Some((quote, start, acc));
                }
            }
        }
    }

    // The error points at the token that opened the span, not the
    // accumulated text.
    if let Some((_, start, _)) = open {
        return Err(ParseError::UnclosedQuote(start));
    }
    Ok(out)
}

/// Strip one pair of matching surrounding quotes. Asymmetric or single
/// quotes are left alone.
fn strip_quotes(value: &str) -> &str {
    let mut chars = value.chars();
    match (chars.next(), value.chars().last()) {
        (Some(first), Some(last))
            if first == last && (first == '\'' || first == '"') && value.len() >= 2 =>
        {
            &value[1..value.len() - 1]
        }
        _ => value,
    }
}

/// Parse `key=value` pairs out of a token list, recombining quoted spans
/// first. Positional tokens (no `=`) are skipped.
pub fn key_vals(tokens: &[String]) -> Result<HashMap<String, String>, ParseError> {
    let mut pairs = HashMap::new();
    for token in recombine_quoted(tokens)? {
        if let Some((key, value)) = token.split_once('=') {
            pairs.insert(key.to_string(), strip_quotes(value).to_string());
        }
    }
    Ok(pairs)
}

/// Keys already present among typed tokens, used to filter parameter
/// suggestions.
pub fn typed_keys(tokens: &[String]) -> Vec<String> {
    tokens
        .iter()
        .filter_map(|t| t.split_once('=').map(|(k, _)| k.to_string()))
        .collect()
}
