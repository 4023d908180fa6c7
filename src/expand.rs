//! Alias and variable substitution.
//!
//! Substitution runs in two passes, aliases first. The alias pass rewrites the
//! first word of a sub-command and re-splits the result at chain operators;
//! its output is never alias-expanded again. The variable pass rewrites
//! `$$`, `$?` and `$NAME` inside every word.

use crate::alias::AliasList;
use crate::command::ExitCode;
use crate::env::Environment;
use crate::lexer::{self, SubCommand};
use log::{debug, warn};
use regex::{Captures, Regex};
use std::sync::OnceLock;

const VAR_PATTERN: &str = r"\$(?:(\$)|(\?)|([A-Za-z_][A-Za-z0-9_]*))";

/// Expand an alias in the first word of `sub`.
///
/// Returns `None` when the first word is not an alias. Otherwise the alias
/// value replaces that word, the rewritten text is split again at chain
/// operators, and the pieces are returned in order: the first inherits the
/// operator of `sub`, all of them are marked as already aliased.
pub fn expand_alias(sub: &SubCommand, aliases: &AliasList) -> Option<Vec<SubCommand>> {
    let text = sub.text.trim_start_matches([' ', '\t']);
    let end = text.find([' ', '\t']).unwrap_or(text.len());
    let (first, rest) = text.split_at(end);
    let alias = aliases.get(first)?;

    let rewritten = format!("{}{}", alias.value, rest);
    debug!("alias {:?} -> {:?}", first, rewritten);

    let mut pieces = lexer::split_chain(&rewritten);
    for (i, piece) in pieces.iter_mut().enumerate() {
        if i == 0 {
            piece.op = sub.op;
        }
        piece.aliased = true;
    }
    Some(pieces)
}

/// Values the variable pass substitutes.
pub struct VarContext<'a> {
    pub env: &'a Environment,
    pub last_status: ExitCode,
    pub pid: u32,
}

impl VarContext<'_> {
    fn lookup(&self, caps: &Captures<'_>) -> String {
        if caps.get(1).is_some() {
            self.pid.to_string()
        } else if caps.get(2).is_some() {
            self.last_status.to_string()
        } else {
            caps.get(3)
                .and_then(|name| self.env.get_var(name.as_str()))
                .unwrap_or_default()
                .to_string()
        }
    }
}

/// Replace variable references in every word.
///
/// Unset variables expand to the empty string; a `$` that does not start a
/// reference is kept. If the pattern cannot be compiled the words are left
/// unexpanded.
pub fn expand_vars(words: &mut [String], ctx: &VarContext<'_>) {
    let Some(re) = var_regex() else {
        return;
    };
    for word in words.iter_mut().filter(|w| w.contains('$')) {
        let expanded = re
            .replace_all(word, |caps: &Captures<'_>| ctx.lookup(caps))
            .into_owned();
        *word = expanded;
    }
}

fn var_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(VAR_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("variable expansion disabled: {}", e);
            None
        }
    })
    .as_ref()
}
