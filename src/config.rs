use crate::env::Environment;
use crate::history::{self, HIST_MAX, History, HistorySync};
use std::path::PathBuf;

/// Startup file run before the first prompt, relative to `$HOME`.
pub const RC_FILE: &str = ".hshrc";

/// Primary prompt.
pub const PROMPT: &str = "$ ";

/// Where the session reads its lines from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Standard input is a terminal: line editor, prompt, rc file.
    Interactive,
    /// Standard input is a pipe or a file.
    Pipe,
    /// Lines come from a script file.
    Script(PathBuf),
    /// A single line given on the command line (`-c`).
    Command(String),
}

impl Mode {
    pub fn is_interactive(&self) -> bool {
        matches!(self, Mode::Interactive)
    }
}

/// Session settings, resolved from the environment and then overridden by
/// command-line options.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` keeps history in memory only.
    pub history_file: Option<PathBuf>,
    pub history_max: usize,
    pub history_sync: HistorySync,
    pub rc_file: Option<PathBuf>,
}

impl Config {
    /// Defaults from `HISTFILE`, `HISTSIZE`, `HSH_RC` and `HOME`.
    pub fn from_env(env: &Environment) -> Self {
        let home = env.get_var("HOME").filter(|h| !h.is_empty()).map(PathBuf::from);
        let history_file = non_empty(env.get_var("HISTFILE"))
            .map(PathBuf::from)
            .or_else(|| home.as_deref().map(history::default_path));
        let history_max = env
            .get_var("HISTSIZE")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(HIST_MAX);
        let rc_file = non_empty(env.get_var("HSH_RC"))
            .map(PathBuf::from)
            .or_else(|| home.map(|h| h.join(RC_FILE)));

        Self {
            history_file,
            history_max,
            history_sync: HistorySync::default(),
            rc_file,
        }
    }

    /// An empty history bound to the configured file.
    pub fn history(&self) -> History {
        History::new(self.history_file.clone(), self.history_max, self.history_sync)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
