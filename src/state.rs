use crate::alias::AliasList;
use crate::command::ExitCode;
use crate::env::Environment;
use crate::expand::VarContext;
use crate::history::History;

/// Everything one shell session owns.
///
/// Created once at startup and handed by reference to every component; the
/// session loop is the only owner.
#[derive(Debug)]
pub struct ShellState {
    /// Name used as the prefix of error messages (`argv[0]`).
    pub program: String,
    pub env: Environment,
    pub aliases: AliasList,
    pub history: History,
    /// Status of the most recently completed sub-command.
    pub last_status: ExitCode,
    /// Physical input lines read so far.
    pub line_count: usize,
    /// Whether lines come from a terminal.
    pub interactive: bool,
    /// Set by `exit`: terminate the session with this code.
    pub should_exit: Option<ExitCode>,
}

impl ShellState {
    pub fn new(program: impl Into<String>, env: Environment, history: History) -> Self {
        Self {
            program: program.into(),
            env,
            aliases: AliasList::new(),
            history,
            last_status: 0,
            line_count: 0,
            interactive: false,
            should_exit: None,
        }
    }

    /// Values for the variable pass, taken from the live state.
    pub fn var_context(&self) -> VarContext<'_> {
        VarContext {
            env: &self.env,
            last_status: self.last_status,
            pid: std::process::id(),
        }
    }
}
