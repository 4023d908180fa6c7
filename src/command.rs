use crate::state::ShellState;
use anyhow::Result;
use std::io::Write;

/// Status of a finished sub-command: 0 is success, anything else a failure.
///
/// The same value is exposed as `$?` and becomes the process exit code.
pub type ExitCode = i32;

/// A command ready to run: its arguments are parsed and its program resolved.
pub trait ExecutableCommand {
    /// Executes the command against the session state.
    ///
    /// Built-ins write their output to `stdout`; external commands inherit the
    /// process's standard streams and ignore it.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, state: &mut ShellState)
    -> Result<ExitCode>;
}

/// Creates one kind of command by name.
pub trait CommandFactory {
    /// Name the factory answers to.
    fn name(&self) -> &'static str;

    /// Full usage text, as printed by `NAME --help`.
    fn usage(&self) -> String;

    /// Build the command, or `None` when `name` is not this factory's.
    ///
    /// Argument errors still yield a command, which reports them when run.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}
