use crate::builtin;
use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::config::{Config, Mode};
use crate::env::Environment;
use crate::error::{ShellError, status_of};
use crate::expand;
use crate::external::ExternalCommand;
use crate::lexer::{self, SubCommand};
use crate::state::ShellState;
use log::{debug, error, trace, warn};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::path::Path;

/// Status of a child killed by SIGINT.
const INTERRUPTED: ExitCode = 128 + 2;

/// A shell session: reads lines, resolves chains, aliases and variables, and
/// runs each sub-command as a built-in or an external program.
///
/// Example
/// ```
/// use simple_shell::{Interpreter, ShellState, env::Environment, history::History};
/// let state = ShellState::new("hsh", Environment::new(), History::in_memory(16));
/// let mut sh = Interpreter::new(state);
/// assert_eq!(sh.run_line("setenv GREETING hi && exit 3"), Some(3));
/// assert_eq!(sh.state().env.get_var("GREETING"), Some("hi"));
/// ```
pub struct Interpreter {
    state: ShellState,
    // Sub-commands of the current line still to run.
    pending: VecDeque<SubCommand>,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl Interpreter {
    /// Create an interpreter writing to the process's standard streams.
    pub fn new(state: ShellState) -> Self {
        Self::with_output(state, Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Create an interpreter with redirected built-in output and error reports.
    pub fn with_output(state: ShellState, stdout: Box<dyn Write>, stderr: Box<dyn Write>) -> Self {
        Self {
            state,
            pending: VecDeque::new(),
            stdout,
            stderr,
        }
    }

    /// Build the session for `mode`: snapshot the environment and load history.
    pub fn from_config(program: &str, config: &Config, mode: &Mode) -> Self {
        let mut history = config.history();
        if let Err(e) = history.load() {
            warn!("history: {:#}", e);
        }
        let mut state = ShellState::new(program, Environment::new(), history);
        state.interactive = mode.is_interactive();
        Self::new(state)
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ShellState {
        &mut self.state
    }

    /// Process one physical input line.
    ///
    /// Returns `Some(code)` when the session must terminate (the `exit`
    /// built-in ran); remaining sub-commands of the line are discarded.
    pub fn run_line(&mut self, line: &str) -> Option<ExitCode> {
        self.state.line_count += 1;
        self.execute_line(line, true)
    }

    fn execute_line(&mut self, line: &str, record: bool) -> Option<ExitCode> {
        let line = accepted_text(line)?;
        if record {
            if let Err(e) = self.state.history.push(line) {
                warn!("history: {:#}", e);
            }
        }

        self.pending = lexer::split_chain(line).into();
        debug!("line {}: {:?}", self.state.line_count, self.pending);

        while let Some(sub) = self.pending.pop_front() {
            if !sub.op.permits(self.state.last_status) {
                trace!("skipping {:?} after status {}", sub.text, self.state.last_status);
                continue;
            }
            self.run_subcommand(sub);
            if let Some(code) = self.state.should_exit {
                self.pending.clear();
                return Some(code);
            }
        }
        None
    }

    fn run_subcommand(&mut self, sub: SubCommand) {
        let sub = if sub.aliased {
            sub
        } else {
            match expand::expand_alias(&sub, &self.state.aliases) {
                Some(pieces) => match self.splice(pieces) {
                    Some(first) => first,
                    None => return,
                },
                None => sub,
            }
        };
        if sub.is_blank() {
            return;
        }

        let mut words = lexer::split_words(&sub.text);
        expand::expand_vars(&mut words, &self.state.var_context());
        let Some((name, args)) = words.split_first() else {
            return;
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        self.state.last_status = match self.dispatch(name, &args) {
            Ok(code) => code,
            Err(err) => {
                self.report(name, &err);
                status_of(&err)
            }
        };
        if self.state.interactive && self.state.last_status == INTERRUPTED {
            let _ = writeln!(self.stdout);
        }
        if let Err(e) = self.stdout.flush() {
            warn!("can't flush output: {}", e);
        }
    }

    /// Queue all but the first piece of an alias expansion in front of the
    /// rest of the line and return the first.
    fn splice(&mut self, pieces: Vec<SubCommand>) -> Option<SubCommand> {
        let mut pieces = pieces.into_iter();
        let first = pieces.next();
        for piece in pieces.rev() {
            self.pending.push_front(piece);
        }
        first
    }

    fn dispatch(&mut self, name: &str, args: &[&str]) -> anyhow::Result<ExitCode> {
        let cmd: Box<dyn ExecutableCommand> =
            match builtin::find_builtin(name).and_then(|b| b.try_create(name, args)) {
                Some(cmd) => cmd,
                None => Box::new(ExternalCommand::resolve(&self.state, name, args)?),
            };
        cmd.execute(&mut *self.stdout, &mut self.state)
    }

    fn report(&mut self, name: &str, err: &anyhow::Error) {
        let message = match err.downcast_ref::<ShellError>() {
            Some(e) => e.to_string(),
            None => format!("{}: {:#}", name, err),
        };
        let _ = writeln!(
            self.stderr,
            "{}: {}: {}",
            self.state.program, self.state.line_count, message
        );
    }

    /// Interactive loop on a terminal.
    ///
    /// An interrupt discards the line being typed and prompts again; EOF ends
    /// the session with the last status.
    pub fn repl(&mut self, prompt: &str) -> ExitCode {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                error!("can't start line editor: {}", e);
                return self.run_reader(io::stdin().lock());
            }
        };
        for entry in self.state.history.entries() {
            let _ = rl.add_history_entry(entry.line.as_str());
        }

        loop {
            match rl.readline(prompt) {
                Ok(line) => {
                    if let Some(text) = accepted_text(&line) {
                        let _ = rl.add_history_entry(text);
                    }
                    if let Some(code) = self.run_line(&line) {
                        return code;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    let _ = writeln!(self.stdout);
                    break;
                }
                Err(err) => {
                    error!("can't read input: {}", err);
                    break;
                }
            }
        }
        self.state.last_status
    }

    /// Run every line from `reader` until EOF or `exit`.
    pub fn run_reader<R: BufRead>(&mut self, mut reader: R) -> ExitCode {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if let Some(code) = self.run_line(&line) {
                        return code;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("can't read input: {}", e);
                    break;
                }
            }
        }
        self.state.last_status
    }

    /// Run a script file.
    ///
    /// A missing file reports `Can't open` with status 127, an unreadable one 126.
    pub fn run_script(&mut self, path: &Path) -> ExitCode {
        match File::open(path) {
            Ok(file) => self.run_reader(BufReader::new(file)),
            Err(e) => {
                let _ = writeln!(
                    self.stderr,
                    "{}: 0: Can't open {}",
                    self.state.program,
                    path.display()
                );
                match e.kind() {
                    ErrorKind::PermissionDenied => 126,
                    _ => 127,
                }
            }
        }
    }

    /// Run a single command line (`-c`).
    pub fn run_command(&mut self, line: &str) -> ExitCode {
        self.run_line(line).unwrap_or(self.state.last_status)
    }

    /// Execute the lines of a startup file without recording them.
    ///
    /// Returns `Some(code)` if the file ran `exit`.
    pub fn source_rc(&mut self, path: &Path) -> Option<ExitCode> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("can't read {}: {}", path.display(), e);
                return None;
            }
        };
        let saved = std::mem::take(&mut self.state.line_count);
        let mut outcome = None;
        for line in content.lines() {
            self.state.line_count += 1;
            outcome = self.execute_line(line, false);
            if outcome.is_some() {
                break;
            }
        }
        self.state.line_count = saved;
        outcome
    }

    /// Release session resources: persist history and flush output.
    pub fn finish(&mut self) {
        if let Err(e) = self.state.history.finish() {
            warn!("history: {:#}", e);
        }
        let _ = self.stdout.flush();
        let _ = self.stderr.flush();
    }
}

/// The part of an input line that is executed and recorded, or `None` for a
/// blank or comment-only line.
fn accepted_text(line: &str) -> Option<&str> {
    let line = lexer::strip_comment(line.trim_end_matches(['\n', '\r'])).trim_end();
    if line.trim_start().is_empty() {
        None
    } else {
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;
    use crate::io_adapters::MemWriter;
    use std::fs;

    struct Session {
        sh: Interpreter,
        out: MemWriter,
        err: MemWriter,
    }

    fn session() -> Session {
        // Other tests move the process's working directory around.
        let env = Environment::from_pairs(std::env::vars(), std::env::temp_dir());
        let state = ShellState::new("hsh", env, History::in_memory(64));
        let out = MemWriter::new();
        let err = MemWriter::new();
        let sh = Interpreter::with_output(state, Box::new(out.clone()), Box::new(err.clone()));
        Session { sh, out, err }
    }

    fn var<'a>(s: &'a Session, name: &str) -> Option<&'a str> {
        s.sh.state().env.get_var(name)
    }

    #[test]
    fn test_sequence_runs_regardless_of_status() {
        let mut s = session();
        s.sh.run_line("false ; setenv RAN yes");
        assert_eq!(var(&s, "RAN"), Some("yes"));
        assert_eq!(s.sh.state().last_status, 0);
    }

    #[test]
    fn test_and_runs_only_after_success() {
        let mut s = session();
        s.sh.run_line("true && setenv A 1");
        s.sh.run_line("false && setenv B 1");
        assert_eq!(var(&s, "A"), Some("1"));
        assert_eq!(var(&s, "B"), None);
        assert_ne!(s.sh.state().last_status, 0);
    }

    #[test]
    fn test_or_runs_only_after_failure() {
        let mut s = session();
        s.sh.run_line("false || setenv A recovered");
        s.sh.run_line("true || setenv B 1");
        assert_eq!(var(&s, "A"), Some("recovered"));
        assert_eq!(var(&s, "B"), None);
        assert_eq!(s.sh.state().last_status, 0);
    }

    #[test]
    fn test_skipped_subcommand_keeps_status() {
        let mut s = session();
        s.sh.run_line("false && true || setenv C 1");
        assert_eq!(var(&s, "C"), Some("1"));
    }

    #[test]
    fn test_blank_subcommands_are_noops() {
        let mut s = session();
        s.sh.run_line("false ; ;");
        assert_ne!(s.sh.state().last_status, 0);
        assert_eq!(s.sh.run_line("   "), None);
        assert_eq!(s.sh.state().line_count, 2);
    }

    #[test]
    fn test_not_found_reports_and_sets_127() {
        let mut s = session();
        s.sh.run_line("true");
        s.sh.run_line("no_such_command_hsh_test arg");
        assert_eq!(s.sh.state().last_status, 127);
        assert_eq!(s.err.contents(), "hsh: 2: no_such_command_hsh_test: not found\n");
    }

    #[test]
    fn test_status_variable_expands() {
        let mut s = session();
        s.sh.run_line("false");
        s.sh.run_line("setenv CODE $?");
        assert_eq!(var(&s, "CODE"), Some("1"));

        s.sh.state_mut().last_status = 3;
        s.sh.run_line("setenv CODE $? ; setenv AGAIN $?");
        assert_eq!(var(&s, "CODE"), Some("3"));
        assert_eq!(var(&s, "AGAIN"), Some("0"));
    }

    #[test]
    fn test_pid_variable_expands() {
        let mut s = session();
        s.sh.run_line("setenv ME $$");
        assert_eq!(var(&s, "ME"), Some(std::process::id().to_string().as_str()));
    }

    #[test]
    fn test_alias_expands_and_reinjects_chain() {
        let mut s = session();
        // Chain operators are split before `alias` sees its arguments.
        s.sh.state_mut().aliases.set("both", "false || setenv X from_alias");
        s.sh.run_line("both ; setenv Y after");
        assert_eq!(var(&s, "X"), Some("from_alias"));
        assert_eq!(var(&s, "Y"), Some("after"));
    }

    #[test]
    fn test_alias_is_not_expanded_twice() {
        let mut s = session();
        s.sh.run_line("alias loop='loop'");
        s.sh.run_line("loop");
        assert_eq!(s.sh.state().last_status, 127);
        assert!(s.err.contents().contains("loop: not found"));
    }

    #[test]
    fn test_alias_output_matches_literal() {
        let mut s = session();
        s.sh.run_line("alias e='env'");
        s.sh.run_line("e");
        let aliased = s.out.contents();
        let mut t = session();
        t.sh.state_mut().aliases.set("e", "env");
        t.sh.run_line("env");
        assert_eq!(aliased, t.out.contents());
    }

    #[test]
    fn test_exit_stops_the_line() {
        let mut s = session();
        assert_eq!(s.sh.run_line("exit 42 ; setenv NO 1"), Some(42));
        assert_eq!(var(&s, "NO"), None);
    }

    #[test]
    fn test_bad_exit_keeps_session() {
        let mut s = session();
        assert_eq!(s.sh.run_line("exit abc"), None);
        assert_eq!(s.sh.state().last_status, 2);
        assert_eq!(s.err.contents(), "hsh: 1: exit: Illegal number: abc\n");
    }

    #[test]
    fn test_history_records_lines_without_comments() {
        let mut s = session();
        s.sh.run_line("setenv A 1 # comment");
        s.sh.run_line("# only a comment");
        s.sh.run_line("history");
        assert_eq!(s.out.contents(), "0 setenv A 1\n1 history\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_child_sees_session_environment() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("check");
        fs::write(&script, "#!/bin/sh\ntest \"$HSH_CHILD_VAR\" = 7\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let mut s = session();
        s.sh.run_line(&script.display().to_string());
        assert_eq!(s.sh.state().last_status, 1);
        s.sh.run_line("setenv HSH_CHILD_VAR 7");
        s.sh.run_line(&script.display().to_string());
        assert_eq!(s.sh.state().last_status, 0);
    }

    #[test]
    fn test_unset_path_hides_commands() {
        let mut s = session();
        s.sh.run_line("unsetenv PATH");
        s.sh.run_line("no_such_tool_without_path");
        assert_eq!(s.sh.state().last_status, 127);
    }

    #[test]
    fn test_child_exit_status_is_captured() {
        let mut s = session();
        s.sh.run_line("false");
        assert_eq!(s.sh.state().last_status, 1);
        s.sh.run_line("true");
        assert_eq!(s.sh.state().last_status, 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_non_executable_file_sets_126() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("not_exec");
        fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();

        let mut s = session();
        s.sh.run_line(&script.display().to_string());
        assert_eq!(s.sh.state().last_status, 126);
        assert!(s.err.contents().contains("Permission denied"));
    }

    #[test]
    fn test_accepted_text_matches_recorded_history() {
        assert_eq!(accepted_text("ls -l  # long\n"), Some("ls -l"));
        assert_eq!(accepted_text("   \n"), None);
        assert_eq!(accepted_text("# just a note"), None);

        let mut s = session();
        for line in ["echo a # x", "", "  # y", "echo b"] {
            s.sh.run_line(line);
        }
        let recorded: Vec<&str> = s.sh.state().history.entries().iter().map(|e| e.line.as_str()).collect();
        let accepted: Vec<&str> = ["echo a # x", "", "  # y", "echo b"]
            .into_iter()
            .filter_map(accepted_text)
            .collect();
        assert_eq!(recorded, accepted);
    }

    #[test]
    fn test_run_reader_stops_at_exit() {
        let mut s = session();
        let input = "setenv A 1\nexit 5\nsetenv B 1\n";
        assert_eq!(s.sh.run_reader(input.as_bytes()), 5);
        assert_eq!(var(&s, "A"), Some("1"));
        assert_eq!(var(&s, "B"), None);
    }

    #[test]
    fn test_run_reader_returns_last_status_at_eof() {
        let mut s = session();
        assert_eq!(s.sh.run_reader("true\nfalse\n".as_bytes()), 1);
    }

    #[test]
    fn test_missing_script_is_127() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session();
        let missing = dir.path().join("missing.sh");
        assert_eq!(s.sh.run_script(&missing), 127);
        assert_eq!(
            s.err.contents(),
            format!("hsh: 0: Can't open {}\n", missing.display())
        );
    }

    #[test]
    fn test_rc_file_defines_aliases_without_history() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join("rc");
        fs::write(&rc, "alias ll='ls -la'\nsetenv FROM_RC 1\n").unwrap();

        let mut s = session();
        assert_eq!(s.sh.source_rc(&rc), None);
        assert!(s.sh.state().aliases.get("ll").is_some());
        assert_eq!(var(&s, "FROM_RC"), Some("1"));
        assert!(s.sh.state().history.entries().is_empty());
        assert_eq!(s.sh.state().line_count, 0);
    }
}
