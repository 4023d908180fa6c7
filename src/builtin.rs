use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::error::ShellError;
use crate::state::ShellState;
use anyhow::Result;
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::io::Write;
use std::marker::PhantomData;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "exit" or "cd".
    fn name() -> &'static str;

    /// Executes the command against the session state.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode> {
        T::execute(*self, stdout, state)
    }
}

/// Result of an argument list `argh` refused, or of `--help`.
struct InvalidArgs {
    command: &'static str,
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, _state: &mut ShellState) -> Result<ExitCode> {
        if self.is_error {
            let message = self.output.split_whitespace().collect::<Vec<_>>().join(" ");
            return Err(ShellError::Usage {
                command: self.command.to_string(),
                message,
            }
            .into());
        }
        stdout.write_all(self.output.as_bytes())?;
        Ok(0)
    }
}

/// Factory allows creating instances of a built-in by name.
pub(crate) struct Factory<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Factory<T> {
    pub(crate) const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn usage(&self) -> String {
        match T::from_args(&[T::name()], &["--help"]) {
            Err(EarlyExit { output, .. }) => output,
            Ok(_) => String::new(),
        }
    }

    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name != T::name() {
            return None;
        }
        // Operands are free-form ("cd -", "exit -1"): only a leading --help is an option.
        let mut argv = Vec::with_capacity(args.len() + 1);
        if args.first() != Some(&"--help") {
            argv.push("--");
        }
        argv.extend_from_slice(args);

        Some(match T::from_args(&[name], &argv) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                command: T::name(),
                output,
                is_error: status.is_err(),
            }),
        })
    }
}

/// Entry of the built-in table.
pub type Builtin = &'static (dyn CommandFactory + Sync);

const EXIT: Factory<Exit> = Factory::new();
const CD: Factory<Cd> = Factory::new();
const HELP: Factory<Help> = Factory::new();
const ENV: Factory<Env> = Factory::new();
const SETENV: Factory<Setenv> = Factory::new();
const UNSETENV: Factory<Unsetenv> = Factory::new();
const ALIAS: Factory<Alias> = Factory::new();
const HISTORY: Factory<History> = Factory::new();

static BUILTINS: [Builtin; 8] = [
    &EXIT, &CD, &HELP, &ENV, &SETENV, &UNSETENV, &ALIAS, &HISTORY,
];

/// The fixed table of built-ins, in `help` order.
pub fn builtins() -> &'static [Builtin] {
    &BUILTINS
}

/// Find the built-in whose name is exactly `name`.
pub fn find_builtin(name: &str) -> Option<Builtin> {
    BUILTINS.iter().copied().find(|b| b.name() == name)
}

#[derive(FromArgs)]
/// Exit the shell with status N, or with the status of the last command.
pub struct Exit {
    #[argh(positional)]
    /// exit status; a non-negative integer, taken modulo 256.
    pub status: Option<String>,
}

impl Exit {
    fn parse_status(arg: &str) -> Option<ExitCode> {
        let digits = arg.strip_prefix('+').unwrap_or(arg);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<i32>().ok().map(|n| n & 0xFF)
    }
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode> {
        let code = match &self.status {
            None => state.last_status,
            Some(arg) => {
                Self::parse_status(arg).ok_or_else(|| ShellError::IllegalNumber(arg.clone()))?
            }
        };
        state.should_exit = Some(code);
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// Without a target goes to $HOME; "-" goes back to $OLDPWD and prints it.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode> {
        let env = &mut state.env;
        let (target, announce) = match self.target.as_deref() {
            None | Some("") => {
                let home = env.get_var("HOME").or_else(|| env.get_var("PWD"));
                (home.unwrap_or("/").to_string(), false)
            }
            Some("-") => match env.get_var("OLDPWD") {
                Some(old) => (old.to_string(), true),
                None => return Err(ShellError::builtin("cd", "OLDPWD not set").into()),
            },
            Some(t) => (t.to_string(), false),
        };

        let new_dir = env.current_dir.join(&target);
        let canonical = fs::canonicalize(&new_dir).map_err(|_| ShellError::CantCd(target.clone()))?;
        std::env::set_current_dir(&canonical).map_err(|_| ShellError::CantCd(target.clone()))?;

        let old = std::mem::replace(&mut env.current_dir, canonical);
        let pwd = env.current_dir.to_string_lossy().into_owned();
        env.set_var("OLDPWD", old.to_string_lossy());
        env.set_var("PWD", pwd.as_str());
        if announce {
            writeln!(stdout, "{}", pwd)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Show usage of the built-in commands.
pub struct Help {
    #[argh(positional)]
    /// built-in to describe; all of them are listed when omitted.
    pub topic: Option<String>,
}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn execute(self, stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode> {
        let Some(topic) = self.topic else {
            writeln!(stdout, "{} built-in commands:", state.program)?;
            for builtin in builtins() {
                let usage = builtin.usage();
                let line = usage.lines().next().unwrap_or(builtin.name());
                writeln!(stdout, "  {}", line.trim_start_matches("Usage: "))?;
            }
            writeln!(stdout, "Type 'help NAME' to learn more about NAME.")?;
            return Ok(0);
        };

        match find_builtin(&topic) {
            Some(builtin) => {
                write!(stdout, "{}", builtin.usage())?;
                Ok(0)
            }
            None => Err(ShellError::builtin("help", format!("no help topics match '{}'", topic)).into()),
        }
    }
}

#[derive(FromArgs)]
/// Print the environment, one NAME=VALUE per line.
pub struct Env {}

impl BuiltinCommand for Env {
    fn name() -> &'static str {
        "env"
    }

    fn execute(self, stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode> {
        for (k, v) in state.env.iter() {
            writeln!(stdout, "{}={}", k, v)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Set an environment variable for commands started from now on.
pub struct Setenv {
    #[argh(positional)]
    /// variable name.
    pub name: String,

    #[argh(positional)]
    /// new value.
    pub value: String,
}

impl BuiltinCommand for Setenv {
    fn name() -> &'static str {
        "setenv"
    }

    fn execute(self, _stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode> {
        if self.name.is_empty() || self.name.contains('=') {
            return Err(ShellError::builtin(
                "setenv",
                format!("invalid variable name '{}'", self.name),
            )
            .into());
        }
        state.env.set_var(self.name, self.value);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Remove environment variables.
pub struct Unsetenv {
    #[argh(positional, greedy)]
    /// names of the variables to remove.
    pub names: Vec<String>,
}

impl BuiltinCommand for Unsetenv {
    fn name() -> &'static str {
        "unsetenv"
    }

    fn execute(self, _stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode> {
        if self.names.is_empty() {
            return Err(ShellError::builtin("unsetenv", "Too few arguments.").into());
        }
        for name in &self.names {
            state.env.unset_var(name);
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Define or display aliases.
/// NAME=VALUE defines an alias, NAME alone prints it, no argument prints all.
pub struct Alias {
    #[argh(positional, greedy)]
    /// definitions (name=value or name='value with spaces') and names to show.
    pub definitions: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum AliasArg {
    Define(String, String),
    Show(String),
}

impl Alias {
    /// Split the (re-joined) arguments into definitions and queries.
    ///
    /// Values may be wrapped in single or double quotes to contain blanks.
    fn parse(text: &str) -> Vec<AliasArg> {
        let mut out = Vec::new();
        let mut chars = text.chars().peekable();
        loop {
            while chars.next_if(|c| *c == ' ' || *c == '\t').is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut name = String::new();
            while let Some(c) = chars.next_if(|c| *c != '=' && *c != ' ' && *c != '\t') {
                name.push(c);
            }
            if chars.next_if_eq(&'=').is_none() {
                out.push(AliasArg::Show(name));
                continue;
            }

            let mut value = String::new();
            match chars.next_if(|c| *c == '\'' || *c == '"') {
                Some(quote) => {
                    for c in chars.by_ref() {
                        if c == quote {
                            break;
                        }
                        value.push(c);
                    }
                }
                None => {
                    while let Some(c) = chars.next_if(|c| *c != ' ' && *c != '\t') {
                        value.push(c);
                    }
                }
            }
            out.push(AliasArg::Define(name, value));
        }
        out
    }
}

impl BuiltinCommand for Alias {
    fn name() -> &'static str {
        "alias"
    }

    fn execute(self, stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode> {
        if self.definitions.is_empty() {
            for alias in state.aliases.iter() {
                writeln!(stdout, "{}", alias)?;
            }
            return Ok(0);
        }

        let mut missing = Vec::new();
        for arg in Self::parse(&self.definitions.join(" ")) {
            match arg {
                AliasArg::Define(name, _) if name.is_empty() => {
                    return Err(ShellError::builtin("alias", "missing alias name").into());
                }
                AliasArg::Define(name, value) => state.aliases.set(name, value),
                AliasArg::Show(name) => match state.aliases.get(&name) {
                    Some(alias) => writeln!(stdout, "{}", alias)?,
                    None => missing.push(name),
                },
            }
        }
        if !missing.is_empty() {
            return Err(ShellError::builtin("alias", format!("{} not found", missing.join(" "))).into());
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List the command history, oldest first, as "INDEX LINE".
pub struct History {}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode> {
        for entry in state.history.entries() {
            writeln!(stdout, "{} {}", entry.index, entry.line)?;
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::error::status_of;
    use crate::history;
    use std::env as stdenv;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn state_with(vars: &[(&str, &str)]) -> ShellState {
        let env = Environment::from_pairs(vars.iter().copied(), stdenv::current_dir().unwrap());
        ShellState::new("hsh", env, history::History::in_memory(16))
    }

    /// Run a built-in through the dispatcher, returning status and output.
    fn run(state: &mut ShellState, line: &str) -> (ExitCode, String) {
        let words: Vec<&str> = line.split_whitespace().collect();
        let builtin = find_builtin(words[0]).expect("not a builtin");
        let cmd = builtin.try_create(words[0], &words[1..]).unwrap();
        let mut out = Vec::new();
        let code = match cmd.execute(&mut out, state) {
            Ok(code) => code,
            Err(e) => status_of(&e),
        };
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_dispatch_matches_exact_names_only() {
        assert!(find_builtin("exit").is_some());
        assert!(find_builtin("history").is_some());
        assert!(find_builtin("exi").is_none());
        assert!(find_builtin("ls").is_none());
        assert_eq!(builtins().len(), 8);
    }

    #[test]
    fn test_exit_with_number() {
        let mut state = state_with(&[]);
        assert_eq!(run(&mut state, "exit 42").0, 42);
        assert_eq!(state.should_exit, Some(42));
    }

    #[test]
    fn test_exit_without_argument_uses_last_status() {
        let mut state = state_with(&[]);
        state.last_status = 7;
        run(&mut state, "exit");
        assert_eq!(state.should_exit, Some(7));
    }

    #[test]
    fn test_exit_wraps_large_values() {
        let mut state = state_with(&[]);
        run(&mut state, "exit 300");
        assert_eq!(state.should_exit, Some(44));
    }

    #[test]
    fn test_exit_rejects_malformed_numbers() {
        for arg in ["abc", "-1", "1x", "99999999999"] {
            let mut state = state_with(&[]);
            let (code, _) = run(&mut state, &format!("exit {arg}"));
            assert_eq!(code, 2, "exit {arg}");
            assert_eq!(state.should_exit, None);
        }
    }

    #[test]
    fn test_setenv_env_unsetenv() {
        let mut state = state_with(&[("A", "1")]);
        assert_eq!(run(&mut state, "setenv B 2").0, 0);
        assert_eq!(run(&mut state, "setenv A one").0, 0);
        assert_eq!(run(&mut state, "env"), (0, "A=one\nB=2\n".to_string()));
        assert_eq!(run(&mut state, "unsetenv A").0, 0);
        assert_eq!(run(&mut state, "env").1, "B=2\n");
    }

    #[test]
    fn test_setenv_argument_errors() {
        let mut state = state_with(&[]);
        assert_eq!(run(&mut state, "setenv ONLY").0, 2);
        assert_eq!(run(&mut state, "setenv A=B c").0, 1);
        assert_eq!(run(&mut state, "unsetenv").0, 1);
    }

    #[test]
    fn test_setenv_accepts_dashed_value() {
        let mut state = state_with(&[]);
        assert_eq!(run(&mut state, "setenv N -5").0, 0);
        assert_eq!(state.env.get_var("N"), Some("-5"));
    }

    #[test]
    fn test_alias_define_and_show() {
        let mut state = state_with(&[]);
        assert_eq!(run(&mut state, "alias ll='ls -la' g=grep").0, 0);
        assert_eq!(state.aliases.get("ll").unwrap().value, "ls -la");
        assert_eq!(run(&mut state, "alias g"), (0, "g='grep'\n".to_string()));
        assert_eq!(run(&mut state, "alias"), (0, "ll='ls -la'\ng='grep'\n".to_string()));
        assert_eq!(run(&mut state, "alias nope").0, 1);
    }

    #[test]
    fn test_alias_parse() {
        assert_eq!(
            Alias::parse("a=1 b d=\"p q\" e= s='x && y'"),
            vec![
                AliasArg::Define("a".into(), "1".into()),
                AliasArg::Show("b".into()),
                AliasArg::Define("d".into(), "p q".into()),
                AliasArg::Define("e".into(), String::new()),
                AliasArg::Define("s".into(), "x && y".into()),
            ]
        );
    }

    #[test]
    fn test_history_lists_entries() {
        let mut state = state_with(&[]);
        state.history.push("ls").unwrap();
        state.history.push("history").unwrap();
        assert_eq!(run(&mut state, "history"), (0, "0 ls\n1 history\n".to_string()));
    }

    #[test]
    fn test_help_lists_and_describes() {
        let mut state = state_with(&[]);
        let (code, out) = run(&mut state, "help");
        assert_eq!(code, 0);
        for b in builtins() {
            assert!(out.contains(b.name()), "missing {}", b.name());
        }
        let (code, out) = run(&mut state, "help cd");
        assert_eq!(code, 0);
        assert!(out.contains("Change the current working directory"));
        assert_eq!(run(&mut state, "help nosuch").0, 1);
    }

    #[test]
    fn test_builtin_help_flag() {
        let mut state = state_with(&[]);
        let (code, out) = run(&mut state, "setenv --help");
        assert_eq!(code, 0);
        assert!(out.starts_with("Usage: setenv"));
    }

    fn canonical_temp() -> (tempfile::TempDir, PathBuf) {
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let canonical = fs::canonicalize(temp.path()).expect("canonicalize failed");
        (temp, canonical)
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let (_temp, canonical_temp) = canonical_temp();
        let orig = stdenv::current_dir().unwrap();

        let mut state = state_with(&[]);
        let (code, _) = run(&mut state, &format!("cd {}", canonical_temp.display()));
        assert_eq!(code, 0);

        assert_eq!(fs::canonicalize(stdenv::current_dir().unwrap()).unwrap(), canonical_temp);
        assert_eq!(state.env.current_dir, canonical_temp);
        assert_eq!(state.env.get_var("PWD"), Some(canonical_temp.to_str().unwrap()));
        assert_eq!(state.env.get_var("OLDPWD"), Some(orig.to_str().unwrap()));

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let _lock = lock_current_dir();
        let (_temp, canonical_temp) = canonical_temp();
        let orig = stdenv::current_dir().unwrap();

        let mut state = state_with(&[("HOME", canonical_temp.to_str().unwrap())]);
        assert_eq!(run(&mut state, "cd").0, 0);
        assert_eq!(state.env.current_dir, canonical_temp);

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
    }

    #[test]
    fn test_cd_dash_returns_and_prints() {
        let _lock = lock_current_dir();
        let (_temp, canonical_temp) = canonical_temp();
        let orig = fs::canonicalize(stdenv::current_dir().unwrap()).unwrap();

        let mut state = state_with(&[]);
        assert_eq!(run(&mut state, "cd -").0, 1);

        run(&mut state, &format!("cd {}", canonical_temp.display()));
        let (code, out) = run(&mut state, "cd -");
        assert_eq!(code, 0);
        assert_eq!(out, format!("{}\n", orig.display()));
        assert_eq!(state.env.current_dir, orig);

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();

        let mut state = state_with(&[]);
        let name = format!("nonexistent_dir_for_cd_test_{}", std::process::id());
        assert_eq!(run(&mut state, &format!("cd {name}")).0, 2);
        assert_eq!(stdenv::current_dir().unwrap(), orig);
        assert_eq!(state.env.get_var("OLDPWD"), None);
    }
}
