use crate::command::{ExecutableCommand, ExitCode};
use crate::error::ShellError;
use crate::state::ShellState;
use anyhow::Result;
use log::debug;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Command that is not a builtin.
#[derive(Debug)]
pub struct ExternalCommand {
    /// Name as typed; becomes `argv[0]` of the child.
    name: String,
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(name: impl Into<String>, program: PathBuf, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program,
            args,
        }
    }

    /// Resolve `name` against the `PATH` of the session environment.
    pub fn resolve(state: &ShellState, name: &str, args: &[&str]) -> Result<Self, ShellError> {
        let env = &state.env;
        match find_command_path(name, env.get_var("PATH"), &env.current_dir) {
            Some(program) => {
                debug!("resolved {} -> {}", name, program.display());
                Ok(Self::new(
                    name,
                    program,
                    args.iter().map(|x| x.to_string()).collect(),
                ))
            }
            None => Err(ShellError::NotFound(name.to_string())),
        }
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, state: &mut ShellState) -> Result<ExitCode> {
        // Built-in output written so far must reach the terminal before the child's.
        stdout.flush()?;

        let mut cmd = std::process::Command::new(&self.program);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.arg0(&self.name);
        }
        cmd.args(&self.args)
            .env_clear()
            .envs(state.env.child_vars())
            .current_dir(&state.env.current_dir);

        let mut child = cmd.spawn().map_err(|e| ShellError::CannotExecute {
            command: self.name.clone(),
            reason: match e.kind() {
                ErrorKind::PermissionDenied => "Permission denied".to_string(),
                _ => e.to_string(),
            },
        })?;
        debug!("spawned {} (pid {})", self.program.display(), child.id());

        let exit_status = child.wait()?;
        let code = match exit_status.code() {
            Some(x) => x,
            None => terminated_by_signal(exit_status),
        };
        debug!("{} exited with {}", self.name, code);
        Ok(code)
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command name to an executable path.
///
/// Behavior:
/// - Name containing `/`: checked directly (relative to `cwd`), no `PATH` search.
/// - Otherwise each `:`-separated entry of `search_paths` is tried in order and
///   the first regular file `dir/name` wins. An empty entry means `cwd`.
/// - When nothing matched (or `PATH` is unset), `name` relative to `cwd` is
///   used if it is a regular file.
/// - Empty name: returns `None`.
///
/// Relative results are joined onto `cwd`.
pub fn find_command_path(name: &str, search_paths: Option<&str>, cwd: &Path) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.contains('/') {
        return find_by_path(cwd.join(name));
    }

    if let Some(paths) = search_paths {
        if let Some(found) = find_in_path(paths, name, cwd) {
            return Some(found);
        }
    }

    find_by_path(cwd.join(name))
}

fn find_in_path(search_paths: &str, cmd: &str, cwd: &Path) -> Option<PathBuf> {
    for dir in search_paths.split(':') {
        let dir = if dir.is_empty() { cwd } else { Path::new(dir) };
        if let Some(path) = find_by_path(cwd.join(dir).join(cmd)) {
            return Some(path);
        }
    }
    None
}

fn find_by_path(path: PathBuf) -> Option<PathBuf> {
    match path.metadata() {
        Ok(meta) if meta.is_file() => Some(path),
        _ => None,
    }
}
