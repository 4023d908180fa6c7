use std::env as stdenv;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Mutable snapshot of the process environment owned by the session.
///
/// The snapshot starts as a copy of the inherited environment and is only
/// handed to the operating system when a child process is spawned, so
/// `setenv`/`unsetenv` never touch the shell's own environment. Variables keep
/// their insertion order; re-setting a name replaces its value in place.
#[derive(Debug, Clone)]
pub struct Environment {
    vars: Vec<(String, String)>,
    // Inherited entries whose name or value is not UTF-8. Invisible to the
    // shell, passed through to children untouched.
    opaque: Vec<(OsString, OsString)>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// Variables that are not valid UTF-8 cannot be read or changed from the
    /// shell but are still inherited by child processes.
    pub fn new() -> Self {
        let mut vars = Vec::new();
        let mut opaque = Vec::new();
        for (k, v) in stdenv::vars_os() {
            match (k.into_string(), v.into_string()) {
                (Ok(k), Ok(v)) => vars.push((k, v)),
                (k, v) => opaque.push((
                    k.map_or_else(|k| k, OsString::from),
                    v.map_or_else(|v| v, OsString::from),
                )),
            }
        }
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            opaque,
            current_dir,
        }
    }

    /// Build a snapshot from explicit pairs, independent of the process.
    pub fn from_pairs<I, K, V>(pairs: I, current_dir: PathBuf) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = Self {
            vars: Vec::new(),
            opaque: Vec::new(),
            current_dir,
        };
        for (k, v) in pairs {
            env.set_var(k, v);
        }
        env
    }

    /// Get the value of a variable from the snapshot.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set or override a variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        let key = key.into();
        let val = val.into();
        self.opaque.retain(|(k, _)| k.as_os_str() != OsStr::new(&key));
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = val,
            None => self.vars.push((key, val)),
        }
    }

    /// Remove a variable. Returns whether it was present.
    pub fn unset_var(&mut self, key: &str) -> bool {
        let before = self.vars.len() + self.opaque.len();
        self.vars.retain(|(k, _)| k != key);
        self.opaque.retain(|(k, _)| k.as_os_str() != OsStr::new(key));
        self.vars.len() + self.opaque.len() != before
    }

    /// Variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Everything a child process inherits, including non-UTF-8 entries.
    pub fn child_vars(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.opaque
            .iter()
            .map(|(k, v)| (k.as_os_str(), v.as_os_str()))
            .chain(self.vars.iter().map(|(k, v)| (OsStr::new(k), OsStr::new(v))))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
