//! Persisted command history.
//!
//! The history file is plain text, one accepted line per record. It is read
//! once at startup, keeping only the newest `max` lines, and written back
//! either once at shutdown or line by line, depending on [`HistorySync`].

use anyhow::{Context, Result};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Default history file name, relative to `$HOME`.
pub const HIST_FILE: &str = ".simple_shell_history";
/// Default number of retained entries.
pub const HIST_MAX: usize = 4096;

/// When accepted lines reach the history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistorySync {
    /// The whole list is written when the session ends.
    #[default]
    OnExit,
    /// Every line is appended as soon as it is accepted.
    EachLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub index: usize,
    pub line: String,
}

/// Ordered list of accepted lines with contiguous indices starting at 0.
#[derive(Debug)]
pub struct History {
    entries: Vec<HistoryEntry>,
    max: usize,
    path: Option<PathBuf>,
    sync: HistorySync,
    // Number of records currently in the file, tracked for `EachLine`.
    persisted: usize,
    // Entries pushed since the file was last written.
    unsaved: usize,
    // Set when the file could not be read: it is only ever appended to.
    append_only: bool,
}

impl History {
    /// A history bound to `path`; `None` keeps it in memory only.
    pub fn new(path: Option<PathBuf>, max: usize, sync: HistorySync) -> Self {
        Self {
            entries: Vec::new(),
            max: max.max(1),
            path,
            sync,
            persisted: 0,
            unsaved: 0,
            append_only: false,
        }
    }

    /// History that is never persisted.
    pub fn in_memory(max: usize) -> Self {
        Self::new(None, max, HistorySync::OnExit)
    }

    /// Replace the in-memory list with the content of the history file.
    ///
    /// A missing file is an empty history. Invalid UTF-8 is replaced, not
    /// rejected. If the file exists but cannot be read, the history is
    /// switched to append-only so the unread records are never overwritten.
    /// Returns the number of entries kept.
    pub fn load(&mut self) -> Result<usize> {
        let Some(path) = self.path.clone() else {
            return Ok(0);
        };
        let lines = match read_lines(&path) {
            Ok(lines) => lines,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                self.append_only = true;
                return Err(e).with_context(|| format!("can't read {}", path.display()));
            }
        };
        self.persisted = lines.len();
        self.unsaved = 0;

        let skip = lines.len().saturating_sub(self.max);
        self.entries = lines
            .into_iter()
            .skip(skip)
            .map(|line| HistoryEntry { index: 0, line })
            .collect();
        self.renumber();
        debug!("loaded {} history entries from {}", self.entries.len(), path.display());
        Ok(self.entries.len())
    }

    /// Record an accepted line.
    ///
    /// The oldest entry is dropped once the list holds `max` entries. With
    /// [`HistorySync::EachLine`] the line is also appended to the file, and the
    /// file is rewritten when it grows past `max` records.
    pub fn push(&mut self, line: &str) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }
        if self.entries.len() >= self.max {
            let excess = self.entries.len() + 1 - self.max;
            self.entries.drain(..excess);
            self.renumber();
        }
        self.entries.push(HistoryEntry {
            index: self.entries.len(),
            line: line.to_string(),
        });
        self.unsaved = (self.unsaved + 1).min(self.entries.len());

        if self.sync == HistorySync::EachLine {
            self.append_last()?;
        }
        Ok(())
    }

    /// Write the whole list to the history file, replacing its content.
    ///
    /// After a failed [`History::load`] only the unsaved entries are appended.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let (file, skip) = if self.append_only {
            let file = OpenOptions::new().create(true).append(true).open(path);
            (file, self.entries.len() - self.unsaved)
        } else {
            (File::create(path), 0)
        };
        let file = file.with_context(|| format!("can't open {}", path.display()))?;
        let mut out = BufWriter::new(file);
        for entry in &self.entries[skip..] {
            writeln!(out, "{}", entry.line)?;
        }
        out.flush()
            .with_context(|| format!("can't write {}", path.display()))?;
        self.persisted = if self.append_only {
            self.persisted + self.unsaved
        } else {
            self.entries.len()
        };
        self.unsaved = 0;
        Ok(())
    }

    /// Flush at shutdown. Only [`HistorySync::OnExit`] has anything left to write.
    pub fn finish(&mut self) -> Result<()> {
        match self.sync {
            HistorySync::OnExit => self.save(),
            HistorySync::EachLine => Ok(()),
        }
    }

    /// Reassign indices so they run 0..N-1 in order.
    pub fn renumber(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.index = i;
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    fn append_last(&mut self) -> Result<()> {
        if self.persisted >= self.max || self.append_only {
            return self.save();
        }
        let (Some(path), Some(entry)) = (&self.path, self.entries.last()) else {
            return Ok(());
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("can't open {}", path.display()))?;
        writeln!(file, "{}", entry.line)
            .with_context(|| format!("can't write {}", path.display()))?;
        self.persisted += 1;
        self.unsaved = 0;
        Ok(())
    }
}

/// Non-empty records of a history file, decoded lossily.
fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if !line.is_empty() {
                    lines.push(line.to_string());
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(lines)
}

/// Default location of the history file for a given home directory.
pub fn default_path(home: &Path) -> PathBuf {
    home.join(HIST_FILE)
}
