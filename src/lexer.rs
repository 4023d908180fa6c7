//! Splitting of input lines into chained sub-commands and words.
//!
//! The shell has no quoting: a line is cut at the chain operators `;`, `&&`
//! and `||`, and every sub-command is then split into words on blanks.

use crate::command::ExitCode;

/// The chain operator that precedes a sub-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOp {
    /// First sub-command of a line. Always runs.
    Start,
    /// Preceded by `;`. Always runs.
    Seq,
    /// Preceded by `&&`. Runs only after a success.
    And,
    /// Preceded by `||`. Runs only after a failure.
    Or,
}

impl ChainOp {
    /// Whether a sub-command behind this operator may run given the status of
    /// the previous one.
    pub fn permits(self, last_status: ExitCode) -> bool {
        match self {
            ChainOp::Start | ChainOp::Seq => true,
            ChainOp::And => last_status == 0,
            ChainOp::Or => last_status != 0,
        }
    }
}

/// One segment of a line between chain operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubCommand {
    /// Raw text of the segment, operators excluded.
    pub text: String,
    /// Operator in front of the segment.
    pub op: ChainOp,
    /// Set on segments produced by alias expansion; they are not expanded again.
    pub aliased: bool,
}

impl SubCommand {
    pub fn new(text: impl Into<String>, op: ChainOp) -> Self {
        Self {
            text: text.into(),
            op,
            aliased: false,
        }
    }

    /// True when the segment holds no words at all (e.g. after a trailing `;`).
    pub fn is_blank(&self) -> bool {
        self.text.trim_matches(is_blank).is_empty()
    }
}

struct ChainScanner {
    input: Vec<char>,
    pos: usize,
    current: String,
    op: ChainOp,
    out: Vec<SubCommand>,
}

impl ChainScanner {
    fn new(line: &str) -> Self {
        ChainScanner {
            input: line.chars().collect(),
            pos: 0,
            current: String::new(),
            op: ChainOp::Start,
            out: Vec::new(),
        }
    }

    fn scan(mut self) -> Vec<SubCommand> {
        while let Some(ch) = self.read_char() {
            match ch {
                ';' => self.cut(ChainOp::Seq),
                '&' if self.peek_char() == Some('&') => {
                    self.read_char();
                    self.cut(ChainOp::And);
                }
                '|' if self.peek_char() == Some('|') => {
                    self.read_char();
                    self.cut(ChainOp::Or);
                }
                c => self.current.push(c),
            }
        }
        let last = std::mem::take(&mut self.current);
        self.out.push(SubCommand::new(last, self.op));
        self.out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn cut(&mut self, next: ChainOp) {
        let text = std::mem::take(&mut self.current);
        self.out.push(SubCommand::new(text, self.op));
        self.op = next;
    }
}

/// Split a line into sub-commands at `;`, `&&` and `||`.
///
/// A lone `&` or `|` is ordinary text. Empty segments are kept (they run as
/// no-ops), so `a;;b` yields three sub-commands.
pub fn split_chain(line: &str) -> Vec<SubCommand> {
    ChainScanner::new(line).scan()
}

/// Split a sub-command into words on spaces and tabs.
pub fn split_words(text: &str) -> Vec<String> {
    text.split(is_blank)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Cut a line at the first `#` that starts the line or follows a blank.
pub fn strip_comment(line: &str) -> &str {
    let mut prev_blank = true;
    for (i, ch) in line.char_indices() {
        if ch == '#' && prev_blank {
            return &line[..i];
        }
        prev_blank = is_blank(ch);
    }
    line
}

fn is_blank(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}
