use argh::FromArgs;
use log::{debug, warn};
use simple_shell::config::{Config, Mode, PROMPT};
use simple_shell::env::Environment;
use simple_shell::history::HistorySync;
use simple_shell::Interpreter;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

/// A simple command interpreter.
#[derive(FromArgs)]
struct Cli {
    /// run COMMAND and exit
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// history file (default: $HISTFILE or ~/.simple_shell_history)
    #[argh(option)]
    history_file: Option<PathBuf>,

    /// number of history entries to keep
    #[argh(option)]
    history_size: Option<usize>,

    /// append every accepted line to the history file immediately
    #[argh(switch)]
    history_append: bool,

    /// keep history in memory only
    #[argh(switch)]
    no_history: bool,

    /// startup file for interactive sessions (default: ~/.hshrc)
    #[argh(option)]
    rcfile: Option<PathBuf>,

    /// script to run instead of reading standard input
    #[argh(positional)]
    script: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("HSH_LOG", "warn")).init();

    let program = std::env::args().next().unwrap_or_else(|| "hsh".to_string());
    let cli: Cli = argh::from_env();

    // Ctrl-C must reach the foreground child, not end the session.
    if let Err(e) = ctrlc::set_handler(|| {}) {
        warn!("can't install interrupt handler: {}", e);
    }

    let mode = match (cli.command, cli.script) {
        (Some(line), _) => Mode::Command(line),
        (None, Some(path)) => Mode::Script(path),
        (None, None) if io::stdin().is_terminal() => Mode::Interactive,
        (None, None) => Mode::Pipe,
    };
    debug!("mode: {:?}", mode);

    let mut config = Config::from_env(&Environment::new());
    if let Some(path) = cli.history_file {
        config.history_file = Some(path);
    }
    if let Some(n) = cli.history_size.filter(|n| *n > 0) {
        config.history_max = n;
    }
    if cli.history_append {
        config.history_sync = HistorySync::EachLine;
    }
    if cli.no_history || matches!(mode, Mode::Command(_)) {
        config.history_file = None;
    }
    if cli.rcfile.is_some() {
        config.rc_file = cli.rcfile;
    }

    let mut sh = Interpreter::from_config(&program, &config, &mode);
    let code = match &mode {
        Mode::Interactive => {
            let from_rc = config.rc_file.as_deref().and_then(|rc| sh.source_rc(rc));
            match from_rc {
                Some(code) => code,
                None => sh.repl(PROMPT),
            }
        }
        Mode::Pipe => sh.run_reader(io::stdin().lock()),
        Mode::Script(path) => sh.run_script(path),
        Mode::Command(line) => sh.run_command(line),
    };
    sh.finish();
    std::process::exit(code);
}
