//! A small interactive command interpreter.
//!
//! Input lines are split into chains of sub-commands joined by `;`, `&&` and
//! `||`. Each sub-command goes through alias and variable substitution and is
//! then run either as a built-in implemented in Rust or as an external program
//! found through `PATH`.
//!
//! The main entry point is [`Interpreter`], which drives a session over a
//! [`ShellState`]. The public modules expose the pieces it is built from so
//! they can be reused or tested on their own.

pub mod alias;
mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod expand;
pub mod external;
pub mod history;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod state;

pub use interpreter::Interpreter;
pub use state::ShellState;
