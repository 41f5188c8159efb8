//! `pipesh`: an interactive shell that runs `|`-connected pipelines and
//! keeps a timed ledger of every command submitted.
//!
//! Flow for one line: [`command`] tokenizes it, [`pipes`] allocates the
//! channels, [`spawn`] forks and wires the children, [`jobs`] waits for all
//! of them, and [`history`] records the outcome. [`signal_handler`] dumps the
//! ledger when the session is interrupted.

pub mod cli;
pub mod command;
pub mod config;
pub mod errors;
pub mod history;
pub mod jobs;
pub mod logging;
pub mod pipes;
pub mod prompt;
pub mod shell;
pub mod signal_handler;
pub mod spawn;

pub use errors::{Result, ShellError};
