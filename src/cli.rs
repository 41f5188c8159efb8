//! Command-line arguments.

use clap::{Parser, ValueEnum};

use crate::config::{
    Config, Limits, PrimaryStage, DEFAULT_HISTORY_CAPACITY, DEFAULT_MAX_ARGS,
    DEFAULT_MAX_LINE_LENGTH, DEFAULT_MAX_STAGES,
};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipesh",
    version,
    about = "Interactive pipeline shell with a timed command ledger.",
    long_about = None
)]
pub struct CliArgs {
    /// Longest accepted input line, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,

    /// Most stages a single pipeline may have.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_STAGES)]
    pub max_stages: usize,

    /// Most tokens (program name included) per stage.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ARGS)]
    pub max_args: usize,

    /// Number of commands the ledger records before it stops recording.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_HISTORY_CAPACITY)]
    pub history_capacity: usize,

    /// Stage whose pid is recorded and whose exit status decides success.
    #[arg(long, value_enum, value_name = "STAGE", default_value_t = PrimaryArg::First)]
    pub primary_stage: PrimaryArg,

    /// Prompt text, printed as given.
    #[arg(long, value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPESH_LOG` or `warn` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum PrimaryArg {
    First,
    Last,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliArgs {
    pub fn config(&self) -> Config {
        Config {
            limits: Limits {
                max_line_length: self.max_line_length,
                max_stages: self.max_stages,
                max_args: self.max_args,
                history_capacity: self.history_capacity,
            },
            primary_stage: match self.primary_stage {
                PrimaryArg::First => PrimaryStage::First,
                PrimaryArg::Last => PrimaryStage::Last,
            },
            prompt: self.prompt.clone(),
        }
    }
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
