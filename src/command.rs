use crate::config::Limits;
use crate::errors::{Result, ShellError};

/// One program invocation: the program name followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    argv: Vec<String>,
}

impl Stage {
    pub fn program(&self) -> &str {
        // argv is never empty, parse rejects empty stages
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// Stages connected by pipes, in the order data flows through them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Parse user input into pipeline stages.
    /// e.g., "ls -l | grep src | wc -l" -> three stages
    ///
    /// Splitting is purely on `|` and whitespace; tokens are passed through
    /// exactly as split.
    pub fn parse(line: &str, limits: &Limits) -> Result<Self> {
        if line.len() > limits.max_line_length {
            return Err(ShellError::LineTooLong {
                len: line.len(),
                max: limits.max_line_length,
            });
        }

        let texts: Vec<&str> = line.split('|').collect();
        if texts.len() > limits.max_stages {
            return Err(ShellError::TooManyStages {
                count: texts.len(),
                max: limits.max_stages,
            });
        }

        let mut stages = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let argv: Vec<String> = text.split_whitespace().map(str::to_string).collect();
            if argv.is_empty() {
                return Err(ShellError::EmptyStage { index: i + 1 });
            }
            if argv.len() > limits.max_args {
                return Err(ShellError::TooManyArguments {
                    program: argv[0].clone(),
                    count: argv.len(),
                    max: limits.max_args,
                });
            }
            if let Some(bad) = argv.iter().find(|token| token.contains('\0')) {
                return Err(ShellError::InvalidArgument(bad.clone()));
            }
            stages.push(Stage { argv });
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    History,
    Exit,
    Pipeline(Pipeline),
}

impl Command {
    /// Classify one input line. Blank lines yield `None`.
    pub fn parse(line: &str, limits: &Limits) -> Result<Option<Self>> {
        let input = line.trim();
        if input.is_empty() {
            return Ok(None);
        }

        match input {
            "history" => Ok(Some(Command::History)),
            "exit" => Ok(Some(Command::Exit)),
            _ => Pipeline::parse(input, limits).map(|p| Some(Command::Pipeline(p))),
        }
    }
}
