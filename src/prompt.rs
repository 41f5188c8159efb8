use std::env;

use colored::Colorize;

pub struct Prompt {
    custom: Option<String>,
    user: String,
    host: String,
}

impl Prompt {
    pub fn new(custom: Option<String>) -> Self {
        Self {
            custom,
            user: whoami::username(),
            host: whoami::fallible::hostname().unwrap_or_else(|_| String::from("localhost")),
        }
    }

    pub fn get_string(&self) -> String {
        if let Some(custom) = &self.custom {
            return custom.clone();
        }

        let cwd = env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| String::from("?"));

        format!(
            "{}:{}> ",
            format!("{}@{}", self.user, self.host).green().bold(),
            cwd.blue()
        )
    }
}
