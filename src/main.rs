use std::process;

use pipesh::{cli, logging, shell::Shell};

fn main() {
    let args = cli::parse();
    logging::init_logging(args.log_level);

    let result = Shell::new(args.config()).and_then(|mut shell| shell.run());
    if let Err(err) = result {
        eprintln!("pipesh: {err}");
        process::exit(1);
    }
}
