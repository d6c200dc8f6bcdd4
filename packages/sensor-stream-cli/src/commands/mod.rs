pub mod run;
pub mod sensors;
pub mod validate;

use crate::cli::Command;

/// Run a subcommand and return its process exit code
pub fn execute(command: Command) -> i32 {
    match command {
        Command::Run(args) => run::execute(args),
        Command::Validate(args) => validate::execute(args),
        Command::Sensors(args) => sensors::execute(args),
    }
}
