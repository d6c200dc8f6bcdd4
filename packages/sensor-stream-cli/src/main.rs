use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod output;

fn main() {
    let cli = cli::Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .format_timestamp(None)
        .init();

    std::process::exit(commands::execute(cli.command));
}
