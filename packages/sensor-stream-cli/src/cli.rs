use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sensorstream",
    version,
    about = "Streaming sensor pipeline driver",
    long_about = "Run sensor experiments through the buffering, averaging and plot decimation\n\
                  pipeline on simulated hardware and report what reached the buffers and plots."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    /// Warnings by default, one level more detail per `-v`
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an experiment on simulated sensors and print a JSON report
    Run(RunArgs),
    /// Validate an experiment configuration file
    Validate(ValidateArgs),
    /// List supported sensor types
    Sensors(SensorsArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Experiment configuration (JSON). Defaults to a single accelerometer.
    #[arg(long, env = "SENSORSTREAM_CONFIG")]
    pub config: Option<String>,

    /// How long to record, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub duration_ms: u64,

    /// Override the rate of every sensor (Hz)
    #[arg(long)]
    pub rate_hz: Option<f64>,

    /// Enable window averaging on every sensor
    #[arg(long, default_value_t = false)]
    pub average: bool,

    /// Replace every n-th simulated callback with a read error
    #[arg(long)]
    pub fault_every: Option<u64>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Experiment configuration file to check
    #[arg(long)]
    pub config: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct SensorsArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
