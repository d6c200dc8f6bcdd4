use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use sensor_stream::ExperimentConfig;
use serde::Serialize;

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    valid: bool,
    buffers: usize,
    sensors: usize,
    plots: usize,
    error: Option<String>,
}

pub fn execute(args: ValidateArgs) -> i32 {
    let loaded = ExperimentConfig::from_json_file(&args.config);

    let result = match &loaded {
        Ok(config) => ValidateOutput {
            file: args.config.clone(),
            valid: true,
            buffers: config.buffers.len(),
            sensors: config.sensors.len(),
            plots: config.plots.len(),
            error: None,
        },
        Err(e) => ValidateOutput {
            file: args.config.clone(),
            valid: false,
            buffers: 0,
            sensors: 0,
            plots: 0,
            error: Some(e.to_string()),
        },
    };

    if args.json {
        if !output::emit(&result, false, None) {
            return exit_codes::EXECUTION_ERROR;
        }
    } else if let Some(ref err) = result.error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "Config '{}' is valid ({} buffers, {} sensors, {} plots)",
            result.file, result.buffers, result.sensors, result.plots
        );
    }

    if result.valid {
        exit_codes::SUCCESS
    } else {
        exit_codes::INPUT_ERROR
    }
}
