use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use sensor_stream::{
    Experiment, ExperimentConfig, ExperimentReport, PointMirror, SensorSource, SimulatedSource,
    StreamPlot,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Serialize)]
struct RenderedPlot {
    name: String,
    points: usize,
    uploads: usize,
}

#[derive(Serialize)]
struct RunOutput {
    #[serde(flatten)]
    report: ExperimentReport,
    rendered: Vec<RenderedPlot>,
}

fn load_config(args: &RunArgs) -> Result<ExperimentConfig, String> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::from_json_file(path)
            .map_err(|e| format!("Failed to load config '{}': {}", path, e))?,
        None => ExperimentConfig::default(),
    };

    for sensor in &mut config.sensors {
        if let Some(rate) = args.rate_hz {
            sensor.rate_hz = rate;
        }
        if args.average {
            sensor.average = true;
        }
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

pub fn execute(args: RunArgs) -> i32 {
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let fault_every = args.fault_every.unwrap_or(0);
    let mut experiment = match Experiment::from_config(&config, |sensor| {
        Box::new(SimulatedSource::new(sensor.kind).with_fault_every(fault_every))
            as Box<dyn SensorSource>
    }) {
        Ok(experiment) => experiment,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if let Err(e) = experiment.start() {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    log::info!(
        "Recording '{}' for {} ms",
        experiment.title(),
        args.duration_ms
    );

    let mut mirrors: BTreeMap<String, PointMirror> = BTreeMap::new();
    experiment.run_display_loop(Duration::from_millis(args.duration_ms), |plot, update| {
        let mirror = mirrors.entry(plot.name().to_string()).or_default();
        StreamPlot::render_to(update, mirror);
    });

    if let Err(e) = experiment.stop() {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    // Whatever the workers flushed while stopping
    for (index, update) in experiment.update_plots() {
        let name = experiment.plots()[index].name().to_string();
        StreamPlot::render_to(&update, mirrors.entry(name).or_default());
    }

    let rendered = mirrors
        .into_iter()
        .map(|(name, mirror)| RenderedPlot {
            name,
            points: mirror.points.len(),
            uploads: mirror.uploads,
        })
        .collect();

    let result = RunOutput {
        report: experiment.report(),
        rendered,
    };

    if output::emit(&result, args.compact, args.output.as_deref()) {
        exit_codes::SUCCESS
    } else {
        exit_codes::EXECUTION_ERROR
    }
}
