use crate::cli::SensorsArgs;
use crate::exit_codes;
use crate::output;
use sensor_stream::SensorKind;
use serde::Serialize;

#[derive(Serialize)]
struct SensorInfo {
    name: &'static str,
    unit: &'static str,
    components: usize,
}

pub fn execute(args: SensorsArgs) -> i32 {
    let sensors: Vec<SensorInfo> = SensorKind::ALL
        .iter()
        .map(|kind| SensorInfo {
            name: kind.as_str(),
            unit: kind.unit(),
            components: kind.components(),
        })
        .collect();

    if args.json {
        if !output::emit(&sensors, false, None) {
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!("Supported sensors:\n");
        println!("  {:<22} {:<8} {:<10}", "Type", "Unit", "Components");
        println!("  {}", "-".repeat(42));
        for s in &sensors {
            println!("  {:<22} {:<8} {:<10}", s.name, s.unit, s.components);
        }
    }

    exit_codes::SUCCESS
}
