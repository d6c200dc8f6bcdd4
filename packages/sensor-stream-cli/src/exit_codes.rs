pub const SUCCESS: i32 = 0;
/// The experiment failed while running (sensor, worker or output error)
pub const EXECUTION_ERROR: i32 = 1;
/// Bad arguments or configuration
pub const INPUT_ERROR: i32 = 2;
