use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};

fn destination(output_path: Option<&str>) -> Result<Box<dyn Write>, String> {
    match output_path {
        Some(path) => File::create(path)
            .map(|file| Box::new(BufWriter::new(file)) as Box<dyn Write>)
            .map_err(|e| format!("Failed to create output file '{}': {}", path, e)),
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn write_json<T: Serialize>(value: &T, compact: bool, output_path: Option<&str>) -> Result<(), String> {
    let mut out = destination(output_path)?;
    let serialized = if compact {
        serde_json::to_writer(&mut out, value)
    } else {
        serde_json::to_writer_pretty(&mut out, value)
    };
    serialized.map_err(|e| format!("JSON serialization failed: {}", e))?;
    out.write_all(b"\n")
        .and_then(|_| out.flush())
        .map_err(|e| format!("Failed to write output: {}", e))
}

/// Serialize `value` to stdout or `output_path`; failures go to stderr
pub fn emit<T: Serialize>(value: &T, compact: bool, output_path: Option<&str>) -> bool {
    match write_json(value, compact, output_path) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Error: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let path = path.to_str().unwrap();

        assert!(emit(&serde_json::json!({"points": 3}), true, Some(path)));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{\"points\":3}\n");
    }

    #[test]
    fn test_emit_to_missing_directory_fails() {
        assert!(!emit(&1, false, Some("/nonexistent/dir/out.json")));
    }
}
