pub(crate) mod check;
pub(crate) mod render;
pub(crate) mod run;

use std::path::Path;

use rips_core::{compile_file, CompileFailure, Program};

use crate::OutputFormat;

/// Print compile errors, one `file:line: message` per line or a JSON
/// array.
pub(crate) fn report_compile_errors(failure: &CompileFailure, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => {
            let errors: Vec<serde_json::Value> =
                failure.errors.iter().map(|e| e.to_json_value()).collect();
            let json = serde_json::to_string_pretty(&errors)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => {
            if quiet {
                return;
            }
            for e in &failure.errors {
                eprintln!("{}", e);
            }
            if failure.too_many {
                eprintln!("too many errors");
            }
        }
    }
}

/// Compile `file`, or report why not.
pub(crate) fn compile_or_report(file: &Path, output: OutputFormat, quiet: bool) -> Option<Program> {
    match compile_file(file) {
        Ok(program) => Some(program),
        Err(failure) => {
            tracing::debug!(errors = failure.errors.len(), "compilation failed");
            report_compile_errors(&failure, output, quiet);
            None
        }
    }
}
