use std::path::Path;
use std::process;

use crate::commands::compile_or_report;
use crate::{report_error, OutputFormat};

pub(crate) fn cmd_render(file: &Path, out: Option<&Path>, output: OutputFormat, quiet: bool) {
    let Some(program) = compile_or_report(file, output, quiet) else {
        process::exit(1);
    };
    let text = match rips_codegen::render(&program) {
        Ok(t) => t,
        Err(e) => {
            report_error(&format!("render error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    match out {
        None => print!("{}", text),
        Some(path) => {
            if let Err(e) = std::fs::write(path, &text) {
                let msg = format!("error writing '{}': {}", path.display(), e);
                report_error(&msg, output, quiet);
                process::exit(1);
            }
            if !quiet {
                match output {
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::json!({ "file": path.display().to_string(), "bytes": text.len() })
                    ),
                    OutputFormat::Text => println!("wrote {}", path.display()),
                }
            }
        }
    }
}
