use std::path::Path;
use std::process;

use crate::commands::compile_or_report;
use crate::OutputFormat;

pub(crate) fn cmd_check(file: &Path, dump: bool, output: OutputFormat, quiet: bool) {
    let Some(program) = compile_or_report(file, output, quiet) else {
        process::exit(1);
    };

    if dump {
        print!("{}", program.to_source());
        return;
    }
    match output {
        OutputFormat::Json => println!("[]"),
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "{}: ok ({} levels, {} vars, {} rules)",
                    file.display(),
                    program.levels.len(),
                    program.vars().count(),
                    program.rule_count()
                );
            }
        }
    }
}
