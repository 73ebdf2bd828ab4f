mod commands;
mod config;
mod logging;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Reactive intrusion prevention for ROS systems.
#[derive(Parser)]
#[command(name = "rips", version, about = "Reactive intrusion prevention rules for ROS")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// More log output (-v info, -vv debug, -vvv trace); RIPS_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a rule file and report errors
    Check {
        /// Path to the .rul source file
        file: PathBuf,
        /// Print the folded program
        #[arg(long)]
        dump: bool,
    },

    /// Compile a rule file and serve one event stream
    Run {
        /// Path to the .rul source file
        file: PathBuf,
        /// Listening socket path
        #[arg(long, conflicts_with = "stdin")]
        socket: Option<PathBuf>,
        /// Read events from stdin and write status lines to stdout
        #[arg(short = 'c', long)]
        stdin: bool,
        /// Directory prefixed to every configured path
        #[arg(long)]
        root: Option<PathBuf>,
        /// Directory holding the level scripts
        #[arg(long)]
        scripts: Option<PathBuf>,
        /// Directory watched for IDS alert files
        #[arg(long)]
        ids_dir: Option<PathBuf>,
        /// Poll interval in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,
        /// Abandon a rule on a value fault instead of exiting
        #[arg(long)]
        keep_going: bool,
        /// TOML file with run settings
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Export a rule file as Rust source
    Render {
        /// Path to the .rul source file
        file: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Check { file, dump } => {
            commands::check::cmd_check(&file, dump, cli.output, cli.quiet);
        }
        Commands::Run {
            file,
            socket,
            stdin,
            root,
            scripts,
            ids_dir,
            poll_ms,
            keep_going,
            config,
        } => {
            let overrides = config::RunOverrides {
                socket,
                stdin,
                root,
                scripts,
                ids_dir,
                poll_ms,
                keep_going,
            };
            let settings = match config::RunConfig::load(config.as_deref(), overrides) {
                Ok(s) => s,
                Err(e) => {
                    report_error(&e.to_string(), cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(&format!("failed to create tokio runtime: {}", e), cli.output, cli.quiet);
                    process::exit(1);
                }
            };
            let code = rt.block_on(commands::run::cmd_run(&file, settings, cli.output, cli.quiet));
            process::exit(code);
        }
        Commands::Render { file, out } => {
            commands::render::cmd_render(&file, out.as_deref(), cli.output, cli.quiet);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
