use tracing_subscriber::EnvFilter;

/// Default filter for a `-v` count.
fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber writing to stderr. `RIPS_LOG` takes
/// precedence over `-v`.
pub(crate) fn init(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_env("RIPS_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    // a subscriber may already be installed when embedded in tests
    let _ = if json {
        builder.json().with_target(true).try_init()
    } else {
        builder.with_target(false).compact().try_init()
    };
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
