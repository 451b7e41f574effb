// warden/src/logging.rs

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise the verbosity flags pick the level.
pub fn init(verbose: u8, quiet: bool) {
    let default = default_level(verbose, quiet);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Logs go to stderr so --json output stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
