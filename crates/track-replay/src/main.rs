mod error;
mod loader;
mod replay;
mod settings;
mod timeline;

use clap::Parser;
use settings::Settings;
use tracing_subscriber::prelude::*;

/// Initialize logging to stderr, using `default_filter` unless RUST_LOG is set
fn setup_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry().with(fmt_layer).init();
}

fn main() -> std::process::ExitCode {
    let settings = Settings::parse();
    setup_logging(&settings.log);

    match replay::run(&settings) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
