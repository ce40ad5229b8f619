#![cfg(not(tarpaulin_include))]

use night_checks::app;
use night_checks::config::Config;

/// Main entry point for the night check report server
///
/// Reads the configuration from the environment and serves the input form,
/// the ZIP download and the preview pages until the process is stopped.
///
/// # Environment
/// * `SECRET_KEY` - Required; signs the notice cookie
/// * `RUST_LOG` - Log filter, `info` when unset
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    app::run(config).await
}
