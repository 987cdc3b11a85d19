mod cli;
mod commands;
mod error;
mod logging;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use p86l_core::UpdatePipeline;
use p86l_platform::{AppPaths, PathProvider};

use crate::cli::Cli;
use crate::error::CliError;
use crate::settings::AppSettings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if let CliError::Pipeline(pipeline_error) = &error {
                log::error!("{} ({})", pipeline_error, pipeline_error.kind());
            }
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let paths = AppPaths::new()?;
    paths.ensure_dirs().map_err(CliError::Dirs)?;

    let settings_path = paths.settings_file();
    let settings = AppSettings::load(&settings_path);
    if !settings_path.exists()
        && let Err(error) = settings.save(&settings_path)
    {
        eprintln!("warning: could not write {}: {error}", settings_path.display());
    }

    let debug = cli.debug || settings.debug_logging || logging::debug_requested_by_env();
    logging::init_logging(&paths.log_file(), debug, settings.max_log_size_bytes);
    log::info!("p86l {} starting", env!("CARGO_PKG_VERSION"));

    let client = reqwest::Client::builder()
        .connect_timeout(settings.http_timeout())
        .read_timeout(settings.http_timeout())
        .build()?;
    let pipeline = UpdatePipeline::new(settings.pipeline_config(), Arc::new(paths), client);

    commands::run(cli.command.unwrap_or_default(), &pipeline).await
}
