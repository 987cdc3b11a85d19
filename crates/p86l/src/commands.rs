use std::io::Write as _;

use log::info;
use p86l_core::{PipelineState, StatusReport, UpdatePipeline};

use crate::cli::Command;
use crate::error::CliError;

pub async fn run(command: Command, pipeline: &UpdatePipeline) -> Result<(), CliError> {
    info!("Running command {command:?}");
    match command {
        Command::Status => status(pipeline).await,
        Command::Install => install(pipeline).await,
        Command::Play => play(pipeline).await,
        Command::Reset { yes } => reset(pipeline, yes).await,
        Command::ClearCache => {
            pipeline.clear_cache()?;
            println!("Release cache cleared.");
            Ok(())
        }
        Command::Changelog => changelog(pipeline).await,
        Command::OpenFolder => {
            pipeline.open_install_folder()?;
            Ok(())
        }
    }
}

async fn status(pipeline: &UpdatePipeline) -> Result<(), CliError> {
    pipeline.check_status().await?;
    print_report(&pipeline.status());
    Ok(())
}

async fn install(pipeline: &UpdatePipeline) -> Result<(), CliError> {
    let state = pipeline.check_status().await?;
    if let PipelineState::Installed { tag } = &state {
        println!("Already up to date ({tag}).");
        return Ok(());
    }

    let handle = pipeline.start_install()?;
    let mut updates = handle.subscribe();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            match state {
                PipelineState::Downloading(progress) => {
                    eprint!("\r{:<40}", progress.status_text());
                    let _ = std::io::stderr().flush();
                }
                PipelineState::Extracting => eprintln!("\rExtracting zip file...{:<20}", ""),
                _ => {}
            }
        }
    });

    let result = handle.wait().await;
    printer.abort();

    let record = result?;
    println!("Installed {}.", record.tag);
    Ok(())
}

async fn play(pipeline: &UpdatePipeline) -> Result<(), CliError> {
    pipeline.check_status().await?;
    let status = pipeline.play().await?;
    info!("Game exited with {status}");
    Ok(())
}

async fn reset(pipeline: &UpdatePipeline, confirmed: bool) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ResetNotConfirmed);
    }
    pipeline.reset().await?;
    println!(
        "Removed cached releases and {}.",
        pipeline.install_dir().display()
    );
    Ok(())
}

async fn changelog(pipeline: &UpdatePipeline) -> Result<(), CliError> {
    let notes = pipeline.release_notes().await?;
    if notes.body.trim().is_empty() {
        println!("No release notes.");
    } else {
        println!("{}", notes.body.trim_end());
    }
    if !notes.url.is_empty() {
        println!("\n{}", notes.url);
    }
    Ok(())
}

fn print_report(report: &StatusReport) {
    println!("State:   {}", report.state);
    if let Some(latest) = &report.latest {
        println!("Latest:  {latest}");
    }
    let action = if report.action_enabled() {
        report.label().to_string()
    } else {
        format!("{} (unavailable)", report.label())
    };
    println!("Action:  {action}");

    let detail = report.detail();
    if !detail.is_empty() {
        println!("Note:    {detail}");
    }
}
