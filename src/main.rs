//! ripit - DVD jukebox ripping
//!
//! Entry point: parses arguments, sets up logging, builds the device stack
//! from the configuration and dispatches the requested command.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ripit::batch::BatchScheduler;
use ripit::cli::{Args, Commands};
use ripit::config::Config;
use ripit::device::{CommandOutcome, DeviceOps};
use ripit::error::RipitError;
use ripit::executor::{CommandExecutor, SystemExecutor};
use ripit::slots::{Slot, SlotKind, is_valid_drive};
use ripit::workflow::RipWorkflow;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Commands::InitConfig { output } = &args.command {
        Config::default().save_to_file(output)?;
        println!("Default configuration written to {}", output.display());
        return Ok(());
    }

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("ripit.toml").exists() {
                Config::from_file("ripit.toml")?
            } else {
                Config::default()
            }
        }
    };
    config.dry_run |= args.dry_run;

    setup_logging(args.verbose, &config.output.log_dir)?;
    info!("Invoked as: {}", std::env::args().collect::<Vec<_>>().join(" "));

    let config = Arc::new(config);
    let executor: Arc<dyn CommandExecutor> = Arc::new(SystemExecutor::new(config.dry_run));
    let ops = DeviceOps::new(Arc::clone(&config), executor)?;
    let workflow = Arc::new(RipWorkflow::new(ops));
    let ops = workflow.ops();

    match args.command {
        Commands::Load { drive, slot } => {
            let drive = drive_arg(ops, drive)?;
            let slot = ops.layout().check_slot(slot, SlotKind::Any)?;
            match ops.load(drive, slot).await? {
                CommandOutcome::Success => println!("Loaded slot {} into drive {}", slot, drive),
                CommandOutcome::Empty => println!("Slot {} is empty", slot),
                CommandOutcome::Failure => {
                    return Err(RipitError::DeviceFailure(format!(
                        "could not load slot {} into drive {}",
                        slot, drive
                    ))
                    .into());
                }
            }
        }
        Commands::Unload { drive, slot } => {
            let drive = drive_arg(ops, drive)?;
            let slot = ops.layout().check_slot(slot, SlotKind::Any)?;
            match ops.unload(drive, slot).await? {
                CommandOutcome::Success => println!("Unloaded drive {} into slot {}", drive, slot),
                CommandOutcome::Empty => println!("Drive {} is empty", drive),
                CommandOutcome::Failure => {
                    return Err(RipitError::DeviceFailure(format!(
                        "could not unload drive {} into slot {}",
                        drive, slot
                    ))
                    .into());
                }
            }
        }
        Commands::Rip { drive, generic_name } => {
            let drive = drive_arg(ops, drive)?;
            if workflow.rip_loaded(drive, generic_name).await? != CommandOutcome::Success {
                return Err(RipitError::ExtractionFailure(format!("ripping drive {} failed", drive)).into());
            }
            println!("Ripped drive {} into {}", drive, ops.output_dir().display());
        }
        Commands::Info { drive } => {
            let drive = drive_arg(ops, drive)?;
            println!("{}", ops.disc_info(drive).await?);
        }
        Commands::Title { drive } => {
            let drive = drive_arg(ops, drive)?;
            let probe = ops.disc_title(drive).await?;
            match probe.outcome {
                CommandOutcome::Success => println!("{}", probe.title.unwrap_or_default()),
                CommandOutcome::Empty => println!("No disc mounted from drive {}", drive),
                CommandOutcome::Failure => {
                    return Err(RipitError::DeviceFailure(format!(
                        "mount probe for drive {} failed",
                        drive
                    ))
                    .into());
                }
            }
        }
        Commands::Status => {
            println!("{}", ops.status().await?);
        }
        Commands::RipSlot { slot } => {
            let slot: Slot = ops.layout().check_slot(slot, SlotKind::Input)?;
            let result = workflow.rip_slot(slot).await?;
            println!("Slot {}: {:?}", slot, result);
        }
        Commands::RipAll { json } => {
            let scheduler = BatchScheduler::new(Arc::clone(&workflow));
            let report = scheduler.rip_all().await?;
            if !config.dry_run {
                report.write_to(&config.output.log_dir).await?;
            }
            if json {
                println!("{}", report.to_json()?);
            } else {
                print!("{}", report);
            }
        }
        Commands::TestCassette { cassette } => {
            let scheduler = BatchScheduler::new(Arc::clone(&workflow));
            let report = scheduler.test_cassette(cassette).await?;
            print!("{}", report);
        }
        // handled before logging setup
        Commands::InitConfig { .. } => {}
    }

    info!("ripit finished");
    Ok(())
}

/// Validate a drive number from the command line
fn drive_arg(ops: &DeviceOps, drive: i64) -> Result<usize> {
    if !is_valid_drive(drive, ops.drive_count()) {
        return Err(RipitError::InvalidDrive(drive).into());
    }
    Ok(usize::try_from(drive)?)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(log_dir, "ripit.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("ripit.log").display()
    );

    Ok(())
}
