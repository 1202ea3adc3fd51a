// Device operations for the jukebox
//
// Semantic wrappers over the command executor:
// - load / unload / status: changer control
// - disc_title: mount probe, polled while a disc spins up
// - disc_info / extract: the extraction tool
//
// Slot and drive arguments are validated before any command is issued.

pub mod outcome;

use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

pub use outcome::*;

use crate::config::Config;
use crate::error::{Result, RipitError};
use crate::executor::{CommandExecutor, DeviceCommandBuilder};
use crate::slots::{is_valid_drive, Slot, SlotKind, SlotLayout};

/// Result of probing a drive for a mounted disc
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleProbe {
    pub outcome: CommandOutcome,
    /// Volume name taken from the mount point, when one was found
    pub title: Option<String>,
}

#[derive(Clone)]
pub struct DeviceOps {
    config: Arc<Config>,
    layout: SlotLayout,
    executor: Arc<dyn CommandExecutor>,
    commands: DeviceCommandBuilder,
    load_rules: OutcomeTable,
    unload_rules: OutcomeTable,
    probe_rules: OutcomeTable,
    extract_rules: OutcomeTable,
}

impl DeviceOps {
    pub fn new(config: Arc<Config>, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        config.validate()?;
        let layout = SlotLayout::from_config(&config.slots)?;
        info!("Using outcome rules version {}", RULES_VERSION);

        Ok(Self {
            layout,
            executor,
            commands: DeviceCommandBuilder::new(&config),
            load_rules: OutcomeTable::load(&config),
            unload_rules: OutcomeTable::unload(&config),
            probe_rules: OutcomeTable::mount_probe(&config),
            extract_rules: OutcomeTable::extract(&config),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    pub fn drive_count(&self) -> usize {
        self.config.drives.devices.len()
    }

    /// Block device of a drive, rejecting unknown drive numbers
    pub fn drive_device(&self, drive: usize) -> Result<&str> {
        let number = i64::try_from(drive).unwrap_or(i64::MAX);
        if !is_valid_drive(number, self.drive_count()) {
            return Err(RipitError::InvalidDrive(number));
        }
        Ok(&self.config.drives.devices[drive])
    }

    fn check_slot(&self, slot: Slot) -> Result<Slot> {
        self.layout.check_slot(i64::from(slot), SlotKind::Any)
    }

    /// Move the disc in `slot` into `drive`
    pub async fn load(&self, drive: usize, slot: Slot) -> Result<CommandOutcome> {
        self.drive_device(drive)?;
        let slot = self.check_slot(slot)?;

        let output = self.executor.run(&self.commands.load(slot, drive)).await?;
        let class = self.load_rules.classify(&output);
        match class.outcome {
            CommandOutcome::Success => info!("Loaded slot {} into drive {}", slot, drive),
            CommandOutcome::Empty => info!("Slot {} is empty: {}", slot, class.reason),
            CommandOutcome::Failure => error!(
                "Loading slot {} into drive {} failed: {}: {}",
                slot,
                drive,
                class.reason,
                output.stderr.trim()
            ),
        }
        Ok(class.outcome)
    }

    /// Move the disc in `drive` into `slot`
    pub async fn unload(&self, drive: usize, slot: Slot) -> Result<CommandOutcome> {
        self.drive_device(drive)?;
        let slot = self.check_slot(slot)?;

        let output = self.executor.run(&self.commands.unload(slot, drive)).await?;
        let class = self.unload_rules.classify(&output);
        match class.outcome {
            CommandOutcome::Success => info!("Unloaded drive {} into slot {}", drive, slot),
            CommandOutcome::Empty => warn!("Nothing to unload from drive {}: {}", drive, class.reason),
            CommandOutcome::Failure => error!(
                "Unloading drive {} into slot {} failed: {}: {}",
                drive,
                slot,
                class.reason,
                output.stderr.trim()
            ),
        }
        Ok(class.outcome)
    }

    /// Raw changer inventory, for diagnostics only
    pub async fn status(&self) -> Result<String> {
        let output = self.executor.run(&self.commands.status()).await?;
        if !output.status.is_success() {
            warn!("Changer status query failed: {}", output.stderr.trim());
        }
        Ok(output.stdout)
    }

    /// Probe whether the disc in `drive` is mounted and read its volume name
    pub async fn disc_title(&self, drive: usize) -> Result<TitleProbe> {
        let device = self.drive_device(drive)?;

        let output = self.executor.run(&self.commands.mount_probe(device)).await?;
        let class = self.probe_rules.classify(&output);
        if class.outcome != CommandOutcome::Success {
            return Ok(TitleProbe {
                outcome: class.outcome,
                title: None,
            });
        }

        let title = parse_mount_title(&output.stdout);
        if title.is_none() && !self.config.dry_run {
            warn!("Could not read a mount point for {} from {:?}", device, output.stdout);
            return Ok(TitleProbe {
                outcome: CommandOutcome::Failure,
                title: None,
            });
        }

        info!("Drive {} title: {}", drive, title.as_deref().unwrap_or("<dry run>"));
        Ok(TitleProbe {
            outcome: CommandOutcome::Success,
            title,
        })
    }

    /// Descriptive text from the extraction tool, for the per-disc log
    pub async fn disc_info(&self, drive: usize) -> Result<String> {
        let device = self.drive_device(drive)?;

        let output = self.executor.run(&self.commands.disc_info(device)).await?;
        if !output.status.is_success() {
            warn!("Disc info for drive {} failed: {}", drive, output.stderr.trim());
        }
        Ok(output.stdout)
    }

    /// Mirror the disc in `drive` into the output directory.
    ///
    /// A title collision is retried once under a generated name; a second
    /// collision, or any other error, is a failure.
    pub async fn extract(&self, drive: usize, force_generic_name: bool) -> Result<CommandOutcome> {
        let device = self.drive_device(drive)?;
        let output_dir = self.config.extractor.output_dir.as_path();

        let mut generic = force_generic_name;
        loop {
            let name = generic.then(|| generic_name(drive));
            let command = self.commands.extract(device, output_dir, name.as_deref());
            let output = self.executor.run(&command).await?;
            let class = self.extract_rules.classify(&output);

            match (class.outcome, class.reason) {
                (CommandOutcome::Success, _) => {
                    info!("Extracted drive {} into {}", drive, output_dir.display());
                    return Ok(CommandOutcome::Success);
                }
                (_, Reason::NameCollision) if !generic => {
                    warn!("Drive {}: {}; retrying with a generic name", drive, class.reason);
                    generic = true;
                }
                (_, reason) => {
                    let err = RipitError::ExtractionFailure(format!(
                        "drive {}: {} (generic name: {}): {}",
                        drive,
                        reason,
                        generic,
                        output.stderr.trim()
                    ));
                    error!("{}", err);
                    return Ok(CommandOutcome::Failure);
                }
            }
        }
    }

    /// Where extracted discs land
    pub fn output_dir(&self) -> &Path {
        &self.config.extractor.output_dir
    }
}

/// Unique stand-in for a disc title that collided with an earlier rip
pub fn generic_name(drive: usize) -> String {
    format!("generic_rip_d{}_{}", drive, Local::now().format("%Y%m%d_%H%M%S_%3f"))
}

/// Last path segment of the mount point in probe output.
///
/// Accepts a bare mount point (findmnt) or a `df` row, whose mount point is
/// the last column and may contain spaces.
pub fn parse_mount_title(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let start = line
        .char_indices()
        .filter(|(i, c)| *c == '/' && (*i == 0 || line[..*i].ends_with(char::is_whitespace)))
        .map(|(i, _)| i)
        .last()?;

    Path::new(&line[start..])
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutput, DeviceCommand, MockCommandExecutor};
    use mockall::Sequence;

    fn ops(executor: MockCommandExecutor) -> DeviceOps {
        DeviceOps::new(Arc::new(Config::default()), Arc::new(executor)).unwrap()
    }

    #[test]
    fn test_parse_mount_title() {
        assert_eq!(parse_mount_title("/media/MY_MOVIE\n"), Some("MY_MOVIE".to_string()));
        assert_eq!(
            parse_mount_title("/dev/sr1  4480476  4480476  0 100% /media/SOME DISC\n"),
            Some("SOME DISC".to_string())
        );
        assert_eq!(parse_mount_title("\n  \n"), None);
        assert_eq!(parse_mount_title("/"), None);
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected_before_execution() {
        let mut executor = MockCommandExecutor::new();
        executor.expect_run().never();
        let ops = ops(executor);

        assert!(matches!(ops.load(2, 1).await, Err(RipitError::InvalidDrive(2))));
        assert!(matches!(ops.load(0, 0).await, Err(RipitError::InvalidSlot { slot: 0, .. })));
        assert!(matches!(ops.unload(0, 9999).await, Err(RipitError::InvalidSlot { .. })));
        assert!(matches!(ops.disc_title(7).await, Err(RipitError::InvalidDrive(7))));
        assert!(matches!(ops.extract(3, false).await, Err(RipitError::InvalidDrive(3))));
    }

    #[tokio::test]
    async fn test_load_classification() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .withf(|cmd: &DeviceCommand| cmd.has_arg("load") && cmd.has_arg("5"))
            .returning(|_| Ok(CommandOutput::exited(1, "", "Source Element Address 5 is Empty")));
        executor
            .expect_run()
            .withf(|cmd: &DeviceCommand| cmd.has_arg("load") && cmd.has_arg("6"))
            .returning(|_| Ok(CommandOutput::exited(1, "", "Drive 0 Full (Storage Element 2 Loaded)")));
        executor
            .expect_run()
            .withf(|cmd: &DeviceCommand| cmd.has_arg("load") && cmd.has_arg("7"))
            .returning(|_| Ok(CommandOutput::exited(0, "Loading media", "")));
        let ops = ops(executor);

        assert_eq!(ops.load(1, 5).await.unwrap(), CommandOutcome::Empty);
        assert_eq!(ops.load(0, 6).await.unwrap(), CommandOutcome::Failure);
        assert_eq!(ops.load(1, 7).await.unwrap(), CommandOutcome::Success);
    }

    #[tokio::test]
    async fn test_disc_title_states() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        executor
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::exited(1, "", "")));
        executor
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::exited(0, "/media/FILM\n", "")));
        executor
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::exited(32, "", "findmnt: bad usage")));
        let ops = ops(executor);

        let probe = ops.disc_title(0).await.unwrap();
        assert_eq!(probe.outcome, CommandOutcome::Empty);
        let probe = ops.disc_title(0).await.unwrap();
        assert_eq!(probe.title.as_deref(), Some("FILM"));
        assert_eq!(probe.outcome, CommandOutcome::Success);
        let probe = ops.disc_title(0).await.unwrap();
        assert_eq!(probe.outcome, CommandOutcome::Failure);
    }

    #[tokio::test]
    async fn test_extract_retries_collision_once() {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        executor
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|cmd: &DeviceCommand| cmd.option_value("name").is_none())
            .returning(|_| Ok(CommandOutput::exited(2, "", "title exists")));
        executor
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|cmd: &DeviceCommand| {
                cmd.option_value("name").is_some_and(|n| n.starts_with("generic_rip_d1_"))
            })
            .returning(|_| Ok(CommandOutput::exited(2, "", "title exists")));
        let ops = ops(executor);

        assert_eq!(ops.extract(1, false).await.unwrap(), CommandOutcome::Failure);
    }

    #[tokio::test]
    async fn test_forced_generic_name_never_retries() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .times(1)
            .withf(|cmd: &DeviceCommand| cmd.option_value("name").is_some())
            .returning(|_| Ok(CommandOutput::exited(2, "", "")));
        let ops = ops(executor);

        assert_eq!(ops.extract(0, true).await.unwrap(), CommandOutcome::Failure);
    }

    #[tokio::test]
    async fn test_status_returns_raw_text() {
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .withf(|cmd: &DeviceCommand| cmd.has_arg("status"))
            .returning(|_| Ok(CommandOutput::exited(0, "Storage Changer /dev/sg8:2 Drives\n", "")));
        let ops = ops(executor);

        assert!(ops.status().await.unwrap().starts_with("Storage Changer"));
    }
}
