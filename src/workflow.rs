use chrono::Local;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::device::{CommandOutcome, DeviceOps};
use crate::error::{Result, RipitError};
use crate::slots::{Slot, SlotKind};

/// Terminal result of ripping one input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RipResult {
    Ripped,
    SlotEmpty,
    RipFailed,
}

/// Result of exercising one slot during a cassette sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotCheck {
    Occupied,
    Empty,
    Faulty,
}

/// Where a single-slot rip currently stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RipState {
    Idle,
    Loading {
        drive: usize,
    },
    WaitingForMount {
        drive: usize,
    },
    Extracting {
        drive: usize,
        title: Option<String>,
    },
    Unloading {
        drive: usize,
        title: Option<String>,
        extraction: CommandOutcome,
    },
    Done(RipResult),
}

impl fmt::Display for RipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RipState::Idle => write!(f, "idle"),
            RipState::Loading { drive } => write!(f, "loading into drive {}", drive),
            RipState::WaitingForMount { drive } => write!(f, "waiting for drive {} to mount", drive),
            RipState::Extracting { drive, .. } => write!(f, "extracting from drive {}", drive),
            RipState::Unloading { drive, extraction, .. } => {
                write!(f, "unloading drive {} after {:?} extraction", drive, extraction)
            }
            RipState::Done(result) => write!(f, "done: {:?}", result),
        }
    }
}

/// How a mount wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountWait {
    Mounted(Option<String>),
    ProbeFailed,
    TimedOut,
}

/// Sequences device operations for one slot at a time
pub struct RipWorkflow {
    ops: DeviceOps,
}

impl RipWorkflow {
    pub fn new(ops: DeviceOps) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &DeviceOps {
        &self.ops
    }

    /// Drive serving a slot: slots are split across drives by remainder
    pub fn drive_for(&self, slot: Slot) -> usize {
        slot as usize % self.ops.drive_count()
    }

    /// Rip one input slot end to end
    pub async fn rip_slot(&self, slot: Slot) -> Result<RipResult> {
        let slot = self.ops.layout().check_slot(i64::from(slot), SlotKind::Input)?;
        info!("Ripping slot {}", slot);

        let mut state = RipState::Idle;
        loop {
            state = self.step(slot, state).await?;
            debug!("Slot {}: {}", slot, state);
            if let RipState::Done(result) = state {
                info!("Slot {} finished: {:?}", slot, result);
                return Ok(result);
            }
        }
    }

    /// Advance the state machine for `slot` by one transition
    pub async fn step(&self, slot: Slot, state: RipState) -> Result<RipState> {
        let next = match state {
            RipState::Idle => RipState::Loading {
                drive: self.drive_for(slot),
            },
            RipState::Loading { drive } => match self.ops.load(drive, slot).await? {
                CommandOutcome::Success => RipState::WaitingForMount { drive },
                CommandOutcome::Empty => RipState::Done(RipResult::SlotEmpty),
                CommandOutcome::Failure => RipState::Done(RipResult::RipFailed),
            },
            RipState::WaitingForMount { drive } => match self.wait_for_mount(drive).await? {
                MountWait::Mounted(title) => RipState::Extracting { drive, title },
                MountWait::ProbeFailed => RipState::Extracting { drive, title: None },
                MountWait::TimedOut => {
                    let err = RipitError::DeviceFailure(format!(
                        "drive {} never mounted the disc from slot {}",
                        drive, slot
                    ));
                    error!("{}", err);
                    RipState::Unloading {
                        drive,
                        title: None,
                        extraction: CommandOutcome::Failure,
                    }
                }
            },
            RipState::Extracting { drive, title } => {
                // the disc is in the drive: every error from here on must still unload it
                let extraction = match self.ops.extract(drive, false).await {
                    Ok(CommandOutcome::Success) => CommandOutcome::Success,
                    Ok(_) => CommandOutcome::Failure,
                    Err(e) => {
                        error!("Extraction from drive {} (slot {}) could not run: {}", drive, slot, e);
                        CommandOutcome::Failure
                    }
                };
                RipState::Unloading {
                    drive,
                    title,
                    extraction,
                }
            }
            RipState::Unloading {
                drive,
                title,
                extraction,
            } => {
                // a failed disc goes back where it came from
                let destination = if extraction == CommandOutcome::Success {
                    self.ops.layout().output_slot_for(slot)?
                } else {
                    slot
                };

                self.write_disc_log(Some(slot), drive, title.as_deref(), extraction)
                    .await;
                self.park(drive, destination).await?;

                if extraction == CommandOutcome::Success {
                    RipState::Done(RipResult::Ripped)
                } else {
                    RipState::Done(RipResult::RipFailed)
                }
            }
            done @ RipState::Done(_) => done,
        };
        Ok(next)
    }

    /// Poll the mount probe until the drive reports something other than empty
    pub async fn wait_for_mount(&self, drive: usize) -> Result<MountWait> {
        let interval = self.ops.config().poll_interval();
        let timeout = self.ops.config().mount_timeout();
        let started = Instant::now();

        loop {
            let probe = match self.ops.disc_title(drive).await {
                Ok(probe) => probe,
                Err(e) => {
                    error!("Mount probe for drive {} could not run: {}", drive, e);
                    return Ok(MountWait::ProbeFailed);
                }
            };
            match probe.outcome {
                CommandOutcome::Success => return Ok(MountWait::Mounted(probe.title)),
                CommandOutcome::Failure => {
                    warn!("Mount probe for drive {} failed; extracting anyway", drive);
                    return Ok(MountWait::ProbeFailed);
                }
                CommandOutcome::Empty => {}
            }

            if let Some(timeout) = timeout {
                if started.elapsed() >= timeout {
                    return Ok(MountWait::TimedOut);
                }
            }
            debug!("Drive {} not mounted yet; retrying in {:?}", drive, interval);
            sleep(interval).await;
        }
    }

    /// Unload `drive` into `preferred`, falling back through the error bank.
    ///
    /// Returns the slot that took the disc. Running out of error slots is
    /// fatal: the disc has nowhere to go.
    pub async fn park(&self, drive: usize, preferred: Slot) -> Result<Slot> {
        if self.try_unload(drive, preferred).await {
            return Ok(preferred);
        }

        let mut last = preferred;
        for candidate in self.ops.layout().error_bank() {
            if candidate == preferred {
                continue;
            }
            last = candidate;
            warn!("Slot {} refused drive {}; trying error slot {}", preferred, drive, candidate);
            if self.try_unload(drive, candidate).await {
                warn!("Disc from drive {} parked in error slot {}", drive, candidate);
                return Ok(candidate);
            }
        }

        let err = RipitError::ResourceExhausted { drive, slot: last };
        error!("{}", err);
        Err(err)
    }

    /// One unload attempt; an executor error counts as a refusal
    async fn try_unload(&self, drive: usize, slot: Slot) -> bool {
        match self.ops.unload(drive, slot).await {
            Ok(outcome) => outcome == CommandOutcome::Success,
            Err(e) => {
                error!("Unloading drive {} into slot {} could not run: {}", drive, slot, e);
                false
            }
        }
    }

    /// Extract whatever is already loaded in `drive`, outside a batch
    pub async fn rip_loaded(&self, drive: usize, force_generic_name: bool) -> Result<CommandOutcome> {
        let title = self.ops.disc_title(drive).await?.title;
        let outcome = self.ops.extract(drive, force_generic_name).await?;
        self.write_disc_log(None, drive, title.as_deref(), outcome).await;
        Ok(outcome)
    }

    /// Load a slot and put the disc straight back, for cassette diagnostics
    pub async fn check_slot(&self, slot: Slot) -> Result<SlotCheck> {
        let slot = self.ops.layout().check_slot(i64::from(slot), SlotKind::Any)?;
        let drive = self.drive_for(slot);

        match self.ops.load(drive, slot).await? {
            CommandOutcome::Empty => Ok(SlotCheck::Empty),
            CommandOutcome::Failure => Ok(SlotCheck::Faulty),
            CommandOutcome::Success => {
                let placed = self.park(drive, slot).await?;
                if placed != slot {
                    warn!("Disc from slot {} could not go back and now sits in slot {}", slot, placed);
                }
                Ok(SlotCheck::Occupied)
            }
        }
    }

    /// Record title and disc structure for one disc.
    ///
    /// Never fails the rip: the disc still has to leave the drive.
    async fn write_disc_log(
        &self,
        slot: Option<Slot>,
        drive: usize,
        title: Option<&str>,
        extraction: CommandOutcome,
    ) {
        let info = match self.ops.disc_info(drive).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Could not read disc info from drive {}: {}", drive, e);
                String::new()
            }
        };

        let name = match (title, slot) {
            (Some(title), _) => title.to_string(),
            (None, Some(slot)) => format!("slot_{:03}", slot),
            (None, None) => format!("drive_{}", drive),
        };
        let path = self.disc_log_path(&name);

        let mut content = String::new();
        if let Some(slot) = slot {
            content.push_str(&format!("slot:       {}\n", slot));
        }
        content.push_str(&format!("drive:      {}\n", drive));
        content.push_str(&format!("title:      {}\n", title.unwrap_or("<unknown>")));
        content.push_str(&format!("extraction: {:?}\n", extraction));
        content.push_str(&format!("logged_at:  {}\n\n", Local::now().format("%Y-%m-%d %H:%M:%S")));
        content.push_str(&info);

        if self.ops.config().dry_run {
            info!("Dry run: would write disc log {}", path.display());
            return;
        }

        let dir = &self.ops.config().output.log_dir;
        let written = match fs::create_dir_all(dir).await {
            Ok(()) => fs::write(&path, content).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => info!("Disc log written to {} ({:?})", path.display(), extraction),
            Err(e) => warn!("Failed to write disc log {}: {}", path.display(), e),
        }
    }

    fn disc_log_path(&self, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| if c == '/' || c == '\0' { '_' } else { c })
            .collect();
        self.ops.config().output.log_dir.join(format!("{}.log", safe))
    }
}
