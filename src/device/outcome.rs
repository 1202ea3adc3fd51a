//! Mapping from raw command results to device outcomes.
//!
//! Each device operation owns an [`OutcomeTable`]: an ordered list of rules
//! matched against the exit code and stderr of a failed command. The tables
//! are plain data so they can be inspected and tested without running
//! anything.

use serde::Serialize;
use std::fmt;

use crate::config::Config;
use crate::executor::CommandOutput;

/// Bumped whenever a default table changes meaning
pub const RULES_VERSION: u32 = 1;

/// Tri-state result of a device operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandOutcome {
    Success,
    /// Nothing to act on; expected during sweeps, never an error
    Empty,
    Failure,
}

/// Why a command classified the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reason {
    Completed,
    SourceEmpty,
    DriveOccupied,
    SlotOccupied,
    DriveEmpty,
    NotMounted,
    NameCollision,
    Unclassified,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Reason::Completed => "completed",
            Reason::SourceEmpty => "source slot is empty",
            Reason::DriveOccupied => "drive already holds a disc",
            Reason::SlotOccupied => "destination slot is occupied",
            Reason::DriveEmpty => "drive holds no disc",
            Reason::NotMounted => "no filesystem mounted yet",
            Reason::NameCollision => "disc title collides with an earlier extraction",
            Reason::Unclassified => "unclassified failure",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub outcome: CommandOutcome,
    pub reason: Reason,
}

/// One row of a table; every present criterion must match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeRule {
    pub exit_code: Option<i32>,
    pub stderr_contains: Option<String>,
    pub outcome: CommandOutcome,
    pub reason: Reason,
}

impl OutcomeRule {
    fn stderr(marker: &str, outcome: CommandOutcome, reason: Reason) -> Self {
        Self {
            exit_code: None,
            stderr_contains: Some(marker.to_string()),
            outcome,
            reason,
        }
    }

    fn exit_code(code: i32, outcome: CommandOutcome, reason: Reason) -> Self {
        Self {
            exit_code: Some(code),
            stderr_contains: None,
            outcome,
            reason,
        }
    }

    fn matches(&self, output: &CommandOutput) -> bool {
        let code_matches = self
            .exit_code
            .is_none_or(|code| output.status.code() == Some(code));
        let stderr_matches = self
            .stderr_contains
            .as_deref()
            .is_none_or(|marker| output.stderr.contains(marker));
        code_matches && stderr_matches
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeTable {
    pub name: &'static str,
    pub rules: Vec<OutcomeRule>,
}

impl OutcomeTable {
    /// Changer `load`: an empty source slot is benign, an occupied drive is not
    pub fn load(config: &Config) -> Self {
        Self {
            name: "load",
            rules: vec![
                OutcomeRule::stderr(&config.carousel.empty_marker, CommandOutcome::Empty, Reason::SourceEmpty),
                OutcomeRule::stderr(&config.carousel.full_marker, CommandOutcome::Failure, Reason::DriveOccupied),
            ],
        }
    }

    /// Changer `unload`: an occupied destination is a failure
    pub fn unload(config: &Config) -> Self {
        Self {
            name: "unload",
            rules: vec![
                OutcomeRule::stderr(&config.carousel.full_marker, CommandOutcome::Failure, Reason::SlotOccupied),
                OutcomeRule::stderr(&config.carousel.empty_marker, CommandOutcome::Empty, Reason::DriveEmpty),
            ],
        }
    }

    /// Mount probe: "not mounted" is what the workflow polls on
    pub fn mount_probe(config: &Config) -> Self {
        Self {
            name: "mount_probe",
            rules: vec![OutcomeRule::exit_code(
                config.mount.not_mounted_code,
                CommandOutcome::Empty,
                Reason::NotMounted,
            )],
        }
    }

    pub fn extract(config: &Config) -> Self {
        Self {
            name: "extract",
            rules: vec![OutcomeRule::exit_code(
                config.extractor.name_collision_code,
                CommandOutcome::Failure,
                Reason::NameCollision,
            )],
        }
    }

    /// Classify a finished command; the first matching rule wins
    pub fn classify(&self, output: &CommandOutput) -> Classification {
        if output.status.is_success() {
            return Classification {
                outcome: CommandOutcome::Success,
                reason: Reason::Completed,
            };
        }

        self.rules
            .iter()
            .find(|rule| rule.matches(output))
            .map(|rule| Classification {
                outcome: rule.outcome,
                reason: rule.reason,
            })
            .unwrap_or(Classification {
                outcome: CommandOutcome::Failure,
                reason: Reason::Unclassified,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandStatus;

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn test_exit_zero_and_dry_run_are_success() {
        let table = OutcomeTable::load(&config());
        let ok = table.classify(&CommandOutput::exited(0, "", "Empty"));
        assert_eq!(ok.outcome, CommandOutcome::Success);
        assert_eq!(table.classify(&CommandOutput::not_run()).outcome, CommandOutcome::Success);
    }

    #[test]
    fn test_load_rules() {
        let table = OutcomeTable::load(&config());
        let empty = table.classify(&CommandOutput::exited(1, "", "Source Element Address 12 is Empty"));
        assert_eq!(empty, Classification { outcome: CommandOutcome::Empty, reason: Reason::SourceEmpty });

        let full = table.classify(&CommandOutput::exited(1, "", "Drive 0 Full (Storage Element 3 Loaded)"));
        assert_eq!(full, Classification { outcome: CommandOutcome::Failure, reason: Reason::DriveOccupied });

        let other = table.classify(&CommandOutput::exited(1, "", "mtx: Request Sense: Long Report=yes"));
        assert_eq!(other.reason, Reason::Unclassified);
        assert_eq!(other.outcome, CommandOutcome::Failure);
    }

    #[test]
    fn test_unload_occupied_slot_is_failure() {
        let table = OutcomeTable::unload(&config());
        let full = table.classify(&CommandOutput::exited(1, "", "Storage Element 351 is Already Full"));
        assert_eq!(full.outcome, CommandOutcome::Failure);
        assert_eq!(full.reason, Reason::SlotOccupied);

        let empty = table.classify(&CommandOutput::exited(1, "", "Data Transfer Element 1 is Empty"));
        assert_eq!(empty.outcome, CommandOutcome::Empty);
    }

    #[test]
    fn test_probe_and_extract_rules() {
        let probe = OutcomeTable::mount_probe(&config());
        assert_eq!(probe.classify(&CommandOutput::exited(1, "", "")).outcome, CommandOutcome::Empty);
        assert_eq!(probe.classify(&CommandOutput::exited(4, "", "")).outcome, CommandOutcome::Failure);

        let extract = OutcomeTable::extract(&config());
        assert_eq!(extract.classify(&CommandOutput::exited(2, "", "")).reason, Reason::NameCollision);
        assert_eq!(extract.classify(&CommandOutput::exited(1, "", "")).reason, Reason::Unclassified);
    }

    #[test]
    fn test_signaled_command_is_unclassified_failure() {
        let output = CommandOutput {
            status: CommandStatus::Signaled,
            stdout: String::new(),
            stderr: String::new(),
        };
        let probe = OutcomeTable::mount_probe(&config());
        assert_eq!(probe.classify(&output).reason, Reason::Unclassified);
    }
}
