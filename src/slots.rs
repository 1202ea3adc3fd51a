//! Slot addressing for the carousel.
//!
//! Slots are split into three disjoint banks: input discs, successfully
//! ripped discs (mirroring the input bank one to one) and a small error
//! bank used when the intended destination refuses a disc.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

use crate::config::SlotsConfig;
use crate::error::{Result, RipitError};

pub type Slot = u32;

/// Which bank a slot number is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    Input,
    Output,
    Error,
    Any,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotKind::Input => "input",
            SlotKind::Output => "output",
            SlotKind::Error => "error",
            SlotKind::Any => "carousel",
        };
        f.write_str(name)
    }
}

/// Validated bank bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    input: RangeInclusive<Slot>,
    output: RangeInclusive<Slot>,
    error: RangeInclusive<Slot>,
    cassette_size: u32,
}

impl SlotLayout {
    pub fn from_config(config: &SlotsConfig) -> Result<Self> {
        if config.input_first > config.input_last {
            return Err(RipitError::Config("Input bank is empty".to_string()));
        }
        if config.error_first > config.error_last {
            return Err(RipitError::Config("Error bank is empty".to_string()));
        }
        if config.cassette_size == 0 {
            return Err(RipitError::Config("Cassette size must be positive".to_string()));
        }

        let bank_len = config.input_last - config.input_first;
        let output_last = config.output_first.checked_add(bank_len).ok_or_else(|| {
            RipitError::Config("Output bank exceeds the slot number range".to_string())
        })?;

        let layout = Self {
            input: config.input_first..=config.input_last,
            output: config.output_first..=output_last,
            error: config.error_first..=config.error_last,
            cassette_size: config.cassette_size,
        };

        let banks = [
            ("input", &layout.input),
            ("output", &layout.output),
            ("error", &layout.error),
        ];
        for (i, (name_a, a)) in banks.iter().enumerate() {
            for (name_b, b) in banks.iter().skip(i + 1) {
                if a.start() <= b.end() && b.start() <= a.end() {
                    return Err(RipitError::Config(format!(
                        "The {} bank {:?} overlaps the {} bank {:?}",
                        name_a, a, name_b, b
                    )));
                }
            }
        }

        Ok(layout)
    }

    pub fn input_bank(&self) -> RangeInclusive<Slot> {
        self.input.clone()
    }

    pub fn output_bank(&self) -> RangeInclusive<Slot> {
        self.output.clone()
    }

    pub fn error_bank(&self) -> RangeInclusive<Slot> {
        self.error.clone()
    }

    /// Whether `n` lies in the bank named by `kind`.
    ///
    /// An input slot is also accepted as an error destination, since a disc
    /// that failed can always be put back where it came from.
    pub fn is_valid_slot(&self, n: i64, kind: SlotKind) -> bool {
        let Ok(n) = Slot::try_from(n) else {
            return false;
        };
        match kind {
            SlotKind::Input => self.input.contains(&n),
            SlotKind::Output => self.output.contains(&n),
            SlotKind::Error => self.error.contains(&n) || self.input.contains(&n),
            SlotKind::Any => {
                self.input.contains(&n) || self.output.contains(&n) || self.error.contains(&n)
            }
        }
    }

    pub fn check_slot(&self, n: i64, kind: SlotKind) -> Result<Slot> {
        if self.is_valid_slot(n, kind) {
            // the range check above guarantees the conversion
            Slot::try_from(n).map_err(|_| RipitError::InvalidSlot { slot: n, kind })
        } else {
            Err(RipitError::InvalidSlot { slot: n, kind })
        }
    }

    /// Mirrored output slot for a valid input slot
    pub fn output_slot_for(&self, input_slot: Slot) -> Result<Slot> {
        let slot = self.check_slot(i64::from(input_slot), SlotKind::Input)?;
        Ok(slot - self.input.start() + self.output.start())
    }

    /// Cassette (zero based) holding a slot.
    ///
    /// Cassettes are counted from the first input slot, so slots below it
    /// belong to none.
    pub fn cassette_of(&self, slot: Slot) -> Result<u32> {
        let checked = self.check_slot(i64::from(slot), SlotKind::Any)?;
        checked
            .checked_sub(*self.input.start())
            .map(|offset| offset / self.cassette_size)
            .ok_or(RipitError::InvalidSlot {
                slot: i64::from(slot),
                kind: SlotKind::Any,
            })
    }

    /// Carousel slots belonging to a cassette
    pub fn cassette_slots(&self, cassette: u32) -> Result<RangeInclusive<Slot>> {
        let first = cassette
            .checked_mul(self.cassette_size)
            .and_then(|offset| offset.checked_add(*self.input.start()))
            .filter(|first| self.is_valid_slot(i64::from(*first), SlotKind::Any))
            .ok_or_else(|| RipitError::Config(format!("No such cassette: {}", cassette)))?;
        let last = first + self.cassette_size - 1;
        Ok(first..=last)
    }
}

/// Drive number check against the configured drive count
pub fn is_valid_drive(d: i64, drive_count: usize) -> bool {
    usize::try_from(d).is_ok_and(|d| d < drive_count)
}
