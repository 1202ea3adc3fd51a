//! ripit - Automated DVD Jukebox Ripping
//!
//! Drives a two-drive optical jukebox: loads each input slot into a drive,
//! waits for the disc to mount, mirrors it with an extraction tool and
//! returns it to an output slot, or to an error slot when that fails.

pub mod batch;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod slots;
pub mod workflow;
