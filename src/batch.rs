//! Batch scheduling across drives.
//!
//! Slots are split by `slot % drive_count`; each drive gets one worker that
//! walks its share in increasing order, so a drive never handles two discs
//! at once while the drives themselves run side by side.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{Result, RipitError};
use crate::slots::{Slot, SlotKind};
use crate::workflow::{RipResult, RipWorkflow, SlotCheck};

/// Summary of a ripping run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    pub ripped: usize,
    pub empty: usize,
    pub failed: usize,
    pub failed_slots: Vec<Slot>,
    pub elapsed_secs: f64,
    pub dry_run: bool,
}

impl BatchReport {
    fn tally(
        run_id: Uuid,
        started_at: DateTime<Local>,
        elapsed: Duration,
        dry_run: bool,
        results: &BTreeMap<Slot, RipResult>,
    ) -> Self {
        let mut report = Self {
            run_id,
            started_at,
            ripped: 0,
            empty: 0,
            failed: 0,
            failed_slots: Vec::new(),
            elapsed_secs: elapsed.as_secs_f64(),
            dry_run,
        };
        for (slot, result) in results {
            match result {
                RipResult::Ripped => report.ripped += 1,
                RipResult::SlotEmpty => report.empty += 1,
                RipResult::RipFailed => {
                    report.failed += 1;
                    report.failed_slots.push(*slot);
                }
            }
        }
        report
    }

    pub fn total(&self) -> usize {
        self.ripped + self.empty + self.failed
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the text report into `dir`, returning its path
    pub async fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "batch_report_{}.txt",
            self.started_at.format("%Y%m%d_%H%M%S")
        ));
        fs::write(&path, self.to_string()).await?;
        info!("Batch report written to {}", path.display());
        Ok(path)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch run {}", self.run_id)?;
        writeln!(f, "Started:  {}", self.started_at.format("%Y-%m-%d %H:%M:%S"))?;
        if self.dry_run {
            writeln!(f, "Mode:     dry run")?;
        }
        writeln!(f, "Ripped:   {}", self.ripped)?;
        writeln!(f, "Empty:    {}", self.empty)?;
        writeln!(f, "Failed:   {}", self.failed)?;
        if !self.failed_slots.is_empty() {
            let slots: Vec<String> = self.failed_slots.iter().map(|s| s.to_string()).collect();
            writeln!(f, "Failed slots: {}", slots.join(", "))?;
        }
        writeln!(f, "Elapsed:  {:.1} seconds", self.elapsed_secs)
    }
}

/// Summary of a cassette sweep
#[derive(Debug, Clone, Serialize)]
pub struct CassetteReport {
    pub cassette: u32,
    pub first_slot: Slot,
    pub last_slot: Slot,
    pub occupied: usize,
    pub empty: usize,
    pub faulty: usize,
    pub faulty_slots: Vec<Slot>,
    pub elapsed_secs: f64,
}

impl fmt::Display for CassetteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Cassette {} (slots {}-{})",
            self.cassette, self.first_slot, self.last_slot
        )?;
        writeln!(f, "Occupied: {}", self.occupied)?;
        writeln!(f, "Empty:    {}", self.empty)?;
        writeln!(f, "Faulty:   {}", self.faulty)?;
        if !self.faulty_slots.is_empty() {
            let slots: Vec<String> = self.faulty_slots.iter().map(|s| s.to_string()).collect();
            writeln!(f, "Faulty slots: {}", slots.join(", "))?;
        }
        writeln!(f, "Elapsed:  {:.1} seconds", self.elapsed_secs)
    }
}

pub struct BatchScheduler {
    workflow: Arc<RipWorkflow>,
}

impl BatchScheduler {
    pub fn new(workflow: Arc<RipWorkflow>) -> Self {
        Self { workflow }
    }

    /// Rip every slot of the input bank
    pub async fn rip_all(&self) -> Result<BatchReport> {
        let slots: Vec<Slot> = self.workflow.ops().layout().input_bank().collect();
        self.rip_slots(&slots).await
    }

    /// Rip the given input slots, one worker per drive
    pub async fn rip_slots(&self, slots: &[Slot]) -> Result<BatchReport> {
        let layout = self.workflow.ops().layout();
        for slot in slots {
            layout.check_slot(i64::from(*slot), SlotKind::Input)?;
        }

        let run_id = Uuid::new_v4();
        let started_at = Local::now();
        let start = Instant::now();
        info!("Batch {} starting over {} slots", run_id, slots.len());

        let results = self
            .fan_out(slots, |workflow, slot| async move {
                isolate(slot, workflow.rip_slot(slot).await, RipResult::RipFailed)
            })
            .await?;

        let report = BatchReport::tally(
            run_id,
            started_at,
            start.elapsed(),
            self.workflow.ops().config().dry_run,
            &results,
        );
        info!(
            "Batch {} finished: ripped={} empty={} failed={} in {:.1}s",
            run_id, report.ripped, report.empty, report.failed, report.elapsed_secs
        );
        Ok(report)
    }

    /// Load and return every slot of one cassette
    pub async fn test_cassette(&self, cassette: u32) -> Result<CassetteReport> {
        let layout = self.workflow.ops().layout();
        let range = layout.cassette_slots(cassette)?;
        // the last cassette may run past the highest configured slot
        let slots: Vec<Slot> = range
            .clone()
            .filter(|slot| layout.is_valid_slot(i64::from(*slot), SlotKind::Any))
            .collect();

        let start = Instant::now();
        info!("Testing cassette {} (slots {:?})", cassette, range);

        let results = self
            .fan_out(&slots, |workflow, slot| async move {
                isolate(slot, workflow.check_slot(slot).await, SlotCheck::Faulty)
            })
            .await?;

        let mut report = CassetteReport {
            cassette,
            first_slot: *range.start(),
            last_slot: slots.last().copied().unwrap_or(*range.end()),
            occupied: 0,
            empty: 0,
            faulty: 0,
            faulty_slots: Vec::new(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        for (slot, check) in &results {
            match check {
                SlotCheck::Occupied => report.occupied += 1,
                SlotCheck::Empty => report.empty += 1,
                SlotCheck::Faulty => {
                    report.faulty += 1;
                    report.faulty_slots.push(*slot);
                }
            }
        }
        Ok(report)
    }

    /// Run `job` for every slot, one sequential worker per drive.
    ///
    /// A worker that fails stops the others after their current slot; every
    /// requested slot must otherwise come back with a result.
    async fn fan_out<T, F, Fut>(&self, slots: &[Slot], job: F) -> Result<BTreeMap<Slot, T>>
    where
        T: Send + 'static,
        F: Fn(Arc<RipWorkflow>, Slot) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut lanes: Vec<Vec<Slot>> = vec![Vec::new(); self.workflow.ops().drive_count()];
        let mut ordered = slots.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        for slot in &ordered {
            lanes[self.workflow.drive_for(*slot)].push(*slot);
        }

        let halt = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();
        for (drive, lane) in lanes.into_iter().enumerate() {
            if lane.is_empty() {
                continue;
            }
            let workflow = Arc::clone(&self.workflow);
            let halt = Arc::clone(&halt);
            let job = job.clone();

            let worker = async move {
                let mut done = Vec::with_capacity(lane.len());
                for slot in lane {
                    if halt.load(Ordering::SeqCst) {
                        warn!("Stopping before slot {}: another drive aborted the run", slot);
                        break;
                    }
                    match job(Arc::clone(&workflow), slot).await {
                        Ok(result) => done.push((slot, result)),
                        Err(e) => {
                            halt.store(true, Ordering::SeqCst);
                            return Err(e);
                        }
                    }
                }
                Ok(done)
            };
            handles.push(tokio::spawn(worker.instrument(info_span!("drive", drive))));
        }

        let mut results = BTreeMap::new();
        let mut failure = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(done)) => results.extend(done),
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(RipitError::Worker(e.to_string()));
                }
            }
        }
        if let Some(e) = failure {
            error!("Batch aborted: {}", e);
            return Err(e);
        }

        if let Some(missing) = ordered.iter().find(|slot| !results.contains_key(*slot)) {
            return Err(RipitError::Worker(format!("slot {} was never attempted", missing)));
        }
        Ok(results)
    }
}

/// Keep one slot's failure from stopping its drive; only an exhausted
/// error bank aborts the run.
fn isolate<T>(slot: Slot, result: Result<T>, failed: T) -> Result<T> {
    match result {
        Err(e @ RipitError::ResourceExhausted { .. }) => Err(e),
        Err(e) => {
            error!("Slot {} failed: {}", slot, e);
            Ok(failed)
        }
        ok => ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_each_result() {
        let results: BTreeMap<Slot, RipResult> = [
            (1, RipResult::SlotEmpty),
            (2, RipResult::Ripped),
            (3, RipResult::RipFailed),
            (4, RipResult::Ripped),
        ]
        .into_iter()
        .collect();
        let report = BatchReport::tally(Uuid::new_v4(), Local::now(), Duration::from_secs(90), false, &results);

        assert_eq!((report.ripped, report.empty, report.failed), (2, 1, 1));
        assert_eq!(report.failed_slots, vec![3]);
        assert_eq!(report.total(), 4);
        let text = report.to_string();
        assert!(text.contains("Ripped:   2"));
        assert!(text.contains("Failed slots: 3"));
        assert!(text.contains("Elapsed:  90.0 seconds"));
    }

    #[test]
    fn test_isolate_only_propagates_exhaustion() {
        let isolated = isolate(5, Err(RipitError::DeviceFailure("jam".to_string())), RipResult::RipFailed);
        assert_eq!(isolated.unwrap(), RipResult::RipFailed);

        let fatal = isolate::<RipResult>(
            5,
            Err(RipitError::ResourceExhausted { drive: 1, slot: 720 }),
            RipResult::RipFailed,
        );
        assert!(matches!(fatal, Err(RipitError::ResourceExhausted { .. })));
    }

    #[tokio::test]
    async fn test_report_written_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let report = BatchReport::tally(Uuid::new_v4(), Local::now(), Duration::from_secs(3), false, &BTreeMap::new());
        let path = report.write_to(dir.path()).await.unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Ripped:   0"));
    }

    #[test]
    fn test_report_as_json() {
        let results: BTreeMap<Slot, RipResult> = [(7, RipResult::RipFailed)].into_iter().collect();
        let report = BatchReport::tally(Uuid::new_v4(), Local::now(), Duration::from_secs(1), true, &results);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["failed"], 1);
        assert_eq!(value["failed_slots"][0], 7);
        assert_eq!(value["dry_run"], true);
    }
}
