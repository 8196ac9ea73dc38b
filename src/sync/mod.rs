//! Daily transfer engine.
//!
//! For every eligible dated unit, one at a time and oldest first:
//!
//! ```text
//! screen local -> ensure remote root -> screen remote -> delta
//!   -> remote subdirs -> lock -> copy -> verify -> remove source -> unlock
//! ```
//!
//! Nothing is persisted between runs. The delta is recomputed from both
//! filesystems each time, so a run interrupted at any point is resumed by
//! running again: files already uploaded are detected by size and skipped.

pub mod screen;

use crate::callbacks::UploadCallbacks;
use crate::checksum::{local_digest, remote_digest, DEFAULT_REMOTE_DIGEST_PROGRAM};
use crate::discovery::{discover, DatedUnit, UnitPayload, UnitVariant};
use crate::eligibility::default_grace_period;
use crate::error::{Result, SyncError};
use crate::lock::TwinLock;
use crate::progress::{format_progress, ProgressThrottle, DEFAULT_PROGRESS_INTERVAL};
use crate::transport::{join_remote, Transport};
use chrono::{NaiveDate, NaiveDateTime};
use screen::{compute_delta, screen_local_directory, screen_local_files, screen_remote};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub use screen::{FileEntry, TransferDelta};

/// Per-job settings of a transfer run.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Delete the local unit once its upload is verified
    pub remove_files_after_upload: bool,
    pub variant: UnitVariant,
    /// Delay after the end of a unit's day before it is uploaded
    pub grace_period: chrono::Duration,
    pub progress_interval: Duration,
    /// Remote program reading the byte stream on stdin and printing its MD5
    pub remote_digest_program: String,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            remove_files_after_upload: false,
            variant: UnitVariant::Directories,
            grace_period: default_grace_period(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            remote_digest_program: DEFAULT_REMOTE_DIGEST_PROGRAM.to_string(),
        }
    }
}

/// What a successful unit run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSummary {
    pub synced: usize,
    pub uploaded: usize,
    pub source_removed: bool,
}

#[derive(Debug)]
pub enum UnitOutcome {
    Success(UnitSummary),
    Failed(SyncError),
    Aborted,
}

#[derive(Debug)]
pub struct UnitReport {
    pub date: NaiveDate,
    pub outcome: UnitOutcome,
}

/// Outcome of one batch, in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub units: Vec<UnitReport>,
    /// Entries skipped because their name encodes more than one date
    pub rejected: usize,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u.outcome, UnitOutcome::Success(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u.outcome, UnitOutcome::Failed(_)))
            .count()
    }

    pub fn aborted(&self) -> bool {
        self.units
            .iter()
            .any(|u| matches!(u.outcome, UnitOutcome::Aborted))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.rejected == 0
    }
}

/// Where a unit lives on both sides.
struct UnitLayout {
    local_root: PathBuf,
    remote_root: String,
}

/// Uploads the dated units of one source root to one remote root.
pub struct DailyTransferClient<'a, T: Transport + ?Sized> {
    transport: &'a T,
    src_path: PathBuf,
    dst_path: String,
    options: TransferOptions,
    callbacks: UploadCallbacks,
}

impl<'a, T: Transport + ?Sized> DailyTransferClient<'a, T> {
    pub fn new(
        transport: &'a T,
        src_path: impl Into<PathBuf>,
        dst_path: &str,
        options: TransferOptions,
        callbacks: UploadCallbacks,
    ) -> Self {
        let dst_path = match dst_path.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            transport,
            src_path: src_path.into(),
            dst_path,
            options,
            callbacks,
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Units old enough to upload at `now`, oldest first.
    ///
    /// Names encoding more than one date are logged and skipped; only an
    /// unreadable source root is an error.
    pub fn eligible_units(&self, now: NaiveDateTime) -> Result<(Vec<DatedUnit>, usize)> {
        let mut discovery = discover(
            &self.src_path,
            &self.callbacks.dated_pattern,
            self.options.variant,
        )?;
        for rejected in &discovery.rejected {
            self.callbacks.error(&format!("skipping: {rejected}"));
        }
        discovery.retain_eligible(now, self.options.grace_period);
        Ok((discovery.units, discovery.rejected.len()))
    }

    /// Upload every eligible unit using the local wall clock.
    pub fn run(&self) -> Result<BatchReport> {
        self.run_at(chrono::Local::now().naive_local())
    }

    /// Upload every unit eligible at `now`.
    ///
    /// A failing unit is logged and the batch moves on; an abort stops it.
    pub fn run_at(&self, now: NaiveDateTime) -> Result<BatchReport> {
        let (units, rejected) = self.eligible_units(now)?;
        let labels: Vec<String> = units.iter().map(DatedUnit::label).collect();
        self.callbacks.info(&format!(
            "Found {} {}(s) to upload: [{}]",
            units.len(),
            match self.options.variant {
                UnitVariant::Directories => "directory",
                UnitVariant::Files => "day of file",
            },
            labels.join(", ")
        ));

        let mut report = BatchReport {
            units: Vec::with_capacity(units.len()),
            rejected,
        };
        for unit in &units {
            if self.callbacks.abort_requested() {
                self.callbacks.info("Aborting upload");
                break;
            }

            let outcome = match self.transfer_unit(unit) {
                Ok(summary) => UnitOutcome::Success(summary),
                Err(SyncError::Aborted) => UnitOutcome::Aborted,
                Err(e) => UnitOutcome::Failed(e),
            };
            let stop = matches!(outcome, UnitOutcome::Aborted);
            report.units.push(UnitReport {
                date: unit.date,
                outcome,
            });
            if stop {
                break;
            }
        }

        Ok(report)
    }

    /// Run the full protocol for one unit and log its final line.
    pub fn transfer_unit(&self, unit: &DatedUnit) -> Result<UnitSummary> {
        let label = unit.label();
        let result = self.upload_unit(unit, &label);
        match &result {
            Ok(_) => self.callbacks.info(&format!("{label}: done (successful)")),
            Err(SyncError::Aborted) => self
                .callbacks
                .info(&format!("{label}: done (aborted by abort-check)")),
            Err(e) => self.callbacks.error(&format!("{label}: done (failed: {e})")),
        }
        result
    }

    fn layout(&self, unit: &DatedUnit) -> Result<UnitLayout> {
        match &unit.payload {
            UnitPayload::Directory(dir) => {
                let name = dir.file_name().ok_or_else(|| {
                    SyncError::local_io(
                        dir,
                        std::io::Error::new(ErrorKind::InvalidInput, "unit path has no name"),
                    )
                })?;
                Ok(UnitLayout {
                    local_root: dir.clone(),
                    remote_root: join_remote(&self.dst_path, &name.to_string_lossy()),
                })
            }
            UnitPayload::Files(_) => Ok(UnitLayout {
                local_root: self.src_path.clone(),
                remote_root: self.dst_path.clone(),
            }),
        }
    }

    fn upload_unit(&self, unit: &DatedUnit, label: &str) -> Result<UnitSummary> {
        let layout = self.layout(unit)?;
        let flat = matches!(unit.payload, UnitPayload::Files(_));

        let local = match &unit.payload {
            UnitPayload::Directory(dir) => screen_local_directory(dir)?,
            UnitPayload::Files(paths) => screen_local_files(paths)?,
        };

        self.transport.mkdir(&layout.remote_root)?;
        let remote = screen_remote(self.transport, &layout.remote_root, flat)?;

        let delta = compute_delta(&local, &remote);
        self.callbacks.info(&format!(
            "{label}: found {} synced files and {} unsynced files",
            delta.synced.len(),
            delta.unsynced.len()
        ));

        for subdir in delta.remote_subdirectories() {
            self.transport
                .mkdir(&join_remote(&layout.remote_root, &subdir))?;
        }

        let lock = TwinLock::acquire(
            self.transport,
            &self.callbacks,
            label,
            &layout.local_root,
            &layout.remote_root,
        )?;

        self.copy(&layout, &delta, label)?;

        let relative_paths: Vec<&str> = local.iter().map(|e| e.relative_path.as_str()).collect();
        self.verify(&layout, &relative_paths, label)?;

        let source_removed = if self.options.remove_files_after_upload {
            self.remove_source(unit)?;
            self.callbacks
                .info(&format!("{label}: successfully removed source"));
            true
        } else {
            self.callbacks
                .info(&format!("{label}: skipping removal of source"));
            false
        };

        lock.release();

        Ok(UnitSummary {
            synced: delta.synced.len(),
            uploaded: delta.unsynced.len(),
            source_removed,
        })
    }

    /// Upload the copy set one file at a time, polling the abort-check
    /// after each file.
    fn copy(&self, layout: &UnitLayout, delta: &TransferDelta, label: &str) -> Result<()> {
        let total = delta.unsynced.len();
        if total == 0 {
            return Ok(());
        }

        let mut throttle =
            ProgressThrottle::new(total, self.options.progress_interval, Instant::now());
        for (i, entry) in delta.unsynced.iter().enumerate() {
            let local_path = local_file(&layout.local_root, &entry.relative_path);
            let remote_path = join_remote(&layout.remote_root, &entry.relative_path);
            tracing::debug!("{}: uploading {}", label, entry.relative_path);
            self.transport.upload(&local_path, &remote_path)?;

            let done = i + 1;
            if throttle.should_report(done, Instant::now()) {
                self.callbacks.progress(done, total);
                self.callbacks
                    .info(&format!("{label}: {}", format_progress(done, total)));
            }

            if self.callbacks.abort_requested() {
                return Err(SyncError::Aborted);
            }
        }
        Ok(())
    }

    fn verify(&self, layout: &UnitLayout, relative_paths: &[&str], label: &str) -> Result<()> {
        let local = local_digest(&layout.local_root, relative_paths)?;
        let remote = remote_digest(
            self.transport,
            &layout.remote_root,
            relative_paths,
            &self.options.remote_digest_program,
        )?;
        if local != remote {
            return Err(SyncError::ChecksumMismatch { local, remote });
        }
        self.callbacks.info(&format!("{label}: checksums match"));
        Ok(())
    }

    fn remove_source(&self, unit: &DatedUnit) -> Result<()> {
        let ignore_missing = |path: &Path, result: std::io::Result<()>| match result {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(SyncError::local_io(path, e)),
            _ => Ok(()),
        };

        match &unit.payload {
            UnitPayload::Directory(dir) => ignore_missing(dir.as_path(), fs::remove_dir_all(dir)),
            UnitPayload::Files(paths) => paths
                .iter()
                .try_for_each(|path| ignore_missing(path.as_path(), fs::remove_file(path))),
        }
    }
}

fn local_file(root: &Path, relative_path: &str) -> PathBuf {
    relative_path
        .split('/')
        .fold(root.to_path_buf(), |path, part| path.join(part))
}
