//! Twin lock markers.
//!
//! While a unit is being copied, an empty marker file sits in the unit's
//! directory on both hosts. Cooperating writers and other sync processes
//! leave a directory alone while its marker exists. The lock is advisory.

use crate::callbacks::UploadCallbacks;
use crate::error::{Result, SyncError};
use crate::transport::{join_remote, Transport};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Reserved file name of the lock marker, identical on both sides
pub const LOCK_MARKER_NAME: &str = ".do-not-touch";

/// Guard over the local and remote lock markers of one unit.
///
/// Only markers created by this guard are ever removed. Release happens on
/// drop, so every exit path of the engine (errors, aborts, panics) clears
/// them.
pub struct TwinLock<'a, T: Transport + ?Sized> {
    transport: &'a T,
    callbacks: &'a UploadCallbacks,
    label: String,
    local: Option<PathBuf>,
    remote: Option<String>,
}

impl<'a, T: Transport + ?Sized> TwinLock<'a, T> {
    /// Create the local marker, then the remote one.
    ///
    /// Fails with `LockContention` if either marker already exists; a local
    /// marker created before the failure is released again.
    pub fn acquire(
        transport: &'a T,
        callbacks: &'a UploadCallbacks,
        label: &str,
        local_dir: &Path,
        remote_dir: &str,
    ) -> Result<Self> {
        let mut guard = Self {
            transport,
            callbacks,
            label: label.to_string(),
            local: None,
            remote: None,
        };

        let local_marker = local_dir.join(LOCK_MARKER_NAME);
        callbacks.info(&format!(
            "{label}: acquiring lock on local machine at \"{}\"",
            local_marker.display()
        ));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&local_marker)
        {
            Ok(_) => guard.local = Some(local_marker),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SyncError::LockContention {
                    location: local_marker.display().to_string(),
                })
            }
            Err(e) => return Err(SyncError::local_io(local_marker, e)),
        }

        let remote_marker = join_remote(remote_dir, LOCK_MARKER_NAME);
        callbacks.info(&format!(
            "{label}: acquiring lock on remote server at \"{remote_marker}\""
        ));
        if !transport.create_new(&remote_marker)? {
            return Err(SyncError::LockContention {
                location: remote_marker,
            });
        }
        guard.remote = Some(remote_marker);

        Ok(guard)
    }

    /// Release both markers now instead of at end of scope.
    pub fn release(mut self) {
        self.release_all();
    }

    /// Remote first, then local. Both are attempted; failures are logged.
    fn release_all(&mut self) {
        if let Some(remote) = self.remote.take() {
            self.callbacks.info(&format!(
                "{}: releasing lock on remote server at \"{remote}\"",
                self.label
            ));
            if let Err(e) = self.transport.remove(&remote) {
                self.callbacks.error(&format!(
                    "{}: could not release remote lock: {e}",
                    self.label
                ));
            }
        }

        if let Some(local) = self.local.take() {
            self.callbacks.info(&format!(
                "{}: releasing lock on local machine at \"{}\"",
                self.label,
                local.display()
            ));
            match fs::remove_file(&local) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => self.callbacks.error(&format!(
                    "{}: could not release local lock: {}",
                    self.label,
                    SyncError::local_io(&local, e)
                )),
            }
        }
    }
}

impl<T: Transport + ?Sized> Drop for TwinLock<'_, T> {
    fn drop(&mut self) {
        self.release_all();
    }
}
