//! Transport capability used by the transfer engine.
//!
//! A transport is a live connection to the destination host. It is opened
//! once before a batch of daily transfers and closed after it; the engine
//! only borrows it. All operations block the calling thread.

pub mod local;
#[cfg(feature = "ssh")]
pub mod ssh;

use crate::error::Result;
use std::path::Path;

pub use local::LocalTransport;
#[cfg(feature = "ssh")]
pub use ssh::{Credential, SshTransport};

/// Outcome of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

pub trait Transport {
    /// Run a shell command on the remote host, feeding `input` to its stdin.
    ///
    /// Stdin is closed once `input` is written. Stdout and stderr are drained
    /// while the input is still being sent.
    fn run_with_input(&self, command: &str, input: &[u8]) -> Result<CommandOutput>;

    /// Run a shell command on the remote host with an empty stdin.
    fn run(&self, command: &str) -> Result<CommandOutput> {
        self.run_with_input(command, &[])
    }

    /// Immediate children of a remote directory, without `.` and `..`.
    fn list(&self, remote_path: &str) -> Result<Vec<RemoteEntry>>;

    /// Create a directory and its parents. An existing directory is success.
    fn mkdir(&self, remote_path: &str) -> Result<()>;

    /// Exclusively create an empty file.
    ///
    /// Returns `false` without touching it when the path already exists.
    fn create_new(&self, remote_path: &str) -> Result<bool>;

    /// Copy a local file to a remote path, replacing any existing file.
    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Remove a remote file. A path that does not exist is success.
    fn remove(&self, remote_path: &str) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn run_with_input(&self, command: &str, input: &[u8]) -> Result<CommandOutput> {
        (**self).run_with_input(command, input)
    }

    fn list(&self, remote_path: &str) -> Result<Vec<RemoteEntry>> {
        (**self).list(remote_path)
    }

    fn mkdir(&self, remote_path: &str) -> Result<()> {
        (**self).mkdir(remote_path)
    }

    fn create_new(&self, remote_path: &str) -> Result<bool> {
        (**self).create_new(remote_path)
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        (**self).upload(local_path, remote_path)
    }

    fn remove(&self, remote_path: &str) -> Result<()> {
        (**self).remove(remote_path)
    }
}

/// Join remote path segments with `/`.
pub fn join_remote(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if base.is_empty() {
        format!("/{relative}")
    } else if relative.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{relative}")
    }
}

/// Quote a string for POSIX `sh` using single quotes.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
