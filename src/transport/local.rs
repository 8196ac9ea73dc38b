//! Local transport - the "remote" side is a directory on this machine.
//!
//! Useful for destinations mounted into the local filesystem (NFS, SMB)
//! and for tests. Commands run through `sh -c`.

use super::{CommandOutput, RemoteEntry, Transport};
use crate::error::{Result, SyncError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

#[derive(Debug, Default, Clone)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for LocalTransport {
    fn run_with_input(&self, command: &str, input: &[u8]) -> Result<CommandOutput> {
        tracing::debug!("local run: {} ({} bytes of input)", command, input.len());
        let fail = |e: io::Error| SyncError::transport(format!("run `{command}`"), e);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(fail)?;

        // Feed stdin from its own thread so a chatty child cannot fill its
        // output pipes while we are still writing
        let writer = child.stdin.take().map(|mut stdin| {
            let input = input.to_vec();
            thread::spawn(move || match stdin.write_all(&input) {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            })
        });

        let output = child.wait_with_output().map_err(fail)?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(result) => result.map_err(fail)?,
                Err(_) => return Err(fail(io::Error::other("stdin writer panicked"))),
            }
        }

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn list(&self, remote_path: &str) -> Result<Vec<RemoteEntry>> {
        let op = || format!("list {remote_path}");
        let mut entries = Vec::new();
        for entry in fs::read_dir(remote_path).map_err(|e| SyncError::transport(op(), e))? {
            let entry = entry.map_err(|e| SyncError::transport(op(), e))?;
            let Ok(metadata) = fs::metadata(entry.path()) else {
                continue;
            };
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                is_dir: metadata.is_dir(),
            });
        }
        Ok(entries)
    }

    fn mkdir(&self, remote_path: &str) -> Result<()> {
        fs::create_dir_all(remote_path)
            .map_err(|e| SyncError::transport(format!("mkdir {remote_path}"), e))
    }

    fn create_new(&self, remote_path: &str) -> Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(remote_path)
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(SyncError::transport(format!("create {remote_path}"), e)),
        }
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let op = || format!("upload {} -> {remote_path}", local_path.display());

        let mut source = File::open(local_path).map_err(|e| SyncError::local_io(local_path, e))?;
        let mut target = File::create(remote_path).map_err(|e| SyncError::transport(op(), e))?;
        io::copy(&mut source, &mut target).map_err(|e| SyncError::transport(op(), e))?;
        Ok(())
    }

    fn remove(&self, remote_path: &str) -> Result<()> {
        let result = match fs::symlink_metadata(remote_path) {
            Ok(m) if m.is_dir() => fs::remove_dir_all(remote_path),
            Ok(_) => fs::remove_file(remote_path),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::transport(format!("remove {remote_path}"), e)),
        }
    }
}
