//! Unit checksums.
//!
//! The digest of a unit is the MD5 of the byte-wise concatenation of its
//! files, ordered by relative path. The remote side computes the same stream
//! with `xargs -0 cat | md5sum`, so both digests compare as plain strings.
//! The file list travels on the command's stdin, so a unit of any size fits
//! into a fixed-length command line.

use crate::error::{Result, SyncError};
use crate::transport::{shell_quote, Transport};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Program used on the remote host when none is configured
pub const DEFAULT_REMOTE_DIGEST_PROGRAM: &str = "md5sum";

const READ_BUFFER_SIZE: usize = 256 * 1024;

/// MD5 over the files at `root/<relative>` in the given order.
pub fn local_digest<S: AsRef<str>>(root: &Path, relative_paths: &[S]) -> Result<String> {
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    for relative in relative_paths {
        let path = root.join(relative.as_ref());
        let mut file = File::open(&path).map_err(|e| SyncError::local_io(&path, e))?;
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|e| SyncError::local_io(&path, e))?;
            if n == 0 {
                break;
            }
            context.consume(&buf[..n]);
        }
    }

    Ok(format!("{:x}", context.compute()))
}

/// Shell command that prints the digest of the files named on its stdin,
/// relative to `remote_root`.
///
/// With an empty list `cat` never runs and the empty stream is hashed.
pub fn remote_digest_command(remote_root: &str, program: &str) -> String {
    format!(
        "cd {} && xargs -0 -r cat -- | {program}",
        shell_quote(remote_root)
    )
}

/// NUL-terminated file list fed to [`remote_digest_command`].
pub fn remote_digest_input<S: AsRef<str>>(relative_paths: &[S]) -> Vec<u8> {
    let mut input = Vec::new();
    for relative in relative_paths {
        input.extend_from_slice(relative.as_ref().as_bytes());
        input.push(0);
    }
    input
}

/// Run the digest command through `transport` and return the digest.
pub fn remote_digest<T: Transport + ?Sized, S: AsRef<str>>(
    transport: &T,
    remote_root: &str,
    relative_paths: &[S],
    program: &str,
) -> Result<String> {
    let command = remote_digest_command(remote_root, program);
    let output = transport.run_with_input(&command, &remote_digest_input(relative_paths))?;
    if !output.success() {
        let first_error = output.stderr.lines().next().unwrap_or_default();
        return Err(SyncError::transport(
            format!("checksum {remote_root}"),
            format!("exit code {}: {}", output.exit_code, first_error.trim()),
        ));
    }

    output
        .stdout
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| {
            SyncError::transport(format!("checksum {remote_root}"), "empty checksum output")
        })
}
