//! SSH transport - exec channels for commands, SFTP for file operations.

use super::{CommandOutput, RemoteEntry, Transport};
use crate::error::{Result, SyncError};
use ssh2::{Channel, OpenFlags, OpenType, Session, Sftp};
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long to wait for the TCP connection to the remote host
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between polls of an exec channel that had nothing to do
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How to authenticate against the remote host.
#[derive(Clone)]
pub enum Credential {
    Password(String),
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },
    /// Keys offered by a running ssh-agent
    Agent,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(***)"),
            Credential::KeyFile { path, .. } => {
                f.debug_struct("KeyFile").field("path", path).finish()
            }
            Credential::Agent => f.write_str("Agent"),
        }
    }
}

/// An open SSH connection with an SFTP subsystem.
pub struct SshTransport {
    session: Session,
    sftp: Sftp,
    destination: String,
    closed: bool,
}

impl SshTransport {
    pub fn connect(host: &str, port: u16, user: &str, credential: &Credential) -> Result<Self> {
        let destination = format!("{user}@{host}:{port}");
        tracing::info!("Connecting to {}", destination);
        let fail = |operation: &str, e: &dyn std::fmt::Display| {
            SyncError::transport(format!("{operation} {destination}"), e)
        };

        let tcp = connect_tcp(host, port).map_err(|e| fail("connect", &e))?;
        let mut session = Session::new().map_err(|e| fail("session", &e))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| fail("handshake", &e))?;

        let auth = match credential {
            Credential::Password(password) => session.userauth_password(user, password),
            Credential::KeyFile { path, passphrase } => {
                session.userauth_pubkey_file(user, None, path, passphrase.as_deref())
            }
            Credential::Agent => session.userauth_agent(user),
        };
        auth.map_err(|e| fail("authenticate", &e))?;

        if !session.authenticated() {
            return Err(fail("authenticate", &"authentication rejected"));
        }

        let sftp = session.sftp().map_err(|e| fail("sftp", &e))?;

        Ok(Self {
            session,
            sftp,
            destination,
            closed: false,
        })
    }

    /// Disconnect. Dropping an open transport disconnects as well.
    pub fn close(mut self) -> Result<()> {
        self.disconnect()
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::debug!("Disconnecting from {}", self.destination);
        self.session
            .disconnect(None, "circadian-sync done", None)
            .map_err(|e| SyncError::transport(format!("disconnect {}", self.destination), e))
    }

    fn exists(&self, remote_path: &str) -> bool {
        self.sftp.stat(Path::new(remote_path)).is_ok()
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            tracing::warn!("{}", e);
        }
    }
}

fn connect_tcp(host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

/// Puts the session into non-blocking mode until dropped.
struct NonBlocking<'a>(&'a Session);

impl<'a> NonBlocking<'a> {
    fn enter(session: &'a Session) -> Self {
        session.set_blocking(false);
        Self(session)
    }
}

impl Drop for NonBlocking<'_> {
    fn drop(&mut self) {
        self.0.set_blocking(true);
    }
}

/// The three standard streams of a running remote command.
///
/// Every call may fail with `WouldBlock` when the stream is not ready.
trait ExecStreams {
    fn write_stdin(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn close_stdin(&mut self) -> io::Result<()>;
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Remote side closed its output and nothing is left to read
    fn at_eof(&self) -> bool;
}

impl ExecStreams for Channel {
    fn write_stdin(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }

    fn close_stdin(&mut self) -> io::Result<()> {
        self.send_eof().map_err(io::Error::from)
    }

    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stderr().read(buf)
    }

    fn at_eof(&self) -> bool {
        self.eof()
    }
}

fn ready<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

/// Send `input` and collect stdout and stderr, servicing all three streams
/// in turn so neither output can stall the other behind a full window.
fn pump<S: ExecStreams>(streams: &mut S, mut input: &[u8]) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = vec![0u8; 32 * 1024];
    let mut stdin_open = true;

    loop {
        let mut progressed = false;

        if stdin_open {
            let step = if input.is_empty() {
                ready(streams.close_stdin()).map(|closed| closed.map(|()| 0))
            } else {
                ready(streams.write_stdin(input))
            };
            match step {
                Ok(Some(n)) => {
                    progressed = true;
                    if input.is_empty() {
                        stdin_open = false;
                    } else {
                        input = &input[n..];
                    }
                }
                Ok(None) => {}
                // The command stopped reading; its exit status tells why
                Err(e) => {
                    tracing::debug!("stdin closed early: {}", e);
                    stdin_open = false;
                }
            }
        }

        if let Some(n) = ready(streams.read_stdout(&mut buf))? {
            stdout.extend_from_slice(&buf[..n]);
            progressed |= n > 0;
        }
        if let Some(n) = ready(streams.read_stderr(&mut buf))? {
            stderr.extend_from_slice(&buf[..n]);
            progressed |= n > 0;
        }

        if !progressed {
            if streams.at_eof() {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    Ok((stdout, stderr))
}

impl Transport for SshTransport {
    fn run_with_input(&self, command: &str, input: &[u8]) -> Result<CommandOutput> {
        tracing::debug!("ssh run: {} ({} bytes of input)", command, input.len());
        let fail = |e: &dyn std::fmt::Display| SyncError::transport(format!("run `{command}`"), e);

        let mut channel = self.session.channel_session().map_err(|e| fail(&e))?;
        channel.exec(command).map_err(|e| fail(&e))?;

        let (stdout, stderr) = {
            let _non_blocking = NonBlocking::enter(&self.session);
            pump(&mut channel, input).map_err(|e| fail(&e))?
        };

        channel.wait_close().map_err(|e| fail(&e))?;
        let exit_code = channel.exit_status().map_err(|e| fail(&e))?;

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }

    fn list(&self, remote_path: &str) -> Result<Vec<RemoteEntry>> {
        let entries = self
            .sftp
            .readdir(Path::new(remote_path))
            .map_err(|e| SyncError::transport(format!("list {remote_path}"), e))?;

        Ok(entries
            .into_iter()
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().to_string();
                if name == "." || name == ".." {
                    return None;
                }
                Some(RemoteEntry {
                    name,
                    size: stat.size.unwrap_or(0),
                    is_dir: stat.is_dir(),
                })
            })
            .collect())
    }

    fn mkdir(&self, remote_path: &str) -> Result<()> {
        let mut current = String::new();
        if remote_path.starts_with('/') {
            current.push('/');
        }
        for part in remote_path.split('/').filter(|p| !p.is_empty()) {
            if !current.is_empty() && !current.ends_with('/') {
                current.push('/');
            }
            current.push_str(part);

            match self.sftp.stat(Path::new(&current)) {
                Ok(stat) if stat.is_dir() => continue,
                Ok(_) => {
                    return Err(SyncError::transport(
                        format!("mkdir {remote_path}"),
                        format!("{current} exists and is not a directory"),
                    ))
                }
                Err(_) => {}
            }

            tracing::debug!("Creating remote directory {}", current);
            if let Err(e) = self.sftp.mkdir(Path::new(&current), 0o755) {
                // Lost a race against another creator
                if !self.exists(&current) {
                    return Err(SyncError::transport(format!("mkdir {remote_path}"), e));
                }
            }
        }
        Ok(())
    }

    fn create_new(&self, remote_path: &str) -> Result<bool> {
        match self.sftp.open_mode(
            Path::new(remote_path),
            OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCLUSIVE,
            0o644,
            OpenType::File,
        ) {
            Ok(_) => Ok(true),
            Err(_) if self.exists(remote_path) => Ok(false),
            Err(e) => Err(SyncError::transport(format!("create {remote_path}"), e)),
        }
    }

    fn upload(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let op = || format!("upload {} -> {remote_path}", local_path.display());

        let mut local = File::open(local_path).map_err(|e| SyncError::local_io(local_path, e))?;
        let mut remote = self
            .sftp
            .create(Path::new(remote_path))
            .map_err(|e| SyncError::transport(op(), e))?;
        io::copy(&mut local, &mut remote).map_err(|e| SyncError::transport(op(), e))?;
        Ok(())
    }

    fn remove(&self, remote_path: &str) -> Result<()> {
        match self.sftp.unlink(Path::new(remote_path)) {
            Ok(()) => Ok(()),
            Err(_) if !self.exists(remote_path) => Ok(()),
            Err(e) => Err(SyncError::transport(format!("remove {remote_path}"), e)),
        }
    }
}
