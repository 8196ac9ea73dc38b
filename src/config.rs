//! Configuration file.
//!
//! ```toml
//! [remote]
//! host = "archive.example.org"
//! user = "uploader"
//! identity_file = "~/.ssh/id_ed25519"
//!
//! [[jobs]]
//! name = "interferograms"
//! src = "/data/ifgs"
//! dst = "/archive/ifgs"
//! variant = "directories"
//! pattern = "^%Y%m%d$"
//! remove_files_after_upload = true
//! ```

use crate::checksum::DEFAULT_REMOTE_DIGEST_PROGRAM;
use crate::discovery::UnitVariant;
use crate::error::{Result, SyncError};
use crate::pattern::{DatedPattern, DEFAULT_PATTERN};
use crate::progress::DEFAULT_PROGRESS_INTERVAL;
use crate::sync::TransferOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Expand tilde (~) in paths to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str == "~" {
        dirs::home_dir().unwrap_or_else(|| path.to_path_buf())
    } else if let Some(rest) = path_str.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        }
    } else {
        path.to_path_buf()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Ssh,
    /// Destination is mounted into the local filesystem
    Local,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(default)]
    pub transport: TransportKind,
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Defaults to the current user
    pub user: Option<String>,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub passphrase: Option<String>,
    #[serde(default = "default_digest_program")]
    pub digest_program: String,
}

fn default_port() -> u16 {
    22
}

fn default_digest_program() -> String {
    DEFAULT_REMOTE_DIGEST_PROGRAM.to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: None,
            port: default_port(),
            user: None,
            password: None,
            identity_file: None,
            passphrase: None,
            digest_program: default_digest_program(),
        }
    }
}

#[cfg(feature = "ssh")]
impl RemoteConfig {
    pub fn user(&self) -> String {
        self.user.clone().unwrap_or_else(whoami::username)
    }

    /// Password wins over key file; without either, use the ssh-agent.
    pub fn credential(&self) -> crate::transport::Credential {
        use crate::transport::Credential;

        if let Some(password) = &self.password {
            Credential::Password(password.clone())
        } else if let Some(path) = &self.identity_file {
            Credential::KeyFile {
                path: expand_tilde(path),
                passphrase: self.passphrase.clone(),
            }
        } else {
            Credential::Agent
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub name: String,
    pub src: PathBuf,
    pub dst: String,
    #[serde(default)]
    pub variant: UnitVariant,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub remove_files_after_upload: bool,
    #[serde(default = "default_grace_period_minutes")]
    pub grace_period_minutes: u32,
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_grace_period_minutes() -> u32 {
    60
}

fn default_progress_interval_secs() -> u64 {
    DEFAULT_PROGRESS_INTERVAL.as_secs()
}

impl JobConfig {
    pub fn pattern(&self) -> Result<DatedPattern> {
        DatedPattern::new(&self.pattern)
    }

    pub fn src_path(&self) -> PathBuf {
        expand_tilde(&self.src)
    }

    pub fn options(&self, remote: &RemoteConfig) -> TransferOptions {
        TransferOptions {
            remove_files_after_upload: self.remove_files_after_upload,
            variant: self.variant,
            grace_period: chrono::Duration::minutes(i64::from(self.grace_period_minutes)),
            progress_interval: Duration::from_secs(self.progress_interval_secs),
            remote_digest_program: remote.digest_program.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl SyncConfig {
    /// `<config dir>/circadian-sync/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("circadian-sync").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::parse(&text)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(SyncError::Config("no [[jobs]] configured".to_string()));
        }
        if self.remote.transport == TransportKind::Ssh
            && self.remote.host.as_deref().map_or(true, str::is_empty)
        {
            return Err(SyncError::Config(
                "remote.host is required for the ssh transport".to_string(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                return Err(SyncError::Config(format!("duplicate job name `{}`", job.name)));
            }
            if job.dst.trim().is_empty() {
                return Err(SyncError::Config(format!("job `{}`: dst is empty", job.name)));
            }
            job.pattern()?;
        }
        Ok(())
    }

    /// Jobs selected by name, all jobs when `names` is empty.
    pub fn select_jobs(&self, names: &[String]) -> Result<Vec<&JobConfig>> {
        if names.is_empty() {
            return Ok(self.jobs.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.jobs
                    .iter()
                    .find(|job| &job.name == name)
                    .ok_or_else(|| SyncError::Config(format!("unknown job `{name}`")))
            })
            .collect()
    }
}
