//! Unit discovery - finds the dated files or directories below a source root.

use crate::eligibility::is_eligible;
use crate::error::{Result, SyncError};
use crate::lock::LOCK_MARKER_NAME;
use crate::pattern::DatedPattern;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// How a day's data is laid out below the source root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitVariant {
    /// One directory per day, e.g. `20240917/`
    #[default]
    Directories,
    /// Flat files; all files carrying the same date form one unit
    Files,
}

impl UnitVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitVariant::Directories => "directories",
            UnitVariant::Files => "files",
        }
    }
}

impl fmt::Display for UnitVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitPayload {
    Directory(PathBuf),
    /// Sorted by file name
    Files(Vec<PathBuf>),
}

/// One calendar day's worth of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedUnit {
    pub date: NaiveDate,
    pub payload: UnitPayload,
}

impl DatedUnit {
    /// Date prefix used in log lines
    pub fn label(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    pub fn variant(&self) -> UnitVariant {
        match self.payload {
            UnitPayload::Directory(_) => UnitVariant::Directories,
            UnitPayload::Files(_) => UnitVariant::Files,
        }
    }

    /// `true` once the unit is old enough to upload
    pub fn is_eligible(&self, now: NaiveDateTime, grace_period: Duration) -> bool {
        is_eligible(self.date, now, grace_period)
    }
}

/// Result of scanning a source root.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Oldest first
    pub units: Vec<DatedUnit>,
    /// Entries that matched the pattern but could not be assigned a date
    pub rejected: Vec<SyncError>,
}

impl Discovery {
    /// Drop the units that are not old enough yet, keeping the order.
    pub fn retain_eligible(&mut self, now: NaiveDateTime, grace_period: Duration) {
        self.units.retain(|unit| unit.is_eligible(now, grace_period));
    }
}

/// List the immediate children of `source_root` that match `pattern`.
///
/// Non-matching children are skipped silently; ambiguous names are collected
/// in [`Discovery::rejected`].
pub fn discover(
    source_root: &Path,
    pattern: &DatedPattern,
    variant: UnitVariant,
) -> Result<Discovery> {
    let read_error = |source| SyncError::Discovery {
        path: source_root.to_path_buf(),
        source,
    };

    let mut directories: Vec<(NaiveDate, PathBuf)> = Vec::new();
    let mut files: BTreeMap<NaiveDate, Vec<PathBuf>> = BTreeMap::new();
    let mut rejected = Vec::new();

    for entry in fs::read_dir(source_root).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        let path = entry.path();

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if name == LOCK_MARKER_NAME {
            continue;
        }

        // Follow symlinks; entries that vanished meanwhile are skipped
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        let wanted = match variant {
            UnitVariant::Directories => metadata.is_dir(),
            UnitVariant::Files => metadata.is_file(),
        };
        if !wanted {
            continue;
        }

        match pattern.parse(&name) {
            Ok(Some(date)) => match variant {
                UnitVariant::Directories => directories.push((date, path)),
                UnitVariant::Files => files.entry(date).or_default().push(path),
            },
            Ok(None) => {}
            Err(e) => rejected.push(e),
        }
    }

    let units = match variant {
        UnitVariant::Directories => {
            directories.sort();
            directories
                .into_iter()
                .map(|(date, path)| DatedUnit {
                    date,
                    payload: UnitPayload::Directory(path),
                })
                .collect()
        }
        UnitVariant::Files => files
            .into_iter()
            .map(|(date, mut paths)| {
                paths.sort();
                DatedUnit {
                    date,
                    payload: UnitPayload::Files(paths),
                }
            })
            .collect(),
    };

    Ok(Discovery { units, rejected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_directories_oldest_first() {
        let tmp = TempDir::new().unwrap();
        for name in ["20240918", "20240101", "20231231", "notes", "2024091"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }
        // A file matching the pattern is ignored in the directory variant
        fs::write(tmp.path().join("20220101"), "x").unwrap();

        let pattern = DatedPattern::new("^%Y%m%d$").unwrap();
        let found = discover(tmp.path(), &pattern, UnitVariant::Directories).unwrap();

        let dates: Vec<NaiveDate> = found.units.iter().map(|u| u.date).collect();
        assert_eq!(
            dates,
            vec![date(2023, 12, 31), date(2024, 1, 1), date(2024, 9, 18)]
        );
        assert_eq!(
            found.units[0].payload,
            UnitPayload::Directory(tmp.path().join("20231231"))
        );
        assert!(found.rejected.is_empty());
    }

    #[test]
    fn test_files_grouped_by_date() {
        let tmp = TempDir::new().unwrap();
        for name in ["b20240917.txt", "a20240917.txt", "a20240916.txt", "readme.md"] {
            fs::write(tmp.path().join(name), name).unwrap();
        }
        fs::create_dir(tmp.path().join("c20240915")).unwrap();

        let pattern = DatedPattern::new("^.*%Y%m%d.*$").unwrap();
        let found = discover(tmp.path(), &pattern, UnitVariant::Files).unwrap();

        assert_eq!(found.units.len(), 2);
        assert_eq!(found.units[0].date, date(2024, 9, 16));
        assert_eq!(
            found.units[1].payload,
            UnitPayload::Files(vec![
                tmp.path().join("a20240917.txt"),
                tmp.path().join("b20240917.txt"),
            ])
        );
        assert_eq!(found.units[1].variant(), UnitVariant::Files);
        assert_eq!(found.units[1].label(), "20240917");
    }

    #[test]
    fn test_ambiguous_names_are_rejected_not_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("log-2020111111.txt"), "x").unwrap();
        fs::write(tmp.path().join("log-20201111.txt"), "x").unwrap();

        let pattern = DatedPattern::new("^.*%Y%m%d.*$").unwrap();
        let found = discover(tmp.path(), &pattern, UnitVariant::Files).unwrap();

        assert_eq!(found.units.len(), 1);
        assert_eq!(found.rejected.len(), 1);
        assert!(matches!(found.rejected[0], SyncError::AmbiguousName { .. }));
    }

    #[test]
    fn test_missing_root_is_discovery_error() {
        let tmp = TempDir::new().unwrap();
        let result = discover(
            &tmp.path().join("missing"),
            &DatedPattern::default(),
            UnitVariant::Directories,
        );
        assert!(matches!(result, Err(SyncError::Discovery { .. })));
    }

    #[test]
    fn test_retain_eligible() {
        let tmp = TempDir::new().unwrap();
        for name in ["20240916", "20240917", "20240918"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }

        let mut found = discover(
            tmp.path(),
            &DatedPattern::new("^%Y%m%d$").unwrap(),
            UnitVariant::Directories,
        )
        .unwrap();
        let now = date(2024, 9, 18).and_hms_opt(0, 30, 0).unwrap();
        found.retain_eligible(now, crate::eligibility::default_grace_period());

        let labels: Vec<String> = found.units.iter().map(DatedUnit::label).collect();
        assert_eq!(labels, vec!["20240916"]);
    }
}
