//! Per-run archive root on the backup host

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone};
use std::fmt;

use crate::mirror_up::MirrorUp;
use crate::session::{DirCreation, UploadSession};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `<base>/<label>-<YYYYMMDD_HHMMSS>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRoot {
    base: String,
    path: String,
}

impl ArchiveRoot {
    pub fn new<Tz: TimeZone>(base: &str, label: &str, started: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        let base = base.trim_end_matches('/').to_string();
        let path = format!("{}/{}-{}", base, label, started.format(TIMESTAMP_FORMAT));
        Self { base, path }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Make sure the base exists, then create the root itself.
    ///
    /// The base and its ancestors are created idempotently. The root must be
    /// new: an existing root would merge two runs, so it is an error.
    pub fn create<S: UploadSession + ?Sized>(&self, uploader: &mut MirrorUp<'_, S>) -> Result<()> {
        let mut prefix = String::new();
        for component in self.base.split('/').filter(|c| !c.is_empty()) {
            if !prefix.is_empty() || self.base.starts_with('/') {
                prefix.push('/');
            }
            prefix.push_str(component);
            uploader.ensure_dir(&prefix)?;
        }
        if uploader.ensure_dir(&self.path)? == DirCreation::AlreadyExists {
            bail!(
                "archive root {} already exists; refusing to merge into a previous run",
                self.path
            );
        }
        Ok(())
    }
}

impl fmt::Display for ArchiveRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
