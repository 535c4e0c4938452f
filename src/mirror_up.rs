//! Recursive local-to-remote mirror

use anyhow::{Context, Result};
use log::{debug, error, warn};
use std::fs::File;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::FailurePolicy;
use crate::logger::Logger;
use crate::mirror_down::STAGING_PREFIX;
use crate::normalize::join_remote;
use crate::session::{DirCreation, UploadSession};
use crate::stats::MirrorStats;

pub struct MirrorUp<'a, S: UploadSession + ?Sized> {
    session: &'a mut S,
    policy: FailurePolicy,
    logger: &'a dyn Logger,
    stats: MirrorStats,
}

impl<'a, S: UploadSession + ?Sized> MirrorUp<'a, S> {
    pub fn new(session: &'a mut S, policy: FailurePolicy, logger: &'a dyn Logger) -> Self {
        Self {
            session,
            policy,
            logger,
            stats: MirrorStats::default(),
        }
    }

    pub fn stats(&self) -> &MirrorStats {
        &self.stats
    }

    pub fn into_stats(self) -> MirrorStats {
        self.stats
    }

    /// Create `remote`; an existing directory counts as success
    pub fn ensure_dir(&mut self, remote: &str) -> Result<DirCreation> {
        let outcome = self.session.make_dir(remote)?;
        match outcome {
            DirCreation::Created => {
                self.stats.dirs_created += 1;
                self.logger.dir_created(remote);
            }
            DirCreation::AlreadyExists => {
                self.stats.dirs_existing += 1;
                debug!("Remote directory {} already exists", remote);
            }
        }
        Ok(outcome)
    }

    /// Copy the contents of `local` (not `local` itself) under `remote`
    ///
    /// Directories come before their contents and siblings are visited in
    /// name order, so the remote parent always exists when a file is stored.
    pub fn mirror(&mut self, local: &Path, remote: &str) -> Result<()> {
        let walker = WalkDir::new(local)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let at = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| local.display().to_string());
                    self.item_failed("walk", &at, anyhow::Error::new(e))?;
                    continue;
                }
            };
            let rel = entry.path().strip_prefix(local).unwrap_or(entry.path());
            let target = remote_path(remote, rel);

            if entry.file_type().is_dir() {
                if let Err(e) = self.ensure_dir(&target) {
                    self.item_failed("mkdir", &target, e)?;
                }
            } else if entry.file_type().is_file() {
                if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                    warn!("Skipping leftover partial download {}", entry.path().display());
                    continue;
                }
                if let Err(e) = self.store_file(entry.path(), &target) {
                    self.item_failed("store", &target, e)?;
                }
            } else {
                warn!("Skipping {} (not a regular file)", entry.path().display());
            }
        }
        Ok(())
    }

    fn store_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        let mut file =
            File::open(local).with_context(|| format!("open {}", local.display()))?;
        let bytes = self.session.store(&mut file, remote)?;
        self.stats.add_file(bytes);
        self.logger.stored(local, remote, bytes);
        Ok(())
    }

    fn item_failed(&mut self, context: &str, target: &str, err: anyhow::Error) -> Result<()> {
        error!("Error uploading '{}': {:#}", target, err);
        self.logger.error(context, target, &format!("{:#}", err));
        self.stats.add_error(format!("{context} {target}: {err:#}"));
        match self.policy {
            FailurePolicy::Continue => Ok(()),
            FailurePolicy::Abort => {
                error!(
                    "Upload aborted at '{}'; archive is partial ({} files stored)",
                    target, self.stats.files
                );
                Err(err.context(format!("upload aborted at {target}")))
            }
        }
    }
}

/// Remote counterpart of a path relative to the walk root
fn remote_path(remote_root: &str, rel: &Path) -> String {
    rel.components().fold(remote_root.to_string(), |acc, c| {
        join_remote(&acc, &c.as_os_str().to_string_lossy())
    })
}
