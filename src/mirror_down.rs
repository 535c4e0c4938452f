//! Recursive remote-to-local mirror
//!
//! Depth-first: each directory is listed, its children classified and
//! either recursed into or downloaded before the next sibling.

use anyhow::{Context, Result};
use log::{debug, error};
use std::fs;
use std::path::Path;

use crate::classify::{EntryKind, RemoteEntry};
use crate::config::FailurePolicy;
use crate::logger::Logger;
use crate::normalize::{is_navigation_entry, join_remote, local_name};
use crate::session::DownloadSession;
use crate::stats::MirrorStats;

/// Name prefix of in-flight downloads. An interrupted run can leave these
/// behind, so uploads skip them.
pub const STAGING_PREFIX: &str = ".retromirror-part";

pub struct MirrorDown<'a, S: DownloadSession + ?Sized> {
    session: &'a mut S,
    policy: FailurePolicy,
    logger: &'a dyn Logger,
    stats: MirrorStats,
}

impl<'a, S: DownloadSession + ?Sized> MirrorDown<'a, S> {
    pub fn new(session: &'a mut S, policy: FailurePolicy, logger: &'a dyn Logger) -> Self {
        Self {
            session,
            policy,
            logger,
            stats: MirrorStats::default(),
        }
    }

    /// Classify a remote path (once) through this walker's session
    pub fn resolve(&mut self, entry: &mut RemoteEntry) -> EntryKind {
        entry.resolve(&mut *self.session)
    }

    /// Mirror `remote` onto `local`, whatever kind it turns out to be
    pub fn mirror(&mut self, remote: &str, local: &Path) -> Result<()> {
        let mut entry = RemoteEntry::new(remote);
        self.resolve(&mut entry);
        self.mirror_entry(&entry, local)
    }

    /// Mirror an entry whose kind may already be known
    pub fn mirror_entry(&mut self, entry: &RemoteEntry, local: &Path) -> Result<()> {
        match entry.kind() {
            EntryKind::Directory => self.mirror_dir(&entry.path, local),
            EntryKind::File => self.fetch_file(&entry.path, local),
            EntryKind::Unknown => self.mirror(&entry.path, local),
        }
    }

    pub fn stats(&self) -> &MirrorStats {
        &self.stats
    }

    pub fn into_stats(self) -> MirrorStats {
        self.stats
    }

    fn mirror_dir(&mut self, remote: &str, local: &Path) -> Result<()> {
        if !local.is_dir() {
            let created = fs::create_dir_all(local)
                .with_context(|| format!("create local directory {}", local.display()));
            match created {
                Ok(()) => self.stats.dirs_created += 1,
                Err(e) => return self.item_failed("mkdir", remote, e),
            }
        } else {
            self.stats.dirs_existing += 1;
        }

        let items = match self.session.list(remote) {
            Ok(items) => items,
            Err(e) => return self.item_failed("list", remote, e),
        };

        for item in items {
            if is_navigation_entry(&item) {
                continue;
            }
            let child_remote = join_remote(remote, &item);
            let child_local = local.join(local_name(&item));
            let mut child = RemoteEntry::new(child_remote);
            if self.resolve(&mut child) == EntryKind::Directory {
                debug!(
                    "Downloading directory {} to {}",
                    child.path,
                    child_local.display()
                );
            }
            self.mirror_entry(&child, &child_local)?;
        }
        Ok(())
    }

    fn fetch_file(&mut self, remote: &str, local: &Path) -> Result<()> {
        debug!("Downloading file {} to {}", remote, local.display());
        match download_to(&mut *self.session, remote, local) {
            Ok(bytes) => {
                self.stats.add_file(bytes);
                self.logger.fetched(remote, local, bytes);
                Ok(())
            }
            Err(e) => self.item_failed("fetch", remote, e),
        }
    }

    /// Record a per-item failure; only the abort policy turns it into an error
    fn item_failed(&mut self, context: &str, remote: &str, err: anyhow::Error) -> Result<()> {
        error!("Error downloading '{}': {:#}", remote, err);
        self.logger.error(context, remote, &format!("{:#}", err));
        self.stats.add_error(format!("{context} {remote}: {err:#}"));
        match self.policy {
            FailurePolicy::Continue => Ok(()),
            FailurePolicy::Abort => Err(err.context(format!("download aborted at {remote}"))),
        }
    }
}

/// Stream one remote file into place. Nothing is left at `local` if the transfer fails.
fn download_to<S: DownloadSession + ?Sized>(session: &mut S, remote: &str, local: &Path) -> Result<u64> {
    let parent = match local.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("create local directory {}", parent.display()))?;

    let mut staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(parent)
        .with_context(|| format!("create staging file in {}", parent.display()))?;
    let bytes = session.retrieve(remote, staging.as_file_mut())?;
    staging
        .persist(local)
        .with_context(|| format!("move download into {}", local.display()))?;
    Ok(bytes)
}
