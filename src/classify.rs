//! Remote entry classification
//!
//! FTP has no portable "stat", so a path is a directory if we can change into
//! it. Servers answer a failed `CWD` on a plain file with a permission-class
//! reply, which is indistinguishable from a directory we are not allowed to
//! enter. Both come out as [`EntryKind::File`]; a denied directory then fails
//! its download and is skipped.

use log::{debug, error};

use crate::session::{is_refusal, DownloadSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Unknown,
    Directory,
    File,
}

/// A remote path and its kind, resolved on first use
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub path: String,
    kind: EntryKind,
}

impl RemoteEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Unknown,
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Classify against `session` unless already known
    pub fn resolve<S: DownloadSession + ?Sized>(&mut self, session: &mut S) -> EntryKind {
        if self.kind == EntryKind::Unknown {
            self.kind = classify(session, &self.path);
        }
        self.kind
    }
}

/// Decide whether `path` is a directory or a file. Never fails.
pub fn classify<S: DownloadSession + ?Sized>(session: &mut S, path: &str) -> EntryKind {
    match session.stat_kind(path) {
        Ok(Some(kind)) if kind != EntryKind::Unknown => return kind,
        Ok(_) => {}
        Err(e) => debug!("stat of '{}' unavailable, probing instead: {:#}", path, e),
    }

    let original = match session.pwd() {
        Ok(dir) => dir,
        Err(e) => {
            error!("Unexpected error when checking if '{}' is a directory: {:#}", path, e);
            return EntryKind::File;
        }
    };

    if let Err(e) = session.cwd(path) {
        if is_refusal(&e) {
            debug!("Checked if '{}' is a directory: {:#}", path, e);
        } else {
            error!("Unexpected error when checking if '{}' is a directory: {:#}", path, e);
        }
        return EntryKind::File;
    }

    if let Err(e) = session.cwd(&original) {
        error!(
            "Entered '{}' but could not return to '{}': {:#}",
            path, original, e
        );
    }
    EntryKind::Directory
}
