//! Session seams between the mirror walkers and the transfer protocols
//!
//! Walkers only ever see these traits. Opening and closing sessions is the
//! orchestrator's job, through a [`Connect`] implementation per phase.

use anyhow::Result;
use std::fmt;
use std::io::{Read, Write};

use crate::classify::EntryKind;
use crate::config::Endpoint;

/// The server understood the request and refused it (FTP 5xx, SFTP status failure).
///
/// Transport errors are not `Refused`; the classifier uses the difference to
/// decide how loudly to log a failed probe.
#[derive(Debug, Clone)]
pub struct Refused {
    pub code: u32,
    pub message: String,
}

impl fmt::Display for Refused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server refused ({}): {}", self.code, self.message.trim())
    }
}

impl std::error::Error for Refused {}

/// True if the error chain carries a server refusal
pub fn is_refusal(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<Refused>().is_some())
}

/// Read side of a remote endpoint (the device being backed up)
pub trait DownloadSession {
    /// Current working directory
    fn pwd(&mut self) -> Result<String>;

    /// Change working directory
    fn cwd(&mut self, path: &str) -> Result<()>;

    /// Names of the immediate children of `path`. Entries may be bare names or full paths.
    fn list(&mut self, path: &str) -> Result<Vec<String>>;

    /// Stream the bytes of the remote file into `sink`, returning the byte count
    fn retrieve(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64>;

    /// Authoritative entry kind, if the protocol can answer without probing.
    ///
    /// `Ok(None)` means "no opinion" and the classifier falls back to the
    /// working-directory probe.
    fn stat_kind(&mut self, _path: &str) -> Result<Option<EntryKind>> {
        Ok(None)
    }

    fn close(&mut self) -> Result<()>;
}

/// Outcome of an idempotent remote mkdir
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirCreation {
    Created,
    AlreadyExists,
}

/// Write side of a remote endpoint (the archive)
pub trait UploadSession {
    /// Create `path`. A directory that already exists is reported, not an error.
    fn make_dir(&mut self, path: &str) -> Result<DirCreation>;

    /// Create or overwrite the remote file at `path` with the bytes of `source`
    fn store(&mut self, source: &mut dyn Read, path: &str) -> Result<u64>;

    fn close(&mut self) -> Result<()>;
}

/// Opens an authenticated session against an endpoint
pub trait Connect {
    type Session;

    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Session>;
}
