//! Optional per-run log file, separate from console logging

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::stats::MirrorStats;

pub trait Logger: Send + Sync {
    fn start(&self, _run_id: &str, _mode: &str) {}
    fn fetched(&self, _remote: &str, _local: &Path, _bytes: u64) {}
    fn stored(&self, _local: &Path, _remote: &str, _bytes: u64) {}
    fn dir_created(&self, _remote: &str) {}
    fn error(&self, _context: &str, _path: &str, _msg: &str) {}
    fn done(&self, _phase: &str, _stats: &MirrorStats, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .with_context(|| format!("open run log {}", path.as_ref().display()))?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn start(&self, run_id: &str, mode: &str) {
        self.line(&format!("START run={run_id} mode={mode}"));
    }
    fn fetched(&self, remote: &str, local: &Path, bytes: u64) {
        self.line(&format!(
            "FETCH src={} dst={} bytes={}",
            remote,
            local.display(),
            bytes
        ));
    }
    fn stored(&self, local: &Path, remote: &str, bytes: u64) {
        self.line(&format!(
            "STORE src={} dst={} bytes={}",
            local.display(),
            remote,
            bytes
        ));
    }
    fn dir_created(&self, remote: &str) {
        self.line(&format!("MKDIR path={remote}"));
    }
    fn error(&self, context: &str, path: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} path={} msg={}", context, path, msg));
    }
    fn done(&self, phase: &str, stats: &MirrorStats, seconds: f64) {
        self.line(&format!(
            "DONE phase={} files={} bytes={} dirs={} errors={} seconds={:.3}",
            phase,
            stats.files,
            stats.bytes,
            stats.dirs_created,
            stats.errors.len(),
            seconds
        ));
    }
}
