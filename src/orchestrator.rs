//! Run sequencing: clear the mirror, pull every profile, push an archive
//!
//! One session per phase. The download session is closed before the upload
//! session is opened, and neither walker ever sees the connector.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone};
use log::{error, info, warn};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;

use crate::archive::ArchiveRoot;
use crate::classify::RemoteEntry;
use crate::config::{unsafe_mirror_root, MirrorConfig, ProfileMapping};
use crate::logger::Logger;
use crate::mirror_down::MirrorDown;
use crate::mirror_up::MirrorUp;
use crate::normalize::{Category, MirrorLayout};
use crate::session::{Connect, DownloadSession, UploadSession};
use crate::stats::MirrorStats;

/// Which phases a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    /// Clear the mirror, download every profile, upload an archive
    Full,
    /// Clear the mirror and download every profile
    Download,
    /// Archive the mirror root as it is
    Upload,
}

impl RunMode {
    pub fn downloads(self) -> bool {
        matches!(self, RunMode::Full | RunMode::Download)
    }

    pub fn uploads(self) -> bool {
        matches!(self, RunMode::Full | RunMode::Upload)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::Download => "download",
            RunMode::Upload => "upload",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    ClearingLocalRoot,
    DownloadingProfiles,
    UploadingArchive,
    Done,
    Failed,
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub mode: RunMode,
    pub phase: RunPhase,
    /// Phase that was active when the run failed
    pub failed_in: Option<RunPhase>,
    pub download: MirrorStats,
    pub upload: MirrorStats,
    pub archive: Option<ArchiveRoot>,
    pub failure: Option<String>,
}

impl RunReport {
    fn new(mode: RunMode) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            mode,
            phase: RunPhase::Idle,
            failed_in: None,
            download: MirrorStats::default(),
            upload: MirrorStats::default(),
            archive: None,
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.phase == RunPhase::Done
    }

    fn fail(mut self, err: anyhow::Error) -> Self {
        error!("Run failed while {:?}: {:#}", self.phase, err);
        self.failed_in = Some(self.phase);
        self.phase = RunPhase::Failed;
        self.failure = Some(format!("{:#}", err));
        self
    }
}

pub struct Orchestrator<'a, D, U> {
    config: &'a MirrorConfig,
    download: D,
    upload: U,
    logger: &'a dyn Logger,
}

impl<'a, D, U> Orchestrator<'a, D, U>
where
    D: Connect,
    D::Session: DownloadSession,
    U: Connect,
    U::Session: UploadSession,
{
    pub fn new(config: &'a MirrorConfig, download: D, upload: U, logger: &'a dyn Logger) -> Self {
        Self {
            config,
            download,
            upload,
            logger,
        }
    }

    /// Run the phases `mode` selects. `started` names the archive root.
    pub fn run<Tz: TimeZone>(&self, mode: RunMode, started: &DateTime<Tz>) -> RunReport
    where
        Tz::Offset: fmt::Display,
    {
        let mut report = RunReport::new(mode);
        self.logger.start(&report.run_id, mode.as_str());
        info!("Starting {} run {}", mode, report.run_id);

        if mode.downloads() {
            report.phase = RunPhase::ClearingLocalRoot;
            if let Err(e) = clear_local_root(&self.config.mirror_root) {
                return report.fail(e);
            }

            report.phase = RunPhase::DownloadingProfiles;
            let clock = Instant::now();
            match self.download_phase() {
                Ok(stats) => {
                    self.logger.done("download", &stats, clock.elapsed().as_secs_f64());
                    report.download = stats;
                }
                Err(e) => return report.fail(e),
            }
            if report.download.is_clean() {
                info!("All saves and configurations downloaded successfully.");
            } else {
                warn!(
                    "Download finished with {} errors; the mirror is incomplete",
                    report.download.errors.len()
                );
            }
        }

        if mode.uploads() {
            report.phase = RunPhase::UploadingArchive;
            let archive = ArchiveRoot::new(
                &self.config.archive_base,
                &self.config.archive_label,
                started,
            );
            report.archive = Some(archive.clone());
            let clock = Instant::now();
            match self.upload_phase(&archive) {
                Ok(stats) => {
                    self.logger.done("upload", &stats, clock.elapsed().as_secs_f64());
                    report.upload = stats;
                }
                Err(e) => return report.fail(e),
            }
        }

        report.phase = RunPhase::Done;
        report
    }

    fn download_phase(&self) -> Result<MirrorStats> {
        let endpoint = &self.config.download;
        let mut session = self
            .download
            .connect(endpoint)
            .with_context(|| format!("open download session to {}", endpoint.address()))?;

        let layout = MirrorLayout::new(&self.config.mirror_root);
        let mut walker = MirrorDown::new(&mut session, self.config.download_failures, self.logger);
        for profile in &self.config.profiles {
            download_profile(&mut walker, &layout, profile);
        }
        let stats = walker.into_stats();

        if let Err(e) = session.close() {
            warn!("Closing download session: {:#}", e);
        }
        Ok(stats)
    }

    fn upload_phase(&self, archive: &ArchiveRoot) -> Result<MirrorStats> {
        let root = &self.config.mirror_root;
        if !root.is_dir() {
            bail!("mirror root {} does not exist; nothing to archive", root.display());
        }

        let endpoint = &self.config.upload;
        let mut session = self
            .upload
            .connect(endpoint)
            .with_context(|| format!("open upload session to {}", endpoint.address()))?;

        let mut walker = MirrorUp::new(&mut session, self.config.upload_failures, self.logger);
        let created = archive.create(&mut walker);
        if created.is_ok() {
            info!("Uploading {} to {}", root.display(), archive);
            if let Err(e) = walker.mirror(root, archive.path()) {
                error!("Error in SFTP backup: {:#}; archive {} is partial", e, archive);
            }
        }
        let stats = walker.into_stats();

        if let Err(e) = session.close() {
            warn!("Closing upload session: {:#}", e);
        }
        created.with_context(|| format!("create archive root {archive}"))?;

        if stats.is_clean() {
            info!("Backup to SFTP completed successfully ({} files).", stats.files);
        } else {
            warn!(
                "Backup to {} finished with {} errors",
                archive,
                stats.errors.len()
            );
        }
        Ok(stats)
    }
}

/// Saves first, then every config path, each as its own walk
fn download_profile<S: DownloadSession + ?Sized>(
    walker: &mut MirrorDown<'_, S>,
    layout: &MirrorLayout,
    profile: &ProfileMapping,
) {
    info!("Downloading saves and configuration for {}...", profile.name);

    if !profile.saves.is_empty() {
        mirror_mapped(walker, layout, profile, Category::Saves, &profile.saves);
    }
    for path in &profile.config {
        mirror_mapped(walker, layout, profile, Category::Config, path);
    }

    info!("Saves and configuration for {} downloaded.", profile.name);
}

fn mirror_mapped<S: DownloadSession + ?Sized>(
    walker: &mut MirrorDown<'_, S>,
    layout: &MirrorLayout,
    profile: &ProfileMapping,
    category: Category,
    remote: &str,
) {
    let category_dir = layout.category_dir(&profile.name, category);
    if let Err(e) = fs::create_dir_all(&category_dir) {
        error!("Cannot create {}: {}", category_dir.display(), e);
        return;
    }

    let mut entry = RemoteEntry::new(remote);
    let kind = walker.resolve(&mut entry);
    let dest = layout.destination(&profile.name, category, remote, kind);
    if let Err(e) = walker.mirror_entry(&entry, &dest) {
        error!(
            "Stopped mirroring {} for {}: {:#}",
            remote, profile.name, e
        );
    }
}

/// Remove the previous snapshot entirely and start from an empty directory
fn clear_local_root(root: &Path) -> Result<()> {
    if let Some(why) = unsafe_mirror_root(root) {
        bail!("refusing to clear mirror root '{}': {}", root.display(), why);
    }
    match fs::remove_dir_all(root) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("remove previous mirror {}", root.display()))
        }
    }
    fs::create_dir_all(root).with_context(|| format!("create mirror root {}", root.display()))
}
