//! Run configuration: built-in profile table, optional TOML file, environment
//!
//! The record is built once in `main` and handed to the orchestrator by
//! reference. Nothing below the orchestrator reads the environment.

use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::normalize::remote_basename;
use crate::orchestrator::RunMode;

pub const DEFAULT_DOWNLOAD_PORT: u16 = 2821;
pub const DEFAULT_UPLOAD_PORT: u16 = 22;
pub const DEFAULT_ARCHIVE_BASE: &str = "/Games/EmulatorSettingsBackup";
pub const DEFAULT_ARCHIVE_LABEL: &str = "Retroid";
pub const DEFAULT_MIRROR_ROOT: &str = "retroid_saves";

const DOWNLOAD_ENV_PREFIX: &str = "RETROID_FTP";
const UPLOAD_ENV_PREFIX: &str = "RETROID_BACKUP_SFTP";
const MIRROR_ROOT_ENV: &str = "RETROID_LOCAL_SAVE_DIRECTORY";

/// What a walker does with a failed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log, record, and move on to the next sibling
    Continue,
    /// Stop the walk at the first failure
    Abort,
}

/// Host and credentials for one remote endpoint
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

impl Endpoint {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Override fields from `<PREFIX>_IP`, `_PORT`, `_USER`, `_PASS`
    fn apply_env(&mut self, prefix: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup(&format!("{prefix}_IP")) {
            self.host = host;
        }
        let port_key = format!("{prefix}_PORT");
        if let Some(port) = lookup(&port_key) {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("{port_key} is not a port number: '{port}'"))?;
        }
        if let Some(user) = lookup(&format!("{prefix}_USER")) {
            self.user = user;
        }
        if let Some(password) = lookup(&format!("{prefix}_PASS")) {
            self.password = password;
        }
        Ok(())
    }
}

/// Remote paths mirrored for one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMapping {
    pub name: String,
    pub saves: String,
    #[serde(default)]
    pub config: Vec<String>,
}

impl ProfileMapping {
    pub fn new(name: &str, saves: &str, config: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            saves: saves.to_string(),
            config: config.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Emulators on the handheld and where they keep their data
pub fn builtin_profiles() -> Vec<ProfileMapping> {
    vec![
        ProfileMapping::new(
            "skyline",
            "/device/Android/data/skyline.emu/files/switch/nand/user/save",
            &[],
        ),
        ProfileMapping::new(
            "retroarch",
            "/device/RetroArch/saves",
            &[
                "/device/RetroArch/config",
                "/device/RetroArch/states",
                "/device/RetroArch/screenshots",
            ],
        ),
        ProfileMapping::new(
            "ppsspp",
            "/device/ROMs/PSP/PSP/SAVEDATA",
            &["/device/ROMs/PSP/PSP/SYSTEM"],
        ),
        ProfileMapping::new(
            "aethersx2",
            "/device/Android/data/xyz.aethersx2.android/files/memcards",
            &[
                "/device/Android/data/xyz.aethersx2.android/files/inputprofiles",
                "/device/Android/data/xyz.aethersx2.android/files/gamesettings",
            ],
        ),
        ProfileMapping::new(
            "dolphin",
            "/device/Android/data/org.dolphinemu.dolphinemu/files/GC",
            &[
                "/device/Android/data/org.dolphinemu.dolphinemu/files/Config",
                "/device/Android/data/org.dolphinemu.dolphinemu/files/GameSettings",
                "/device/Android/data/org.dolphinemu.dolphinemu/files/StateSaves",
            ],
        ),
        ProfileMapping::new(
            "dolphin_mmjr",
            "/device/dolphin-mmjr/GC",
            &["/device/dolphin-mmjr/Config", "/device/dolphin-mmjr/GameSettings"],
        ),
    ]
}

/// Everything a run needs
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub download: Endpoint,
    pub upload: Endpoint,
    pub mirror_root: PathBuf,
    pub archive_base: String,
    pub archive_label: String,
    pub download_failures: FailurePolicy,
    pub upload_failures: FailurePolicy,
    pub profiles: Vec<ProfileMapping>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            download: Endpoint::with_port(DEFAULT_DOWNLOAD_PORT),
            upload: Endpoint::with_port(DEFAULT_UPLOAD_PORT),
            mirror_root: PathBuf::from(DEFAULT_MIRROR_ROOT),
            archive_base: DEFAULT_ARCHIVE_BASE.to_string(),
            archive_label: DEFAULT_ARCHIVE_LABEL.to_string(),
            download_failures: FailurePolicy::Continue,
            upload_failures: FailurePolicy::Abort,
            profiles: builtin_profiles(),
        }
    }
}

/// On-disk form; every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    mirror_root: Option<PathBuf>,
    archive_base: Option<String>,
    archive_label: Option<String>,
    download_failures: Option<FailurePolicy>,
    upload_failures: Option<FailurePolicy>,
    download: Option<Endpoint>,
    upload: Option<Endpoint>,
    profiles: Option<Vec<ProfileMapping>>,
}

impl MirrorConfig {
    /// Defaults, then `path` if given, then the environment through `lookup`
    pub fn load(path: Option<&Path>, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read config file {}", path.display()))?;
            config
                .apply_toml(&text)
                .with_context(|| format!("parse config file {}", path.display()))?;
        }
        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Layer a TOML document over the current values
    pub fn apply_toml(&mut self, text: &str) -> Result<()> {
        let file: ConfigFile = toml::from_str(text)?;
        if let Some(root) = file.mirror_root {
            self.mirror_root = root;
        }
        if let Some(base) = file.archive_base {
            self.archive_base = base;
        }
        if let Some(label) = file.archive_label {
            self.archive_label = label;
        }
        if let Some(policy) = file.download_failures {
            self.download_failures = policy;
        }
        if let Some(policy) = file.upload_failures {
            self.upload_failures = policy;
        }
        if let Some(endpoint) = file.download {
            self.download = merge_endpoint(endpoint, DEFAULT_DOWNLOAD_PORT);
        }
        if let Some(endpoint) = file.upload {
            self.upload = merge_endpoint(endpoint, DEFAULT_UPLOAD_PORT);
        }
        if let Some(profiles) = file.profiles {
            self.profiles = profiles;
        }
        Ok(())
    }

    pub fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        self.download.apply_env(DOWNLOAD_ENV_PREFIX, lookup)?;
        self.upload.apply_env(UPLOAD_ENV_PREFIX, lookup)?;
        if let Some(root) = lookup(MIRROR_ROOT_ENV) {
            self.mirror_root = PathBuf::from(root);
        }
        Ok(())
    }

    /// Reject configurations the run cannot work with; warn about suspicious ones
    pub fn validate(&self, mode: RunMode) -> Result<()> {
        if mode.downloads() && self.download.host.is_empty() {
            bail!("download host not set (RETROID_FTP_IP or [download] host)");
        }
        if mode.uploads() && self.upload.host.is_empty() {
            bail!("upload host not set (RETROID_BACKUP_SFTP_IP or [upload] host)");
        }
        if let Some(why) = unsafe_mirror_root(&self.mirror_root) {
            bail!("mirror root '{}' is unusable: {}", self.mirror_root.display(), why);
        }
        if self.archive_label.is_empty() || self.archive_label.contains('/') {
            bail!("archive label must be a single path component: '{}'", self.archive_label);
        }

        let mut names = HashSet::new();
        for profile in &self.profiles {
            if profile.name.is_empty()
                || profile.name.contains(['/', '\\'])
                || profile.name == "."
                || profile.name == ".."
            {
                bail!("profile name must be a single path component: '{}'", profile.name);
            }
            if !names.insert(profile.name.as_str()) {
                bail!("profile '{}' is listed twice", profile.name);
            }
            let mut seen = HashSet::new();
            for path in &profile.config {
                let base = remote_basename(path);
                if !seen.insert(base) {
                    warn!(
                        "profile '{}': config paths share the basename '{}'; later downloads overwrite earlier ones",
                        profile.name, base
                    );
                }
            }
        }
        Ok(())
    }
}

/// Why `root` must not be used as the mirror root, which every download run
/// deletes and recreates
pub fn unsafe_mirror_root(root: &Path) -> Option<&'static str> {
    if root.as_os_str().is_empty() {
        return Some("it is empty");
    }
    if root.parent().is_none() {
        return Some("it is a filesystem root");
    }
    if matches!(
        root.components().next_back(),
        Some(Component::CurDir | Component::ParentDir)
    ) {
        return Some("it ends in '.' or '..'");
    }
    let cwd = std::env::current_dir().and_then(|dir| dir.canonicalize());
    if let (Ok(dir), Ok(cwd)) = (root.canonicalize(), cwd) {
        if cwd.starts_with(&dir) {
            return Some("it contains the working directory");
        }
    }
    None
}

fn merge_endpoint(mut endpoint: Endpoint, default_port: u16) -> Endpoint {
    if endpoint.port == 0 {
        endpoint.port = default_port;
    }
    endpoint
}
