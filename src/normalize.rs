//! Remote-name to local-path mapping

use std::borrow::Cow;
use std::path::PathBuf;

use crate::classify::EntryKind;

/// Which half of a profile a remote path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Saves,
    Config,
}

impl Category {
    pub fn dir_name(self) -> &'static str {
        match self {
            Category::Saves => "saves",
            Category::Config => "config",
        }
    }
}

/// Last component of a remote path, ignoring trailing slashes
pub fn remote_basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Join a listing entry onto its parent. Absolute entries are taken as-is.
pub fn join_remote(parent: &str, child: &str) -> String {
    if child.starts_with('/') {
        return child.to_string();
    }
    if parent.is_empty() {
        return child.to_string();
    }
    format!("{}/{}", parent.trim_end_matches('/'), child)
}

/// Listing entries that never name a real child
pub fn is_navigation_entry(name: &str) -> bool {
    matches!(remote_basename(name), "" | "." | "..")
}

/// Local file name for a raw remote entry.
///
/// Percent escapes are decoded; if the decoded form would not be a single
/// safe path component only `%20` is decoded.
pub fn local_name(raw: &str) -> String {
    let base = remote_basename(raw);
    match urlencoding::decode(base) {
        Ok(decoded) if is_safe_component(&decoded) => decoded.into_owned(),
        _ => base.replace("%20", " "),
    }
}

fn is_safe_component(name: &Cow<'_, str>) -> bool {
    !name.is_empty()
        && name.as_ref() != "."
        && name.as_ref() != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Layout of the local mirror root
#[derive(Debug, Clone)]
pub struct MirrorLayout {
    root: PathBuf,
}

impl MirrorLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn profile_dir(&self, profile: &str) -> PathBuf {
        self.root.join(profile)
    }

    pub fn category_dir(&self, profile: &str, category: Category) -> PathBuf {
        self.profile_dir(profile).join(category.dir_name())
    }

    /// Local destination for one configured remote path of a profile
    ///
    /// A saves directory maps onto `saves/` itself; everything else keeps
    /// its (normalized) basename under the category directory.
    pub fn destination(
        &self,
        profile: &str,
        category: Category,
        remote: &str,
        kind: EntryKind,
    ) -> PathBuf {
        let base = self.category_dir(profile, category);
        match (category, kind) {
            (Category::Saves, EntryKind::Directory) => base,
            _ if is_navigation_entry(remote) => base,
            _ => base.join(local_name(remote)),
        }
    }
}
