use crate::maint::error::{MaintError, Result};
use crate::maint::service::ArchiveReader;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Scratch directory (inside the backup directory) for extracted metadata.
const STAGING_DIR: &str = ".restore-meta";

/// Regular, non-hidden files of `dir`, in name order. A missing directory
/// has no backups.
pub fn list_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(MaintError::io("list", dir, e)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MaintError::io("list", dir, e))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let Ok(ft) = entry.file_type() else { continue };
        if ft.is_file() {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

#[derive(Debug, Default, Deserialize)]
struct BackupDocument {
    #[serde(default)]
    objects: Vec<BackupObject>,
}

#[derive(Debug, Default, Deserialize)]
struct BackupObject {
    #[serde(default)]
    value: Option<ObjectValue>,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectValue {
    #[serde(default)]
    common: Option<ObjectCommon>,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectCommon {
    /// Usually a string; translated titles are objects and never match.
    #[serde(default)]
    title: Option<serde_json::Value>,
    #[serde(default, rename = "installedVersion")]
    installed_version: Option<serde_json::Value>,
}

/// `installedVersion` of every controller entry in a backup, in document
/// order. Multi-node installations record one entry per host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSet(Vec<String>);

impl VersionSet {
    pub fn new(versions: Vec<String>) -> Self {
        Self(versions)
    }

    /// Collects the versions of all objects whose `common.title` equals
    /// `title`. Entries without a string version are skipped.
    pub fn from_metadata(json: &str, title: &str) -> serde_json::Result<Self> {
        let doc: BackupDocument = serde_json::from_str(json)?;
        let versions = doc
            .objects
            .into_iter()
            .filter_map(|o| o.value?.common)
            .filter(|c| c.title.as_ref().and_then(|t| t.as_str()) == Some(title))
            .filter_map(|c| c.installed_version?.as_str().map(|v| v.trim().to_string()))
            .filter(|v| !v.is_empty())
            .collect();
        Ok(Self(versions))
    }

    pub fn versions(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The single version every entry agrees on.
    pub fn resolve(&self, component: &str, archive: &Path) -> Result<String> {
        let Some(first) = self.0.first() else {
            return Err(MaintError::VersionUndetected {
                component: component.to_string(),
                archive: archive.to_path_buf(),
            });
        };
        if self.0.iter().any(|v| v != first) {
            return Err(MaintError::ConflictingVersions {
                component: component.to_string(),
                versions: self.0.clone(),
            });
        }
        Ok(first.clone())
    }
}

/// Extracts `member` from `archive` into a staging directory next to the
/// backups, reads the controller versions and removes the staging directory
/// again, whatever the outcome.
pub fn read_versions(
    archives: &dyn ArchiveReader,
    archive: &Path,
    member: &str,
    title: &str,
    component: &str,
) -> Result<VersionSet> {
    let staging = archive
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(STAGING_DIR);
    let result = extract_and_parse(archives, archive, member, title, component, &staging);
    match fs::remove_dir_all(&staging) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "attempt=cleanup path={} outcome=failed err={e}",
            staging.display()
        ),
    }
    result
}

fn extract_and_parse(
    archives: &dyn ArchiveReader,
    archive: &Path,
    member: &str,
    title: &str,
    component: &str,
    staging: &Path,
) -> Result<VersionSet> {
    let path = archives.extract_member(archive, member, staging)?;
    let raw = fs::read_to_string(&path).map_err(|e| MaintError::io("read", &path, e))?;
    let set = VersionSet::from_metadata(&raw, title).map_err(|e| {
        warn!("attempt=parse_metadata path={} outcome=invalid err={e}", path.display());
        MaintError::VersionUndetected {
            component: component.to_string(),
            archive: archive.to_path_buf(),
        }
    })?;
    debug!(
        "outcome=metadata_read archive={} versions={:?}",
        archive.display(),
        set.versions()
    );
    Ok(set)
}
