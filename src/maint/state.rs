use crate::maint::error::{MaintError, Result};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lifecycle token persisted in the healthcheck marker file.
///
/// The container's startup sequence writes `starting` and `normal`; the
/// controller only ever writes `maintenance` and `stopping`. Because the two
/// writers never produce the same token there is no write-write race, and no
/// lock is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Normal,
    Starting,
    Maintenance,
    Stopping,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Normal => "normal",
            LifecycleState::Starting => "starting",
            LifecycleState::Maintenance => "maintenance",
            LifecycleState::Stopping => "stopping",
        }
    }

    /// Unknown or empty content reads as `Normal`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "starting" => LifecycleState::Starting,
            "maintenance" => LifecycleState::Maintenance,
            "stopping" => LifecycleState::Stopping,
            _ => LifecycleState::Normal,
        }
    }

    pub fn is_maintenance(self) -> bool {
        self == LifecycleState::Maintenance
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or unreadable marker is `Normal`.
    pub fn current(&self) -> LifecycleState {
        match fs::read_to_string(&self.path) {
            Ok(s) => LifecycleState::parse(&s),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(
                        "attempt=read_marker path={} outcome=unreadable err={e}",
                        self.path.display()
                    );
                }
                LifecycleState::Normal
            }
        }
    }

    /// Replaces the marker via write-to-temp + rename so a concurrent reader
    /// sees either the old token or the new one. `Normal` removes the file.
    pub fn set(&self, state: LifecycleState) -> Result<()> {
        if state == LifecycleState::Normal {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(MaintError::io("remove", &self.path, e)),
            };
        }

        let tmp = self.temp_path();
        fs::write(&tmp, format!("{}\n", state.as_str()))
            .map_err(|e| MaintError::io("write", &tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(MaintError::io("replace", &self.path, e));
        }
        debug!("attempt=write_marker state={state} outcome=ok");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "marker".to_string());
        self.path
            .with_file_name(format!(".{name}.tmp-{}", std::process::id()))
    }
}
