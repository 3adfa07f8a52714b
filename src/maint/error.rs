use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Coarse classification used at the command boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The operator answered a prompt with anything but yes.
    UserDeclined,
    /// The system is not in a state that allows the operation.
    PreconditionFailed,
    /// A signal, the service CLI or the archive tool failed.
    ExternalOperationFailed,
    /// Malformed arguments or an unusable selection.
    InputError,
}

#[derive(Debug, Error)]
pub enum MaintError {
    #[error("aborted by operator")]
    Declined,

    #[error("service startup is still in progress; wait until it has finished and try again")]
    StartupInProgress,

    #[error("no backups found in {0}")]
    NoBackups(PathBuf),

    #[error("backup {0} no longer exists")]
    BackupVanished(PathBuf),

    #[error("could not detect the {component} version recorded in backup {archive}")]
    VersionUndetected { component: String, archive: PathBuf },

    #[error("conflicting {component} versions detected in backup: {}", versions.join(", "))]
    ConflictingVersions {
        component: String,
        versions: Vec<String>,
    },

    #[error("could not determine the installed {0} version")]
    InstalledVersionUnknown(String),

    #[error("invalid selection {input:?}: expected a number between 1 and {max}")]
    InvalidSelection { input: String, max: usize },

    #[error("failed to read operator input: {0}")]
    Console(#[source] io::Error),

    #[error("unknown service user: {0}")]
    UnknownUser(String),

    #[error("invalid process pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to scan process table: {0}")]
    ProcScan(#[source] io::Error),

    #[error("failed to send {signal} to pid {pid}: {source}")]
    Signal {
        pid: i32,
        signal: nix::sys::signal::Signal,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed ({status})")]
    ExternalFailed { operation: String, status: ExitStatus },

    #[error("restore failed ({status}); see {} for details", log.display())]
    RestoreFailed { log: PathBuf, status: ExitStatus },

    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MaintError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MaintError::Declined => ErrorKind::UserDeclined,
            MaintError::StartupInProgress
            | MaintError::NoBackups(_)
            | MaintError::BackupVanished(_)
            | MaintError::VersionUndetected { .. }
            | MaintError::ConflictingVersions { .. }
            | MaintError::InstalledVersionUnknown(_) => ErrorKind::PreconditionFailed,
            MaintError::InvalidSelection { .. } | MaintError::Console(_) => ErrorKind::InputError,
            MaintError::UnknownUser(_)
            | MaintError::InvalidPattern { .. }
            | MaintError::ProcScan(_)
            | MaintError::Signal { .. }
            | MaintError::Spawn { .. }
            | MaintError::ExternalFailed { .. }
            | MaintError::RestoreFailed { .. }
            | MaintError::Io { .. } => ErrorKind::ExternalOperationFailed,
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        MaintError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MaintError>;
