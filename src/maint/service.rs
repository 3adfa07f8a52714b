use crate::maint::error::{MaintError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// The managed service's own CLI. All upgrade and restore mechanics live
/// there; the controller only sequences the calls.
pub trait ServiceCli {
    /// Version of `component` as currently installed.
    fn installed_version(&self, component: &str) -> Result<String>;

    /// Refreshes the package index.
    fn update(&self) -> Result<()>;

    /// Upgrades the controller component itself.
    fn upgrade_self(&self) -> Result<()>;

    /// Forced restore of `archive`; stdout and stderr are captured in `log`.
    fn restore(&self, archive: &Path, log: &Path) -> Result<()>;
}

/// Pulls single members out of backup archives.
pub trait ArchiveReader {
    /// Extracts only `member` from `archive` below `dest` and returns the
    /// extracted file's path.
    fn extract_member(&self, archive: &Path, member: &str, dest: &Path) -> Result<PathBuf>;
}

/// [`ServiceCli`] backed by the service's command line tool.
#[derive(Debug, Clone)]
pub struct CommandService {
    program: String,
}

impl CommandService {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> MaintError {
        MaintError::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    /// Runs with the operator's terminal attached; progress goes straight
    /// to the console.
    fn run_attached(&self, args: &[&str]) -> Result<()> {
        let operation = format!("{} {}", self.program, args.join(" "));
        info!("attempt=run argv={operation:?}");
        let status = self
            .command(args)
            .stdin(Stdio::inherit())
            .status()
            .map_err(|e| self.spawn_error(e))?;
        if !status.success() {
            return Err(MaintError::ExternalFailed { operation, status });
        }
        info!("outcome=ok argv={operation:?}");
        Ok(())
    }
}

impl ServiceCli for CommandService {
    fn installed_version(&self, component: &str) -> Result<String> {
        let out = self
            .command(&["version", component])
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !out.status.success() {
            return Err(MaintError::ExternalFailed {
                operation: format!("{} version {component}", self.program),
                status: out.status,
            });
        }
        parse_version_output(&String::from_utf8_lossy(&out.stdout))
            .ok_or_else(|| MaintError::InstalledVersionUnknown(component.to_string()))
    }

    fn update(&self) -> Result<()> {
        self.run_attached(&["update"])
    }

    fn upgrade_self(&self) -> Result<()> {
        self.run_attached(&["upgrade", "self"])
    }

    fn restore(&self, archive: &Path, log: &Path) -> Result<()> {
        if let Some(parent) = log.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| MaintError::io("create", parent, e))?;
        }
        let stdout = fs::File::create(log).map_err(|e| MaintError::io("create", log, e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| MaintError::io("open", log, e))?;

        info!(
            "attempt=restore archive={} log={}",
            archive.display(),
            log.display()
        );
        let status = self
            .command(&["restore"])
            .arg(archive)
            .arg("--force")
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|e| self.spawn_error(e))?;
        if !status.success() {
            return Err(MaintError::RestoreFailed {
                log: log.to_path_buf(),
                status,
            });
        }
        info!("outcome=restored archive={}", archive.display());
        Ok(())
    }
}

/// Last non-empty line of `<cli> version <component>`; the tool may print
/// banners before it.
fn parse_version_output(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// [`ArchiveReader`] using the system `tar` (gzip-compressed archives).
#[derive(Debug, Clone, Default)]
pub struct TarArchives;

impl ArchiveReader for TarArchives {
    fn extract_member(&self, archive: &Path, member: &str, dest: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest).map_err(|e| MaintError::io("create", dest, e))?;
        debug!(
            "attempt=extract archive={} member={member} dest={}",
            archive.display(),
            dest.display()
        );
        let status = Command::new("tar")
            .arg("-xzf")
            .arg(archive)
            .arg("-C")
            .arg(dest)
            .arg(member)
            .stdin(Stdio::null())
            .status()
            .map_err(|source| MaintError::Spawn {
                program: "tar".to_string(),
                source,
            })?;
        if !status.success() {
            return Err(MaintError::ExternalFailed {
                operation: format!("extracting {member} from {}", archive.display()),
                status,
            });
        }
        Ok(dest.join(member))
    }
}
