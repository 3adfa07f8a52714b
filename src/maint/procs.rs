use crate::maint::error::{MaintError, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use regex::Regex;
use std::fs;
use std::os::unix::fs::MetadataExt as _;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Process lookup and signal delivery keyed by owning user.
pub trait ProcessTable {
    /// Pids owned by `user` whose full command line matches `pattern`.
    fn find(&self, user: &str, pattern: &Regex) -> Result<Vec<i32>>;

    /// Every pid owned by `user`.
    fn find_user(&self, user: &str) -> Result<Vec<i32>>;

    /// Sends `signal` to each pid. Pids that already exited are skipped.
    fn signal(&self, pids: &[i32], signal: Signal) -> Result<()>;
}

/// [`ProcessTable`] over procfs, matching like `pgrep -u <user> -f`.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn uid_of(user: &str) -> Result<u32> {
        users::get_user_by_name(user)
            .map(|u| u.uid())
            .ok_or_else(|| MaintError::UnknownUser(user.to_string()))
    }

    fn scan(&self, uid: u32, pattern: Option<&Regex>) -> Result<Vec<i32>> {
        let own = std::process::id() as i32;
        let entries = fs::read_dir(&self.root).map_err(MaintError::ProcScan)?;
        let mut out = Vec::new();
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<i32>().ok())
            else {
                continue;
            };
            if pid == own || pid <= 1 {
                continue;
            }
            // The process may exit between read_dir and here.
            let Ok(meta) = entry.metadata() else { continue };
            if meta.uid() != uid {
                continue;
            }
            if let Some(re) = pattern {
                let Some(cmdline) = read_cmdline(&entry.path()) else {
                    continue;
                };
                if !re.is_match(&cmdline) {
                    continue;
                }
            }
            out.push(pid);
        }
        out.sort_unstable();
        Ok(out)
    }
}

/// NUL-separated argv joined with spaces; `None` for kernel threads and
/// processes that are already gone.
fn read_cmdline(proc_dir: &Path) -> Option<String> {
    let raw = fs::read(proc_dir.join("cmdline")).ok()?;
    let joined: Vec<String> = raw
        .split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined.join(" "))
    }
}

impl ProcessTable for ProcFs {
    fn find(&self, user: &str, pattern: &Regex) -> Result<Vec<i32>> {
        let uid = Self::uid_of(user)?;
        let pids = self.scan(uid, Some(pattern))?;
        debug!(
            "attempt=find user={user} pattern={:?} count={}",
            pattern.as_str(),
            pids.len()
        );
        Ok(pids)
    }

    fn find_user(&self, user: &str) -> Result<Vec<i32>> {
        let uid = Self::uid_of(user)?;
        self.scan(uid, None)
    }

    fn signal(&self, pids: &[i32], signal: Signal) -> Result<()> {
        for pid in pids {
            match kill(Pid::from_raw(*pid), signal) {
                Ok(()) => {}
                Err(Errno::ESRCH) => {
                    debug!("attempt=signal pid={pid} sig={signal} outcome=already_exited");
                }
                Err(source) => {
                    return Err(MaintError::Signal {
                        pid: *pid,
                        signal,
                        source,
                    });
                }
            }
        }
        Ok(())
    }
}
