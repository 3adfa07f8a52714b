use crate::maint::config::ControllerConfig;
use crate::maint::error::{MaintError, Result};
use crate::maint::procs::ProcessTable;
use nix::sys::signal::Signal;
use regex::Regex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// No primary process was running; not an error.
    NothingToStop,
}

/// Stops the service user's process tree: SIGTERM to the primary process,
/// then either a bounded poll for the whole tree followed by SIGKILL of the
/// leftovers, or (kill-by-name) a fixed wait.
///
/// A fatal outcome is an `Err`: bad user, unreadable process table, or a
/// signal the kernel refused.
pub struct Terminator {
    table: Box<dyn ProcessTable>,
    user: String,
    primary: Regex,
    component: Regex,
    poll_interval: Duration,
    kill_by_name_wait: Duration,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| MaintError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl Terminator {
    pub fn new(table: Box<dyn ProcessTable>, cfg: &ControllerConfig) -> Result<Self> {
        Ok(Self {
            table,
            user: cfg.service_user.clone(),
            primary: compile(&cfg.primary_pattern)?,
            component: compile(&cfg.component_pattern)?,
            poll_interval: cfg.poll_interval,
            kill_by_name_wait: cfg.kill_by_name_wait,
        })
    }

    pub fn stop(&self, grace_period: Duration, escalate_by_name: bool) -> Result<StopOutcome> {
        // Single fixed deadline: T + grace period.
        let deadline = Instant::now() + grace_period;

        let primary = self.table.find(&self.user, &self.primary)?;
        if primary.is_empty() {
            info!("attempt=stop user={} outcome=not_running", self.user);
            return Ok(StopOutcome::NothingToStop);
        }
        info!(
            "attempt=signal sig=SIGTERM user={} pids={:?}",
            self.user, primary
        );
        self.table.signal(&primary, Signal::SIGTERM)?;

        if escalate_by_name {
            info!(
                "attempt=settle_wait wait_ms={} reason=kill_by_name",
                self.kill_by_name_wait.as_millis()
            );
            thread::sleep(self.kill_by_name_wait);
            return Ok(StopOutcome::Stopped);
        }

        info!("attempt=grace_wait grace_ms={}", grace_period.as_millis());
        let grace_t0 = Instant::now();
        loop {
            let remaining = self.table.find(&self.user, &self.component)?;
            if remaining.is_empty() {
                info!("outcome=grace_exit elapsed_ms={}", grace_t0.elapsed().as_millis());
                return Ok(StopOutcome::Stopped);
            }
            if Instant::now() >= deadline {
                warn!(
                    "outcome=grace_expired elapsed_ms={} decision=kill remaining_pids={}",
                    grace_t0.elapsed().as_millis(),
                    remaining.len()
                );
                self.table.signal(&remaining, Signal::SIGKILL)?;
                return Ok(StopOutcome::Stopped);
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// SIGKILL to every process of the service user. The container's restart
    /// policy brings the service back. Returns how many pids were signalled.
    pub fn kill_user(&self) -> Result<usize> {
        let pids = self.table.find_user(&self.user)?;
        warn!(
            "attempt=kill_user sig=SIGKILL user={} pids={}",
            self.user,
            pids.len()
        );
        self.table.signal(&pids, Signal::SIGKILL)?;
        Ok(pids.len())
    }

    /// Processes of the service tree currently alive.
    pub fn running(&self) -> Result<Vec<i32>> {
        self.table.find(&self.user, &self.component)
    }
}
