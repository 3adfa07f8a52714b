//! Scripted stand-ins for the console, the process table and the service
//! CLI. Each fake is a cheap handle around shared state so a test can keep a
//! clone after handing the original to a `Controller`.

use crate::maint::config::ControllerConfig;
use crate::maint::error::{MaintError, Result};
use crate::maint::handlers::Controller;
use crate::maint::procs::ProcessTable;
use crate::maint::prompt::Confirmer;
use crate::maint::service::{ArchiveReader, ServiceCli};
use crate::maint::state::StateStore;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io;
use std::os::unix::process::ExitStatusExt as _;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub(crate) fn failed_status() -> ExitStatus {
    // Wait status 256 is exit code 1.
    ExitStatus::from_raw(256)
}

/// Defaults rooted in `root` with every delay set to zero.
pub(crate) fn test_config(root: &Path) -> ControllerConfig {
    ControllerConfig {
        healthcheck: root.join(".healthcheck"),
        backup_directory: root.join("backups"),
        restore_log: root.join("log/restore.log"),
        grace_period: Duration::ZERO,
        poll_interval: Duration::ZERO,
        kill_by_name_wait: Duration::ZERO,
        settle_delay: Duration::ZERO,
        ..ControllerConfig::default()
    }
}

// ---------------- console ----------------

#[derive(Debug, Default)]
struct ConsoleState {
    answers: VecDeque<String>,
    prompts: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedConfirmer {
    inner: Arc<Mutex<ConsoleState>>,
}

impl ScriptedConfirmer {
    pub(crate) fn new(answers: &[&str]) -> Self {
        let state = ConsoleState {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            prompts: vec![],
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.inner.lock().unwrap().prompts.clone()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        let mut st = self.inner.lock().unwrap();
        st.prompts.push(prompt.to_string());
        Ok(st.answers.pop_front().unwrap_or_default())
    }
}

// ---------------- process table ----------------

#[derive(Debug, Default)]
struct ProcState {
    /// pattern -> successive answers; the last answer repeats.
    answers: HashMap<String, VecDeque<Vec<i32>>>,
    user_pids: Vec<i32>,
    signals: Vec<(Vec<i32>, Signal)>,
    refuse_signals: bool,
    unknown_user: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeProcesses {
    inner: Arc<Mutex<ProcState>>,
}

impl FakeProcesses {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answers for lookups by `pattern`, one per call.
    pub(crate) fn answer(&self, pattern: &str, answers: Vec<Vec<i32>>) {
        self.inner
            .lock()
            .unwrap()
            .answers
            .insert(pattern.to_string(), answers.into());
    }

    pub(crate) fn primary(&self, pids: Vec<i32>) {
        self.answer(&ControllerConfig::default().primary_pattern, vec![pids]);
    }

    pub(crate) fn component(&self, answers: Vec<Vec<i32>>) {
        self.answer(&ControllerConfig::default().component_pattern, answers);
    }

    pub(crate) fn user_pids(&self, pids: Vec<i32>) {
        self.inner.lock().unwrap().user_pids = pids;
    }

    pub(crate) fn refuse_signals(&self) {
        self.inner.lock().unwrap().refuse_signals = true;
    }

    pub(crate) fn unknown_user(&self) {
        self.inner.lock().unwrap().unknown_user = true;
    }

    pub(crate) fn signals(&self) -> Vec<(Vec<i32>, Signal)> {
        self.inner.lock().unwrap().signals.clone()
    }

    pub(crate) fn signals_of(&self, sig: Signal) -> Vec<Vec<i32>> {
        self.signals()
            .into_iter()
            .filter(|(_, s)| *s == sig)
            .map(|(p, _)| p)
            .collect()
    }
}

impl ProcessTable for FakeProcesses {
    fn find(&self, user: &str, pattern: &Regex) -> Result<Vec<i32>> {
        let mut st = self.inner.lock().unwrap();
        if st.unknown_user {
            return Err(MaintError::UnknownUser(user.to_string()));
        }
        let Some(queue) = st.answers.get_mut(pattern.as_str()) else {
            return Ok(vec![]);
        };
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or_default())
        } else {
            Ok(queue.front().cloned().unwrap_or_default())
        }
    }

    fn find_user(&self, user: &str) -> Result<Vec<i32>> {
        let st = self.inner.lock().unwrap();
        if st.unknown_user {
            return Err(MaintError::UnknownUser(user.to_string()));
        }
        Ok(st.user_pids.clone())
    }

    fn signal(&self, pids: &[i32], signal: Signal) -> Result<()> {
        let mut st = self.inner.lock().unwrap();
        if st.refuse_signals
            && let Some(pid) = pids.first()
        {
            return Err(MaintError::Signal {
                pid: *pid,
                signal,
                source: Errno::EPERM,
            });
        }
        st.signals.push((pids.to_vec(), signal));
        Ok(())
    }
}

// ---------------- service CLI + archives ----------------

#[derive(Debug, Default)]
struct ServiceState {
    installed: Option<String>,
    failing: HashSet<&'static str>,
    calls: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeService {
    inner: Arc<Mutex<ServiceState>>,
}

impl FakeService {
    pub(crate) fn installed(version: &str) -> Self {
        let svc = Self::default();
        svc.inner.lock().unwrap().installed = Some(version.to_string());
        svc
    }

    /// Makes `op` ("update", "upgrade", "restore") exit non-zero.
    pub(crate) fn fail(&self, op: &'static str) {
        self.inner.lock().unwrap().failing.insert(op);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String, op: &'static str) -> bool {
        let mut st = self.inner.lock().unwrap();
        st.calls.push(call);
        st.failing.contains(op)
    }
}

impl ServiceCli for FakeService {
    fn installed_version(&self, component: &str) -> Result<String> {
        self.record(format!("version {component}"), "version");
        self.inner
            .lock()
            .unwrap()
            .installed
            .clone()
            .ok_or_else(|| MaintError::InstalledVersionUnknown(component.to_string()))
    }

    fn update(&self) -> Result<()> {
        if self.record("update".to_string(), "update") {
            return Err(MaintError::ExternalFailed {
                operation: "update".to_string(),
                status: failed_status(),
            });
        }
        Ok(())
    }

    fn upgrade_self(&self) -> Result<()> {
        if self.record("upgrade self".to_string(), "upgrade") {
            return Err(MaintError::ExternalFailed {
                operation: "upgrade self".to_string(),
                status: failed_status(),
            });
        }
        Ok(())
    }

    fn restore(&self, archive: &Path, log: &Path) -> Result<()> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let failing = self.record(format!("restore {name}"), "restore");
        if let Some(parent) = log.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(log, format!("restoring {name}\n")).unwrap();
        if failing {
            return Err(MaintError::RestoreFailed {
                log: log.to_path_buf(),
                status: failed_status(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ArchiveState {
    /// archive file name -> metadata document
    metadata: HashMap<String, String>,
    extractions: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeArchives {
    inner: Arc<Mutex<ArchiveState>>,
}

impl FakeArchives {
    pub(crate) fn insert(&self, archive_name: &str, metadata: &str) {
        self.inner
            .lock()
            .unwrap()
            .metadata
            .insert(archive_name.to_string(), metadata.to_string());
    }

    pub(crate) fn extractions(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().extractions.clone()
    }
}

impl ArchiveReader for FakeArchives {
    fn extract_member(&self, archive: &Path, member: &str, dest: &Path) -> Result<PathBuf> {
        let mut st = self.inner.lock().unwrap();
        st.extractions.push(archive.to_path_buf());
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(doc) = st.metadata.get(&name) else {
            return Err(MaintError::ExternalFailed {
                operation: format!("extracting {member}"),
                status: failed_status(),
            });
        };
        let path = dest.join(member);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, doc).unwrap();
        Ok(path)
    }
}

/// Metadata document with one controller entry per version.
pub(crate) fn metadata_with(versions: &[&str]) -> String {
    let mut objects: Vec<serde_json::Value> = versions
        .iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::json!({
                "id": format!("system.host.node{i}"),
                "value": {"common": {"title": "JS controller", "installedVersion": v}}
            })
        })
        .collect();
    objects.push(serde_json::json!({
        "id": "system.adapter.admin.0",
        "value": {"common": {"title": "Admin", "installedVersion": "7.0.0"}}
    }));
    serde_json::json!({ "objects": objects }).to_string()
}

// ---------------- controller harness ----------------

pub(crate) struct Harness {
    _dir: TempDir,
    pub(crate) cfg: ControllerConfig,
    pub(crate) ctl: Controller,
    pub(crate) procs: FakeProcesses,
    pub(crate) service: FakeService,
    pub(crate) archives: FakeArchives,
    pub(crate) console: ScriptedConfirmer,
}

impl Harness {
    /// Controller over fakes; the operator will type `answers` in order.
    pub(crate) fn new(answers: &[&str]) -> Self {
        Self::with_service(answers, FakeService::installed("6.1.0"))
    }

    pub(crate) fn with_service(answers: &[&str], service: FakeService) -> Self {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(dir.path());
        let procs = FakeProcesses::new();
        let archives = FakeArchives::default();
        let console = ScriptedConfirmer::new(answers);
        let ctl = Controller::new(
            cfg.clone(),
            Box::new(procs.clone()),
            Box::new(service.clone()),
            Box::new(archives.clone()),
            Box::new(console.clone()),
        )
        .unwrap();
        Self {
            _dir: dir,
            cfg,
            ctl,
            procs,
            service,
            archives,
            console,
        }
    }

    pub(crate) fn store(&self) -> StateStore {
        StateStore::new(&self.cfg.healthcheck)
    }

    pub(crate) fn marker(&self) -> Option<Vec<u8>> {
        fs::read(&self.cfg.healthcheck).ok()
    }

    /// Places a backup file and registers its metadata document.
    pub(crate) fn add_backup(&self, name: &str, metadata: &str) -> PathBuf {
        fs::create_dir_all(&self.cfg.backup_directory).unwrap();
        let path = self.cfg.backup_directory.join(name);
        fs::write(&path, b"archive").unwrap();
        self.archives.insert(name, metadata);
        path
    }
}
