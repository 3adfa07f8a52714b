use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when no `--config` flag is given.
pub const CONFIG_ENV: &str = "MAINTENANCE_CONFIG";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Marker file shared with the container's startup sequence.
    pub healthcheck: PathBuf,
    pub backup_directory: PathBuf,
    /// Captured output of the external restore run.
    pub restore_log: PathBuf,

    /// Every process of this user belongs to the managed service.
    pub service_user: String,
    /// argv[0] of the service's own CLI (version/update/upgrade/restore).
    pub service_cli: String,
    /// Matches the single primary process (`pkill -f` semantics).
    pub primary_pattern: String,
    /// Matches every process of the service tree, primary included.
    pub component_pattern: String,
    /// Component name passed to `<cli> version`.
    pub controller_component: String,
    /// Title of the controller entries inside backup metadata.
    pub controller_title: String,
    /// Member path of the metadata document inside a backup archive.
    pub metadata_entry: String,

    pub grace_period: Duration,
    pub poll_interval: Duration,
    pub kill_by_name_wait: Duration,
    pub settle_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            healthcheck: default_healthcheck(),
            backup_directory: default_backup_directory(),
            restore_log: default_restore_log(),
            service_user: default_service_user(),
            service_cli: default_service_cli(),
            primary_pattern: default_primary_pattern(),
            component_pattern: default_component_pattern(),
            controller_component: default_controller_component(),
            controller_title: default_controller_title(),
            metadata_entry: default_metadata_entry(),
            grace_period: Duration::from_millis(default_grace_period_ms()),
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            kill_by_name_wait: Duration::from_millis(default_kill_by_name_wait_ms()),
            settle_delay: Duration::from_millis(default_settle_delay_ms()),
        }
    }
}

// -------- YAML file schema (grouped only; strict) --------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    paths: Option<PathsConfigFile>,
    #[serde(default)]
    service: Option<ServiceConfigFile>,
    #[serde(default)]
    timing: Option<TimingConfigFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathsConfigFile {
    #[serde(default = "default_healthcheck")]
    healthcheck: PathBuf,
    #[serde(default = "default_backup_directory")]
    backup_directory: PathBuf,
    #[serde(default = "default_restore_log")]
    restore_log: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceConfigFile {
    #[serde(default = "default_service_user")]
    user: String,
    #[serde(default = "default_service_cli")]
    cli: String,
    #[serde(default = "default_primary_pattern")]
    primary_pattern: String,
    #[serde(default = "default_component_pattern")]
    component_pattern: String,
    #[serde(default = "default_controller_component")]
    controller_component: String,
    #[serde(default = "default_controller_title")]
    controller_title: String,
    #[serde(default = "default_metadata_entry")]
    metadata_entry: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimingConfigFile {
    #[serde(default = "default_grace_period_ms", deserialize_with = "deserialize_duration_ms")]
    grace_period: u64,
    #[serde(default = "default_poll_interval_ms", deserialize_with = "deserialize_duration_ms")]
    poll_interval: u64,
    #[serde(default = "default_kill_by_name_wait_ms", deserialize_with = "deserialize_duration_ms")]
    kill_by_name_wait: u64,
    #[serde(default = "default_settle_delay_ms", deserialize_with = "deserialize_duration_ms")]
    settle_delay: u64,
}

fn default_healthcheck() -> PathBuf {
    "/opt/.docker_config/.healthcheck".into()
}
fn default_backup_directory() -> PathBuf {
    "/opt/iobroker/backups".into()
}
fn default_restore_log() -> PathBuf {
    "/opt/iobroker/log/restore.log".into()
}
fn default_service_user() -> String {
    "iobroker".to_string()
}
fn default_service_cli() -> String {
    "iobroker".to_string()
}
fn default_primary_pattern() -> String {
    "iobroker.js-controller".to_string()
}
fn default_component_pattern() -> String {
    r"io\.|iobroker".to_string()
}
fn default_controller_component() -> String {
    "js-controller".to_string()
}
fn default_controller_title() -> String {
    "JS controller".to_string()
}
fn default_metadata_entry() -> String {
    "backup/backup.json".to_string()
}
fn default_grace_period_ms() -> u64 {
    10_000
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_kill_by_name_wait_ms() -> u64 {
    3_000
}
fn default_settle_delay_ms() -> u64 {
    5_000
}

fn deserialize_duration_ms<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;
    let v = serde_yaml::Value::deserialize(deserializer)?;
    match v {
        serde_yaml::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom("duration must be a positive integer (ms)")),
        serde_yaml::Value::String(s) => parse_duration_str(&s).map_err(D::Error::custom),
        _ => Err(D::Error::custom(
            "duration must be an integer milliseconds or string like \"10s\"",
        )),
    }
}

pub(crate) fn parse_duration_str(s: &str) -> Result<u64, String> {
    let t = s.trim();
    if t.is_empty() {
        return Err("empty duration".to_string());
    }
    // e.g. 500ms, 10s, 1m, 2h
    let idx = t
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_digit() || *ch == '.'))
        .map(|(i, _)| i)
        .unwrap_or(t.len());
    if idx == 0 {
        return Err(format!("invalid duration: {s}"));
    }
    let (num_s, unit_s) = t.split_at(idx);
    let num: f64 = num_s.parse().map_err(|e| format!("invalid duration number: {e}"))?;
    let unit = unit_s.trim().to_ascii_lowercase();
    let mult: f64 = match unit.as_str() {
        "" | "ms" => 1.0,
        "s" => 1000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        _ => return Err(format!("unknown duration unit {unit_s:?} (use ms/s/m/h)")),
    };
    Ok((num * mult).round() as u64)
}

/// Picks the config file: explicit flag first, then `MAINTENANCE_CONFIG`.
/// `None` means the built-in defaults apply.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    env::var(CONFIG_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

pub fn load_config(config_path: &Path) -> anyhow::Result<ControllerConfig> {
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", config_path.display()))?;
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    parse_config(&raw, base)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e:#}", config_path.display()))
}

/// Overlays the groups present in `raw` on the defaults. Relative paths are
/// resolved against `base`.
pub fn parse_config(raw: &str, base: &Path) -> anyhow::Result<ControllerConfig> {
    let file_cfg: ConfigFile = if raw.trim().is_empty() {
        ConfigFile::default()
    } else {
        serde_yaml::from_str(raw)?
    };

    let mut cfg = ControllerConfig::default();

    if let Some(p) = file_cfg.paths {
        cfg.healthcheck = p.healthcheck;
        cfg.backup_directory = p.backup_directory;
        cfg.restore_log = p.restore_log;
    }
    if let Some(s) = file_cfg.service {
        cfg.service_user = s.user.trim().to_string();
        cfg.service_cli = s.cli.trim().to_string();
        cfg.primary_pattern = s.primary_pattern;
        cfg.component_pattern = s.component_pattern;
        cfg.controller_component = s.controller_component.trim().to_string();
        cfg.controller_title = s.controller_title;
        cfg.metadata_entry = s.metadata_entry.trim().to_string();
    }
    if let Some(t) = file_cfg.timing {
        cfg.grace_period = Duration::from_millis(t.grace_period);
        cfg.poll_interval = Duration::from_millis(t.poll_interval);
        cfg.kill_by_name_wait = Duration::from_millis(t.kill_by_name_wait);
        cfg.settle_delay = Duration::from_millis(t.settle_delay);
    }

    anyhow::ensure!(!cfg.service_user.is_empty(), "service.user must not be empty");
    anyhow::ensure!(!cfg.service_cli.is_empty(), "service.cli must not be empty");
    anyhow::ensure!(
        !cfg.controller_component.is_empty(),
        "service.controller_component must not be empty"
    );
    anyhow::ensure!(!cfg.metadata_entry.is_empty(), "service.metadata_entry must not be empty");
    for (key, pattern) in [
        ("service.primary_pattern", &cfg.primary_pattern),
        ("service.component_pattern", &cfg.component_pattern),
    ] {
        anyhow::ensure!(!pattern.trim().is_empty(), "{key} must not be empty");
        regex::Regex::new(pattern).map_err(|e| anyhow::anyhow!("{key} is not a valid pattern: {e}"))?;
    }

    for p in [
        &mut cfg.healthcheck,
        &mut cfg.backup_directory,
        &mut cfg.restore_log,
    ] {
        if p.is_relative() {
            *p = base.join(&*p);
        }
    }

    Ok(cfg)
}
