use crate::maint::build_info;
use crate::maint::config::{self, ControllerConfig};
use crate::maint::error::{ErrorKind, MaintError};
use crate::maint::handlers::{Controller, Modifiers};
use clap::{CommandFactory as _, Parser, Subcommand};
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (`warn` when unset).
pub const LOG_ENV: &str = "MAINTENANCE_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "maintenance",
    version,
    about = "Maintenance mode, upgrade and restore controller for the containerised service",
    before_help = build_info::banner()
)]
pub struct Args {
    /// Path to the controller config YAML (defaults apply when absent)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Answer every confirmation prompt with yes
    #[arg(short = 'y', long = "yes", global = true)]
    pub yes: bool,

    /// Do not poll for remaining processes after SIGTERM; wait a fixed time
    /// instead (also accepted as -kbn)
    #[arg(long = "killbyname", global = true)]
    pub kill_by_name: bool,

    #[command(subcommand)]
    pub cmd: Option<Cmd>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Cmd {
    /// Show whether maintenance mode is on
    #[command(visible_aliases = ["stat", "s"])]
    Status,
    /// Stop the service and switch maintenance mode on
    On,
    /// Switch maintenance mode off and restart the container
    Off,
    /// Upgrade the controller component and restart the container
    #[command(visible_aliases = ["upgr", "u"])]
    Upgrade,
    /// Stop the service and restart the container
    #[command(visible_aliases = ["rest", "r"])]
    Restart,
    /// Restore a backup from the backup directory
    Restore,
}

const COMMAND_TOKENS: &[&str] = &[
    "status", "stat", "s", "on", "off", "upgrade", "upgr", "u", "restart", "rest", "r", "restore",
];

/// Help forms compete with the commands for the last-one-wins slot.
const HELP_TOKENS: &[&str] = &["help", "-h", "--help"];

/// Brings the traditional argument grammar into a shape clap accepts:
/// `-kbn` becomes `--killbyname`, everything after `--` is dropped, and when
/// several commands (help included) are given only the last one is kept.
/// A surviving help form is passed on as `--help`.
pub fn normalize_args<I>(raw: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut iter = raw.into_iter();
    let mut out: Vec<OsString> = iter.next().into_iter().collect();
    let mut last_command: Option<usize> = None;
    let mut expects_value = false;

    for arg in iter {
        if expects_value {
            expects_value = false;
            out.push(arg);
            continue;
        }
        match arg.to_str() {
            Some("--") => break,
            Some("-kbn") => out.push(OsString::from("--killbyname")),
            Some("-c") | Some("--config") => {
                expects_value = true;
                out.push(arg);
            }
            Some(t) if COMMAND_TOKENS.contains(&t) || HELP_TOKENS.contains(&t) => {
                if let Some(prev) = last_command.take() {
                    out.remove(prev);
                }
                last_command = Some(out.len());
                if HELP_TOKENS.contains(&t) {
                    out.push(OsString::from("--help"));
                } else {
                    out.push(arg);
                }
            }
            _ => out.push(arg),
        }
    }
    out
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run() -> ExitCode {
    init_tracing();
    run_with(env::args_os())
}

pub fn run_with<I>(raw: I) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
{
    let args = match Args::try_parse_from(normalize_args(raw)) {
        Ok(a) => a,
        Err(e) => {
            // Help and version go to stdout and are not failures.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };
    match dispatch(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn report(e: &anyhow::Error) {
    if let Some(me) = e.downcast_ref::<MaintError>()
        && me.kind() == ErrorKind::UserDeclined
    {
        return;
    }
    eprintln!("Error: {e:#}");
}

fn load(args: &Args) -> anyhow::Result<ControllerConfig> {
    match config::resolve_config_path(args.config.clone()) {
        Some(path) => config::load_config(&path),
        None => Ok(ControllerConfig::default()),
    }
}

pub fn dispatch(args: Args) -> anyhow::Result<()> {
    let Some(cmd) = args.cmd else {
        Args::command().print_help()?;
        println!();
        return Ok(());
    };
    let cfg = load(&args)?;
    let mut ctl = Controller::from_config(cfg)?;
    let m = Modifiers {
        assume_yes: args.yes,
        kill_by_name: args.kill_by_name,
    };
    match cmd {
        Cmd::Status => ctl.status()?,
        Cmd::On => ctl.enable_maintenance(m)?,
        Cmd::Off => ctl.disable_maintenance(m)?,
        Cmd::Upgrade => ctl.upgrade(m)?,
        Cmd::Restart => ctl.restart(m)?,
        Cmd::Restore => ctl.restore(m)?,
    }
    Ok(())
}
