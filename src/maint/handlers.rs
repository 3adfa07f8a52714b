use crate::maint::config::ControllerConfig;
use crate::maint::error::{MaintError, Result};
use crate::maint::procs::{ProcFs, ProcessTable};
use crate::maint::prompt::{self, Confirmer, StdinConfirmer};
use crate::maint::service::{ArchiveReader, CommandService, ServiceCli, TarArchives};
use crate::maint::state::{LifecycleState, StateStore};
use crate::maint::terminator::{StopOutcome, Terminator};
use std::thread;
use tracing::info;

/// Modifier flags shared by every command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Answer every prompt with yes.
    pub assume_yes: bool,
    /// Skip the poll loop after SIGTERM and wait a fixed time instead.
    pub kill_by_name: bool,
}

impl Modifiers {
    fn auto_confirmed(self) -> Self {
        Self {
            assume_yes: true,
            ..self
        }
    }
}

/// Owns the marker file, the terminator and the external collaborators; one
/// method per operator command.
pub struct Controller {
    pub(crate) cfg: ControllerConfig,
    pub(crate) state: StateStore,
    pub(crate) terminator: Terminator,
    pub(crate) service: Box<dyn ServiceCli>,
    pub(crate) archives: Box<dyn ArchiveReader>,
    pub(crate) console: Box<dyn Confirmer>,
}

impl Controller {
    pub fn new(
        cfg: ControllerConfig,
        table: Box<dyn ProcessTable>,
        service: Box<dyn ServiceCli>,
        archives: Box<dyn ArchiveReader>,
        console: Box<dyn Confirmer>,
    ) -> Result<Self> {
        Ok(Self {
            state: StateStore::new(&cfg.healthcheck),
            terminator: Terminator::new(table, &cfg)?,
            cfg,
            service,
            archives,
            console,
        })
    }

    /// Wires the real collaborators: procfs, the service CLI, `tar` and stdin.
    pub fn from_config(cfg: ControllerConfig) -> Result<Self> {
        let service = CommandService::new(cfg.service_cli.clone());
        Self::new(
            cfg,
            Box::new(ProcFs::default()),
            Box::new(service),
            Box::new(TarArchives),
            Box::new(StdinConfirmer),
        )
    }

    pub(crate) fn confirm(&mut self, prompt: &str, auto_confirmed: bool) -> Result<()> {
        if prompt::confirm(self.console.as_mut(), prompt, auto_confirmed) {
            Ok(())
        } else {
            info!("attempt=confirm outcome=declined");
            Err(MaintError::Declined)
        }
    }

    pub fn current_state(&self) -> LifecycleState {
        self.state.current()
    }

    /// Read-only report of the marker and the service processes.
    pub fn status(&self) -> Result<()> {
        match self.state.current() {
            LifecycleState::Maintenance => println!("Maintenance mode is ON."),
            LifecycleState::Starting => {
                println!("Maintenance mode is OFF (service startup in progress).")
            }
            LifecycleState::Normal | LifecycleState::Stopping => {
                println!("Maintenance mode is OFF.")
            }
        }
        match self.terminator.running() {
            Ok(pids) if pids.is_empty() => println!("No service processes are running."),
            Ok(pids) => println!("{} service process(es) running.", pids.len()),
            Err(e) => println!("Service processes: unknown ({e})."),
        }
        Ok(())
    }

    /// Writes `maintenance` and stops the service. A no-op when maintenance
    /// is already on.
    pub fn enable_maintenance(&mut self, m: Modifiers) -> Result<()> {
        if self.state.current().is_maintenance() {
            println!("Maintenance mode is already ON.");
            return Ok(());
        }

        println!("You are now going to stop the service and activate maintenance mode.");
        self.confirm(
            "Do you want to continue [yes/no]?",
            m.assume_yes || m.kill_by_name,
        )?;

        self.state.set(LifecycleState::Maintenance)?;
        info!("attempt=enable_maintenance marker=maintenance");
        println!("Activating maintenance mode...");
        match self.terminator.stop(self.cfg.grace_period, m.kill_by_name)? {
            StopOutcome::Stopped => println!("Service stopped."),
            StopOutcome::NothingToStop => println!("Service was not running."),
        }
        println!("Done. Maintenance mode is ON.");
        println!("The container keeps running without the service until maintenance mode is turned off.");
        Ok(())
    }

    /// Writes `stopping` and kills the service user; the container's restart
    /// policy starts everything again. A no-op when maintenance is off.
    pub fn disable_maintenance(&mut self, m: Modifiers) -> Result<()> {
        if !self.state.current().is_maintenance() {
            println!("Maintenance mode is already OFF.");
            return Ok(());
        }

        println!("You are now going to deactivate maintenance mode and restart the container.");
        self.confirm("Do you want to continue [yes/no]?", m.assume_yes)?;

        self.state.set(LifecycleState::Stopping)?;
        println!("Deactivating maintenance mode and forcing container restart...");
        self.terminator.kill_user()?;
        println!("Done.");
        Ok(())
    }

    /// Enters maintenance if needed, runs the service's update and self
    /// upgrade, then forces a container restart.
    pub fn upgrade(&mut self, m: Modifiers) -> Result<()> {
        println!("You are now going to upgrade the controller component.");
        println!("The service will be stopped and the container restarted afterwards.");
        self.confirm("Do you want to continue [yes/no]?", m.assume_yes)?;

        if !self.state.current().is_maintenance() {
            self.enable_maintenance(m.auto_confirmed())?;
        }

        println!("Upgrading...");
        self.service.update()?;
        self.service.upgrade_self()?;

        println!("Upgrade done. The container will be restarted now.");
        self.state.set(LifecycleState::Stopping)?;
        thread::sleep(self.cfg.settle_delay);
        self.terminator.kill_user()?;
        Ok(())
    }

    /// Stops the service gracefully unless maintenance already did, then
    /// forces a container restart.
    pub fn restart(&mut self, m: Modifiers) -> Result<()> {
        println!("You are now going to restart the container.");
        self.confirm("Do you want to continue [yes/no]?", m.assume_yes)?;

        if !self.state.current().is_maintenance() {
            match self.terminator.stop(self.cfg.grace_period, m.kill_by_name)? {
                StopOutcome::Stopped => println!("Service stopped."),
                StopOutcome::NothingToStop => println!("Service was not running."),
            }
        }
        println!(
            "Container will be restarted in {} seconds...",
            self.cfg.settle_delay.as_secs()
        );
        self.force_restart()
    }

    /// Settle delay, `stopping` marker, SIGKILL to the service user.
    pub(crate) fn force_restart(&self) -> Result<()> {
        thread::sleep(self.cfg.settle_delay);
        self.state.set(LifecycleState::Stopping)?;
        let killed = self.terminator.kill_user()?;
        info!("outcome=restart_forced killed={killed}");
        Ok(())
    }
}
