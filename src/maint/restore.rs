use crate::maint::backup::{self, VersionSet};
use crate::maint::error::{MaintError, Result};
use crate::maint::handlers::{Controller, Modifiers};
use crate::maint::prompt;
use crate::maint::state::LifecycleState;
use std::path::{Path, PathBuf};
use tracing::info;

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl Controller {
    /// Restores a backup archive.
    ///
    /// Both confirmations (the restore itself and, on a version mismatch,
    /// the forced restore) are collected before anything is written, so a
    /// refusal leaves the marker untouched. A failed external restore leaves
    /// maintenance mode on.
    pub fn restore(&mut self, m: Modifiers) -> Result<()> {
        let archive = self.select_backup()?;
        let name = display_name(&archive);

        println!("You are now going to restore {name}.");
        println!("The service will be stopped and its current data replaced by the backup.");
        self.confirm("Do you want to continue [yes/no]?", m.assume_yes)?;

        let backup_version = self.backup_version(&archive)?;
        self.reconcile_versions(&backup_version, m)?;

        if !self.state.current().is_maintenance() {
            self.enable_maintenance(Modifiers {
                assume_yes: true,
                ..m
            })?;
        }

        println!(
            "Restoring {name}... output is written to {}",
            self.cfg.restore_log.display()
        );
        self.service.restore(&archive, &self.cfg.restore_log)?;
        info!("outcome=restored archive={name}");

        print_reinstall_notice();
        self.force_restart()
    }

    /// Picks the archive: refuses while the service is starting, auto-selects
    /// a lone backup and asks otherwise.
    fn select_backup(&mut self) -> Result<PathBuf> {
        if self.state.current() == LifecycleState::Starting {
            return Err(MaintError::StartupInProgress);
        }

        let dir = self.cfg.backup_directory.clone();
        let mut backups = backup::list_backups(&dir)?;
        let chosen = match backups.len() {
            0 => return Err(MaintError::NoBackups(dir)),
            1 => {
                let only = backups.remove(0);
                println!("Found backup {}.", display_name(&only));
                only
            }
            _ => {
                let names: Vec<String> = backups.iter().map(|p| display_name(p)).collect();
                let idx = prompt::select(
                    self.console.as_mut(),
                    "Found the following backups:",
                    names.as_slice(),
                )?;
                backups.swap_remove(idx)
            }
        };

        // The operator may take a while to answer; the file can be gone by now.
        if !chosen.is_file() {
            return Err(MaintError::BackupVanished(chosen));
        }
        info!("attempt=restore archive={}", chosen.display());
        Ok(chosen)
    }

    /// The single controller version recorded in `archive`.
    fn backup_version(&self, archive: &Path) -> Result<String> {
        let set: VersionSet = backup::read_versions(
            self.archives.as_ref(),
            archive,
            &self.cfg.metadata_entry,
            &self.cfg.controller_title,
            &self.cfg.controller_component,
        )?;
        let version = set.resolve(&self.cfg.controller_component, archive)?;
        println!(
            "Backup was created with {} {version}.",
            self.cfg.controller_component
        );
        Ok(version)
    }

    /// A version mismatch needs a second, explicit confirmation because the
    /// restore will then be forced.
    fn reconcile_versions(&mut self, backup_version: &str, m: Modifiers) -> Result<()> {
        let component = self.cfg.controller_component.clone();
        let installed = self.service.installed_version(&component)?;
        if installed == backup_version {
            info!("outcome=versions_match version={installed}");
            return Ok(());
        }

        info!("outcome=version_mismatch installed={installed} backup={backup_version}");
        println!();
        println!("WARNING: different {component} versions detected!");
        println!("  installed: {installed}");
        println!("  backup:    {backup_version}");
        println!("The restore will be forced and the restored data may need manual attention.");
        self.confirm("Do you want to continue anyway [yes/no]?", m.assume_yes)
    }
}

fn print_reinstall_notice() {
    let rule = "*".repeat(72);
    println!();
    println!("{rule}");
    println!("*  Restore finished.");
    println!("*");
    println!("*  After the restart all adapters and extensions are reinstalled");
    println!("*  automatically. Depending on their number this can take a long");
    println!("*  time. Please be patient and watch the logs.");
    println!("{rule}");
    println!();
}
