//! Baseline server provisioning
//!
//! Distro-gated package installation and declarative systemd unit toggling,
//! run before mesh setup so every host carries the same base services.

use crate::inventory::HostRecord;
use crate::runner::{argv, run_checked, sh, CommandRunner};
use crate::{Error, Result};
use tracing::{debug, info};

/// Packages every Ubuntu host gets
pub const BASE_PACKAGES: &[&str] = &["fail2ban", "openssh-server", "git"];

/// Desired state for one systemd unit
#[derive(Debug, Clone)]
pub struct ServiceToggle {
    pub unit: String,
    pub enable: bool,
    pub start: bool,
    /// Reload after (re)start so config changes take effect
    pub reload: bool,
}

impl ServiceToggle {
    pub fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            enable: true,
            start: true,
            reload: false,
        }
    }

    pub fn reloaded(mut self) -> Self {
        self.reload = true;
        self
    }
}

fn default_services() -> Vec<ServiceToggle> {
    vec![
        ServiceToggle::new("fail2ban.service"),
        ServiceToggle::new("ssh.service").reloaded(),
    ]
}

/// Baseline provisioning for one host
pub struct BaselineSetup<'a> {
    host: &'a HostRecord,
    runner: &'a dyn CommandRunner,
    packages: Vec<String>,
    services: Vec<ServiceToggle>,
}

impl<'a> BaselineSetup<'a> {
    pub fn new(host: &'a HostRecord, runner: &'a dyn CommandRunner) -> Self {
        Self {
            host,
            runner,
            packages: BASE_PACKAGES.iter().map(|s| s.to_string()).collect(),
            services: default_services(),
        }
    }

    pub fn with_packages(mut self, packages: Vec<String>) -> Self {
        self.packages = packages;
        self
    }

    pub fn with_services(mut self, services: Vec<ServiceToggle>) -> Self {
        self.services = services;
        self
    }

    /// Run the baseline pass. Failures are scoped to this host.
    pub async fn run(&self) -> Result<()> {
        self.install_packages()
            .await
            .map_err(|e| Error::host_op(&self.host.name, "packages", e))?;
        self.toggle_services()
            .await
            .map_err(|e| Error::host_op(&self.host.name, "services", e))?;
        info!("{}: baseline setup complete", self.host.name);
        Ok(())
    }

    async fn install_packages(&self) -> Result<()> {
        if !self.host.is_ubuntu() {
            debug!(
                "{}: distro {:?} not recognized, skipping package install",
                self.host.name, self.host.linux_name
            );
            return Ok(());
        }
        if self.packages.is_empty() {
            return Ok(());
        }

        run_checked(self.runner, &sh("apt-get update")).await?;
        let mut install = argv(&["apt-get", "install", "-y"]);
        install.extend(self.packages.iter().cloned());
        run_checked(self.runner, &install).await?;
        Ok(())
    }

    async fn toggle_services(&self) -> Result<()> {
        run_checked(self.runner, &argv(&["systemctl", "daemon-reload"])).await?;

        for service in &self.services {
            if service.enable {
                run_checked(
                    self.runner,
                    &argv(&["systemctl", "enable", service.unit.as_str()]),
                )
                .await?;
            }
            if service.start {
                run_checked(
                    self.runner,
                    &argv(&["systemctl", "start", service.unit.as_str()]),
                )
                .await?;
            }
            if service.reload {
                run_checked(
                    self.runner,
                    &argv(&["systemctl", "reload-or-restart", service.unit.as_str()]),
                )
                .await?;
            }
        }
        Ok(())
    }
}
