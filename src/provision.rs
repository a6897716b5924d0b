//! End-to-end bootstrap flow

use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    command::CommandRunner,
    config::ProvisionConfig,
    error::Result,
    homebrew::Homebrew,
    podman::Podman,
};

/// Wires the Homebrew facade and podman provisioning to one runner
pub struct Provisioner {
    homebrew: Arc<Homebrew>,
    podman: Podman,
}

impl Provisioner {
    /// `cancel` aborts retry back-off; it should be the token the runner watches
    pub fn new(config: &ProvisionConfig, runner: Arc<dyn CommandRunner>, cancel: CancellationToken) -> Self {
        let homebrew = Arc::new(
            Homebrew::new(config.homebrew.clone(), runner, config.retry).with_cancel(cancel),
        );
        let podman = Podman::new(config.podman.clone(), Arc::clone(&homebrew));
        Self { homebrew, podman }
    }

    pub fn homebrew(&self) -> &Arc<Homebrew> {
        &self.homebrew
    }

    pub fn podman(&self) -> &Podman {
        &self.podman
    }

    /// Install Homebrew, the configured toolchains and podman, patch the
    /// service file, configure the registry mirror and start podman. Returns
    /// the podman socket path.
    pub async fn bootstrap(&self) -> Result<PathBuf> {
        info!("Step 1/6: Homebrew");
        self.homebrew.install_self().await?;

        info!("Step 2/6: toolchains");
        if self.homebrew.config().toolchains.is_empty() {
            info!("No toolchains configured");
        } else {
            self.homebrew.ensure_toolchains().await?;
        }

        info!("Step 3/6: podman packages");
        self.podman.install().await?;

        info!("Step 4/6: podman service file");
        self.podman.fix_service_file().await?;

        info!("Step 5/6: registry mirror");
        self.podman.configure_registry_mirror()?;

        info!("Step 6/6: podman service");
        let socket = self.podman.start().await?;

        info!("Bootstrap complete");
        Ok(socket)
    }

    /// Uninstall Homebrew itself
    pub async fn teardown(&self) -> Result<()> {
        self.homebrew.uninstall_self().await
    }
}
