//! Podman provisioning on top of Homebrew
//!
//! Patches the service file Homebrew generates for podman, points docker.io
//! pulls at a registry mirror, starts the podman service and locates its API
//! socket. Image and container operations belong to the engine itself.

pub mod files;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

use crate::{
    command::CommandSpec,
    config::PodmanConfig,
    error::{ProvisionError, Result},
    homebrew::Homebrew,
};

pub use files::{fix_service_unit, registry_block, SERVICE_FILE};

/// Packages that make up a podman installation
pub const PACKAGES: [&str; 2] = ["podman", "podman-compose"];

/// Podman provisioning steps for one Homebrew installation
pub struct Podman {
    config: PodmanConfig,
    homebrew: Arc<Homebrew>,
}

impl Podman {
    pub fn new(config: PodmanConfig, homebrew: Arc<Homebrew>) -> Self {
        Self { config, homebrew }
    }

    pub fn config(&self) -> &PodmanConfig {
        &self.config
    }

    /// Install podman and podman-compose if missing
    pub async fn install(&self) -> Result<()> {
        for package in PACKAGES {
            self.homebrew.ensure_installed(package).await?;
        }
        Ok(())
    }

    /// Path of the service file inside podman's keg
    pub async fn service_file(&self) -> Result<PathBuf> {
        let package = self
            .homebrew
            .info("podman")
            .await?
            .ok_or_else(|| ProvisionError::NotInstalled("podman".to_string()))?;
        Ok(Path::new(&package.path).join(SERVICE_FILE))
    }

    /// Fix the escaped `--time\=0` flag Homebrew writes into the service file.
    ///
    /// Returns whether the file was changed.
    pub async fn fix_service_file(&self) -> Result<bool> {
        let path = self.service_file().await?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ProvisionError::io("read", &path, e))?;

        match fix_service_unit(&content) {
            Some(fixed) => {
                files::write_atomically(&path, fixed.as_bytes())?;
                info!("Fixed {}", path.display());
                Ok(true)
            }
            None => {
                debug!("{} needs no fix", path.display());
                Ok(false)
            }
        }
    }

    /// `registries.conf` under the Homebrew prefix
    pub fn registries_file(&self) -> PathBuf {
        self.homebrew.prefix().join("etc/containers/registries.conf")
    }

    /// Append the docker.io mirror block unless the mirror is already mentioned.
    ///
    /// Returns whether the file was changed.
    pub fn configure_registry_mirror(&self) -> Result<bool> {
        let path = self.registries_file();
        let mirror = &self.config.docker_registry;

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(ProvisionError::io("read", &path, e)),
        };
        if content.contains(mirror.as_str()) {
            info!("Already using docker registry {}", mirror);
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProvisionError::io("create", parent, e))?;
        }
        let updated = content + &registry_block(mirror);
        files::write_atomically(&path, updated.as_bytes())?;
        info!("Configured docker registry mirror {} in {}", mirror, path.display());
        Ok(true)
    }

    /// Podman API socket path derived from `XDG_RUNTIME_DIR`
    pub fn socket_path(&self) -> Result<PathBuf> {
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
            .ok_or(ProvisionError::MissingEnv("XDG_RUNTIME_DIR"))?;
        Ok(socket_path_in(Path::new(&runtime_dir)))
    }

    /// Wait for the socket to appear, using the Homebrew retry policy
    pub async fn wait_for_socket(&self) -> Result<PathBuf> {
        let path = self.socket_path()?;
        self.wait_for_path(path).await
    }

    /// Probe `path` up to `max_attempts + 1` times with back-off in between
    async fn wait_for_path(&self, path: PathBuf) -> Result<PathBuf> {
        let retry = self.homebrew.retry_policy();
        for attempt in 0..=retry.max_attempts {
            if path.exists() {
                debug!("Podman socket available at {}", path.display());
                return Ok(path);
            }
            if attempt < retry.max_attempts {
                self.homebrew
                    .pause(retry.delay(attempt), "podman socket")
                    .await?;
            }
        }
        Err(ProvisionError::SocketMissing(path))
    }

    /// Start the podman service and wait for its socket
    pub async fn start(&self) -> Result<PathBuf> {
        self.homebrew.ensure_started(&self.config.service).await?;
        let socket = self.wait_for_socket().await?;
        info!("Podman is listening on unix://{}", socket.display());
        Ok(socket)
    }

    /// `podman-compose up -d` in `dir`
    pub async fn compose_up(&self, dir: &Path) -> Result<()> {
        self.compose(dir, &["up", "-d"]).await
    }

    /// `podman-compose down` in `dir`
    pub async fn compose_down(&self, dir: &Path) -> Result<()> {
        self.compose(dir, &["down"]).await
    }

    async fn compose(&self, dir: &Path, args: &[&str]) -> Result<()> {
        let spec = CommandSpec::new("podman-compose")
            .args(args.iter().copied())
            .current_dir(dir)
            .streamed();
        self.homebrew.run_checked(spec).await?;
        Ok(())
    }
}

/// `<runtime_dir>/podman/podman.sock`
pub fn socket_path_in(runtime_dir: &Path) -> PathBuf {
    runtime_dir.join("podman").join("podman.sock")
}
