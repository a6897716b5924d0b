//! Configuration and CLI argument handling

use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{ProvisionError, Result},
    homebrew::validate_name,
    retry::RetryPolicy,
};

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "brewstrap")]
#[command(about = "Bootstraps Homebrew and keeps Homebrew-managed services started")]
#[command(version)]
pub struct Config {
    /// JSON configuration file; built-in defaults are used when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Per-command timeout in seconds (overrides the configuration file)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install Homebrew and podman, patch podman's service file, configure the registry mirror and start podman
    Bootstrap,
    /// Uninstall Homebrew itself
    Teardown,
    /// Inspect and control Homebrew services
    Services {
        #[command(subcommand)]
        action: ServicesAction,
    },
    /// Show install information for a package
    Info { name: String },
    /// Install a package unless it is already installed
    Install { name: String },
    /// Remove a package
    Remove { name: String },
    /// Print `brew config` as key/value pairs
    BrewConfig,
    /// Install the configured compiler toolchains
    Toolchains,
    /// Podman provisioning steps
    Podman {
        #[command(subcommand)]
        action: PodmanAction,
    },
    /// Run the HTTP agent with the service keep-alive task
    Serve {
        /// Host address to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind the server to
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServicesAction {
    /// List services known to the service manager
    List,
    /// Start a service and wait until it reports `started`
    Start { name: String },
    /// Stop a service and wait until it reports `none`
    Stop { name: String },
    /// Exit successfully only if the service has the given status
    Check {
        name: String,
        #[arg(default_value = "started")]
        status: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum PodmanAction {
    /// Patch the generated homebrew.podman.service file
    Fix,
    /// Add the registry mirror to registries.conf
    Registry,
    /// Print the podman socket path
    Socket,
    /// Start the podman service and wait for its socket
    Start,
    /// Run `podman-compose up -d` in a directory
    ComposeUp { dir: PathBuf },
    /// Run `podman-compose down` in a directory
    ComposeDown { dir: PathBuf },
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Load the provisioning configuration and apply CLI overrides
    pub fn provision_config(&self) -> Result<ProvisionConfig> {
        let mut config = ProvisionConfig::load(self.config.as_deref())?;
        if let Some(secs) = self.timeout {
            config.command_timeout_secs = secs;
        }
        if let Commands::Serve { host, port } = &self.command {
            if let Some(host) = host {
                config.agent.host = host.clone();
            }
            if let Some(port) = port {
                config.agent.port = *port;
            }
        }
        config.validate()?;
        Ok(config)
    }
}

/// File based provisioning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub homebrew: HomebrewConfig,
    pub podman: PodmanConfig,
    pub retry: RetryPolicy,
    pub command_timeout_secs: u64,
    pub agent: AgentConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            homebrew: HomebrewConfig::default(),
            podman: PodmanConfig::default(),
            retry: RetryPolicy::default(),
            command_timeout_secs: 900,
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomebrewConfig {
    /// Package manager executable
    pub brew: String,
    /// Homebrew prefix; its presence means Homebrew is installed
    pub prefix: PathBuf,
    pub install_script: String,
    pub uninstall_script: String,
    /// Requirements page shown when installation fails
    pub preset_intro: String,
    pub env: HomebrewEnv,
    /// Compiler toolchains installed during bootstrap, e.g. `gcc`, `go`
    pub toolchains: Vec<String>,
    /// `GOPROXY` written with `go env -w`; empty leaves it untouched
    pub go_proxy: String,
}

impl Default for HomebrewConfig {
    fn default() -> Self {
        let prefix = if cfg!(target_os = "macos") {
            "/opt/homebrew"
        } else {
            "/home/linuxbrew/.linuxbrew"
        };
        Self {
            brew: "brew".to_string(),
            prefix: PathBuf::from(prefix),
            install_script: "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh".to_string(),
            uninstall_script: "https://raw.githubusercontent.com/Homebrew/install/HEAD/uninstall.sh".to_string(),
            preset_intro: "https://docs.brew.sh/Homebrew-on-Linux#requirements".to_string(),
            env: HomebrewEnv::default(),
            toolchains: Vec::new(),
            go_proxy: "https://goproxy.cn,direct".to_string(),
        }
    }
}

/// Mirror settings passed to every package manager invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomebrewEnv {
    pub brew_git_remote: String,
    pub core_git_remote: String,
    pub api_domain: String,
    pub bottle_domain: String,
}

impl Default for HomebrewEnv {
    fn default() -> Self {
        Self {
            brew_git_remote: "https://mirrors.tuna.tsinghua.edu.cn/git/homebrew/brew.git".to_string(),
            core_git_remote: "https://mirrors.tuna.tsinghua.edu.cn/git/homebrew/homebrew-core.git".to_string(),
            api_domain: "https://mirrors.tuna.tsinghua.edu.cn/homebrew-bottles/api".to_string(),
            bottle_domain: "https://mirrors.tuna.tsinghua.edu.cn/homebrew-bottles".to_string(),
        }
    }
}

impl HomebrewEnv {
    /// Environment overlay for a single child process
    pub fn overlay(&self) -> Vec<(String, String)> {
        vec![
            ("NONINTERACTIVE".to_string(), "1".to_string()),
            ("HOMEBREW_BREW_GIT_REMOTE".to_string(), self.brew_git_remote.clone()),
            ("HOMEBREW_CORE_GIT_REMOTE".to_string(), self.core_git_remote.clone()),
            ("HOMEBREW_API_DOMAIN".to_string(), self.api_domain.clone()),
            ("HOMEBREW_BOTTLE_DOMAIN".to_string(), self.bottle_domain.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodmanConfig {
    /// Mirror used for docker.io images
    pub docker_registry: String,
    /// Name of the podman service in the service manager
    pub service: String,
}

impl Default for PodmanConfig {
    fn default() -> Self {
        Self {
            docker_registry: "mirror.ccs.tencentyun.com".to_string(),
            service: "podman".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub host: String,
    pub port: u16,
    /// Services the keep-alive task keeps started
    pub keep_alive: Vec<String>,
    pub keep_alive_interval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 20554,
            keep_alive: vec!["podman".to_string()],
            keep_alive_interval_secs: 60,
        }
    }
}

impl AgentConfig {
    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ProvisionConfig {
    /// Read the configuration from `path`, or use defaults when there is none
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No configuration file given, using built-in defaults");
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProvisionError::io("read config", path, e))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ProvisionError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject empty required fields
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("homebrew.brew", self.homebrew.brew.as_str()),
            ("homebrew.install_script", self.homebrew.install_script.as_str()),
            ("homebrew.uninstall_script", self.homebrew.uninstall_script.as_str()),
            ("homebrew.preset_intro", self.homebrew.preset_intro.as_str()),
            ("homebrew.env.brew_git_remote", self.homebrew.env.brew_git_remote.as_str()),
            ("homebrew.env.core_git_remote", self.homebrew.env.core_git_remote.as_str()),
            ("homebrew.env.api_domain", self.homebrew.env.api_domain.as_str()),
            ("homebrew.env.bottle_domain", self.homebrew.env.bottle_domain.as_str()),
            ("podman.docker_registry", self.podman.docker_registry.as_str()),
            ("podman.service", self.podman.service.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ProvisionError::Config(format!("{} is required", field)));
        }
        if self.homebrew.prefix.as_os_str().is_empty() {
            return Err(ProvisionError::Config("homebrew.prefix is required".to_string()));
        }
        if self.command_timeout_secs == 0 {
            return Err(ProvisionError::Config("command_timeout_secs must be positive".to_string()));
        }
        if self.agent.keep_alive_interval_secs == 0 {
            return Err(ProvisionError::Config(
                "agent.keep_alive_interval_secs must be positive".to_string(),
            ));
        }

        let names = [
            ("podman.service", std::slice::from_ref(&self.podman.service)),
            ("homebrew.toolchains", self.homebrew.toolchains.as_slice()),
            ("agent.keep_alive", self.agent.keep_alive.as_slice()),
        ];
        for (field, values) in names {
            for value in values {
                validate_name(value)
                    .map_err(|e| ProvisionError::Config(format!("{}: {}", field, e)))?;
            }
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
