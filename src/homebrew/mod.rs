//! Homebrew package manager facade
//!
//! Wraps the `brew` CLI: package info/install/remove, `brew config`, the
//! install/uninstall scripts for Homebrew itself and the optional compiler
//! toolchains. Service control lives in [`services`].

pub mod services;

use std::{collections::BTreeMap, path::Path, sync::Arc, time::Duration};
use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    command::{CommandResult, CommandRunner, CommandSpec, StderrPolicy},
    config::HomebrewConfig,
    error::{CommandError, ProvisionError, Result},
    retry::RetryPolicy,
};

pub use services::{parse_service_list, ServiceRecord, STATUS_STARTED};

/// An installed package as reported by `brew info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    pub name: String,
    /// Keg path, e.g. `/opt/homebrew/Cellar/podman/5.0.2`
    pub path: String,
    pub version: String,
}

/// Handle on one Homebrew installation
pub struct Homebrew {
    config: HomebrewConfig,
    runner: Arc<dyn CommandRunner>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Homebrew {
    pub fn new(config: HomebrewConfig, runner: Arc<dyn CommandRunner>, retry: RetryPolicy) -> Self {
        Self {
            config,
            runner,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort retry delays once `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &HomebrewConfig {
        &self.config
    }

    pub fn prefix(&self) -> &Path {
        &self.config.prefix
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// `brew <args>` with the mirror environment overlay
    fn brew<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(self.config.brew.clone())
            .args(args)
            .envs(self.config.env.overlay())
    }

    /// Wait `delay` between attempts, giving up early on cancellation
    pub(crate) async fn pause(&self, delay: Duration, waiting_for: &str) -> Result<()> {
        let cancelled = || -> ProvisionError {
            CommandError::Cancelled {
                command: waiting_for.to_string(),
            }
            .into()
        };
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }
        if delay.is_zero() {
            return Ok(());
        }

        tokio::select! {
            _ = sleep(delay) => Ok(()),
            _ = self.cancel.cancelled() => Err(cancelled()),
        }
    }

    /// Run a command and fail on an unsuccessful exit
    pub(crate) async fn run_checked(&self, spec: CommandSpec) -> Result<CommandResult> {
        let command = spec.to_string();
        let result = self.runner.run(&spec).await?;
        result.check(&command, StderrPolicy::ExitStatus)
    }

    /// Whether the Homebrew prefix exists
    pub fn is_self_installed(&self) -> bool {
        self.config.prefix.exists()
    }

    /// Install Homebrew itself with the official install script
    pub async fn install_self(&self) -> Result<()> {
        if self.is_self_installed() {
            info!("Homebrew already installed at {}", self.config.prefix.display());
            return Ok(());
        }

        info!("Installing Homebrew into {}", self.config.prefix.display());
        if let Err(e) = self.run_remote_script(&self.config.install_script).await {
            warn!("Homebrew installation failed, check the requirements at {}", self.config.preset_intro);
            return Err(e);
        }
        info!("Homebrew installed");
        Ok(())
    }

    /// Uninstall Homebrew itself with the official uninstall script
    pub async fn uninstall_self(&self) -> Result<()> {
        if !self.is_self_installed() {
            info!("Homebrew is not installed");
            return Ok(());
        }

        info!("Uninstalling Homebrew from {}", self.config.prefix.display());
        self.run_remote_script(&self.config.uninstall_script).await?;
        info!("Homebrew uninstalled");
        Ok(())
    }

    /// Fetch a script over HTTPS and run it with bash, streaming its output.
    ///
    /// The script is executed as downloaded, without checksum or signature verification.
    async fn run_remote_script(&self, url: &str) -> Result<()> {
        let script = self
            .run_checked(CommandSpec::new("curl").args(["-fsSL", url]))
            .await?
            .stdout;
        if script.trim().is_empty() {
            return Err(ProvisionError::Parse {
                command: format!("curl -fsSL {}", url),
                reason: "empty script".to_string(),
            });
        }

        let spec = CommandSpec::new("/bin/bash")
            .arg("-c")
            .arg(script)
            .envs(self.config.env.overlay())
            .streamed();
        self.run_checked(spec).await?;
        Ok(())
    }

    /// Look up a package; `None` when it is not installed
    pub async fn info(&self, name: &str) -> Result<Option<InstalledPackage>> {
        validate_name(name)?;
        debug!("Checking whether {} is installed", name);
        let spec = self.brew(["info", name]);
        let command = spec.to_string();
        let result = self.run_checked(spec).await?;
        parse_info(name, &result.stdout).map_err(|reason| ProvisionError::Parse { command, reason })
    }

    /// Install a package, streaming brew's progress output
    pub async fn install(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        info!("Installing {}", name);
        self.run_checked(self.brew(["install", name]).streamed()).await?;
        info!("{} installed successfully", name);
        Ok(())
    }

    /// Remove a package
    pub async fn remove(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        info!("Removing {}", name);
        self.run_checked(self.brew(["remove", name]).streamed()).await?;
        info!("{} removed successfully", name);
        Ok(())
    }

    /// Install `name` unless `brew info` already reports it installed
    pub async fn ensure_installed(&self, name: &str) -> Result<InstalledPackage> {
        if let Some(package) = self.info(name).await? {
            info!("Already installed {}:{}", package.name, package.version);
            return Ok(package);
        }

        self.install(name).await?;
        self.info(name)
            .await?
            .ok_or_else(|| ProvisionError::NotInstalled(name.to_string()))
    }

    /// Install the configured toolchains; `go` also gets its module proxy set
    pub async fn ensure_toolchains(&self) -> Result<Vec<InstalledPackage>> {
        let mut packages = Vec::with_capacity(self.config.toolchains.len());
        for name in &self.config.toolchains {
            packages.push(self.ensure_installed(name).await?);
            if name == "go" {
                self.configure_go().await?;
            }
        }
        Ok(packages)
    }

    /// `go env -w` the module settings. Any stderr output counts as failure,
    /// since go reports ignored settings there while exiting zero.
    async fn configure_go(&self) -> Result<()> {
        let go = self.config.prefix.join("bin").join("go");
        let mut settings = vec!["GO111MODULE=on".to_string()];
        if !self.config.go_proxy.is_empty() {
            settings.push(format!("GOPROXY={}", self.config.go_proxy));
        }

        for setting in settings {
            let spec = CommandSpec::new(go.to_string_lossy().into_owned())
                .args(["env", "-w", setting.as_str()]);
            let command = spec.to_string();
            self.runner
                .run(&spec)
                .await?
                .check(&command, StderrPolicy::Strict)?;
            info!("Set go env {}", setting);
        }
        Ok(())
    }

    /// `brew config` as key/value pairs
    pub async fn brew_config(&self) -> Result<BTreeMap<String, String>> {
        let result = self.run_checked(self.brew(["config"])).await?;
        Ok(parse_config(&result.stdout))
    }
}

/// Reject names `brew` would read as options or that fall outside the
/// formula character set (`[A-Za-z0-9@._+-]`, plus `/` for tap-qualified names)
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c == '-' || c == '/')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@._+-/".contains(c));
    if valid {
        Ok(())
    } else {
        Err(ProvisionError::InvalidName(name.to_string()))
    }
}

/// Parse `brew info <name>` output.
///
/// The fourth line reads `Installed` for installed packages and the fifth line
/// starts with the keg path.
pub fn parse_info(name: &str, output: &str) -> std::result::Result<Option<InstalledPackage>, String> {
    let lines: Vec<&str> = output.lines().collect();
    match lines.get(3) {
        Some(line) if line.trim() == "Installed" => {}
        _ => return Ok(None),
    }

    let path = lines
        .get(4)
        .and_then(|line| line.split_whitespace().next())
        .ok_or_else(|| format!("{} reported as installed without a keg path", name))?;
    let version = Path::new(path)
        .file_name()
        .map(|v| v.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Some(InstalledPackage {
        name: name.to_string(),
        path: path.to_string(),
        version,
    }))
}

/// Parse `brew config` output, skipping its first line
pub fn parse_config(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::scripted::ScriptedRunner;

    const PODMAN_INFO: &str = "==> podman: stable 5.0.2 (bottled), HEAD\n\
Tool for managing OCI containers and pods\n\
https://podman.io/\n\
Installed\n\
/opt/homebrew/Cellar/podman/5.0.2 (201 files, 71.6MB) *\n\
  Poured from bottle using the formulae.brew.sh API on 2024-05-01\n";

    const MISSING_INFO: &str = "==> gcc: stable 14.1.0 (bottled), HEAD\n\
GNU compiler collection\n\
https://gcc.gnu.org/\n\
Not installed\n";

    fn homebrew(runner: Arc<ScriptedRunner>) -> Homebrew {
        Homebrew::new(HomebrewConfig::default(), runner, RetryPolicy::immediate(3))
    }

    #[test]
    fn parses_installed_package() {
        let package = parse_info("podman", PODMAN_INFO).unwrap().unwrap();
        assert_eq!(package.path, "/opt/homebrew/Cellar/podman/5.0.2");
        assert_eq!(package.version, "5.0.2");
        assert_eq!(package.name, "podman");
    }

    #[test]
    fn not_installed_package_is_none() {
        assert_eq!(parse_info("gcc", MISSING_INFO).unwrap(), None);
    }

    #[test]
    fn short_output_is_not_installed() {
        assert_eq!(parse_info("gcc", "==> gcc\n").unwrap(), None);
        assert_eq!(parse_info("gcc", "").unwrap(), None);
    }

    #[test]
    fn installed_without_keg_line_is_a_parse_error() {
        let output = "==> x\ndesc\nhttps://x\nInstalled\n";
        assert!(parse_info("x", output).is_err());
    }

    #[test]
    fn config_lines_split_on_first_colon() {
        let output = "HOMEBREW_VERSION: 4.3.1\n\
ORIGIN: https://github.com/Homebrew/brew\n\
HOMEBREW_PREFIX: /opt/homebrew\n\
no colon here\n";
        let config = parse_config(output);
        // First line is skipped
        assert!(!config.contains_key("HOMEBREW_VERSION"));
        assert_eq!(config.get("ORIGIN").map(String::as_str), Some("https://github.com/Homebrew/brew"));
        assert_eq!(config.get("HOMEBREW_PREFIX").map(String::as_str), Some("/opt/homebrew"));
        assert_eq!(config.len(), 2);
    }

    #[tokio::test]
    async fn info_passes_mirror_overlay() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.reply(&["brew", "info", "podman"], PODMAN_INFO);
        let brew = homebrew(runner.clone());

        let package = brew.info("podman").await.unwrap();
        assert!(package.is_some());

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0]
            .env
            .iter()
            .any(|(k, v)| k == "NONINTERACTIVE" && v == "1"));
        assert!(calls[0].env.iter().any(|(k, _)| k == "HOMEBREW_API_DOMAIN"));
    }

    #[tokio::test]
    async fn ensure_installed_skips_install_when_present() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.always(&["brew", "info", "podman"], PODMAN_INFO);
        let brew = homebrew(runner.clone());

        brew.ensure_installed("podman").await.unwrap();
        assert_eq!(runner.count(&["brew", "install"]), 0);
    }

    #[tokio::test]
    async fn ensure_installed_installs_then_reports_package() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .reply(&["brew", "info", "podman"], MISSING_INFO)
            .reply(&["brew", "info", "podman"], PODMAN_INFO);
        let brew = homebrew(runner.clone());

        let package = brew.ensure_installed("podman").await.unwrap();
        assert_eq!(package.version, "5.0.2");
        assert_eq!(runner.count(&["brew", "install", "podman"]), 1);
        let install = runner
            .calls()
            .into_iter()
            .find(|c| c.args.first().map(String::as_str) == Some("install"))
            .unwrap();
        assert_eq!(install.output, crate::command::OutputMode::Stream);
    }

    #[tokio::test]
    async fn failed_install_surfaces_stderr() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.reply_with(&["brew", "install"], || {
            Ok(CommandResult::exited(1, "", "Error: No available formula\n"))
        });
        let brew = homebrew(runner);

        let err = brew.install("nope").await.unwrap_err();
        assert!(err.to_string().contains("No available formula"));
    }

    #[tokio::test]
    async fn install_self_is_skipped_when_prefix_exists() {
        let prefix = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let config = HomebrewConfig {
            prefix: prefix.path().to_path_buf(),
            ..HomebrewConfig::default()
        };
        let brew = Homebrew::new(config, runner.clone(), RetryPolicy::immediate(3));

        brew.install_self().await.unwrap();
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn install_self_fetches_then_runs_script() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.reply(&["curl", "-fsSL"], "#!/bin/bash\necho installing\n");
        let config = HomebrewConfig {
            prefix: root.path().join("missing"),
            ..HomebrewConfig::default()
        };
        let brew = Homebrew::new(config, runner.clone(), RetryPolicy::immediate(3));

        brew.install_self().await.unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].program, "/bin/bash");
        assert_eq!(calls[1].args[1], "#!/bin/bash\necho installing\n");
        assert_eq!(calls[1].output, crate::command::OutputMode::Stream);
    }

    #[tokio::test]
    async fn empty_install_script_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let config = HomebrewConfig {
            prefix: root.path().join("missing"),
            ..HomebrewConfig::default()
        };
        let brew = Homebrew::new(config, runner.clone(), RetryPolicy::immediate(3));

        let err = brew.install_self().await.unwrap_err();
        assert!(matches!(err, ProvisionError::Parse { .. }));
        assert_eq!(runner.count(&["/bin/bash"]), 0);
    }

    #[test]
    fn formula_names_are_validated() {
        for name in ["podman", "podman-compose", "python@3.12", "gtk+3", "homebrew/core/gcc", "c++"] {
            assert!(validate_name(name).is_ok(), "{name}");
        }
        for name in ["", "--all", "-f", "/etc", "go;rm", "a b", "$(id)"] {
            assert!(validate_name(name).is_err(), "{name}");
        }
    }

    #[tokio::test]
    async fn option_like_package_is_not_installed() {
        let runner = Arc::new(ScriptedRunner::new());
        let brew = homebrew(runner.clone());

        assert!(brew.install("--force").await.unwrap_err().is_invalid_name());
        assert!(brew.remove("--all").await.unwrap_err().is_invalid_name());
        assert!(brew.info("-v").await.unwrap_err().is_invalid_name());
        assert!(runner.calls().is_empty());
    }

    const GO_INFO: &str = "==> go: stable 1.22.3 (bottled), HEAD\n\
Open source programming language\n\
https://go.dev/\n\
Installed\n\
/brew/Cellar/go/1.22.3 (12,859 files, 252.1MB) *\n";

    fn toolchain_brew(runner: Arc<ScriptedRunner>, toolchains: &[&str]) -> Homebrew {
        let config = HomebrewConfig {
            prefix: std::path::PathBuf::from("/brew"),
            toolchains: toolchains.iter().map(|t| t.to_string()).collect(),
            ..HomebrewConfig::default()
        };
        Homebrew::new(config, runner, RetryPolicy::immediate(3))
    }

    #[tokio::test]
    async fn go_toolchain_gets_module_proxy() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .reply(&["brew", "info", "go"], "==> go\ndesc\nurl\nNot installed\n")
            .always(&["brew", "info", "go"], GO_INFO);
        let brew = toolchain_brew(runner.clone(), &["go"]);

        let packages = brew.ensure_toolchains().await.unwrap();
        assert_eq!(packages[0].version, "1.22.3");
        assert_eq!(runner.count(&["brew", "install", "go"]), 1);

        let go_calls: Vec<_> = runner
            .calls()
            .into_iter()
            .filter(|c| c.program == "/brew/bin/go")
            .map(|c| c.args)
            .collect();
        assert_eq!(
            go_calls,
            vec![
                vec!["env", "-w", "GO111MODULE=on"],
                vec!["env", "-w", "GOPROXY=https://goproxy.cn,direct"],
            ]
        );
    }

    #[tokio::test]
    async fn gcc_toolchain_skips_go_settings() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.always(
            &["brew", "info", "gcc"],
            "==> gcc\ndesc\nurl\nInstalled\n/brew/Cellar/gcc/14.1.0 (1,914 files, 459MB) *\n",
        );
        let brew = toolchain_brew(runner.clone(), &["gcc"]);

        brew.ensure_toolchains().await.unwrap();
        assert_eq!(runner.count(&["brew", "install"]), 0);
        assert_eq!(runner.count(&["/brew/bin/go"]), 0);
    }

    #[tokio::test]
    async fn go_env_warning_fails_toolchain_setup() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.always(&["brew", "info", "go"], GO_INFO);
        runner.always_with(&["/brew/bin/go", "env", "-w", "GOPROXY=https://goproxy.cn,direct"], || {
            Ok(CommandResult::exited(
                0,
                "",
                "warning: go env -w GOPROXY=... does not override conflicting OS environment variable\n",
            ))
        });
        let brew = toolchain_brew(runner, &["go"]);

        let err = brew.ensure_toolchains().await.unwrap_err();
        assert!(err.to_string().contains("conflicting OS environment variable"));
    }
}
