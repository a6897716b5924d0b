//! Fake `brew` executable for integration tests.
//!
//! The script keeps its state in files next to itself: `starts`, `lists` and
//! `installs` count invocations, `env` holds the mirror variables it was called with.
//! `services list` reports the service as started once it has been started
//! `threshold` times.

#![allow(dead_code)]

use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use brewstrap::{
    config::HomebrewConfig, Homebrew, RetryPolicy, SystemRunner,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub struct FakeBrew {
    pub dir: TempDir,
    pub script: PathBuf,
}

impl FakeBrew {
    pub fn new(service: &str, threshold: u32) -> Self {
        Self::with_list_delay(service, threshold, 0)
    }

    /// `services list` sleeps `delay_secs` before answering
    pub fn with_list_delay(service: &str, threshold: u32, delay_secs: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().display().to_string();
        let keg = dir.path().join("Cellar").join(service).join("5.0.2");
        std::fs::create_dir_all(&keg).unwrap();

        let script = format!(
            r#"#!/bin/sh
state="{state}"
count() {{ cat "$state/$1" 2>/dev/null || echo 0; }}
bump() {{ echo $(( $(count "$1") + 1 )) > "$state/$1"; }}
case "$1 $2" in
  "services list")
    bump lists
    echo "$HOMEBREW_API_DOMAIN $NONINTERACTIVE" > "$state/env"
    sleep {delay_secs}
    echo "Name    Status  User File"
    if [ "$(count starts)" -ge {threshold} ]; then
      echo "{service}  started $(id -un) $state/homebrew.mxcl.{service}.plist"
    else
      echo "{service}  none"
    fi
    ;;
  "services start")
    bump starts
    echo "==> Successfully started \`$3\`"
    ;;
  "services stop")
    echo 0 > "$state/starts"
    echo "==> Successfully stopped \`$3\`"
    ;;
  "info {service}")
    echo "==> {service}: stable 5.0.2 (bottled), HEAD"
    echo "Tool for managing OCI containers and pods"
    echo "https://podman.io/"
    echo "Installed"
    echo "{keg} (201 files, 71.6MB) *"
    ;;
  "info "*)
    echo "==> $2: stable 1.0.0"
    echo "description"
    echo "https://example.com/"
    if [ -f "$state/installed-$2" ]; then
      echo "Installed"
      echo "$state/Cellar/$2/1.0.0 (3 files, 12KB) *"
    else
      echo "Not installed"
    fi
    ;;
  "install "*)
    bump installs
    touch "$state/installed-$2"
    echo "==> Pouring $2--1.0.0.bottle.tar.gz"
    ;;
  *)
    echo "Error: Unknown command: $1" >&2
    exit 1
    ;;
esac
"#,
            keg = keg.display(),
        );

        let path = dir.path().join("brew");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, script: path }
    }

    pub fn keg(&self, service: &str) -> PathBuf {
        self.dir.path().join("Cellar").join(service).join("5.0.2")
    }

    pub fn prefix(&self) -> &Path {
        self.dir.path()
    }

    pub fn homebrew_config(&self) -> HomebrewConfig {
        HomebrewConfig {
            brew: self.script.display().to_string(),
            prefix: self.dir.path().to_path_buf(),
            ..HomebrewConfig::default()
        }
    }

    pub fn homebrew(&self, timeout: Duration) -> Homebrew {
        let runner = SystemRunner::new(timeout, CancellationToken::new());
        Homebrew::new(self.homebrew_config(), Arc::new(runner), RetryPolicy::immediate(3))
    }

    pub fn counter(&self, name: &str) -> u32 {
        std::fs::read_to_string(self.dir.path().join(name))
            .map(|s| s.trim().parse().unwrap())
            .unwrap_or(0)
    }

    pub fn recorded_env(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("env")).unwrap_or_default()
    }
}
