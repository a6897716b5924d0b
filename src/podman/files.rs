//! Plain-text configuration patches

use std::{io::Write, path::Path};
use tempfile::NamedTempFile;

use crate::error::{ProvisionError, Result};

/// Service unit Homebrew generates inside podman's keg
pub const SERVICE_FILE: &str = "homebrew.podman.service";

const ESCAPED_TIME_FLAG: &str = "--time\\=0";
const TIME_FLAG: &str = "--time=0";

/// Replace the first escaped `--time\=0` with `--time=0`; `None` when absent
pub fn fix_service_unit(content: &str) -> Option<String> {
    content
        .contains(ESCAPED_TIME_FLAG)
        .then(|| content.replacen(ESCAPED_TIME_FLAG, TIME_FLAG, 1))
}

/// Block routing docker.io pulls through `mirror`
pub fn registry_block(mirror: &str) -> String {
    format!(
        "\n[[registry]]\nprefix = \"docker.io\"\nlocation = \"{}\"\ninsecure = true\n",
        mirror
    )
}

/// Replace `path` with `contents` through a sibling temp file and a rename
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ProvisionError::io("create temp file in", dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| ProvisionError::io("write", tmp.path(), e))?;

    // Keep the permissions of the file being replaced
    if let Ok(metadata) = std::fs::metadata(path) {
        tmp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(|e| ProvisionError::io("set permissions on", tmp.path(), e))?;
    }

    tmp.persist(path)
        .map_err(|e| ProvisionError::io("replace", path, e.error))?;
    Ok(())
}
