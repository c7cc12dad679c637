//! Atomic replacement of the daemon's config and secrets files.
//!
//! Each file is staged as a temp file in its destination directory and then
//! renamed over the target, so the daemon never reads a partial file. Both
//! files are staged before either is renamed: a staging failure leaves both
//! targets untouched. The two renames are not jointly atomic.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::render::RenderedConfig;

/// Mode for `ipsec.conf`: world readable.
const CONF_MODE: u32 = 0o644;

/// Mode for `ipsec.secrets`: root only.
const SECRETS_MODE: u32 = 0o600;

/// A config file could not be written.
#[derive(Debug, thiserror::Error)]
#[error("failed to write {}: {source}", path.display())]
pub struct ConfigWriteError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

/// Writes rendered artifacts to their two fixed locations.
#[derive(Debug, Clone)]
pub struct ConfigWriter {
    conf_path: PathBuf,
    secrets_path: PathBuf,
}

impl ConfigWriter {
    pub const fn new(conf_path: PathBuf, secrets_path: PathBuf) -> Self {
        Self {
            conf_path,
            secrets_path,
        }
    }

    pub fn conf_path(&self) -> &Path {
        &self.conf_path
    }

    pub fn secrets_path(&self) -> &Path {
        &self.secrets_path
    }

    /// Replace both files with the rendered content.
    pub fn write(&self, rendered: &RenderedConfig) -> Result<(), ConfigWriteError> {
        let conf = stage(&self.conf_path, &rendered.conf, CONF_MODE)?;
        let secrets = stage(&self.secrets_path, &rendered.secrets, SECRETS_MODE)?;

        commit(conf, &self.conf_path)?;
        commit(secrets, &self.secrets_path)?;

        tracing::info!(
            conf = %self.conf_path.display(),
            secrets = %self.secrets_path.display(),
            "VPN config files written"
        );
        Ok(())
    }
}

fn stage(path: &Path, content: &str, mode: u32) -> Result<NamedTempFile, ConfigWriteError> {
    let wrap = |source| ConfigWriteError {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(wrap)?;
    set_mode(&tmp, mode).map_err(wrap)?;
    tmp.write_all(content.as_bytes()).map_err(wrap)?;
    tmp.as_file().sync_all().map_err(wrap)?;
    Ok(tmp)
}

fn commit(tmp: NamedTempFile, path: &Path) -> Result<(), ConfigWriteError> {
    tmp.persist(path).map_err(|e| ConfigWriteError {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    tracing::debug!(path = %path.display(), "Replaced file");
    Ok(())
}

#[cfg(unix)]
fn set_mode(tmp: &NamedTempFile, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tmp.as_file()
        .set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_tmp: &NamedTempFile, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
