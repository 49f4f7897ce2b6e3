use std::time::Duration;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// The validated run configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// OAuth2 client secret file, inside the config directory
    pub credentials_path: Utf8PathBuf,
    /// Canonical path of the local folder to sync
    pub local_root: Utf8PathBuf,
    /// Name of the remote folder mirroring `local_root`
    pub remote_folder: String,
    /// Run a single pass
    pub once: bool,
    /// Pause between two passes
    pub interval: Duration,
}

impl RunConfig {
    /// Validates the options given on the command line.
    ///
    /// The credentials file is copied into `config_dir` unless it is already the one in there.
    /// The remote folder is named after the local folder.
    pub async fn resolve(
        folder: &Utf8Path,
        credentials: Option<&Utf8Path>,
        config_dir: &Utf8Path,
        once: bool,
        interval: Duration,
    ) -> anyhow::Result<Self> {
        let md = tokio::fs::metadata(folder)
            .await
            .with_context(|| format!("No such folder: {folder}"))?;
        if !md.is_dir() {
            anyhow::bail!("{folder} is not a folder");
        }
        let local_root = folder
            .canonicalize_utf8()
            .with_context(|| format!("Can't canonicalize {folder}"))?;
        let remote_folder = local_root
            .file_name()
            .with_context(|| format!("{local_root} has no name to use in Drive"))?
            .to_string();

        tokio::fs::create_dir_all(config_dir)
            .await
            .with_context(|| format!("Can't create {config_dir}"))?;
        let credentials_path = config_dir.join(crate::loc::CREDENTIALS_FILE);
        if let Some(src) = credentials {
            if src != credentials_path.as_path() {
                log::info!("copying {src} to {credentials_path}");
                tokio::fs::copy(src, &credentials_path)
                    .await
                    .with_context(|| format!("Failed to copy credentials from {src}"))?;
            }
        }
        if !credentials_path.exists() {
            anyhow::bail!("No credentials file. Please pass one with --credentials");
        }

        Ok(Self {
            credentials_path,
            local_root,
            remote_folder,
            once,
            interval,
        })
    }
}
