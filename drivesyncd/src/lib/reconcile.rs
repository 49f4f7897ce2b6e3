use std::{cmp::Ordering, collections::BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use drivesync::{FileId, Outcome};

use crate::{
    fingerprint,
    storage::{self, fs, RemoteChildren, Storage},
};

/// Receives every decision taken by the [Reconciler]
pub trait Observer: Send + Sync {
    /// `path` is the local path of the entry, whether it exists or not.
    fn outcome(&self, path: &Utf8Path, outcome: Outcome);
}

/// Forwards decisions to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn outcome(&self, path: &Utf8Path, outcome: Outcome) {
        match outcome {
            Outcome::SkipEqual => log::debug!("{path}: {outcome}"),
            _ => log::info!("{path}: {outcome}"),
        }
    }
}

/// A local directory and the remote folder it mirrors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLevel {
    pub local: Utf8PathBuf,
    pub remote_id: FileId,
}

impl DirectoryLevel {
    pub fn new(local: Utf8PathBuf, remote_id: FileId) -> Self {
        Self { local, remote_id }
    }
}

/// Two-way merge of a local tree and a remote folder tree.
///
/// Levels are processed depth-first, siblings in name order.
/// The first error aborts the whole traversal.
pub struct Reconciler<'a, R, O = LogObserver> {
    remote: &'a R,
    observer: &'a O,
}

impl<'a, R, O> Reconciler<'a, R, O>
where
    R: Storage,
    O: Observer,
{
    pub fn new(remote: &'a R, observer: &'a O) -> Self {
        Self { remote, observer }
    }

    /// Reconciles `root` and every folder below it.
    pub async fn reconcile(&self, root: DirectoryLevel) -> drivesync::Result<()> {
        let mut worklist = vec![root];
        while let Some(level) = worklist.pop() {
            let children = self.reconcile_level(&level).await?;
            // popped in name order
            worklist.extend(children.into_iter().rev());
        }
        Ok(())
    }

    /// Reconciles the direct children of `level`.
    /// Returns the levels to descend into, in name order.
    pub async fn reconcile_level(
        &self,
        level: &DirectoryLevel,
    ) -> drivesync::Result<Vec<DirectoryLevel>> {
        log::trace!("reconciling {} with folder {}", level.local, level.remote_id);

        let remote = self.list_remote(level, log::Level::Warn).await?;
        let local = fs::list_dir(&level.local).await?;

        self.merge_folders(level, &local, &remote).await?;
        self.merge_files(level, &local, &remote).await?;

        // pick up the folders created by merge_folders
        let remote = self.list_remote(level, log::Level::Trace).await?;

        let mut children = Vec::with_capacity(remote.folders.len());
        for (name, folder) in remote.folders {
            if local.has_non_dir(&name) {
                log::trace!("not descending into {name}, not a directory locally");
                continue;
            }
            children.push(DirectoryLevel::new(level.local.join(&name), folder.id));
        }
        Ok(children)
    }

    /// Lists the remote children of `level`.
    /// Names that can't be a single local path component are left out.
    async fn list_remote(
        &self,
        level: &DirectoryLevel,
        skip_level: log::Level,
    ) -> drivesync::Result<RemoteChildren> {
        let mut remote = storage::list_children(self.remote, &level.remote_id).await?;
        for entries in [&mut remote.files, &mut remote.folders] {
            entries.retain(|name, entry| {
                let valid = fs::is_valid_name(name);
                if !valid {
                    log::log!(
                        skip_level,
                        "skipping {name:?} ({}) in {}, not a valid local name",
                        entry.id,
                        level.local
                    );
                }
                valid
            });
        }
        Ok(remote)
    }

    async fn merge_folders(
        &self,
        level: &DirectoryLevel,
        local: &fs::LocalListing,
        remote: &RemoteChildren,
    ) -> drivesync::Result<()> {
        for (name, folder) in local.folders() {
            if remote.folders.contains_key(name) {
                continue;
            }
            let path = &folder.path;
            self.observer.outcome(path, Outcome::CreateFolderRemote);
            self.remote.mkdir(&level.remote_id, name).await?;
        }

        for name in remote.folders.keys() {
            if local.folders().contains_key(name) {
                continue;
            }
            let path = level.local.join(name);
            if local.has_non_dir(name) {
                log::warn!("{path} is not a directory, can't mirror the folder from Drive");
                continue;
            }
            self.observer.outcome(&path, Outcome::CreateFolderLocal);
            fs::mkdir(&path).await?;
        }
        Ok(())
    }

    async fn merge_files(
        &self,
        level: &DirectoryLevel,
        local: &fs::LocalListing,
        remote: &RemoteChildren,
    ) -> drivesync::Result<()> {
        let mut processed = BTreeSet::new();

        for (name, file) in local.files() {
            processed.insert(name.as_str());
            let path = &file.path;

            let Some(remote_file) = remote.files.get(name) else {
                if remote.folders.contains_key(name) {
                    log::warn!("{path} is a folder in Drive, can't upload the file");
                    continue;
                }
                self.observer.outcome(path, Outcome::UploadNew);
                let (data, len) = fs::open_file(path).await?;
                self.remote
                    .create_file(&level.remote_id, name, data, len)
                    .await?;
                continue;
            };

            if !remote_file.is_binary() {
                self.observer.outcome(path, Outcome::SkipNotDownloadable);
                continue;
            }

            let md5 = fingerprint::md5_file(path).await?;
            if remote_file.md5.as_deref() == Some(md5.as_str()) {
                self.observer.outcome(path, Outcome::SkipEqual);
                continue;
            }

            if drivesync::compare_mtime(file.mtime, remote_file.mtime) == Ordering::Less {
                self.observer.outcome(path, Outcome::DownloadNewer);
                self.remote.download(&remote_file.id, path).await?;
            } else {
                self.observer.outcome(path, Outcome::UploadNewer);
                let (data, len) = fs::open_file(path).await?;
                self.remote.write_file(&remote_file.id, data, len).await?;
            }
        }

        for (name, remote_file) in remote.files.iter() {
            if processed.contains(name.as_str()) {
                continue;
            }
            let path = level.local.join(name);
            if !remote_file.is_binary() {
                self.observer.outcome(&path, Outcome::SkipNotDownloadable);
                continue;
            }
            if local.has_non_file(name) {
                log::warn!("{path} exists and is not a file, can't download it from Drive");
                continue;
            }
            self.observer.outcome(&path, Outcome::DownloadNew);
            self.remote.download(&remote_file.id, &path).await?;
        }
        Ok(())
    }
}
