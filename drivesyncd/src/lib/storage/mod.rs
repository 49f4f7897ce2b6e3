use std::collections::BTreeMap;

use camino::Utf8Path;
use drivesync::{FileId, RemoteEntry};
use futures::{Future, Stream, StreamExt};
use tokio::io;

pub mod drive;
pub mod fs;

pub trait DirEntries {
    /// Streams the non-trashed children of the folder `folder_id`.
    fn dir_entries(
        &self,
        folder_id: &FileId,
    ) -> impl Stream<Item = drivesync::Result<RemoteEntry>> + Send;
}

pub trait FindFolder {
    /// Looks a folder up by its exact name, optionally within `parent_id`.
    /// Returns `Ok(None)` if there is no such folder.
    fn find_folder(
        &self,
        name: &str,
        parent_id: Option<&FileId>,
    ) -> impl Future<Output = drivesync::Result<Option<FileId>>> + Send;
}

pub trait MkDir {
    fn mkdir(
        &self,
        parent_id: &FileId,
        name: &str,
    ) -> impl Future<Output = drivesync::Result<FileId>> + Send;
}

pub trait CreateFile {
    /// Creates a new file in `parent_id` with `len` bytes read from `data`.
    fn create_file(
        &self,
        parent_id: &FileId,
        name: &str,
        data: impl io::AsyncRead + Send + Sync + 'static,
        len: u64,
    ) -> impl Future<Output = drivesync::Result<FileId>> + Send;
}

pub trait WriteFile {
    /// Replaces the content of file `id`, which keeps its id.
    fn write_file(
        &self,
        id: &FileId,
        data: impl io::AsyncRead + Send + Sync + 'static,
        len: u64,
    ) -> impl Future<Output = drivesync::Result<()>> + Send;
}

pub trait Download {
    /// Writes the content of file `id` to `dest`, replacing any existing file.
    fn download(
        &self,
        id: &FileId,
        dest: &Utf8Path,
    ) -> impl Future<Output = drivesync::Result<()>> + Send;
}

/// A trait for id based remote storage
pub trait Storage:
    DirEntries + FindFolder + MkDir + CreateFile + WriteFile + Download + Send + Sync + 'static
{
}

/// The children of a remote folder, split by kind and keyed by name
#[derive(Debug, Default, Clone)]
pub struct RemoteChildren {
    pub files: BTreeMap<String, RemoteEntry>,
    pub folders: BTreeMap<String, RemoteEntry>,
}

impl RemoteChildren {
    fn insert(&mut self, entry: RemoteEntry) {
        let map = if entry.is_folder() {
            &mut self.folders
        } else {
            &mut self.files
        };
        if let Some(existing) = map.get(&entry.name) {
            log::warn!(
                "'{}' appears twice in the same folder ({} and {}), ignoring the latter",
                entry.name,
                existing.id,
                entry.id
            );
            return;
        }
        map.insert(entry.name.clone(), entry);
    }
}

/// Lists all children of `folder_id`.
/// Fails if any page of the listing fails.
pub async fn list_children<S>(
    storage: &S,
    folder_id: &FileId,
) -> drivesync::Result<RemoteChildren>
where
    S: DirEntries,
{
    log::trace!("listing children of {folder_id}");
    let entries = storage.dir_entries(folder_id);
    tokio::pin!(entries);
    let mut children = RemoteChildren::default();
    while let Some(entry) = entries.next().await {
        children.insert(entry?);
    }
    Ok(children)
}

/// Returns the id of the folder `name`, creating it in the Drive root if there is none.
pub async fn find_or_create_folder<S>(storage: &S, name: &str) -> drivesync::Result<FileId>
where
    S: FindFolder + MkDir,
{
    if let Some(id) = storage.find_folder(name, None).await? {
        log::info!("Found folder {name} in Drive ({id})");
        return Ok(id);
    }
    log::info!("Creating folder {name} in Drive");
    storage.mkdir(&FileId::root(), name).await
}
