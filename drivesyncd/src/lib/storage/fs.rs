use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use drivesync::LocalEntry;
use tokio::{fs, io};
use tokio_stream::{wrappers::ReadDirStream, StreamExt};

/// Suffix of files being downloaded.
/// Such files are never listed.
pub const PART_SUFFIX: &str = ".drivesync-part";

/// Whether `name` is one of the temporary files written by [write_file]
pub fn is_part_file(name: &str) -> bool {
    name.len() > PART_SUFFIX.len() + 1 && name.starts_with('.') && name.ends_with(PART_SUFFIX)
}

/// Whether `name` can be used as a single component of a local path.
/// Part file names are reserved.
pub fn is_valid_name(name: &str) -> bool {
    let forbidden = |c: char| c == '/' || c == '\0' || (cfg!(windows) && c == '\\');
    !matches!(name, "" | "." | "..") && !name.contains(forbidden) && !is_part_file(name)
}

/// The entries of one local directory
#[derive(Debug, Default, Clone)]
pub struct LocalListing {
    files: BTreeMap<String, LocalEntry>,
    folders: BTreeMap<String, LocalEntry>,
    occupied: BTreeSet<String>,
}

impl LocalListing {
    /// Regular files, keyed by name
    pub fn files(&self) -> &BTreeMap<String, LocalEntry> {
        &self.files
    }

    /// Directories, keyed by name
    pub fn folders(&self) -> &BTreeMap<String, LocalEntry> {
        &self.folders
    }

    /// Names of symlinks and special files
    pub fn occupied(&self) -> &BTreeSet<String> {
        &self.occupied
    }

    /// Whether `name` is taken by anything else than a directory
    pub fn has_non_dir(&self, name: &str) -> bool {
        self.files.contains_key(name) || self.occupied.contains(name)
    }

    /// Whether `name` is taken by anything else than a regular file
    pub fn has_non_file(&self, name: &str) -> bool {
        self.folders.contains_key(name) || self.occupied.contains(name)
    }
}

/// Lists the immediate children of `dir`.
/// Symlinks are not followed and are neither files nor folders.
pub async fn list_dir(dir: &Utf8Path) -> drivesync::Result<LocalListing> {
    log::trace!("listing entries of {dir}");
    let read_dir = fs::read_dir(dir)
        .await
        .map_err(|err| drivesync::io_error!("can't read {dir}: {err}"))?;
    let mut entries = ReadDirStream::new(read_dir);

    let mut listing = LocalListing::default();
    while let Some(direntry) = entries.next().await {
        let direntry = direntry.map_err(|err| drivesync::io_error!("can't read {dir}: {err}"))?;
        let name = match direntry.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                log::warn!("skipping non UTF-8 name {name:?} in {dir}");
                continue;
            }
        };
        if is_part_file(&name) {
            continue;
        }
        let file_type = direntry.file_type().await?;
        if !file_type.is_file() && !file_type.is_dir() {
            log::trace!("{dir}/{name} is neither a file nor a directory");
            listing.occupied.insert(name);
            continue;
        }
        let metadata = direntry.metadata().await?;
        let entry = LocalEntry {
            path: dir.join(&name),
            name: name.clone(),
            is_dir: file_type.is_dir(),
            size: metadata.len(),
            mtime: metadata.modified()?.into(),
        };
        if entry.is_dir {
            listing.folders.insert(name, entry);
        } else {
            listing.files.insert(name, entry);
        }
    }
    Ok(listing)
}

/// Creates the directory `path` and its parents, if needed.
pub async fn mkdir(path: &Utf8Path) -> drivesync::Result<()> {
    log::debug!("mkdir -p {path}");
    fs::create_dir_all(path)
        .await
        .map_err(|err| drivesync::io_error!("can't create {path}: {err}"))
}

/// Opens `path` for reading, and returns its length.
pub async fn open_file(path: &Utf8Path) -> drivesync::Result<(fs::File, u64)> {
    let f = fs::File::open(path)
        .await
        .map_err(|err| drivesync::io_error!("can't open {path}: {err}"))?;
    let len = f.metadata().await?.len();
    Ok((f, len))
}

/// Writes all of `data` to `dest`.
///
/// Data goes to a temporary file next to `dest`, which is renamed over `dest` once complete.
/// On failure, `dest` is left untouched.
pub async fn write_file<R>(dest: &Utf8Path, data: R) -> drivesync::Result<u64>
where
    R: io::AsyncRead,
{
    let part = part_path(dest)?;
    log::trace!("writing {part}");
    match write_part(&part, data).await {
        Ok(written) => {
            fs::rename(&part, dest)
                .await
                .map_err(|err| drivesync::io_error!("can't write {dest}: {err}"))?;
            Ok(written)
        }
        Err(err) => {
            if let Err(rm_err) = fs::remove_file(&part).await {
                log::warn!("could not remove {part}: {rm_err}");
            }
            Err(err)
        }
    }
}

async fn write_part<R>(part: &Utf8Path, data: R) -> drivesync::Result<u64>
where
    R: io::AsyncRead,
{
    use io::AsyncWriteExt;

    tokio::pin!(data);
    let mut f = fs::File::create(part)
        .await
        .map_err(|err| drivesync::io_error!("can't create {part}: {err}"))?;
    let written = io::copy(&mut data, &mut f).await?;
    f.flush().await?;
    f.sync_all().await?;
    Ok(written)
}

fn part_path(dest: &Utf8Path) -> drivesync::Result<Utf8PathBuf> {
    let name = dest
        .file_name()
        .ok_or_else(|| drivesync::io_error!("{dest} is not a file path"))?;
    Ok(dest.with_file_name(format!(".{name}{PART_SUFFIX}")))
}
