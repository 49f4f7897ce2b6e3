use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use drivesync::{FileId, Outcome};
use drivesyncd::{DirectoryLevel, LogObserver, Observer, Reconciler, Schedule, SyncDriver};

use crate::{
    stubs::drive::{self, Mutation},
    utils,
};

/// Records the outcomes of a pass, by path relative to the local root
#[derive(Debug)]
pub struct Recorder {
    root: Utf8PathBuf,
    outcomes: Mutex<Vec<(String, Outcome)>>,
}

impl Observer for Recorder {
    fn outcome(&self, path: &Utf8Path, outcome: Outcome) {
        LogObserver.outcome(path, outcome);
        let rel = path
            .strip_prefix(&self.root)
            .expect("outcome out of the local tree");
        self.outcomes
            .lock()
            .unwrap()
            .push((rel.to_string(), outcome));
    }
}

pub struct Harness {
    pub local_root: Utf8PathBuf,
    pub remote_root: FileId,
    pub drive: Arc<drive::Stub>,
    pub recorder: Recorder,
}

impl Harness {
    pub fn new(local_root: Utf8PathBuf, remote_root: FileId, drive: drive::Stub) -> Self {
        let recorder = Recorder {
            root: local_root.clone(),
            outcomes: Mutex::new(Vec::new()),
        };
        Self {
            local_root,
            remote_root,
            drive: Arc::new(drive),
            recorder,
        }
    }

    pub fn root_level(&self) -> DirectoryLevel {
        DirectoryLevel::new(self.local_root.clone(), self.remote_root.clone())
    }

    /// Runs one reconciliation pass
    pub async fn sync(&self) -> drivesync::Result<()> {
        Reconciler::new(&*self.drive, &self.recorder)
            .reconcile(self.root_level())
            .await
    }

    /// Runs one pass and clears the journal and the outcomes
    pub async fn sync_and_clear(&self) {
        self.sync().await.expect("Should not fail");
        self.drive.clear_journal();
        self.take_outcomes();
    }

    pub fn driver(&self, schedule: Schedule) -> SyncDriver<drive::Stub> {
        SyncDriver::new(self.drive.clone(), self.root_level(), schedule)
    }

    pub fn take_outcomes(&self) -> Vec<(String, Outcome)> {
        std::mem::take(&mut *self.recorder.outcomes.lock().unwrap())
    }

    pub fn outcome_of(&self, path: &str) -> Option<Outcome> {
        self.recorder
            .outcomes
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, o)| *o)
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.drive.mutations()
    }

    pub fn local_path(&self, path: &str) -> Utf8PathBuf {
        self.local_root.join(path)
    }

    pub fn local_content(&self, path: &str) -> Option<String> {
        utils::file_content(&self.local_path(path))
    }

    pub fn has_local_dir(&self, path: &str) -> bool {
        std::fs::symlink_metadata(self.local_path(path)).is_ok_and(|md| md.is_dir())
    }

    pub fn remote_content(&self, path: &str) -> Option<String> {
        self.drive.content(&self.remote_root, path)
    }

    pub fn has_remote_dir(&self, path: &str) -> bool {
        self.drive.is_folder(&self.remote_root, path)
    }

    pub fn remote_id(&self, path: &str) -> Option<FileId> {
        self.drive.resolve(&self.remote_root, path).map(|n| n.id)
    }

    pub fn remote_children(&self, path: &str) -> Vec<String> {
        self.drive.children(&self.remote_root, path)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.local_root);
    }
}
