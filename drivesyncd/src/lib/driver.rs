use std::{sync::Arc, time::Duration};

use drivesync::RunConfig;
use tokio::time::Instant;

use crate::{
    reconcile::{DirectoryLevel, LogObserver, Observer, Reconciler},
    storage::Storage,
};

/// When passes run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// A single pass
    Once,
    /// Passes separated by `interval`, until an error occurs
    Forever { interval: Duration },
}

impl From<&RunConfig> for Schedule {
    fn from(config: &RunConfig) -> Self {
        if config.once {
            Schedule::Once
        } else {
            Schedule::Forever {
                interval: config.interval,
            }
        }
    }
}

/// Runs reconciliation passes of a local folder with a remote folder
#[derive(Debug)]
pub struct SyncDriver<R, O = LogObserver> {
    storage: Arc<R>,
    observer: O,
    root: DirectoryLevel,
    schedule: Schedule,
}

impl<R> SyncDriver<R>
where
    R: Storage,
{
    pub fn new(storage: Arc<R>, root: DirectoryLevel, schedule: Schedule) -> Self {
        Self::with_observer(storage, root, schedule, LogObserver)
    }
}

impl<R, O> SyncDriver<R, O>
where
    R: Storage,
    O: Observer,
{
    pub fn with_observer(
        storage: Arc<R>,
        root: DirectoryLevel,
        schedule: Schedule,
        observer: O,
    ) -> Self {
        Self {
            storage,
            observer,
            root,
            schedule,
        }
    }

    /// Performs one reconciliation pass of the whole tree.
    pub async fn run_once(&self) -> drivesync::Result<()> {
        log::info!(
            "Synchronizing {} with Drive folder {}",
            self.root.local,
            self.root.remote_id
        );
        let start = Instant::now();

        Reconciler::new(&*self.storage, &self.observer)
            .reconcile(self.root.clone())
            .await?;

        log::info!("Synchronization done in {:.2?}", start.elapsed());
        Ok(())
    }

    /// Runs passes according to the schedule.
    /// Returns after the single pass of [Schedule::Once], or with the first error.
    pub async fn run(&self) -> drivesync::Result<()> {
        match self.schedule {
            Schedule::Once => self.run_once().await,
            Schedule::Forever { interval } => loop {
                self.run_once().await?;
                log::debug!("next synchronization in {interval:?}");
                tokio::time::sleep(interval).await;
            },
        }
    }
}
