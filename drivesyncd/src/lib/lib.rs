use futures::{future, Future};

pub mod driver;
pub mod fingerprint;
pub mod oauth2;
pub mod reconcile;
pub mod storage;

pub use crate::driver::{Schedule, SyncDriver};
pub use crate::reconcile::{DirectoryLevel, LogObserver, Observer, Reconciler};

/// Something holding state worth keeping across runs
pub trait PersistCache {
    fn persist_cache(&self) -> impl Future<Output = anyhow::Result<()>> + Send {
        future::ready(Ok(()))
    }
}
