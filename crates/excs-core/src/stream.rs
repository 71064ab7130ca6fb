// ── Reactive catalog streams ──
//
// Subscription handle for consuming catalog changes: a refresh or an
// applied push publishes a new immutable snapshot.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Immutable view of one catalog.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// A subscription to a catalog.
///
/// Provides point-in-time snapshot access and change notification via
/// [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct EntityStream<T: Send + Sync + 'static> {
    current: Snapshot<T>,
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Snapshot<T> {
        &self.current
    }

    /// Latest snapshot, which may be newer than `current()`.
    pub fn latest(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the catalog is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> EntityWatchStream<T> {
        EntityWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding each new snapshot.
pub struct EntityWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> Stream for EntityWatchStream<T> {
    type Item = Snapshot<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    #[test]
    fn changed_waits_for_a_publish() {
        let (tx, rx) = watch::channel::<Snapshot<u32>>(Arc::new(Vec::new()));
        let mut stream = EntityStream::new(rx);
        {
            let mut changed = task::spawn(stream.changed());
            assert_pending!(changed.poll());

            tx.send_replace(Arc::new(vec![Arc::new(3)]));
            assert!(changed.is_woken());
            let snap = assert_ready!(changed.poll()).unwrap();
            assert_eq!(*snap[0], 3);
        }
        assert_eq!(stream.current().len(), 1);
    }

    #[tokio::test]
    async fn changed_tracks_latest_snapshot() {
        let (tx, rx) = watch::channel::<Snapshot<u32>>(Arc::new(Vec::new()));
        let mut stream = EntityStream::new(rx);
        assert!(stream.current().is_empty());

        tx.send_replace(Arc::new(vec![Arc::new(1), Arc::new(2)]));
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(stream.current().len(), 2);

        drop(tx);
        assert!(stream.changed().await.is_none());
    }

    #[tokio::test]
    async fn into_stream_yields_snapshots() {
        let (tx, rx) = watch::channel::<Snapshot<u32>>(Arc::new(Vec::new()));
        let mut stream = EntityStream::new(rx).into_stream();

        // WatchStream yields the current value first.
        assert!(stream.next().await.unwrap().is_empty());
        tx.send_replace(Arc::new(vec![Arc::new(7)]));
        assert_eq!(*stream.next().await.unwrap()[0], 7);
    }
}
