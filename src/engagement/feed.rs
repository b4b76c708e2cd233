use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A live query surface over the store: the latest snapshot of some
/// derived state, re-published by a background refresher. Subscribers get
/// immutable Arc snapshots over a watch channel and unsubscribe by
/// dropping the receiver; the registry itself never tracks listeners.
pub struct Feed<T> {
    tx: watch::Sender<Arc<T>>,
}

impl<T: Send + Sync + 'static> Feed<T> {
    pub fn new(initial: T) -> Arc<Self> {
        let (tx, _) = watch::channel(Arc::new(initial));
        Arc::new(Self { tx })
    }

    pub fn publish(&self, snapshot: T) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    pub fn latest(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

/// Recomputes the feed's snapshot every `period`. A failed recompute keeps
/// the previous snapshot: live views degrade to stale, never to empty.
pub fn spawn_refresher<T, F, Fut>(
    feed: Arc<Feed<T>>,
    period: Duration,
    name: &'static str,
    f: F,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match f().await {
                Ok(snapshot) => feed.publish(snapshot),
                Err(err) => {
                    log::warn!(target: "feed",
                        feed = name;
                        "refresh failed: {}", err,
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[tokio::test(flavor = "current_thread")]
    async fn feed_publishes_snapshots() {
        let feed: Arc<Feed<Vec<i64>>> = Feed::new(Vec::new());
        assert!(feed.latest().is_empty());

        let mut rx = feed.subscribe();
        feed.publish(vec![1, 2, 3]);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow().clone(), vec![1, 2, 3]);
        assert_eq!(*feed.latest(), vec![1, 2, 3]);

        // a dropped receiver just stops listening
        drop(rx);
        feed.publish(vec![4]);
        assert_eq!(*feed.latest(), vec![4]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn refresher_republishes() {
        let feed: Arc<Feed<i64>> = Feed::new(0);
        let counter = Arc::new(AtomicI64::new(0));

        let c = counter.clone();
        let handle = spawn_refresher(feed.clone(), Duration::from_millis(5), "test", move || {
            let c = c.clone();
            async move { Ok(c.fetch_add(1, Ordering::SeqCst) + 1) }
        });

        let mut rx = feed.subscribe();
        rx.changed().await.unwrap();
        let first = *rx.borrow().clone();
        assert!(first >= 1);
        rx.changed().await.unwrap();
        assert!(*rx.borrow().clone() > first);

        handle.abort();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn refresher_keeps_last_snapshot_on_error() {
        let feed: Arc<Feed<i64>> = Feed::new(7);
        let handle = spawn_refresher(feed.clone(), Duration::from_millis(5), "test", || async {
            Err(anyhow::Error::msg("store unreachable"))
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(*feed.latest(), 7);

        handle.abort();
    }
}
