use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use assay_common::config::CrawlerConfig;
use assay_inventory::{InventoryKind, InventoryStore, SnapshotMetadata};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{CrawlError, CrawlResult, SkippedEntry, TopologyWarning};

/// The rows produced by one fetch, together with everything that was
/// left out or resolved along the way.
#[derive(Debug, Clone)]
pub struct Fetched<R> {
    pub rows: Vec<R>,
    pub skipped: Vec<SkippedEntry>,
    pub warnings: Vec<TopologyWarning>,
}

impl<R> Fetched<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self {
            rows,
            skipped: vec![],
            warnings: vec![],
        }
    }
}

/// Enumerates a metadata source into rows of type `R`.
///
/// Implementations should check `cancel` between units of work and return
/// [`CrawlError::Cancelled`] once it fires.
#[async_trait::async_trait]
pub trait Fetch<R>: Send + Sync {
    async fn fetch(&self, cancel: &CancellationToken) -> CrawlResult<Fetched<R>>;
}

/// Adapts an async closure into a [`Fetch`] implementation.
pub struct FetchFn<F>(pub F);

#[async_trait::async_trait]
impl<R, F, Fut> Fetch<R> for FetchFn<F>
where
    R: Send + 'static,
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = CrawlResult<Fetched<R>>> + Send,
{
    async fn fetch(&self, cancel: &CancellationToken) -> CrawlResult<Fetched<R>> {
        (self.0)(cancel.clone()).await
    }
}

#[derive(Debug, Clone)]
pub struct CrawlPolicy {
    /// Snapshots younger than this are reused without fetching.
    pub max_age: Duration,
    pub force_refresh: bool,
}

impl CrawlPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_age: config.max_age(),
            force_refresh: config.force_refresh,
        }
    }
}

impl Default for CrawlPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(86400),
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Pending,
    Fetching,
    Fetched,
    /// The fetch failed and the previous snapshot was served instead.
    Degraded,
    Failed,
}

impl CrawlState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CrawlState::Fetched | CrawlState::Degraded | CrawlState::Failed
        )
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOutcome<R> {
    pub rows: Vec<R>,
    pub state: CrawlState,
    /// Whether the rows came from a fresh snapshot without fetching.
    pub reused: bool,
    pub skipped: Vec<SkippedEntry>,
    pub warnings: Vec<TopologyWarning>,
    pub metadata: SnapshotMetadata,
    /// The fetch failure behind a degraded outcome.
    pub cause: Option<String>,
}

/// Cache-or-fetch logic shared by every inventory kind.
///
/// Cycles of one crawler never overlap: a caller arriving while a cycle is
/// running waits for it and then decides on its own whether to reuse the
/// snapshot it produced.
pub struct CrawlerBase<R> {
    kind: InventoryKind,
    policy: CrawlPolicy,
    store: Arc<InventoryStore>,
    fetcher: Arc<dyn Fetch<R>>,
    state: watch::Sender<CrawlState>,
    running: Mutex<()>,
    /// Each cycle fetches under a child of this token.
    shutdown: CancellationToken,
}

impl<R> CrawlerBase<R>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        kind: InventoryKind,
        policy: CrawlPolicy,
        store: Arc<InventoryStore>,
        fetcher: Arc<dyn Fetch<R>>,
    ) -> Self {
        let (state, _) = watch::channel(CrawlState::Pending);
        Self {
            kind,
            policy,
            store,
            fetcher,
            state,
            running: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn kind(&self) -> InventoryKind {
        self.kind
    }

    pub fn policy(&self) -> &CrawlPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<InventoryStore> {
        &self.store
    }

    pub fn state(&self) -> CrawlState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CrawlState> {
        self.state.subscribe()
    }

    /// Waits until the current cycle reaches a terminal state.
    /// Returns immediately if the last cycle has already finished,
    /// and never returns while no cycle has been started.
    pub async fn wait_terminal(&self) -> CrawlState {
        let mut receiver = self.state.subscribe();
        let state = receiver.wait_for(|x| x.is_terminal()).await.map(|x| *x);
        state.unwrap_or_else(|_| self.state())
    }

    /// Cancels the fetch in progress and every later cycle of this crawler.
    /// A cancelled crawler serves its previous snapshot, if any, and never
    /// saves again.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn snapshot(&self) -> CrawlResult<CrawlOutcome<R>> {
        self.snapshot_with(self.policy.force_refresh).await
    }

    pub async fn snapshot_with(&self, force_refresh: bool) -> CrawlResult<CrawlOutcome<R>> {
        let _running = self.running.lock().await;
        self.run_cycle(force_refresh).await
    }

    async fn run_cycle(&self, force_refresh: bool) -> CrawlResult<CrawlOutcome<R>> {
        if self.shutdown.is_cancelled() {
            return self.degrade(CrawlError::Cancelled(self.kind)).await;
        }
        if !force_refresh && self.store.is_fresh(self.kind, self.policy.max_age).await? {
            if let Some(snapshot) = self.store.load_snapshot::<R>(self.kind).await? {
                debug!(
                    "reusing fresh {} snapshot {}",
                    self.kind, snapshot.metadata.id
                );
                self.state.send_replace(CrawlState::Fetched);
                return Ok(CrawlOutcome {
                    rows: snapshot.rows,
                    state: CrawlState::Fetched,
                    reused: true,
                    skipped: vec![],
                    warnings: vec![],
                    metadata: snapshot.metadata,
                    cause: None,
                });
            }
        }

        let cancel = self.shutdown.child_token();
        self.state.send_replace(CrawlState::Fetching);
        info!("crawling {}", self.kind);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CrawlError::Cancelled(self.kind)),
            result = self.fetcher.fetch(&cancel) => result,
        };

        match result {
            Ok(fetched) => self.commit(fetched).await,
            Err(e) => self.degrade(e).await,
        }
    }

    /// Returns the rows of the latest cycle for use by a derived inventory.
    /// Runs a cycle first if none has started, and waits for one in progress.
    /// Concurrent joiners share a single cycle.
    pub async fn join_rows(&self) -> CrawlResult<Vec<R>> {
        {
            let _running = self.running.lock().await;
            if self.state() == CrawlState::Pending {
                return Ok(self.run_cycle(self.policy.force_refresh).await?.rows);
            }
        }
        if self.wait_terminal().await == CrawlState::Failed {
            return Err(CrawlError::MissingUpstream(self.kind));
        }
        match self.store.load_snapshot::<R>(self.kind).await? {
            Some(snapshot) => Ok(snapshot.rows),
            None => Err(CrawlError::MissingUpstream(self.kind)),
        }
    }

    async fn commit(&self, fetched: Fetched<R>) -> CrawlResult<CrawlOutcome<R>> {
        for entry in &fetched.skipped {
            warn!("{}: {entry}", self.kind);
        }
        for warning in &fetched.warnings {
            warn!("{}: {warning}", self.kind);
        }
        let metadata = match self
            .store
            .save_with_skipped(self.kind, &fetched.rows, fetched.skipped.len())
            .await
        {
            Ok(x) => x,
            Err(e) => {
                self.state.send_replace(CrawlState::Failed);
                return Err(e.into());
            }
        };
        info!(
            "crawled {} rows of {} ({} skipped)",
            metadata.row_count, self.kind, metadata.skipped
        );
        self.state.send_replace(CrawlState::Fetched);
        Ok(CrawlOutcome {
            rows: fetched.rows,
            state: CrawlState::Fetched,
            reused: false,
            skipped: fetched.skipped,
            warnings: fetched.warnings,
            metadata,
            cause: None,
        })
    }

    async fn degrade(&self, error: CrawlError) -> CrawlResult<CrawlOutcome<R>> {
        let previous = match self.store.load_snapshot::<R>(self.kind).await {
            Ok(x) => x,
            Err(e) => {
                warn!("failed to read previous {} snapshot: {e}", self.kind);
                None
            }
        };
        let Some(previous) = previous else {
            self.state.send_replace(CrawlState::Failed);
            return Err(error);
        };
        warn!(
            "crawl of {} failed, serving snapshot {} from {}: {error}",
            self.kind, previous.metadata.id, previous.metadata.crawled_at
        );
        self.state.send_replace(CrawlState::Degraded);
        Ok(CrawlOutcome {
            rows: previous.rows,
            state: CrawlState::Degraded,
            reused: false,
            skipped: vec![],
            warnings: vec![],
            metadata: previous.metadata,
            cause: Some(error.to_string()),
        })
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::error::SourceError;

    struct Counting {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    impl Counting {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            })
        }
    }

    #[async_trait::async_trait]
    impl Fetch<String> for Counting {
        async fn fetch(&self, _cancel: &CancellationToken) -> CrawlResult<Fetched<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::unavailable("metastore is down").into());
            }
            Ok(Fetched::new(vec![format!("row-{n}")]))
        }
    }

    fn crawler(fetcher: Arc<Counting>, max_age: Duration) -> CrawlerBase<String> {
        CrawlerBase::new(
            InventoryKind::Tables,
            CrawlPolicy {
                max_age,
                force_refresh: false,
            },
            Arc::new(InventoryStore::memory()),
            fetcher,
        )
    }

    #[tokio::test]
    async fn test_reuses_fresh_snapshot() {
        let fetcher = Counting::new();
        let crawler = crawler(fetcher.clone(), Duration::from_secs(3600));
        assert_eq!(crawler.state(), CrawlState::Pending);

        let first = crawler.snapshot().await.unwrap();
        assert_eq!(first.state, CrawlState::Fetched);
        assert!(!first.reused);
        let second = crawler.snapshot().await.unwrap();
        assert!(second.reused);
        assert_eq!(second.rows, first.rows);
        assert_eq!(second.metadata.id, first.metadata.id);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_max_age_always_fetches() {
        let fetcher = Counting::new();
        let crawler = crawler(fetcher.clone(), Duration::ZERO);
        crawler.snapshot().await.unwrap();
        let second = crawler.snapshot().await.unwrap();
        assert!(!second.reused);
        assert_eq!(second.rows, vec!["row-1"]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forced_refresh_fetches() {
        let fetcher = Counting::new();
        let crawler = crawler(fetcher.clone(), Duration::from_secs(3600));
        crawler.snapshot().await.unwrap();
        let forced = crawler.snapshot_with(true).await.unwrap();
        assert!(!forced.reused);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_degrades_to_previous_snapshot() {
        let fetcher = Counting::new();
        let crawler = crawler(fetcher.clone(), Duration::ZERO);
        let first = crawler.snapshot().await.unwrap();

        fetcher.failing.store(true, Ordering::SeqCst);
        let degraded = crawler.snapshot().await.unwrap();
        assert_eq!(degraded.state, CrawlState::Degraded);
        assert_eq!(degraded.rows, first.rows);
        assert_eq!(degraded.metadata.id, first.metadata.id);
        assert!(degraded.cause.unwrap().contains("metastore is down"));
        assert_eq!(crawler.state(), CrawlState::Degraded);
    }

    #[tokio::test]
    async fn test_fails_without_previous_snapshot() {
        let fetcher = Counting::new();
        fetcher.failing.store(true, Ordering::SeqCst);
        let crawler = crawler(fetcher, Duration::from_secs(3600));
        let result = crawler.snapshot().await;
        assert!(matches!(result, Err(CrawlError::SourceUnavailable(_))));
        assert_eq!(crawler.wait_terminal().await, CrawlState::Failed);
    }

    #[tokio::test]
    async fn test_join_rows() {
        let fetcher = Counting::new();
        let crawler = crawler(fetcher.clone(), Duration::ZERO);
        assert_eq!(crawler.join_rows().await.unwrap(), vec!["row-0"]);
        // a finished cycle is joined without fetching again
        assert_eq!(crawler.join_rows().await.unwrap(), vec!["row-0"]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let failing = Counting::new();
        failing.failing.store(true, Ordering::SeqCst);
        let crawler = self::crawler(failing, Duration::ZERO);
        assert!(crawler.join_rows().await.is_err());
        assert!(matches!(
            crawler.join_rows().await,
            Err(CrawlError::MissingUpstream(InventoryKind::Tables))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_share_one_cycle() {
        let fetcher = Counting::new();
        let crawler = Arc::new(crawler(fetcher.clone(), Duration::ZERO));
        let handles = (0..4)
            .map(|_| {
                let crawler = crawler.clone();
                tokio::spawn(async move { crawler.join_rows().await })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), vec!["row-0"]);
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let (a, b) = tokio::join!(crawler.snapshot(), crawler.snapshot());
        assert_eq!(a.unwrap().rows, vec!["row-1"]);
        assert_eq!(b.unwrap().rows, vec!["row-2"]);
    }

    #[tokio::test]
    async fn test_cancel_before_cycle() {
        let fetcher = Counting::new();
        let crawler = crawler(fetcher.clone(), Duration::ZERO);
        crawler.cancel();
        assert!(crawler.is_cancelled());
        assert!(matches!(
            crawler.snapshot().await,
            Err(CrawlError::Cancelled(InventoryKind::Tables))
        ));
        assert_eq!(crawler.state(), CrawlState::Failed);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

        let fetcher = Counting::new();
        let crawler = self::crawler(fetcher.clone(), Duration::ZERO);
        let first = crawler.snapshot().await.unwrap();
        crawler.cancel();
        let outcome = crawler.snapshot().await.unwrap();
        assert_eq!(outcome.state, CrawlState::Degraded);
        assert_eq!(outcome.metadata.id, first.metadata.id);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_discards_progress() {
        let store = Arc::new(InventoryStore::memory());
        let fetcher = FetchFn(|cancel: CancellationToken| async move {
            cancel.cancelled().await;
            Ok::<_, CrawlError>(Fetched::new(vec!["partial".to_string()]))
        });
        let crawler = Arc::new(CrawlerBase::<String>::new(
            InventoryKind::Mounts,
            CrawlPolicy::default(),
            store.clone(),
            Arc::new(fetcher),
        ));

        let handle = tokio::spawn({
            let crawler = crawler.clone();
            async move { crawler.snapshot().await }
        });
        let mut states = crawler.subscribe();
        states
            .wait_for(|x| *x == CrawlState::Fetching)
            .await
            .unwrap();
        crawler.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(CrawlError::Cancelled(InventoryKind::Mounts))
        ));
        assert_eq!(crawler.state(), CrawlState::Failed);
        assert!(store
            .metadata(InventoryKind::Mounts)
            .await
            .unwrap()
            .is_none());
    }
}
