//! Poster pre-fetch worker
//!
//! Keeps the featured-movie poster cache warm so request handling never waits
//! on TMDB. Every pass reconciles today's and tomorrow's records: a record
//! whose poster is still unresolved gets exactly one lookup, and the outcome
//! is written back as terminal state. A failed lookup is recorded as
//! [`PosterRef::Missing`] rather than left unresolved, so later passes do not
//! repeat the external call for a movie TMDB cannot resolve.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{FeaturedMovieRecord, FeaturedMovieRepository, PosterRef};
use crate::services::{TmdbClient, TmdbError};

/// Time between reconciliation passes
const PASS_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

/// Store operations the worker needs
#[async_trait]
pub trait FeaturedMovieStore: Send + Sync {
    async fn get_by_date(&self, date: NaiveDate) -> Result<Option<FeaturedMovieRecord>>;
    async fn update_poster(&self, id: Uuid, poster: &PosterRef) -> Result<()>;
}

#[async_trait]
impl FeaturedMovieStore for FeaturedMovieRepository {
    async fn get_by_date(&self, date: NaiveDate) -> Result<Option<FeaturedMovieRecord>> {
        FeaturedMovieRepository::get_by_date(self, date).await
    }

    async fn update_poster(&self, id: Uuid, poster: &PosterRef) -> Result<()> {
        FeaturedMovieRepository::update_poster(self, id, poster).await
    }
}

/// Poster lookup seam; implemented by the TMDB client
#[async_trait]
pub trait PosterSource: Send + Sync {
    async fn search_poster(&self, title: &str, year: i32) -> Result<String, TmdbError>;
}

#[async_trait]
impl PosterSource for TmdbClient {
    async fn search_poster(&self, title: &str, year: i32) -> Result<String, TmdbError> {
        TmdbClient::search_poster(self, title, year).await
    }
}

/// Background worker that reconciles the poster cache against TMDB
pub struct PosterFetcher {
    store: Arc<dyn FeaturedMovieStore>,
    source: Arc<dyn PosterSource>,
}

impl PosterFetcher {
    pub fn new(store: Arc<dyn FeaturedMovieStore>, source: Arc<dyn PosterSource>) -> Self {
        Self { store, source }
    }

    /// Run the reconciliation loop until cancellation.
    ///
    /// One pass runs immediately on start, then one per interval. Passes
    /// never overlap; the next tick waits for the current pass to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_hours = PASS_INTERVAL.as_secs() / 3600,
            "Starting poster fetcher worker"
        );

        let mut ticker = tokio::time::interval(PASS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Stopping poster fetcher worker");
                    return;
                }
                // The first tick fires immediately, giving the startup pass
                _ = ticker.tick() => {
                    self.run_pass().await;
                }
            }
        }
    }

    /// Reconcile today's and tomorrow's featured movies, in that order.
    ///
    /// A failure on one date never prevents the other from being attempted.
    pub async fn run_pass(&self) {
        let today = Utc::now().date_naive();

        if let Err(e) = self.reconcile_date(today).await {
            warn!(date = %today, error = %e, "Poster reconciliation failed");
        }

        if let Some(tomorrow) = today.succ_opt() {
            if let Err(e) = self.reconcile_date(tomorrow).await {
                warn!(date = %tomorrow, error = %e, "Poster reconciliation failed");
            }
        }
    }

    /// Reconcile a single date's record.
    ///
    /// No-op when the poster is already settled. The worker never creates
    /// records; a date without a featured movie is an error for this pass.
    async fn reconcile_date(&self, date: NaiveDate) -> Result<()> {
        debug!(date = %date, "Reconciling featured movie poster");

        let movie = self
            .store
            .get_by_date(date)
            .await
            .with_context(|| format!("failed to load featured movie for {date}"))?;

        let Some(movie) = movie else {
            anyhow::bail!("no featured movie assigned for {date}");
        };

        if movie.poster.is_settled() {
            debug!(date = %date, title = %movie.title, "Poster already settled, skipping");
            return Ok(());
        }

        info!(date = %date, title = %movie.title, year = movie.year, "Fetching poster from TMDB");

        let poster = match self.source.search_poster(&movie.title, movie.year).await {
            Ok(url) => PosterRef::Resolved(url),
            Err(e) => {
                // Terminal on purpose: record the failure so later passes
                // don't keep hitting TMDB for a movie it cannot resolve
                warn!(date = %date, title = %movie.title, error = %e, "Poster lookup failed, recording as missing");
                PosterRef::Missing
            }
        };

        self.store
            .update_poster(movie.id, &poster)
            .await
            .with_context(|| format!("failed to persist poster for {date}"))?;

        match &poster {
            PosterRef::Resolved(url) => {
                info!(date = %date, title = %movie.title, poster = %url, "Poster cached");
            }
            _ => {
                info!(date = %date, title = %movie.title, "Saved empty poster placeholder");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    struct MockStore {
        records: Mutex<HashMap<NaiveDate, FeaturedMovieRecord>>,
        get_calls: AtomicUsize,
        fail_updates: bool,
    }

    impl MockStore {
        fn new(records: Vec<FeaturedMovieRecord>) -> Self {
            Self {
                records: Mutex::new(records.into_iter().map(|r| (r.date, r)).collect()),
                get_calls: AtomicUsize::new(0),
                fail_updates: false,
            }
        }

        fn poster_for(&self, date: NaiveDate) -> Option<PosterRef> {
            self.records
                .lock()
                .unwrap()
                .get(&date)
                .map(|r| r.poster.clone())
        }
    }

    #[async_trait]
    impl FeaturedMovieStore for MockStore {
        async fn get_by_date(&self, date: NaiveDate) -> Result<Option<FeaturedMovieRecord>> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.lock().unwrap().get(&date).cloned())
        }

        async fn update_poster(&self, id: Uuid, poster: &PosterRef) -> Result<()> {
            if self.fail_updates {
                anyhow::bail!("connection reset");
            }
            let mut records = self.records.lock().unwrap();
            let record = records
                .values_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| anyhow::anyhow!("no record with id {id}"))?;
            record.poster = poster.clone();
            Ok(())
        }
    }

    struct MockSource {
        response: Box<dyn Fn() -> Result<String, TmdbError> + Send + Sync>,
        calls: AtomicUsize,
    }

    impl MockSource {
        fn ok(url: &str) -> Self {
            let url = url.to_string();
            Self {
                response: Box::new(move || Ok(url.clone())),
                calls: AtomicUsize::new(0),
            }
        }

        fn not_found() -> Self {
            Self {
                response: Box::new(|| Err(TmdbError::NoPosterFound)),
                calls: AtomicUsize::new(0),
            }
        }

        fn upstream_error() -> Self {
            Self {
                response: Box::new(|| Err(TmdbError::Status(503))),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PosterSource for MockSource {
        async fn search_poster(&self, _title: &str, _year: i32) -> Result<String, TmdbError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.response)()
        }
    }

    fn record(date: NaiveDate, poster: PosterRef) -> FeaturedMovieRecord {
        FeaturedMovieRecord {
            id: Uuid::new_v4(),
            date,
            title: "Inception".to_string(),
            year: 2010,
            tagline: "Your mind is the scene of the crime".to_string(),
            genres: "Science Fiction".to_string(),
            director: "Christopher Nolan".to_string(),
            actor1: "Leonardo DiCaprio".to_string(),
            actor2: "Joseph Gordon-Levitt".to_string(),
            poster,
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[tokio::test]
    async fn successful_lookup_resolves_the_poster() {
        let store = Arc::new(MockStore::new(vec![record(today(), PosterRef::Unresolved)]));
        let source = Arc::new(MockSource::ok("https://image.tmdb.org/t/p/w500/inception.jpg"));
        let fetcher = PosterFetcher::new(store.clone(), source.clone());

        fetcher.reconcile_date(today()).await.unwrap();

        assert_eq!(
            store.poster_for(today()),
            Some(PosterRef::Resolved(
                "https://image.tmdb.org/t/p/w500/inception.jpg".to_string()
            ))
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolved_poster_is_never_looked_up_again() {
        let store = Arc::new(MockStore::new(vec![record(
            today(),
            PosterRef::Resolved("https://image.tmdb.org/t/p/w500/cached.jpg".to_string()),
        )]));
        let source = Arc::new(MockSource::ok("https://image.tmdb.org/t/p/w500/other.jpg"));
        let fetcher = PosterFetcher::new(store.clone(), source.clone());

        fetcher.reconcile_date(today()).await.unwrap();
        fetcher.reconcile_date(today()).await.unwrap();

        // Unchanged, and no external calls at all
        assert_eq!(
            store.poster_for(today()),
            Some(PosterRef::Resolved(
                "https://image.tmdb.org/t/p/w500/cached.jpg".to_string()
            ))
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_poster_is_never_retried() {
        let store = Arc::new(MockStore::new(vec![record(today(), PosterRef::Missing)]));
        let source = Arc::new(MockSource::ok("https://image.tmdb.org/t/p/w500/late.jpg"));
        let fetcher = PosterFetcher::new(store.clone(), source.clone());

        fetcher.reconcile_date(today()).await.unwrap();
        fetcher.reconcile_date(today()).await.unwrap();

        assert_eq!(store.poster_for(today()), Some(PosterRef::Missing));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_lookup_is_recorded_as_missing() {
        let store = Arc::new(MockStore::new(vec![record(today(), PosterRef::Unresolved)]));
        let source = Arc::new(MockSource::not_found());
        let fetcher = PosterFetcher::new(store.clone(), source.clone());

        fetcher.reconcile_date(today()).await.unwrap();

        // Recorded as missing, not left unresolved
        assert_eq!(store.poster_for(today()), Some(PosterRef::Missing));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn upstream_error_is_recorded_the_same_as_not_found() {
        let store = Arc::new(MockStore::new(vec![record(today(), PosterRef::Unresolved)]));
        let source = Arc::new(MockSource::upstream_error());
        let fetcher = PosterFetcher::new(store.clone(), source.clone());

        fetcher.reconcile_date(today()).await.unwrap();

        assert_eq!(store.poster_for(today()), Some(PosterRef::Missing));
    }

    #[tokio::test]
    async fn missing_record_does_not_stop_the_other_date() {
        // Only tomorrow has a featured movie; today's store miss must not
        // prevent tomorrow's reconciliation
        let tomorrow = today().succ_opt().unwrap();
        let store = Arc::new(MockStore::new(vec![record(tomorrow, PosterRef::Unresolved)]));
        let source = Arc::new(MockSource::ok("https://image.tmdb.org/t/p/w500/next.jpg"));
        let fetcher = PosterFetcher::new(store.clone(), source.clone());

        fetcher.run_pass().await;

        assert_eq!(
            store.poster_for(tomorrow),
            Some(PosterRef::Resolved(
                "https://image.tmdb.org/t/p/w500/next.jpg".to_string()
            ))
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persist_failure_surfaces_but_does_not_panic() {
        let mut store = MockStore::new(vec![record(today(), PosterRef::Unresolved)]);
        store.fail_updates = true;
        let store = Arc::new(store);
        let source = Arc::new(MockSource::ok("https://image.tmdb.org/t/p/w500/lost.jpg"));
        let fetcher = PosterFetcher::new(store.clone(), source.clone());

        let err = fetcher.reconcile_date(today()).await.unwrap_err();
        assert!(err.to_string().contains("failed to persist poster"));

        // run_pass swallows the error; the loop stays alive
        fetcher.run_pass().await;
    }

    #[tokio::test(start_paused = true)]
    async fn loop_runs_passes_on_the_interval_and_stops_on_cancel() {
        let store = Arc::new(MockStore::new(vec![]));
        let source = Arc::new(MockSource::ok("unused"));
        let shutdown = CancellationToken::new();
        let fetcher = PosterFetcher::new(store.clone(), source.clone());

        let handle = tokio::spawn(fetcher.run(shutdown.clone()));

        // Startup pass: two dates loaded
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 2);

        // One interval later, a second pass has run
        tokio::time::sleep(PASS_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 4);

        shutdown.cancel();
        handle.await.unwrap();

        // No further passes after cancellation
        tokio::time::sleep(2 * PASS_INTERVAL).await;
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 4);
    }
}
