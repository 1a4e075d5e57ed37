use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::feed::{FeedSource, ParsedItem};
use crate::storage::Database;
use crate::{Error, Result};

use super::tasks::{fetch_next_feed, CycleOutcome};

/// Events emitted by the scheduler after each cycle
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A feed was fetched; carries its items in document order
    FeedFetched {
        feed_name: String,
        feed_url: String,
        items: Vec<ParsedItem>,
    },
    /// A feed could not be fetched or parsed this turn
    FetchFailed { feed_name: String, message: String },
    /// The rotation is empty
    Idle,
}

/// Parse an aggregation interval such as "30s", "1m" or "1h 30m"
pub fn parse_interval(input: &str) -> Result<Duration> {
    let interval = humantime::parse_duration(input.trim())
        .map_err(|e| Error::InvalidArgument(format!("invalid interval '{}': {}", input, e)))?;

    if interval.is_zero() {
        return Err(Error::InvalidArgument(
            "interval must be greater than zero".to_string(),
        ));
    }

    Ok(interval)
}

/// Polling loop that fetches one feed per tick, oldest first
pub struct SchedulerService {
    db: Arc<Database>,
    source: Arc<dyn FeedSource>,
    interval: Duration,
    event_tx: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl SchedulerService {
    pub fn new(db: Arc<Database>, source: Arc<dyn FeedSource>, interval: Duration) -> Self {
        Self {
            db,
            source,
            interval,
            event_tx: None,
        }
    }

    /// Set the event sender for cycle notifications
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, event: SchedulerEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).is_err() {
                warn!("Failed to send scheduler event: receiver dropped");
            }
        }
    }

    /// Fetch cycles until shutdown is signalled.
    ///
    /// The first cycle runs immediately. Shutdown interrupts the wait between
    /// ticks but never an in-flight fetch. Returns an error only when the
    /// store fails, which ends the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if *shutdown.borrow() {
            return Ok(());
        }

        info!("Collecting feeds every {}", humantime::format_duration(self.interval));

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                result = shutdown.changed() => {
                    // A dropped sender can never signal again, so treat it as shutdown
                    if result.is_err() || *shutdown.borrow() {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!("Scheduler stopping on store failure: {}", e);
                        return Err(e);
                    }
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// Run a single fetch cycle and report it
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let outcome = fetch_next_feed(&self.db, self.source.as_ref()).await?;

        match &outcome {
            CycleOutcome::Fetched { feed, parsed } => {
                for item in &parsed.items {
                    debug!("{}: {}", feed.name, item.display_title());
                }
                self.send_event(SchedulerEvent::FeedFetched {
                    feed_name: feed.name.clone(),
                    feed_url: feed.url.clone(),
                    items: parsed.items.clone(),
                });
            }
            CycleOutcome::Failed { feed, error } => {
                self.send_event(SchedulerEvent::FetchFailed {
                    feed_name: feed.name.clone(),
                    message: error.to_string(),
                });
            }
            CycleOutcome::NoFeeds => {
                info!("No feeds to fetch; waiting for the next tick");
                self.send_event(SchedulerEvent::Idle);
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedFetcher, NewFeed, ParsedFeed};
    use crate::storage::{FeedRepository, UserRepository};
    use crate::AppConfig;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tokio::time::timeout;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Serves a one-item feed for every URL, failing those listed in `failing`
    #[derive(Default)]
    struct StubSource {
        failing: HashSet<String>,
        delay: Option<Duration>,
        calls: Mutex<Vec<String>>,
        completed: Mutex<Vec<String>>,
    }

    impl StubSource {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedSource for StubSource {
        async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
            self.calls.lock().unwrap().push(url.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.completed.lock().unwrap().push(url.to_string());

            if self.failing.contains(url) {
                return Err(Error::FetchFailed(format!("HTTP 500 for URL: {}", url)));
            }
            Ok(ParsedFeed {
                title: url.to_string(),
                link: None,
                description: None,
                items: vec![ParsedItem {
                    title: Some(format!("post from {}", url)),
                    link: None,
                    description: None,
                    published_at: None,
                }],
            })
        }
    }

    async fn setup_db(urls: &[&str]) -> Arc<Database> {
        let db = Database::new_in_memory().await.unwrap();
        let user = UserRepository::new(&db).create("agg").await.unwrap();
        let repo = FeedRepository::new(&db);
        for url in urls {
            repo.create(&NewFeed {
                name: url.to_string(),
                url: url.to_string(),
                user_id: user.id,
            })
            .await
            .unwrap();
        }
        Arc::new(db)
    }

    async fn wait_for_calls(source: &StubSource, count: usize) {
        timeout(Duration::from_secs(5), async {
            while source.calls().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("scheduler did not reach the expected number of fetches");
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_interval("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_interval("1h 30m").unwrap(), Duration::from_secs(5400));
    }

    #[test]
    fn test_parse_interval_rejects_bad_input() {
        assert!(matches!(parse_interval("soon"), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse_interval(""), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse_interval("0s"), Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_cycle_with_no_feeds_is_idle() {
        let db = setup_db(&[]).await;
        let source = Arc::new(StubSource::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = SchedulerService::new(db, source.clone(), Duration::from_secs(60))
            .with_event_sender(tx);

        let outcome = scheduler.run_cycle().await.unwrap();

        assert!(matches!(outcome, CycleOutcome::NoFeeds));
        assert!(matches!(rx.recv().await, Some(SchedulerEvent::Idle)));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_still_advances_rotation() {
        let db = setup_db(&["https://a.example/rss", "https://b.example/rss"]).await;
        let source = Arc::new(StubSource {
            failing: HashSet::from(["https://a.example/rss".to_string()]),
            ..Default::default()
        });
        let scheduler = SchedulerService::new(db.clone(), source.clone(), Duration::from_secs(60));

        let first = scheduler.run_cycle().await.unwrap();
        match first {
            CycleOutcome::Failed { feed, error } => {
                assert_eq!(feed.url, "https://a.example/rss");
                assert!(matches!(error, Error::FetchFailed(_)));
            }
            other => panic!("Expected Failed, got {:?}", other),
        }

        let stored = FeedRepository::new(&db)
            .get_by_url("https://a.example/rss")
            .await
            .unwrap();
        assert!(stored.last_fetched_at.is_some());

        let second = scheduler.run_cycle().await.unwrap();
        assert!(
            matches!(second, CycleOutcome::Fetched { ref feed, .. } if feed.url == "https://b.example/rss")
        );
    }

    #[tokio::test]
    async fn test_http_500_through_real_fetcher() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let broken = format!("{}/broken", mock_server.uri());
        let healthy = format!("{}/healthy", mock_server.uri());
        let db = setup_db(&[broken.as_str(), healthy.as_str()]).await;
        let fetcher = Arc::new(FeedFetcher::new(&AppConfig::default()).unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = SchedulerService::new(db.clone(), fetcher, Duration::from_secs(60))
            .with_event_sender(tx);

        scheduler.run_cycle().await.unwrap();
        match rx.recv().await {
            Some(SchedulerEvent::FetchFailed { feed_name, message }) => {
                assert_eq!(feed_name, broken);
                assert!(message.contains("500"));
            }
            other => panic!("Expected FetchFailed event, got {:?}", other),
        }

        let next = FeedRepository::new(&db).peek_next_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.url, healthy);
    }

    #[tokio::test]
    async fn test_first_cycle_runs_immediately() {
        let db = setup_db(&["https://a.example/rss"]).await;
        let source = Arc::new(StubSource::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = SchedulerService::new(db, source.clone(), Duration::from_secs(3600))
            .with_event_sender(tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        match timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
            Some(SchedulerEvent::FeedFetched { feed_url, items, .. }) => {
                assert_eq!(feed_url, "https://a.example/rss");
                assert_eq!(items[0].display_title(), "post from https://a.example/rss");
            }
            other => panic!("Expected FeedFetched event, got {:?}", other),
        }

        // Shutdown interrupts the hour-long wait for the second tick
        shutdown_tx.send(true).unwrap();
        let result = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_rotation_visits_every_feed_once() {
        let urls = ["https://a.example/rss", "https://b.example/rss", "https://c.example/rss"];
        let db = setup_db(&urls).await;
        let source = Arc::new(StubSource::default());
        let scheduler = SchedulerService::new(db, source.clone(), Duration::from_millis(10));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler.run(shutdown_rx));
        wait_for_calls(&source, 3).await;
        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap().unwrap();

        let first_round: Vec<String> = source.calls().into_iter().take(3).collect();
        assert_eq!(first_round, urls);
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_fetch_finish() {
        let db = setup_db(&["https://slow.example/rss"]).await;
        let source = Arc::new(StubSource {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let scheduler = SchedulerService::new(db, source.clone(), Duration::from_secs(3600));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler.run(shutdown_rx));
        wait_for_calls(&source, 1).await;
        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap().unwrap();

        assert_eq!(source.completed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let db = setup_db(&["https://a.example/rss"]).await;
        let source = Arc::new(StubSource::default());
        let scheduler = SchedulerService::new(db, source.clone(), Duration::from_secs(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let result = timeout(Duration::from_secs(1), scheduler.run(shutdown_rx)).await;

        assert!(matches!(result, Ok(Ok(()))));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_loop() {
        let db = setup_db(&[]).await;
        let scheduler = SchedulerService::new(
            db,
            Arc::new(StubSource::default()),
            Duration::from_secs(3600),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        let result = timeout(Duration::from_secs(1), scheduler.run(shutdown_rx)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let db = setup_db(&["https://a.example/rss"]).await;
        db.pool().close().await;
        let source = Arc::new(StubSource::default());
        let scheduler = SchedulerService::new(db, source.clone(), Duration::from_secs(3600));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = timeout(Duration::from_secs(5), scheduler.run(shutdown_rx))
            .await
            .unwrap();

        assert!(matches!(result, Err(Error::Database(_))));
        assert!(source.calls().is_empty());
    }
}
