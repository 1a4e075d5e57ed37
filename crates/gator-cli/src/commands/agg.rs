use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::info;

use gator_core::{
    feed::FeedFetcher,
    scheduler::{SchedulerEvent, SchedulerService},
};

use super::State;

/// Fetch feeds one per `interval` until Ctrl+C, printing item titles
pub async fn run(state: &State, interval: Duration) -> Result<()> {
    let fetcher = Arc::new(FeedFetcher::new(&state.config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    println!("Collecting feeds every {:?}. Press Ctrl+C to stop.", interval);

    let scheduler = SchedulerService::new(state.db.clone(), fetcher, interval)
        .with_event_sender(event_tx);

    // The scheduler owns the event sender, so the printer drains and exits once it returns
    let result = scheduler.run(shutdown_rx).await;
    printer.await?;
    result?;

    println!("Stopped collecting feeds.");
    Ok(())
}

fn print_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::FeedFetched {
            feed_name, items, ..
        } => {
            println!("{} ({} items)", feed_name, items.len());
            for item in items {
                println!("  * {}", item.display_title());
            }
        }
        SchedulerEvent::FetchFailed { feed_name, message } => {
            eprintln!("Could not fetch '{}': {}", feed_name, message);
        }
        SchedulerEvent::Idle => {}
    }
}
