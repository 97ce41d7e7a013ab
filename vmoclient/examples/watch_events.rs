//! Example: Poll the cross-stream event timeline in the background
//!
//! Run with: cargo run -p vmoclient --example watch_events
//! Or filtered by type: cargo run -p vmoclient --example watch_events -- person_detected

use std::env;
use std::time::Duration;

use vmoclient::{DashboardStore, EventFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Optional event type filter from the command line
    let filter = match env::args().nth(1) {
        Some(kind) => EventFilter::new().event_type(kind),
        None => EventFilter::new(),
    };

    let store = DashboardStore::new()?;
    println!("Backend: {}", store.client().base_url());
    println!("Watching {} for 60 seconds...\n", filter.query_key());

    // First read fills the cache, the handle keeps it fresh in the background
    let events = store.events(&filter).await?;
    println!("Timeline holds {} events", events.len());
    let _handle = store.watch_events(filter.clone());

    for _ in 0..12 {
        tokio::time::sleep(Duration::from_secs(5)).await;

        let snapshot = store.peek_events(&filter);
        let Some(timeline) = snapshot.value else {
            println!("no data yet ({})", snapshot.status);
            continue;
        };
        match timeline.first() {
            Some(newest) => println!(
                "{} events, newest: {} {} {}",
                timeline.len(),
                newest.record.event_time.format("%H:%M:%S"),
                newest.stream_name,
                newest.record.event_type
            ),
            None => println!("no events in the window"),
        }
    }

    Ok(())
}
