//! Example: One-shot snapshot of the monitoring backend
//!
//! Run with: cargo run -p vmoclient --example dashboard_snapshot
//! Point it at another backend with: VMODASH_API_URL=http://host:8000

use vmoclient::{DashboardStore, SystemHealth};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let store = DashboardStore::new()?;
    println!("Backend: {}\n", store.client().base_url());

    let health = store.client().health().await?;
    println!("Health: {}", health.status);

    let summary = store.dashboard_summary().await?;
    println!(
        "Streams: {} total, {} active",
        summary.total_streams, summary.active_streams
    );
    println!(
        "Activity: {} events in 24h, {} analytics samples in 1h",
        summary.recent_events_24h, summary.recent_analytics_1h
    );

    // Stream list with the running state overlaid from system status
    println!("\nStreams:");
    let streams = store.streams().await?;
    for stream in &streams {
        let state = if stream.is_running {
            "running"
        } else if stream.is_active {
            "stopped"
        } else {
            "inactive"
        };
        println!(
            "  [{}] {} ({}) {} - {}",
            stream.stream_id, stream.stream_name, stream.stream_type, state, stream.stream_url
        );
    }

    // System health from the newest metric sample; the store returns
    // samples oldest-first, so the newest is last
    let metrics = store.system_metrics(1).await?;
    if let Some(latest) = metrics.last() {
        let health = SystemHealth::from_latest(latest);
        println!(
            "\nSystem: {} (cpu {:.1}%, mem {:.1}%, disk {:.1}%)",
            health.label(),
            latest.cpu_usage,
            latest.memory_usage,
            latest.disk_usage
        );
    }

    // Newest events across every stream
    println!("\nRecent events:");
    let events = store.recent_events().await?;
    if events.is_empty() {
        println!("  (none)");
    }
    for event in &events {
        print!(
            "  {} {} {}",
            event.record.event_time.format("%H:%M:%S"),
            event.stream_name,
            event.record.event_type
        );
        if let Some(confidence) = event.record.confidence {
            print!(" ({:.0}%)", confidence * 100.0);
        }
        if let Some(thumbnail) = event.thumbnail_url(store.client()) {
            print!(" {}", thumbnail);
        }
        println!();
    }

    Ok(())
}
