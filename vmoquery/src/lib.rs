//! Keyed resource cache and polling scheduler for VMODash
//!
//! This crate is the generic synchronization layer under the VMODash
//! dashboard client. It knows nothing about HTTP or video streams: it
//! manages keyed entries of any cloneable type, decides when they are stale,
//! de-duplicates concurrent fetches, guards against out-of-order responses,
//! and drives interval polling with ref-counted subscriptions.
//!
//! # Features
//!
//! - **Keyed cache**: one [`ResourceCache`] per resource type, entries
//!   addressed by structural [`QueryKey`]s
//! - **Stale-response guard**: fetch completions carry a [`FetchToken`];
//!   only the most recently issued one is applied, so slow responses can
//!   never overwrite newer data
//! - **De-duplication**: concurrent resolutions of one key share a single
//!   network fetch
//! - **Explicit invalidation**: [`ResourceCache::invalidate`] marks entries
//!   stale and revokes in-flight tokens, forcing the next read to re-fetch
//! - **Ref-counted polling**: [`PollingScheduler`] keeps one timer per key
//!   regardless of subscriber count, and stops it when the last
//!   [`PollHandle`] is dropped
//!
//! # Architecture
//!
//! ```text
//! vmoquery (generic)
//!     ├── key.rs     - structural cache keys
//!     ├── cache.rs   - keyed cache, staleness, token guard, resolve()
//!     └── poller.rs  - ref-counted interval timers
//!
//! vmoclient (domain)
//!     └── wires one ResourceCache per dashboard resource to the HTTP client
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use vmoquery::{PollingScheduler, QueryKey, ResourceCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache: ResourceCache<Vec<String>> =
//!         ResourceCache::new("streams", Duration::from_secs(30));
//!     let key = QueryKey::new("streams");
//!
//!     // Read-through resolution: fetches on miss, serves from cache while
//!     // fresh, joins an in-flight fetch instead of duplicating it.
//!     let streams = cache
//!         .resolve(&key, || async { Ok::<_, String>(vec!["front door".to_string()]) })
//!         .await?;
//!     println!("{} streams", streams.len());
//!
//!     // Keep the list refreshed every 30 seconds while subscribed.
//!     let scheduler = PollingScheduler::new();
//!     let refresh = {
//!         let cache = cache.clone();
//!         let key = key.clone();
//!         move || {
//!             let cache = cache.clone();
//!             let key = key.clone();
//!             async move {
//!                 if let Some(token) = cache.begin_fetch(&key) {
//!                     // ... perform the fetch, then:
//!                     cache.complete_fetch(&key, token, Ok(vec![]));
//!                 }
//!             }
//!         }
//!     };
//!     let _handle = scheduler.subscribe(key, Duration::from_secs(30), refresh);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod key;
pub mod poller;

// Re-exports
pub use cache::{FetchStatus, FetchToken, ResourceCache, Snapshot};
pub use error::{QueryError, Result};
pub use key::{KeyPart, QueryKey};
pub use poller::{PollHandle, PollingScheduler};
