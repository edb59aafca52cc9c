//! SQLite-backed application log store.
//!
//! Captures `tracing` events into a queryable SQLite table and keeps the
//! table's size bounded with scheduled retention.
//!
//! # Architecture
//!
//! ```text
//! tracing events ──► SqliteLogLayer ──► channel ──► writer task ──► LogStore
//!                                                                      │
//! cron scheduler ──► cleanup(store, policy) ──► delete oldest rows ◄───┘
//! ```
//!
//! The store is an explicit handle: callers open it, clone it into whatever
//! needs it, and close it on shutdown. Nothing in this crate touches global
//! state beyond the `tracing` subscriber the caller installs.
//!
//! # Example
//!
//! ```ignore
//! use logstore::{LogStore, RetentionPolicy, SqliteLogLayer};
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! let store = LogStore::open("sqlite:logs.db?mode=rwc").await?;
//! let (layer, pump) = SqliteLogLayer::attach(store.clone());
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(layer)
//!     .init();
//!
//! let scheduler = logstore::start_retention_scheduler(
//!     store.clone(),
//!     RetentionPolicy::default(),
//!     logstore::DEFAULT_SCHEDULE,
//! )
//! .await?;
//! ```

pub mod entry;
pub mod error;
pub mod layer;
pub mod retention;
pub mod schedule;
pub mod store;

pub use entry::{LogEntry, LogLevel, NewLogEntry};
pub use error::{Result, ScheduleError, StoreError};
pub use layer::{LogPump, SqliteLogLayer};
pub use retention::{cleanup, CleanupOutcome, RetentionPolicy};
pub use schedule::{start_retention_scheduler, DEFAULT_SCHEDULE};
pub use store::LogStore;
