//! # Tally
//!
//! Event-driven time-series chart aggregation engine: domain events are
//! folded into hourly and daily buckets holding running cumulative totals
//! alongside per-bucket deltas, grouped per entity where a chart calls for
//! it, and served back as gap-filled series.
//!
//! ## Features
//!
//! - **Fixed-resolution buckets**: hourly and daily, truncated on UTC
//!   boundaries
//! - **Cumulative + delta fields**: totals carry forward across periods,
//!   deltas reset each bucket
//! - **Per-entity grouping**: one independent series per group key
//! - **Source-of-truth seeding**: brand-new series anchor their totals on a
//!   live authoritative count, never on zero
//! - **Gap-filled reads**: missing periods are synthesized by carrying the
//!   nearest snapshot with zeroed deltas
//!
//! ## Modules
//!
//! - [`store`]: keyed bucket storage (SQLite-backed)
//! - [`chart`]: generic engine, concrete charts, scheduler, registry
//! - [`api`]: REST facade with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tally::chart::charts::{NoteKind, PerUserNotesChart};
//! use tally::chart::source::NoteCounts;
//! use tally::store::{BucketStore, Resolution, SqliteBucketStore};
//!
//! struct MyNoteCounts;
//!
//! #[async_trait::async_trait]
//! impl NoteCounts for MyNoteCounts {
//!     async fn count_notes(&self, _user_id: &str) -> anyhow::Result<u64> {
//!         // Count against primary storage here.
//!         Ok(0)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store: Arc<dyn BucketStore> = Arc::new(SqliteBucketStore::open("buckets.db")?);
//!     let chart = PerUserNotesChart::new(store, Arc::new(MyNoteCounts));
//!
//!     // Domain event: a user posted a note.
//!     chart.update("user1", NoteKind::Normal, true).await?;
//!
//!     // Last 24 hours, gap-filled, oldest to newest.
//!     let series = chart.get_chart(Resolution::Hour, 24, "user1").await?;
//!     println!("note totals: {:?}", series.iter().map(|p| p.total).collect::<Vec<_>>());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod chart;
pub mod clock;
pub mod config;
pub mod store;

// Re-export top-level types for convenience
pub use store::{BucketKey, BucketRow, BucketStore, Resolution, SqliteBucketStore, StoreError, StoreResult};

pub use chart::{
    ChartDefinition, ChartEngine, ChartError, ChartPayload, ChartRegistry, ChartResult,
    ChartSources, ResolutionScheduler, Rollable, MAX_CHART_LIMIT,
};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use clock::{Clock, ManualClock, SystemClock};

pub use config::{Config, ConfigError};
