//! Chart engine: event-driven time-series aggregation
//!
//! A chart folds domain events into hourly and daily buckets. Each bucket
//! holds a running cumulative total plus per-bucket deltas; grouped charts
//! keep one series per group key (e.g. per user). The pieces:
//!
//! - [`ChartDefinition`]: per-chart schema + seeding logic
//! - [`engine::ChartEngine`]: generic bucket lifecycle and concurrency control
//! - [`charts`]: the concrete chart definitions
//! - [`scheduler::ResolutionScheduler`]: periodic rollover into fresh buckets
//! - [`registry::ChartRegistry`]: one constructed instance of every chart

pub mod charts;
pub mod engine;
pub mod error;
pub mod payload;
pub mod registry;
pub mod scheduler;
pub mod source;

pub use engine::ChartEngine;
pub use error::{ChartError, ChartResult};
pub use payload::ChartPayload;
pub use registry::{ChartRegistry, ChartSources};
pub use scheduler::{ResolutionScheduler, Rollable};

use async_trait::async_trait;

/// Upper bound on the number of buckets a single chart query may return.
pub const MAX_CHART_LIMIT: usize = 500;

/// One concrete chart: a payload schema plus the seeding rule for fresh
/// buckets. Update entry points live on the wrapper structs in [`charts`],
/// which translate domain events into typed deltas.
#[async_trait]
pub trait ChartDefinition: Send + Sync + 'static {
    /// Stable chart name, used as the row key prefix in the bucket store.
    const NAME: &'static str;

    /// Whether buckets are partitioned by a group key.
    const GROUPED: bool;

    /// Schema of one bucket.
    type Payload: ChartPayload;

    /// Compute the seed payload for a brand-new bucket.
    ///
    /// `init` is true only when no bucket exists for this series at all; the
    /// implementation must then derive cumulative fields from the
    /// authoritative source of truth (never default them to zero). Otherwise
    /// `latest` holds the previous period's payload and cumulative fields are
    /// carried forward with deltas zeroed. Errors propagate to the caller of
    /// the triggering update.
    async fn template(
        &self,
        init: bool,
        latest: Option<&Self::Payload>,
        group: Option<&str>,
    ) -> anyhow::Result<Self::Payload>;
}
