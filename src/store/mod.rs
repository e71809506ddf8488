//! Bucket store: durable keyed storage for chart buckets
//!
//! One row per `(chart, resolution, group, bucket_start)` identity, holding
//! the chart's schema-specific payload as a JSON document. The store carries
//! no aggregation logic; the only concurrency primitive the engine relies on
//! is the conditional insert (`insert_if_absent`), which resolves seeding
//! races to exactly one winning row.

pub mod error;
pub mod sqlite;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteBucketStore;
pub use types::{BucketKey, BucketRow, Resolution};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Keyed upsert/read store for chart buckets.
///
/// Implementations must treat the full `BucketKey` tuple as unique and keep
/// each `(chart, resolution, group)` series ordered by `bucket_start`.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Fetch the payload stored for an exact bucket identity.
    async fn get(&self, key: &BucketKey) -> StoreResult<Option<Value>>;

    /// Insert a seed payload only if no row exists for the identity yet.
    ///
    /// Returns `true` when this call created the row, `false` when a
    /// concurrent writer already won the seeding race.
    async fn insert_if_absent(&self, key: &BucketKey, payload: &Value) -> StoreResult<bool>;

    /// Write the payload for a bucket, replacing any existing row.
    async fn put(&self, key: &BucketKey, payload: &Value) -> StoreResult<()>;

    /// The newest bucket of the series strictly before `before`, if any.
    async fn latest_before(
        &self,
        chart: &str,
        resolution: Resolution,
        group: Option<&str>,
        before: DateTime<Utc>,
    ) -> StoreResult<Option<BucketRow>>;

    /// Up to `limit` buckets of the series with `bucket_start <= until`,
    /// newest first. Bounded by `limit`; never an unbounded scan.
    async fn list_until(
        &self,
        chart: &str,
        resolution: Resolution,
        group: Option<&str>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<BucketRow>>;

    /// All group keys that have a bucket at exactly `bucket_start`.
    ///
    /// Ungrouped rows are reported as `None`.
    async fn groups_at(
        &self,
        chart: &str,
        resolution: Resolution,
        bucket_start: DateTime<Utc>,
    ) -> StoreResult<Vec<Option<String>>>;
}
