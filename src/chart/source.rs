//! Authoritative source-of-truth queries
//!
//! Chart templates consult these traits exactly once per series, when the
//! very first bucket is seeded: the live count anchors the cumulative total
//! so that activity predating the chart is reflected instead of starting
//! from zero. Implementations query primary storage and must return a real
//! count or fail explicitly - a failed count aborts the seeding, it is never
//! substituted with zero.

use async_trait::async_trait;

/// Live note counts behind the per-user notes chart.
#[async_trait]
pub trait NoteCounts: Send + Sync {
    /// Number of notes currently attributed to the user.
    async fn count_notes(&self, user_id: &str) -> anyhow::Result<u64>;
}

/// Live federation counts behind the federation chart.
#[async_trait]
pub trait InstanceCounts: Send + Sync {
    /// Number of remote instances currently known.
    async fn count_instances(&self) -> anyhow::Result<u64>;
}

/// Live drive usage behind the per-user drive chart.
#[async_trait]
pub trait DriveCounts: Send + Sync {
    /// Current file count and total size in bytes stored for the user.
    async fn count_drive(&self, user_id: &str) -> anyhow::Result<(u64, u64)>;
}
