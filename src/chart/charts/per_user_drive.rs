//! Per-user drive usage chart
//!
//! Grouped by user id. Tracks two cumulative fields side by side: the file
//! count and the total stored bytes, each with add/remove deltas.

use crate::chart::engine::ChartEngine;
use crate::chart::error::ChartResult;
use crate::chart::scheduler::Rollable;
use crate::chart::source::DriveCounts;
use crate::chart::{ChartDefinition, ChartPayload};
use crate::clock::Clock;
use crate::store::{BucketStore, Resolution};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One bucket of the per-user drive chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerUserDrivePayload {
    /// Files stored as of this bucket
    #[serde(default)]
    pub total_count: i64,
    /// Bytes stored as of this bucket
    #[serde(default)]
    pub total_size: i64,
    /// Files added within the bucket
    #[serde(default)]
    pub inc_count: i64,
    /// Bytes added within the bucket
    #[serde(default)]
    pub inc_size: i64,
    /// Files removed within the bucket
    #[serde(default)]
    pub dec_count: i64,
    /// Bytes removed within the bucket
    #[serde(default)]
    pub dec_size: i64,
}

impl ChartPayload for PerUserDrivePayload {
    fn merge(&mut self, delta: &Self) {
        self.total_count += delta.total_count;
        self.total_size += delta.total_size;
        self.inc_count += delta.inc_count;
        self.inc_size += delta.inc_size;
        self.dec_count += delta.dec_count;
        self.dec_size += delta.dec_size;
    }

    fn carry_forward(&self) -> Self {
        Self {
            total_count: self.total_count,
            total_size: self.total_size,
            ..Self::default()
        }
    }
}

/// Chart definition: schema plus seeding rule.
pub struct PerUserDrive {
    source: Arc<dyn DriveCounts>,
}

#[async_trait]
impl ChartDefinition for PerUserDrive {
    const NAME: &'static str = "per_user_drive";
    const GROUPED: bool = true;
    type Payload = PerUserDrivePayload;

    async fn template(
        &self,
        init: bool,
        latest: Option<&PerUserDrivePayload>,
        group: Option<&str>,
    ) -> anyhow::Result<PerUserDrivePayload> {
        let (total_count, total_size) = if init {
            let user_id = group.ok_or_else(|| anyhow::anyhow!("missing user id group key"))?;
            let (count, size) = self.source.count_drive(user_id).await?;
            (count as i64, size as i64)
        } else {
            latest
                .map(|l| (l.total_count, l.total_size))
                .unwrap_or((0, 0))
        };

        Ok(PerUserDrivePayload {
            total_count,
            total_size,
            ..Default::default()
        })
    }
}

/// Per-user drive chart with its typed update entry point.
pub struct PerUserDriveChart {
    engine: ChartEngine<PerUserDrive>,
}

impl PerUserDriveChart {
    pub fn new(store: Arc<dyn BucketStore>, source: Arc<dyn DriveCounts>) -> Self {
        Self {
            engine: ChartEngine::new(PerUserDrive { source }, store),
        }
    }

    pub fn with_clock(
        store: Arc<dyn BucketStore>,
        source: Arc<dyn DriveCounts>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: ChartEngine::with_clock(PerUserDrive { source }, store, clock),
        }
    }

    /// Record a file of `size_bytes` added (`added = true`) or removed for
    /// `user_id`.
    pub async fn update(&self, user_id: &str, size_bytes: u64, added: bool) -> ChartResult<()> {
        let unit = if added { 1 } else { -1 };
        let size = size_bytes as i64;

        let mut delta = PerUserDrivePayload {
            total_count: unit,
            total_size: unit * size,
            ..Default::default()
        };
        if added {
            delta.inc_count = 1;
            delta.inc_size = size;
        } else {
            delta.dec_count = 1;
            delta.dec_size = size;
        }

        self.engine.apply_delta(Some(user_id), &delta).await
    }

    /// Gap-filled series for one user, oldest to newest, length `limit`.
    pub async fn get_chart(
        &self,
        resolution: Resolution,
        limit: usize,
        user_id: &str,
    ) -> ChartResult<Vec<PerUserDrivePayload>> {
        self.engine.get_chart(resolution, limit, Some(user_id)).await
    }
}

#[async_trait]
impl Rollable for PerUserDriveChart {
    fn chart_name(&self) -> &'static str {
        PerUserDrive::NAME
    }

    async fn rollover(&self, resolution: Resolution) -> ChartResult<()> {
        self.engine.rollover(resolution).await
    }
}
