//! Federation activity chart
//!
//! Ungrouped, instance-wide. Tracks how many remote instances this server
//! federates with, with per-bucket join/leave deltas.

use crate::chart::engine::ChartEngine;
use crate::chart::error::ChartResult;
use crate::chart::scheduler::Rollable;
use crate::chart::source::InstanceCounts;
use crate::chart::{ChartDefinition, ChartPayload};
use crate::clock::Clock;
use crate::store::{BucketStore, Resolution};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One bucket of the federation chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FederationPayload {
    /// Known remote instances as of this bucket
    #[serde(default)]
    pub total: i64,
    /// Instances first seen within the bucket
    #[serde(default)]
    pub inc: i64,
    /// Instances dropped within the bucket
    #[serde(default)]
    pub dec: i64,
}

impl ChartPayload for FederationPayload {
    fn merge(&mut self, delta: &Self) {
        self.total += delta.total;
        self.inc += delta.inc;
        self.dec += delta.dec;
    }

    fn carry_forward(&self) -> Self {
        Self {
            total: self.total,
            ..Self::default()
        }
    }
}

/// Chart definition: schema plus seeding rule.
pub struct Federation {
    source: Arc<dyn InstanceCounts>,
}

#[async_trait]
impl ChartDefinition for Federation {
    const NAME: &'static str = "federation";
    const GROUPED: bool = false;
    type Payload = FederationPayload;

    async fn template(
        &self,
        init: bool,
        latest: Option<&FederationPayload>,
        _group: Option<&str>,
    ) -> anyhow::Result<FederationPayload> {
        let total = if init {
            self.source.count_instances().await? as i64
        } else {
            latest.map(|l| l.total).unwrap_or(0)
        };

        Ok(FederationPayload {
            total,
            ..Default::default()
        })
    }
}

/// Federation chart with its typed update entry point.
pub struct FederationChart {
    engine: ChartEngine<Federation>,
}

impl FederationChart {
    pub fn new(store: Arc<dyn BucketStore>, source: Arc<dyn InstanceCounts>) -> Self {
        Self {
            engine: ChartEngine::new(Federation { source }, store),
        }
    }

    pub fn with_clock(
        store: Arc<dyn BucketStore>,
        source: Arc<dyn InstanceCounts>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: ChartEngine::with_clock(Federation { source }, store, clock),
        }
    }

    /// Record an instance joining (`joined = true`) or leaving federation.
    pub async fn update(&self, joined: bool) -> ChartResult<()> {
        let delta = FederationPayload {
            total: if joined { 1 } else { -1 },
            inc: i64::from(joined),
            dec: i64::from(!joined),
        };

        self.engine.apply_delta(None, &delta).await
    }

    /// Gap-filled series, oldest to newest, length `limit`.
    pub async fn get_chart(
        &self,
        resolution: Resolution,
        limit: usize,
    ) -> ChartResult<Vec<FederationPayload>> {
        self.engine.get_chart(resolution, limit, None).await
    }
}

#[async_trait]
impl Rollable for FederationChart {
    fn chart_name(&self) -> &'static str {
        Federation::NAME
    }

    async fn rollover(&self, resolution: Resolution) -> ChartResult<()> {
        self.engine.rollover(resolution).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteBucketStore;

    struct FixedInstanceCounts(u64);

    #[async_trait]
    impl InstanceCounts for FixedInstanceCounts {
        async fn count_instances(&self) -> anyhow::Result<u64> {
            Ok(self.0)
        }
    }

    fn chart_with_count(count: u64) -> FederationChart {
        let store: Arc<dyn BucketStore> = Arc::new(SqliteBucketStore::open_in_memory().unwrap());
        FederationChart::new(store, Arc::new(FixedInstanceCounts(count)))
    }

    #[tokio::test]
    async fn test_join_and_leave_deltas() {
        let chart = chart_with_count(20);

        chart.update(true).await.unwrap();
        chart.update(true).await.unwrap();
        chart.update(false).await.unwrap();

        let series = chart.get_chart(Resolution::Hour, 1).await.unwrap();
        assert_eq!(series[0].total, 21);
        assert_eq!(series[0].inc, 2);
        assert_eq!(series[0].dec, 1);
    }

    #[tokio::test]
    async fn test_series_length_matches_limit_without_history() {
        let chart = chart_with_count(0);

        let series = chart.get_chart(Resolution::Day, 30).await.unwrap();
        assert_eq!(series.len(), 30);
        assert!(series.iter().all(|p| p.total == 0));
    }
}
