//! Generic chart engine
//!
//! Resolution- and schema-agnostic bucket lifecycle: deriving the current
//! bucket key from the clock, seeding fresh buckets through the chart's
//! template, applying deltas under per-bucket mutual exclusion, and serving
//! gap-filled ranges.
//!
//! Concurrency model: mutual exclusion is scoped to a single bucket identity
//! `(chart, resolution, group, bucket_start)`; writers on different
//! identities never contend. Seeding races are resolved by the store's
//! conditional insert - losers discard their seed and re-read the winning
//! row.

use crate::chart::error::{ChartError, ChartResult};
use crate::chart::{ChartDefinition, ChartPayload, MAX_CHART_LIMIT};
use crate::clock::{Clock, SystemClock};
use crate::store::{BucketKey, BucketStore, Resolution};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Idle per-bucket locks are pruned once the table grows past this many
/// entries; a lock goes idle one period after its bucket seals.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Bucket lifecycle and concurrency control for one chart.
pub struct ChartEngine<D: ChartDefinition> {
    definition: D,
    store: Arc<dyn BucketStore>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<BucketKey, Arc<AsyncMutex<()>>>>,
}

impl<D: ChartDefinition> ChartEngine<D> {
    /// Create an engine over the given store, using the system clock.
    pub fn new(definition: D, store: Arc<dyn BucketStore>) -> Self {
        Self::with_clock(definition, store, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit clock.
    pub fn with_clock(definition: D, store: Arc<dyn BucketStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            definition,
            store,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        D::NAME
    }

    /// Start of the bucket the current wall-clock instant falls into.
    ///
    /// Always derived from the clock at call time: a delta applied exactly on
    /// a boundary is attributed to the newly started bucket.
    pub fn current_bucket_start(&self, resolution: Resolution) -> DateTime<Utc> {
        resolution.truncate(self.clock.now())
    }

    fn check_group(&self, group: Option<&str>) -> ChartResult<()> {
        match (D::GROUPED, group) {
            (true, None) => Err(ChartError::InvalidQuery(format!(
                "chart '{}' requires a group key",
                D::NAME
            ))),
            (false, Some(_)) => Err(ChartError::InvalidQuery(format!(
                "chart '{}' does not take a group key",
                D::NAME
            ))),
            _ => Ok(()),
        }
    }

    fn lock_for(&self, key: &BucketKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.len() >= LOCK_PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Fetch the current period's bucket, seeding it if absent.
    ///
    /// The template's source-of-truth query runs before any per-bucket lock
    /// is taken, so a slow authoritative count cannot block concurrent
    /// writers. Reentrant: concurrent callers racing to seed the same bucket
    /// converge on exactly one stored row.
    pub async fn ensure_and_load_latest(
        &self,
        resolution: Resolution,
        group: Option<&str>,
    ) -> ChartResult<(BucketKey, D::Payload)> {
        self.check_group(group)?;

        loop {
            let bucket_start = self.current_bucket_start(resolution);
            let key = BucketKey::new(D::NAME, resolution, group, bucket_start);

            if let Some(value) = self.store.get(&key).await? {
                return Ok((key, serde_json::from_value(value)?));
            }

            let previous = self
                .store
                .latest_before(D::NAME, resolution, group, bucket_start)
                .await?;
            let latest: Option<D::Payload> = match &previous {
                Some(row) => Some(serde_json::from_value(row.payload.clone())?),
                None => None,
            };

            let seed = self
                .definition
                .template(latest.is_none(), latest.as_ref(), group)
                .await
                .map_err(|source| ChartError::Seed {
                    chart: D::NAME,
                    source,
                })?;

            let inserted = self
                .store
                .insert_if_absent(&key, &serde_json::to_value(&seed)?)
                .await?;
            if inserted {
                return Ok((key, seed));
            }
            // Lost the seeding race; loop around and read the winning row.
        }
    }

    /// Merge a typed delta into the latest bucket of every resolution.
    ///
    /// Cumulative fields receive the signed delta, per-bucket delta fields
    /// accumulate, nested diffs add per sub-key. The per-identity lock is
    /// held only across the read-merge-write and is released on every exit
    /// path.
    pub async fn apply_delta(&self, group: Option<&str>, delta: &D::Payload) -> ChartResult<()> {
        self.check_group(group)?;

        for &resolution in Resolution::all() {
            self.apply_delta_at(resolution, group, delta).await?;
        }

        Ok(())
    }

    async fn apply_delta_at(
        &self,
        resolution: Resolution,
        group: Option<&str>,
        delta: &D::Payload,
    ) -> ChartResult<()> {
        let (key, seeded) = self.ensure_and_load_latest(resolution, group).await?;

        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        // Re-read under the lock: another writer may have merged since the
        // seed was loaded.
        let mut payload = match self.store.get(&key).await? {
            Some(value) => serde_json::from_value::<D::Payload>(value)?,
            None => seeded,
        };
        payload.merge(delta);

        self.store
            .put(&key, &serde_json::to_value(&payload)?)
            .await?;

        Ok(())
    }

    /// Serve a gap-filled window of `limit` buckets ending at the current
    /// period, ordered oldest to newest.
    ///
    /// A missing period takes the nearest stored bucket at or before it with
    /// cumulative fields carried unchanged and deltas zeroed; periods before
    /// the oldest stored bucket carry the oldest known snapshot, and an
    /// entirely empty series is all zeros. The read is bounded by `limit`.
    pub async fn get_chart(
        &self,
        resolution: Resolution,
        limit: usize,
        group: Option<&str>,
    ) -> ChartResult<Vec<D::Payload>> {
        self.check_group(group)?;
        if limit < 1 || limit > MAX_CHART_LIMIT {
            return Err(ChartError::InvalidQuery(format!(
                "limit must be within 1..={}, got {}",
                MAX_CHART_LIMIT, limit
            )));
        }

        let current = self.current_bucket_start(resolution);
        let rows = self
            .store
            .list_until(D::NAME, resolution, group, current, limit)
            .await?;

        // Newest first, mirroring the fetch order.
        let mut stored: Vec<(DateTime<Utc>, D::Payload)> = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push((row.bucket_start, serde_json::from_value(row.payload)?));
        }

        let mut series = Vec::with_capacity(limit);
        for back in (0..limit).rev() {
            let period = resolution.periods_back(current, back);
            match stored.iter().find(|(start, _)| *start <= period) {
                Some((start, payload)) if *start == period => series.push(payload.clone()),
                Some((_, payload)) => series.push(payload.carry_forward()),
                None => match stored.last() {
                    Some((_, oldest)) => series.push(oldest.carry_forward()),
                    None => series.push(D::Payload::default()),
                },
            }
        }

        Ok(series)
    }

    /// Seed the current period's bucket for every series active in the
    /// previous period. Safe to invoke repeatedly within one period: the
    /// conditional insert makes re-seeding a no-op.
    pub async fn rollover(&self, resolution: Resolution) -> ChartResult<()> {
        let bucket_start = self.current_bucket_start(resolution);

        if D::GROUPED {
            let previous = resolution.periods_back(bucket_start, 1);
            let groups = self
                .store
                .groups_at(D::NAME, resolution, previous)
                .await?;
            for group in &groups {
                self.ensure_and_load_latest(resolution, group.as_deref())
                    .await?;
            }
        } else {
            self.ensure_and_load_latest(resolution, None).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::SqliteBucketStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct TestPayload {
        #[serde(default)]
        total: i64,
        #[serde(default)]
        inc: i64,
        #[serde(default)]
        dec: i64,
    }

    impl ChartPayload for TestPayload {
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

    #[derive(Default)]
    struct TestCounts {
        count: AtomicI64,
        fail: AtomicBool,
    }

    struct TestChart {
        counts: Arc<TestCounts>,
    }

    #[async_trait]
    impl ChartDefinition for TestChart {
        const NAME: &'static str = "test_events";
        const GROUPED: bool = true;
        type Payload = TestPayload;

        async fn template(
            &self,
            init: bool,
            latest: Option<&TestPayload>,
            _group: Option<&str>,
        ) -> anyhow::Result<TestPayload> {
            let total = if init {
                if self.counts.fail.load(Ordering::SeqCst) {
                    anyhow::bail!("source-of-truth count failed");
                }
                self.counts.count.load(Ordering::SeqCst)
            } else {
                latest.map(|l| l.total).unwrap_or(0)
            };

            Ok(TestPayload {
                total,
                ..Default::default()
            })
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap()
    }

    fn setup(
        counts: Arc<TestCounts>,
    ) -> (
        Arc<ChartEngine<TestChart>>,
        Arc<dyn BucketStore>,
        Arc<ManualClock>,
    ) {
        let store: Arc<dyn BucketStore> = Arc::new(SqliteBucketStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(base_time()));
        let engine = Arc::new(ChartEngine::with_clock(
            TestChart { counts },
            Arc::clone(&store),
            clock.clone() as Arc<dyn Clock>,
        ));
        (engine, store, clock)
    }

    fn increment() -> TestPayload {
        TestPayload {
            total: 1,
            inc: 1,
            dec: 0,
        }
    }

    fn decrement() -> TestPayload {
        TestPayload {
            total: -1,
            inc: 0,
            dec: 1,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_seeding_converges_to_one_row() {
        let counts = Arc::new(TestCounts::default());
        counts.count.store(5, Ordering::SeqCst);
        let (engine, store, _clock) = setup(counts);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine.apply_delta(Some("user1"), &increment()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for &resolution in Resolution::all() {
            let rows = store
                .list_until(
                    TestChart::NAME,
                    resolution,
                    Some("user1"),
                    engine.current_bucket_start(resolution),
                    10,
                )
                .await
                .unwrap();
            assert_eq!(rows.len(), 1, "exactly one {} bucket", resolution);

            let series = engine
                .get_chart(resolution, 1, Some("user1"))
                .await
                .unwrap();
            // Carried-forward source count plus all 16 increments, not N seeds.
            assert_eq!(series[0].total, 21);
            assert_eq!(series[0].inc, 16);
        }
    }

    #[tokio::test]
    async fn test_delta_conservation_within_a_bucket() {
        let counts = Arc::new(TestCounts::default());
        counts.count.store(3, Ordering::SeqCst);
        let (engine, _store, _clock) = setup(counts);

        engine.apply_delta(Some("user1"), &increment()).await.unwrap();
        engine.apply_delta(Some("user1"), &decrement()).await.unwrap();

        let series = engine
            .get_chart(Resolution::Hour, 1, Some("user1"))
            .await
            .unwrap();
        assert_eq!(series[0].total, 3);
        assert_eq!(series[0].inc, 1);
        assert_eq!(series[0].dec, 1);
    }

    #[tokio::test]
    async fn test_gap_fill_carries_totals_with_zeroed_deltas() {
        let counts = Arc::new(TestCounts::default());
        let (engine, _store, clock) = setup(counts);
        let t = base_time();

        clock.set(t - Duration::hours(5) + Duration::minutes(10));
        for _ in 0..10 {
            engine.apply_delta(Some("user1"), &increment()).await.unwrap();
        }

        clock.set(t - Duration::hours(2) + Duration::minutes(10));
        for _ in 0..4 {
            engine.apply_delta(Some("user1"), &increment()).await.unwrap();
        }

        clock.set(t + Duration::minutes(10));
        let series = engine
            .get_chart(Resolution::Hour, 6, Some("user1"))
            .await
            .unwrap();

        let totals: Vec<i64> = series.iter().map(|p| p.total).collect();
        assert_eq!(totals, vec![10, 10, 10, 14, 14, 14]);

        // Stored buckets keep their deltas; synthesized periods are zeroed.
        assert_eq!(series[0].inc, 10);
        assert_eq!(series[3].inc, 4);
        for idx in [1, 2, 4, 5] {
            assert_eq!(series[idx].inc, 0, "synthesized period {} has no deltas", idx);
            assert_eq!(series[idx].dec, 0);
        }
    }

    #[tokio::test]
    async fn test_cold_start_seeds_from_source_of_truth() {
        let counts = Arc::new(TestCounts::default());
        counts.count.store(7, Ordering::SeqCst);
        let (engine, _store, _clock) = setup(counts);

        engine.apply_delta(Some("user1"), &increment()).await.unwrap();

        let series = engine
            .get_chart(Resolution::Hour, 1, Some("user1"))
            .await
            .unwrap();
        // Pre-existing count of 7, plus the triggering increment.
        assert_eq!(series[0].total, 8);
        assert_eq!(series[0].inc, 1);
    }

    #[tokio::test]
    async fn test_boundary_delta_lands_in_new_bucket() {
        let counts = Arc::new(TestCounts::default());
        let (engine, store, clock) = setup(counts);
        let boundary = base_time();

        clock.set(boundary - Duration::seconds(1));
        engine.apply_delta(Some("user1"), &increment()).await.unwrap();

        clock.set(boundary);
        engine.apply_delta(Some("user1"), &increment()).await.unwrap();

        let old_key = BucketKey::new(
            TestChart::NAME,
            Resolution::Hour,
            Some("user1"),
            boundary - Duration::hours(1),
        );
        let new_key = BucketKey::new(TestChart::NAME, Resolution::Hour, Some("user1"), boundary);

        let old: TestPayload =
            serde_json::from_value(store.get(&old_key).await.unwrap().unwrap()).unwrap();
        let new: TestPayload =
            serde_json::from_value(store.get(&new_key).await.unwrap().unwrap()).unwrap();

        assert_eq!(old.total, 1);
        assert_eq!(old.inc, 1);
        // Total carried across the boundary, delta attributed to the new bucket.
        assert_eq!(new.total, 2);
        assert_eq!(new.inc, 1);
    }

    #[tokio::test]
    async fn test_rollover_is_idempotent() {
        let counts = Arc::new(TestCounts::default());
        let (engine, store, clock) = setup(counts);
        let t = base_time();

        clock.set(t - Duration::hours(1) + Duration::minutes(5));
        for _ in 0..3 {
            engine.apply_delta(Some("user1"), &increment()).await.unwrap();
        }

        clock.set(t + Duration::minutes(5));
        engine.rollover(Resolution::Hour).await.unwrap();
        engine.rollover(Resolution::Hour).await.unwrap();

        let rows = store
            .list_until(TestChart::NAME, Resolution::Hour, Some("user1"), t, 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let current: TestPayload = serde_json::from_value(rows[0].payload.clone()).unwrap();
        // Carried once, not double-seeded; fresh bucket has zero deltas.
        assert_eq!(current.total, 3);
        assert_eq!(current.inc, 0);
    }

    #[tokio::test]
    async fn test_seed_failure_propagates() {
        let counts = Arc::new(TestCounts::default());
        counts.fail.store(true, Ordering::SeqCst);
        let (engine, store, _clock) = setup(Arc::clone(&counts));

        let err = engine
            .apply_delta(Some("user1"), &increment())
            .await
            .unwrap_err();
        assert!(matches!(err, ChartError::Seed { .. }));

        // Nothing was written: the failure is never defaulted to zero.
        let rows = store
            .list_until(
                TestChart::NAME,
                Resolution::Hour,
                Some("user1"),
                engine.current_bucket_start(Resolution::Hour),
                10,
            )
            .await
            .unwrap();
        assert!(rows.is_empty());

        // Once the source recovers, seeding picks up the authoritative count.
        counts.fail.store(false, Ordering::SeqCst);
        counts.count.store(2, Ordering::SeqCst);
        engine.apply_delta(Some("user1"), &increment()).await.unwrap();
        let series = engine
            .get_chart(Resolution::Hour, 1, Some("user1"))
            .await
            .unwrap();
        assert_eq!(series[0].total, 3);
    }

    #[tokio::test]
    async fn test_empty_series_is_zero_filled() {
        let counts = Arc::new(TestCounts::default());
        let (engine, _store, _clock) = setup(counts);

        let series = engine
            .get_chart(Resolution::Day, 4, Some("user1"))
            .await
            .unwrap();
        assert_eq!(series.len(), 4);
        assert!(series.iter().all(|p| *p == TestPayload::default()));
    }

    #[tokio::test]
    async fn test_limit_bounds_are_enforced() {
        let counts = Arc::new(TestCounts::default());
        let (engine, _store, _clock) = setup(counts);

        for limit in [0, MAX_CHART_LIMIT + 1] {
            let err = engine
                .get_chart(Resolution::Hour, limit, Some("user1"))
                .await
                .unwrap_err();
            assert!(matches!(err, ChartError::InvalidQuery(_)));
        }
    }

    #[tokio::test]
    async fn test_group_key_must_match_chart_shape() {
        let counts = Arc::new(TestCounts::default());
        let (engine, _store, _clock) = setup(counts);

        let err = engine.apply_delta(None, &increment()).await.unwrap_err();
        assert!(matches!(err, ChartError::InvalidQuery(_)));

        let err = engine
            .get_chart(Resolution::Hour, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChartError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_groups_are_independent_series() {
        let counts = Arc::new(TestCounts::default());
        let (engine, _store, _clock) = setup(counts);

        engine.apply_delta(Some("alice"), &increment()).await.unwrap();
        engine.apply_delta(Some("alice"), &increment()).await.unwrap();
        engine.apply_delta(Some("bob"), &increment()).await.unwrap();

        let alice = engine
            .get_chart(Resolution::Hour, 1, Some("alice"))
            .await
            .unwrap();
        let bob = engine
            .get_chart(Resolution::Hour, 1, Some("bob"))
            .await
            .unwrap();

        assert_eq!(alice[0].total, 2);
        assert_eq!(bob[0].total, 1);
    }
}
