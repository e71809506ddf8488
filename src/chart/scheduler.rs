//! Resolution scheduler
//!
//! Periodic rollover trigger: a background task ticks on a fixed interval,
//! detects hour/day boundary crossings, and asks every registered chart to
//! seed its current-period buckets. Correctness does not depend on exact
//! tick timing - seeding is idempotent (upsert-on-conflict in the engine),
//! so a missed tick is healed by the next one and a duplicate tick is a
//! no-op.

use crate::chart::error::ChartResult;
use crate::clock::Clock;
use crate::store::Resolution;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A chart that can be rolled into a fresh period.
#[async_trait]
pub trait Rollable: Send + Sync {
    fn chart_name(&self) -> &'static str;

    /// Seed the current period's buckets for every active series.
    /// Must be safe to invoke repeatedly within one period.
    async fn rollover(&self, resolution: Resolution) -> ChartResult<()>;
}

/// Drives periodic rollover across all registered charts.
pub struct ResolutionScheduler {
    charts: Arc<RwLock<Vec<Arc<dyn Rollable>>>>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    running: Arc<RwLock<bool>>,
    last_period: Arc<RwLock<HashMap<Resolution, DateTime<Utc>>>>,
}

impl ResolutionScheduler {
    pub fn new(clock: Arc<dyn Clock>, tick_interval: Duration) -> Self {
        Self {
            charts: Arc::new(RwLock::new(Vec::new())),
            clock,
            tick_interval,
            running: Arc::new(RwLock::new(false)),
            last_period: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a chart for periodic rollover.
    pub async fn register(&self, chart: Arc<dyn Rollable>) {
        self.charts.write().await.push(chart);
    }

    /// Start the scheduler background task.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            *scheduler.running.write().await = true;

            let mut interval = tokio::time::interval(scheduler.tick_interval);

            loop {
                interval.tick().await;

                if !*scheduler.running.read().await {
                    break;
                }

                scheduler.tick().await;
            }
        })
    }

    /// Stop the scheduler.
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// Run one scheduling pass: roll every chart whose period boundary has
    /// been crossed since the last pass. The first pass after startup always
    /// rolls, re-seeding current buckets after a restart mid-period.
    pub async fn tick(&self) {
        let now = self.clock.now();

        for &resolution in Resolution::all() {
            let current = resolution.truncate(now);

            let crossed = {
                let mut last = self.last_period.write().await;
                match last.insert(resolution, current) {
                    Some(previous) if previous == current => false,
                    _ => true,
                }
            };
            if !crossed {
                continue;
            }

            let charts = self.charts.read().await.clone();
            for chart in charts {
                tracing::debug!(
                    chart = chart.chart_name(),
                    resolution = %resolution,
                    period = %current,
                    "rolling chart into new period"
                );
                if let Err(e) = chart.rollover(resolution).await {
                    tracing::error!(
                        chart = chart.chart_name(),
                        resolution = %resolution,
                        error = %e,
                        "chart rollover failed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRollable {
        hour_rolls: AtomicUsize,
        day_rolls: AtomicUsize,
    }

    #[async_trait]
    impl Rollable for CountingRollable {
        fn chart_name(&self) -> &'static str {
            "counting"
        }

        async fn rollover(&self, resolution: Resolution) -> ChartResult<()> {
            match resolution {
                Resolution::Hour => self.hour_rolls.fetch_add(1, Ordering::SeqCst),
                Resolution::Day => self.day_rolls.fetch_add(1, Ordering::SeqCst),
            };
            Ok(())
        }
    }

    async fn setup() -> (Arc<ResolutionScheduler>, Arc<CountingRollable>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 15, 30, 0).unwrap(),
        ));
        let scheduler = Arc::new(ResolutionScheduler::new(
            clock.clone() as Arc<dyn Clock>,
            Duration::from_secs(60),
        ));
        let chart = Arc::new(CountingRollable::default());
        scheduler.register(chart.clone() as Arc<dyn Rollable>).await;
        (scheduler, chart, clock)
    }

    #[tokio::test]
    async fn test_first_tick_rolls_both_resolutions() {
        let (scheduler, chart, _clock) = setup().await;

        scheduler.tick().await;

        assert_eq!(chart.hour_rolls.load(Ordering::SeqCst), 1);
        assert_eq!(chart.day_rolls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_ticks_within_period_are_noops() {
        let (scheduler, chart, clock) = setup().await;

        scheduler.tick().await;
        scheduler.tick().await;
        clock.advance(chrono::Duration::minutes(10));
        scheduler.tick().await;

        assert_eq!(chart.hour_rolls.load(Ordering::SeqCst), 1);
        assert_eq!(chart.day_rolls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_boundary_crossings_trigger_per_resolution() {
        let (scheduler, chart, clock) = setup().await;

        scheduler.tick().await;

        // 15:30 -> 16:05 crosses an hour boundary, not a day boundary.
        clock.advance(chrono::Duration::minutes(35));
        scheduler.tick().await;
        assert_eq!(chart.hour_rolls.load(Ordering::SeqCst), 2);
        assert_eq!(chart.day_rolls.load(Ordering::SeqCst), 1);

        // Into the next day: both resolutions roll.
        clock.advance(chrono::Duration::hours(9));
        scheduler.tick().await;
        assert_eq!(chart.hour_rolls.load(Ordering::SeqCst), 3);
        assert_eq!(chart.day_rolls.load(Ordering::SeqCst), 2);
    }
}
