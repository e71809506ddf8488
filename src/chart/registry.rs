//! Chart registry
//!
//! One constructed instance of every chart, wired up at process start. The
//! bucket store must be open before the registry is built; charts are
//! stateless beyond the store handle they hold, so there is no teardown.

use crate::chart::charts::{FederationChart, PerUserDriveChart, PerUserNotesChart};
use crate::chart::scheduler::Rollable;
use crate::chart::source::{DriveCounts, InstanceCounts, NoteCounts};
use crate::clock::Clock;
use crate::store::BucketStore;
use std::sync::Arc;

/// Source-of-truth handles the charts seed from.
pub struct ChartSources {
    pub notes: Arc<dyn NoteCounts>,
    pub instances: Arc<dyn InstanceCounts>,
    pub drive: Arc<dyn DriveCounts>,
}

/// All charts of the process, constructed once.
pub struct ChartRegistry {
    pub notes: Arc<PerUserNotesChart>,
    pub federation: Arc<FederationChart>,
    pub drive: Arc<PerUserDriveChart>,
}

impl ChartRegistry {
    pub fn new(store: Arc<dyn BucketStore>, sources: ChartSources) -> Self {
        Self {
            notes: Arc::new(PerUserNotesChart::new(Arc::clone(&store), sources.notes)),
            federation: Arc::new(FederationChart::new(Arc::clone(&store), sources.instances)),
            drive: Arc::new(PerUserDriveChart::new(store, sources.drive)),
        }
    }

    /// Registry with an explicit clock, for simulations and tests.
    pub fn with_clock(
        store: Arc<dyn BucketStore>,
        sources: ChartSources,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notes: Arc::new(PerUserNotesChart::with_clock(
                Arc::clone(&store),
                sources.notes,
                Arc::clone(&clock),
            )),
            federation: Arc::new(FederationChart::with_clock(
                Arc::clone(&store),
                sources.instances,
                Arc::clone(&clock),
            )),
            drive: Arc::new(PerUserDriveChart::with_clock(store, sources.drive, clock)),
        }
    }

    /// Every chart, as rollover targets for the scheduler.
    pub fn rollables(&self) -> Vec<Arc<dyn Rollable>> {
        vec![
            self.notes.clone() as Arc<dyn Rollable>,
            self.federation.clone() as Arc<dyn Rollable>,
            self.drive.clone() as Arc<dyn Rollable>,
        ]
    }
}
