//! Per-user note activity chart
//!
//! Grouped by user id. Tracks the running note count plus per-bucket
//! increments/decrements, broken down by note kind (plain post, reply,
//! renote).

use crate::chart::engine::ChartEngine;
use crate::chart::error::ChartResult;
use crate::chart::scheduler::Rollable;
use crate::chart::source::NoteCounts;
use crate::chart::{ChartDefinition, ChartPayload};
use crate::clock::Clock;
use crate::store::{BucketStore, Resolution};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One bucket of the per-user notes chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerUserNotesPayload {
    /// Running note count as of this bucket
    #[serde(default)]
    pub total: i64,
    /// Notes created within the bucket
    #[serde(default)]
    pub inc: i64,
    /// Notes deleted within the bucket
    #[serde(default)]
    pub dec: i64,
    /// Per-kind breakdown of the bucket's change
    #[serde(default)]
    pub diffs: NoteDiffs,
}

/// Signed per-kind change within one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteDiffs {
    #[serde(default)]
    pub normal: i64,
    #[serde(default)]
    pub reply: i64,
    #[serde(default)]
    pub renote: i64,
}

impl ChartPayload for PerUserNotesPayload {
    fn merge(&mut self, delta: &Self) {
        self.total += delta.total;
        self.inc += delta.inc;
        self.dec += delta.dec;
        self.diffs.normal += delta.diffs.normal;
        self.diffs.reply += delta.diffs.reply;
        self.diffs.renote += delta.diffs.renote;
    }

    fn carry_forward(&self) -> Self {
        Self {
            total: self.total,
            ..Self::default()
        }
    }
}

/// Classification of a note, carried by the domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    /// Plain post
    Normal,
    /// Reply to another note
    Reply,
    /// Repost of another note
    Renote,
}

/// Chart definition: schema plus seeding rule.
pub struct PerUserNotes {
    source: Arc<dyn NoteCounts>,
}

#[async_trait]
impl ChartDefinition for PerUserNotes {
    const NAME: &'static str = "per_user_notes";
    const GROUPED: bool = true;
    type Payload = PerUserNotesPayload;

    async fn template(
        &self,
        init: bool,
        latest: Option<&PerUserNotesPayload>,
        group: Option<&str>,
    ) -> anyhow::Result<PerUserNotesPayload> {
        let total = if init {
            let user_id = group.ok_or_else(|| anyhow::anyhow!("missing user id group key"))?;
            self.source.count_notes(user_id).await? as i64
        } else {
            latest.map(|l| l.total).unwrap_or(0)
        };

        Ok(PerUserNotesPayload {
            total,
            ..Default::default()
        })
    }
}

/// Per-user notes chart with its typed update entry point.
pub struct PerUserNotesChart {
    engine: ChartEngine<PerUserNotes>,
}

impl PerUserNotesChart {
    pub fn new(store: Arc<dyn BucketStore>, source: Arc<dyn NoteCounts>) -> Self {
        Self {
            engine: ChartEngine::new(PerUserNotes { source }, store),
        }
    }

    pub fn with_clock(
        store: Arc<dyn BucketStore>,
        source: Arc<dyn NoteCounts>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: ChartEngine::with_clock(PerUserNotes { source }, store, clock),
        }
    }

    /// Record a note created (`created = true`) or deleted for `user_id`.
    ///
    /// Chart updates are auxiliary to the domain write: callers should log a
    /// returned error and continue rather than fail the primary operation.
    pub async fn update(&self, user_id: &str, kind: NoteKind, created: bool) -> ChartResult<()> {
        let unit = if created { 1 } else { -1 };

        let mut delta = PerUserNotesPayload {
            total: unit,
            ..Default::default()
        };
        if created {
            delta.inc = 1;
        } else {
            delta.dec = 1;
        }
        match kind {
            NoteKind::Normal => delta.diffs.normal = unit,
            NoteKind::Reply => delta.diffs.reply = unit,
            NoteKind::Renote => delta.diffs.renote = unit,
        }

        self.engine.apply_delta(Some(user_id), &delta).await
    }

    /// Gap-filled series for one user, oldest to newest, length `limit`.
    pub async fn get_chart(
        &self,
        resolution: Resolution,
        limit: usize,
        user_id: &str,
    ) -> ChartResult<Vec<PerUserNotesPayload>> {
        self.engine.get_chart(resolution, limit, Some(user_id)).await
    }
}

#[async_trait]
impl Rollable for PerUserNotesChart {
    fn chart_name(&self) -> &'static str {
        PerUserNotes::NAME
    }

    async fn rollover(&self, resolution: Resolution) -> ChartResult<()> {
        self.engine.rollover(resolution).await
    }
}
