//! Bucket payload contract
//!
//! Each chart defines one statically-typed payload struct: a fixed shape of
//! named numeric fields (optionally nested), known at definition time. The
//! same type doubles as the delta shape, so merging is an explicit per-field
//! addition rather than a reflective deep merge.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Schema of one chart bucket.
///
/// `Default` is the all-zero payload. Every field carries `#[serde(default)]`
/// so rows written before a schema gained a field decode with that field as
/// zero.
pub trait ChartPayload:
    Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Merge a delta into this bucket, field by field: cumulative fields add
    /// the signed delta, per-bucket delta fields add, nested diff fields add
    /// per sub-key.
    fn merge(&mut self, delta: &Self);

    /// Start-of-period snapshot: cumulative fields copied unchanged, every
    /// per-bucket delta field reset to zero.
    fn carry_forward(&self) -> Self;
}
