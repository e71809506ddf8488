//! Chart engine error types
//!
//! Seeding and store failures propagate to the caller; they are never
//! converted into "no activity", which would silently corrupt cumulative
//! totals. Seeding races are the one class recovered internally (by retrying
//! against the winning row) and therefore have no variant here.

use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by the chart engine and chart definitions.
#[derive(Error, Debug)]
pub enum ChartError {
    /// The source-of-truth query failed while seeding a fresh bucket
    #[error("bucket seeding failed for chart '{chart}': {source}")]
    Seed {
        chart: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The bucket store is unreachable or rejected the operation
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Malformed query parameters (resolution/limit/group)
    #[error("invalid chart query: {0}")]
    InvalidQuery(String),

    /// A stored payload no longer decodes into the chart's schema
    #[error("bucket payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type alias for chart operations
pub type ChartResult<T> = Result<T, ChartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_error_display() {
        let err = ChartError::Seed {
            chart: "per_user_notes",
            source: anyhow::anyhow!("count query timed out"),
        };
        assert_eq!(
            err.to_string(),
            "bucket seeding failed for chart 'per_user_notes': count query timed out"
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::Lock("poisoned".to_string());
        let chart_err: ChartError = store_err.into();
        assert!(matches!(chart_err, ChartError::Store(_)));
    }
}
