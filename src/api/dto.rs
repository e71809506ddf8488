//! API request/response shapes

use crate::store::Resolution;
use serde::{Deserialize, Serialize};

/// Query string accepted by every chart endpoint.
///
/// `span` selects the bucket resolution; `limit` is the number of periods
/// returned (30 hours or 30 days by default).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChartQuery {
    pub span: Resolution,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    30
}

/// Full health report
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub charts: Vec<&'static str>,
}
