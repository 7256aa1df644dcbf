use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Sentinel for records missing a unit or indicator. Never dropped, but
/// excluded from aggregates that require the real key.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Queued,
    Processing,
    PendingApproval,
    Approved,
    Completed,
    Rejected,
    SystemRejected,
    Failed,
}

impl ReportStatus {
    pub fn parse(text: &str) -> Option<ReportStatus> {
        match text {
            "queued" => Some(ReportStatus::Queued),
            "processing" => Some(ReportStatus::Processing),
            "pending_approval" => Some(ReportStatus::PendingApproval),
            "approved" => Some(ReportStatus::Approved),
            "completed" => Some(ReportStatus::Completed),
            "rejected" => Some(ReportStatus::Rejected),
            "system_rejected" => Some(ReportStatus::SystemRejected),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Queued => "queued",
            ReportStatus::Processing => "processing",
            ReportStatus::PendingApproval => "pending_approval",
            ReportStatus::Approved => "approved",
            ReportStatus::Completed => "completed",
            ReportStatus::Rejected => "rejected",
            ReportStatus::SystemRejected => "system_rejected",
            ReportStatus::Failed => "failed",
        }
    }

    /// The report made it through review.
    pub fn is_approved(&self) -> bool {
        matches!(self, ReportStatus::Approved | ReportStatus::Completed)
    }

    /// Rejected by a reviewer or by the system.
    pub fn is_rejected(&self) -> bool {
        matches!(self, ReportStatus::Rejected | ReportStatus::SystemRejected)
    }
}

/// A report row as fetched from the store or read from a CSV import, before
/// normalization. Optional fields reflect what the store can actually return.
#[derive(Debug, Clone)]
pub struct RawReport {
    pub id: Uuid,
    pub unit_name: Option<String>,
    pub indicator_type: Option<String>,
    pub status: String,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Canonical record every aggregator consumes. Missing unit/indicator carry
/// the `UNKNOWN` sentinel; a missing score stays absent rather than becoming 0.
#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub id: Uuid,
    pub unit_name: String,
    pub indicator_type: String,
    pub status: ReportStatus,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub unit: String,
    pub mean_score: f64,
    pub report_count: usize,
    /// Change against the prior-window mean; `None` when the unit has no
    /// scored records in the prior window.
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    pub indicator: String,
    /// Mean score per unit. A unit missing here had no scored record for
    /// this indicator, which is distinct from a present mean of 0.0.
    pub per_unit: BTreeMap<String, f64>,
    /// Mean over every scored record of this indicator regardless of unit,
    /// so a larger unit weighs in proportionally to its record count.
    pub overall_mean: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonTable {
    /// Column set shared by all rows: the units observed anywhere in the
    /// input, in first-seen order.
    pub units: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub month_label: String,
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionSlice {
    pub indicator: String,
    pub count: usize,
}

/// One complete, internally consistent set of the four aggregate views,
/// recomputed in full from one input collection.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub leaderboard: Vec<LeaderboardRow>,
    pub comparison: ComparisonTable,
    pub trend: Vec<TrendPoint>,
    pub composition: Vec<CompositionSlice>,
}
