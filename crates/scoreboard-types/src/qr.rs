//! QR scan audit types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome recorded for a QR scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanResult {
    Success,
    ScoreAssigned,
}

impl ScanResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanResult::Success => "success",
            ScanResult::ScoreAssigned => "score_assigned",
        }
    }
}

/// Audit record of a QR scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrScanLog {
    pub id: String,
    pub scanned_user_id: String,
    pub scanner_user_id: String,
    pub organization_id: String,
    pub scan_result: ScanResult,
    pub score_assigned: Option<i64>,
    pub score_type: Option<String>,
    pub scan_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
