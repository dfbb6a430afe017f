//! # Iteration History and Recommendations
//!
//! Every print attempt is recorded as an [`IterationRecord`]: what was
//! printed, with which parameters, and how it turned out. The store keeps the
//! records durable in a single-file SQLite database; the recommender mines
//! the records (and observed defects) for parameter adjustments worth trying
//! on the next attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printforge_slicer::{Dimensions, SlicingParameterSet};

pub mod recommender;
pub mod store;

pub use recommender::{Recommendation, Recommender, TunableParameter};
pub use store::{IterationStore, ModelStatistics, NewIteration, OutcomeUpdate, StoreError};

/// Outcome states of a print attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Pending,
    Printing,
    Completed,
    Failed,
    Cancelled,
}

impl IterationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IterationStatus::Pending => "pending",
            IterationStatus::Printing => "printing",
            IterationStatus::Completed => "completed",
            IterationStatus::Failed => "failed",
            IterationStatus::Cancelled => "cancelled",
        }
    }
}

/// Record of a single print attempt.
///
/// The parameter snapshot is held by value: a record never shares mutable
/// state with a live workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Short identifier
    pub iteration_id: String,

    /// Name of the model being printed
    pub model_name: String,

    /// Path to the model file
    pub model_path: String,

    pub created_at: DateTime<Utc>,

    // Scaling info
    pub scale_factor: Option<f64>,
    pub original_dimensions: Option<Dimensions>,
    pub scaled_dimensions: Option<Dimensions>,

    // Parameters used
    pub parameters: Option<SlicingParameterSet>,
    pub preset_name: Option<String>,

    // Outcome
    pub status: IterationStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub print_time_minutes: Option<u32>,

    // Quality assessment
    pub quality_score: Option<f64>,
    pub defects_detected: Vec<String>,

    // Notes
    pub notes: String,
    pub improvement_suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serde_round_trip_identity() {
        let record = IterationRecord {
            iteration_id: "ab12cd34".to_string(),
            model_name: "tube_squeezer".to_string(),
            model_path: "/tmp/tube_squeezer.stl".to_string(),
            created_at: Utc::now(),
            scale_factor: Some(2.6),
            original_dimensions: Some(Dimensions::new(38.0, 45.0, 35.0)),
            scaled_dimensions: Some(Dimensions::new(98.8, 117.0, 91.0)),
            parameters: Some(SlicingParameterSet::default()),
            preset_name: Some("tube_squeezer_standard".to_string()),
            status: IterationStatus::Completed,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
            print_time_minutes: Some(95),
            quality_score: Some(88.5),
            defects_detected: vec!["stringing".to_string()],
            notes: "slight stringing on the handle".to_string(),
            improvement_suggestions: vec!["Increase retraction distance".to_string()],
        };

        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: IterationRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(IterationStatus::Completed.as_str(), "completed");
        let parsed: IterationStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, IterationStatus::Cancelled);
    }
}
