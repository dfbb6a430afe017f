//! Parameter adjustment recommendations.
//!
//! Heuristic troubleshooting knowledge as data: each observed defect maps to
//! a fixed list of additive parameter deltas, clamped to per-parameter
//! limits. History contributes lower-confidence suggestions drawn from the
//! best past print of the same model. Defect-driven recommendations always
//! win over history for the same parameter.

use serde::{Deserialize, Serialize};

use printforge_slicer::SlicingParameterSet;
use printforge_vision::DefectKind;

use crate::{IterationRecord, IterationStatus};

/// A recommended parameter adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// Wire name of the parameter
    pub parameter: String,

    pub current_value: f64,
    pub suggested_value: f64,

    /// Why this change should help
    pub reason: String,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// 1 = most urgent
    pub priority: u8,
}

/// Parameters the recommender may adjust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunableParameter {
    OuterWallSpeed,
    InnerWallSpeed,
    SparseInfillSpeed,
    TravelSpeed,
    NozzleTemperature,
    BedTemperature,
    BedTemperatureInitialLayer,
    RetractionLength,
    RetractionSpeed,
    BrimWidth,
    InitialLayerSpeed,
    InitialLayerHeight,
    LayerHeight,
    WallLoops,
    SparseInfillDensity,
}

impl TunableParameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunableParameter::OuterWallSpeed => "outer_wall_speed",
            TunableParameter::InnerWallSpeed => "inner_wall_speed",
            TunableParameter::SparseInfillSpeed => "sparse_infill_speed",
            TunableParameter::TravelSpeed => "travel_speed",
            TunableParameter::NozzleTemperature => "nozzle_temperature",
            TunableParameter::BedTemperature => "bed_temperature",
            TunableParameter::BedTemperatureInitialLayer => "bed_temperature_initial_layer",
            TunableParameter::RetractionLength => "retraction_length",
            TunableParameter::RetractionSpeed => "retraction_speed",
            TunableParameter::BrimWidth => "brim_width",
            TunableParameter::InitialLayerSpeed => "initial_layer_speed",
            TunableParameter::InitialLayerHeight => "initial_layer_height",
            TunableParameter::LayerHeight => "layer_height",
            TunableParameter::WallLoops => "wall_loops",
            TunableParameter::SparseInfillDensity => "sparse_infill_density",
        }
    }

    /// Reads the current value from a parameter set.
    pub fn get(&self, params: &SlicingParameterSet) -> f64 {
        match self {
            TunableParameter::OuterWallSpeed => params.outer_wall_speed,
            TunableParameter::InnerWallSpeed => params.inner_wall_speed,
            TunableParameter::SparseInfillSpeed => params.sparse_infill_speed,
            TunableParameter::TravelSpeed => params.travel_speed,
            TunableParameter::NozzleTemperature => params.nozzle_temperature,
            TunableParameter::BedTemperature => params.bed_temperature,
            TunableParameter::BedTemperatureInitialLayer => params.bed_temperature_initial_layer,
            TunableParameter::RetractionLength => params.retraction_length,
            TunableParameter::RetractionSpeed => params.retraction_speed,
            TunableParameter::BrimWidth => params.brim_width,
            TunableParameter::InitialLayerSpeed => params.initial_layer_speed,
            TunableParameter::InitialLayerHeight => params.initial_layer_height,
            TunableParameter::LayerHeight => params.layer_height,
            TunableParameter::WallLoops => params.wall_loops as f64,
            TunableParameter::SparseInfillDensity => params.sparse_infill_density,
        }
    }

    /// Hard limits applied after any delta.
    pub fn limits(&self) -> (f64, f64) {
        match self {
            TunableParameter::OuterWallSpeed => (20.0, 150.0),
            TunableParameter::InnerWallSpeed => (30.0, 200.0),
            TunableParameter::SparseInfillSpeed => (50.0, 300.0),
            TunableParameter::TravelSpeed => (100.0, 500.0),
            TunableParameter::NozzleTemperature => (180.0, 280.0),
            TunableParameter::BedTemperature => (40.0, 110.0),
            TunableParameter::BedTemperatureInitialLayer => (40.0, 110.0),
            TunableParameter::RetractionLength => (0.2, 5.0),
            TunableParameter::RetractionSpeed => (20.0, 80.0),
            TunableParameter::BrimWidth => (0.0, 20.0),
            TunableParameter::InitialLayerSpeed => (10.0, 50.0),
            TunableParameter::InitialLayerHeight => (0.1, 0.4),
            TunableParameter::LayerHeight => (0.08, 0.32),
            TunableParameter::WallLoops => (1.0, 8.0),
            TunableParameter::SparseInfillDensity => (0.0, 100.0),
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        let (min, max) = self.limits();
        value.clamp(min, max)
    }
}

/// Fixed defect → (parameter, additive delta, reason) table.
fn adjustments_for(defect: DefectKind) -> &'static [(TunableParameter, f64, &'static str)] {
    use TunableParameter::*;
    match defect {
        DefectKind::LayerShift => &[
            (OuterWallSpeed, -10.0, "Reduce outer wall speed to minimize vibration"),
            (InnerWallSpeed, -15.0, "Reduce inner wall speed"),
            (TravelSpeed, -50.0, "Reduce travel speed to minimize jerky movements"),
        ],
        DefectKind::Stringing => &[
            (RetractionLength, 0.5, "Increase retraction to reduce oozing"),
            (RetractionSpeed, 5.0, "Increase retraction speed"),
            (NozzleTemperature, -5.0, "Lower temperature reduces oozing"),
            (TravelSpeed, 20.0, "Faster travel gives less time to ooze"),
        ],
        DefectKind::Warping => &[
            (BedTemperature, 5.0, "Higher bed temp improves adhesion"),
            (BedTemperatureInitialLayer, 10.0, "Higher initial bed temp"),
            (BrimWidth, 5.0, "Larger brim for better adhesion"),
            (InitialLayerSpeed, -10.0, "Slower first layer for better adhesion"),
        ],
        DefectKind::Blob => &[
            (RetractionLength, 0.3, "More retraction at seams"),
            (OuterWallSpeed, -5.0, "Slower walls for cleaner seams"),
        ],
        DefectKind::UnderExtrusion => &[
            (NozzleTemperature, 10.0, "Higher temp for better flow"),
            (SparseInfillSpeed, -20.0, "Slower infill to ensure full extrusion"),
        ],
        DefectKind::OverExtrusion => &[
            (NozzleTemperature, -5.0, "Lower temp to reduce flow"),
        ],
        DefectKind::PoorAdhesion => &[
            (BedTemperatureInitialLayer, 10.0, "Higher bed temp for adhesion"),
            (InitialLayerHeight, 0.05, "Thicker first layer squishes better"),
            (InitialLayerSpeed, -10.0, "Slower first layer"),
            (BrimWidth, 8.0, "Add substantial brim"),
        ],
        DefectKind::Spaghetti => &[
            (BrimWidth, 10.0, "Significant brim needed"),
            (InitialLayerSpeed, -15.0, "Much slower first layer"),
            (BedTemperatureInitialLayer, 15.0, "Higher bed temp"),
            (InitialLayerHeight, 0.1, "Thicker first layer"),
        ],
        DefectKind::NozzleClog | DefectKind::LayerSeparation => &[],
    }
}

/// Urgency of a defect kind (1 = highest).
fn defect_priority(defect: DefectKind) -> u8 {
    match defect {
        DefectKind::Spaghetti | DefectKind::LayerShift | DefectKind::PoorAdhesion => 1,
        DefectKind::Warping | DefectKind::UnderExtrusion => 2,
        DefectKind::OverExtrusion | DefectKind::Stringing => 3,
        DefectKind::Blob => 4,
        _ => 5,
    }
}

/// Key parameters considered when learning from history.
const HISTORY_PARAMETERS: [TunableParameter; 4] = [
    TunableParameter::LayerHeight,
    TunableParameter::WallLoops,
    TunableParameter::SparseInfillDensity,
    TunableParameter::OuterWallSpeed,
];

/// Recommends parameter adjustments from defects and history.
#[derive(Debug, Default)]
pub struct Recommender;

impl Recommender {
    pub fn new() -> Self {
        Self
    }

    /// Produces a deduplicated, priority-sorted list of recommendations.
    pub fn recommend(
        &self,
        current: &SlicingParameterSet,
        defects: &[DefectKind],
        quality_score: Option<f64>,
        history: Option<&[IterationRecord]>,
    ) -> Vec<Recommendation> {
        let mut recommendations: Vec<Recommendation> = Vec::new();
        let mut seen: Vec<TunableParameter> = Vec::new();

        for &defect in defects {
            for &(parameter, delta, reason) in adjustments_for(defect) {
                if seen.contains(&parameter) {
                    continue;
                }
                seen.push(parameter);

                let current_value = parameter.get(current);
                recommendations.push(Recommendation {
                    parameter: parameter.as_str().to_string(),
                    current_value,
                    suggested_value: parameter.clamp(current_value + delta),
                    reason: format!("{reason} (addressing {})", defect.as_str()),
                    confidence: 0.7,
                    priority: defect_priority(defect),
                });
            }
        }

        // Very poor quality without a matching defect: back off speed
        if let Some(score) = quality_score {
            if score < 50.0 && !seen.contains(&TunableParameter::OuterWallSpeed) {
                seen.push(TunableParameter::OuterWallSpeed);
                let current_value = current.outer_wall_speed;
                recommendations.push(Recommendation {
                    parameter: TunableParameter::OuterWallSpeed.as_str().to_string(),
                    current_value,
                    suggested_value: (current_value * 0.7).max(30.0),
                    reason: "Significantly reduce speed for better quality".to_string(),
                    confidence: 0.6,
                    priority: 2,
                });
            }
        }

        if let Some(history) = history {
            for recommendation in self.learn_from_history(current, history) {
                let parameter = HISTORY_PARAMETERS
                    .iter()
                    .find(|p| p.as_str() == recommendation.parameter)
                    .copied();
                if let Some(parameter) = parameter {
                    if seen.contains(&parameter) {
                        continue;
                    }
                    seen.push(parameter);
                }
                recommendations.push(recommendation);
            }
        }

        recommendations.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
        });
        recommendations
    }

    /// Suggests values from the best successful past print.
    fn learn_from_history(
        &self,
        current: &SlicingParameterSet,
        history: &[IterationRecord],
    ) -> Vec<Recommendation> {
        let best = history
            .iter()
            .filter(|i| {
                i.status == IterationStatus::Completed
                    && i.quality_score.is_some_and(|q| q >= 80.0)
                    && i.parameters.is_some()
            })
            .max_by(|a, b| {
                a.quality_score
                    .partial_cmp(&b.quality_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        let Some(best) = best else {
            return Vec::new();
        };
        let best_quality = best.quality_score.unwrap_or(0.0);
        let best_params = best.parameters.as_ref().expect("filtered on parameters");

        HISTORY_PARAMETERS
            .iter()
            .filter_map(|parameter| {
                let current_value = parameter.get(current);
                let best_value = parameter.get(best_params);
                if (current_value - best_value).abs() < 1e-9 {
                    return None;
                }
                Some(Recommendation {
                    parameter: parameter.as_str().to_string(),
                    current_value,
                    suggested_value: best_value,
                    reason: format!(
                        "Value used in successful print (quality: {best_quality:.0}%)"
                    ),
                    confidence: 0.5,
                    priority: 3,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn params() -> SlicingParameterSet {
        SlicingParameterSet {
            outer_wall_speed: 60.0,
            retraction_length: 0.8,
            nozzle_temperature: 220.0,
            ..Default::default()
        }
    }

    fn history_record(quality: f64, status: IterationStatus) -> IterationRecord {
        IterationRecord {
            iteration_id: "hist0001".to_string(),
            model_name: "foo".to_string(),
            model_path: "/tmp/foo.stl".to_string(),
            created_at: Utc::now(),
            scale_factor: None,
            original_dimensions: None,
            scaled_dimensions: None,
            parameters: Some(SlicingParameterSet {
                layer_height: 0.16,
                wall_loops: 4,
                ..Default::default()
            }),
            preset_name: None,
            status,
            started_at: None,
            completed_at: None,
            print_time_minutes: None,
            quality_score: Some(quality),
            defects_detected: Vec::new(),
            notes: String::new(),
            improvement_suggestions: Vec::new(),
        }
    }

    #[test]
    fn test_stringing_scenario() {
        let recommender = Recommender::new();
        let recs = recommender.recommend(&params(), &[DefectKind::Stringing], None, None);

        assert_eq!(recs.len(), 4);
        assert!(recs.iter().all(|r| r.priority == 3));

        let by_name = |name: &str| recs.iter().find(|r| r.parameter == name).unwrap();
        assert!((by_name("retraction_length").suggested_value - 1.3).abs() < 1e-9);
        assert_eq!(by_name("retraction_speed").suggested_value, 35.0);
        assert_eq!(by_name("nozzle_temperature").suggested_value, 215.0);
        assert_eq!(by_name("travel_speed").suggested_value, 320.0);
    }

    #[test]
    fn test_no_duplicate_parameters() {
        let recommender = Recommender::new();
        // travel_speed appears in both tables; layer_shift comes first
        let recs = recommender.recommend(
            &params(),
            &[DefectKind::LayerShift, DefectKind::Stringing],
            None,
            None,
        );

        let mut names: Vec<&str> = recs.iter().map(|r| r.parameter.as_str()).collect();
        names.sort();
        let before = names.len();
        names.dedup();
        assert_eq!(names.len(), before);

        let travel = recs
            .iter()
            .find(|r| r.parameter == "travel_speed")
            .unwrap();
        assert_eq!(travel.suggested_value, 250.0); // layer-shift's -50 won
        assert_eq!(travel.priority, 1);
    }

    #[test]
    fn test_limits_are_enforced() {
        let recommender = Recommender::new();
        let hot = SlicingParameterSet {
            nozzle_temperature: 278.0,
            ..params()
        };
        let recs = recommender.recommend(&hot, &[DefectKind::UnderExtrusion], None, None);
        let nozzle = recs
            .iter()
            .find(|r| r.parameter == "nozzle_temperature")
            .unwrap();
        assert_eq!(nozzle.suggested_value, 280.0); // 278 + 10 clamped
    }

    #[test]
    fn test_sorted_by_priority_then_confidence() {
        let recommender = Recommender::new();
        let recs = recommender.recommend(
            &params(),
            &[DefectKind::Blob, DefectKind::Spaghetti],
            None,
            None,
        );
        assert!(!recs.is_empty());
        for window in recs.windows(2) {
            assert!(window[0].priority <= window[1].priority);
            if window[0].priority == window[1].priority {
                assert!(window[0].confidence >= window[1].confidence);
            }
        }
        assert_eq!(recs[0].priority, 1);
    }

    #[test]
    fn test_history_learning() {
        let recommender = Recommender::new();
        let history = vec![
            history_record(85.0, IterationStatus::Completed),
            history_record(60.0, IterationStatus::Completed),
            history_record(95.0, IterationStatus::Failed),
        ];

        let recs = recommender.recommend(&params(), &[], None, Some(&history));

        // Best eligible print had layer 0.16 / walls 4 vs current 0.20 / 2
        let layer = recs.iter().find(|r| r.parameter == "layer_height").unwrap();
        assert_eq!(layer.suggested_value, 0.16);
        assert_eq!(layer.priority, 3);
        assert_eq!(layer.confidence, 0.5);
        assert!(layer.reason.contains("85"));

        let walls = recs.iter().find(|r| r.parameter == "wall_loops").unwrap();
        assert_eq!(walls.suggested_value, 4.0);
    }

    #[test]
    fn test_defect_table_beats_history() {
        let recommender = Recommender::new();
        let history = vec![history_record(90.0, IterationStatus::Completed)];

        // Blob adjusts outer_wall_speed; history also differs on it
        let recs = recommender.recommend(&params(), &[DefectKind::Blob], None, Some(&history));
        let outer: Vec<&Recommendation> = recs
            .iter()
            .filter(|r| r.parameter == "outer_wall_speed")
            .collect();
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].confidence, 0.7); // the defect-table entry
    }

    #[test]
    fn test_low_quality_fallback() {
        let recommender = Recommender::new();
        let recs = recommender.recommend(&params(), &[], Some(35.0), None);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].parameter, "outer_wall_speed");
        assert_eq!(recs[0].suggested_value, 42.0); // 60 * 0.7
        assert_eq!(recs[0].priority, 2);
    }
}
