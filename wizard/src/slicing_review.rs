//! Slicing parameter review and question sets.
//!
//! Builds the quality/use-case questions for the slicing checkpoint, the
//! material-specific notes shown alongside them, and a parameter review that
//! flags settings at odds with the material or nozzle.

use serde_json::json;

use printforge_materials::{FilamentProfile, MaterialClass, MaterialKnowledgeBase};
use printforge_slicer::{QualityPreset, SlicingParameterSet};

use crate::design_review::{DesignCategory, Suggestion, SuggestionPriority};
use crate::workflow::{Question, QuestionKind, QuestionOption};

/// Questions asked before slicing: quality tier, use case, and (for
/// flexible materials) how bendy the result should be.
pub fn slicing_questions(material: &str) -> Vec<Question> {
    let mut questions = vec![
        Question {
            id: "quality".to_string(),
            prompt: "What quality level do you want?".to_string(),
            kind: QuestionKind::Select,
            options: vec![
                QuestionOption::new("draft", "Draft (fastest, visible layer lines)"),
                QuestionOption::new("standard", "Standard (recommended)"),
                QuestionOption::new("quality", "Quality (better finish, slower)"),
                QuestionOption::new("ultra", "Ultra (best finish, much slower)"),
            ],
            current_value: None,
            default_value: Some("standard".to_string()),
        },
        Question {
            id: "use_case".to_string(),
            prompt: "What will this print be used for?".to_string(),
            kind: QuestionKind::Select,
            options: vec![
                QuestionOption::new("functional", "Functional part (strength matters)"),
                QuestionOption::new("decorative", "Decorative / display"),
                QuestionOption::new("prototype", "Prototype / test fit"),
                QuestionOption::new("gift", "Gift / final product"),
            ],
            current_value: None,
            default_value: Some("functional".to_string()),
        },
    ];

    let mkb = MaterialKnowledgeBase::global();
    if let Some(profile) = mkb.lookup_filament(material) {
        if profile.is_flexible {
            questions.push(Question {
                id: "flexibility".to_string(),
                prompt: "How flexible should the final part be?".to_string(),
                kind: QuestionKind::Select,
                options: vec![
                    QuestionOption::new("flexible", "Very flexible (thin walls, low infill)"),
                    QuestionOption::new("semi_rigid", "Semi-rigid (recommended)"),
                    QuestionOption::new("rigid", "Rigid (thick walls, high infill)"),
                ],
                current_value: None,
                default_value: Some("semi_rigid".to_string()),
            });
        }
    }

    questions
}

/// Material-specific printing notes for the slicing checkpoint.
pub fn material_notes(profile: &FilamentProfile) -> Vec<String> {
    let mut notes = Vec::new();

    if profile.is_flexible {
        notes.push("Flexible filament: print slowly (25-35mm/s outer walls)".to_string());
        notes.push("Use very short retractions (0.5mm or less)".to_string());
    }

    if profile.material_class == MaterialClass::Pc {
        notes.push("PC warps easily; keep parts small on an open frame printer".to_string());
        notes.push("Use a wide brim (8-10mm) and a freshly cleaned plate".to_string());
    }

    if profile.material_class == MaterialClass::Petg {
        notes.push("PETG likes to string; tune retraction carefully".to_string());
        notes.push("Z-hop keeps the nozzle from dragging across printed walls".to_string());
    }

    if !profile.feeder_compatible {
        notes.push(format!(
            "{} cannot pass through the spool changer; feed it directly to the extruder",
            profile.name
        ));
    }

    notes
}

/// Reviews a parameter set against the material and nozzle.
#[derive(Debug, Default)]
pub struct SlicingReviewer;

impl SlicingReviewer {
    pub fn new() -> Self {
        Self
    }

    /// Flags settings a careful operator would change before slicing.
    pub fn review(
        &self,
        params: &SlicingParameterSet,
        material: &str,
        nozzle_diameter: f64,
        quality: QualityPreset,
    ) -> (Vec<Suggestion>, Vec<String>) {
        let mut suggestions = Vec::new();
        let mut warnings = Vec::new();

        // Layer height vs nozzle bore
        let max_safe = nozzle_diameter * 0.75;
        if params.layer_height > max_safe {
            warnings.push(format!(
                "Layer height {:.2}mm exceeds 75% of the {:.1}mm nozzle; layers may not bond",
                params.layer_height, nozzle_diameter
            ));
        }

        // Layer height vs quality intent
        let mkb = MaterialKnowledgeBase::global();
        let quality_tier = match quality {
            QualityPreset::Draft => printforge_materials::LayerQuality::Draft,
            QualityPreset::Standard => printforge_materials::LayerQuality::Standard,
            QualityPreset::Quality | QualityPreset::Ultra => {
                printforge_materials::LayerQuality::Fine
            }
        };
        let optimal = mkb.layer_height_for(nozzle_diameter, quality_tier);
        if (params.layer_height - optimal).abs() > 0.04 + 1e-9 {
            let direction = if params.layer_height > optimal {
                "thinner layers improve the finish"
            } else {
                "thicker layers print faster"
            };
            suggestions.push(Suggestion {
                title: "Layer height off the quality target".to_string(),
                description: format!(
                    "{:.2}mm is far from the {optimal:.2}mm sweet spot for this quality",
                    params.layer_height
                ),
                category: DesignCategory::Printability,
                priority: SuggestionPriority::Recommended,
                current_value: Some(json!(params.layer_height)),
                suggested_value: Some(json!(optimal)),
                why_it_matters: direction.to_string(),
                if_ignored: "Print time or finish will not match expectations.".to_string(),
                auto_fixable: false,
                fix_parameter: None,
            });
        }

        let Some(profile) = mkb.lookup_filament(material) else {
            warnings.push(format!("Unknown material '{material}'"));
            return (suggestions, warnings);
        };

        // Temperatures
        if !profile.nozzle_temp.contains(params.nozzle_temperature) {
            suggestions.push(Suggestion {
                title: "Nozzle temperature outside the material range".to_string(),
                description: format!(
                    "{:.0}°C is outside {:.0}-{:.0}°C for {}",
                    params.nozzle_temperature,
                    profile.nozzle_temp.min,
                    profile.nozzle_temp.max,
                    profile.name
                ),
                category: DesignCategory::Material,
                priority: SuggestionPriority::Critical,
                current_value: Some(json!(params.nozzle_temperature)),
                suggested_value: Some(json!(profile.nozzle_temp.optimal)),
                why_it_matters: "Too cold clogs; too hot degrades and strings.".to_string(),
                if_ignored: "Expect poor layer bonding or stringing.".to_string(),
                auto_fixable: false,
                fix_parameter: None,
            });
        }

        // Flexible materials hate speed
        if profile.is_flexible && params.outer_wall_speed > 30.0 {
            suggestions.push(Suggestion {
                title: "Too fast for flexible filament".to_string(),
                description: format!(
                    "{:.0}mm/s outer walls will jam the extruder",
                    params.outer_wall_speed
                ),
                category: DesignCategory::Material,
                priority: SuggestionPriority::Critical,
                current_value: Some(json!(params.outer_wall_speed)),
                suggested_value: Some(json!(28.0)),
                why_it_matters: "Flexible filament buckles in the feed path at speed.".to_string(),
                if_ignored: "The extruder will jam mid-print.".to_string(),
                auto_fixable: false,
                fix_parameter: None,
            });
        }

        // Volumetric flow
        let flow = params.layer_height * params.line_width * params.outer_wall_speed;
        if flow > profile.max_volumetric_flow {
            warnings.push(format!(
                "Outer wall flow {flow:.1}mm³/s exceeds the {:.1}mm³/s the hot end can melt",
                profile.max_volumetric_flow
            ));
        }

        // Adhesion for warp-prone materials
        if profile.is_warp_prone() && params.brim_width < 5.0 {
            suggestions.push(Suggestion {
                title: "Brim recommended".to_string(),
                description: format!("{} is prone to warping", profile.name),
                category: DesignCategory::Material,
                priority: SuggestionPriority::Recommended,
                current_value: Some(json!(params.brim_width)),
                suggested_value: Some(json!(8.0)),
                why_it_matters: "A brim anchors corners that would otherwise lift.".to_string(),
                if_ignored: "Corners may lift off the plate mid-print.".to_string(),
                auto_fixable: false,
                fix_parameter: None,
            });
        }

        (suggestions, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_sets() {
        let rigid = slicing_questions("bambu_pla");
        assert_eq!(rigid.len(), 2);
        assert_eq!(rigid[0].id, "quality");
        assert_eq!(rigid[1].id, "use_case");

        let flexible = slicing_questions("generic_tpu_95a");
        assert_eq!(flexible.len(), 3);
        assert_eq!(flexible[2].id, "flexibility");
    }

    #[test]
    fn test_material_notes() {
        let mkb = MaterialKnowledgeBase::global();

        let petg = material_notes(mkb.lookup_filament("bambu_petg_translucent").unwrap());
        assert!(petg.iter().any(|n| n.contains("string")));

        let tpu = material_notes(mkb.lookup_filament("generic_tpu_95a").unwrap());
        assert!(tpu.iter().any(|n| n.contains("directly")));
    }

    #[test]
    fn test_review_flags_bad_temperature() {
        let params = SlicingParameterSet {
            nozzle_temperature: 190.0,
            ..Default::default()
        };
        let (suggestions, _) = SlicingReviewer::new().review(
            &params,
            "bambu_petg_translucent",
            0.4,
            QualityPreset::Standard,
        );
        assert!(suggestions
            .iter()
            .any(|s| s.priority == SuggestionPriority::Critical
                && s.title.contains("temperature")));
    }

    #[test]
    fn test_review_flags_fast_tpu() {
        let params = SlicingParameterSet {
            outer_wall_speed: 60.0,
            nozzle_temperature: 230.0,
            ..Default::default()
        };
        let (suggestions, _) =
            SlicingReviewer::new().review(&params, "generic_tpu_95a", 0.4, QualityPreset::Standard);
        assert!(suggestions.iter().any(|s| s.title.contains("flexible")));
    }

    #[test]
    fn test_review_warns_on_thick_layers() {
        let params = SlicingParameterSet {
            layer_height: 0.32,
            initial_layer_height: 0.38,
            ..Default::default()
        };
        let (_, warnings) =
            SlicingReviewer::new().review(&params, "bambu_pla", 0.4, QualityPreset::Draft);
        assert!(warnings.iter().any(|w| w.contains("75%")));
    }
}
