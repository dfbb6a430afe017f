//! Deterministic design review.
//!
//! Checks the accumulated design parameters against printability rules and
//! the selected material, producing prioritized suggestions. Critical
//! findings block workflow advancement until fixed or explicitly overridden.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use printforge_materials::FilamentProfile;

use crate::intent::{ParsedIntent, StrengthLevel};
use crate::DesignParameterSet;

/// Priority of a design suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionPriority {
    /// Must fix: will cause a print failure
    Critical,
    /// Should consider: improves quality
    Recommended,
    /// Nice to have
    Optional,
}

/// Categories of design suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignCategory {
    Dimensions,
    Structure,
    Printability,
    Material,
}

/// A suggestion for improving the design or settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    pub description: String,
    pub category: DesignCategory,
    pub priority: SuggestionPriority,

    pub current_value: Option<Value>,
    pub suggested_value: Option<Value>,

    /// Novice-friendly explanation of why this matters
    pub why_it_matters: String,

    /// What happens if ignored
    pub if_ignored: String,

    /// Whether the workflow can apply the suggested value automatically
    pub auto_fixable: bool,

    /// Design field the auto-fix writes to
    pub fix_parameter: Option<String>,
}

/// Complete review result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignReview {
    pub suggestions: Vec<Suggestion>,
    pub critical_issues: u32,
    pub recommendations: u32,
    pub auto_fixable: u32,
}

impl DesignReview {
    pub fn passed(&self) -> bool {
        self.critical_issues == 0
    }

    pub fn critical_titles(&self) -> Vec<String> {
        self.suggestions
            .iter()
            .filter(|s| s.priority == SuggestionPriority::Critical)
            .map(|s| s.title.clone())
            .collect()
    }
}

/// Deterministic design reviewer.
#[derive(Debug, Default)]
pub struct DesignReviewer;

impl DesignReviewer {
    pub fn new() -> Self {
        Self
    }

    pub fn review(
        &self,
        design: &DesignParameterSet,
        intent: Option<&ParsedIntent>,
        material: Option<&FilamentProfile>,
        nozzle_diameter: f64,
    ) -> DesignReview {
        let mut suggestions = Vec::new();

        self.check_wall_thickness(design, nozzle_diameter, &mut suggestions);
        self.check_clearance(design, &mut suggestions);
        self.check_small_features(design, nozzle_diameter, &mut suggestions);
        self.check_strength(design, intent, &mut suggestions);
        self.check_material(design, material, &mut suggestions);

        let critical_issues = suggestions
            .iter()
            .filter(|s| s.priority == SuggestionPriority::Critical)
            .count() as u32;
        let recommendations = suggestions
            .iter()
            .filter(|s| s.priority == SuggestionPriority::Recommended)
            .count() as u32;
        let auto_fixable = suggestions.iter().filter(|s| s.auto_fixable).count() as u32;

        DesignReview {
            suggestions,
            critical_issues,
            recommendations,
            auto_fixable,
        }
    }

    fn check_wall_thickness(
        &self,
        design: &DesignParameterSet,
        nozzle_diameter: f64,
        suggestions: &mut Vec<Suggestion>,
    ) {
        // At least two solid perimeters
        let min_wall = (nozzle_diameter * 2.0).max(0.8);
        if design.wall_thickness_mm < min_wall {
            suggestions.push(Suggestion {
                title: "Wall thickness too thin".to_string(),
                description: format!(
                    "A wall of {:.2}mm is too thin to print reliably.",
                    design.wall_thickness_mm
                ),
                category: DesignCategory::Dimensions,
                priority: SuggestionPriority::Critical,
                current_value: Some(Value::from(design.wall_thickness_mm)),
                suggested_value: Some(Value::from(min_wall.max(1.2))),
                why_it_matters: format!(
                    "With a {nozzle_diameter}mm nozzle you need at least {min_wall}mm for two solid perimeters."
                ),
                if_ignored: "The part may have gaps, be fragile, or fail to print.".to_string(),
                auto_fixable: true,
                fix_parameter: Some("wall_thickness_mm".to_string()),
            });
        }
    }

    fn check_clearance(&self, design: &DesignParameterSet, suggestions: &mut Vec<Suggestion>) {
        let clearance = design.clearance_mm;

        // Parts that must separate need at least 0.2mm; zero means the
        // designer wants an interference fit
        if clearance > 0.0 && clearance < 0.2 {
            suggestions.push(Suggestion {
                title: "Clearance too tight".to_string(),
                description: format!("A clearance of {clearance}mm may fuse the parts together."),
                category: DesignCategory::Dimensions,
                priority: SuggestionPriority::Critical,
                current_value: Some(Value::from(clearance)),
                suggested_value: Some(Value::from(0.3)),
                why_it_matters: "Printers have slight inaccuracies; below 0.2mm mating parts \
                                 often fuse or refuse to fit."
                    .to_string(),
                if_ignored: "Parts may not fit together or be impossible to separate.".to_string(),
                auto_fixable: true,
                fix_parameter: Some("clearance_mm".to_string()),
            });
        }

        if clearance > 2.0 {
            suggestions.push(Suggestion {
                title: "Large clearance - verify fit type".to_string(),
                description: format!("A clearance of {clearance}mm gives a very loose fit."),
                category: DesignCategory::Dimensions,
                priority: SuggestionPriority::Optional,
                current_value: Some(Value::from(clearance)),
                suggested_value: None,
                why_it_matters: "Fine for sliding fits, too sloppy for snug ones.".to_string(),
                if_ignored: "The part may be looser than intended.".to_string(),
                auto_fixable: false,
                fix_parameter: None,
            });
        }
    }

    fn check_small_features(
        &self,
        design: &DesignParameterSet,
        nozzle_diameter: f64,
        suggestions: &mut Vec<Suggestion>,
    ) {
        for key in ["hole_diameter", "slot_width", "feature_size"] {
            let Some(&size) = design.dimensions.get(key) else {
                continue;
            };
            if size < nozzle_diameter {
                suggestions.push(Suggestion {
                    title: format!("Feature may be too small: {key}"),
                    description: format!(
                        "The {key} of {size}mm is smaller than the nozzle diameter."
                    ),
                    category: DesignCategory::Printability,
                    priority: SuggestionPriority::Critical,
                    current_value: Some(Value::from(size)),
                    suggested_value: Some(Value::from(nozzle_diameter * 1.5)),
                    why_it_matters: format!(
                        "A {nozzle_diameter}mm nozzle cannot reliably print features below \
                         {nozzle_diameter}mm."
                    ),
                    if_ignored: "The feature may not print or will look very rough.".to_string(),
                    auto_fixable: true,
                    fix_parameter: Some(key.to_string()),
                });
            }
        }
    }

    fn check_strength(
        &self,
        design: &DesignParameterSet,
        intent: Option<&ParsedIntent>,
        suggestions: &mut Vec<Suggestion>,
    ) {
        let needs_strength = intent.is_some_and(|i| {
            matches!(i.strength, StrengthLevel::Heavy | StrengthLevel::Extreme)
        });

        if needs_strength && design.wall_thickness_mm < 2.5 {
            suggestions.push(Suggestion {
                title: "Consider thicker walls for heavy use".to_string(),
                description: "Heavy-duty applications benefit from 2.5-3mm walls.".to_string(),
                category: DesignCategory::Structure,
                priority: SuggestionPriority::Recommended,
                current_value: Some(Value::from(design.wall_thickness_mm)),
                suggested_value: Some(Value::from(3.0)),
                why_it_matters: "Thicker walls carry load much better under repeated stress."
                    .to_string(),
                if_ignored: "The part may crack or deform under load.".to_string(),
                auto_fixable: true,
                fix_parameter: Some("wall_thickness_mm".to_string()),
            });
        }
    }

    fn check_material(
        &self,
        design: &DesignParameterSet,
        material: Option<&FilamentProfile>,
        suggestions: &mut Vec<Suggestion>,
    ) {
        let Some(material) = material else {
            return;
        };

        if material.is_flexible && design.wall_thickness_mm < 1.2 {
            suggestions.push(Suggestion {
                title: "Walls too thin for flexible filament".to_string(),
                description: format!(
                    "{} needs walls of at least 1.2mm to hold its shape.",
                    material.name
                ),
                category: DesignCategory::Material,
                priority: SuggestionPriority::Recommended,
                current_value: Some(Value::from(design.wall_thickness_mm)),
                suggested_value: Some(Value::from(2.0)),
                why_it_matters: "Thin flexible walls collapse during printing.".to_string(),
                if_ignored: "The part may print deformed.".to_string(),
                auto_fixable: true,
                fix_parameter: Some("wall_thickness_mm".to_string()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printforge_materials::MaterialKnowledgeBase;

    fn design(wall: f64, clearance: f64) -> DesignParameterSet {
        DesignParameterSet {
            wall_thickness_mm: wall,
            clearance_mm: clearance,
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_design_passes() {
        let review = DesignReviewer::new().review(&design(2.0, 0.3), None, None, 0.4);
        assert!(review.passed());
        assert_eq!(review.critical_issues, 0);
    }

    #[test]
    fn test_thin_wall_is_critical_and_fixable() {
        let review = DesignReviewer::new().review(&design(0.5, 0.3), None, None, 0.4);
        assert!(!review.passed());
        assert_eq!(review.critical_issues, 1);

        let suggestion = &review.suggestions[0];
        assert_eq!(suggestion.priority, SuggestionPriority::Critical);
        assert!(suggestion.auto_fixable);
        assert_eq!(suggestion.fix_parameter.as_deref(), Some("wall_thickness_mm"));
        assert_eq!(suggestion.suggested_value, Some(Value::from(1.2)));
    }

    #[test]
    fn test_tight_clearance_is_critical_but_press_fit_is_not() {
        let review = DesignReviewer::new().review(&design(2.0, 0.1), None, None, 0.4);
        assert_eq!(review.critical_issues, 1);

        // Zero clearance is an intentional interference fit
        let press = DesignReviewer::new().review(&design(2.0, 0.0), None, None, 0.4);
        assert_eq!(press.critical_issues, 0);
    }

    #[test]
    fn test_large_clearance_is_informational() {
        let review = DesignReviewer::new().review(&design(2.0, 2.5), None, None, 0.4);
        assert!(review.passed());
        assert_eq!(review.suggestions.len(), 1);
        assert_eq!(review.suggestions[0].priority, SuggestionPriority::Optional);
    }

    #[test]
    fn test_small_feature_check() {
        let mut design = design(2.0, 0.3);
        design.dimensions.insert("hole_diameter".to_string(), 0.3);
        let review = DesignReviewer::new().review(&design, None, None, 0.4);
        assert_eq!(review.critical_issues, 1);
        assert!(review.suggestions[0].title.contains("hole_diameter"));
    }

    #[test]
    fn test_heavy_use_recommends_thicker_walls() {
        let mut intent = ParsedIntent::default();
        intent.strength = StrengthLevel::Heavy;

        let review = DesignReviewer::new().review(&design(2.0, 0.3), Some(&intent), None, 0.4);
        assert!(review.passed());
        assert_eq!(review.recommendations, 1);
        assert_eq!(
            review.suggestions[0].suggested_value,
            Some(Value::from(3.0))
        );
    }

    #[test]
    fn test_flexible_material_wall_note() {
        let mkb = MaterialKnowledgeBase::global();
        let tpu = mkb.lookup_filament("generic_tpu_95a");
        let review = DesignReviewer::new().review(&design(1.0, 0.3), None, tpu, 0.4);
        assert!(review
            .suggestions
            .iter()
            .any(|s| s.category == DesignCategory::Material));
    }
}
