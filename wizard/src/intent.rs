//! Plain-language intent parsing.
//!
//! Turns layperson phrasing ("heavy duty", "snug fit", "about 65mm") into
//! structured requirements. Built once per description and read-only after
//! that.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Millimeters per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Strength requirement parsed from a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthLevel {
    Light,
    Medium,
    Heavy,
    Extreme,
}

impl StrengthLevel {
    /// Wall thickness implied by the strength level (mm).
    pub fn wall_thickness_mm(&self) -> f64 {
        match self {
            StrengthLevel::Light => 1.5,
            StrengthLevel::Medium => 2.0,
            StrengthLevel::Heavy => 3.0,
            StrengthLevel::Extreme => 4.0,
        }
    }

    /// Infill density implied by the strength level (percent).
    pub fn infill_percent(&self) -> f64 {
        match self {
            StrengthLevel::Light => 15.0,
            StrengthLevel::Medium => 20.0,
            StrengthLevel::Heavy => 30.0,
            StrengthLevel::Extreme => 50.0,
        }
    }
}

/// How parts should fit together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitType {
    Press,
    Tight,
    Snug,
    Sliding,
    Loose,
}

impl FitType {
    /// Clearance implied by the fit type (mm).
    pub fn clearance_mm(&self) -> f64 {
        match self {
            FitType::Press => 0.0,
            FitType::Tight => 0.15,
            FitType::Snug => 0.3,
            FitType::Sliding => 0.5,
            FitType::Loose => 1.0,
        }
    }
}

/// Relative size of the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
}

impl SizeCategory {
    /// Classifies a primary dimension in millimeters.
    pub fn from_dimension(mm: f64) -> Self {
        if mm < 20.0 {
            SizeCategory::Tiny
        } else if mm < 50.0 {
            SizeCategory::Small
        } else if mm < 150.0 {
            SizeCategory::Medium
        } else if mm < 250.0 {
            SizeCategory::Large
        } else {
            SizeCategory::Huge
        }
    }

    /// Default layer height for the size (mm); small parts want finer detail.
    pub fn layer_height_mm(&self) -> f64 {
        match self {
            SizeCategory::Tiny => 0.12,
            SizeCategory::Small => 0.16,
            SizeCategory::Medium => 0.20,
            SizeCategory::Large => 0.24,
            SizeCategory::Huge => 0.28,
        }
    }
}

/// Structured interpretation of a user's description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub strength: StrengthLevel,
    pub fit_type: FitType,
    pub size_category: SizeCategory,

    /// Extracted dimensions by name; `primary` when unqualified
    pub dimensions: BTreeMap<String, f64>,

    // Derived defaults
    pub wall_thickness_mm: f64,
    pub clearance_mm: f64,
    pub infill_percent: f64,
    pub layer_height_mm: f64,

    pub suggested_materials: Vec<String>,

    // Feature flags
    pub needs_grip: bool,
    pub needs_flex: bool,
    pub waterproof: bool,
    pub heat_resistant: bool,

    /// Parser confidence in [0, 1]
    pub confidence: f64,

    pub clarifying_questions: Vec<String>,
}

impl Default for ParsedIntent {
    fn default() -> Self {
        Self {
            strength: StrengthLevel::Medium,
            fit_type: FitType::Snug,
            size_category: SizeCategory::Medium,
            dimensions: BTreeMap::new(),
            wall_thickness_mm: 2.0,
            clearance_mm: 0.3,
            infill_percent: 20.0,
            layer_height_mm: 0.20,
            suggested_materials: Vec::new(),
            needs_grip: false,
            needs_flex: false,
            waterproof: false,
            heat_resistant: false,
            confidence: 0.8,
            clarifying_questions: Vec::new(),
        }
    }
}

const STRENGTH_TERMS: &[(StrengthLevel, &[&str])] = &[
    (
        StrengthLevel::Extreme,
        &["extreme", "maximum strength", "industrial-grade", "unbreakable", "indestructible", "super strong"],
    ),
    (
        StrengthLevel::Heavy,
        &["heavy duty", "heavy-duty", "heavy", "strong", "sturdy", "robust", "durable", "tough", "solid", "rugged", "industrial", "reinforced", "thick"],
    ),
    (
        StrengthLevel::Light,
        &["decorative", "display", "delicate", "thin", "minimal", "light duty", "lightweight"],
    ),
];

const FIT_TERMS: &[(FitType, &[&str])] = &[
    (
        FitType::Press,
        &["press fit", "press-fit", "permanent", "interference", "won't come off"],
    ),
    (
        FitType::Tight,
        &["tight", "friction fit", "secure", "firm", "doesn't move"],
    ),
    (
        FitType::Sliding,
        &["sliding", "slides", "glides", "easy to move", "repositioning"],
    ),
    (
        FitType::Loose,
        &["loose", "falls off", "drops in", "quick release", "easy on off", "easy to remove"],
    ),
    (
        FitType::Snug,
        &["snug", "comfortable", "stays in place", "adjustable", "removable"],
    ),
];

const SIZE_TERMS: &[(SizeCategory, &[&str])] = &[
    (SizeCategory::Tiny, &["tiny", "miniature", "micro", "keychain", "earring"]),
    (SizeCategory::Small, &["small", "compact", "little", "pocket", "palm-sized", "handheld"]),
    (SizeCategory::Large, &["large", "big", "sizeable", "substantial", "hefty"]),
    (SizeCategory::Huge, &["huge", "massive", "giant", "oversized", "extra large"]),
];

const GRIP_TERMS: &[&str] = &["grip", "textured", "ridges", "ridged", "non-slip", "non slip", "grippy", "ergonomic"];
const FLEX_TERMS: &[&str] = &["flexible", "bendy", "flex", "rubbery", "elastic", "squishy", "bouncy"];
const WATERPROOF_TERMS: &[&str] = &["waterproof", "water-proof", "watertight", "water tight", "sealed", "bathroom", "outdoor"];
const HEAT_TERMS: &[&str] = &["heat", "hot", "oven", "microwave", "dishwasher", "boiling", "steam"];

/// Parses a dimension expression like `65 mm` or `2.5 inches` to millimeters.
pub fn parse_dimension(text: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(mm|millimeters?|inch(?:es)?|in|\x22)\s*$").unwrap()
    });

    let caps = re.captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    let unit = caps[2].to_lowercase();
    if unit.starts_with("mm") || unit.starts_with("millimeter") {
        Some(value)
    } else {
        Some(value * MM_PER_INCH)
    }
}

/// Renders a millimeter value back into the given unit string.
pub fn render_dimension(mm: f64, inches: bool) -> String {
    if inches {
        format!("{} inches", mm / MM_PER_INCH)
    } else {
        format!("{mm} mm")
    }
}

/// Parses layperson descriptions into technical parameters.
#[derive(Debug, Default)]
pub struct IntentParser;

impl IntentParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, description: &str) -> ParsedIntent {
        let text = description.to_lowercase();
        let mut intent = ParsedIntent::default();

        self.extract_dimensions(&text, &mut intent);
        self.extract_strength(&text, &mut intent);
        self.extract_fit(&text, &mut intent);
        self.extract_size(&text, &mut intent);
        self.extract_features(&text, &mut intent);
        self.suggest_materials(&mut intent);
        self.derive_parameters(&mut intent);
        self.generate_questions(&text, &mut intent);

        intent
    }

    fn extract_dimensions(&self, text: &str, intent: &mut ParsedIntent) {
        static QUALIFIED_MM: OnceLock<Regex> = OnceLock::new();
        static NAMED_MM: OnceLock<Regex> = OnceLock::new();
        static ABOUT_MM: OnceLock<Regex> = OnceLock::new();
        static INCHES: OnceLock<Regex> = OnceLock::new();
        static BARE_MM: OnceLock<Regex> = OnceLock::new();

        let qualified = QUALIFIED_MM.get_or_init(|| {
            Regex::new(
                r"(\d+(?:\.\d+)?)\s*mm\s*(diameter|wide|width|long|length|tall|height|thick|deep|depth)",
            )
            .unwrap()
        });
        let named = NAMED_MM.get_or_init(|| {
            Regex::new(
                r"(diameter|width|length|height|thickness|depth)\s*(?:of|is|:)?\s*(\d+(?:\.\d+)?)\s*mm",
            )
            .unwrap()
        });
        let about = ABOUT_MM
            .get_or_init(|| Regex::new(r"(?:about|around|roughly|[~≈])\s*(\d+(?:\.\d+)?)\s*mm").unwrap());
        let inches = INCHES.get_or_init(|| {
            Regex::new(r"(\d+(?:\.\d+)?)\s*inch(?:es)?\s*(diameter|wide|width|long|length|tall|height)?")
                .unwrap()
        });
        let bare = BARE_MM
            .get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*mm\b").unwrap());

        for caps in qualified.captures_iter(text) {
            if let Ok(value) = caps[1].parse::<f64>() {
                intent
                    .dimensions
                    .insert(canonical_dimension(&caps[2]), value);
            }
        }
        for caps in named.captures_iter(text) {
            if let Ok(value) = caps[2].parse::<f64>() {
                intent
                    .dimensions
                    .entry(canonical_dimension(&caps[1]))
                    .or_insert(value);
            }
        }
        for caps in inches.captures_iter(text) {
            if let Ok(value) = caps[1].parse::<f64>() {
                let key = caps
                    .get(2)
                    .map(|m| canonical_dimension(m.as_str()))
                    .unwrap_or_else(|| "primary".to_string());
                intent.dimensions.entry(key).or_insert(value * MM_PER_INCH);
            }
        }
        for caps in about.captures_iter(text) {
            if let Ok(value) = caps[1].parse::<f64>() {
                intent
                    .dimensions
                    .entry("primary".to_string())
                    .or_insert(value);
            }
        }
        if intent.dimensions.is_empty() {
            if let Some(caps) = bare.captures(text) {
                if let Ok(value) = caps[1].parse::<f64>() {
                    intent.dimensions.insert("primary".to_string(), value);
                }
            }
        }

        // A named diameter doubles as the primary dimension
        if !intent.dimensions.contains_key("primary") {
            if let Some(&diameter) = intent.dimensions.get("diameter") {
                intent.dimensions.insert("primary".to_string(), diameter);
            }
        }

        if let Some(&primary) = intent.dimensions.get("primary") {
            intent.size_category = SizeCategory::from_dimension(primary);
        }
    }

    fn extract_strength(&self, text: &str, intent: &mut ParsedIntent) {
        for (level, terms) in STRENGTH_TERMS {
            if terms.iter().any(|term| text.contains(term)) {
                intent.strength = *level;
                return;
            }
        }
    }

    fn extract_fit(&self, text: &str, intent: &mut ParsedIntent) {
        for (fit, terms) in FIT_TERMS {
            if terms.iter().any(|term| text.contains(term)) {
                intent.fit_type = *fit;
                return;
            }
        }
    }

    fn extract_size(&self, text: &str, intent: &mut ParsedIntent) {
        if !intent.dimensions.is_empty() {
            return;
        }
        for (size, terms) in SIZE_TERMS {
            if terms.iter().any(|term| text.contains(term)) {
                intent.size_category = *size;
                return;
            }
        }
    }

    fn extract_features(&self, text: &str, intent: &mut ParsedIntent) {
        intent.needs_grip = GRIP_TERMS.iter().any(|t| text.contains(t));
        intent.needs_flex = FLEX_TERMS.iter().any(|t| text.contains(t));
        intent.waterproof = WATERPROOF_TERMS.iter().any(|t| text.contains(t));
        intent.heat_resistant = HEAT_TERMS.iter().any(|t| text.contains(t));
    }

    fn suggest_materials(&self, intent: &mut ParsedIntent) {
        intent.suggested_materials = if intent.needs_flex {
            vec!["generic_tpu_95a".to_string()]
        } else if intent.heat_resistant {
            vec!["prusa_pc_blend".to_string(), "generic_petg".to_string()]
        } else if intent.waterproof {
            vec!["generic_petg".to_string(), "bambu_petg_translucent".to_string()]
        } else {
            vec!["bambu_pla".to_string()]
        };
    }

    fn derive_parameters(&self, intent: &mut ParsedIntent) {
        intent.wall_thickness_mm = intent.strength.wall_thickness_mm();
        intent.clearance_mm = intent.fit_type.clearance_mm();
        intent.infill_percent = intent.strength.infill_percent();
        intent.layer_height_mm = intent.size_category.layer_height_mm();
    }

    fn generate_questions(&self, text: &str, intent: &mut ParsedIntent) {
        let mut questions = Vec::new();

        if intent.dimensions.is_empty() {
            questions.push(
                "What are the dimensions? (e.g., '65mm diameter' or 'about 2 inches wide')"
                    .to_string(),
            );
        }
        if intent.strength == StrengthLevel::Heavy && intent.needs_flex {
            questions.push(
                "You mentioned both 'heavy duty' and 'flexible' - which matters more?"
                    .to_string(),
            );
        }
        if !text.contains("fit") && intent.fit_type == FitType::Snug {
            questions.push(
                "How should it fit? (snug/tight for staying put, loose for easy removal)"
                    .to_string(),
            );
        }

        intent.confidence = (1.0 - questions.len() as f64 * 0.15).max(0.5);
        intent.clarifying_questions = questions;
    }
}

fn canonical_dimension(raw: &str) -> String {
    match raw {
        "wide" => "width",
        "long" => "length",
        "tall" => "height",
        "thick" => "thickness",
        "deep" => "depth",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tube_squeezer_description() {
        let parser = IntentParser::new();
        let intent = parser.parse(
            "a heavy duty squeezer for a lotion bottle, about 65mm diameter, snug fit",
        );

        assert_eq!(intent.strength, StrengthLevel::Heavy);
        assert_eq!(intent.fit_type, FitType::Snug);
        assert_eq!(intent.dimensions.get("diameter"), Some(&65.0));
        assert_eq!(intent.dimensions.get("primary"), Some(&65.0));
        assert_eq!(intent.size_category, SizeCategory::Medium);
        assert_eq!(intent.wall_thickness_mm, 3.0);
        assert_eq!(intent.clearance_mm, 0.3);
    }

    #[test]
    fn test_strength_to_wall_table() {
        assert_eq!(StrengthLevel::Light.wall_thickness_mm(), 1.5);
        assert_eq!(StrengthLevel::Medium.wall_thickness_mm(), 2.0);
        assert_eq!(StrengthLevel::Heavy.wall_thickness_mm(), 3.0);
        assert_eq!(StrengthLevel::Extreme.wall_thickness_mm(), 4.0);
    }

    #[test]
    fn test_fit_to_clearance_table() {
        assert_eq!(FitType::Press.clearance_mm(), 0.0);
        assert_eq!(FitType::Tight.clearance_mm(), 0.15);
        assert_eq!(FitType::Snug.clearance_mm(), 0.3);
        assert_eq!(FitType::Sliding.clearance_mm(), 0.5);
        assert_eq!(FitType::Loose.clearance_mm(), 1.0);
    }

    #[test]
    fn test_inch_dimensions_convert() {
        let parser = IntentParser::new();
        let intent = parser.parse("a hook 2.5 inches wide");
        let width = intent.dimensions.get("width").copied().unwrap();
        assert!((width - 63.5).abs() < 1e-9);
    }

    #[test]
    fn test_dimension_parse_render_law() {
        for text in ["65 mm", "2.5 inches", "10mm", "1 inch"] {
            let mm = parse_dimension(text).unwrap();
            let inches = text.contains("inch");
            let rendered = render_dimension(mm, inches);
            let reparsed = parse_dimension(&rendered).unwrap();
            assert!(
                (mm - reparsed).abs() < 1e-6,
                "{text}: {mm} != {reparsed}"
            );
        }
        assert_eq!(parse_dimension("2 inches"), Some(50.8));
        assert_eq!(parse_dimension("banana"), None);
    }

    #[test]
    fn test_feature_flags_and_materials() {
        let parser = IntentParser::new();

        let flex = parser.parse("a flexible phone grip");
        assert!(flex.needs_flex);
        assert!(flex.needs_grip);
        assert_eq!(flex.suggested_materials, vec!["generic_tpu_95a"]);

        let outdoor = parser.parse("a waterproof planter box for outdoor use");
        assert!(outdoor.waterproof);
        assert!(outdoor
            .suggested_materials
            .iter()
            .all(|m| m.contains("petg")));
    }

    #[test]
    fn test_missing_dimensions_asks() {
        let parser = IntentParser::new();
        let intent = parser.parse("a strong hook");
        assert!(intent
            .clarifying_questions
            .iter()
            .any(|q| q.contains("dimensions")));
        assert!(intent.confidence < 0.8);
        assert!(intent.confidence >= 0.5);
    }

    #[test]
    fn test_size_keywords_without_dimensions() {
        let parser = IntentParser::new();
        let intent = parser.parse("a tiny keychain charm");
        assert_eq!(intent.size_category, SizeCategory::Tiny);
        assert_eq!(intent.layer_height_mm, 0.12);
    }

    #[test]
    fn test_size_classification_bounds() {
        assert_eq!(SizeCategory::from_dimension(19.9), SizeCategory::Tiny);
        assert_eq!(SizeCategory::from_dimension(20.0), SizeCategory::Small);
        assert_eq!(SizeCategory::from_dimension(149.9), SizeCategory::Medium);
        assert_eq!(SizeCategory::from_dimension(250.0), SizeCategory::Huge);
    }
}
