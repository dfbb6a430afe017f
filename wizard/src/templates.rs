//! Model template registry.
//!
//! Each template tags a family of generatable models and carries its own
//! design question set. The registry is a closed enum plus static data; the
//! mesh generators themselves live outside this system.

use serde::{Deserialize, Serialize};

use crate::workflow::{Question, QuestionKind, QuestionOption};
use crate::DesignParameterSet;

/// Closed set of model families the workflow understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTemplate {
    /// Tube/bottle squeezer with a slot sized to the tube
    TubeSqueezer,
    /// Wall or rail hook
    Hook,
    /// L- or T-bracket
    Bracket,
    /// Open box or bin
    Container,
    /// Anything else
    Generic,
}

impl ModelTemplate {
    /// Detects the template family from a description.
    pub fn detect(description: &str) -> Self {
        let text = description.to_lowercase();
        if text.contains("squeezer") || text.contains("tube") || text.contains("toothpaste") {
            ModelTemplate::TubeSqueezer
        } else if text.contains("hook") || text.contains("hanger") {
            ModelTemplate::Hook
        } else if text.contains("bracket") || text.contains("mount") {
            ModelTemplate::Bracket
        } else if text.contains("box") || text.contains("container") || text.contains("bin") {
            ModelTemplate::Container
        } else {
            ModelTemplate::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTemplate::TubeSqueezer => "tube_squeezer",
            ModelTemplate::Hook => "hook",
            ModelTemplate::Bracket => "bracket",
            ModelTemplate::Container => "container",
            ModelTemplate::Generic => "generic",
        }
    }

    /// Category-specific design questions for the design-review checkpoint.
    pub fn design_questions(&self, design: &DesignParameterSet) -> Vec<Question> {
        let mut questions = vec![Question {
            id: "wall_thickness_mm".to_string(),
            prompt: "Wall thickness?".to_string(),
            kind: QuestionKind::Text,
            options: Vec::new(),
            current_value: Some(serde_json::json!(design.wall_thickness_mm)),
            default_value: None,
        }];

        match self {
            ModelTemplate::TubeSqueezer => {
                questions.push(Question {
                    id: "clearance_mm".to_string(),
                    prompt: "How much slack should the slot have around the tube?".to_string(),
                    kind: QuestionKind::Select,
                    options: vec![
                        QuestionOption::new("0.15", "Tight (grips the tube)"),
                        QuestionOption::new("0.3", "Snug (recommended)"),
                        QuestionOption::new("1.0", "Loose (slides freely)"),
                    ],
                    current_value: Some(serde_json::json!(design.clearance_mm)),
                    default_value: Some("0.3".to_string()),
                });
                questions.push(Question {
                    id: "needs_grip".to_string(),
                    prompt: "Add a grip texture to the handle?".to_string(),
                    kind: QuestionKind::Confirm,
                    options: Vec::new(),
                    current_value: Some(serde_json::json!(design.needs_grip)),
                    default_value: None,
                });
            }
            ModelTemplate::Hook => {
                questions.push(Question {
                    id: "clearance_mm".to_string(),
                    prompt: "Gap between the hook and the rail?".to_string(),
                    kind: QuestionKind::Text,
                    options: Vec::new(),
                    current_value: Some(serde_json::json!(design.clearance_mm)),
                    default_value: None,
                });
            }
            ModelTemplate::Bracket | ModelTemplate::Container | ModelTemplate::Generic => {}
        }

        questions
    }
}

impl Default for ModelTemplate {
    fn default() -> Self {
        ModelTemplate::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection() {
        assert_eq!(
            ModelTemplate::detect("a squeezer for my toothpaste"),
            ModelTemplate::TubeSqueezer
        );
        assert_eq!(ModelTemplate::detect("a coat hook"), ModelTemplate::Hook);
        assert_eq!(
            ModelTemplate::detect("a shelf bracket"),
            ModelTemplate::Bracket
        );
        assert_eq!(
            ModelTemplate::detect("a storage bin"),
            ModelTemplate::Container
        );
        assert_eq!(
            ModelTemplate::detect("something nice"),
            ModelTemplate::Generic
        );
    }

    #[test]
    fn test_template_question_sets() {
        let design = DesignParameterSet::default();
        let squeezer = ModelTemplate::TubeSqueezer.design_questions(&design);
        assert!(squeezer.iter().any(|q| q.id == "clearance_mm"));
        assert!(squeezer.iter().any(|q| q.id == "needs_grip"));

        let generic = ModelTemplate::Generic.design_questions(&design);
        assert_eq!(generic.len(), 1);
    }
}
