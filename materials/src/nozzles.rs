//! Nozzle profiles for the supported printer family.
//!
//! The vendor ships 0.2mm stainless, 0.4mm in both metallurgies, and 0.6/0.8mm
//! hardened only. Layer height envelopes follow the usual 25-75% of diameter
//! rule.

use serde::{Deserialize, Serialize};

/// Nozzle metallurgy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NozzleMetallurgy {
    Standard,
    Hardened,
}

/// Nozzle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NozzleProfile {
    /// Bore diameter (mm)
    pub diameter: f64,

    /// Stainless or hardened steel
    pub metallurgy: NozzleMetallurgy,

    /// Minimum reliable layer height (mm)
    pub min_layer_height: f64,

    /// Sweet-spot layer height (mm)
    pub optimal_layer_height: f64,

    /// Maximum reliable layer height (mm)
    pub max_layer_height: f64,

    /// Speed multiplier relative to the 0.4mm baseline
    pub speed_multiplier: f64,

    /// Safe for carbon/glass filled filaments
    pub abrasive_safe: bool,

    /// Typical use cases
    pub best_for: Vec<String>,

    /// Use cases to avoid
    pub avoid_for: Vec<String>,
}

impl NozzleProfile {
    /// Layer height envelope as (fine, standard, draft).
    pub fn layer_heights(&self) -> (f64, f64, f64) {
        (
            self.min_layer_height,
            self.optimal_layer_height,
            self.max_layer_height,
        )
    }

    /// Display label like "0.4mm hardened steel".
    pub fn label(&self) -> String {
        let metal = match self.metallurgy {
            NozzleMetallurgy::Standard => "stainless steel",
            NozzleMetallurgy::Hardened => "hardened steel",
        };
        format!("{}mm {metal}", self.diameter)
    }
}

/// Builds the built-in nozzle set.
pub(crate) fn builtin_nozzles() -> Vec<NozzleProfile> {
    vec![
        NozzleProfile {
            diameter: 0.2,
            metallurgy: NozzleMetallurgy::Standard,
            min_layer_height: 0.06,
            optimal_layer_height: 0.10,
            max_layer_height: 0.14,
            speed_multiplier: 0.5,
            abrasive_safe: false,
            best_for: vec![
                "miniatures and fine detail".to_string(),
                "small text and engravings".to_string(),
            ],
            avoid_for: vec!["large parts (very slow)".to_string()],
        },
        NozzleProfile {
            diameter: 0.4,
            metallurgy: NozzleMetallurgy::Standard,
            min_layer_height: 0.08,
            optimal_layer_height: 0.20,
            max_layer_height: 0.28,
            speed_multiplier: 1.0,
            abrasive_safe: false,
            best_for: vec![
                "general purpose printing".to_string(),
                "balanced detail and speed".to_string(),
            ],
            avoid_for: vec![],
        },
        NozzleProfile {
            diameter: 0.4,
            metallurgy: NozzleMetallurgy::Hardened,
            min_layer_height: 0.08,
            optimal_layer_height: 0.20,
            max_layer_height: 0.28,
            speed_multiplier: 1.0,
            abrasive_safe: true,
            best_for: vec!["carbon fiber filaments at standard detail".to_string()],
            avoid_for: vec![],
        },
        NozzleProfile {
            diameter: 0.6,
            metallurgy: NozzleMetallurgy::Hardened,
            min_layer_height: 0.12,
            optimal_layer_height: 0.30,
            max_layer_height: 0.42,
            speed_multiplier: 1.3,
            abrasive_safe: true,
            best_for: vec!["strong functional parts, faster".to_string()],
            avoid_for: vec!["fine surface detail".to_string()],
        },
        NozzleProfile {
            diameter: 0.8,
            metallurgy: NozzleMetallurgy::Hardened,
            min_layer_height: 0.16,
            optimal_layer_height: 0.40,
            max_layer_height: 0.56,
            speed_multiplier: 1.6,
            abrasive_safe: true,
            best_for: vec!["large drafts and vases".to_string()],
            avoid_for: vec!["anything needing detail".to_string()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_nozzles_are_sane() {
        for nozzle in builtin_nozzles() {
            assert!(nozzle.min_layer_height < nozzle.max_layer_height);
            assert!(nozzle.max_layer_height <= nozzle.diameter * 0.75 + 1e-9);
            assert!(nozzle.speed_multiplier > 0.0);
        }
    }

    #[test]
    fn test_only_hardened_is_abrasive_safe() {
        for nozzle in builtin_nozzles() {
            if nozzle.abrasive_safe {
                assert_eq!(nozzle.metallurgy, NozzleMetallurgy::Hardened);
            }
        }
    }

    #[test]
    fn test_label() {
        let nozzle = builtin_nozzles().remove(0);
        assert_eq!(nozzle.label(), "0.2mm stainless steel");
    }
}
