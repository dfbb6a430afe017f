//! Filament profiles with printing envelopes.
//!
//! Values are drawn from vendor spec sheets and community testing for the
//! supported printer family. All temperatures are in °C, speeds in mm/s,
//! distances in mm, volumetric flow in mm³/s.

use serde::{Deserialize, Serialize};

/// Filament material classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialClass {
    /// Rigid PLA and blends
    RigidPla,
    /// PETG and copolyesters
    Petg,
    /// Polycarbonate and PC blends
    Pc,
    /// Flexible TPU
    TpuFlex,
    /// Carbon/glass filled abrasives
    CfAbrasive,
    /// Anything else (ABS, ASA, nylon, ...)
    Other,
}

/// How strongly a material pulls off the bed while cooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarpTendency {
    None,
    Low,
    Medium,
    High,
}

/// Temperature range with the recommended operating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: f64,
    pub optimal: f64,
    pub max: f64,
}

impl TemperatureRange {
    pub const fn new(min: f64, optimal: f64, max: f64) -> Self {
        Self { min, optimal, max }
    }

    /// Clamps a temperature into this range.
    pub fn clamp(&self, temp: f64) -> f64 {
        temp.clamp(self.min, self.max)
    }

    pub fn contains(&self, temp: f64) -> bool {
        temp >= self.min && temp <= self.max
    }
}

/// Part cooling fan envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoolingEnvelope {
    /// Minimum fan speed once cooling starts (percent)
    pub fan_min_percent: u32,

    /// Maximum useful fan speed (percent)
    pub fan_max_percent: u32,

    /// Number of initial layers printed with the fan off
    pub fan_off_layers: u32,
}

/// Complete filament profile with printing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilamentProfile {
    /// Registry key (normalized form of the name)
    pub key: String,

    /// Display name
    pub name: String,

    /// Material class
    pub material_class: MaterialClass,

    /// Hot end temperature range
    pub nozzle_temp: TemperatureRange,

    /// Bed temperature range
    pub bed_temp: TemperatureRange,

    /// Maximum print speed the material tolerates (mm/s)
    pub max_print_speed: f64,

    /// Maximum volumetric flow the hot end can melt (mm³/s)
    pub max_volumetric_flow: f64,

    /// Retraction length (mm, direct drive)
    pub retraction_length: f64,

    /// Retraction speed (mm/s)
    pub retraction_speed: f64,

    /// Cooling fan envelope
    pub cooling: CoolingEnvelope,

    /// Flexible material (cannot take normal retraction, needs slow speeds)
    pub is_flexible: bool,

    /// Abrasive material (requires a hardened nozzle)
    pub is_abrasive: bool,

    /// Can be fed through the multi-spool changer
    pub feeder_compatible: bool,

    /// Warping behavior
    pub warp_tendency: WarpTendency,

    /// Free-form handling notes
    pub notes: Vec<String>,
}

impl FilamentProfile {
    /// True for materials that need extra bed adhesion measures.
    pub fn is_warp_prone(&self) -> bool {
        self.warp_tendency >= WarpTendency::Medium
    }

    /// Combined notes as one string for display surfaces.
    pub fn special_notes(&self) -> String {
        self.notes.join(" | ")
    }

    /// Design guidance derived from the material's properties.
    pub fn design_recommendations(&self) -> Vec<String> {
        let mut recs = Vec::new();

        if self.is_flexible {
            recs.push("Reduce infill to 15-25% for flexibility".to_string());
            recs.push("Use 2-3 wall loops for flexible parts".to_string());
            recs.push("Avoid walls thinner than 1.2mm".to_string());
        }

        if self.is_warp_prone() {
            recs.push("Use a brim (8mm+) for bed adhesion".to_string());
            recs.push("Avoid large flat surfaces or add corner discs".to_string());
        }

        if self.is_abrasive {
            recs.push("Requires a hardened steel nozzle".to_string());
        }

        if !self.feeder_compatible {
            recs.push("Feed filament directly to the extruder (no spool changer)".to_string());
        }

        recs
    }
}

/// Builds the built-in profile set.
pub(crate) fn builtin_profiles() -> Vec<FilamentProfile> {
    vec![
        FilamentProfile {
            key: "bambu_pla".to_string(),
            name: "Bambu PLA Basic".to_string(),
            material_class: MaterialClass::RigidPla,
            nozzle_temp: TemperatureRange::new(190.0, 220.0, 230.0),
            bed_temp: TemperatureRange::new(35.0, 55.0, 65.0),
            max_print_speed: 300.0,
            max_volumetric_flow: 21.0,
            retraction_length: 0.8,
            retraction_speed: 30.0,
            cooling: CoolingEnvelope {
                fan_min_percent: 80,
                fan_max_percent: 100,
                fan_off_layers: 1,
            },
            is_flexible: false,
            is_abrasive: false,
            feeder_compatible: true,
            warp_tendency: WarpTendency::Low,
            notes: vec!["Easiest material to print; start here".to_string()],
        },
        FilamentProfile {
            key: "bambu_petg_translucent".to_string(),
            name: "Bambu PETG Translucent".to_string(),
            material_class: MaterialClass::Petg,
            nozzle_temp: TemperatureRange::new(230.0, 255.0, 270.0),
            bed_temp: TemperatureRange::new(60.0, 70.0, 80.0),
            max_print_speed: 200.0,
            max_volumetric_flow: 12.0,
            retraction_length: 1.0,
            retraction_speed: 30.0,
            cooling: CoolingEnvelope {
                fan_min_percent: 30,
                fan_max_percent: 50,
                fan_off_layers: 3,
            },
            is_flexible: false,
            is_abrasive: false,
            feeder_compatible: true,
            warp_tendency: WarpTendency::Low,
            notes: vec![
                "Tends to string; tune retraction and keep travel short".to_string(),
                "Dry before printing for best clarity".to_string(),
            ],
        },
        FilamentProfile {
            key: "generic_petg".to_string(),
            name: "Generic PETG".to_string(),
            material_class: MaterialClass::Petg,
            nozzle_temp: TemperatureRange::new(220.0, 240.0, 260.0),
            bed_temp: TemperatureRange::new(60.0, 70.0, 85.0),
            max_print_speed: 150.0,
            max_volumetric_flow: 10.0,
            retraction_length: 1.2,
            retraction_speed: 35.0,
            cooling: CoolingEnvelope {
                fan_min_percent: 30,
                fan_max_percent: 50,
                fan_off_layers: 3,
            },
            is_flexible: false,
            is_abrasive: false,
            feeder_compatible: true,
            warp_tendency: WarpTendency::Low,
            notes: vec!["Good outdoor and water resistance".to_string()],
        },
        FilamentProfile {
            key: "prusa_pc_blend".to_string(),
            name: "Prusament PC Blend".to_string(),
            material_class: MaterialClass::Pc,
            nozzle_temp: TemperatureRange::new(250.0, 275.0, 290.0),
            bed_temp: TemperatureRange::new(90.0, 100.0, 115.0),
            max_print_speed: 200.0,
            max_volumetric_flow: 8.0,
            retraction_length: 1.0,
            retraction_speed: 35.0,
            cooling: CoolingEnvelope {
                fan_min_percent: 0,
                fan_max_percent: 20,
                fan_off_layers: 4,
            },
            is_flexible: false,
            is_abrasive: false,
            feeder_compatible: true,
            warp_tendency: WarpTendency::High,
            notes: vec![
                "Prints best enclosed; on an open frame keep parts small".to_string(),
                "High heat resistance (~110°C)".to_string(),
            ],
        },
        FilamentProfile {
            key: "generic_tpu_95a".to_string(),
            name: "Generic TPU 95A".to_string(),
            material_class: MaterialClass::TpuFlex,
            nozzle_temp: TemperatureRange::new(210.0, 230.0, 250.0),
            bed_temp: TemperatureRange::new(25.0, 35.0, 45.0),
            max_print_speed: 60.0,
            max_volumetric_flow: 3.6,
            retraction_length: 0.5,
            retraction_speed: 20.0,
            cooling: CoolingEnvelope {
                fan_min_percent: 20,
                fan_max_percent: 50,
                fan_off_layers: 2,
            },
            is_flexible: true,
            is_abrasive: false,
            feeder_compatible: false,
            warp_tendency: WarpTendency::None,
            notes: vec![
                "Print slowly; flexible filament jams at speed".to_string(),
                "Cannot pass through the spool changer; feed directly".to_string(),
            ],
        },
        FilamentProfile {
            key: "generic_abs".to_string(),
            name: "Generic ABS".to_string(),
            material_class: MaterialClass::Other,
            nozzle_temp: TemperatureRange::new(230.0, 250.0, 270.0),
            bed_temp: TemperatureRange::new(80.0, 95.0, 110.0),
            max_print_speed: 180.0,
            max_volumetric_flow: 11.0,
            retraction_length: 0.8,
            retraction_speed: 30.0,
            cooling: CoolingEnvelope {
                fan_min_percent: 0,
                fan_max_percent: 30,
                fan_off_layers: 4,
            },
            is_flexible: false,
            is_abrasive: false,
            feeder_compatible: true,
            warp_tendency: WarpTendency::High,
            notes: vec!["Ventilate; styrene fumes".to_string()],
        },
        FilamentProfile {
            key: "pla_cf".to_string(),
            name: "PLA-CF".to_string(),
            material_class: MaterialClass::CfAbrasive,
            nozzle_temp: TemperatureRange::new(200.0, 230.0, 240.0),
            bed_temp: TemperatureRange::new(35.0, 55.0, 65.0),
            max_print_speed: 250.0,
            max_volumetric_flow: 16.0,
            retraction_length: 0.8,
            retraction_speed: 30.0,
            cooling: CoolingEnvelope {
                fan_min_percent: 80,
                fan_max_percent: 100,
                fan_off_layers: 1,
            },
            is_flexible: false,
            is_abrasive: true,
            feeder_compatible: true,
            warp_tendency: WarpTendency::Low,
            notes: vec!["Matte finish; hides layer lines well".to_string()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_range_clamp() {
        let range = TemperatureRange::new(190.0, 220.0, 230.0);
        assert_eq!(range.clamp(180.0), 190.0);
        assert_eq!(range.clamp(240.0), 230.0);
        assert_eq!(range.clamp(215.0), 215.0);
        assert!(range.contains(220.0));
        assert!(!range.contains(231.0));
    }

    #[test]
    fn test_builtin_profiles_are_sane() {
        for profile in builtin_profiles() {
            assert!(profile.nozzle_temp.min < profile.nozzle_temp.max, "{}", profile.name);
            assert!(profile.bed_temp.min < profile.bed_temp.max, "{}", profile.name);
            assert!(profile.max_volumetric_flow > 0.0);
            assert!(profile.retraction_length > 0.0);
            assert!(profile.cooling.fan_min_percent <= profile.cooling.fan_max_percent);
        }
    }

    #[test]
    fn test_flexible_profile_flags() {
        let tpu = builtin_profiles()
            .into_iter()
            .find(|p| p.key == "generic_tpu_95a")
            .unwrap();
        assert!(tpu.is_flexible);
        assert!(!tpu.feeder_compatible);
        assert!(tpu
            .design_recommendations()
            .iter()
            .any(|r| r.contains("directly")));
    }

    #[test]
    fn test_profile_serde_round_trip() {
        for profile in builtin_profiles() {
            let encoded = serde_json::to_string(&profile).unwrap();
            let decoded: FilamentProfile = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded.key, profile.key);
            assert_eq!(decoded.material_class, profile.material_class);
            assert_eq!(decoded.nozzle_temp, profile.nozzle_temp);
            assert_eq!(decoded.cooling, profile.cooling);
            assert_eq!(decoded.notes, profile.notes);
        }
    }
}
