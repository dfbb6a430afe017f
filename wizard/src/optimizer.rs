//! Material-aware parameter optimization.
//!
//! Pure function over a slicing parameter set: rules run in a fixed order
//! and every change is recorded with its reason. The result is stable; a
//! second pass over already-optimized parameters changes nothing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use printforge_materials::{MaterialClass, MaterialKnowledgeBase};
use printforge_slicer::SlicingParameterSet;

/// One recorded parameter change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterChange {
    pub parameter: String,
    pub old_value: Value,
    pub new_value: Value,
    pub reason: String,
}

/// Result of an optimization pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub params: SlicingParameterSet,
    pub changes: Vec<ParameterChange>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

/// Optimizes print parameters for a specific material.
#[derive(Debug, Default)]
pub struct ParameterOptimizer;

struct Pass {
    params: SlicingParameterSet,
    changes: Vec<ParameterChange>,
    warnings: Vec<String>,
    notes: Vec<String>,
}

impl Pass {
    fn record(&mut self, parameter: &str, old: Value, new: Value, reason: impl Into<String>) {
        if old != new {
            self.changes.push(ParameterChange {
                parameter: parameter.to_string(),
                old_value: old,
                new_value: new,
                reason: reason.into(),
            });
        }
    }

    fn set_f64(
        &mut self,
        parameter: &str,
        get: impl Fn(&SlicingParameterSet) -> f64,
        set: impl Fn(&mut SlicingParameterSet, f64),
        new: f64,
        reason: &str,
    ) {
        let old = get(&self.params);
        if (old - new).abs() > 1e-9 {
            set(&mut self.params, new);
            self.record(parameter, json!(old), json!(new), reason);
        }
    }
}

impl ParameterOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Optimizes `params` for `material` at the given nozzle and room
    /// temperature. Unknown materials leave the parameters untouched and
    /// produce a warning.
    pub fn optimize(
        &self,
        params: &SlicingParameterSet,
        material: &str,
        nozzle_diameter: f64,
        ambient_temp: f64,
    ) -> OptimizationResult {
        let mkb = MaterialKnowledgeBase::global();
        let Some(profile) = mkb.lookup_filament(material) else {
            return OptimizationResult {
                params: params.clone(),
                changes: Vec::new(),
                warnings: vec![format!("Unknown material '{material}', using defaults")],
                notes: Vec::new(),
            };
        };

        let mut pass = Pass {
            params: params.clone(),
            changes: Vec::new(),
            warnings: Vec::new(),
            notes: Vec::new(),
        };

        // Rule order is fixed; see each step for its invariant
        self.temperatures(&mut pass, profile);
        self.speeds(&mut pass, profile, nozzle_diameter);
        self.retraction(&mut pass, profile);
        self.cooling(&mut pass, profile);
        self.adhesion(&mut pass, profile);
        self.structure(&mut pass, profile);
        self.material_specifics(&mut pass, profile, ambient_temp);

        OptimizationResult {
            params: pass.params,
            changes: pass.changes,
            warnings: pass.warnings,
            notes: pass.notes,
        }
    }

    /// 1. Temperatures clamp into the filament's ranges.
    fn temperatures(&self, pass: &mut Pass, profile: &printforge_materials::FilamentProfile) {
        let nozzle = pass.params.nozzle_temperature;
        let clamped = profile.nozzle_temp.clamp(nozzle);
        pass.set_f64(
            "nozzle_temperature",
            |p| p.nozzle_temperature,
            |p, v| p.nozzle_temperature = v,
            clamped,
            &format!(
                "{} prints between {:.0} and {:.0}°C",
                profile.name, profile.nozzle_temp.min, profile.nozzle_temp.max
            ),
        );

        let bed = pass.params.bed_temperature;
        let clamped = profile.bed_temp.clamp(bed);
        pass.set_f64(
            "bed_temperature",
            |p| p.bed_temperature,
            |p, v| p.bed_temperature = v,
            clamped,
            &format!(
                "{} needs the bed between {:.0} and {:.0}°C",
                profile.name, profile.bed_temp.min, profile.bed_temp.max
            ),
        );

        let initial = pass.params.bed_temperature_initial_layer;
        let clamped = profile.bed_temp.clamp(initial);
        pass.set_f64(
            "bed_temperature_initial_layer",
            |p| p.bed_temperature_initial_layer,
            |p, v| p.bed_temperature_initial_layer = v,
            clamped,
            "Initial bed temperature clamped to the material range",
        );
    }

    /// 2. Speed caps and the volumetric flow bound.
    fn speeds(
        &self,
        pass: &mut Pass,
        profile: &printforge_materials::FilamentProfile,
        _nozzle_diameter: f64,
    ) {
        let max_speed = profile.max_print_speed;

        let outer_cap = max_speed * 0.5;
        if pass.params.outer_wall_speed > outer_cap {
            pass.set_f64(
                "outer_wall_speed",
                |p| p.outer_wall_speed,
                |p, v| p.outer_wall_speed = v,
                outer_cap.floor(),
                &format!("{} prints cleaner outer walls below {outer_cap:.0}mm/s", profile.name),
            );
        }

        let inner_cap = max_speed * 0.7;
        if pass.params.inner_wall_speed > inner_cap {
            pass.set_f64(
                "inner_wall_speed",
                |p| p.inner_wall_speed,
                |p, v| p.inner_wall_speed = v,
                inner_cap.floor(),
                &format!("Inner walls capped for {}", profile.name),
            );
        }

        if pass.params.sparse_infill_speed > max_speed {
            pass.set_f64(
                "sparse_infill_speed",
                |p| p.sparse_infill_speed,
                |p, v| p.sparse_infill_speed = v,
                max_speed.floor(),
                &format!("{} maxes out at {max_speed:.0}mm/s", profile.name),
            );
        }

        // Volumetric flow bound on the outer wall
        let flow = pass.params.layer_height * pass.params.line_width * pass.params.outer_wall_speed;
        if flow > profile.max_volumetric_flow {
            let safe_speed = profile.max_volumetric_flow
                / (pass.params.layer_height * pass.params.line_width);
            pass.set_f64(
                "outer_wall_speed",
                |p| p.outer_wall_speed,
                |p, v| p.outer_wall_speed = v,
                (safe_speed * 0.9).floor(),
                &format!(
                    "Reduced to stay within the {:.1}mm³/s flow limit",
                    profile.max_volumetric_flow
                ),
            );
            pass.notes.push(format!(
                "Volumetric flow limited to {:.1}mm³/s for {}",
                profile.max_volumetric_flow, profile.name
            ));
        }
    }

    /// 3. Retraction snaps to the filament's values; flexibles stay short.
    fn retraction(&self, pass: &mut Pass, profile: &printforge_materials::FilamentProfile) {
        if (pass.params.retraction_length - profile.retraction_length).abs() > 0.2 {
            pass.set_f64(
                "retraction_length",
                |p| p.retraction_length,
                |p, v| p.retraction_length = v,
                profile.retraction_length,
                &format!("Optimal retraction for {}", profile.name),
            );
        }
        if (pass.params.retraction_speed - profile.retraction_speed).abs() > 5.0 {
            pass.set_f64(
                "retraction_speed",
                |p| p.retraction_speed,
                |p, v| p.retraction_speed = v,
                profile.retraction_speed,
                &format!("Optimal retraction speed for {}", profile.name),
            );
        }

        if profile.is_flexible && pass.params.retraction_length > 0.5 {
            pass.set_f64(
                "retraction_length",
                |p| p.retraction_length,
                |p, v| p.retraction_length = v,
                0.5,
                "Flexible filament jams with long retractions",
            );
            pass.notes
                .push("Flexible filament: keep retraction minimal to prevent jams".to_string());
        }
    }

    /// 4. Cooling per material class.
    fn cooling(&self, pass: &mut Pass, profile: &printforge_materials::FilamentProfile) {
        match profile.material_class {
            MaterialClass::RigidPla => {
                if pass.params.fan_speed < 80.0 {
                    pass.set_f64(
                        "fan_speed",
                        |p| p.fan_speed,
                        |p, v| p.fan_speed = v,
                        100.0,
                        "PLA benefits from full cooling",
                    );
                }
            }
            MaterialClass::Petg => {
                if pass.params.fan_speed > 50.0 {
                    pass.set_f64(
                        "fan_speed",
                        |p| p.fan_speed,
                        |p, v| p.fan_speed = v,
                        50.0,
                        "PETG turns brittle with too much cooling",
                    );
                }
            }
            MaterialClass::Pc => {
                if pass.params.fan_speed > 20.0 {
                    pass.set_f64(
                        "fan_speed",
                        |p| p.fan_speed,
                        |p, v| p.fan_speed = v,
                        20.0,
                        "PC cracks along layers when cooled hard",
                    );
                }
                if pass.params.fan_min_layer_time != Some(15) {
                    let old = pass.params.fan_min_layer_time;
                    pass.params.fan_min_layer_time = Some(15);
                    pass.record(
                        "fan_min_layer_time",
                        json!(old),
                        json!(15),
                        "Give PC layers time to bond",
                    );
                }
                pass.notes
                    .push("PC: keep the fan low to avoid layer separation".to_string());
            }
            MaterialClass::TpuFlex => {
                if pass.params.fan_speed > 50.0 {
                    pass.set_f64(
                        "fan_speed",
                        |p| p.fan_speed,
                        |p, v| p.fan_speed = v,
                        50.0,
                        "TPU prints best with moderate cooling",
                    );
                }
            }
            MaterialClass::CfAbrasive | MaterialClass::Other => {}
        }
    }

    /// 5. Bed adhesion: brim for warp-prone materials, slow thick first
    /// layer for everyone.
    fn adhesion(&self, pass: &mut Pass, profile: &printforge_materials::FilamentProfile) {
        if profile.is_warp_prone() && pass.params.brim_width < 10.0 {
            pass.set_f64(
                "brim_width",
                |p| p.brim_width,
                |p, v| p.brim_width = v,
                10.0,
                &format!("{} is prone to warping; a wide brim anchors corners", profile.name),
            );
            pass.warnings.push(format!(
                "{} tends to warp. Use a brim, level the bed, and avoid drafts.",
                profile.name
            ));
        }

        if pass.params.initial_layer_speed > 20.0 {
            pass.set_f64(
                "initial_layer_speed",
                |p| p.initial_layer_speed,
                |p, v| p.initial_layer_speed = v,
                20.0,
                "Slower first layer improves adhesion",
            );
        }

        let target = (pass.params.layer_height * 1.2 * 100.0).round() / 100.0;
        if (pass.params.initial_layer_height - target).abs() > 0.02 {
            pass.set_f64(
                "initial_layer_height",
                |p| p.initial_layer_height,
                |p, v| p.initial_layer_height = v,
                target,
                "Slightly thicker first layer squishes into the plate",
            );
        }
    }

    /// 6. Structural adjustments for flexible materials.
    fn structure(&self, pass: &mut Pass, profile: &printforge_materials::FilamentProfile) {
        if !profile.is_flexible {
            return;
        }

        if pass.params.wall_loops < 3 {
            let old = pass.params.wall_loops;
            pass.params.wall_loops = 3;
            pass.record(
                "wall_loops",
                json!(old),
                json!(3),
                "Flexible parts get their strength from walls",
            );
        }

        if pass.params.sparse_infill_density > 20.0 {
            pass.notes.push(format!(
                "Current infill is {:.0}%. 20% or less makes the part noticeably more flexible.",
                pass.params.sparse_infill_density
            ));
        }
    }

    /// 7. Material-specific handling and ambient compensation.
    fn material_specifics(
        &self,
        pass: &mut Pass,
        profile: &printforge_materials::FilamentProfile,
        ambient_temp: f64,
    ) {
        if !profile.feeder_compatible {
            pass.warnings.push(format!(
                "{} cannot pass through the spool changer. Feed it directly to the extruder.",
                profile.name
            ));
        }

        if profile.material_class == MaterialClass::Pc {
            pass.warnings.push(
                "Polycarbonate prints best enclosed. On an open frame printer keep parts \
                 small and use a draft shield."
                    .to_string(),
            );
            if !pass.params.enable_draft_shield {
                pass.params.enable_draft_shield = true;
                pass.record(
                    "enable_draft_shield",
                    json!(false),
                    json!(true),
                    "Draft shield shelters PC on open frame printers",
                );
            }
        }

        if ambient_temp < 18.0 {
            // Fixed point: a cold room wants the bed a notch above optimal,
            // never above the material maximum
            let target = (profile.bed_temp.optimal + 5.0).min(profile.bed_temp.max);
            if pass.params.bed_temperature < target {
                pass.set_f64(
                    "bed_temperature",
                    |p| p.bed_temperature,
                    |p, v| p.bed_temperature = v,
                    target,
                    "Cold room: a warmer bed keeps the first layers stuck",
                );
            }
            pass.notes.push(format!(
                "Room is cold ({ambient_temp:.0}°C). Consider a draft shield or enclosure."
            ));
        }

        if profile.material_class == MaterialClass::Petg {
            pass.notes.push(
                "PETG tends to string. Tune retraction and drop the temperature 5-10°C if it does."
                    .to_string(),
            );
            if pass.params.z_hop <= 0.0 {
                pass.set_f64(
                    "z_hop",
                    |p| p.z_hop,
                    |p, v| p.z_hop = v,
                    0.4,
                    "Z-hop keeps the nozzle from dragging across printed PETG",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizer() -> ParameterOptimizer {
        ParameterOptimizer::new()
    }

    #[test]
    fn test_pc_cold_room_scenario() {
        let params = SlicingParameterSet {
            bed_temperature: 100.0,
            nozzle_temperature: 275.0,
            fan_speed: 20.0,
            brim_width: 10.0,
            initial_layer_speed: 20.0,
            initial_layer_height: 0.24,
            ..Default::default()
        };

        let result = optimizer().optimize(&params, "pc", 0.4, 15.0);

        assert_eq!(result.params.bed_temperature, 105.0);
        assert!(result.params.enable_draft_shield);
        assert!(result.warnings.iter().any(|w| w.contains("open frame")));

        let bed_change = result
            .changes
            .iter()
            .find(|c| c.parameter == "bed_temperature")
            .unwrap();
        assert_eq!(bed_change.new_value, json!(105.0));
    }

    #[test]
    fn test_pc_bed_bump_respects_maximum() {
        let params = SlicingParameterSet {
            bed_temperature: 113.0,
            nozzle_temperature: 275.0,
            ..Default::default()
        };
        let result = optimizer().optimize(&params, "pc", 0.4, 15.0);
        // 113 is already above optimal+5; the cold-room rule leaves it alone
        assert_eq!(result.params.bed_temperature, 113.0);
    }

    #[test]
    fn test_optimizer_is_idempotent() {
        let cases = [
            ("pc", 15.0),
            ("bambu_petg_translucent", 22.0),
            ("generic_tpu_95a", 22.0),
            ("bambu_pla", 10.0),
        ];

        for (material, ambient) in cases {
            let params = SlicingParameterSet {
                nozzle_temperature: 300.0,
                bed_temperature: 30.0,
                outer_wall_speed: 140.0,
                retraction_length: 3.0,
                fan_speed: 70.0,
                initial_layer_speed: 35.0,
                ..Default::default()
            };

            let first = optimizer().optimize(&params, material, 0.4, ambient);
            let second = optimizer().optimize(&first.params, material, 0.4, ambient);

            assert_eq!(
                second.params, first.params,
                "{material}: second pass changed parameters"
            );
            assert!(
                second.changes.is_empty(),
                "{material}: second pass recorded changes: {:?}",
                second.changes
            );
        }
    }

    #[test]
    fn test_temperature_clamping() {
        let params = SlicingParameterSet {
            nozzle_temperature: 180.0,
            bed_temperature: 90.0,
            ..Default::default()
        };
        let result = optimizer().optimize(&params, "bambu_pla", 0.4, 22.0);

        assert_eq!(result.params.nozzle_temperature, 190.0);
        assert_eq!(result.params.bed_temperature, 65.0);
        assert!(result
            .changes
            .iter()
            .any(|c| c.parameter == "nozzle_temperature"));
    }

    #[test]
    fn test_volumetric_flow_cap() {
        // After the 100mm/s cap: 100 * 0.32 * 0.42 = 13.4mm³/s, over PETG's 12
        let params = SlicingParameterSet {
            layer_height: 0.32,
            initial_layer_height: 0.38,
            outer_wall_speed: 150.0,
            ..Default::default()
        };
        let result = optimizer().optimize(&params, "bambu_petg_translucent", 0.4, 22.0);

        let flow = result.params.outer_wall_speed
            * result.params.layer_height
            * result.params.line_width;
        assert!(flow <= 12.0);
        assert!(result.notes.iter().any(|n| n.contains("flow")));
    }

    #[test]
    fn test_flexible_retraction_and_walls() {
        let params = SlicingParameterSet {
            retraction_length: 2.0,
            wall_loops: 2,
            ..Default::default()
        };
        let result = optimizer().optimize(&params, "generic_tpu_95a", 0.4, 22.0);

        assert_eq!(result.params.retraction_length, 0.5);
        assert_eq!(result.params.wall_loops, 3);
    }

    #[test]
    fn test_cooling_rules() {
        let warm = SlicingParameterSet {
            fan_speed: 60.0,
            ..Default::default()
        };

        let pla = optimizer().optimize(&warm, "bambu_pla", 0.4, 22.0);
        assert_eq!(pla.params.fan_speed, 100.0);

        let petg = optimizer().optimize(&warm, "generic_petg", 0.4, 22.0);
        assert_eq!(petg.params.fan_speed, 50.0);

        let pc = optimizer().optimize(&warm, "pc", 0.4, 22.0);
        assert_eq!(pc.params.fan_speed, 20.0);
        assert_eq!(pc.params.fan_min_layer_time, Some(15));
    }

    #[test]
    fn test_unknown_material_warns_and_keeps_params() {
        let params = SlicingParameterSet::default();
        let result = optimizer().optimize(&params, "unobtainium", 0.4, 22.0);
        assert_eq!(result.params, params);
        assert!(result.changes.is_empty());
        assert!(result.warnings[0].contains("Unknown material"));
    }

    #[test]
    fn test_every_change_records_old_and_new() {
        let params = SlicingParameterSet {
            nozzle_temperature: 300.0,
            retraction_length: 3.0,
            ..Default::default()
        };
        let result = optimizer().optimize(&params, "bambu_pla", 0.4, 22.0);

        assert!(!result.changes.is_empty());
        for change in &result.changes {
            assert_ne!(change.old_value, change.new_value, "{}", change.parameter);
            assert!(!change.reason.is_empty());
        }
    }
}
