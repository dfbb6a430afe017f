//! Quality/use-case slicing recipe.
//!
//! Turns two novice-facing choices (how nice, what for) plus the selected
//! material and nozzle into a concrete parameter set. The quality preset sets
//! the baseline; the use case then pushes structure or speed in its own
//! direction; the material contributes temperatures, retraction, and the speed
//! ceiling.

use serde::{Deserialize, Serialize};

use printforge_materials::{snap_layer_height, MaterialKnowledgeBase};

use crate::parameters::{BedType, InfillPattern, SlicingParameterSet};
use crate::SlicerError;

/// Print quality presets for novice users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    /// Fast, visible layer lines
    Draft,
    /// Balanced speed and quality
    Standard,
    /// Better surface finish, slower
    Quality,
    /// Best quality, much slower
    Ultra,
}

impl QualityPreset {
    /// (layer height ratio of nozzle diameter, wall loops, infill %, speed factor)
    fn settings(&self) -> (f64, u32, f64, f64) {
        match self {
            QualityPreset::Draft => (0.70, 2, 15.0, 1.2),
            QualityPreset::Standard => (0.50, 3, 20.0, 1.0),
            QualityPreset::Quality => (0.35, 4, 25.0, 0.8),
            QualityPreset::Ultra => (0.25, 5, 30.0, 0.6),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            QualityPreset::Draft => "Fast printing, visible layer lines",
            QualityPreset::Standard => "Balanced speed and quality",
            QualityPreset::Quality => "Better surface finish, slower",
            QualityPreset::Ultra => "Best quality, much slower",
        }
    }
}

/// What the print will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintUseCase {
    /// Strength matters most
    Functional,
    /// Looks matter most
    Decorative,
    /// Fast iteration
    Prototype,
    /// Balance of both
    Gift,
}

/// Builds the recommended parameter set for the given choices.
pub fn recommended_parameters(
    material: &str,
    nozzle_diameter: f64,
    quality: QualityPreset,
    use_case: PrintUseCase,
) -> Result<SlicingParameterSet, SlicerError> {
    let mkb = MaterialKnowledgeBase::global();
    let profile = mkb
        .lookup_filament(material)
        .ok_or_else(|| SlicerError::UnknownMaterial(material.to_string()))?;

    let (ratio, base_walls, base_infill, speed_factor) = quality.settings();

    let layer_height = snap_layer_height(nozzle_diameter * ratio);

    // Use-case adjustments on top of the quality baseline
    let (wall_loops, infill, pattern) = match use_case {
        PrintUseCase::Functional => (
            base_walls.max(4),
            base_infill.max(25.0),
            InfillPattern::Gyroid,
        ),
        PrintUseCase::Decorative => (base_walls, base_infill.min(15.0), InfillPattern::Grid),
        PrintUseCase::Prototype => (2, base_infill.min(10.0), InfillPattern::Grid),
        PrintUseCase::Gift => (base_walls.max(4), base_infill, InfillPattern::Grid),
    };

    let max_speed = profile.max_print_speed * speed_factor;
    let line_width = ((nozzle_diameter * 1.05) * 100.0).round() / 100.0;

    let params = SlicingParameterSet {
        layer_height,
        initial_layer_height: ((layer_height * 1.2) * 100.0).round() / 100.0,
        wall_loops,
        top_shell_layers: 4,
        bottom_shell_layers: 4,
        line_width,
        sparse_infill_density: infill,
        sparse_infill_pattern: pattern,
        outer_wall_speed: (max_speed * 0.6).min(80.0).floor(),
        inner_wall_speed: (max_speed * 0.8).min(120.0).floor(),
        sparse_infill_speed: max_speed.min(150.0).floor(),
        travel_speed: 300.0,
        initial_layer_speed: 25.0,
        nozzle_temperature: profile.nozzle_temp.optimal,
        bed_temperature: profile.bed_temp.optimal,
        bed_temperature_initial_layer: (profile.bed_temp.optimal + 5.0).min(profile.bed_temp.max),
        support_type: crate::parameters::SupportType::None,
        brim_width: if profile.is_warp_prone() { 8.0 } else { 5.0 },
        retraction_length: profile.retraction_length,
        retraction_speed: profile.retraction_speed,
        z_hop: 0.4,
        fan_speed: profile.cooling.fan_max_percent as f64,
        fan_min_layer_time: None,
        seam_position: crate::parameters::SeamPosition::Aligned,
        enable_draft_shield: false,
        bed_type: BedType::TexturedPei,
        filament: profile.key.clone(),
    };

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_functional_petg() {
        let params = recommended_parameters(
            "bambu_petg_translucent",
            0.4,
            QualityPreset::Standard,
            PrintUseCase::Functional,
        )
        .unwrap();

        assert!((params.layer_height - 0.20).abs() < 1e-9);
        assert_eq!(params.sparse_infill_density, 25.0);
        assert_eq!(params.sparse_infill_pattern, InfillPattern::Gyroid);
        assert_eq!(params.wall_loops, 4);
        // PETG max 200 mm/s at factor 1.0: outer capped at 80
        assert_eq!(params.outer_wall_speed, 80.0);
        assert_eq!(params.inner_wall_speed, 120.0);
        assert_eq!(params.sparse_infill_speed, 150.0);
        assert_eq!(params.nozzle_temperature, 255.0);
        assert_eq!(params.bed_temperature, 70.0);
        assert_eq!(params.initial_layer_speed, 25.0);
        assert!((params.initial_layer_height - 0.24).abs() < 1e-9);
        assert_eq!(params.brim_width, 5.0);
    }

    #[test]
    fn test_prototype_caps_structure() {
        let params = recommended_parameters(
            "bambu_pla",
            0.4,
            QualityPreset::Standard,
            PrintUseCase::Prototype,
        )
        .unwrap();
        assert_eq!(params.wall_loops, 2);
        assert_eq!(params.sparse_infill_density, 10.0);
    }

    #[test]
    fn test_decorative_caps_infill() {
        let params = recommended_parameters(
            "bambu_pla",
            0.4,
            QualityPreset::Ultra,
            PrintUseCase::Decorative,
        )
        .unwrap();
        assert_eq!(params.sparse_infill_density, 15.0);
        assert_eq!(params.wall_loops, 5);
    }

    #[test]
    fn test_warp_prone_gets_wide_brim() {
        let params = recommended_parameters(
            "prusa_pc_blend",
            0.4,
            QualityPreset::Standard,
            PrintUseCase::Functional,
        )
        .unwrap();
        assert_eq!(params.brim_width, 8.0);
        assert_eq!(params.bed_temperature, 100.0);
    }

    #[test]
    fn test_slow_material_lowers_speeds() {
        let params = recommended_parameters(
            "generic_tpu_95a",
            0.4,
            QualityPreset::Standard,
            PrintUseCase::Functional,
        )
        .unwrap();
        // TPU max 60 mm/s: outer = 36, inner = 48, infill = 60
        assert_eq!(params.outer_wall_speed, 36.0);
        assert_eq!(params.inner_wall_speed, 48.0);
        assert_eq!(params.sparse_infill_speed, 60.0);
    }

    #[test]
    fn test_recipe_output_is_valid() {
        for quality in [
            QualityPreset::Draft,
            QualityPreset::Standard,
            QualityPreset::Quality,
            QualityPreset::Ultra,
        ] {
            let params =
                recommended_parameters("bambu_pla", 0.4, quality, PrintUseCase::Functional)
                    .unwrap();
            params
                .validate(0.4, 21.0)
                .unwrap_or_else(|e| panic!("{quality:?}: {e}"));
        }
    }

    #[test]
    fn test_unknown_material_is_an_error() {
        let result = recommended_parameters(
            "vaporware",
            0.4,
            QualityPreset::Standard,
            PrintUseCase::Functional,
        );
        assert!(result.is_err());
    }
}
