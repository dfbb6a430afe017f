//! Slicing parameter management.
//!
//! The parameter set is fully typed: every field the system touches is named
//! here, and unknown keys are rejected when a set arrives over the tool
//! surface. Values mirror the external slicer's configuration options.

use serde::{Deserialize, Serialize};

use crate::SlicerError;

/// Infill pattern types understood by the slicer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfillPattern {
    Grid,
    Gyroid,
    Honeycomb,
    Cubic,
    Line,
    Rectilinear,
    Triangles,
}

impl InfillPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfillPattern::Grid => "grid",
            InfillPattern::Gyroid => "gyroid",
            InfillPattern::Honeycomb => "honeycomb",
            InfillPattern::Cubic => "cubic",
            InfillPattern::Line => "line",
            InfillPattern::Rectilinear => "rectilinear",
            InfillPattern::Triangles => "triangles",
        }
    }
}

/// Support structure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportType {
    None,
    Normal,
    Tree,
}

impl SupportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportType::None => "none",
            SupportType::Normal => "normal",
            SupportType::Tree => "tree",
        }
    }
}

/// Seam placement strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeamPosition {
    Aligned,
    Nearest,
    Random,
    Back,
}

/// Bed plate types, passed to the slicer verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BedType {
    #[serde(rename = "Cool Plate")]
    CoolPlate,
    #[serde(rename = "Engineering Plate")]
    EngineeringPlate,
    #[serde(rename = "High Temp Plate")]
    HighTempPlate,
    #[serde(rename = "Textured PEI Plate")]
    TexturedPei,
}

impl BedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BedType::CoolPlate => "Cool Plate",
            BedType::EngineeringPlate => "Engineering Plate",
            BedType::HighTempPlate => "High Temp Plate",
            BedType::TexturedPei => "Textured PEI Plate",
        }
    }
}

/// Complete slicing parameter set.
///
/// Mutable while a workflow shapes it, frozen at slice time, and snapshotted
/// by value into the iteration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlicingParameterSet {
    // Layers
    /// Layer height (mm)
    pub layer_height: f64,
    /// First layer height (mm); never thinner than the layer height
    pub initial_layer_height: f64,

    // Walls and shells
    /// Number of perimeter loops
    pub wall_loops: u32,
    /// Top solid layers
    pub top_shell_layers: u32,
    /// Bottom solid layers
    pub bottom_shell_layers: u32,
    /// Extrusion line width (mm)
    pub line_width: f64,

    // Infill
    /// Sparse infill density (percent)
    pub sparse_infill_density: f64,
    /// Sparse infill pattern
    pub sparse_infill_pattern: InfillPattern,

    // Speeds (mm/s)
    pub outer_wall_speed: f64,
    pub inner_wall_speed: f64,
    pub sparse_infill_speed: f64,
    pub travel_speed: f64,
    pub initial_layer_speed: f64,

    // Temperatures (°C)
    pub nozzle_temperature: f64,
    pub bed_temperature: f64,
    pub bed_temperature_initial_layer: f64,

    // Supports
    pub support_type: SupportType,

    // Adhesion
    /// Brim width (mm), 0 = disabled
    pub brim_width: f64,

    // Retraction
    pub retraction_length: f64,
    pub retraction_speed: f64,
    /// Z-hop height during travel (mm), 0 = disabled
    pub z_hop: f64,

    // Cooling
    /// Part cooling fan speed (percent)
    pub fan_speed: f64,
    /// Minimum layer time before the fan slows the print (seconds)
    pub fan_min_layer_time: Option<u32>,

    // Quality
    pub seam_position: SeamPosition,

    // Material handling
    /// Draft shield for warp-prone materials on open frames
    pub enable_draft_shield: bool,

    // Plate
    pub bed_type: BedType,

    /// Filament profile this set was tuned for (registry key, never embedded)
    pub filament: String,
}

impl Default for SlicingParameterSet {
    fn default() -> Self {
        Self {
            layer_height: 0.20,
            initial_layer_height: 0.20,
            wall_loops: 2,
            top_shell_layers: 4,
            bottom_shell_layers: 4,
            line_width: 0.42,
            sparse_infill_density: 15.0,
            sparse_infill_pattern: InfillPattern::Gyroid,
            outer_wall_speed: 60.0,
            inner_wall_speed: 80.0,
            sparse_infill_speed: 150.0,
            travel_speed: 300.0,
            initial_layer_speed: 30.0,
            nozzle_temperature: 220.0,
            bed_temperature: 60.0,
            bed_temperature_initial_layer: 60.0,
            support_type: SupportType::None,
            brim_width: 0.0,
            retraction_length: 0.8,
            retraction_speed: 30.0,
            z_hop: 0.4,
            fan_speed: 100.0,
            fan_min_layer_time: None,
            seam_position: SeamPosition::Aligned,
            enable_draft_shield: false,
            bed_type: BedType::CoolPlate,
            filament: "bambu_pla".to_string(),
        }
    }
}

impl SlicingParameterSet {
    /// Validates the physical invariants of the set.
    ///
    /// - `layer_height <= 0.75 * nozzle_diameter`
    /// - `initial_layer_height >= layer_height`
    /// - `outer_wall_speed * layer_height * line_width <= max_volumetric_flow`
    pub fn validate(
        &self,
        nozzle_diameter: f64,
        max_volumetric_flow: f64,
    ) -> Result<(), SlicerError> {
        if self.layer_height <= 0.0 {
            return Err(SlicerError::InvalidParameter(
                "layer height must be positive".to_string(),
            ));
        }
        if self.layer_height > nozzle_diameter * 0.75 + 1e-9 {
            return Err(SlicerError::InvalidParameter(format!(
                "layer height {:.2}mm exceeds 75% of the {:.1}mm nozzle",
                self.layer_height, nozzle_diameter
            )));
        }
        if self.initial_layer_height + 1e-9 < self.layer_height {
            return Err(SlicerError::InvalidParameter(format!(
                "initial layer height {:.2}mm is thinner than the layer height {:.2}mm",
                self.initial_layer_height, self.layer_height
            )));
        }

        let flow = self.outer_wall_speed * self.layer_height * self.line_width;
        if flow > max_volumetric_flow + 1e-9 {
            return Err(SlicerError::InvalidParameter(format!(
                "outer wall flow {flow:.1}mm³/s exceeds the material limit {max_volumetric_flow:.1}mm³/s"
            )));
        }

        Ok(())
    }

    /// Renders the set as slicer CLI flags (`--key=value` pairs).
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--layer-height={}", self.layer_height),
            format!("--first-layer-height={}", self.initial_layer_height),
            format!("--wall-loops={}", self.wall_loops),
            format!("--top-shell-layers={}", self.top_shell_layers),
            format!("--bottom-shell-layers={}", self.bottom_shell_layers),
            format!("--sparse-infill-density={}", self.sparse_infill_density),
            format!(
                "--sparse-infill-pattern={}",
                self.sparse_infill_pattern.as_str()
            ),
            format!("--curr-bed-type={}", self.bed_type.as_str()),
        ];

        if self.support_type != SupportType::None {
            args.push(format!("--support-type={}", self.support_type.as_str()));
        }
        if self.brim_width > 0.0 {
            args.push(format!("--brim-width={}", self.brim_width));
        }

        args
    }
}

/// Named parameter preset for common jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterPreset {
    pub name: String,
    pub description: String,
    pub parameters: SlicingParameterSet,
    pub tags: Vec<String>,
}

/// Looks up a built-in preset by name.
pub fn get_preset(name: &str) -> Result<ParameterPreset, SlicerError> {
    builtin_presets()
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| SlicerError::UnknownPreset(name.to_string()))
}

/// Names of all built-in presets.
pub fn preset_names() -> Vec<String> {
    builtin_presets().into_iter().map(|p| p.name).collect()
}

fn builtin_presets() -> Vec<ParameterPreset> {
    vec![
        ParameterPreset {
            name: "draft".to_string(),
            description: "Fast draft quality for testing fit and dimensions".to_string(),
            parameters: SlicingParameterSet {
                layer_height: 0.28,
                initial_layer_height: 0.28,
                wall_loops: 2,
                sparse_infill_density: 10.0,
                sparse_infill_pattern: InfillPattern::Grid,
                outer_wall_speed: 80.0,
                inner_wall_speed: 100.0,
                ..Default::default()
            },
            tags: vec!["draft".to_string(), "fast".to_string()],
        },
        ParameterPreset {
            name: "quality".to_string(),
            description: "High quality for final prints with fine detail".to_string(),
            parameters: SlicingParameterSet {
                layer_height: 0.12,
                initial_layer_height: 0.16,
                wall_loops: 3,
                sparse_infill_density: 20.0,
                sparse_infill_pattern: InfillPattern::Gyroid,
                outer_wall_speed: 40.0,
                inner_wall_speed: 60.0,
                ..Default::default()
            },
            tags: vec!["quality".to_string(), "detail".to_string()],
        },
        ParameterPreset {
            name: "tube_squeezer_standard".to_string(),
            description: "Balanced strength and speed for tube squeezers".to_string(),
            parameters: SlicingParameterSet {
                wall_loops: 3,
                sparse_infill_density: 20.0,
                sparse_infill_pattern: InfillPattern::Gyroid,
                brim_width: 5.0,
                ..Default::default()
            },
            tags: vec!["tube_squeezer".to_string(), "functional".to_string()],
        },
        ParameterPreset {
            name: "tube_squeezer_strong".to_string(),
            description: "Heavy-duty settings for larger squeezers".to_string(),
            parameters: SlicingParameterSet {
                wall_loops: 4,
                sparse_infill_density: 30.0,
                sparse_infill_pattern: InfillPattern::Cubic,
                brim_width: 8.0,
                outer_wall_speed: 50.0,
                ..Default::default()
            },
            tags: vec![
                "tube_squeezer".to_string(),
                "functional".to_string(),
                "heavy_duty".to_string(),
            ],
        },
    ]
}

/// Adjusts parameters for a scaled model.
///
/// Large scale-ups need more structure; significant scale-downs need finer
/// layers to keep detail.
pub fn adjust_for_scale(params: &SlicingParameterSet, scale_factor: f64) -> SlicingParameterSet {
    let mut adjusted = params.clone();

    if scale_factor > 2.0 {
        adjusted.wall_loops = adjusted.wall_loops.max(4);
        adjusted.sparse_infill_density = (adjusted.sparse_infill_density + 10.0).min(40.0);
        adjusted.brim_width = adjusted.brim_width.max(8.0);
    } else if scale_factor > 1.5 {
        adjusted.wall_loops = adjusted.wall_loops.max(3);
        adjusted.sparse_infill_density = (adjusted.sparse_infill_density + 5.0).min(30.0);
        adjusted.brim_width = adjusted.brim_width.max(5.0);
    } else if scale_factor < 0.5 {
        adjusted.layer_height = adjusted.layer_height.min(0.16);
        adjusted.initial_layer_height = adjusted.initial_layer_height.max(adjusted.layer_height);
    }

    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set_is_valid() {
        let params = SlicingParameterSet::default();
        // 60 * 0.2 * 0.42 = 5.04 mm³/s, well under a PLA hot end
        assert!(params.validate(0.4, 21.0).is_ok());
    }

    #[test]
    fn test_layer_height_invariant() {
        let params = SlicingParameterSet {
            layer_height: 0.32,
            initial_layer_height: 0.32,
            ..Default::default()
        };
        assert!(params.validate(0.4, 21.0).is_err());
        assert!(params.validate(0.6, 21.0).is_ok());
    }

    #[test]
    fn test_initial_layer_invariant() {
        let params = SlicingParameterSet {
            layer_height: 0.20,
            initial_layer_height: 0.16,
            ..Default::default()
        };
        assert!(params.validate(0.4, 21.0).is_err());
    }

    #[test]
    fn test_volumetric_flow_invariant() {
        let params = SlicingParameterSet {
            outer_wall_speed: 200.0,
            ..Default::default()
        };
        // 200 * 0.2 * 0.42 = 16.8 mm³/s
        assert!(params.validate(0.4, 12.0).is_err());
        assert!(params.validate(0.4, 21.0).is_ok());
    }

    #[test]
    fn test_serde_round_trip_identity() {
        let params = SlicingParameterSet {
            fan_min_layer_time: Some(15),
            enable_draft_shield: true,
            ..Default::default()
        };
        let encoded = serde_json::to_string(&params).unwrap();
        let decoded: SlicingParameterSet = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let mut value = serde_json::to_value(SlicingParameterSet::default()).unwrap();
        value["mystery_knob"] = serde_json::json!(42);
        let result: Result<SlicingParameterSet, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_args_include_bed_type() {
        let params = SlicingParameterSet {
            bed_type: BedType::TexturedPei,
            brim_width: 5.0,
            ..Default::default()
        };
        let args = params.to_cli_args();
        assert!(args.contains(&"--curr-bed-type=Textured PEI Plate".to_string()));
        assert!(args.contains(&"--brim-width=5".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--layer-height=")));
    }

    #[test]
    fn test_preset_lookup() {
        assert!(get_preset("tube_squeezer_standard").is_ok());
        assert!(get_preset("nonexistent").is_err());
        assert!(preset_names().contains(&"draft".to_string()));
    }

    #[test]
    fn test_adjust_for_large_scale() {
        let base = get_preset("tube_squeezer_standard").unwrap().parameters;
        let adjusted = adjust_for_scale(&base, 2.6);
        assert_eq!(adjusted.wall_loops, 4);
        assert_eq!(adjusted.sparse_infill_density, 30.0);
        assert_eq!(adjusted.brim_width, 8.0);
    }

    #[test]
    fn test_adjust_for_scale_down() {
        let base = SlicingParameterSet {
            layer_height: 0.28,
            initial_layer_height: 0.28,
            ..Default::default()
        };
        let adjusted = adjust_for_scale(&base, 0.4);
        assert_eq!(adjusted.layer_height, 0.16);
        assert!(adjusted.initial_layer_height >= adjusted.layer_height);
    }
}
