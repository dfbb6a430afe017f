//! Model scale planning.
//!
//! Pure bounding-box math: given what the donor model was designed around and
//! what the user actually has, compute the uniform scale factor and the
//! resulting dimensions. Applying the transform to mesh geometry is an
//! external concern; the plan produced here is what gets recorded with the
//! print attempt.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box dimensions in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl Dimensions {
    pub fn new(width: f64, depth: f64, height: f64) -> Self {
        Self {
            width,
            depth,
            height,
        }
    }

    /// Scales all three axes uniformly.
    pub fn scaled(&self, factor: f64) -> Dimensions {
        Dimensions {
            width: self.width * factor,
            depth: self.depth * factor,
            height: self.height * factor,
        }
    }

    /// The largest axis, used for size classification.
    pub fn primary(&self) -> f64 {
        self.width.max(self.depth).max(self.height)
    }
}

/// A planned uniform scale operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalePlan {
    /// Uniform scale multiplier
    pub scale_factor: f64,

    /// Donor model dimensions
    pub original_dimensions: Dimensions,

    /// Dimensions after scaling
    pub scaled_dimensions: Dimensions,

    /// Human-readable notes about the plan
    pub adjustments: Vec<String>,
}

impl ScalePlan {
    /// Plans a uniform scale by an explicit factor.
    pub fn uniform(original: Dimensions, factor: f64) -> ScalePlan {
        ScalePlan {
            scale_factor: factor,
            original_dimensions: original,
            scaled_dimensions: original.scaled(factor),
            adjustments: Vec::new(),
        }
    }

    /// Plans a scale that resizes a squeezer-style model from the tube
    /// diameter it was designed for to a new target diameter.
    pub fn for_tube_swap(
        original: Dimensions,
        original_tube_diameter_mm: f64,
        target_tube_diameter_mm: f64,
    ) -> ScalePlan {
        let factor = target_tube_diameter_mm / original_tube_diameter_mm;
        let mut plan = ScalePlan::uniform(original, factor);

        plan.adjustments.push(format!(
            "Scaled from {original_tube_diameter_mm}mm to {target_tube_diameter_mm}mm tube diameter"
        ));

        if factor > 1.5 {
            plan.adjustments.push(
                "Large scale-up: increase wall loops in the slicer for structural integrity"
                    .to_string(),
            );
        }

        plan
    }

    /// Plans a scale that makes a slot opening fit a target diameter with
    /// clearance for easy sliding.
    pub fn for_slot_width(
        original: Dimensions,
        original_slot_width_mm: f64,
        target_tube_diameter_mm: f64,
        clearance_mm: f64,
    ) -> ScalePlan {
        let target_slot = target_tube_diameter_mm + clearance_mm;
        let factor = target_slot / original_slot_width_mm;
        let mut plan = ScalePlan::uniform(original, factor);
        plan.adjustments.push(format!(
            "Slot width {original_slot_width_mm}mm scaled to {target_slot}mm ({clearance_mm}mm clearance)"
        ));
        plan
    }

    /// Scale expressed as a percentage.
    pub fn percentage(&self) -> f64 {
        self.scale_factor * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tube_swap_scale() {
        // Toothpaste squeezer (25mm tube) resized for a lotion bottle (65mm)
        let original = Dimensions::new(38.0, 45.0, 35.0);
        let plan = ScalePlan::for_tube_swap(original, 25.0, 65.0);

        assert!((plan.scale_factor - 2.6).abs() < 1e-9);
        assert!((plan.scaled_dimensions.width - 98.8).abs() < 0.01);
        assert!((plan.scaled_dimensions.depth - 117.0).abs() < 0.01);
        assert!((plan.scaled_dimensions.height - 91.0).abs() < 0.01);
        assert!(plan.adjustments.iter().any(|a| a.contains("65")));
    }

    #[test]
    fn test_slot_width_scale_includes_clearance() {
        let original = Dimensions::new(40.0, 20.0, 10.0);
        let plan = ScalePlan::for_slot_width(original, 26.0, 51.0, 1.0);
        assert!((plan.scale_factor - 2.0).abs() < 1e-9);
        assert!((plan.scaled_dimensions.width - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_primary_dimension() {
        let dims = Dimensions::new(10.0, 40.0, 25.0);
        assert_eq!(dims.primary(), 40.0);
    }

    #[test]
    fn test_uniform_plan_has_no_adjustments() {
        let plan = ScalePlan::uniform(Dimensions::new(10.0, 10.0, 10.0), 1.2);
        assert!(plan.adjustments.is_empty());
        assert!((plan.percentage() - 120.0).abs() < 1e-9);
    }
}
