//! # Slicer Integration Library
//!
//! This library owns everything between a mesh file and a printable bundle:
//! the typed slicing parameter set, quality/use-case recipes, model scale
//! planning, and the bounded invocation of the external slicer CLI.
//!
//! ## Architecture
//!
//! - **parameters**: the fully-typed [`SlicingParameterSet`], named presets,
//!   validation against the physical invariants, and CLI flag rendering
//! - **recipe**: combines a quality preset with a use case and a material
//!   into a concrete parameter set
//! - **scale**: pure bounding-box math for resizing a donor model to a new
//!   target dimension (the mesh transform itself is an external concern)
//! - **invoke**: runs the slicer binary as a subprocess with a hard timeout
//!   and scrapes estimates from its textual output
//!
//! ## Failure Model
//!
//! Slicing never raises across the component boundary for external faults:
//! a missing binary, a nonzero exit, or a missing artifact all come back as
//! a [`SliceResult`] with `success == false` and a human-readable message.

pub mod invoke;
pub mod parameters;
pub mod recipe;
pub mod scale;

pub use invoke::{SliceOptions, SliceResult, SlicerEstimates, SlicerInvocation};
pub use parameters::{
    BedType, InfillPattern, ParameterPreset, SeamPosition, SlicingParameterSet, SupportType,
};
pub use recipe::{recommended_parameters, PrintUseCase, QualityPreset};
pub use scale::{Dimensions, ScalePlan};

/// Slicer-side errors (validation only; invocation failures are results).
#[derive(Debug, thiserror::Error)]
pub enum SlicerError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Unknown material: {0}")]
    UnknownMaterial(String),
}
