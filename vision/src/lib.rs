//! # Camera and Defect Analysis
//!
//! This library watches a print through the printer's camera. It has two
//! halves:
//!
//! - **camera**: a long-lived session that pulls JPEG frames from an opaque
//!   transport (the reference implementation shells out to a media tool for
//!   single stills), plus a rolling frame buffer
//! - **detector**: frame-in, result-out analysis that scores print quality
//!   and flags the classic failure modes (spaghetti, layer shift, stringing,
//!   warping, blobs) with severities and confidences
//!
//! ## Failure Model
//!
//! Transport errors never cross the component boundary: a failed capture
//! returns `None`, a failed open returns `false`. The analyzer always returns
//! a result; an undecodable frame simply yields `frame_analyzed == false`.

pub mod camera;
pub mod detector;

pub use camera::{CameraEndpoint, CameraSession, CapturedFrame, FrameBuffer, FrameTransport};
pub use detector::{
    DefectAnalyzer, DefectKind, DetectedDefect, DetectionResult, DetectorConfig, Severity,
};

/// Vision-side errors (configuration only; capture failures are absent values).
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Invalid camera endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
