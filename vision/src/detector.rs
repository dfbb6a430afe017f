//! Vision-based defect detection.
//!
//! Each detector is independent, tolerant of a missing prior frame, and works
//! on a downscaled grayscale buffer so per-frame wall time stays bounded. The
//! heuristic constants have no documented derivation; they are all exposed on
//! [`DetectorConfig`] so deployments can tune them.

use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::CapturedFrame;

/// Types of detectable print defects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    LayerShift,
    Stringing,
    Warping,
    Blob,
    UnderExtrusion,
    OverExtrusion,
    PoorAdhesion,
    Spaghetti,
    NozzleClog,
    LayerSeparation,
}

impl DefectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectKind::LayerShift => "layer_shift",
            DefectKind::Stringing => "stringing",
            DefectKind::Warping => "warping",
            DefectKind::Blob => "blob",
            DefectKind::UnderExtrusion => "under_extrusion",
            DefectKind::OverExtrusion => "over_extrusion",
            DefectKind::PoorAdhesion => "poor_adhesion",
            DefectKind::Spaghetti => "spaghetti",
            DefectKind::NozzleClog => "nozzle_clog",
            DefectKind::LayerSeparation => "layer_separation",
        }
    }

    /// Parses the snake_case wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "layer_shift" => Some(DefectKind::LayerShift),
            "stringing" => Some(DefectKind::Stringing),
            "warping" => Some(DefectKind::Warping),
            "blob" => Some(DefectKind::Blob),
            "under_extrusion" => Some(DefectKind::UnderExtrusion),
            "over_extrusion" => Some(DefectKind::OverExtrusion),
            "poor_adhesion" => Some(DefectKind::PoorAdhesion),
            "spaghetti" => Some(DefectKind::Spaghetti),
            "nozzle_clog" => Some(DefectKind::NozzleClog),
            "layer_separation" => Some(DefectKind::LayerSeparation),
            _ => None,
        }
    }
}

/// Defect severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A detected print defect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedDefect {
    pub kind: DefectKind,
    pub severity: Severity,

    /// Detection confidence in [0, 1]
    pub confidence: f64,

    pub description: String,

    /// Bounding box (x, y, width, height) when localized
    pub location: Option<(u32, u32, u32, u32)>,

    pub suggested_fix: Option<String>,
}

/// Result of analyzing one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub timestamp: DateTime<Utc>,

    /// False when the frame could not be decoded
    pub frame_analyzed: bool,

    pub defects: Vec<DetectedDefect>,

    /// Print quality score in [0, 100]; 100 = perfect
    pub quality_score: f64,

    pub notes: Vec<String>,
}

impl DetectionResult {
    pub fn has_critical(&self) -> bool {
        self.defects.iter().any(|d| d.severity == Severity::Critical)
    }

    /// Pause policy: any critical defect, or quality below 30.
    pub fn should_pause(&self) -> bool {
        self.has_critical() || self.quality_score < 30.0
    }
}

/// Tunable detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Frames wider than this are downscaled before analysis
    pub max_analysis_width: u32,

    /// Gradient magnitude above which a pixel counts as an edge
    pub edge_threshold: f64,

    // Spaghetti
    pub spaghetti_min_contour_area: usize,
    pub spaghetti_max_contour_area: usize,
    pub spaghetti_contour_count: usize,
    pub spaghetti_spread: f64,

    // Layer shift
    pub shift_sigma_factor: f64,
    pub shift_count: usize,

    // Stringing
    pub string_response_threshold: u8,
    pub string_min_length: u32,
    pub string_count: usize,

    // Warping
    pub warp_min_area: usize,
    pub warp_axis_ratio: f64,
    pub warp_angle_degrees: (f64, f64),

    // Blobs
    pub blob_brightness: u8,
    pub blob_min_area: usize,
    pub blob_max_area: usize,
    pub blob_min_circularity: f64,
    pub blob_min_convexity: f64,
    pub blob_count: usize,

    // Motion
    pub motion_pixel_threshold: u8,
    pub motion_stall_ratio: f64,
    pub motion_failure_ratio: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_analysis_width: 640,
            edge_threshold: 100.0,
            spaghetti_min_contour_area: 10,
            spaghetti_max_contour_area: 500,
            spaghetti_contour_count: 100,
            spaghetti_spread: 0.3,
            shift_sigma_factor: 2.0,
            shift_count: 5,
            string_response_threshold: 30,
            string_min_length: 20,
            string_count: 10,
            warp_min_area: 100,
            warp_axis_ratio: 3.0,
            warp_angle_degrees: (60.0, 120.0),
            blob_brightness: 200,
            blob_min_area: 20,
            blob_max_area: 500,
            blob_min_circularity: 0.5,
            blob_min_convexity: 0.5,
            blob_count: 5,
            motion_pixel_threshold: 30,
            motion_stall_ratio: 0.001,
            motion_failure_ratio: 0.3,
        }
    }
}

/// Computes the quality score for a defect list: start at 100, subtract
/// severity weight × confidence per defect, floor at 0.
pub fn compute_quality_score(defects: &[DetectedDefect]) -> f64 {
    let mut score = 100.0;
    for defect in defects {
        let weight = match defect.severity {
            Severity::Critical => 40.0,
            Severity::Warning => 20.0,
            Severity::Info => 5.0,
        };
        score -= weight * defect.confidence;
    }
    score.max(0.0)
}

/// Frame-in, result-out defect analyzer.
///
/// Keeps at most one previous frame of state for motion analysis.
pub struct DefectAnalyzer {
    config: DetectorConfig,
    previous: Option<GrayImage>,
}

impl DefectAnalyzer {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            previous: None,
        }
    }

    /// Explicitly sets the comparison frame (e.g. the empty bed before the
    /// print starts). Idempotent.
    pub fn set_reference_frame(&mut self, frame: &CapturedFrame) {
        if let Some(gray) = frame.to_gray() {
            self.previous = Some(self.prepare(gray));
        }
    }

    /// Analyzes a frame for defects.
    pub fn analyze_frame(&mut self, frame: &CapturedFrame) -> DetectionResult {
        let mut result = DetectionResult {
            timestamp: Utc::now(),
            frame_analyzed: true,
            defects: Vec::new(),
            quality_score: 100.0,
            notes: Vec::new(),
        };

        let Some(gray) = frame.to_gray() else {
            result.frame_analyzed = false;
            result.notes.push("failed to decode frame".to_string());
            return result;
        };
        let gray = self.prepare(gray);

        let mut defects = Vec::new();

        let (gx, gy) = sobel(&gray);
        let edges = edge_mask(&gx, &gy, gray.width(), gray.height(), self.config.edge_threshold);

        defects.extend(self.detect_spaghetti(&edges));
        defects.extend(self.detect_layer_shift(&gx, gray.width(), gray.height()));
        defects.extend(self.detect_stringing(&gray));
        defects.extend(self.detect_warping(&gray));
        defects.extend(self.detect_blobs(&gray));

        if let Some(previous) = &self.previous {
            let (motion_defects, motion_notes) = self.analyze_motion(previous, &gray);
            defects.extend(motion_defects);
            result.notes.extend(motion_notes);
        }
        self.previous = Some(gray);

        result.quality_score = compute_quality_score(&defects);
        result.defects = defects;
        debug!(
            score = result.quality_score,
            defects = result.defects.len(),
            "frame analyzed"
        );
        result
    }

    /// Downscales wide frames so per-frame cost stays bounded.
    fn prepare(&self, gray: GrayImage) -> GrayImage {
        if gray.width() <= self.config.max_analysis_width {
            return gray;
        }
        let scale = self.config.max_analysis_width as f64 / gray.width() as f64;
        let height = ((gray.height() as f64 * scale).round() as u32).max(1);
        image::imageops::resize(
            &gray,
            self.config.max_analysis_width,
            height,
            FilterType::Triangle,
        )
    }

    /// Spaghetti: many small edge contours spread across the frame.
    fn detect_spaghetti(&self, edges: &Mask) -> Vec<DetectedDefect> {
        let components = connected_components(edges);
        let small: Vec<&Component> = components
            .iter()
            .filter(|c| {
                c.area() > self.config.spaghetti_min_contour_area
                    && c.area() < self.config.spaghetti_max_contour_area
            })
            .collect();

        if small.len() <= self.config.spaghetti_contour_count {
            return Vec::new();
        }

        // Spaghetti spreads; a dense model in one corner does not
        let (min_x, max_x, min_y, max_y) = small.iter().fold(
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
            |(min_x, max_x, min_y, max_y), c| {
                let (cx, cy) = c.centroid();
                (min_x.min(cx), max_x.max(cx), min_y.min(cy), max_y.max(cy))
            },
        );
        let x_spread = (max_x - min_x) / edges.width as f64;
        let y_spread = (max_y - min_y) / edges.height as f64;

        if x_spread > self.config.spaghetti_spread && y_spread > self.config.spaghetti_spread {
            vec![DetectedDefect {
                kind: DefectKind::Spaghetti,
                severity: Severity::Critical,
                confidence: (small.len() as f64 / 200.0).min(0.9),
                description: "possible spaghetti failure - chaotic filament pattern".to_string(),
                location: None,
                suggested_fix: Some(
                    "Stop the print. Check bed adhesion and first layer settings.".to_string(),
                ),
            }]
        } else {
            Vec::new()
        }
    }

    /// Layer shift: abrupt changes in the per-column vertical edge energy.
    fn detect_layer_shift(&self, gx: &[f64], width: u32, height: u32) -> Vec<DetectedDefect> {
        let mut col_sums = vec![0.0f64; width as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                col_sums[x] += gx[y * width as usize + x].abs();
            }
        }

        let diffs: Vec<f64> = col_sums.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        if diffs.is_empty() {
            return Vec::new();
        }
        let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
        let variance =
            diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / diffs.len() as f64;
        let threshold = mean + self.config.shift_sigma_factor * variance.sqrt();

        let shifts = diffs.iter().filter(|&&d| d > threshold && d > 0.0).count();
        if shifts > self.config.shift_count {
            vec![DetectedDefect {
                kind: DefectKind::LayerShift,
                severity: Severity::Warning,
                confidence: 0.6,
                description: "possible layer shift detected".to_string(),
                location: None,
                suggested_fix: Some(
                    "Check belt tension and make sure the printer sits on a stable surface."
                        .to_string(),
                ),
            }]
        } else {
            Vec::new()
        }
    }

    /// Stringing: thin near-vertical filaments between features.
    fn detect_stringing(&self, gray: &GrayImage) -> Vec<DetectedDefect> {
        // Thin-vertical-line kernel
        let kernel = [
            -1.0, 2.0, -1.0, //
            -1.0, 2.0, -1.0, //
            -1.0, 2.0, -1.0,
        ];
        let response = convolve3x3(gray, &kernel);

        let width = gray.width();
        let height = gray.height();
        let mask = Mask {
            width,
            height,
            data: response
                .iter()
                .map(|&v| v > self.config.string_response_threshold as f64)
                .collect(),
        };

        let segments = connected_components(&mask);
        let strings = segments
            .iter()
            .filter(|c| {
                let (_, _, _, h) = c.bbox();
                h >= self.config.string_min_length && c.is_mostly_vertical()
            })
            .count();

        if strings > self.config.string_count {
            vec![DetectedDefect {
                kind: DefectKind::Stringing,
                severity: Severity::Info,
                confidence: (strings as f64 / 30.0).min(0.8),
                description: format!("stringing detected ({strings} strings)"),
                location: None,
                suggested_fix: Some(
                    "Increase retraction distance/speed or lower the nozzle temperature."
                        .to_string(),
                ),
            }]
        } else {
            Vec::new()
        }
    }

    /// Warping: elongated near-horizontal curls in the bottom third.
    fn detect_warping(&self, gray: &GrayImage) -> Vec<DetectedDefect> {
        let height = gray.height();
        let band_top = height * 2 / 3;
        let band = image::imageops::crop_imm(gray, 0, band_top, gray.width(), height - band_top)
            .to_image();

        let (gx, gy) = sobel(&band);
        let edges = edge_mask(&gx, &gy, band.width(), band.height(), self.config.edge_threshold);

        for component in connected_components(&edges) {
            if component.area() < self.config.warp_min_area {
                continue;
            }

            let (ratio, angle_degrees) = component.ellipse_shape();
            let (low, high) = self.config.warp_angle_degrees;
            if ratio > self.config.warp_axis_ratio && angle_degrees > low && angle_degrees < high {
                let (x, y, w, h) = component.bbox();
                return vec![DetectedDefect {
                    kind: DefectKind::Warping,
                    severity: Severity::Warning,
                    confidence: 0.5,
                    description: "possible corner warping detected".to_string(),
                    location: Some((x, y + band_top, w, h)),
                    suggested_fix: Some(
                        "Increase bed temperature, add a brim, or shield the printer from drafts."
                            .to_string(),
                    ),
                }];
            }
        }
        Vec::new()
    }

    /// Blobs/zits: compact bright spots on the surface.
    fn detect_blobs(&self, gray: &GrayImage) -> Vec<DetectedDefect> {
        let mask = Mask {
            width: gray.width(),
            height: gray.height(),
            data: gray
                .pixels()
                .map(|p| p.0[0] > self.config.blob_brightness)
                .collect(),
        };

        let blobs = connected_components(&mask)
            .into_iter()
            .filter(|c| {
                c.area() >= self.config.blob_min_area && c.area() <= self.config.blob_max_area
            })
            .filter(|c| c.circularity(&mask) >= self.config.blob_min_circularity)
            .filter(|c| c.convexity() >= self.config.blob_min_convexity)
            .count();

        if blobs > self.config.blob_count {
            vec![DetectedDefect {
                kind: DefectKind::Blob,
                severity: Severity::Info,
                confidence: (blobs as f64 / 15.0).min(0.7),
                description: format!("blobs/zits detected ({blobs} spots)"),
                location: None,
                suggested_fix: Some(
                    "Tune retraction or lower the nozzle temperature.".to_string(),
                ),
            }]
        } else {
            Vec::new()
        }
    }

    /// Motion analysis against the previous frame.
    fn analyze_motion(
        &self,
        previous: &GrayImage,
        current: &GrayImage,
    ) -> (Vec<DetectedDefect>, Vec<String>) {
        if previous.dimensions() != current.dimensions() {
            return (Vec::new(), Vec::new());
        }

        let threshold = self.config.motion_pixel_threshold as i16;
        let changed = previous
            .pixels()
            .zip(current.pixels())
            .filter(|(a, b)| (a.0[0] as i16 - b.0[0] as i16).abs() > threshold)
            .count();
        let ratio = changed as f64 / (current.width() * current.height()) as f64;

        let mut defects = Vec::new();
        let mut notes = Vec::new();

        if ratio < self.config.motion_stall_ratio {
            notes.push("very little motion detected - print may be stalled".to_string());
        } else if ratio > self.config.motion_failure_ratio {
            notes.push("high motion detected - possible print failure".to_string());
            defects.push(DetectedDefect {
                kind: DefectKind::Spaghetti,
                severity: Severity::Warning,
                confidence: 0.5,
                description: "abnormally high motion between frames".to_string(),
                location: None,
                suggested_fix: Some("Check the print visually for failures.".to_string()),
            });
        }

        (defects, notes)
    }
}

impl Default for DefectAnalyzer {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

// Pixel Math

/// Binary pixel mask.
struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl Mask {
    fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }
}

/// An 8-connected component of a mask.
struct Component {
    pixels: Vec<(u32, u32)>,
}

impl Component {
    fn area(&self) -> usize {
        self.pixels.len()
    }

    fn centroid(&self) -> (f64, f64) {
        let n = self.pixels.len() as f64;
        let (sx, sy) = self
            .pixels
            .iter()
            .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x as f64, sy + y as f64));
        (sx / n, sy / n)
    }

    fn bbox(&self) -> (u32, u32, u32, u32) {
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0, 0);
        for &(x, y) in &self.pixels {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
    }

    /// Second central moments (mu20, mu02, mu11), normalized by area.
    fn moments(&self) -> (f64, f64, f64) {
        let (cx, cy) = self.centroid();
        let n = self.pixels.len() as f64;
        let (mut mu20, mut mu02, mut mu11) = (0.0, 0.0, 0.0);
        for &(x, y) in &self.pixels {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            mu20 += dx * dx;
            mu02 += dy * dy;
            mu11 += dx * dy;
        }
        (mu20 / n, mu02 / n, mu11 / n)
    }

    /// Moment-based ellipse fit: (major/minor axis ratio, orientation of the
    /// major axis in degrees, [0, 180)).
    fn ellipse_shape(&self) -> (f64, f64) {
        let (mu20, mu02, mu11) = self.moments();
        let trace = mu20 + mu02;
        let delta = ((mu20 - mu02).powi(2) + 4.0 * mu11 * mu11).sqrt();
        let l1 = (trace + delta) / 2.0;
        let l2 = ((trace - delta) / 2.0).max(1e-9);
        let ratio = (l1 / l2).sqrt();

        let theta = 0.5 * (2.0 * mu11).atan2(mu20 - mu02);
        let mut degrees = theta.to_degrees();
        if degrees < 0.0 {
            degrees += 180.0;
        }
        (ratio, degrees)
    }

    /// True when the principal axis is closer to vertical than horizontal.
    fn is_mostly_vertical(&self) -> bool {
        let (_, degrees) = self.ellipse_shape();
        (45.0..135.0).contains(&degrees)
    }

    /// Boundary pixel count (pixels with at least one 4-neighbor outside).
    fn perimeter(&self, mask: &Mask) -> usize {
        self.pixels
            .iter()
            .filter(|&&(x, y)| {
                let (x, y) = (x as i64, y as i64);
                !mask.get(x - 1, y) || !mask.get(x + 1, y) || !mask.get(x, y - 1)
                    || !mask.get(x, y + 1)
            })
            .count()
    }

    /// 4πA/P², clamped to [0, 1].
    fn circularity(&self, mask: &Mask) -> f64 {
        let perimeter = self.perimeter(mask);
        if perimeter == 0 {
            return 1.0;
        }
        (4.0 * std::f64::consts::PI * self.area() as f64 / (perimeter * perimeter) as f64).min(1.0)
    }

    /// Area over convex hull area, clamped to [0, 1].
    fn convexity(&self) -> f64 {
        let hull = convex_hull(&self.pixels);
        let hull_area = polygon_area(&hull);
        if hull_area <= 0.0 {
            return 1.0;
        }
        (self.area() as f64 / hull_area).min(1.0)
    }
}

/// 3x3 convolution producing per-pixel responses; borders are zero.
fn convolve3x3(img: &GrayImage, kernel: &[f64; 9]) -> Vec<f64> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let mut out = vec![0.0; width * height];
    if width < 3 || height < 3 {
        return out;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = 0.0;
            for ky in 0..3usize {
                for kx in 0..3usize {
                    let px = img.get_pixel((x + kx - 1) as u32, (y + ky - 1) as u32).0[0];
                    acc += kernel[ky * 3 + kx] * px as f64;
                }
            }
            out[y * width + x] = acc;
        }
    }
    out
}

/// Horizontal and vertical Sobel responses.
fn sobel(img: &GrayImage) -> (Vec<f64>, Vec<f64>) {
    let kx = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
    let ky = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];
    (convolve3x3(img, &kx), convolve3x3(img, &ky))
}

/// Thresholded gradient magnitude mask.
fn edge_mask(gx: &[f64], gy: &[f64], width: u32, height: u32, threshold: f64) -> Mask {
    let data = gx
        .iter()
        .zip(gy.iter())
        .map(|(&x, &y)| (x * x + y * y).sqrt() > threshold)
        .collect();
    Mask {
        width,
        height,
        data,
    }
}

/// Extracts 8-connected components from a mask.
fn connected_components(mask: &Mask) -> Vec<Component> {
    let width = mask.width as usize;
    let height = mask.height as usize;
    let mut visited = vec![false; width * height];
    let mut components = Vec::new();

    for start in 0..width * height {
        if !mask.data[start] || visited[start] {
            continue;
        }

        let mut pixels = Vec::new();
        let mut stack = vec![start];
        visited[start] = true;

        while let Some(idx) = stack.pop() {
            let x = (idx % width) as i64;
            let y = (idx / width) as i64;
            pixels.push((x as u32, y as u32));

            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let nidx = ny as usize * width + nx as usize;
                    if mask.data[nidx] && !visited[nidx] {
                        visited[nidx] = true;
                        stack.push(nidx);
                    }
                }
            }
        }

        components.push(Component { pixels });
    }

    components
}

/// Convex hull of pixel coordinates (Andrew's monotone chain).
fn convex_hull(points: &[(u32, u32)]) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = points.iter().map(|&(x, y)| (x as f64, y as f64)).collect();
    pts.sort_by(|a, b| a.partial_cmp(b).unwrap());
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };

    let mut hull: Vec<(f64, f64)> = Vec::with_capacity(pts.len() * 2);
    for &p in pts.iter().chain(pts.iter().rev().skip(1)) {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// Shoelace polygon area.
fn polygon_area(polygon: &[(f64, f64)]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..polygon.len() {
        let (x1, y1) = polygon[i];
        let (x2, y2) = polygon[(i + 1) % polygon.len()];
        acc += x1 * y2 - x2 * y1;
    }
    acc.abs() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::test_support::encode_jpeg;

    fn frame_from(img: &GrayImage, number: u64) -> CapturedFrame {
        CapturedFrame {
            data: encode_jpeg(img),
            timestamp: Utc::now(),
            width: img.width(),
            height: img.height(),
            frame_number: number,
        }
    }

    fn defect(severity: Severity, confidence: f64) -> DetectedDefect {
        DetectedDefect {
            kind: DefectKind::Spaghetti,
            severity,
            confidence,
            description: String::new(),
            location: None,
            suggested_fix: None,
        }
    }

    #[test]
    fn test_quality_score_weights() {
        // critical@1.0 costs 40, info@0.4 costs 2
        let defects = vec![defect(Severity::Critical, 1.0), defect(Severity::Info, 0.4)];
        assert_eq!(compute_quality_score(&defects), 58.0);

        let warning = vec![defect(Severity::Warning, 0.5)];
        assert_eq!(compute_quality_score(&warning), 90.0);
    }

    #[test]
    fn test_quality_score_floor() {
        let defects = vec![defect(Severity::Critical, 1.0); 5];
        assert_eq!(compute_quality_score(&defects), 0.0);
    }

    #[test]
    fn test_should_pause_policy() {
        let mut result = DetectionResult {
            timestamp: Utc::now(),
            frame_analyzed: true,
            defects: vec![defect(Severity::Critical, 0.2)],
            quality_score: 92.0,
            notes: Vec::new(),
        };
        assert!(result.should_pause());

        result.defects = vec![defect(Severity::Info, 1.0)];
        result.quality_score = 25.0;
        assert!(result.should_pause());

        result.quality_score = 80.0;
        assert!(!result.should_pause());
    }

    #[test]
    fn test_clean_frame_scores_perfect() {
        let img = GrayImage::from_pixel(320, 240, image::Luma([90]));
        let mut analyzer = DefectAnalyzer::default();
        let result = analyzer.analyze_frame(&frame_from(&img, 1));

        assert!(result.frame_analyzed);
        assert!(result.defects.is_empty());
        assert_eq!(result.quality_score, 100.0);
        assert!(!result.should_pause());
    }

    #[test]
    fn test_undecodable_frame_is_reported_not_raised() {
        let frame = CapturedFrame {
            data: b"garbage".to_vec(),
            timestamp: Utc::now(),
            width: 0,
            height: 0,
            frame_number: 1,
        };
        let mut analyzer = DefectAnalyzer::default();
        let result = analyzer.analyze_frame(&frame);
        assert!(!result.frame_analyzed);
    }

    #[test]
    fn test_spaghetti_on_scattered_specks() {
        // 130 bright specks spread across the frame: classic detached-print
        // chaos
        let mut img = GrayImage::from_pixel(640, 480, image::Luma([10]));
        for row in 0..10u32 {
            for col in 0..13u32 {
                let ox = 20 + col * 50;
                let oy = 20 + row * 50;
                for dy in 0..4 {
                    for dx in 0..4 {
                        img.put_pixel(ox + dx, oy + dy, image::Luma([250]));
                    }
                }
            }
        }

        let mut analyzer = DefectAnalyzer::default();
        let result = analyzer.analyze_frame(&frame_from(&img, 1));

        let spaghetti = result
            .defects
            .iter()
            .find(|d| d.kind == DefectKind::Spaghetti)
            .expect("spaghetti should be detected");
        assert_eq!(spaghetti.severity, Severity::Critical);
        assert!(spaghetti.confidence > 0.5);
        assert!(result.should_pause());
    }

    #[test]
    fn test_motion_stall_note() {
        let img = GrayImage::from_pixel(160, 120, image::Luma([77]));
        let mut analyzer = DefectAnalyzer::default();

        analyzer.set_reference_frame(&frame_from(&img, 1));
        // Idempotent: setting again must not change behavior
        analyzer.set_reference_frame(&frame_from(&img, 1));

        let result = analyzer.analyze_frame(&frame_from(&img, 2));
        assert!(result.notes.iter().any(|n| n.contains("stalled")));
    }

    #[test]
    fn test_motion_spike_flags_failure() {
        let dark = GrayImage::from_pixel(160, 120, image::Luma([10]));
        let bright = GrayImage::from_pixel(160, 120, image::Luma([240]));

        let mut analyzer = DefectAnalyzer::default();
        analyzer.set_reference_frame(&frame_from(&dark, 1));
        let result = analyzer.analyze_frame(&frame_from(&bright, 2));

        let motion = result
            .defects
            .iter()
            .find(|d| d.kind == DefectKind::Spaghetti)
            .expect("high motion should flag a possible failure");
        assert_eq!(motion.severity, Severity::Warning);
        assert_eq!(motion.confidence, 0.5);
        assert!(result.notes.iter().any(|n| n.contains("high motion")));
    }

    #[test]
    fn test_defect_kind_wire_names() {
        assert_eq!(DefectKind::LayerShift.as_str(), "layer_shift");
        assert_eq!(DefectKind::parse("spaghetti"), Some(DefectKind::Spaghetti));
        assert_eq!(DefectKind::parse("gremlins"), None);
    }

    #[test]
    fn test_component_shape_helpers() {
        // A 1x30 vertical strip
        let pixels: Vec<(u32, u32)> = (0..30).map(|y| (5, y)).collect();
        let component = Component { pixels };
        assert!(component.is_mostly_vertical());
        let (ratio, degrees) = component.ellipse_shape();
        assert!(ratio > 3.0);
        assert!((degrees - 90.0).abs() < 1.0);

        let (x, y, w, h) = component.bbox();
        assert_eq!((x, y, w, h), (5, 0, 1, 30));
    }
}
