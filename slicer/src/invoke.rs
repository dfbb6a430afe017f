//! External slicer invocation.
//!
//! Runs the slicer binary as a bounded subprocess and scrapes estimates from
//! its textual output. Every failure mode (missing binary, nonzero exit,
//! timeout, missing artifact) produces a `SliceResult` with `success == false`
//! and a message; nothing is raised across the component boundary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use config_types::SlicerConfig;

use crate::parameters::SlicingParameterSet;

/// Hard ceiling on slicer run time.
pub const SLICE_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for the availability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Estimates scraped from the slicer's textual output.
///
/// Absence of a match yields `None`, never a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlicerEstimates {
    /// Estimated print time (seconds)
    pub print_time_seconds: Option<u64>,

    /// Filament length used (mm)
    pub filament_mm: Option<f64>,

    /// Filament mass used (grams)
    pub filament_grams: Option<f64>,

    /// Number of layers
    pub layer_count: Option<u32>,
}

/// Result of a slicing operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceResult {
    pub success: bool,

    /// Input model path
    pub input_model: PathBuf,

    /// Produced 3MF bundle with embedded G-code
    pub output_3mf: Option<PathBuf>,

    /// Human-readable failure message
    pub error_message: Option<String>,

    /// Scraped estimates
    pub estimates: SlicerEstimates,

    /// Parameters frozen at slice time
    pub parameters_used: Option<SlicingParameterSet>,

    /// Combined stdout/stderr for diagnostics
    pub cli_output: String,
}

impl SliceResult {
    fn failure(input: &Path, message: impl Into<String>) -> Self {
        Self {
            success: false,
            input_model: input.to_path_buf(),
            output_3mf: None,
            error_message: Some(message.into()),
            estimates: SlicerEstimates::default(),
            parameters_used: None,
            cli_output: String::new(),
        }
    }
}

/// Invocation options beyond the parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceOptions {
    /// Base name for output files (model stem if absent)
    pub output_name: Option<String>,

    /// Let the slicer orient the model
    pub auto_orient: bool,

    /// Let the slicer arrange the plate
    pub auto_arrange: bool,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            output_name: None,
            auto_orient: true,
            auto_arrange: true,
        }
    }
}

/// Wrapper around the external slicer CLI.
pub struct SlicerInvocation {
    executable: PathBuf,
    profiles_dir: Option<PathBuf>,
    output_dir: PathBuf,
}

impl SlicerInvocation {
    pub fn new(config: &SlicerConfig) -> Self {
        Self {
            executable: config.executable_path.clone(),
            profiles_dir: config.profiles_dir.clone(),
            output_dir: config.temp_dir.join("sliced"),
        }
    }

    /// Checks whether the slicer binary is present and answers `--help`.
    pub async fn is_available(&self) -> (bool, String) {
        if !self.executable.exists() {
            return (
                false,
                format!("slicer not found at {}", self.executable.display()),
            );
        }

        let probe = Command::new(&self.executable)
            .arg("--help")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(output)) => {
                let text = String::from_utf8_lossy(&output.stdout);
                if output.status.success() || text.contains("Usage:") {
                    (true, "slicer CLI is available".to_string())
                } else {
                    (
                        false,
                        format!(
                            "slicer returned an error: {}",
                            String::from_utf8_lossy(&output.stderr)
                        ),
                    )
                }
            }
            Ok(Err(e)) => (false, format!("failed to run slicer: {e}")),
            Err(_) => (false, "slicer CLI probe timed out".to_string()),
        }
    }

    /// Slices a model with the given parameters.
    ///
    /// Exit 0 plus a non-empty 3MF artifact means success; everything else is
    /// reported in the result.
    pub async fn slice_model(
        &self,
        model_path: &Path,
        parameters: &SlicingParameterSet,
        options: SliceOptions,
    ) -> SliceResult {
        if !model_path.exists() {
            return SliceResult::failure(
                model_path,
                format!("model file not found: {}", model_path.display()),
            );
        }

        let (available, message) = self.is_available().await;
        if !available {
            return SliceResult::failure(model_path, message);
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            return SliceResult::failure(
                model_path,
                format!("cannot create output directory: {e}"),
            );
        }

        let output_name = options.output_name.clone().unwrap_or_else(|| {
            model_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "model".to_string())
        });
        let output_3mf = self.output_dir.join(format!("{output_name}.3mf"));

        let mut cmd = Command::new(&self.executable);
        if options.auto_orient {
            cmd.arg("--orient");
        }
        if options.auto_arrange {
            cmd.args(["--arrange", "1"]);
        }
        cmd.args(parameters.to_cli_args());
        cmd.args(["--slice", "0"]);
        cmd.arg("--export-3mf").arg(&output_3mf);
        // Model path must come last
        cmd.arg(model_path);
        cmd.current_dir(&self.output_dir);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        info!(model = %model_path.display(), output = %output_3mf.display(), "slicing model");
        debug!(?parameters, "slice parameters");

        let output = match tokio::time::timeout(SLICE_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return SliceResult::failure(model_path, format!("slicer failed to start: {e}"))
            }
            Err(_) => {
                warn!("slicer timed out after {}s", SLICE_TIMEOUT.as_secs());
                return SliceResult::failure(model_path, "slicing timed out after 5 minutes");
            }
        };

        let cli_output = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        if !output.status.success() {
            return SliceResult {
                success: false,
                input_model: model_path.to_path_buf(),
                output_3mf: None,
                error_message: Some(format!("slicing failed: {}", truncate(&cli_output, 500))),
                estimates: SlicerEstimates::default(),
                parameters_used: None,
                cli_output,
            };
        }

        if !output_3mf.exists() {
            return SliceResult {
                success: false,
                input_model: model_path.to_path_buf(),
                output_3mf: None,
                error_message: Some("slicing completed but the 3MF artifact is missing".to_string()),
                estimates: SlicerEstimates::default(),
                parameters_used: None,
                cli_output,
            };
        }

        let estimates = parse_estimates(&cli_output);
        info!(?estimates, "slice complete");

        SliceResult {
            success: true,
            input_model: model_path.to_path_buf(),
            output_3mf: Some(output_3mf),
            error_message: None,
            estimates,
            parameters_used: Some(parameters.clone()),
            cli_output,
        }
    }

    /// Lists slicing profiles shipped in the profiles directory.
    pub fn available_profiles(&self) -> Vec<(String, PathBuf)> {
        let Some(dir) = &self.profiles_dir else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };

        let mut profiles: Vec<(String, PathBuf)> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| {
                let name = p.file_stem()?.to_string_lossy().into_owned();
                Some((name, p))
            })
            .collect();
        profiles.sort();
        profiles
    }
}

/// Scrapes estimates from the slicer's combined output.
pub fn parse_estimates(output: &str) -> SlicerEstimates {
    static TIME_RE: OnceLock<Regex> = OnceLock::new();
    static FILAMENT_MM_RE: OnceLock<Regex> = OnceLock::new();
    static FILAMENT_G_RE: OnceLock<Regex> = OnceLock::new();
    static LAYERS_RE: OnceLock<Regex> = OnceLock::new();

    let time_re = TIME_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:estimated|total)\s*(?:print\s*)?time[:\s]+(\d+)[:\s](\d+)").unwrap()
    });
    let filament_mm_re = FILAMENT_MM_RE
        .get_or_init(|| Regex::new(r"(?i)filament[:\s]+(\d+(?:\.\d+)?)\s*mm\b").unwrap());
    // Anchored to a preceding "filament" token so a stray "<n> g" elsewhere in
    // the output cannot be misattributed.
    let filament_g_re = FILAMENT_G_RE.get_or_init(|| {
        Regex::new(r"(?i)filament[^\n]*?(\d+(?:\.\d+)?)\s*g(?:rams)?\b").unwrap()
    });
    let layers_re = LAYERS_RE.get_or_init(|| Regex::new(r"(?i)(\d+)\s*layers?\b").unwrap());

    let mut estimates = SlicerEstimates::default();

    if let Some(caps) = time_re.captures(output) {
        let hours: u64 = caps[1].parse().unwrap_or(0);
        let minutes: u64 = caps[2].parse().unwrap_or(0);
        estimates.print_time_seconds = Some(hours * 3600 + minutes * 60);
    }
    if let Some(caps) = filament_mm_re.captures(output) {
        estimates.filament_mm = caps[1].parse().ok();
    }
    if let Some(caps) = filament_g_re.captures(output) {
        estimates.filament_grams = caps[1].parse().ok();
    }
    if let Some(caps) = layers_re.captures(output) {
        estimates.layer_count = caps[1].parse().ok();
    }

    estimates
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_estimates_full() {
        let output = "\
arranging model\n\
estimated print time: 2:45\n\
filament: 5230.4 mm (15.6 g)\n\
sliced 135 layers\n";

        let estimates = parse_estimates(output);
        assert_eq!(estimates.print_time_seconds, Some(2 * 3600 + 45 * 60));
        assert_eq!(estimates.filament_mm, Some(5230.4));
        assert_eq!(estimates.filament_grams, Some(15.6));
        assert_eq!(estimates.layer_count, Some(135));
    }

    #[test]
    fn test_grams_requires_filament_anchor() {
        // A bare grams figure on an unrelated line must not match
        let output = "plate weight 850 g\nno filament stats here\n";
        let estimates = parse_estimates(output);
        assert_eq!(estimates.filament_grams, None);

        let anchored = "filament used: 4021 mm, 12.1 g\n";
        let estimates = parse_estimates(anchored);
        assert_eq!(estimates.filament_grams, Some(12.1));
    }

    #[test]
    fn test_missing_estimates_are_none_not_failure() {
        let estimates = parse_estimates("nothing useful in here");
        assert_eq!(estimates, SlicerEstimates::default());
    }

    #[tokio::test]
    async fn test_missing_model_file_is_structured_failure() {
        let invocation = SlicerInvocation::new(&config_types::SlicerConfig::default());
        let result = invocation
            .slice_model(
                Path::new("/nonexistent/model.stl"),
                &SlicingParameterSet::default(),
                SliceOptions::default(),
            )
            .await;

        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_structured_failure() {
        let config = config_types::SlicerConfig {
            executable_path: PathBuf::from("/nonexistent/slicer-bin"),
            profiles_dir: None,
            temp_dir: std::env::temp_dir().join("printforge-test"),
        };
        let invocation = SlicerInvocation::new(&config);

        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("cube.stl");
        std::fs::write(&model, b"solid cube\nendsolid cube\n").unwrap();

        let result = invocation
            .slice_model(&model, &SlicingParameterSet::default(), SliceOptions::default())
            .await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("not found"));
    }

    #[test]
    fn test_profiles_dir_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fast.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let config = config_types::SlicerConfig {
            executable_path: PathBuf::from("/bin/true"),
            profiles_dir: Some(dir.path().to_path_buf()),
            temp_dir: std::env::temp_dir(),
        };
        let invocation = SlicerInvocation::new(&config);
        let profiles = invocation.available_profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].0, "fast");
    }
}
