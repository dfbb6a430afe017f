//! # Orchestrator Facade
//!
//! Thin adapter between the external tool-invocation surface and the
//! components. Every tool takes one typed request (strings stripped) and
//! returns a JSON-encoded string; all component failures come back in-band as
//! `{"error": "<message>"}`. Only programmer errors ever escape.
//!
//! Read-only tools: `parse_description`, `suggest_materials`,
//! `recommend_nozzle`, `optimize_parameters`, `plan_scale`,
//! `workflow_status`, `printer_status`, `list_iterations`,
//! `iteration_statistics`, `recommend_adjustments`, `analyze_frame`.
//! State-changing tools: `start_workflow`, `approve_checkpoint`,
//! `slice_model`, `printer_connect`, `printer_control`, `submit_print`,
//! `capture_frame`, `monitor_print`, `create_iteration`, `record_outcome`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;

use config_types::Config;
use printforge_iteration::{
    IterationStatus, IterationStore, NewIteration, OutcomeUpdate, Recommender,
};
use printforge_materials::{FilamentNeeds, MaterialKnowledgeBase, PartSize};
use printforge_printer::{PrintController, SubmitOptions};
use printforge_slicer::{
    Dimensions, ScalePlan, SliceOptions, SlicerInvocation, SlicingParameterSet,
};
use printforge_vision::{
    CameraEndpoint, CameraSession, CapturedFrame, DefectAnalyzer, DefectKind, DetectorConfig,
};
use printforge_wizard::{
    CheckpointAnswers, GuidedWorkflow, IntentParser, ParameterOptimizer, WorkflowState,
};

pub mod requests {
    //! Typed tool inputs. Unknown keys are rejected at this boundary.

    use super::*;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct ParseDescription {
        pub description: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct StartWorkflow {
        pub description: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct WorkflowId {
        pub workflow_id: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct ApproveCheckpoint {
        pub workflow_id: String,
        #[serde(default)]
        pub answers: CheckpointAnswers,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(deny_unknown_fields, default)]
    pub struct SuggestMaterials {
        pub strength: bool,
        pub flexibility: bool,
        pub heat_resistance: bool,
        pub outdoor: bool,
        pub waterproof: bool,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct RecommendNozzle {
        pub part_size: PartSize,
        #[serde(default)]
        pub fine_detail: bool,
        #[serde(default)]
        pub abrasive: bool,
        #[serde(default)]
        pub speed_priority: bool,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct OptimizeParameters {
        pub params: SlicingParameterSet,
        pub material: String,
        #[serde(default = "default_nozzle")]
        pub nozzle_diameter: f64,
        #[serde(default = "default_ambient")]
        pub ambient_temp_c: f64,
    }

    pub(super) fn default_nozzle() -> f64 {
        0.4
    }

    pub(super) fn default_ambient() -> f64 {
        22.0
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct PlanScale {
        pub original_dimensions: Dimensions,
        pub original_tube_diameter_mm: f64,
        pub target_tube_diameter_mm: f64,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct SliceModel {
        pub model_path: String,
        #[serde(default)]
        pub params: Option<SlicingParameterSet>,
        #[serde(default)]
        pub preset: Option<String>,
        #[serde(default)]
        pub output_name: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct PrinterControl {
        pub action: ControlAction,
        #[serde(default)]
        pub value: Option<serde_json::Value>,
    }

    #[derive(Debug, Clone, Copy, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ControlAction {
        Pause,
        Resume,
        Stop,
        SpeedLevel,
        FanSpeed,
        Gcode,
        HomeAxes,
        NozzleTemp,
        BedTemp,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct SubmitPrint {
        pub file_path: String,
        #[serde(default)]
        pub use_ams: bool,
        #[serde(default)]
        pub timelapse: bool,
        #[serde(default)]
        pub workflow_id: Option<String>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(deny_unknown_fields, default)]
    pub struct CaptureFrame {
        pub save_path: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct AnalyzeFrame {
        pub image_path: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct MonitorPrint {
        /// Number of frames to capture and analyze
        pub frames: u32,
        /// Pause the printer when a frame says the print should stop
        #[serde(default)]
        pub pause_on_critical: bool,
        /// Seconds between captures (defaults to the configured interval)
        #[serde(default)]
        pub interval_seconds: Option<f64>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct CreateIteration {
        pub model_name: String,
        pub model_path: String,
        #[serde(default)]
        pub scale_factor: Option<f64>,
        #[serde(default)]
        pub original_dimensions: Option<Dimensions>,
        #[serde(default)]
        pub scaled_dimensions: Option<Dimensions>,
        #[serde(default)]
        pub parameters: Option<SlicingParameterSet>,
        #[serde(default)]
        pub preset_name: Option<String>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(deny_unknown_fields, default)]
    pub struct ListIterations {
        pub model_name: Option<String>,
        pub limit: Option<u32>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct ModelName {
        pub model_name: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct RecordOutcome {
        pub iteration_id: String,
        pub status: IterationStatus,
        #[serde(default)]
        pub quality_score: Option<f64>,
        #[serde(default)]
        pub defects: Vec<String>,
        #[serde(default)]
        pub notes: String,
        #[serde(default)]
        pub print_time_minutes: Option<u32>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    pub struct RecommendAdjustments {
        #[serde(default)]
        pub params: Option<SlicingParameterSet>,
        pub defects: Vec<String>,
        #[serde(default)]
        pub quality_score: Option<f64>,
        #[serde(default)]
        pub model_name: Option<String>,
    }
}

use requests::*;

/// Renders a success payload.
fn ok<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| error_json(&format!("encoding failed: {e}")))
}

/// Renders an in-band error.
fn error_json(message: &str) -> String {
    json!({ "error": message }).to_string()
}

/// Routes external tool calls to the components.
pub struct Facade {
    config: Config,
    store: IterationStore,
    recommender: Recommender,
    optimizer: ParameterOptimizer,
    slicer: SlicerInvocation,
    workflows: Mutex<HashMap<String, WorkflowState>>,
    controller: Mutex<Option<PrintController>>,
    camera: Mutex<Option<CameraSession>>,
    analyzer: Mutex<DefectAnalyzer>,
}

impl Facade {
    /// Builds the facade, opening the iteration store.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = IterationStore::open(&config.database_path).await?;
        let slicer = SlicerInvocation::new(&config.slicer);

        Ok(Self {
            config,
            store,
            recommender: Recommender::new(),
            optimizer: ParameterOptimizer::new(),
            slicer,
            workflows: Mutex::new(HashMap::new()),
            controller: Mutex::new(None),
            camera: Mutex::new(None),
            analyzer: Mutex::new(DefectAnalyzer::new(DetectorConfig::default())),
        })
    }

    // Intent and knowledge base

    /// Read-only: parses a plain-language description.
    pub fn parse_description(&self, request: ParseDescription) -> String {
        let description = request.description.trim();
        if description.is_empty() {
            return error_json("description is empty");
        }
        ok(&IntentParser::new().parse(description))
    }

    /// Read-only: suggests filaments for a set of needs.
    pub fn suggest_materials(&self, request: SuggestMaterials) -> String {
        let needs = FilamentNeeds {
            strength: request.strength,
            flexibility: request.flexibility,
            heat_resistance: request.heat_resistance,
            outdoor: request.outdoor,
            waterproof: request.waterproof,
        };
        let suggestions = MaterialKnowledgeBase::global().suggest_filaments(&needs);
        ok(&suggestions)
    }

    /// Read-only: recommends a nozzle with its reasoning.
    pub fn recommend_nozzle(&self, request: RecommendNozzle) -> String {
        let (nozzle, reason) = MaterialKnowledgeBase::global().recommend_nozzle(
            request.part_size,
            request.fine_detail,
            request.abrasive,
            request.speed_priority,
        );
        ok(&json!({ "nozzle": nozzle, "reason": reason }))
    }

    /// Read-only: optimizes a parameter set for a material.
    pub fn optimize_parameters(&self, request: OptimizeParameters) -> String {
        let result = self.optimizer.optimize(
            &request.params,
            request.material.trim(),
            request.nozzle_diameter,
            request.ambient_temp_c,
        );
        ok(&result)
    }

    /// Read-only: plans a tube-swap scale.
    pub fn plan_scale(&self, request: PlanScale) -> String {
        if request.original_tube_diameter_mm <= 0.0 || request.target_tube_diameter_mm <= 0.0 {
            return error_json("tube diameters must be positive");
        }
        let plan = ScalePlan::for_tube_swap(
            request.original_dimensions,
            request.original_tube_diameter_mm,
            request.target_tube_diameter_mm,
        );
        ok(&plan)
    }

    // Guided workflow

    /// Starts a guided workflow and returns its first checkpoint.
    pub async fn start_workflow(&self, request: StartWorkflow) -> String {
        let workflow = GuidedWorkflow::start(request.description.trim());
        let response = json!({
            "workflow_id": workflow.state().workflow_id,
            "stage": workflow.state().current_stage,
            "checkpoint": workflow.current_checkpoint(),
        });

        self.workflows
            .lock()
            .await
            .insert(workflow.state().workflow_id.clone(), workflow.into_state());
        response.to_string()
    }

    /// Read-only: current workflow state.
    pub async fn workflow_status(&self, request: WorkflowId) -> String {
        let workflows = self.workflows.lock().await;
        match workflows.get(request.workflow_id.trim()) {
            Some(state) => ok(state),
            None => error_json(&format!("unknown workflow '{}'", request.workflow_id)),
        }
    }

    /// Approves the waiting checkpoint of a workflow.
    pub async fn approve_checkpoint(&self, request: ApproveCheckpoint) -> String {
        let mut workflows = self.workflows.lock().await;
        let Some(state) = workflows.remove(request.workflow_id.trim()) else {
            return error_json(&format!("unknown workflow '{}'", request.workflow_id));
        };

        let mut workflow = GuidedWorkflow::resume(state);
        let response = match workflow.approve(request.answers) {
            Ok(_) => json!({
                "workflow_id": workflow.state().workflow_id,
                "stage": workflow.state().current_stage,
                "is_complete": workflow.state().is_complete,
                "checkpoint": workflow.current_checkpoint(),
                "slicing": workflow.state().slicing,
            })
            .to_string(),
            Err(e) => error_json(&e.to_string()),
        };

        workflows.insert(
            workflow.state().workflow_id.clone(),
            workflow.into_state(),
        );
        response
    }

    // Slicing

    /// Slices a model file. All failures come back in the result body.
    pub async fn slice_model(&self, request: SliceModel) -> String {
        let params = match (&request.params, &request.preset) {
            (Some(params), _) => params.clone(),
            (None, Some(preset)) => {
                match printforge_slicer::parameters::get_preset(preset.trim()) {
                    Ok(preset) => preset.parameters,
                    Err(e) => return error_json(&e.to_string()),
                }
            }
            (None, None) => SlicingParameterSet::default(),
        };

        let options = SliceOptions {
            output_name: request.output_name,
            ..Default::default()
        };
        let result = self
            .slicer
            .slice_model(Path::new(request.model_path.trim()), &params, options)
            .await;
        ok(&result)
    }

    // Printer

    /// Connects to the printer (idempotent).
    pub async fn printer_connect(&self) -> String {
        if let Err(e) = self.config.printer.validate() {
            return error_json(&e.to_string());
        }

        let mut controller = self.controller.lock().await;
        if controller.is_none() {
            *controller = Some(PrintController::new(&self.config.printer));
        }

        match controller
            .as_mut()
            .expect("controller just created")
            .connect(Some(Duration::from_secs(10)))
            .await
        {
            Ok(true) => ok(&json!({ "connected": true })),
            Ok(false) => error_json("printer connection timed out; check IP and access code"),
            Err(e) => error_json(&e.to_string()),
        }
    }

    /// Read-only: current printer status.
    pub async fn printer_status(&self) -> String {
        let controller = self.controller.lock().await;
        let Some(controller) = controller.as_ref() else {
            return error_json("not connected to the printer (call printer_connect first)");
        };

        match controller.refresh_status().await {
            Some(status) => ok(&status),
            None => error_json("no status available from the printer"),
        }
    }

    /// Executes a printer control action.
    pub async fn printer_control(&self, request: PrinterControl) -> String {
        let controller = self.controller.lock().await;
        let Some(controller) = controller.as_ref() else {
            return error_json("not connected to the printer (call printer_connect first)");
        };

        let result = match request.action {
            ControlAction::Pause => controller.pause().await,
            ControlAction::Resume => controller.resume().await,
            ControlAction::Stop => controller.stop().await,
            ControlAction::SpeedLevel => match request.value.as_ref().and_then(|v| v.as_u64()) {
                Some(level) => controller.set_speed_level(level.min(u8::MAX as u64) as u8).await,
                None => return error_json("speed_level requires an integer value 1-4"),
            },
            ControlAction::FanSpeed => match request.value.as_ref().and_then(|v| v.as_u64()) {
                Some(percent) => {
                    controller
                        .set_fan_speed(percent.min(u8::MAX as u64) as u8)
                        .await
                }
                None => return error_json("fan_speed requires an integer value 0-100"),
            },
            ControlAction::Gcode => match request.value.as_ref().and_then(|v| v.as_str()) {
                Some(line) => controller.send_gcode(line.trim()).await,
                None => return error_json("gcode requires a string value"),
            },
            ControlAction::HomeAxes => controller.home_axes().await,
            ControlAction::NozzleTemp => match request.value.as_ref().and_then(|v| v.as_u64()) {
                Some(temp) => controller.set_nozzle_temp(temp as u32).await,
                None => return error_json("nozzle_temp requires an integer value"),
            },
            ControlAction::BedTemp => match request.value.as_ref().and_then(|v| v.as_u64()) {
                Some(temp) => controller.set_bed_temp(temp as u32).await,
                None => return error_json("bed_temp requires an integer value"),
            },
        };

        match result {
            Ok(()) => ok(&json!({ "ok": true, "job": controller.current_job() })),
            Err(e) => error_json(&e.to_string()),
        }
    }

    /// Submits a sliced bundle and records the attempt in the store.
    pub async fn submit_print(&self, request: SubmitPrint) -> String {
        let controller = self.controller.lock().await;
        let Some(controller) = controller.as_ref() else {
            return error_json("not connected to the printer (call printer_connect first)");
        };

        let file_path = PathBuf::from(request.file_path.trim());
        let options = SubmitOptions {
            use_ams: request.use_ams,
            timelapse: request.timelapse,
            ..Default::default()
        };

        let job = match controller.submit(&file_path, options).await {
            Ok(job) => job,
            Err(e) => return error_json(&e.to_string()),
        };

        // Tie the attempt to the workflow's parameters when one is given
        let (parameters, preset_name) = match &request.workflow_id {
            Some(id) => {
                let workflows = self.workflows.lock().await;
                match workflows.get(id.trim()) {
                    Some(state) => (state.slicing.clone(), Some(state.material.clone())),
                    None => (None, None),
                }
            }
            None => (None, None),
        };

        let model_name = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| job.job_id.clone());
        let iteration = match self
            .store
            .create(NewIteration {
                model_name,
                model_path: file_path.display().to_string(),
                parameters,
                preset_name,
                ..Default::default()
            })
            .await
        {
            Ok(iteration) => iteration,
            Err(e) => return error_json(&e.to_string()),
        };

        info!(job_id = %job.job_id, iteration_id = %iteration.iteration_id, "print submitted");
        ok(&json!({ "job": job, "iteration_id": iteration.iteration_id }))
    }

    // Camera and analysis

    /// Captures one camera frame, optionally saving it.
    pub async fn capture_frame(&self, request: CaptureFrame) -> String {
        if let Err(e) = self.config.printer.validate() {
            return error_json(&e.to_string());
        }

        let mut camera = self.camera.lock().await;
        if camera.is_none() {
            let endpoint = CameraEndpoint::from_config(&self.config.printer, &self.config.camera);
            let mut session = CameraSession::from_endpoint(endpoint);
            if !session.open(Duration::from_secs(10)).await {
                return error_json("camera stream is not reachable");
            }
            *camera = Some(session);
        }

        let session = camera.as_mut().expect("camera just opened");
        let Some(frame) = session.capture_one().await else {
            return error_json("frame capture failed");
        };

        let mut saved_to = None;
        if let Some(path) = request.save_path {
            let path = PathBuf::from(path.trim());
            if frame.save(&path).await.is_ok() {
                saved_to = Some(path.display().to_string());
            }
        }

        ok(&json!({
            "frame_number": frame.frame_number,
            "width": frame.width,
            "height": frame.height,
            "timestamp": frame.timestamp,
            "saved_to": saved_to,
        }))
    }

    /// Read-only: analyzes an image file for print defects.
    pub async fn analyze_frame(&self, request: AnalyzeFrame) -> String {
        let path = request.image_path.trim();
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) => return error_json(&format!("cannot read {path}: {e}")),
        };

        let frame = CapturedFrame {
            data,
            timestamp: Utc::now(),
            width: 0,
            height: 0,
            frame_number: 0,
        };
        let result = self.analyzer.lock().await.analyze_frame(&frame);
        ok(&result)
    }

    /// Watches a running print: captures frames on an interval, analyzes
    /// each, and optionally pauses the printer when a frame says the print
    /// should stop.
    pub async fn monitor_print(&self, request: MonitorPrint) -> String {
        if request.frames == 0 {
            return error_json("frames must be at least 1");
        }
        if let Err(e) = self.config.printer.validate() {
            return error_json(&e.to_string());
        }

        let interval = Duration::from_secs_f64(
            request
                .interval_seconds
                .unwrap_or(self.config.camera.capture_interval)
                .max(0.1),
        );

        let mut camera = self.camera.lock().await;
        if camera.is_none() {
            let endpoint = CameraEndpoint::from_config(&self.config.printer, &self.config.camera);
            let mut session = CameraSession::from_endpoint(endpoint);
            if !session.open(Duration::from_secs(10)).await {
                return error_json("camera stream is not reachable");
            }
            *camera = Some(session);
        }
        let session = camera.as_mut().expect("camera just opened");
        let mut analyzer = self.analyzer.lock().await;

        let mut results = Vec::new();
        let mut paused = false;
        for index in 0..request.frames {
            let Some(frame) = session.capture_one().await else {
                results.push(json!({ "frame": null, "error": "capture failed" }));
                continue;
            };

            let result = analyzer.analyze_frame(&frame);
            let should_pause = result.should_pause();
            results.push(json!({
                "frame_number": frame.frame_number,
                "analysis": result,
            }));

            if should_pause && request.pause_on_critical && !paused {
                let controller = self.controller.lock().await;
                if let Some(controller) = controller.as_ref() {
                    match controller.pause().await {
                        Ok(()) => {
                            info!("print paused by defect monitor");
                            paused = true;
                        }
                        Err(e) => results.push(json!({ "pause_error": e.to_string() })),
                    }
                }
            }

            if index + 1 < request.frames {
                tokio::time::sleep(interval).await;
            }
        }

        ok(&json!({ "frames_analyzed": results.len(), "paused": paused, "results": results }))
    }

    // Iteration history

    /// Creates an iteration record ahead of a print attempt.
    pub async fn create_iteration(&self, request: CreateIteration) -> String {
        match self
            .store
            .create(NewIteration {
                model_name: request.model_name.trim().to_string(),
                model_path: request.model_path.trim().to_string(),
                scale_factor: request.scale_factor,
                original_dimensions: request.original_dimensions,
                scaled_dimensions: request.scaled_dimensions,
                parameters: request.parameters,
                preset_name: request.preset_name,
            })
            .await
        {
            Ok(record) => ok(&record),
            Err(e) => error_json(&e.to_string()),
        }
    }

    /// Read-only: lists iterations, optionally for one model.
    pub async fn list_iterations(&self, request: ListIterations) -> String {
        let limit = request.limit.unwrap_or(20);
        let result = match request.model_name.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => self.store.list_for_model(model, limit).await,
            _ => self.store.list_recent(limit).await,
        };
        match result {
            Ok(records) => ok(&records),
            Err(e) => error_json(&e.to_string()),
        }
    }

    /// Read-only: print statistics for one model.
    pub async fn iteration_statistics(&self, request: ModelName) -> String {
        match self.store.statistics(request.model_name.trim()).await {
            Ok(stats) => ok(&stats),
            Err(e) => error_json(&e.to_string()),
        }
    }

    /// Records the outcome of a print attempt.
    pub async fn record_outcome(&self, request: RecordOutcome) -> String {
        let outcome = OutcomeUpdate {
            status: request.status,
            quality_score: request.quality_score,
            defects: request.defects,
            notes: request.notes.trim().to_string(),
            print_time_minutes: request.print_time_minutes,
        };
        match self
            .store
            .record_outcome(request.iteration_id.trim(), outcome)
            .await
        {
            Ok(record) => ok(&record),
            Err(e) => error_json(&e.to_string()),
        }
    }

    /// Read-only: recommends parameter adjustments for the observed defects.
    pub async fn recommend_adjustments(&self, request: RecommendAdjustments) -> String {
        let mut kinds = Vec::new();
        for name in &request.defects {
            match DefectKind::parse(name.trim()) {
                Some(kind) => kinds.push(kind),
                None => return error_json(&format!("unknown defect kind '{name}'")),
            }
        }

        let history = match request.model_name.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => {
                match self.store.list_for_model(model, 50).await {
                    Ok(records) => Some(records),
                    Err(e) => return error_json(&e.to_string()),
                }
            }
            _ => None,
        };

        let params = request.params.unwrap_or_default();
        let recommendations = self.recommender.recommend(
            &params,
            &kinds,
            request.quality_score,
            history.as_deref(),
        );
        ok(&recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn facade() -> (tempfile::TempDir, Facade) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database_path = dir.path().join("prints.db");
        let facade = Facade::new(config).await.unwrap();
        (dir, facade)
    }

    fn parse(response: &str) -> serde_json::Value {
        serde_json::from_str(response).unwrap()
    }

    #[tokio::test]
    async fn test_errors_are_in_band_json() {
        let (_dir, facade) = facade().await;

        let response = facade.parse_description(ParseDescription {
            description: "   ".to_string(),
        });
        assert!(parse(&response)["error"].is_string());

        let response = facade.printer_status().await;
        assert!(parse(&response)["error"]
            .as_str()
            .unwrap()
            .contains("printer_connect"));
    }

    #[tokio::test]
    async fn test_parse_description_strips_and_responds() {
        let (_dir, facade) = facade().await;
        let response = facade.parse_description(ParseDescription {
            description: "  a heavy duty 65mm diameter squeezer  ".to_string(),
        });
        let value = parse(&response);
        assert_eq!(value["strength"], "heavy");
        assert_eq!(value["dimensions"]["diameter"], 65.0);
    }

    #[tokio::test]
    async fn test_workflow_round_trip_through_facade() {
        let (_dir, facade) = facade().await;

        let response = facade
            .start_workflow(StartWorkflow {
                description: "a snug squeezer for a 65mm diameter bottle".to_string(),
            })
            .await;
        let value = parse(&response);
        let workflow_id = value["workflow_id"].as_str().unwrap().to_string();
        assert_eq!(value["stage"], "requirements");

        // Approve every checkpoint with defaults until ready
        let mut stage = String::new();
        for _ in 0..6 {
            let response = facade
                .approve_checkpoint(ApproveCheckpoint {
                    workflow_id: workflow_id.clone(),
                    answers: CheckpointAnswers::default(),
                })
                .await;
            let value = parse(&response);
            assert!(value["error"].is_null(), "unexpected error: {value}");
            stage = value["stage"].as_str().unwrap().to_string();
        }
        assert_eq!(stage, "ready");

        let status = facade
            .workflow_status(WorkflowId {
                workflow_id: workflow_id.clone(),
            })
            .await;
        let value = parse(&status);
        assert_eq!(value["is_complete"], true);
        assert!(value["slicing"].is_object());
    }

    #[tokio::test]
    async fn test_plan_scale_tool() {
        let (_dir, facade) = facade().await;
        let response = facade.plan_scale(PlanScale {
            original_dimensions: Dimensions::new(38.0, 45.0, 35.0),
            original_tube_diameter_mm: 25.0,
            target_tube_diameter_mm: 65.0,
        });
        let value = parse(&response);
        assert!((value["scale_factor"].as_f64().unwrap() - 2.6).abs() < 1e-9);
        assert!(
            (value["scaled_dimensions"]["width"].as_f64().unwrap() - 98.8).abs() < 0.01
        );
    }

    #[tokio::test]
    async fn test_iteration_tools() {
        let (_dir, facade) = facade().await;

        let response = facade
            .create_iteration(CreateIteration {
                model_name: " foo ".to_string(),
                model_path: "/tmp/foo.stl".to_string(),
                scale_factor: None,
                original_dimensions: None,
                scaled_dimensions: None,
                parameters: None,
                preset_name: None,
            })
            .await;
        let iteration_id = parse(&response)["iteration_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = facade
            .record_outcome(RecordOutcome {
                iteration_id,
                status: IterationStatus::Completed,
                quality_score: Some(91.0),
                defects: vec!["stringing".to_string()],
                notes: "good".to_string(),
                print_time_minutes: Some(42),
            })
            .await;
        assert_eq!(parse(&response)["status"], "completed");

        let response = facade
            .iteration_statistics(ModelName {
                model_name: "foo".to_string(),
            })
            .await;
        let value = parse(&response);
        assert_eq!(value["total_attempts"], 1);
        assert_eq!(value["success_rate"], 100.0);
    }

    #[tokio::test]
    async fn test_recommend_adjustments_tool() {
        let (_dir, facade) = facade().await;

        let params = SlicingParameterSet {
            outer_wall_speed: 60.0,
            retraction_length: 0.8,
            nozzle_temperature: 220.0,
            ..Default::default()
        };
        let response = facade
            .recommend_adjustments(RecommendAdjustments {
                params: Some(params),
                defects: vec!["stringing".to_string()],
                quality_score: None,
                model_name: None,
            })
            .await;
        let value = parse(&response);
        let list = value.as_array().unwrap();
        assert_eq!(list.len(), 4);

        let response = facade
            .recommend_adjustments(RecommendAdjustments {
                params: None,
                defects: vec!["gremlins".to_string()],
                quality_score: None,
                model_name: None,
            })
            .await;
        assert!(parse(&response)["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_in_band_error() {
        let (_dir, facade) = facade().await;
        let response = facade
            .workflow_status(WorkflowId {
                workflow_id: "nope".to_string(),
            })
            .await;
        assert!(parse(&response)["error"].is_string());
    }
}
