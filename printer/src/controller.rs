//! High-level print job management.
//!
//! The controller owns a [`PrinterSession`] and tracks at most one
//! [`PrintJob`]. Parsed status reports drive the job state machine; terminal
//! states are monotone (a completed, failed, or cancelled job is never
//! mutated again).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use config_types::PrinterConfig;
use protocol::{CommandClass, PrinterState, PrinterStatus, ProjectFileOptions};

use crate::session::{PrinterSession, SessionError, CONNECT_TIMEOUT};

/// Controller-level errors. Transport faults come back through
/// [`SessionError`]; validation errors reject the call before any state
/// changes.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No active print job")]
    NoActiveJob,

    #[error("A print job is already active")]
    JobInProgress,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Print job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Printing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// A submitted print job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    /// Short job identifier
    pub job_id: String,

    /// Path of the sliced bundle
    pub file_path: PathBuf,

    /// File name shown on the printer
    pub file_name: String,

    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub status: JobStatus,

    /// Completion percentage (0.0-100.0)
    pub progress_percent: f64,

    pub error_message: Option<String>,
}

impl PrintJob {
    fn new(file_path: &Path) -> Self {
        Self {
            job_id: short_id(),
            file_path: file_path.to_path_buf(),
            file_name: file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            status: JobStatus::Pending,
            progress_percent: 0.0,
            error_message: None,
        }
    }
}

/// Generates an 8-character id.
pub(crate) fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Maps a parsed printer status onto the job state machine.
///
/// Transitions are monotone except printing ↔ paused; once the job reaches a
/// terminal state nothing mutates it.
pub(crate) fn apply_status(job: &mut PrintJob, status: &PrinterStatus) {
    if job.status.is_terminal() {
        return;
    }

    match status.state {
        PrinterState::Printing => {
            job.status = JobStatus::Printing;
            job.progress_percent = status.progress.percentage;
            if job.started_at.is_none() {
                job.started_at = Some(Utc::now());
            }
        }
        PrinterState::Paused => {
            if job.status == JobStatus::Printing {
                job.status = JobStatus::Paused;
            }
        }
        PrinterState::Finished => {
            job.status = JobStatus::Completed;
            job.progress_percent = 100.0;
            job.completed_at = Some(Utc::now());
        }
        PrinterState::Failed => {
            job.status = JobStatus::Failed;
            job.error_message = Some(format!("print error code: {}", status.print_error));
            job.completed_at = Some(Utc::now());
        }
        _ => {}
    }
}

/// Fan speed percent → `M106` G-code line (PWM 0-255).
pub(crate) fn fan_gcode(percent: u8) -> String {
    let pwm = (percent as f64 * 2.55).round() as u32;
    format!("M106 P1 S{pwm}")
}

/// Options for submitting a print job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOptions {
    pub use_ams: bool,
    pub ams_mapping: Vec<i32>,
    pub bed_leveling: bool,
    pub flow_calibration: bool,
    pub vibration_calibration: bool,
    pub layer_inspect: bool,
    pub timelapse: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            use_ams: false,
            ams_mapping: vec![0],
            bed_leveling: true,
            flow_calibration: true,
            vibration_calibration: true,
            layer_inspect: false,
            timelapse: false,
        }
    }
}

/// High-level printer control interface.
pub struct PrintController {
    session: PrinterSession,
    host: String,
    job: Arc<Mutex<Option<PrintJob>>>,
    subscribers: broadcast::Sender<PrinterStatus>,
    tracker_task: Option<JoinHandle<()>>,
}

impl PrintController {
    pub fn new(config: &PrinterConfig) -> Self {
        let (subscribers, _) = broadcast::channel(64);
        Self {
            session: PrinterSession::new(config),
            host: config.ip_address.clone(),
            job: Arc::new(Mutex::new(None)),
            subscribers,
            tracker_task: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Current job snapshot.
    pub fn current_job(&self) -> Option<PrintJob> {
        self.job.lock().expect("job lock").clone()
    }

    /// Latest cached printer status.
    pub fn current_status(&self) -> Option<PrinterStatus> {
        self.session.cached_status()
    }

    /// Subscribes to parsed status updates fanned out by this controller.
    pub fn subscribe(&self) -> broadcast::Receiver<PrinterStatus> {
        self.subscribers.subscribe()
    }

    /// Connects and starts tracking status → job transitions.
    pub async fn connect(&mut self, timeout: Option<Duration>) -> Result<bool, ControllerError> {
        let connected = self
            .session
            .connect(timeout.unwrap_or(CONNECT_TIMEOUT))
            .await?;
        if !connected {
            return Ok(false);
        }

        let mut reports = self.session.subscribe_reports();
        let job = Arc::clone(&self.job);
        let subscribers = self.subscribers.clone();
        self.tracker_task = Some(tokio::spawn(async move {
            loop {
                match reports.recv().await {
                    Ok(status) => {
                        {
                            let mut job = job.lock().expect("job lock");
                            if let Some(job) = job.as_mut() {
                                apply_status(job, &status);
                            }
                        }
                        // Fan out; a lagging subscriber only loses its own
                        // backlog
                        let _ = subscribers.send(status);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("status tracker lagged by {skipped} reports");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        // Prime the cache
        let _ = self.session.get_status().await;
        Ok(true)
    }

    pub async fn disconnect(&mut self) {
        if let Some(task) = self.tracker_task.take() {
            task.abort();
        }
        self.session.disconnect().await;
    }

    /// Requests a fresh status from the printer.
    pub async fn refresh_status(&self) -> Option<PrinterStatus> {
        self.session.get_status().await
    }

    /// Submits a sliced bundle for printing.
    ///
    /// Only `.3mf` bundles with embedded G-code are accepted. The controller
    /// references the file by URL in the command payload; transferring the
    /// file to the printer is an external responsibility.
    pub async fn submit(
        &self,
        file_path: &Path,
        options: SubmitOptions,
    ) -> Result<PrintJob, ControllerError> {
        let extension = file_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        if extension.as_deref() != Some("3mf") {
            return Err(ControllerError::Validation(
                "only 3MF bundles with embedded G-code can be submitted".to_string(),
            ));
        }

        {
            let job = self.job.lock().expect("job lock");
            if let Some(job) = job.as_ref() {
                if !job.status.is_terminal() {
                    return Err(ControllerError::JobInProgress);
                }
            }
        }

        let job = PrintJob::new(file_path);
        let mut project = ProjectFileOptions::new(
            file_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| job.job_id.clone()),
            format!("ftp://{}/{}", self.host, job.file_name),
        );
        project.use_ams = options.use_ams;
        project.ams_mapping = options.ams_mapping;
        project.bed_leveling = options.bed_leveling;
        project.flow_calibration = options.flow_calibration;
        project.vibration_calibration = options.vibration_calibration;
        project.layer_inspect = options.layer_inspect;
        project.timelapse = options.timelapse;

        self.session
            .send_command(CommandClass::Print, "project_file", project.into_fields())
            .await?;

        info!(job_id = %job.job_id, file = %job.file_name, "print job submitted");
        *self.job.lock().expect("job lock") = Some(job.clone());
        Ok(job)
    }

    /// Pauses the active print.
    pub async fn pause(&self) -> Result<(), ControllerError> {
        self.require_active_job()?;
        self.session
            .send_command(CommandClass::Print, "pause", Map::new())
            .await?;

        let mut job = self.job.lock().expect("job lock");
        if let Some(job) = job.as_mut() {
            if !job.status.is_terminal() {
                job.status = JobStatus::Paused;
            }
        }
        Ok(())
    }

    /// Resumes a paused print.
    pub async fn resume(&self) -> Result<(), ControllerError> {
        {
            let job = self.job.lock().expect("job lock");
            match job.as_ref() {
                Some(job) if job.status == JobStatus::Paused => {}
                Some(_) => {
                    return Err(ControllerError::Validation(
                        "job is not paused".to_string(),
                    ))
                }
                None => return Err(ControllerError::NoActiveJob),
            }
        }

        self.session
            .send_command(CommandClass::Print, "resume", Map::new())
            .await?;

        let mut job = self.job.lock().expect("job lock");
        if let Some(job) = job.as_mut() {
            job.status = JobStatus::Printing;
        }
        Ok(())
    }

    /// Stops (cancels) the active print.
    pub async fn stop(&self) -> Result<(), ControllerError> {
        self.require_active_job()?;
        self.session
            .send_command(CommandClass::Print, "stop", Map::new())
            .await?;

        let mut job = self.job.lock().expect("job lock");
        if let Some(job) = job.as_mut() {
            if !job.status.is_terminal() {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    /// Sets the print speed level (1=silent .. 4=ludicrous).
    pub async fn set_speed_level(&self, level: u8) -> Result<(), ControllerError> {
        if !(1..=4).contains(&level) {
            return Err(ControllerError::Validation(
                "speed level must be 1-4".to_string(),
            ));
        }
        let mut fields = Map::new();
        fields.insert("param".to_string(), json!(level.to_string()));
        self.session
            .send_command(CommandClass::Print, "print_speed", fields)
            .await?;
        Ok(())
    }

    /// Sets the part cooling fan speed (0-100%).
    pub async fn set_fan_speed(&self, percent: u8) -> Result<(), ControllerError> {
        if percent > 100 {
            return Err(ControllerError::Validation(
                "fan speed must be 0-100".to_string(),
            ));
        }
        self.send_gcode(&fan_gcode(percent)).await
    }

    /// Sends a raw G-code line.
    pub async fn send_gcode(&self, gcode: &str) -> Result<(), ControllerError> {
        let mut fields = Map::new();
        fields.insert("param".to_string(), json!(gcode));
        self.session
            .send_command(CommandClass::Print, "gcode_line", fields)
            .await?;
        Ok(())
    }

    /// Homes all axes.
    pub async fn home_axes(&self) -> Result<(), ControllerError> {
        self.send_gcode("G28").await
    }

    /// Sets the nozzle target temperature.
    pub async fn set_nozzle_temp(&self, celsius: u32) -> Result<(), ControllerError> {
        self.send_gcode(&format!("M104 S{celsius}")).await
    }

    /// Sets the bed target temperature.
    pub async fn set_bed_temp(&self, celsius: u32) -> Result<(), ControllerError> {
        self.send_gcode(&format!("M140 S{celsius}")).await
    }

    fn require_active_job(&self) -> Result<(), ControllerError> {
        let job = self.job.lock().expect("job lock");
        match job.as_ref() {
            Some(job) if !job.status.is_terminal() => Ok(()),
            Some(_) | None => Err(ControllerError::NoActiveJob),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(state: &str, percent: f64, error: i64) -> PrinterStatus {
        PrinterStatus::from_report(&json!({
            "print": {
                "gcode_state": state,
                "mc_percent": percent,
                "print_error": error,
            }
        }))
    }

    fn pending_job() -> PrintJob {
        PrintJob::new(Path::new("/tmp/bracket.3mf"))
    }

    #[test]
    fn test_short_id_length() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert_ne!(id, short_id());
    }

    #[test]
    fn test_first_running_report_starts_job() {
        let mut job = pending_job();
        assert!(job.started_at.is_none());

        apply_status(&mut job, &status("RUNNING", 12.5, 0));
        assert_eq!(job.status, JobStatus::Printing);
        assert_eq!(job.progress_percent, 12.5);
        let started = job.started_at.expect("started_at set on first RUNNING");

        apply_status(&mut job, &status("RUNNING", 20.0, 0));
        assert_eq!(job.started_at, Some(started));
        assert_eq!(job.progress_percent, 20.0);
    }

    #[test]
    fn test_finish_completes_job() {
        let mut job = pending_job();
        apply_status(&mut job, &status("RUNNING", 95.0, 0));
        apply_status(&mut job, &status("FINISH", 100.0, 0));

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percent, 100.0);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_failed_records_error_code() {
        let mut job = pending_job();
        apply_status(&mut job, &status("RUNNING", 40.0, 0));
        apply_status(&mut job, &status("FAILED", 40.0, 83886081));

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("83886081"));
    }

    #[test]
    fn test_terminal_states_are_monotone() {
        let mut job = pending_job();
        apply_status(&mut job, &status("FINISH", 100.0, 0));
        let completed_at = job.completed_at;

        // Late reports must not resurrect the job
        apply_status(&mut job, &status("RUNNING", 10.0, 0));
        apply_status(&mut job, &status("FAILED", 10.0, 7));

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percent, 100.0);
        assert_eq!(job.completed_at, completed_at);
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_pause_resume_cycle() {
        let mut job = pending_job();
        apply_status(&mut job, &status("RUNNING", 30.0, 0));
        apply_status(&mut job, &status("PAUSE", 30.0, 0));
        assert_eq!(job.status, JobStatus::Paused);

        apply_status(&mut job, &status("RUNNING", 31.0, 0));
        assert_eq!(job.status, JobStatus::Printing);
    }

    #[test]
    fn test_fan_gcode_pwm_mapping() {
        assert_eq!(fan_gcode(100), "M106 P1 S255");
        assert_eq!(fan_gcode(0), "M106 P1 S0");
        assert_eq!(fan_gcode(50), "M106 P1 S128");
    }

    #[tokio::test]
    async fn test_submit_rejects_non_3mf() {
        let controller = PrintController::new(&PrinterConfig::default());
        let result = controller
            .submit(Path::new("/tmp/model.stl"), SubmitOptions::default())
            .await;
        assert!(matches!(result, Err(ControllerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_speed_level_bounds() {
        let controller = PrintController::new(&PrinterConfig::default());
        assert!(matches!(
            controller.set_speed_level(0).await,
            Err(ControllerError::Validation(_))
        ));
        assert!(matches!(
            controller.set_speed_level(5).await,
            Err(ControllerError::Validation(_))
        ));
        // In-range levels fail later, on the missing connection
        assert!(matches!(
            controller.set_speed_level(2).await,
            Err(ControllerError::Session(SessionError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn test_control_requires_active_job() {
        let controller = PrintController::new(&PrinterConfig::default());
        assert!(matches!(
            controller.pause().await,
            Err(ControllerError::NoActiveJob)
        ));
        assert!(matches!(
            controller.resume().await,
            Err(ControllerError::NoActiveJob)
        ));
        assert!(matches!(
            controller.stop().await,
            Err(ControllerError::NoActiveJob)
        ));
    }
}
