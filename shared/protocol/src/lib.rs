//! # Printer Broker Protocol
//!
//! This library defines the wire protocol used between printforge and the
//! printer's on-device MQTT broker. It provides request payload construction,
//! tolerant report parsing, and the typed status model shared by the printer
//! session and the print controller.
//!
//! ## Protocol Architecture
//!
//! The printer exposes two topics per device:
//!
//! ```text
//! device/<serial>/report    printer → client, JSON status reports
//! device/<serial>/request   client → printer, JSON commands
//! ```
//!
//! Request payloads are JSON objects with exactly one top-level key naming the
//! command class (`print`, `pushing`, `system`); its value carries a monotone
//! `sequence_id`, the `command` name, and command-specific fields.
//!
//! Reports arrive as JSON with a top-level `print` object. The parser must
//! tolerate missing fields: the printer only sends what changed, so every
//! extraction defaults to a sentinel (UNKNOWN state, zero temperatures) rather
//! than failing.
//!
//! ## Message Flow
//!
//! ```text
//! Client → Printer:
//!   - pushing/pushall      (request a full status report)
//!   - print/pause, print/resume, print/stop
//!   - print/print_speed    (speed level 1..4)
//!   - print/gcode_line     (raw G-code passthrough)
//!   - print/project_file   (start a sliced job)
//!
//! Printer → Client:
//!   - print report         (state, temperatures, progress, hardware)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// Topic Conventions

/// Report topic for a given printer serial.
pub fn report_topic(serial: &str) -> String {
    format!("device/{serial}/report")
}

/// Request topic for a given printer serial.
pub fn request_topic(serial: &str) -> String {
    format!("device/{serial}/request")
}

/// Fixed broker username for the supported printer family.
pub const BROKER_USERNAME: &str = "bblp";

/// Default TLS broker port on the printer.
pub const BROKER_PORT: u16 = 8883;

// Request Construction

/// Command classes accepted by the printer broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandClass {
    Print,
    Pushing,
    System,
}

impl CommandClass {
    /// Returns the top-level JSON key for this command class.
    pub fn key(&self) -> &'static str {
        match self {
            CommandClass::Print => "print",
            CommandClass::Pushing => "pushing",
            CommandClass::System => "system",
        }
    }
}

/// Builds a request payload of the shape
/// `{<class>: {"sequence_id": "<n>", "command": "<name>", <fields>...}}`.
pub fn build_request(
    class: CommandClass,
    sequence_id: u64,
    command: &str,
    fields: Map<String, Value>,
) -> Value {
    let mut body = Map::new();
    body.insert("sequence_id".to_string(), json!(sequence_id.to_string()));
    body.insert("command".to_string(), json!(command));
    for (key, value) in fields {
        body.insert(key, value);
    }

    let mut envelope = Map::new();
    envelope.insert(class.key().to_string(), Value::Object(body));
    Value::Object(envelope)
}

/// Options for submitting a sliced project file.
///
/// The payload references the file by URL; transferring the file to the
/// printer is an external responsibility and is never attempted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFileOptions {
    /// Name shown on the printer display
    pub subtask_name: String,

    /// URL the printer fetches the bundle from
    pub url: String,

    /// Enable automatic bed leveling before the print
    pub bed_leveling: bool,

    /// Enable flow calibration
    pub flow_calibration: bool,

    /// Enable vibration calibration
    pub vibration_calibration: bool,

    /// Enable first-layer inspection
    pub layer_inspect: bool,

    /// Record a timelapse
    pub timelapse: bool,

    /// Feed filament through the spool changer
    pub use_ams: bool,

    /// Spool changer tray mapping
    pub ams_mapping: Vec<i32>,
}

impl ProjectFileOptions {
    pub fn new(subtask_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            subtask_name: subtask_name.into(),
            url: url.into(),
            bed_leveling: true,
            flow_calibration: true,
            vibration_calibration: true,
            layer_inspect: false,
            timelapse: false,
            use_ams: false,
            ams_mapping: vec![0],
        }
    }

    /// Converts the options into `print/project_file` command fields.
    pub fn into_fields(self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("param".to_string(), json!("Metadata/plate_1.gcode"));
        fields.insert("url".to_string(), json!(self.url));
        fields.insert("subtask_name".to_string(), json!(self.subtask_name));
        fields.insert("bed_leveling".to_string(), json!(self.bed_leveling));
        fields.insert("flow_cali".to_string(), json!(self.flow_calibration));
        fields.insert("vibration_cali".to_string(), json!(self.vibration_calibration));
        fields.insert("layer_inspect".to_string(), json!(self.layer_inspect));
        fields.insert("timelapse".to_string(), json!(self.timelapse));
        fields.insert("use_ams".to_string(), json!(self.use_ams));
        fields.insert("ams_mapping".to_string(), json!(self.ams_mapping));
        fields
    }
}

// Status Model

/// G-code execution states reported by the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcodeState {
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "PAUSE")]
    Pause,
    #[serde(rename = "FINISH")]
    Finish,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "PREPARE")]
    Prepare,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl GcodeState {
    fn from_report_str(s: &str) -> Self {
        match s {
            "IDLE" => GcodeState::Idle,
            "RUNNING" => GcodeState::Running,
            "PAUSE" => GcodeState::Pause,
            "FINISH" => GcodeState::Finish,
            "FAILED" => GcodeState::Failed,
            "PREPARE" => GcodeState::Prepare,
            _ => GcodeState::Unknown,
        }
    }
}

/// High-level printer operational states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterState {
    Idle,
    Printing,
    Paused,
    Finished,
    Failed,
    Preparing,
    Unknown,
}

impl From<GcodeState> for PrinterState {
    fn from(state: GcodeState) -> Self {
        match state {
            GcodeState::Idle => PrinterState::Idle,
            GcodeState::Running => PrinterState::Printing,
            GcodeState::Pause => PrinterState::Paused,
            GcodeState::Finish => PrinterState::Finished,
            GcodeState::Failed => PrinterState::Failed,
            GcodeState::Prepare => PrinterState::Preparing,
            GcodeState::Unknown => PrinterState::Unknown,
        }
    }
}

/// Temperature sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub current: f64,
    pub target: f64,
}

impl TemperatureReading {
    /// Within 2 degrees of target.
    pub fn at_target(&self) -> bool {
        (self.current - self.target).abs() <= 2.0
    }
}

/// Current print progress information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrintProgress {
    /// Completion percentage (0.0-100.0)
    pub percentage: f64,

    /// Current layer number
    pub layer_current: u32,

    /// Total layer count
    pub layer_total: u32,

    /// Minutes elapsed since the print started
    pub time_elapsed_minutes: u32,

    /// Estimated minutes remaining
    pub time_remaining_minutes: u32,
}

/// Complete printer status parsed from a broker report.
///
/// A value type: the latest one is cached by the printer session and a copy is
/// emitted to subscribers on every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterStatus {
    /// When the report was parsed
    pub received_at: DateTime<Utc>,

    /// High-level operational state
    pub state: PrinterState,

    /// Raw G-code execution state
    pub gcode_state: GcodeState,

    /// Nozzle temperature (current, target)
    pub nozzle: Option<TemperatureReading>,

    /// Bed temperature (current, target)
    pub bed: Option<TemperatureReading>,

    /// Chamber temperature, when the printer has one
    pub chamber: Option<f64>,

    /// Print progress
    pub progress: PrintProgress,

    /// Currently loaded G-code file name
    pub gcode_file: Option<String>,

    /// Job name shown on the printer
    pub subtask_name: Option<String>,

    /// Print origin (local, cloud, ...)
    pub print_type: Option<String>,

    /// Part cooling fan speed (percent)
    pub fan_speed_percent: u32,

    /// Speed level 1..4 (silent/standard/sport/ludicrous)
    pub speed_level: u8,

    /// WiFi signal strength (dBm, negative)
    pub wifi_signal: i32,

    /// Printer error code, 0 when healthy
    pub print_error: i64,

    /// Hardware switch state bitfield
    pub hw_switch_state: i64,
}

impl PrinterStatus {
    /// Parses a broker report into a status snapshot.
    ///
    /// Every field is optional on the wire; anything absent defaults to a
    /// sentinel so partial reports still produce a usable value.
    pub fn from_report(report: &Value) -> Self {
        let print = report.get("print").cloned().unwrap_or(Value::Null);

        let gcode_state = print
            .get("gcode_state")
            .and_then(Value::as_str)
            .map(GcodeState::from_report_str)
            .unwrap_or(GcodeState::Unknown);

        let nozzle = read_temperature(&print, "nozzle_temper", "nozzle_target_temper");
        let bed = read_temperature(&print, "bed_temper", "bed_target_temper");
        let chamber = print.get("chamber_temper").and_then(as_f64);

        let progress = PrintProgress {
            percentage: print.get("mc_percent").and_then(as_f64).unwrap_or(0.0),
            layer_current: print.get("layer_num").and_then(as_u32).unwrap_or(0),
            layer_total: print.get("total_layer_num").and_then(as_u32).unwrap_or(0),
            time_elapsed_minutes: print
                .get("mc_print_time")
                .and_then(as_u32)
                .map(|secs| secs / 60)
                .unwrap_or(0),
            time_remaining_minutes: print.get("mc_remaining_time").and_then(as_u32).unwrap_or(0),
        };

        Self {
            received_at: Utc::now(),
            state: PrinterState::from(gcode_state),
            gcode_state,
            nozzle,
            bed,
            chamber,
            progress,
            gcode_file: print
                .get("gcode_file")
                .and_then(Value::as_str)
                .map(str::to_string),
            subtask_name: print
                .get("subtask_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            print_type: print
                .get("print_type")
                .and_then(Value::as_str)
                .map(str::to_string),
            fan_speed_percent: print.get("cooling_fan_speed").and_then(as_u32).unwrap_or(0),
            speed_level: print
                .get("spd_lvl")
                .and_then(as_u32)
                .map(|lvl| lvl.clamp(1, 4) as u8)
                .unwrap_or(1),
            wifi_signal: print
                .get("wifi_signal")
                .and_then(as_i64)
                .map(|v| v as i32)
                .unwrap_or(0),
            print_error: print.get("print_error").and_then(as_i64).unwrap_or(0),
            hw_switch_state: print.get("hw_switch_state").and_then(as_i64).unwrap_or(0),
        }
    }

    /// True while a job is actively printing.
    pub fn is_printing(&self) -> bool {
        self.state == PrinterState::Printing
    }

    /// True when an error code is present.
    pub fn has_error(&self) -> bool {
        self.print_error != 0
    }

    /// Human-readable status summary for logs and tool responses.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("Printer state: {:?}", self.state)];

        if let Some(nozzle) = self.nozzle {
            lines.push(format!(
                "Nozzle: {:.0}°C / {:.0}°C",
                nozzle.current, nozzle.target
            ));
        }
        if let Some(bed) = self.bed {
            lines.push(format!("Bed: {:.0}°C / {:.0}°C", bed.current, bed.target));
        }
        if self.state == PrinterState::Printing {
            lines.push(format!("Progress: {:.1}%", self.progress.percentage));
            lines.push(format!(
                "Layer: {}/{}",
                self.progress.layer_current, self.progress.layer_total
            ));
            lines.push(format!(
                "Time remaining: ~{} min",
                self.progress.time_remaining_minutes
            ));
        }
        if let Some(name) = &self.subtask_name {
            lines.push(format!("Job: {name}"));
        }
        if self.print_error != 0 {
            lines.push(format!("Error code: {}", self.print_error));
        }

        lines.join("\n")
    }
}

/// Reads a (current, target) temperature pair; both fields must be present.
fn read_temperature(print: &Value, current: &str, target: &str) -> Option<TemperatureReading> {
    let current = print.get(current).and_then(as_f64)?;
    let target = print.get(target).and_then(as_f64)?;
    Some(TemperatureReading { current, target })
}

// Numbers arrive as integers, floats, or quoted strings depending on the
// firmware revision; normalize all three.

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    as_i64(value).map(|v| v.max(0) as u32)
}

// Connection Diagnostics

/// Maps a broker connect return code to a human-readable explanation.
///
/// Bad credentials is by far the most common failure and must be surfaced
/// clearly: the access code shown on the printer changes after a reset.
pub fn connect_code_message(code: u8) -> String {
    match code {
        0 => "connection accepted".to_string(),
        1 => "incorrect protocol version".to_string(),
        2 => "invalid client identifier".to_string(),
        3 => "broker unavailable".to_string(),
        4 => "bad username or password (check the printer access code)".to_string(),
        5 => "not authorized (check the printer access code)".to_string(),
        other => format!("connection refused (code {other})"),
    }
}

// Error Type Definitions

/// Protocol-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_follow_device_convention() {
        assert_eq!(report_topic("01S00C123"), "device/01S00C123/report");
        assert_eq!(request_topic("01S00C123"), "device/01S00C123/request");
    }

    #[test]
    fn test_build_request_shape() {
        let mut fields = Map::new();
        fields.insert("param".to_string(), json!("2"));

        let payload = build_request(CommandClass::Print, 7, "print_speed", fields);

        let print = payload.get("print").expect("print key");
        assert_eq!(print["sequence_id"], json!("7"));
        assert_eq!(print["command"], json!("print_speed"));
        assert_eq!(print["param"], json!("2"));
        assert_eq!(payload.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_project_file_fields() {
        let options = ProjectFileOptions::new("bracket", "ftp://10.0.0.7/bracket.3mf");
        let fields = options.into_fields();

        assert_eq!(fields["param"], json!("Metadata/plate_1.gcode"));
        assert_eq!(fields["url"], json!("ftp://10.0.0.7/bracket.3mf"));
        assert_eq!(fields["use_ams"], json!(false));
        assert_eq!(fields["ams_mapping"], json!([0]));
    }

    #[test]
    fn test_parse_full_report() {
        let report = json!({
            "print": {
                "gcode_state": "RUNNING",
                "nozzle_temper": 219.6,
                "nozzle_target_temper": 220,
                "bed_temper": 55.1,
                "bed_target_temper": 55,
                "chamber_temper": 28,
                "mc_percent": 42,
                "layer_num": 57,
                "total_layer_num": 135,
                "mc_print_time": 1860,
                "mc_remaining_time": 41,
                "cooling_fan_speed": 100,
                "spd_lvl": 2,
                "wifi_signal": "-52",
                "print_error": 0,
                "gcode_file": "bracket.gcode",
                "subtask_name": "bracket"
            }
        });

        let status = PrinterStatus::from_report(&report);
        assert_eq!(status.state, PrinterState::Printing);
        assert_eq!(status.gcode_state, GcodeState::Running);
        assert!(status.nozzle.unwrap().at_target());
        assert_eq!(status.progress.layer_current, 57);
        assert_eq!(status.progress.time_elapsed_minutes, 31);
        assert_eq!(status.progress.time_remaining_minutes, 41);
        assert_eq!(status.speed_level, 2);
        assert_eq!(status.wifi_signal, -52);
        assert!(!status.has_error());
    }

    #[test]
    fn test_parse_tolerates_missing_fields() {
        let status = PrinterStatus::from_report(&json!({"print": {}}));
        assert_eq!(status.state, PrinterState::Unknown);
        assert!(status.nozzle.is_none());
        assert!(status.bed.is_none());
        assert_eq!(status.progress.percentage, 0.0);

        let empty = PrinterStatus::from_report(&json!({}));
        assert_eq!(empty.state, PrinterState::Unknown);
    }

    #[test]
    fn test_status_serde_round_trip() {
        let report = json!({"print": {"gcode_state": "FINISH", "mc_percent": 100}});
        let status = PrinterStatus::from_report(&report);

        let encoded = serde_json::to_string(&status).unwrap();
        let decoded: PrinterStatus = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.state, PrinterState::Finished);
        assert_eq!(decoded.progress.percentage, 100.0);
    }

    #[test]
    fn test_connect_code_messages() {
        assert!(connect_code_message(4).contains("access code"));
        assert!(connect_code_message(5).contains("access code"));
        assert!(connect_code_message(9).contains("code 9"));
    }
}
