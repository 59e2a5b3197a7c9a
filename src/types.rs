use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub models: Vec<ModelConfig>,
    /// Violation class -> fine amount. Classes absent from this table are
    /// not tracked violations and are discarded at classification time.
    pub fines: HashMap<String, i64>,
    pub detection: DetectionConfig,
    pub artifacts: ArtifactConfig,
    pub validator: ValidatorConfig,
    pub store: StoreConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Adapter tag used in logs (e.g. "helmet_triple", "seatbelt").
    pub name: String,
    pub path: String,
    /// Class names in model output order.
    pub classes: Vec<String>,
    pub confidence_threshold: f32,
    #[serde(default = "default_input_size")]
    pub input_size: usize,
}

fn default_input_size() -> usize {
    640
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum seconds between two accepted candidates of the same type.
    pub cooldown_sec: f64,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
}

fn default_iou_threshold() -> f32 {
    0.45
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub output_dir: String,
    pub prefix: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_jpeg_quality() -> u8 {
    80
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub endpoint: String,
    pub model: String,
    /// Optional; the GEMINI_API_KEY env var takes precedence. Absence is a
    /// normal state and routes every verdict to the bypass branch.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_validator_timeout")]
    pub timeout_secs: u64,
}

fn default_validator_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Default frame-source path used when the CLI gives none.
    pub default_source: String,
    pub fps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// One decoded frame, owned by the driver for a single loop iteration.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw RGB bytes, row-major.
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    /// Seconds since the start of the stream.
    pub timestamp: f64,
}

/// What a detector adapter reports for one object in one frame.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub class_label: String,
    pub confidence: f32,
    /// [x1, y1, x2, y2] in original frame coordinates.
    pub bbox: [f32; 4],
}

/// A raw detection that matched the fines table and survived the cooldown
/// gate. Lives only within one frame's processing.
#[derive(Debug, Clone)]
pub struct ViolationCandidate {
    pub violation_type: String,
    pub fine_amount: i64,
    pub bbox: [f32; 4],
    pub frame_timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStatus {
    Correct,
    Incorrect,
}

/// Outcome of the validation gate for one candidate.
#[derive(Debug, Clone)]
pub struct ValidationVerdict {
    pub status: VerdictStatus,
    pub confidence: f64,
    pub reason: String,
}

/// A committed violation as stored and listed for the admin collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationRecord {
    pub id: i64,
    pub ts_utc: String,
    pub file_path: String,
    pub violation_type: String,
    pub fine: i64,
    pub number_plate: Option<String>,
}
