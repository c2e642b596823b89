// Strong typing over strings. Newtypes for timestamps, screen points, and target identity.
// All coordinates are CSS pixels in the page's viewport space.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Timestamp in microseconds. Newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_micros(us: u64) -> Self {
        Timestamp(us)
    }

    /// Build from a JS millisecond clock (`performance.now()`, `Date.now()`).
    /// Negative or non-finite input maps to zero.
    pub fn from_millis(ms: f64) -> Self {
        if ms.is_finite() && ms > 0.0 {
            Timestamp((ms * 1000.0).round() as u64)
        } else {
            Timestamp(0)
        }
    }

    pub fn as_micros(&self) -> u64 {
        self.0
    }

    pub fn as_millis(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn as_secs(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Microseconds elapsed since `earlier`. Zero if the clock went backwards.
    pub fn micros_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Point in viewport space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        ScreenPoint { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle in viewport space (DOMRect-like).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        ScreenRect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Inclusive on every edge, so a point on a shared border hits both neighbours.
    pub fn contains(&self, point: ScreenPoint) -> bool {
        point.x >= self.left()
            && point.x <= self.right()
            && point.y >= self.top()
            && point.y <= self.bottom()
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

/// One raw estimate from the gaze source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub x: f64,
    pub y: f64,
    pub timestamp: Timestamp,
}

impl RawSample {
    pub fn new(x: f64, y: f64, timestamp: Timestamp) -> Self {
        RawSample { x, y, timestamp }
    }

    pub fn point(&self) -> ScreenPoint {
        ScreenPoint::new(self.x, self.y)
    }
}

/// Identity of a gaze target across hit-tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetId {
    /// Stable key supplied by the layout (index into the rendered word list).
    Element { key: u64 },
    /// Word text plus bounds origin rounded to whole pixels.
    Anchored { word: String, left: i64, top: i64 },
}

impl TargetId {
    pub fn anchored(word: &str, bounds: &ScreenRect) -> Self {
        TargetId::Anchored {
            word: word.to_string(),
            left: bounds.left().round() as i64,
            top: bounds.top().round() as i64,
        }
    }
}

/// A readable word under the gaze, with the paragraph that contains it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeTarget {
    pub id: TargetId,
    pub word: String,
    pub context: String,
    pub bounds: ScreenRect,
}

/// Emitted once per fixation episode that reaches the dwell threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DwellEvent {
    pub target: GazeTarget,
    pub dwell_time_us: u64,
}

impl DwellEvent {
    pub fn dwell_time_ms(&self) -> f64 {
        self.dwell_time_us as f64 / 1000.0
    }
}

/// Externally visible phase of the dwell state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DwellPhase {
    /// No current target.
    Idle,
    /// Fixated on a target, threshold not reached yet.
    Tracking,
    /// Threshold reached, event already emitted for this episode.
    Dwelling,
}

/// A smoothed point kept in the analytics history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazePoint {
    pub position: ScreenPoint,
    pub timestamp: Timestamp,
}

/// How often a word was looked at within an interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordVisit {
    pub word: String,
    pub count: u32,
    pub last_seen: Timestamp,
}

/// Smoothing strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FilterStrategy {
    #[default]
    WeightedAverage,
    Kalman,
}

/// Engine configuration passed from JS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Continuous fixation needed before a dwell event fires (milliseconds).
    #[serde(default = "default_dwell_threshold_ms")]
    pub dwell_threshold_ms: f64,
    #[serde(default)]
    pub filter_strategy: FilterStrategy,
    /// Weighted-average memory. Higher is smoother with more lag.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Kalman process noise `Q`.
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    /// Kalman measurement noise `R`.
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,
    /// Number of smoothed points kept for aggregation.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Local storage key holding the gaze source's persisted training data.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

fn default_dwell_threshold_ms() -> f64 {
    2500.0
}

fn default_weight() -> f64 {
    0.7
}

fn default_process_noise() -> f64 {
    0.001
}

fn default_measurement_noise() -> f64 {
    0.1
}

fn default_history_capacity() -> usize {
    1000
}

fn default_storage_key() -> String {
    "webgazerGlobalData".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            dwell_threshold_ms: default_dwell_threshold_ms(),
            filter_strategy: FilterStrategy::default(),
            weight: default_weight(),
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
            history_capacity: default_history_capacity(),
            storage_key: default_storage_key(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.dwell_threshold_ms.is_finite() && self.dwell_threshold_ms > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "dwell_threshold_ms must be positive, got {}",
                self.dwell_threshold_ms
            )));
        }
        if !(self.weight > 0.0 && self.weight < 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "weight must be in (0, 1), got {}",
                self.weight
            )));
        }
        if !(self.process_noise.is_finite() && self.process_noise > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "process_noise must be positive, got {}",
                self.process_noise
            )));
        }
        if !(self.measurement_noise.is_finite() && self.measurement_noise > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "measurement_noise must be positive, got {}",
                self.measurement_noise
            )));
        }
        if self.history_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.storage_key.is_empty() {
            return Err(EngineError::InvalidConfig(
                "storage_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Dwell threshold in microseconds.
    pub fn dwell_threshold_us(&self) -> u64 {
        (self.dwell_threshold_ms * 1000.0).round() as u64
    }
}

/// Result of feeding one raw sample through the pipeline, returned to JS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleReport {
    /// Smoothed coordinate, absent when the sample was rejected or not processed.
    pub smoothed: Option<ScreenPoint>,
    pub phase: DwellPhase,
    pub progress: f32,
    pub target: Option<GazeTarget>,
    pub event: Option<DwellEvent>,
}
