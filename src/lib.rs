// gaze_engine: Rust/WASM gaze dwell engine.
// The page renders words and hosts the webcam estimator; smoothing, hit-testing, and dwell
// detection live here. Each call runs to completion on the page's single thread.

mod dwell;
mod error;
mod filters;
mod host;
mod layout;
mod resolver;
mod session;
mod types;

use wasm_bindgen::prelude::*;

pub use dwell::{DwellListener, DwellTracker};
pub use error::EngineError;
pub use filters::{DualKalmanFilter, KalmanFilter, Smoother, SmoothingFilter, WeightedMovingAverage};
pub use host::{JsDwellCallback, JsGazeSource, JsStorage};
pub use layout::{BlockSnapshot, DocumentLayout, ElementRole, LayoutSnapshot, LayoutTree, WordSnapshot};
pub use resolver::TargetResolver;
pub use session::{GazeSession, GazeSource, SessionState, SessionStatus, TrackingStore};
pub use types::*;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn to_js(err: EngineError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Main engine interface exposed to JavaScript.
/// Feed it raw gaze samples; it answers with smoothed points, dwell phase, and events.
#[wasm_bindgen]
pub struct GazeEngine {
    session: GazeSession<JsGazeSource>,
    storage: JsStorage,
    layout: DocumentLayout,
}

#[wasm_bindgen]
impl GazeEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<GazeEngine, JsValue> {
        let config = EngineConfig::from_json(config_json).map_err(to_js)?;

        Ok(GazeEngine {
            session: GazeSession::new(JsGazeSource::detached(), &config),
            storage: JsStorage::detached(),
            layout: DocumentLayout::empty(),
        })
    }

    /// Attach the gaze estimator (an object with `begin`, `pause`, `resume`, `end`, `clearData`).
    pub fn attach_source(&mut self, source: JsValue) {
        *self.session.source_mut() = JsGazeSource::new(source);
    }

    /// Attach the storage holding the estimator's persisted data (usually `localStorage`).
    pub fn attach_storage(&mut self, storage: JsValue) {
        self.storage = JsStorage::new(storage);
    }

    /// Register `callback(eventJson)`, called once per dwell.
    pub fn set_dwell_callback(&mut self, callback: js_sys::Function) {
        self.session
            .set_listener(Box::new(JsDwellCallback::new(callback)));
    }

    pub fn clear_dwell_callback(&mut self) {
        self.session.clear_listener();
    }

    /// Replace the layout snapshot. Call after render, scroll, or resize.
    pub fn set_layout(&mut self, layout_json: &str) -> Result<(), JsValue> {
        self.layout = DocumentLayout::from_json(layout_json).map_err(to_js)?;
        Ok(())
    }

    pub fn start(&mut self) {
        self.session.start();
    }

    pub fn stop(&mut self) {
        self.session.stop();
    }

    pub fn pause(&mut self) {
        self.session.pause();
    }

    pub fn resume(&mut self) {
        self.session.resume();
    }

    /// Forward `document.visibilitychange`.
    pub fn set_visible(&mut self, visible: bool) {
        self.session.set_visible(visible);
    }

    /// Stop tracking, clear the estimator's data, and purge persisted tracking data.
    pub fn kill_switch(&mut self) {
        self.session.kill_switch(&mut self.storage);
    }

    pub fn is_processing(&self) -> bool {
        self.session.is_processing()
    }

    /// Process one raw sample and return a JSON `SampleReport`.
    pub fn process_sample(&mut self, x: f64, y: f64, timestamp_ms: f64) -> Result<String, JsValue> {
        let now = Timestamp::from_millis(timestamp_ms);
        let report = self
            .session
            .on_sample(RawSample::new(x, y, now), &self.layout)
            .unwrap_or_else(|| self.session.idle_report(now));

        serde_json::to_string(&report).map_err(|e| to_js(e.into()))
    }

    /// The estimator reported no gaze (no face detected).
    pub fn sample_missing(&mut self, timestamp_ms: f64) -> Result<String, JsValue> {
        let now = Timestamp::from_millis(timestamp_ms);
        let report = self
            .session
            .on_sample_missing(now)
            .unwrap_or_else(|| self.session.idle_report(now));

        serde_json::to_string(&report).map_err(|e| to_js(e.into()))
    }

    /// The estimator lost tracking; smoothing restarts from the next sample.
    pub fn tracking_lost(&mut self, timestamp_ms: f64) {
        self.session
            .on_tracking_lost(Timestamp::from_millis(timestamp_ms));
    }

    /// Dwell progress in `[0, 1]` for the countdown ring. No side effects.
    pub fn dwell_progress(&self, now_ms: f64) -> f32 {
        self.session.dwell_progress(Timestamp::from_millis(now_ms))
    }

    /// Call once the dwell consumer is done, so the same word can trigger again.
    pub fn reset_dwell(&mut self) {
        self.session.reset_dwell();
    }

    /// JSON `SessionStatus` at `now_ms`.
    pub fn status(&self, now_ms: f64) -> Result<String, JsValue> {
        let status = self.session.status(Timestamp::from_millis(now_ms));
        serde_json::to_string(&status).map_err(|e| to_js(e.into()))
    }

    /// JSON list of `WordVisit`s over the last `interval_ms`, resolved against the current layout.
    pub fn aggregated_history(&self, now_ms: f64, interval_ms: f64) -> Result<String, JsValue> {
        let since = Timestamp::from_millis(now_ms - interval_ms);
        let visits = self.session.aggregated_history(&self.layout, since);
        serde_json::to_string(&visits).map_err(|e| to_js(e.into()))
    }

    pub fn clear_history(&mut self) {
        self.session.clear_history();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = r#"{
        "viewport": {"x": 0, "y": 0, "width": 1280, "height": 800},
        "blocks": [{
            "bounds": {"x": 100, "y": 50, "width": 400, "height": 24},
            "words": [
                {"id": 0, "text": "financial", "bounds": {"x": 100, "y": 50, "width": 110, "height": 24}},
                {"id": 1, "text": "ramifications", "bounds": {"x": 220, "y": 50, "width": 160, "height": 24}}
            ]
        }]
    }"#;

    #[test]
    fn engine_creation_works() {
        let config = r#"{"dwell_threshold_ms":2500,"filter_strategy":"kalman"}"#;
        let engine = GazeEngine::new(config);
        assert!(engine.is_ok());
    }

    #[test]
    fn samples_before_start_are_not_processed() {
        let mut engine = GazeEngine::new("{}").unwrap();
        engine.set_layout(LAYOUT).unwrap();
        let json = engine.process_sample(300.0, 60.0, 0.0).unwrap();
        let report: SampleReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.smoothed, None);
        assert_eq!(report.phase, DwellPhase::Idle);
        assert!(!engine.is_processing());
    }

    #[test]
    fn engine_reports_dwell_once() {
        let mut engine = GazeEngine::new(r#"{"dwell_threshold_ms":2500}"#).unwrap();
        engine.set_layout(LAYOUT).unwrap();
        engine.start();

        let mut events = Vec::new();
        for t in (0..=3000).step_by(500) {
            let json = engine.process_sample(300.0, 60.0, t as f64).unwrap();
            let report: SampleReport = serde_json::from_str(&json).unwrap();
            if let Some(event) = report.event {
                events.push((t, event));
            }
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, 2500);
        assert_eq!(events[0].1.target.word, "ramifications");
        assert_eq!(events[0].1.target.id, TargetId::Element { key: 1 });
        assert_eq!(engine.dwell_progress(3000.0), 1.0);

        engine.reset_dwell();
        assert_eq!(engine.dwell_progress(3000.0), 0.0);
    }

    #[test]
    fn status_and_history_serialize() {
        let mut engine = GazeEngine::new("{}").unwrap();
        engine.set_layout(LAYOUT).unwrap();
        engine.start();
        engine.process_sample(150.0, 60.0, 0.0).unwrap();
        engine.process_sample(150.0, 60.0, 100.0).unwrap();

        let status: SessionStatus = serde_json::from_str(&engine.status(200.0).unwrap()).unwrap();
        assert_eq!(status.state, SessionState::Active);
        assert_eq!(status.history_len, 2);

        let visits: Vec<WordVisit> =
            serde_json::from_str(&engine.aggregated_history(200.0, 10_000.0).unwrap()).unwrap();
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].word, "financial");
        assert_eq!(visits[0].count, 2);

        engine.clear_history();
        let status: SessionStatus = serde_json::from_str(&engine.status(200.0).unwrap()).unwrap();
        assert_eq!(status.history_len, 0);
    }

    #[test]
    fn paused_engine_skips_samples() {
        let mut engine = GazeEngine::new("{}").unwrap();
        engine.set_layout(LAYOUT).unwrap();
        engine.start();
        engine.pause();
        let json = engine.process_sample(300.0, 60.0, 0.0).unwrap();
        let report: SampleReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.smoothed, None);

        engine.set_visible(false);
        engine.set_visible(true);
        assert!(!engine.is_processing());
        engine.resume();
        assert!(engine.is_processing());
    }

    // Note: invalid config/layout paths build a JsValue, which is only available on wasm32.
    // They are covered in tests/web.rs.
}
