// Session lifecycle: gates the whole pipeline. While suspended, samples never reach the
// smoother or the dwell tracker. The gaze source is an explicit handle owned here.

use log::{debug, info};

use crate::dwell::{DwellListener, DwellTracker};
use crate::filters::{Smoother, SmoothingFilter};
use crate::layout::LayoutTree;
use crate::types::*;

/// Control surface of the external gaze estimator.
pub trait GazeSource {
    /// Start producing samples.
    fn begin(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    /// Stop producing samples and release the camera.
    fn end(&mut self);
    /// Discard accumulated calibration and training data.
    fn clear_data(&mut self);
}

/// Persistent key/value storage holding the source's tracking data.
pub trait TrackingStore {
    fn remove_item(&mut self, key: &str);
}

/// Lifecycle phase as seen by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Not started, or stopped.
    Stopped,
    /// Samples flow through the pipeline.
    Active,
    /// Suspended by the user or by the page becoming hidden.
    Paused,
    /// Kill switch fired; only `start` leaves this state.
    Disabled,
}

/// Snapshot of a session, serialized for the page.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub phase: DwellPhase,
    pub progress: f32,
    pub target: Option<GazeTarget>,
    pub dwell_start: Option<Timestamp>,
    pub history_len: usize,
}

/// One tracking session: source handle, smoother, and dwell tracker.
pub struct GazeSession<S: GazeSource> {
    source: S,
    smoother: SmoothingFilter,
    dwell: DwellTracker,
    listener: Option<Box<dyn DwellListener>>,
    storage_key: String,
    started: bool,
    killed: bool,
    user_paused: bool,
    hidden: bool,
}

impl<S: GazeSource> GazeSession<S> {
    /// Build from validated configuration. Nothing is processed until `start`.
    pub fn new(source: S, config: &EngineConfig) -> Self {
        GazeSession {
            source,
            smoother: SmoothingFilter::from_config(config),
            dwell: DwellTracker::from_config(config),
            listener: None,
            storage_key: config.storage_key.clone(),
            started: false,
            killed: false,
            user_paused: false,
            hidden: false,
        }
    }

    pub fn set_listener(&mut self, listener: Box<dyn DwellListener>) {
        self.listener = Some(listener);
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn dwell(&self) -> &DwellTracker {
        &self.dwell
    }

    pub fn smoother(&self) -> &SmoothingFilter {
        &self.smoother
    }

    pub fn state(&self) -> SessionState {
        if self.killed {
            SessionState::Disabled
        } else if !self.started {
            SessionState::Stopped
        } else if self.user_paused || self.hidden {
            SessionState::Paused
        } else {
            SessionState::Active
        }
    }

    pub fn is_processing(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn is_user_paused(&self) -> bool {
        self.user_paused
    }

    /// Begin a fresh session (first start, or recalibration after a kill switch).
    pub fn start(&mut self) {
        self.smoother.reset();
        self.dwell.reset_dwell();
        self.killed = false;
        self.user_paused = false;
        self.started = true;
        self.source.begin();
        if self.hidden {
            self.source.pause();
        }
        info!("Gaze session started");
    }

    /// End the session and release the source.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.source.end();
        self.started = false;
        self.dwell.reset_dwell();
        info!("Gaze session stopped");
    }

    /// Explicit user pause. Filter memory is kept.
    pub fn pause(&mut self) {
        if !self.started || self.killed || self.user_paused {
            return;
        }
        let was_processing = self.is_processing();
        self.user_paused = true;
        if was_processing {
            self.source.pause();
        }
        info!("Gaze tracking paused");
    }

    /// Undo an explicit pause. Stays suspended while the page is hidden.
    pub fn resume(&mut self) {
        if !self.started || self.killed || !self.user_paused {
            return;
        }
        self.user_paused = false;
        if !self.hidden {
            self.source.resume();
        }
        info!("Gaze tracking resumed");
    }

    /// Page visibility changed. Hiding suspends; showing resumes unless the user paused.
    pub fn set_visible(&mut self, visible: bool) {
        let hidden = !visible;
        if hidden == self.hidden {
            return;
        }
        let was_processing = self.is_processing();
        self.hidden = hidden;

        if !self.started || self.killed {
            return;
        }
        if hidden && was_processing {
            debug!("Page hidden, suspending gaze source");
            self.source.pause();
        } else if self.is_processing() {
            debug!("Page visible, resuming gaze source");
            self.source.resume();
        }
    }

    /// Stop tracking and purge everything accumulated in this session.
    /// Only a fresh `start` re-enables the pipeline.
    pub fn kill_switch(&mut self, store: &mut dyn TrackingStore) {
        if !self.started || self.killed {
            return;
        }
        self.source.pause();
        self.source.clear_data();
        self.smoother.reset();
        self.dwell.reset_dwell();
        self.dwell.clear_history();
        store.remove_item(&self.storage_key);
        self.killed = true;
        self.user_paused = true;
        info!("Kill switch: gaze tracking stopped and data cleared");
    }

    /// Feed one raw sample. Returns `None` when the session is not processing.
    pub fn on_sample<L: LayoutTree>(&mut self, sample: RawSample, layout: &L) -> Option<SampleReport> {
        if !self.is_processing() {
            return None;
        }

        let now = sample.timestamp;
        let smoothed = self.smoother.smooth(sample.point());
        let event = match smoothed {
            Some(point) => self.dwell.process_gaze_point(layout, point, now),
            None => self.dwell.process_target(None, now),
        };

        if let (Some(event), Some(listener)) = (&event, self.listener.as_mut()) {
            listener.on_dwell(event);
        }

        Some(self.report(smoothed, event, now))
    }

    /// The source produced nothing usable (no face). Same as looking at nothing.
    pub fn on_sample_missing(&mut self, now: Timestamp) -> Option<SampleReport> {
        if !self.is_processing() {
            return None;
        }
        self.dwell.process_target(None, now);
        Some(self.report(None, None, now))
    }

    /// The source lost tracking; smoothing across the gap would blend unrelated fixations.
    pub fn on_tracking_lost(&mut self, now: Timestamp) {
        if !self.started || self.killed {
            return;
        }
        debug!("Gaze source lost tracking, smoothing memory cleared");
        self.smoother.reset();
        self.dwell.process_target(None, now);
    }

    pub fn reset_dwell(&mut self) {
        self.dwell.reset_dwell();
    }

    pub fn dwell_progress(&self, now: Timestamp) -> f32 {
        self.dwell.dwell_progress(now)
    }

    pub fn clear_history(&mut self) {
        self.dwell.clear_history();
    }

    pub fn aggregated_history<L: LayoutTree>(&self, layout: &L, since: Timestamp) -> Vec<WordVisit> {
        self.dwell.aggregated_history(layout, since)
    }

    /// Lifecycle and dwell state at `now`, for the page's indicator and progress ring.
    pub fn status(&self, now: Timestamp) -> SessionStatus {
        SessionStatus {
            state: self.state(),
            phase: self.dwell.phase(),
            progress: self.dwell.dwell_progress(now),
            target: self.dwell.current_target().cloned(),
            dwell_start: self.dwell.dwell_start(),
            history_len: self.dwell.history_len(),
        }
    }

    /// Report for a sample that was not processed.
    pub fn idle_report(&self, now: Timestamp) -> SampleReport {
        self.report(None, None, now)
    }

    fn report(
        &self,
        smoothed: Option<ScreenPoint>,
        event: Option<DwellEvent>,
        now: Timestamp,
    ) -> SampleReport {
        SampleReport {
            smoothed,
            phase: self.dwell.phase(),
            progress: self.dwell.dwell_progress(now),
            target: self.dwell.current_target().cloned(),
            event,
        }
    }
}
