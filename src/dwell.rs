// Dwell detection: continuity tracking over resolved targets, one event per fixation episode.
// A fixation episode is the maximal run of samples resolving to the same target identity.
// History is an analytics side channel and never feeds back into dwell timing.

use std::collections::{HashMap, VecDeque};

use log::{debug, info};

use crate::layout::LayoutTree;
use crate::resolver::TargetResolver;
use crate::types::*;

/// Receives dwell events as they are emitted.
pub trait DwellListener {
    fn on_dwell(&mut self, event: &DwellEvent);
}

impl<F: FnMut(&DwellEvent)> DwellListener for F {
    fn on_dwell(&mut self, event: &DwellEvent) {
        self(event)
    }
}

#[derive(Debug, Clone)]
enum Episode {
    Idle,
    Tracking {
        target: GazeTarget,
        started_at: Timestamp,
    },
    Dwelling {
        target: GazeTarget,
        started_at: Timestamp,
    },
}

impl Episode {
    fn target(&self) -> Option<&GazeTarget> {
        match self {
            Episode::Idle => None,
            Episode::Tracking { target, .. } | Episode::Dwelling { target, .. } => Some(target),
        }
    }

    fn started_at(&self) -> Option<Timestamp> {
        match self {
            Episode::Idle => None,
            Episode::Tracking { started_at, .. } | Episode::Dwelling { started_at, .. } => {
                Some(*started_at)
            }
        }
    }
}

/// Dwell state machine: `Idle` -> `Tracking` -> `Dwelling`.
#[derive(Debug, Clone)]
pub struct DwellTracker {
    threshold_us: u64,
    episode: Episode,
    history: VecDeque<GazePoint>,
    history_capacity: usize,
}

impl DwellTracker {
    pub fn new(threshold_us: u64, history_capacity: usize) -> Self {
        DwellTracker {
            threshold_us: threshold_us.max(1),
            episode: Episode::Idle,
            history: VecDeque::with_capacity(history_capacity.min(1024)),
            history_capacity: history_capacity.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.dwell_threshold_us(), config.history_capacity)
    }

    pub fn threshold_us(&self) -> u64 {
        self.threshold_us
    }

    /// Resolve `point` against `layout` and advance the state machine.
    /// The point is also appended to the bounded history.
    pub fn process_gaze_point<L: LayoutTree>(
        &mut self,
        layout: &L,
        point: ScreenPoint,
        now: Timestamp,
    ) -> Option<DwellEvent> {
        self.record(point, now);
        let target = TargetResolver::new(layout).resolve(point);
        self.process_target(target, now)
    }

    /// Same as [`process_gaze_point`](Self::process_gaze_point), delivering any event to `listener`.
    pub fn process_gaze_point_with<L: LayoutTree>(
        &mut self,
        layout: &L,
        point: ScreenPoint,
        now: Timestamp,
        listener: &mut dyn DwellListener,
    ) -> Option<DwellEvent> {
        let event = self.process_gaze_point(layout, point, now);
        if let Some(event) = &event {
            listener.on_dwell(event);
        }
        event
    }

    /// Advance the state machine with an already-resolved target.
    pub fn process_target(
        &mut self,
        target: Option<GazeTarget>,
        now: Timestamp,
    ) -> Option<DwellEvent> {
        let Some(target) = target else {
            if !matches!(self.episode, Episode::Idle) {
                debug!("Gaze left target, dwell reset");
                self.episode = Episode::Idle;
            }
            return None;
        };

        let same_target = self
            .episode
            .target()
            .map_or(false, |current| current.id == target.id);

        if !same_target {
            debug!("New fixation episode on {:?}", target.word);
            self.episode = Episode::Tracking {
                target,
                started_at: now,
            };
            return None;
        }

        match std::mem::replace(&mut self.episode, Episode::Idle) {
            Episode::Tracking { started_at, .. } => {
                let elapsed = now.micros_since(started_at);
                if elapsed >= self.threshold_us {
                    let event = DwellEvent {
                        target: target.clone(),
                        dwell_time_us: elapsed,
                    };
                    info!(
                        "Dwell on {:?} after {:.0}ms",
                        event.target.word,
                        event.dwell_time_ms()
                    );
                    self.episode = Episode::Dwelling { target, started_at };
                    Some(event)
                } else {
                    self.episode = Episode::Tracking { target, started_at };
                    None
                }
            }
            // Already emitted for this episode; keep the freshest bounds.
            Episode::Dwelling { started_at, .. } => {
                self.episode = Episode::Dwelling { target, started_at };
                None
            }
            Episode::Idle => None,
        }
    }

    /// Force `Idle` and forget the last target, so re-fixating on it starts a new episode.
    pub fn reset_dwell(&mut self) {
        if !matches!(self.episode, Episode::Idle) {
            debug!("Dwell reset by consumer");
        }
        self.episode = Episode::Idle;
    }

    /// Fraction of the threshold elapsed in the current episode, clamped to `[0, 1]`.
    pub fn dwell_progress(&self, now: Timestamp) -> f32 {
        match self.episode.started_at() {
            Some(started_at) => {
                let elapsed = now.micros_since(started_at) as f64;
                (elapsed / self.threshold_us as f64).min(1.0) as f32
            }
            None => 0.0,
        }
    }

    pub fn phase(&self) -> DwellPhase {
        match self.episode {
            Episode::Idle => DwellPhase::Idle,
            Episode::Tracking { .. } => DwellPhase::Tracking,
            Episode::Dwelling { .. } => DwellPhase::Dwelling,
        }
    }

    pub fn current_target(&self) -> Option<&GazeTarget> {
        self.episode.target()
    }

    pub fn dwell_start(&self) -> Option<Timestamp> {
        self.episode.started_at()
    }

    pub fn is_dwelling(&self) -> bool {
        matches!(self.episode, Episode::Dwelling { .. })
    }

    fn record(&mut self, point: ScreenPoint, now: Timestamp) {
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(GazePoint {
            position: point,
            timestamp: now,
        });
    }

    /// Recent smoothed points, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &GazePoint> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Count how often each word was looked at since `since`, using the current layout.
    /// Sorted by count descending, then word.
    pub fn aggregated_history<L: LayoutTree>(&self, layout: &L, since: Timestamp) -> Vec<WordVisit> {
        let resolver = TargetResolver::new(layout);
        let mut visits: HashMap<String, WordVisit> = HashMap::new();

        for point in self.history.iter().filter(|p| p.timestamp >= since) {
            let Some(target) = resolver.resolve(point.position) else {
                continue;
            };
            let visit = visits.entry(target.word.clone()).or_insert(WordVisit {
                word: target.word,
                count: 0,
                last_seen: point.timestamp,
            });
            visit.count += 1;
            visit.last_seen = visit.last_seen.max(point.timestamp);
        }

        let mut visits: Vec<WordVisit> = visits.into_values().collect();
        visits.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
        visits
    }
}
