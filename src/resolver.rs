// Target resolution: smoothed point -> word under the gaze, with paragraph context.
// Pure function of the current layout and the point. A miss is `None`, never an error.

use crate::layout::{ElementRole, LayoutTree};
use crate::types::{GazeTarget, ScreenPoint, TargetId};

/// Resolves gaze targets against a layout supplied by the renderer.
pub struct TargetResolver<'a, L: LayoutTree> {
    layout: &'a L,
}

impl<'a, L: LayoutTree> TargetResolver<'a, L> {
    pub fn new(layout: &'a L) -> Self {
        TargetResolver { layout }
    }

    /// Word target at `point`, or `None` when nothing gaze-interactive is there.
    pub fn resolve(&self, point: ScreenPoint) -> Option<GazeTarget> {
        if !point.is_finite() {
            return None;
        }

        let hit = self.layout.hit_test(point)?;

        // Walk up from the deepest element to the first gaze target.
        let target = std::iter::once(hit)
            .chain(self.layout.ancestor_chain(hit))
            .find(|&h| self.layout.role(h) == ElementRole::GazeTarget)?;

        let word = self.layout.text(target).trim().to_string();
        if word.is_empty() {
            return None;
        }

        let context = self
            .layout
            .ancestor_chain(target)
            .into_iter()
            .find(|&h| self.layout.role(h) == ElementRole::ReadableBlock)
            .map(|block| self.layout.text(block))
            .unwrap_or_default();

        let bounds = self.layout.bounds(target);
        let id = match self.layout.stable_key(target) {
            Some(key) => TargetId::Element { key },
            None => TargetId::anchored(&word, &bounds),
        };

        Some(GazeTarget {
            id,
            word,
            context,
            bounds,
        })
    }
}
