// Layout capability used for hit-testing, plus an in-memory document layout.
// The page renders; the engine only sees a snapshot of word boxes grouped by paragraph.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{ScreenPoint, ScreenRect};

/// What an element means to the gaze pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementRole {
    /// A word eligible for dwell detection.
    GazeTarget,
    /// A paragraph-like unit supplying context text.
    ReadableBlock,
    /// Anything else.
    Other,
}

/// Rendering-side capability: hit-test a point and walk up the element tree.
pub trait LayoutTree {
    type Handle: Copy + Eq;

    /// Deepest element at `point`, if any.
    fn hit_test(&self, point: ScreenPoint) -> Option<Self::Handle>;

    /// Ancestors of `handle`, nearest first, excluding `handle` itself.
    fn ancestor_chain(&self, handle: Self::Handle) -> Vec<Self::Handle>;

    fn role(&self, handle: Self::Handle) -> ElementRole;

    fn text(&self, handle: Self::Handle) -> String;

    fn bounds(&self, handle: Self::Handle) -> ScreenRect;

    /// Identity key that survives reflow, when the renderer has one.
    fn stable_key(&self, _handle: Self::Handle) -> Option<u64> {
        None
    }
}

/// Snapshot sent by the page after render, scroll, or resize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    #[serde(default)]
    pub viewport: Option<ScreenRect>,
    #[serde(default)]
    pub blocks: Vec<BlockSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub bounds: ScreenRect,
    /// Full paragraph text. Defaults to the words joined by spaces.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub words: Vec<WordSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordSnapshot {
    #[serde(default)]
    pub id: Option<u64>,
    pub text: String,
    pub bounds: ScreenRect,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<usize>,
    role: ElementRole,
    text: String,
    bounds: ScreenRect,
    key: Option<u64>,
}

/// Flat element tree: document root, paragraph blocks, word spans.
#[derive(Debug, Clone)]
pub struct DocumentLayout {
    nodes: Vec<Node>,
    root_bounds: Option<ScreenRect>,
}

const ROOT: usize = 0;

impl DocumentLayout {
    /// Empty document; every hit-test misses.
    pub fn empty() -> Self {
        DocumentLayout {
            nodes: vec![Node {
                parent: None,
                role: ElementRole::Other,
                text: String::new(),
                bounds: ScreenRect::default(),
                key: None,
            }],
            root_bounds: None,
        }
    }

    pub fn from_snapshot(snapshot: LayoutSnapshot) -> Result<Self, EngineError> {
        let mut layout = DocumentLayout::empty();

        if let Some(viewport) = snapshot.viewport {
            if !viewport.is_valid() {
                return Err(EngineError::InvalidLayout(
                    "viewport bounds are not finite".to_string(),
                ));
            }
            layout.nodes[ROOT].bounds = viewport;
            layout.root_bounds = Some(viewport);
        }

        for (block_index, block) in snapshot.blocks.into_iter().enumerate() {
            if !block.bounds.is_valid() {
                return Err(EngineError::InvalidLayout(format!(
                    "block {} has invalid bounds",
                    block_index
                )));
            }

            let block_text = block.text.unwrap_or_else(|| {
                block
                    .words
                    .iter()
                    .map(|w| w.text.trim())
                    .filter(|w| !w.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            });
            let block_node = layout.nodes.len();
            layout.nodes.push(Node {
                parent: Some(ROOT),
                role: ElementRole::ReadableBlock,
                text: block_text,
                bounds: block.bounds,
                key: None,
            });

            for (word_index, word) in block.words.into_iter().enumerate() {
                if !word.bounds.is_valid() {
                    return Err(EngineError::InvalidLayout(format!(
                        "word {} of block {} has invalid bounds",
                        word_index, block_index
                    )));
                }
                layout.nodes.push(Node {
                    parent: Some(block_node),
                    role: ElementRole::GazeTarget,
                    text: word.text,
                    bounds: word.bounds,
                    key: word.id,
                });
            }
        }

        Ok(layout)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let snapshot: LayoutSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }

    /// Lay out plain paragraphs with a fixed per-character advance, one line per paragraph.
    /// Words are split on whitespace and numbered in document order.
    pub fn from_paragraphs(
        paragraphs: &[&str],
        origin: ScreenPoint,
        char_width: f64,
        line_height: f64,
        paragraph_gap: f64,
    ) -> Self {
        let mut blocks = Vec::with_capacity(paragraphs.len());
        let mut next_id = 0u64;
        let mut y = origin.y;

        for paragraph in paragraphs {
            let mut x = origin.x;
            let mut words = Vec::new();
            for word in paragraph.split_whitespace() {
                let width = word.chars().count() as f64 * char_width;
                words.push(WordSnapshot {
                    id: Some(next_id),
                    text: word.to_string(),
                    bounds: ScreenRect::new(x, y, width, line_height),
                });
                next_id += 1;
                // One space between words.
                x += width + char_width;
            }
            let width = (x - origin.x - char_width).max(0.0);
            blocks.push(BlockSnapshot {
                bounds: ScreenRect::new(origin.x, y, width, line_height),
                text: Some(paragraph.to_string()),
                words,
            });
            y += line_height + paragraph_gap;
        }

        // Snapshot bounds are finite by construction.
        Self::from_snapshot(LayoutSnapshot {
            viewport: None,
            blocks,
        })
        .unwrap_or_else(|_| DocumentLayout::empty())
    }

    /// Number of word targets in the document.
    pub fn target_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.role == ElementRole::GazeTarget)
            .count()
    }
}

impl Default for DocumentLayout {
    fn default() -> Self {
        Self::empty()
    }
}

impl LayoutTree for DocumentLayout {
    type Handle = usize;

    fn hit_test(&self, point: ScreenPoint) -> Option<usize> {
        let mut block_hit = None;
        // Later nodes paint on top, so scan back to front.
        for (index, node) in self.nodes.iter().enumerate().skip(1).rev() {
            if !node.bounds.contains(point) {
                continue;
            }
            match node.role {
                ElementRole::GazeTarget => return Some(index),
                _ => {
                    if block_hit.is_none() {
                        block_hit = Some(index);
                    }
                }
            }
        }

        block_hit.or_else(|| match self.root_bounds {
            Some(bounds) if bounds.contains(point) => Some(ROOT),
            _ => None,
        })
    }

    fn ancestor_chain(&self, handle: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(handle).and_then(|n| n.parent);
        while let Some(index) = current {
            chain.push(index);
            current = self.nodes[index].parent;
        }
        chain
    }

    fn role(&self, handle: usize) -> ElementRole {
        self.nodes
            .get(handle)
            .map(|n| n.role)
            .unwrap_or(ElementRole::Other)
    }

    fn text(&self, handle: usize) -> String {
        self.nodes
            .get(handle)
            .map(|n| n.text.clone())
            .unwrap_or_default()
    }

    fn bounds(&self, handle: usize) -> ScreenRect {
        self.nodes
            .get(handle)
            .map(|n| n.bounds)
            .unwrap_or_default()
    }

    fn stable_key(&self, handle: usize) -> Option<u64> {
        self.nodes.get(handle).and_then(|n| n.key)
    }
}
