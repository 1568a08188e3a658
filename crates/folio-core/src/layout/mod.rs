//! Layout engine: turns the document into positioned boxes for the visible region.
//!
//! Only blocks near the viewport are laid out. Every other top-level block keeps a height,
//! measured if it was laid out before and estimated otherwise, in a prefix-sum index so that
//! scrolling, hit testing and the scrollbar extent stay `O(log n)` in the number of blocks.
//!
//! Coordinates are document coordinates: `y` grows downward from the top of the first
//! block (or of the first page in page mode), `x` from the left edge of the view.

mod height_index;
pub mod metrics;
pub mod paragraph;
pub mod table;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::document::{AffectedBlocks, Container, Document, DocumentChange, Node, NodeId};
use crate::format::Format;
use crate::position::Position;

use height_index::HeightIndex;
use metrics::{FallbackMetrics, Metrics, TextMeasurer};
use paragraph::{FragmentKind, ParagraphLayout};
use table::{BlockContext, TableLayout, layout_block};

pub use metrics::{MonospaceMeasurer, RunMetrics};
pub use table::TableSizing;

/// A point in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Horizontal offset.
    pub x: f32,
    /// Vertical offset.
    pub y: f32,
}

impl Point {
    /// Create a point.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Rect {
    /// Create a rectangle.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Returns `true` if `point` lies inside (left and top edges inclusive).
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Center point.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Layout of one block.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockLayout {
    /// A paragraph.
    Paragraph(ParagraphLayout),
    /// A table.
    Table(TableLayout),
}

impl BlockLayout {
    /// Height of the block.
    pub fn height(&self) -> f32 {
        match self {
            BlockLayout::Paragraph(p) => p.height,
            BlockLayout::Table(t) => t.height,
        }
    }

    fn box_count(&self) -> usize {
        match self {
            BlockLayout::Paragraph(p) => p.lines.iter().map(|line| line.fragments.len()).sum(),
            BlockLayout::Table(t) => t
                .rows
                .iter()
                .flat_map(|row| &row.cells)
                .map(|cell| 1 + cell.blocks.iter().map(|b| b.layout.box_count()).sum::<usize>())
                .sum(),
        }
    }
}

/// A block placed inside a container.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedBlock {
    /// Block id.
    pub id: NodeId,
    /// Top edge relative to the container's content origin.
    pub y: f32,
    /// The block's layout.
    pub layout: BlockLayout,
}

/// Page dimensions for page mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageGeometry {
    /// Page width in millimetres.
    pub width_mm: f32,
    /// Page height in millimetres.
    pub height_mm: f32,
    /// Top margin in millimetres.
    pub margin_top_mm: f32,
    /// Bottom margin in millimetres.
    pub margin_bottom_mm: f32,
    /// Left margin in millimetres.
    pub margin_left_mm: f32,
    /// Right margin in millimetres.
    pub margin_right_mm: f32,
    /// Vertical gap between pages, in pixels.
    pub gap_px: f32,
    /// Pixels per inch.
    pub dpi: f32,
}

impl Default for PageGeometry {
    /// A4 with one-inch margins at 96 dpi.
    fn default() -> Self {
        Self {
            width_mm: 210.0,
            height_mm: 297.0,
            margin_top_mm: 25.4,
            margin_bottom_mm: 25.4,
            margin_left_mm: 25.4,
            margin_right_mm: 25.4,
            gap_px: 20.0,
            dpi: 96.0,
        }
    }
}

impl PageGeometry {
    /// Convert millimetres to pixels at this geometry's resolution.
    pub fn px(&self, mm: f32) -> f32 {
        mm / 25.4 * self.dpi
    }

    /// Page width in pixels.
    pub fn page_width_px(&self) -> f32 {
        self.px(self.width_mm)
    }

    /// Page height in pixels.
    pub fn page_height_px(&self) -> f32 {
        self.px(self.height_mm)
    }

    /// Width available to text.
    pub fn content_width_px(&self) -> f32 {
        self.px(self.width_mm - self.margin_left_mm - self.margin_right_mm).max(1.0)
    }

    /// Height available to text on one page.
    pub fn content_height_px(&self) -> f32 {
        self.px(self.height_mm - self.margin_top_mm - self.margin_bottom_mm).max(1.0)
    }

    /// Distance from one page top to the next.
    pub fn stride_px(&self) -> f32 {
        self.page_height_px() + self.gap_px
    }
}

/// Geometry the engine lays out for. Produced by the view mode controller.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutParams {
    /// Width available to blocks.
    pub content_width: f32,
    /// Left edge of the blocks.
    pub content_x: f32,
    /// Page geometry when paginating.
    pub page: Option<PageGeometry>,
}

impl LayoutParams {
    /// One continuous column of `width` pixels.
    pub fn continuous(width: f32) -> Self {
        Self {
            content_width: width.max(1.0),
            content_x: 0.0,
            page: None,
        }
    }

    /// Paginated layout.
    pub fn paged(page: PageGeometry) -> Self {
        Self {
            content_width: page.content_width_px(),
            content_x: page.px(page.margin_left_mm),
            page: Some(page),
        }
    }
}

/// The visible region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Document offset of the top edge.
    pub top: f32,
    /// Height in pixels.
    pub height: f32,
}

impl Viewport {
    /// Bottom edge.
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

/// What a [`LayoutBox`] draws.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxKind {
    /// Text with one format.
    Text {
        /// The characters.
        text: String,
        /// Their format.
        format: Format,
    },
    /// An inline element.
    Element {
        /// Element kind.
        kind: String,
    },
    /// A table cell frame.
    Cell,
}

/// A positioned box ready for drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    /// Inline (or cell) node the box comes from.
    pub node: NodeId,
    /// Paragraph containing the inline; `None` for cells.
    pub paragraph: Option<NodeId>,
    /// Content.
    pub kind: BoxKind,
    /// Bounds in document coordinates.
    pub rect: Rect,
    /// Baseline in document coordinates.
    pub baseline: f32,
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutStats {
    /// Top-level blocks laid out since the last reset.
    pub blocks_laid_out: u64,
    /// Runs measured with fallback metrics since the last reset.
    pub fallback_runs: u64,
}

#[derive(Debug, Clone)]
struct BlockSlot {
    id: NodeId,
    layout: Option<BlockLayout>,
    height: f32,
    measured: bool,
}

#[derive(Debug, Clone, Default)]
struct Pagination {
    tops: Vec<f32>,
    pages: Vec<usize>,
    page_count: usize,
}

impl Pagination {
    /// Fill pages top to bottom. A block taller than a page spills over the following pages
    /// and the next block starts on a fresh page.
    fn compute(geometry: &PageGeometry, heights: impl Iterator<Item = f32>, spacing: f32) -> Self {
        let content = geometry.content_height_px();
        let stride = geometry.stride_px();
        let margin = geometry.px(geometry.margin_top_mm);
        let mut out = Pagination::default();
        let mut page = 0;
        let mut used: f32 = 0.0;
        for height in heights {
            let mut gap = if used > 0.0 { spacing } else { 0.0 };
            if used > 0.0 && used + gap + height > content {
                page += 1;
                used = 0.0;
                gap = 0.0;
            }
            out.tops.push(page as f32 * stride + margin + used + gap);
            out.pages.push(page);
            used += gap + height;
            if used > content {
                page += (used / content).ceil() as usize - 1;
                used = content;
            }
        }
        out.page_count = page + 1;
        out
    }
}

/// Incremental, viewport-driven layout of one view of a document.
pub struct LayoutEngine {
    measurer: Arc<dyn TextMeasurer>,
    fallback: FallbackMetrics,
    config: LayoutConfig,
    params: LayoutParams,
    slots: Vec<BlockSlot>,
    index: HashMap<NodeId, usize>,
    heights: HeightIndex,
    pages: Option<Pagination>,
    live: HashSet<NodeId>,
    viewport: Viewport,
    stats: LayoutStats,
}

impl fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("params", &self.params)
            .field("blocks", &self.slots.len())
            .field("live", &self.live.len())
            .field("viewport", &self.viewport)
            .finish_non_exhaustive()
    }
}

impl LayoutEngine {
    /// Create an engine for `doc` and lay out the initial viewport.
    pub fn new(doc: &Document, measurer: Arc<dyn TextMeasurer>, config: LayoutConfig, params: LayoutParams) -> Self {
        let viewport = Viewport {
            top: 0.0,
            height: config.viewport_height,
        };
        let mut engine = Self {
            measurer,
            fallback: FallbackMetrics::default(),
            config,
            params,
            slots: Vec::new(),
            index: HashMap::new(),
            heights: HeightIndex::default(),
            pages: None,
            live: HashSet::new(),
            viewport,
            stats: LayoutStats::default(),
        };
        engine.rebuild(doc);
        engine
    }

    /// Replace the fallback metrics and relayout.
    pub fn set_fallback_metrics(&mut self, doc: &Document, fallback: FallbackMetrics) {
        self.fallback = fallback;
        self.rebuild(doc);
    }

    /// Drop every layout and height and start over from estimates.
    pub fn rebuild(&mut self, doc: &Document) {
        let slots: Vec<BlockSlot> = doc
            .body()
            .iter()
            .map(|id| BlockSlot {
                id: *id,
                layout: None,
                height: self.estimate(doc, *id),
                measured: false,
            })
            .collect();
        self.slots = slots;
        self.live.clear();
        self.reindex();
        self.refresh(doc);
    }

    fn estimate(&self, doc: &Document, id: NodeId) -> f32 {
        let line = self.config.estimated_line_height;
        let per_line = (self.params.content_width / self.fallback.char_width).floor().max(1.0);
        match doc.node(id) {
            Some(Node::Paragraph(p)) => (p.len() as f32 / per_line).ceil().max(1.0) * line,
            Some(Node::Table(t)) => t.rows.len().max(1) as f32 * (line + 2.0 * self.config.cell_padding),
            _ => line,
        }
    }

    fn reindex(&mut self) {
        self.index = self.slots.iter().enumerate().map(|(i, slot)| (slot.id, i)).collect();
        let spacing = self.config.paragraph_spacing;
        let heights: Vec<f32> = self.slots.iter().map(|slot| slot.height + spacing).collect();
        self.heights = HeightIndex::from_heights(&heights);
        self.repaginate();
    }

    fn repaginate(&mut self) {
        self.pages = self.params.page.as_ref().map(|geometry| {
            Pagination::compute(
                geometry,
                self.slots.iter().map(|slot| slot.height),
                self.config.paragraph_spacing,
            )
        });
    }

    fn set_height(&mut self, i: usize, height: f32) -> bool {
        let slot = &mut self.slots[i];
        slot.measured = true;
        if (slot.height - height).abs() < f32::EPSILON {
            return false;
        }
        slot.height = height;
        self.heights.set(i, height + self.config.paragraph_spacing);
        true
    }

    /// Top edge of block `i`.
    fn block_top(&self, i: usize) -> f32 {
        match &self.pages {
            Some(pages) => pages.tops.get(i).copied().unwrap_or(0.0),
            None => self.heights.prefix(i),
        }
    }

    /// Block covering document offset `y` (clamped).
    fn block_at_y(&self, y: f32) -> usize {
        match &self.pages {
            Some(pages) => pages.tops.partition_point(|top| *top <= y).saturating_sub(1),
            None => self.heights.find(y.max(0.0)),
        }
    }

    /// Lay out block `i`; returns `true` if its height changed.
    fn layout_slot(&mut self, doc: &Document, i: usize) -> bool {
        let id = self.slots[i].id;
        let measurer = Arc::clone(&self.measurer);
        let mut metrics = Metrics::new(measurer.as_ref(), self.fallback);
        let mut ctx = BlockContext {
            metrics: &mut metrics,
            line_spacing: self.config.line_spacing,
            block_spacing: self.config.paragraph_spacing,
            cell_padding: self.config.cell_padding,
            sizing: self.config.table_sizing,
        };
        let layout = layout_block(doc, id, self.params.content_width, &mut ctx);
        self.stats.fallback_runs += metrics.fallback_runs as u64;
        self.stats.blocks_laid_out += 1;
        let Some(layout) = layout else {
            log::warn!("block {id} is missing from the document; skipping layout");
            return false;
        };
        let height = layout.height();
        self.slots[i].layout = Some(layout);
        self.live.insert(id);
        self.set_height(i, height)
    }

    /// Bring the laid-out window in line with the viewport.
    ///
    /// The window is the visible blocks plus `lookahead_blocks` on each side. When measured
    /// heights differ from their estimates, the first visible block keeps its place on
    /// screen and the window is recomputed.
    fn refresh(&mut self, doc: &Document) {
        if self.slots.is_empty() {
            self.live.clear();
            return;
        }
        let last_index = self.slots.len() - 1;
        let lookahead = self.config.lookahead_blocks;
        for _ in 0..4 {
            let first = self.block_at_y(self.viewport.top);
            let last = self.block_at_y(self.viewport.bottom());
            let lo = first.saturating_sub(lookahead);
            let hi = (last + lookahead).min(last_index);
            let scroll_in_first = self.viewport.top - self.block_top(first);

            let evicted: Vec<NodeId> = self
                .live
                .iter()
                .filter(|id| self.index.get(id).is_none_or(|i| *i < lo || *i > hi))
                .copied()
                .collect();
            for id in evicted {
                self.live.remove(&id);
                if let Some(&i) = self.index.get(&id) {
                    self.slots[i].layout = None;
                }
            }

            let mut changed = false;
            for i in lo..=hi {
                if self.slots[i].layout.is_none() {
                    changed |= self.layout_slot(doc, i);
                }
            }
            if !changed {
                break;
            }
            self.repaginate();
            if first > 0 {
                self.viewport.top = (self.block_top(first) + scroll_in_first).max(0.0);
            }
        }
    }

    /// Incorporate a committed change. Blocks outside the affected ranges keep their layouts.
    pub fn apply_change(&mut self, doc: &Document, change: &DocumentChange) {
        let mut reindex = false;
        for affected in &change.affected {
            match affected.container {
                Container::Body => match self.splice_body(doc, affected) {
                    Some(moved) => reindex |= moved,
                    None => {
                        log::warn!(
                            "layout out of sync with document at generation {}; rebuilding",
                            change.generation
                        );
                        self.rebuild(doc);
                        return;
                    }
                },
                Container::Cell(_) => {
                    if let Some(top) = affected.top_level {
                        self.invalidate(top);
                    }
                }
            }
        }
        if reindex {
            self.reindex();
        } else {
            self.repaginate();
        }
        self.refresh(doc);
    }

    /// Replace body slots. Returns `Some(true)` if indices moved, `None` if the slots do not
    /// match the change.
    fn splice_body(&mut self, doc: &Document, affected: &AffectedBlocks) -> Option<bool> {
        let start = affected.index;
        let end = start + affected.removed.len();
        let current = self.slots.get(start..end)?;
        if current.iter().zip(&affected.removed).any(|(slot, id)| slot.id != *id) {
            return None;
        }
        let old_heights: HashMap<NodeId, f32> = current.iter().map(|s| (s.id, s.height)).collect();
        for id in &affected.removed {
            self.live.remove(id);
        }
        let replacement: Vec<BlockSlot> = affected
            .inserted
            .iter()
            .map(|id| BlockSlot {
                id: *id,
                layout: None,
                height: old_heights
                    .get(id)
                    .copied()
                    .unwrap_or_else(|| self.estimate(doc, *id)),
                measured: false,
            })
            .collect();
        if affected.removed.len() == affected.inserted.len() {
            for (offset, slot) in replacement.into_iter().enumerate() {
                let i = start + offset;
                self.index.remove(&self.slots[i].id);
                self.index.insert(slot.id, i);
                self.heights.set(i, slot.height + self.config.paragraph_spacing);
                self.slots[i] = slot;
            }
            Some(false)
        } else {
            self.slots.splice(start..end, replacement);
            Some(true)
        }
    }

    fn invalidate(&mut self, block: NodeId) {
        if let Some(&i) = self.index.get(&block) {
            self.slots[i].layout = None;
            self.live.remove(&block);
        }
    }

    /// Change the layout geometry. A new width or page setup discards every layout.
    pub fn set_params(&mut self, doc: &Document, params: LayoutParams) {
        if params == self.params {
            return;
        }
        let relayout = params.content_width != self.params.content_width || params.page != self.params.page;
        self.params = params;
        if relayout {
            self.rebuild(doc);
        }
    }

    /// Current layout geometry.
    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    /// Move the viewport. `top` is clamped to the document extent.
    pub fn set_viewport(&mut self, doc: &Document, top: f32, height: f32) {
        self.viewport.height = if height.is_finite() && height > 0.0 {
            height
        } else {
            self.viewport.height
        };
        self.viewport.top = top.clamp(0.0, self.total_height().max(0.0));
        self.refresh(doc);
    }

    /// Scroll by `dy` pixels.
    pub fn scroll_by(&mut self, doc: &Document, dy: f32) {
        self.set_viewport(doc, self.viewport.top + dy, self.viewport.height);
    }

    /// The visible region.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Height of the whole document, measured where known and estimated elsewhere.
    pub fn total_height(&self) -> f32 {
        match (&self.pages, &self.params.page) {
            (Some(pages), Some(geometry)) => pages.page_count as f32 * geometry.stride_px() - geometry.gap_px,
            _ => self.heights.total(),
        }
    }

    /// Number of top-level blocks tracked.
    pub fn block_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of top-level blocks currently holding a layout.
    pub fn live_block_count(&self) -> usize {
        self.live.len()
    }

    /// Number of boxes held by live layouts.
    pub fn live_box_count(&self) -> usize {
        self.live
            .iter()
            .filter_map(|id| self.index.get(id))
            .filter_map(|i| self.slots[*i].layout.as_ref())
            .map(BlockLayout::box_count)
            .sum()
    }

    /// Returns `true` if top-level block `id` currently holds a layout.
    pub fn is_laid_out(&self, id: NodeId) -> bool {
        self.live.contains(&id)
    }

    /// Counters since the last [`reset_stats`](Self::reset_stats).
    pub fn stats(&self) -> LayoutStats {
        self.stats
    }

    /// Zero the counters.
    pub fn reset_stats(&mut self) {
        self.stats = LayoutStats::default();
    }

    /// Bounds of top-level block `id`, whether or not it is laid out.
    pub fn block_rect(&self, id: NodeId) -> Option<Rect> {
        let i = *self.index.get(&id)?;
        Some(Rect::new(
            self.params.content_x,
            self.block_top(i),
            self.params.content_width,
            self.slots[i].height,
        ))
    }

    /// Layout of top-level block `id` and its origin, if it is laid out.
    pub fn block_layout(&self, id: NodeId) -> Option<(&BlockLayout, Point)> {
        let i = *self.index.get(&id)?;
        let layout = self.slots[i].layout.as_ref()?;
        Some((layout, Point::new(self.params.content_x, self.block_top(i))))
    }

    /// Top-level blocks intersecting the viewport, in order.
    pub fn visible_blocks(&self) -> Vec<NodeId> {
        if self.slots.is_empty() {
            return Vec::new();
        }
        let first = self.block_at_y(self.viewport.top);
        let last = self.block_at_y(self.viewport.bottom());
        self.slots[first..=last]
            .iter()
            .enumerate()
            .filter(|(offset, slot)| {
                let top = self.block_top(first + offset);
                top < self.viewport.bottom() && top + slot.height >= self.viewport.top
            })
            .map(|(_, slot)| slot.id)
            .collect()
    }

    /// Layout of `paragraph` (which may sit inside a table) and its origin.
    pub fn paragraph_layout(&self, doc: &Document, paragraph: NodeId) -> Option<(&ParagraphLayout, Point)> {
        let top = doc.top_level_ancestor(paragraph)?;
        let (layout, origin) = self.block_layout(top)?;
        find_paragraph(layout, top, paragraph, origin, self.config.cell_padding)
    }

    /// Caret rectangle for `pos`: one pixel wide, as tall as its line. `None` if the block
    /// is not laid out.
    pub fn caret_rect(&self, doc: &Document, pos: Position) -> Option<Rect> {
        let (layout, origin) = self.paragraph_layout(doc, pos.paragraph)?;
        let li = layout.line_for_offset(pos.offset);
        let line = layout.lines.get(li)?;
        let mut metrics = Metrics::new(self.measurer.as_ref(), self.fallback);
        let stops = layout.caret_stops(li, &mut metrics);
        let x = stops
            .iter()
            .rev()
            .find(|(offset, _)| *offset <= pos.offset)
            .map_or(line.x, |(_, x)| *x);
        Some(Rect::new(origin.x + x, origin.y + line.y, 1.0, line.height))
    }

    /// The position whose caret is closest to `point`. `None` if the block under `point`
    /// is not laid out.
    pub fn hit_test(&self, point: Point) -> Option<Position> {
        if self.slots.is_empty() {
            return None;
        }
        let i = self.block_at_y(point.y);
        let slot = &self.slots[i];
        let layout = slot.layout.as_ref()?;
        let local = Point::new(point.x - self.params.content_x, point.y - self.block_top(i));
        let mut metrics = Metrics::new(self.measurer.as_ref(), self.fallback);
        hit_block(layout, slot.id, local, self.config.cell_padding, &mut metrics)
    }

    /// The position one visual line above (`down == false`) or below `pos`, nearest to `x`.
    pub fn vertical_neighbor(&self, doc: &Document, pos: Position, down: bool, x: f32) -> Option<Position> {
        let caret = self.caret_rect(doc, pos)?;
        let gap = self.config.paragraph_spacing + 2.0 * self.config.cell_padding + 1.0;
        let probes = if down {
            [caret.bottom() + 0.5, caret.bottom() + gap]
        } else {
            [caret.y - 0.5, caret.y - gap]
        };
        for y in probes {
            if y < 0.0 {
                break;
            }
            let Some(hit) = self.hit_test(Point::new(x, y)) else {
                continue;
            };
            let moved = self
                .caret_rect(doc, hit)
                .is_some_and(|r| if down { r.y > caret.y } else { r.y < caret.y });
            if moved {
                return Some(hit);
            }
        }
        None
    }

    /// Scroll the minimum amount that makes the caret at `pos` fully visible. Returns `true`
    /// if the viewport moved.
    pub fn scroll_into_view(&mut self, doc: &Document, pos: Position) -> bool {
        let before = self.viewport.top;
        let Some(top_block) = doc.top_level_ancestor(pos.paragraph) else {
            return false;
        };
        let Some(&i) = self.index.get(&top_block) else {
            return false;
        };
        if self.slots[i].layout.is_none() {
            self.viewport.top = self.block_top(i);
            self.refresh(doc);
        }
        if let Some(caret) = self.caret_rect(doc, pos) {
            let top = if caret.y < self.viewport.top {
                Some(caret.y)
            } else if caret.bottom() > self.viewport.bottom() {
                Some(caret.bottom() - self.viewport.height)
            } else {
                None
            };
            if let Some(top) = top {
                self.viewport.top = top.max(0.0);
                self.refresh(doc);
            }
        }
        (self.viewport.top - before).abs() > f32::EPSILON
    }

    /// Scroll so the caret line sits at `fraction` of the viewport height.
    pub fn scroll_caret_to(&mut self, doc: &Document, pos: Position, fraction: f32) {
        self.scroll_into_view(doc, pos);
        // Two passes: the first may lay out blocks whose heights move the caret.
        for _ in 0..2 {
            let Some(caret) = self.caret_rect(doc, pos) else {
                return;
            };
            let top = (caret.y + caret.height / 2.0 - fraction * self.viewport.height).max(0.0);
            if (top - self.viewport.top).abs() < 0.5 {
                return;
            }
            self.viewport.top = top;
            self.refresh(doc);
        }
    }

    /// Drawable boxes intersecting the viewport.
    pub fn visible_boxes(&self) -> Vec<LayoutBox> {
        let mut out = Vec::new();
        for id in self.visible_blocks() {
            if let Some((layout, origin)) = self.block_layout(id) {
                collect_boxes(layout, id, origin, self.config.cell_padding, &mut out);
            }
        }
        out.retain(|b| b.rect.bottom() >= self.viewport.top && b.rect.y <= self.viewport.bottom());
        out
    }

    /// Number of pages in page mode.
    pub fn page_count(&self) -> Option<usize> {
        self.pages.as_ref().map(|pages| pages.page_count)
    }

    /// Bounds of page `page` in page mode.
    pub fn page_rect(&self, page: usize) -> Option<Rect> {
        let geometry = self.params.page.as_ref()?;
        if page >= self.page_count()? {
            return None;
        }
        Some(Rect::new(
            0.0,
            page as f32 * geometry.stride_px(),
            geometry.page_width_px(),
            geometry.page_height_px(),
        ))
    }

    /// Page showing `pos` in page mode.
    pub fn page_for_position(&self, doc: &Document, pos: Position) -> Option<usize> {
        let pages = self.pages.as_ref()?;
        let geometry = self.params.page.as_ref()?;
        if let Some(caret) = self.caret_rect(doc, pos) {
            let page = (caret.y / geometry.stride_px()).floor().max(0.0) as usize;
            return Some(page.min(pages.page_count - 1));
        }
        let top = doc.top_level_ancestor(pos.paragraph)?;
        pages.pages.get(*self.index.get(&top)?).copied()
    }
}

fn find_paragraph<'l>(
    layout: &'l BlockLayout,
    id: NodeId,
    target: NodeId,
    origin: Point,
    padding: f32,
) -> Option<(&'l ParagraphLayout, Point)> {
    match layout {
        BlockLayout::Paragraph(p) => (id == target).then_some((p, origin)),
        BlockLayout::Table(t) => t.rows.iter().flat_map(|row| &row.cells).find_map(|cell| {
            let inner = Point::new(origin.x + cell.rect.x + padding, origin.y + cell.rect.y + padding);
            cell.blocks.iter().find_map(|placed| {
                find_paragraph(
                    &placed.layout,
                    placed.id,
                    target,
                    Point::new(inner.x, inner.y + placed.y),
                    padding,
                )
            })
        }),
    }
}

fn hit_block(
    layout: &BlockLayout,
    id: NodeId,
    local: Point,
    padding: f32,
    metrics: &mut Metrics<'_>,
) -> Option<Position> {
    match layout {
        BlockLayout::Paragraph(p) => Some(hit_paragraph(p, id, local, metrics)),
        BlockLayout::Table(t) => {
            let last_row = t.rows.len().checked_sub(1)?;
            let row = &t.rows[t
                .rows
                .iter()
                .position(|row| local.y < row.y + row.height)
                .unwrap_or(last_row)];
            let last_cell = row.cells.len().checked_sub(1)?;
            let cell = &row.cells[row
                .cells
                .iter()
                .position(|cell| local.x < cell.rect.right())
                .unwrap_or(last_cell)];
            let inner = Point::new(local.x - cell.rect.x - padding, local.y - cell.rect.y - padding);
            let placed = cell
                .blocks
                .iter()
                .rev()
                .find(|placed| placed.y <= inner.y)
                .or(cell.blocks.first())?;
            hit_block(
                &placed.layout,
                placed.id,
                Point::new(inner.x, inner.y - placed.y),
                padding,
                metrics,
            )
        }
    }
}

fn hit_paragraph(layout: &ParagraphLayout, id: NodeId, local: Point, metrics: &mut Metrics<'_>) -> Position {
    let li = layout.line_at_y(local.y);
    let Some(line) = layout.lines.get(li) else {
        return Position::new(id, 0);
    };
    // The wrap offset belongs to the next line, except on the last line.
    let last = li + 1 == layout.lines.len();
    layout
        .caret_stops(li, metrics)
        .into_iter()
        .filter(|(offset, _)| last || *offset < line.end || line.start == line.end)
        .min_by(|a, b| (a.1 - local.x).abs().total_cmp(&(b.1 - local.x).abs()))
        .map_or(Position::new(id, line.start), |(offset, _)| Position::new(id, offset))
}

fn collect_boxes(layout: &BlockLayout, id: NodeId, origin: Point, padding: f32, out: &mut Vec<LayoutBox>) {
    match layout {
        BlockLayout::Paragraph(p) => {
            for line in &p.lines {
                for fragment in &line.fragments {
                    let kind = match &fragment.kind {
                        FragmentKind::Text { text, format, .. } => BoxKind::Text {
                            text: text.clone(),
                            format: format.clone(),
                        },
                        FragmentKind::Element { kind } => BoxKind::Element { kind: kind.clone() },
                    };
                    out.push(LayoutBox {
                        node: fragment.inline,
                        paragraph: Some(id),
                        kind,
                        rect: Rect::new(origin.x + fragment.x, origin.y + line.y, fragment.width, line.height),
                        baseline: origin.y + line.baseline,
                    });
                }
            }
        }
        BlockLayout::Table(t) => {
            for cell in t.rows.iter().flat_map(|row| &row.cells) {
                let rect = Rect::new(
                    origin.x + cell.rect.x,
                    origin.y + cell.rect.y,
                    cell.rect.width,
                    cell.rect.height,
                );
                out.push(LayoutBox {
                    node: cell.cell,
                    paragraph: None,
                    kind: BoxKind::Cell,
                    rect,
                    baseline: rect.y,
                });
                let inner = Point::new(rect.x + padding, rect.y + padding);
                for placed in &cell.blocks {
                    collect_boxes(
                        &placed.layout,
                        placed.id,
                        Point::new(inner.x, inner.y + placed.y),
                        padding,
                        out,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse;
    use crate::position::TextRange;

    fn engine(doc: &Document, width: f32, viewport: f32) -> LayoutEngine {
        let config = LayoutConfig {
            viewport_height: viewport,
            ..LayoutConfig::default()
        };
        LayoutEngine::new(doc, Arc::new(MonospaceMeasurer::default()), config, LayoutParams::continuous(width))
    }

    fn many_paragraphs(count: usize) -> Document {
        let text: Vec<String> = (0..count).map(|i| format!("paragraph number {i}")).collect();
        Document::from_plain_text(&text.join("\n"))
    }

    #[test]
    fn test_only_window_is_laid_out() {
        let doc = many_paragraphs(500);
        let engine = engine(&doc, 800.0, 100.0);
        // 16px lines plus 8px spacing: blocks 0..=4 are visible, plus ten below.
        assert_eq!(engine.live_block_count(), 15);
        assert!(engine.is_laid_out(doc.body()[14]));
        assert!(!engine.is_laid_out(doc.body()[15]));
    }

    #[test]
    fn test_scrolling_evicts_and_anchors() {
        let doc = many_paragraphs(500);
        let mut engine = engine(&doc, 800.0, 100.0);
        let target = 240.0 * 24.0;
        engine.set_viewport(&doc, target, 100.0);
        assert!(!engine.is_laid_out(doc.body()[0]));
        assert!(engine.live_block_count() <= 5 + 2 * 10 + 1);
        let first = engine.visible_blocks()[0];
        assert!(engine.is_laid_out(first));
    }

    #[test]
    fn test_estimates_become_measurements() {
        let doc = many_paragraphs(50);
        let engine = engine(&doc, 800.0, 100.0);
        let measured = engine.block_rect(doc.body()[1]).unwrap();
        assert_eq!(measured.y, 24.0);
        assert_eq!(measured.height, 16.0);
        // Never laid out: estimated at 20px.
        let far = engine.block_rect(doc.body()[40]).unwrap();
        assert_eq!(far.height, 20.0);
    }

    #[test]
    fn test_caret_and_hit_test_agree() {
        let doc = parse("<p>hello big world</p><p>second</p>").unwrap();
        let engine = engine(&doc, 80.0, 400.0);
        let p = doc.body()[0];
        for offset in 0..=15 {
            let pos = Position::new(p, offset);
            let caret = engine.caret_rect(&doc, pos).unwrap();
            let hit = engine.hit_test(Point::new(caret.x + 0.5, caret.y + caret.height / 2.0));
            assert_eq!(hit, Some(pos), "offset {offset}");
        }
    }

    #[test]
    fn test_hit_test_inside_table_cell() {
        let doc = parse("<table><tr><td>ab</td><td>cd</td></tr></table>").unwrap();
        let mut engine = engine(&doc, 200.0, 400.0);
        engine.config.table_sizing = TableSizing::Equal;
        engine.rebuild(&doc);
        let table = doc.table(doc.body()[0]).unwrap();
        let second = doc.cell(table.rows[0][1]).unwrap().blocks[0];
        // Second column starts at 100, content at 104.
        let hit = engine.hit_test(Point::new(104.0 + 8.0, 10.0));
        assert_eq!(hit, Some(Position::new(second, 1)));
        let caret = engine.caret_rect(&doc, Position::new(second, 2)).unwrap();
        assert_eq!((caret.x, caret.y), (120.0, 4.0));
    }

    #[test]
    fn test_edit_relayouts_only_affected_block() {
        let mut doc = many_paragraphs(30);
        let mut engine = engine(&doc, 800.0, 1000.0);
        engine.reset_stats();
        let target = doc.body()[3];
        let edit = doc.insert_text(Position::new(target, 0), "more ").unwrap();
        engine.apply_change(&doc, edit.change());
        assert_eq!(engine.stats().blocks_laid_out, 1);

        let edit = doc.split_paragraph(Position::new(target, 2)).unwrap();
        engine.apply_change(&doc, edit.change());
        assert_eq!(engine.block_count(), 31);
        assert!(engine.is_laid_out(doc.body()[4]));
    }

    #[test]
    fn test_table_cell_edit_invalidates_table() {
        let mut doc = parse("<p>before</p><table><tr><td>a</td></tr></table>").unwrap();
        let mut engine = engine(&doc, 400.0, 400.0);
        let table = doc.table(doc.body()[1]).unwrap();
        let para = doc.cell(table.rows[0][0]).unwrap().blocks[0];
        engine.reset_stats();
        let edit = doc.insert_text(Position::new(para, 1), "bc").unwrap();
        engine.apply_change(&doc, edit.change());
        assert_eq!(engine.stats().blocks_laid_out, 1);
        let caret = engine.caret_rect(&doc, Position::new(para, 3)).unwrap();
        assert_eq!(caret.x, 4.0 + 24.0);
    }

    #[test]
    fn test_delete_across_blocks_keeps_index_in_sync() {
        let mut doc = many_paragraphs(10);
        let mut engine = engine(&doc, 800.0, 1000.0);
        let a = doc.body()[2];
        let b = doc.body()[5];
        let edit = doc
            .delete_range(TextRange::new(Position::new(a, 3), Position::new(b, 2)))
            .unwrap();
        engine.apply_change(&doc, edit.change());
        assert_eq!(engine.block_count(), doc.body().len());
        for id in doc.body() {
            assert!(engine.is_laid_out(*id));
        }
    }

    #[test]
    fn test_page_mode_paginates() {
        let doc = many_paragraphs(100);
        let geometry = PageGeometry::default();
        let content = geometry.content_height_px();
        let mut engine = engine(&doc, 800.0, 2000.0);
        engine.set_params(&doc, LayoutParams::paged(geometry.clone()));
        let pages = engine.page_count().unwrap();
        assert!(pages >= 2);
        let first_page_blocks = ((content + 8.0) / 24.0).floor() as usize;
        let first_on_page_two = doc.body()[first_page_blocks];
        let rect = engine.block_rect(first_on_page_two).unwrap();
        assert_eq!(rect.y, geometry.stride_px() + geometry.px(geometry.margin_top_mm));
        assert_eq!(
            engine.page_for_position(&doc, Position::new(first_on_page_two, 0)),
            Some(1)
        );
    }

    #[test]
    fn test_scroll_into_view_moves_minimally() {
        let doc = many_paragraphs(200);
        let mut engine = engine(&doc, 800.0, 100.0);
        let target = doc.body()[150];
        assert!(engine.scroll_into_view(&doc, Position::new(target, 0)));
        let caret = engine.caret_rect(&doc, Position::new(target, 0)).unwrap();
        let viewport = engine.viewport();
        assert!(caret.y >= viewport.top && caret.bottom() <= viewport.bottom());
        assert!(!engine.scroll_into_view(&doc, Position::new(target, 0)));
    }
}
