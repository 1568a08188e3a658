//! Document model: an arena of paragraphs, runs and tables with stable node ids.
//!
//! # Overview
//!
//! A [`Document`] is a tree stored flat: every node lives in an arena keyed by [`NodeId`] and
//! records the container it belongs to. The root container ([`Container::Body`]) and every
//! table cell ([`Container::Cell`]) hold an ordered, never-empty list of blocks (paragraphs
//! or tables). Paragraphs hold inline nodes: formatted text runs and atomic inline elements.
//!
//! Every mutation is validated before anything is touched and is then committed as a list of
//! block [`Splice`]s. The resulting [`Edit`] keeps the removed and inserted subtrees with their
//! ids, so [`Document::revert`] and [`Document::reapply`] restore states exactly, and a
//! [`PositionMapping`] that tells callers how positions move.
//!
//! Observers registered with [`Document::subscribe`] receive a [`DocumentChange`] after each
//! commit, synchronously and in mutation order. They receive only the change record, never the
//! document, so they cannot mutate it re-entrantly.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::iter;

use crate::content::{BlockContent, CellContent, ParagraphContent, Span, TableContent};
use crate::error::DocumentError;
use crate::format::{Alignment, Format, FormatDelta};
use crate::position::{MapStep, Position, PositionMapping, ResolvedPosition, TextRange};
use crate::snapshot::TextSnapshot;

/// Maximum number of nested tables (a table in a cell of a top-level table is depth 2).
pub const MAX_TABLE_DEPTH: usize = 2;

/// Stable identity of a document node. Never reused within one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Build an id from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node that owns an ordered list of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// The document root.
    Body,
    /// A table cell.
    Cell(NodeId),
}

/// A contiguous piece of text with one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    /// Node id.
    pub id: NodeId,
    /// Run text (never empty inside a document).
    pub text: String,
    /// Run format.
    pub format: Format,
}

/// An atomic inline object such as an image or a footnote reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineElement {
    /// Node id.
    pub id: NodeId,
    /// Element kind.
    pub kind: String,
    /// Opaque payload.
    pub payload: String,
}

/// A child of a paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    /// Formatted text.
    Run(TextRun),
    /// Inline element (one character offset).
    Element(InlineElement),
}

impl Inline {
    /// Node id.
    pub fn id(&self) -> NodeId {
        match self {
            Inline::Run(run) => run.id,
            Inline::Element(element) => element.id,
        }
    }

    /// Length in character offsets.
    pub fn char_len(&self) -> usize {
        match self {
            Inline::Run(run) => run.text.chars().count(),
            Inline::Element(_) => 1,
        }
    }
}

/// A paragraph: alignment plus normalised inline children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Paragraph {
    /// Horizontal alignment.
    pub alignment: Alignment,
    /// Inline children. No empty runs, no equal-format neighbours.
    pub inlines: Vec<Inline>,
}

impl Paragraph {
    /// Length in character offsets.
    pub fn len(&self) -> usize {
        self.inlines.iter().map(Inline::char_len).sum()
    }

    /// Returns `true` if the paragraph has no content.
    pub fn is_empty(&self) -> bool {
        self.inlines.is_empty()
    }

    /// Paragraph text, inline elements rendered as U+FFFC.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for inline in &self.inlines {
            match inline {
                Inline::Run(run) => out.push_str(&run.text),
                Inline::Element(_) => out.push(crate::OBJECT_REPLACEMENT),
            }
        }
        out
    }

    /// The format new text typed at `offset` inherits: the run before the offset, or the
    /// first run when typing at the start.
    pub fn format_at(&self, offset: usize) -> Format {
        let mut pos = 0;
        for inline in &self.inlines {
            let len = inline.char_len();
            if let Inline::Run(run) = inline {
                if (offset > pos && offset <= pos + len) || (offset == 0 && pos == 0) {
                    return run.format.clone();
                }
            }
            pos += len;
        }
        Format::plain()
    }

    /// Id-free value form.
    pub fn to_content(&self) -> ParagraphContent {
        ParagraphContent {
            alignment: self.alignment,
            spans: self.inlines.iter().map(inline_to_span).collect(),
        }
    }

    /// Id-free value form of `[from, to)`.
    pub fn slice_content(&self, from: usize, to: usize) -> ParagraphContent {
        let mut spans = Vec::new();
        let mut pos = 0;
        for inline in &self.inlines {
            let len = inline.char_len();
            let (a, b) = (from.max(pos), to.min(pos + len));
            if a < b {
                match inline {
                    Inline::Run(run) => spans.push(Span::Text {
                        text: run.text.chars().skip(a - pos).take(b - a).collect(),
                        format: run.format.clone(),
                    }),
                    Inline::Element(_) => spans.push(inline_to_span(inline)),
                }
            }
            pos += len;
        }
        ParagraphContent {
            alignment: self.alignment,
            spans,
        }
        .normalized()
    }
}

fn inline_to_span(inline: &Inline) -> Span {
    match inline {
        Inline::Run(run) => Span::Text {
            text: run.text.clone(),
            format: run.format.clone(),
        },
        Inline::Element(element) => Span::Element {
            kind: element.kind.clone(),
            payload: element.payload.clone(),
        },
    }
}

/// A table: a grid of cell ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Rows of cell ids.
    pub rows: Vec<Vec<NodeId>>,
}

impl Table {
    /// Number of columns in the widest row.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// A table cell: a block container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Header cell.
    pub header: bool,
    /// Child blocks; never empty.
    pub blocks: Vec<NodeId>,
}

/// Any arena node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Paragraph block.
    Paragraph(Paragraph),
    /// Table block.
    Table(Table),
    /// Table cell.
    Cell(Cell),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Container(Container),
    Table(NodeId),
}

#[derive(Debug, Clone)]
struct Slot {
    parent: Parent,
    node: Node,
}

/// Id-preserving copy of a block subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BlockTree {
    Paragraph { id: NodeId, paragraph: Paragraph },
    Table { id: NodeId, rows: Vec<Vec<CellTree>> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CellTree {
    id: NodeId,
    header: bool,
    blocks: Vec<BlockTree>,
}

impl BlockTree {
    fn id(&self) -> NodeId {
        match self {
            BlockTree::Paragraph { id, .. } | BlockTree::Table { id, .. } => *id,
        }
    }

    fn paragraph(id: NodeId, paragraph: Paragraph) -> Self {
        BlockTree::Paragraph { id, paragraph }
    }

    fn collect_paragraphs(&self, out: &mut Vec<NodeId>) {
        match self {
            BlockTree::Paragraph { id, .. } => out.push(*id),
            BlockTree::Table { rows, .. } => {
                for cell in rows.iter().flatten() {
                    for block in &cell.blocks {
                        block.collect_paragraphs(out);
                    }
                }
            }
        }
    }

    fn from_content(content: &BlockContent, next: &mut u64) -> Self {
        match content {
            BlockContent::Paragraph(p) => {
                let id = fresh(next);
                BlockTree::Paragraph {
                    id,
                    paragraph: paragraph_from_content(p, next),
                }
            }
            BlockContent::Table(table) => {
                let id = fresh(next);
                let rows = table
                    .rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|cell| cell_from_content(cell, next))
                            .collect()
                    })
                    .collect();
                BlockTree::Table { id, rows }
            }
        }
    }
}

fn cell_from_content(cell: &CellContent, next: &mut u64) -> CellTree {
    let id = fresh(next);
    let mut blocks: Vec<BlockTree> = cell
        .blocks
        .iter()
        .map(|b| BlockTree::from_content(b, next))
        .collect();
    if blocks.is_empty() {
        blocks.push(BlockTree::paragraph(fresh(next), Paragraph::default()));
    }
    CellTree {
        id,
        header: cell.header,
        blocks,
    }
}

fn fresh(next: &mut u64) -> NodeId {
    let id = NodeId(*next);
    *next += 1;
    id
}

fn paragraph_from_content(content: &ParagraphContent, next: &mut u64) -> Paragraph {
    let inlines = content
        .spans
        .iter()
        .map(|span| match span {
            Span::Text { text, format } => Inline::Run(TextRun {
                id: fresh(next),
                text: text.clone(),
                format: format.clone(),
            }),
            Span::Element { kind, payload } => Inline::Element(InlineElement {
                id: fresh(next),
                kind: kind.clone(),
                payload: payload.clone(),
            }),
        })
        .collect();
    Paragraph {
        alignment: content.alignment,
        inlines: normalize_inlines(inlines),
    }
}

/// Split inline children at a character offset. A run straddling the offset keeps its id on
/// the left and gets a fresh id on the right.
fn split_inlines(inlines: Vec<Inline>, offset: usize, next: &mut u64) -> (Vec<Inline>, Vec<Inline>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut pos = 0;
    for inline in inlines {
        let len = inline.char_len();
        if pos + len <= offset {
            left.push(inline);
        } else if pos >= offset {
            right.push(inline);
        } else {
            match inline {
                Inline::Run(run) => {
                    let at = byte_index(&run.text, offset - pos);
                    let (a, b) = run.text.split_at(at);
                    right.push(Inline::Run(TextRun {
                        id: fresh(next),
                        text: b.to_string(),
                        format: run.format.clone(),
                    }));
                    left.push(Inline::Run(TextRun {
                        id: run.id,
                        text: a.to_string(),
                        format: run.format,
                    }));
                }
                other => right.push(other),
            }
        }
        pos += len;
    }
    (left, right)
}

fn normalize_inlines(inlines: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::with_capacity(inlines.len());
    for inline in inlines {
        match inline {
            Inline::Run(run) if run.text.is_empty() => {}
            Inline::Run(run) => match out.last_mut() {
                Some(Inline::Run(prev)) if prev.format == run.format => prev.text.push_str(&run.text),
                _ => out.push(Inline::Run(run)),
            },
            element => out.push(element),
        }
    }
    out
}

pub(crate) fn byte_index(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// The kind of a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Content was inserted inside a paragraph.
    Insert,
    /// Content was removed.
    Delete,
    /// Formatting or alignment changed; positions are unaffected.
    Format,
    /// Blocks were created, removed, split or merged.
    Structural,
}

impl ChangeKind {
    /// Kind of the reverse change.
    pub fn inverse(self) -> Self {
        match self {
            ChangeKind::Insert => ChangeKind::Delete,
            ChangeKind::Delete => ChangeKind::Insert,
            other => other,
        }
    }
}

/// Blocks replaced inside one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedBlocks {
    /// Container whose block list changed.
    pub container: Container,
    /// First replaced index.
    pub index: usize,
    /// Ids of the blocks that were replaced.
    pub removed: Vec<NodeId>,
    /// Ids of the blocks that took their place.
    pub inserted: Vec<NodeId>,
    /// Top-level block enclosing `container` when it is a cell.
    pub top_level: Option<NodeId>,
}

/// Notification delivered to observers after a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    /// Change kind.
    pub kind: ChangeKind,
    /// Document generation after the change.
    pub generation: u64,
    /// Changed block ranges, in application order.
    pub affected: Vec<AffectedBlocks>,
}

/// One block-list replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Splice {
    container: Container,
    index: usize,
    removed: Vec<BlockTree>,
    inserted: Vec<BlockTree>,
}

/// A committed mutation: enough to revert or reapply it exactly, plus how positions move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    kind: ChangeKind,
    splices: Vec<Splice>,
    mapping: PositionMapping,
    change: DocumentChange,
}

impl Edit {
    /// Change kind.
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// How positions valid before the edit map into the document after it.
    pub fn mapping(&self) -> &PositionMapping {
        &self.mapping
    }

    /// The notification emitted when the edit was committed.
    pub fn change(&self) -> &DocumentChange {
        &self.change
    }

    /// Returns `true` if the edit replaced nothing.
    pub fn is_noop(&self) -> bool {
        self.splices.is_empty()
    }
}

/// Handle returned by [`Document::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&DocumentChange) + Send>;

/// Notifications held back while a command is in flight.
struct Pending {
    generation: u64,
    changes: Vec<DocumentChange>,
}

/// The manuscript tree.
pub struct Document {
    nodes: HashMap<NodeId, Slot>,
    body: Vec<NodeId>,
    next_id: u64,
    generation: u64,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
    pending: Option<Pending>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("blocks", &self.body.len())
            .field("nodes", &self.nodes.len())
            .field("generation", &self.generation)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.content() == other.content()
    }
}

impl Document {
    /// An empty document: one empty paragraph.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: HashMap::new(),
            body: Vec::new(),
            next_id: 1,
            generation: 0,
            observers: Vec::new(),
            next_subscription: 1,
            pending: None,
        };
        let id = fresh(&mut doc.next_id);
        doc.attach(&BlockTree::paragraph(id, Paragraph::default()), Container::Body);
        doc.body.push(id);
        doc
    }

    /// Build a document from id-free content.
    pub fn from_blocks(blocks: &[BlockContent]) -> Result<Self, DocumentError> {
        if let Some(depth) = blocks
            .iter()
            .map(BlockContent::table_depth)
            .find(|d| *d > MAX_TABLE_DEPTH)
        {
            return Err(DocumentError::UnsupportedNesting {
                depth,
                max: MAX_TABLE_DEPTH,
            });
        }
        if blocks.is_empty() {
            return Ok(Self::new());
        }
        let mut doc = Self::new();
        doc.nodes.clear();
        doc.body.clear();
        for block in blocks {
            let tree = BlockTree::from_content(block, &mut doc.next_id);
            doc.attach(&tree, Container::Body);
            doc.body.push(tree.id());
        }
        Ok(doc)
    }

    /// Build a document of plain paragraphs, one per line of `text`.
    pub fn from_plain_text(text: &str) -> Self {
        let blocks: Vec<BlockContent> = text
            .split('\n')
            .map(|line| BlockContent::Paragraph(ParagraphContent::plain(line.trim_end_matches('\r'))))
            .collect();
        // Plain paragraphs never nest tables.
        Self::from_blocks(&blocks).unwrap_or_default()
    }

    /// Generation counter; incremented by every committed mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Top-level block ids.
    pub fn body(&self) -> &[NodeId] {
        &self.body
    }

    /// Blocks of a container.
    pub fn blocks(&self, container: Container) -> Option<&[NodeId]> {
        match container {
            Container::Body => Some(&self.body),
            Container::Cell(cell) => match &self.nodes.get(&cell)?.node {
                Node::Cell(cell) => Some(&cell.blocks),
                _ => None,
            },
        }
    }

    fn blocks_mut(&mut self, container: Container) -> Option<&mut Vec<NodeId>> {
        match container {
            Container::Body => Some(&mut self.body),
            Container::Cell(cell) => match &mut self.nodes.get_mut(&cell)?.node {
                Node::Cell(cell) => Some(&mut cell.blocks),
                _ => None,
            },
        }
    }

    /// Any node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id).map(|slot| &slot.node)
    }

    /// A paragraph by id.
    pub fn paragraph(&self, id: NodeId) -> Option<&Paragraph> {
        match self.node(id)? {
            Node::Paragraph(p) => Some(p),
            _ => None,
        }
    }

    /// A table by id.
    pub fn table(&self, id: NodeId) -> Option<&Table> {
        match self.node(id)? {
            Node::Table(t) => Some(t),
            _ => None,
        }
    }

    /// A cell by id.
    pub fn cell(&self, id: NodeId) -> Option<&Cell> {
        match self.node(id)? {
            Node::Cell(c) => Some(c),
            _ => None,
        }
    }

    fn paragraph_ref(&self, id: NodeId) -> Result<&Paragraph, DocumentError> {
        self.paragraph(id)
            .ok_or(DocumentError::InvalidPosition { node: id })
    }

    /// Length of a paragraph in character offsets.
    pub fn paragraph_len(&self, id: NodeId) -> Result<usize, DocumentError> {
        Ok(self.paragraph_ref(id)?.len())
    }

    /// Text of a paragraph, inline elements rendered as U+FFFC.
    pub fn paragraph_text(&self, id: NodeId) -> Result<String, DocumentError> {
        Ok(self.paragraph_ref(id)?.text())
    }

    /// The container a block belongs to (`None` for cells and unknown ids).
    pub fn container_of(&self, block: NodeId) -> Option<Container> {
        match self.nodes.get(&block)?.parent {
            Parent::Container(container) => Some(container),
            Parent::Table(_) => None,
        }
    }

    /// The table a cell belongs to.
    pub fn table_of_cell(&self, cell: NodeId) -> Option<NodeId> {
        match self.nodes.get(&cell)?.parent {
            Parent::Table(table) => Some(table),
            Parent::Container(_) => None,
        }
    }

    fn container_index(&self, block: NodeId) -> Result<(Container, usize), DocumentError> {
        let container = self
            .container_of(block)
            .ok_or(DocumentError::InvalidPosition { node: block })?;
        let index = self
            .blocks(container)
            .and_then(|blocks| blocks.iter().position(|id| *id == block))
            .ok_or(DocumentError::InvalidPosition { node: block })?;
        Ok((container, index))
    }

    /// The top-level block that (transitively) contains `id`.
    pub fn top_level_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            match self.nodes.get(&current)?.parent {
                Parent::Container(Container::Body) => return Some(current),
                Parent::Container(Container::Cell(cell)) => current = cell,
                Parent::Table(table) => current = table,
            }
        }
    }

    /// Number of tables enclosing `container`.
    pub fn table_depth(&self, container: Container) -> usize {
        let mut depth = 0;
        let mut current = container;
        while let Container::Cell(cell) = current {
            depth += 1;
            current = match self
                .table_of_cell(cell)
                .and_then(|table| self.container_of(table))
            {
                Some(container) => container,
                None => break,
            };
        }
        depth
    }

    /// Every paragraph id in reading order (cells row by row, left to right).
    pub fn paragraphs_in_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for id in &self.body {
            self.collect_paragraph_ids(*id, &mut out);
        }
        out
    }

    fn collect_paragraph_ids(&self, block: NodeId, out: &mut Vec<NodeId>) {
        match self.node(block) {
            Some(Node::Paragraph(_)) => out.push(block),
            Some(Node::Table(table)) => {
                for cell in table.rows.iter().flatten() {
                    if let Some(cell) = self.cell(*cell) {
                        for child in &cell.blocks {
                            self.collect_paragraph_ids(*child, out);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Paragraph ids contained in a block (the block itself for a paragraph).
    pub fn paragraphs_in_block(&self, block: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_paragraph_ids(block, &mut out);
        out
    }

    /// The paragraph after `id` in reading order.
    pub fn next_paragraph(&self, id: NodeId) -> Option<NodeId> {
        let order = self.paragraphs_in_order();
        let index = order.iter().position(|p| *p == id)?;
        order.get(index + 1).copied()
    }

    /// The paragraph before `id` in reading order.
    pub fn previous_paragraph(&self, id: NodeId) -> Option<NodeId> {
        let order = self.paragraphs_in_order();
        let index = order.iter().position(|p| *p == id)?;
        index.checked_sub(1).and_then(|i| order.get(i).copied())
    }

    /// Start of the first paragraph.
    pub fn first_position(&self) -> Position {
        let first = self.paragraphs_in_order().first().copied();
        Position::new(first.unwrap_or(NodeId(0)), 0)
    }

    /// End of the last paragraph.
    pub fn last_position(&self) -> Position {
        match self.paragraphs_in_order().last() {
            Some(id) => Position::new(*id, self.paragraph(*id).map_or(0, Paragraph::len)),
            None => Position::new(NodeId(0), 0),
        }
    }

    /// Check that `pos` addresses an existing paragraph boundary.
    pub fn validate(&self, pos: Position) -> Result<(), DocumentError> {
        let len = self.paragraph_len(pos.paragraph)?;
        if pos.offset > len {
            return Err(DocumentError::OutOfRange {
                offset: pos.offset,
                len,
            });
        }
        Ok(())
    }

    /// The nearest valid position: offsets are clamped to the paragraph length, positions in
    /// vanished paragraphs fall back to the document start.
    pub fn clamp(&self, pos: Position) -> Position {
        match self.paragraph(pos.paragraph) {
            Some(p) => Position::new(pos.paragraph, pos.offset.min(p.len())),
            None => self.first_position(),
        }
    }

    /// Resolve a position to (paragraph, inline node, offset inside the inline).
    pub fn resolve(&self, pos: Position) -> Result<ResolvedPosition, DocumentError> {
        self.validate(pos)?;
        let paragraph = self.paragraph_ref(pos.paragraph)?;
        let mut start = 0;
        for inline in &paragraph.inlines {
            let len = inline.char_len();
            if pos.offset < start + len {
                return Ok(ResolvedPosition {
                    paragraph: pos.paragraph,
                    inline: Some(inline.id()),
                    inline_offset: pos.offset - start,
                });
            }
            start += len;
        }
        Ok(ResolvedPosition {
            paragraph: pos.paragraph,
            inline: paragraph.inlines.last().map(Inline::id),
            inline_offset: paragraph.inlines.last().map_or(0, Inline::char_len),
        })
    }

    fn path(&self, paragraph: NodeId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = paragraph;
        loop {
            match self.nodes.get(&current)?.parent {
                Parent::Container(container) => {
                    let index = self.blocks(container)?.iter().position(|id| *id == current)?;
                    path.push(index);
                    match container {
                        Container::Body => break,
                        Container::Cell(cell) => current = cell,
                    }
                }
                Parent::Table(table) => {
                    let rows = &self.table(table)?.rows;
                    let (r, c) = rows.iter().enumerate().find_map(|(r, row)| {
                        row.iter().position(|id| *id == current).map(|c| (r, c))
                    })?;
                    path.push(c);
                    path.push(r);
                    current = table;
                }
            }
        }
        path.reverse();
        Some(path)
    }

    /// Compare two valid positions in reading order.
    pub fn compare(&self, a: Position, b: Position) -> Result<Ordering, DocumentError> {
        self.validate(a)?;
        self.validate(b)?;
        if a.paragraph == b.paragraph {
            return Ok(a.offset.cmp(&b.offset));
        }
        let pa = self
            .path(a.paragraph)
            .ok_or(DocumentError::InvalidPosition { node: a.paragraph })?;
        let pb = self
            .path(b.paragraph)
            .ok_or(DocumentError::InvalidPosition { node: b.paragraph })?;
        Ok(pa.cmp(&pb))
    }

    /// Validate a range and return it with `start <= end`.
    pub fn normalize_range(&self, range: TextRange) -> Result<TextRange, DocumentError> {
        match self.compare(range.start, range.end)? {
            Ordering::Greater => Ok(TextRange::new(range.end, range.start)),
            _ => Ok(range),
        }
    }

    // ----- observers -----

    /// Register an observer called after every committed change.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&DocumentChange) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(callback)));
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        before != self.observers.len()
    }

    fn notify(&mut self, change: &DocumentChange) {
        if let Some(pending) = &mut self.pending {
            pending.changes.push(change.clone());
            return;
        }
        for (_, observer) in &mut self.observers {
            observer(change);
        }
    }

    // ----- transactions -----

    /// Hold back notifications until [`Document::finish_transaction`] or
    /// [`Document::abort_transaction`]. Transactions do not nest.
    pub(crate) fn begin_transaction(&mut self) {
        if self.pending.is_none() {
            self.pending = Some(Pending {
                generation: self.generation,
                changes: Vec::new(),
            });
        }
    }

    /// Deliver the held-back notifications in commit order.
    pub(crate) fn finish_transaction(&mut self) {
        if let Some(pending) = self.pending.take() {
            for change in &pending.changes {
                self.notify(change);
            }
        }
    }

    /// Revert `edits` (committed inside the open transaction) without notifying and restore
    /// the generation the transaction started at.
    pub(crate) fn abort_transaction(&mut self, edits: &[Edit]) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        for edit in edits.iter().rev() {
            if let Err(err) = self.apply_all(&edit.splices, true) {
                log::error!("rolling back a failed command: {err}");
                // Part of the command stays applied; observers must hear about it.
                for change in &pending.changes {
                    self.notify(change);
                }
                return;
            }
        }
        self.generation = pending.generation;
    }

    // ----- arena plumbing -----

    fn alloc(&mut self) -> NodeId {
        fresh(&mut self.next_id)
    }

    fn attach(&mut self, tree: &BlockTree, container: Container) {
        match tree {
            BlockTree::Paragraph { id, paragraph } => {
                self.nodes.insert(
                    *id,
                    Slot {
                        parent: Parent::Container(container),
                        node: Node::Paragraph(paragraph.clone()),
                    },
                );
            }
            BlockTree::Table { id, rows } => {
                for cell in rows.iter().flatten() {
                    for block in &cell.blocks {
                        self.attach(block, Container::Cell(cell.id));
                    }
                    self.nodes.insert(
                        cell.id,
                        Slot {
                            parent: Parent::Table(*id),
                            node: Node::Cell(Cell {
                                header: cell.header,
                                blocks: cell.blocks.iter().map(BlockTree::id).collect(),
                            }),
                        },
                    );
                }
                self.nodes.insert(
                    *id,
                    Slot {
                        parent: Parent::Container(container),
                        node: Node::Table(Table {
                            rows: rows
                                .iter()
                                .map(|row| row.iter().map(|cell| cell.id).collect())
                                .collect(),
                        }),
                    },
                );
            }
        }
    }

    fn detach(&mut self, id: NodeId) {
        let Some(slot) = self.nodes.remove(&id) else {
            return;
        };
        match slot.node {
            Node::Paragraph(_) => {}
            Node::Table(table) => {
                for cell in table.rows.into_iter().flatten() {
                    self.detach(cell);
                }
            }
            Node::Cell(cell) => {
                for block in cell.blocks {
                    self.detach(block);
                }
            }
        }
    }

    fn extract(&self, id: NodeId) -> Option<BlockTree> {
        match self.node(id)? {
            Node::Paragraph(p) => Some(BlockTree::paragraph(id, p.clone())),
            Node::Table(table) => {
                let mut rows = Vec::with_capacity(table.rows.len());
                for row in &table.rows {
                    let mut cells = Vec::with_capacity(row.len());
                    for cell_id in row {
                        let cell = self.cell(*cell_id)?;
                        let blocks = cell
                            .blocks
                            .iter()
                            .map(|b| self.extract(*b))
                            .collect::<Option<Vec<_>>>()?;
                        cells.push(CellTree {
                            id: *cell_id,
                            header: cell.header,
                            blocks,
                        });
                    }
                    rows.push(cells);
                }
                Some(BlockTree::Table { id, rows })
            }
            Node::Cell(_) => None,
        }
    }

    fn block_content(&self, id: NodeId) -> Option<BlockContent> {
        match self.node(id)? {
            Node::Paragraph(p) => Some(BlockContent::Paragraph(p.to_content())),
            Node::Table(table) => {
                let rows = table
                    .rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|cell_id| {
                                let cell = self.cell(*cell_id)?;
                                let blocks = cell
                                    .blocks
                                    .iter()
                                    .map(|b| self.block_content(*b))
                                    .collect::<Option<Vec<_>>>()?;
                                Some(CellContent {
                                    header: cell.header,
                                    blocks,
                                })
                            })
                            .collect::<Option<Vec<_>>>()
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(BlockContent::Table(TableContent { rows }))
            }
            Node::Cell(_) => None,
        }
    }

    fn apply_splice(&mut self, splice: &Splice, reverse: bool) -> Result<(), DocumentError> {
        let (remove, insert) = if reverse {
            (&splice.inserted, &splice.removed)
        } else {
            (&splice.removed, &splice.inserted)
        };
        let mismatch = DocumentError::InvalidRange {
            reason: "edit does not match the document",
        };
        let blocks = self.blocks(splice.container).ok_or(mismatch.clone())?;
        let end = splice.index + remove.len();
        if end > blocks.len()
            || blocks[splice.index..end]
                .iter()
                .zip(remove.iter())
                .any(|(id, tree)| *id != tree.id())
            || blocks.len() - remove.len() + insert.len() == 0
        {
            return Err(mismatch);
        }
        for tree in remove {
            self.detach(tree.id());
        }
        for tree in insert {
            self.attach(tree, splice.container);
        }
        let ids: Vec<NodeId> = insert.iter().map(BlockTree::id).collect();
        let blocks = self.blocks_mut(splice.container).ok_or(mismatch)?;
        blocks.splice(splice.index..end, ids);
        Ok(())
    }

    fn apply_all(&mut self, splices: &[Splice], reverse: bool) -> Result<(), DocumentError> {
        let order: Vec<&Splice> = if reverse {
            splices.iter().rev().collect()
        } else {
            splices.iter().collect()
        };
        for (done, splice) in order.iter().enumerate() {
            if let Err(err) = self.apply_splice(splice, reverse) {
                for applied in order[..done].iter().rev() {
                    if let Err(rollback) = self.apply_splice(applied, !reverse) {
                        log::error!("rollback of a partially applied edit failed: {rollback}");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn describe(&self, kind: ChangeKind, splices: &[Splice], reverse: bool) -> DocumentChange {
        let mut affected: Vec<AffectedBlocks> = splices
            .iter()
            .map(|splice| {
                let (removed, inserted) = if reverse {
                    (&splice.inserted, &splice.removed)
                } else {
                    (&splice.removed, &splice.inserted)
                };
                AffectedBlocks {
                    container: splice.container,
                    index: splice.index,
                    removed: removed.iter().map(BlockTree::id).collect(),
                    inserted: inserted.iter().map(BlockTree::id).collect(),
                    top_level: match splice.container {
                        Container::Body => None,
                        Container::Cell(cell) => self.top_level_ancestor(cell),
                    },
                }
            })
            .collect();
        if reverse {
            affected.reverse();
        }
        DocumentChange {
            kind,
            generation: self.generation,
            affected,
        }
    }

    fn commit(
        &mut self,
        kind: ChangeKind,
        splices: Vec<Splice>,
        mapping: PositionMapping,
    ) -> Result<Edit, DocumentError> {
        if splices.is_empty() {
            // Nothing changed: no new generation, no notification.
            return Ok(Edit {
                kind,
                change: self.describe(kind, &splices, false),
                splices,
                mapping,
            });
        }
        self.apply_all(&splices, false)?;
        self.generation += 1;
        let change = self.describe(kind, &splices, false);
        log::trace!(
            "commit {kind:?}: {} splice(s), generation {}",
            splices.len(),
            self.generation
        );
        self.notify(&change);
        Ok(Edit {
            kind,
            splices,
            mapping,
            change,
        })
    }

    /// Undo a committed edit, restoring the exact prior state including node ids.
    pub fn revert(&mut self, edit: &Edit) -> Result<DocumentChange, DocumentError> {
        self.apply_all(&edit.splices, true)?;
        self.generation += 1;
        let change = self.describe(edit.kind.inverse(), &edit.splices, true);
        self.notify(&change);
        Ok(change)
    }

    /// Redo an edit previously undone with [`Document::revert`].
    pub fn reapply(&mut self, edit: &Edit) -> Result<DocumentChange, DocumentError> {
        self.apply_all(&edit.splices, false)?;
        self.generation += 1;
        let change = self.describe(edit.kind, &edit.splices, false);
        self.notify(&change);
        Ok(change)
    }

    fn locate(&self, pos: Position) -> Result<(Container, usize, Paragraph), DocumentError> {
        self.validate(pos)?;
        let (container, index) = self.container_index(pos.paragraph)?;
        Ok((container, index, self.paragraph_ref(pos.paragraph)?.clone()))
    }

    fn replace_paragraph(
        container: Container,
        index: usize,
        id: NodeId,
        old: Paragraph,
        new: Paragraph,
    ) -> Splice {
        Splice {
            container,
            index,
            removed: vec![BlockTree::paragraph(id, old)],
            inserted: vec![BlockTree::paragraph(id, new)],
        }
    }

    // ----- mutations -----

    /// Insert text at `pos`, inheriting the format of the preceding character.
    pub fn insert_text(&mut self, pos: Position, text: &str) -> Result<Edit, DocumentError> {
        let format = self.paragraph_ref(pos.paragraph)?.format_at(pos.offset);
        self.insert_text_with_format(pos, text, format)
    }

    /// Insert text at `pos` with an explicit format.
    pub fn insert_text_with_format(
        &mut self,
        pos: Position,
        text: &str,
        format: Format,
    ) -> Result<Edit, DocumentError> {
        if text.is_empty() {
            return Err(DocumentError::InvalidText {
                reason: "empty text",
            });
        }
        if text.contains(['\n', '\r']) {
            return Err(DocumentError::InvalidText {
                reason: "text contains a paragraph break",
            });
        }
        let (container, index, old) = self.locate(pos)?;
        let (left, right) = split_inlines(old.inlines.clone(), pos.offset, &mut self.next_id);
        let run = Inline::Run(TextRun {
            id: self.alloc(),
            text: text.to_string(),
            format,
        });
        let new = Paragraph {
            alignment: old.alignment,
            inlines: normalize_inlines(left.into_iter().chain(iter::once(run)).chain(right).collect()),
        };
        let len = text.chars().count();
        let splice = Self::replace_paragraph(container, index, pos.paragraph, old, new);
        self.commit(
            ChangeKind::Insert,
            vec![splice],
            PositionMapping::single(MapStep::Reflow {
                from: pos,
                to: Position::new(pos.paragraph, pos.offset + len),
                inclusive: true,
                created: Vec::new(),
            }),
        )
    }

    /// Delete a range. Both ends must live in the same container; whole blocks between them
    /// are removed and the two end paragraphs are joined.
    pub fn delete_range(&mut self, range: TextRange) -> Result<Edit, DocumentError> {
        let range = self.normalize_range(range)?;
        if range.is_empty() {
            return Err(DocumentError::InvalidRange {
                reason: "empty range",
            });
        }
        let (start, end) = (range.start, range.end);
        let (container, first, start_para) = self.locate(start)?;
        if start.paragraph == end.paragraph {
            let (left, rest) = split_inlines(start_para.inlines.clone(), start.offset, &mut self.next_id);
            let (_, right) = split_inlines(rest, end.offset - start.offset, &mut self.next_id);
            let new = Paragraph {
                alignment: start_para.alignment,
                inlines: normalize_inlines(left.into_iter().chain(right).collect()),
            };
            let splice = Self::replace_paragraph(container, first, start.paragraph, start_para, new);
            return self.commit(
                ChangeKind::Delete,
                vec![splice],
                PositionMapping::single(MapStep::Collapse {
                    start,
                    end,
                    removed: Vec::new(),
                }),
            );
        }
        let (end_container, last, end_para) = self.locate(end)?;
        if end_container != container {
            return Err(DocumentError::InvalidRange {
                reason: "range endpoints are in different containers",
            });
        }
        let block_ids: Vec<NodeId> = self
            .blocks(container)
            .map(|blocks| blocks[first..=last].to_vec())
            .unwrap_or_default();
        let removed = block_ids
            .iter()
            .map(|id| self.extract(*id))
            .collect::<Option<Vec<_>>>()
            .ok_or(DocumentError::InvalidRange {
                reason: "range covers a damaged block",
            })?;
        let mut vanished = Vec::new();
        for tree in &removed[1..removed.len() - 1] {
            tree.collect_paragraphs(&mut vanished);
        }
        let (left, _) = split_inlines(start_para.inlines.clone(), start.offset, &mut self.next_id);
        let (_, right) = split_inlines(end_para.inlines, end.offset, &mut self.next_id);
        let joined = Paragraph {
            alignment: start_para.alignment,
            inlines: normalize_inlines(left.into_iter().chain(right).collect()),
        };
        let splice = Splice {
            container,
            index: first,
            removed,
            inserted: vec![BlockTree::paragraph(start.paragraph, joined)],
        };
        self.commit(
            ChangeKind::Delete,
            vec![splice],
            PositionMapping::single(MapStep::Collapse {
                start,
                end,
                removed: vanished,
            }),
        )
    }

    fn restyle<F>(&mut self, range: TextRange, restyle: F) -> Result<Edit, DocumentError>
    where
        F: Fn(&Format) -> Format,
    {
        let range = self.normalize_range(range)?;
        if range.is_empty() {
            return Err(DocumentError::InvalidRange {
                reason: "empty range",
            });
        }
        let order = self.paragraphs_in_order();
        let find = |id: NodeId| {
            order
                .iter()
                .position(|p| *p == id)
                .ok_or(DocumentError::InvalidPosition { node: id })
        };
        let (first, last) = (find(range.start.paragraph)?, find(range.end.paragraph)?);
        let mut splices = Vec::new();
        for id in &order[first..=last] {
            let old = self.paragraph_ref(*id)?.clone();
            let from = if *id == range.start.paragraph { range.start.offset } else { 0 };
            let to = if *id == range.end.paragraph { range.end.offset } else { old.len() };
            if from >= to {
                continue;
            }
            let (left, rest) = split_inlines(old.inlines.clone(), from, &mut self.next_id);
            let (middle, right) = split_inlines(rest, to - from, &mut self.next_id);
            let middle = middle.into_iter().map(|inline| match inline {
                Inline::Run(mut run) => {
                    run.format = restyle(&run.format);
                    Inline::Run(run)
                }
                other => other,
            });
            let new = Paragraph {
                alignment: old.alignment,
                inlines: normalize_inlines(left.into_iter().chain(middle).chain(right).collect()),
            };
            if new == old {
                continue;
            }
            let (container, index) = self.container_index(*id)?;
            splices.push(Self::replace_paragraph(container, index, *id, old, new));
        }
        self.commit(ChangeKind::Format, splices, PositionMapping::identity())
    }

    /// Set the attributes named by `delta` on every run in `range`.
    pub fn apply_format(&mut self, range: TextRange, delta: &FormatDelta) -> Result<Edit, DocumentError> {
        self.restyle(range, |format| format.with_applied(delta))
    }

    /// Remove the attributes named by `delta` from every run in `range`.
    pub fn clear_format(&mut self, range: TextRange, delta: &FormatDelta) -> Result<Edit, DocumentError> {
        self.restyle(range, |format| format.with_cleared(delta))
    }

    /// Returns `true` if every character of `range` already carries `delta`.
    pub fn range_has_format(&self, range: TextRange, delta: &FormatDelta) -> Result<bool, DocumentError> {
        let range = self.normalize_range(range)?;
        let order = self.paragraphs_in_order();
        let mut inside = false;
        for id in order {
            if id == range.start.paragraph {
                inside = true;
            }
            if inside {
                let paragraph = self.paragraph_ref(id)?;
                let from = if id == range.start.paragraph { range.start.offset } else { 0 };
                let to = if id == range.end.paragraph { range.end.offset } else { paragraph.len() };
                let mut pos = 0;
                for inline in &paragraph.inlines {
                    let len = inline.char_len();
                    if let Inline::Run(run) = inline {
                        if pos < to && pos + len > from && !run.format.contains(delta) {
                            return Ok(false);
                        }
                    }
                    pos += len;
                }
            }
            if id == range.end.paragraph {
                break;
            }
        }
        Ok(true)
    }

    /// Insert an atomic inline element at `pos`.
    pub fn insert_inline(
        &mut self,
        pos: Position,
        kind: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<Edit, DocumentError> {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(DocumentError::InvalidText {
                reason: "inline element kind is empty",
            });
        }
        let (container, index, old) = self.locate(pos)?;
        let (left, right) = split_inlines(old.inlines.clone(), pos.offset, &mut self.next_id);
        let element = Inline::Element(InlineElement {
            id: self.alloc(),
            kind,
            payload: payload.into(),
        });
        let new = Paragraph {
            alignment: old.alignment,
            inlines: normalize_inlines(left.into_iter().chain(iter::once(element)).chain(right).collect()),
        };
        let splice = Self::replace_paragraph(container, index, pos.paragraph, old, new);
        self.commit(
            ChangeKind::Insert,
            vec![splice],
            PositionMapping::single(MapStep::Reflow {
                from: pos,
                to: Position::new(pos.paragraph, pos.offset + 1),
                inclusive: true,
                created: Vec::new(),
            }),
        )
    }

    /// Insert an empty `rows` x `cols` table at `pos`, splitting the paragraph around it.
    pub fn insert_table(&mut self, pos: Position, rows: usize, cols: usize) -> Result<Edit, DocumentError> {
        if rows == 0 || cols == 0 {
            return Err(DocumentError::InvalidRange {
                reason: "a table needs at least one row and one column",
            });
        }
        let content = TableContent {
            rows: vec![vec![CellContent::empty(); cols]; rows],
        };
        self.insert_fragment(pos, &[BlockContent::Table(content)])
    }

    /// Split the paragraph at `pos`; the tail moves into a new paragraph after it.
    pub fn split_paragraph(&mut self, pos: Position) -> Result<Edit, DocumentError> {
        let (container, index, old) = self.locate(pos)?;
        let (left, right) = split_inlines(old.inlines.clone(), pos.offset, &mut self.next_id);
        let tail = self.alloc();
        let head = Paragraph {
            alignment: old.alignment,
            inlines: left,
        };
        let rest = Paragraph {
            alignment: old.alignment,
            inlines: right,
        };
        let splice = Splice {
            container,
            index,
            removed: vec![BlockTree::paragraph(pos.paragraph, old)],
            inserted: vec![
                BlockTree::paragraph(pos.paragraph, head),
                BlockTree::paragraph(tail, rest),
            ],
        };
        self.commit(
            ChangeKind::Structural,
            vec![splice],
            PositionMapping::single(MapStep::Reflow {
                from: pos,
                to: Position::new(tail, 0),
                inclusive: true,
                created: vec![tail],
            }),
        )
    }

    /// Append paragraph `second` to `first`. They must be adjacent siblings in one container.
    pub fn merge_paragraphs(&mut self, first: NodeId, second: NodeId) -> Result<Edit, DocumentError> {
        let a = self.paragraph_ref(first)?.clone();
        let b = self.paragraph_ref(second)?.clone();
        let (container, index) = self.container_index(first)?;
        let (other, next) = self.container_index(second)?;
        if other != container || next != index + 1 {
            return Err(DocumentError::InvalidRange {
                reason: "paragraphs are not adjacent siblings",
            });
        }
        let len = a.len();
        let merged = Paragraph {
            alignment: a.alignment,
            inlines: normalize_inlines(a.inlines.iter().cloned().chain(b.inlines.iter().cloned()).collect()),
        };
        let splice = Splice {
            container,
            index,
            removed: vec![BlockTree::paragraph(first, a), BlockTree::paragraph(second, b)],
            inserted: vec![BlockTree::paragraph(first, merged)],
        };
        self.commit(
            ChangeKind::Structural,
            vec![splice],
            PositionMapping::single(MapStep::Collapse {
                start: Position::new(first, len),
                end: Position::new(second, 0),
                removed: Vec::new(),
            }),
        )
    }

    /// Insert block content at `pos`. A single paragraph is inlined into the target
    /// paragraph; anything else splits the target and places the blocks in between.
    pub fn insert_fragment(&mut self, pos: Position, blocks: &[BlockContent]) -> Result<Edit, DocumentError> {
        if blocks.is_empty() {
            return Err(DocumentError::InvalidRange {
                reason: "empty fragment",
            });
        }
        let (container, index, old) = self.locate(pos)?;
        let depth = self.table_depth(container)
            + blocks.iter().map(BlockContent::table_depth).max().unwrap_or(0);
        if depth > MAX_TABLE_DEPTH {
            return Err(DocumentError::UnsupportedNesting {
                depth,
                max: MAX_TABLE_DEPTH,
            });
        }
        let (left, right) = split_inlines(old.inlines.clone(), pos.offset, &mut self.next_id);

        if let [BlockContent::Paragraph(content)] = blocks {
            let inserted = paragraph_from_content(content, &mut self.next_id);
            let len = content.char_len();
            let new = Paragraph {
                alignment: old.alignment,
                inlines: normalize_inlines(left.into_iter().chain(inserted.inlines).chain(right).collect()),
            };
            let splice = Self::replace_paragraph(container, index, pos.paragraph, old, new);
            return self.commit(
                ChangeKind::Insert,
                vec![splice],
                PositionMapping::single(MapStep::Reflow {
                    from: pos,
                    to: Position::new(pos.paragraph, pos.offset + len),
                    inclusive: true,
                    created: Vec::new(),
                }),
            );
        }

        let (head, rest) = match blocks {
            [BlockContent::Paragraph(content), rest @ ..] => {
                let first = paragraph_from_content(content, &mut self.next_id);
                let inlines = normalize_inlines(left.into_iter().chain(first.inlines).collect());
                (inlines, rest)
            }
            _ => (left, blocks),
        };
        let (middle, tail_content, tail_offset) = match rest {
            [middle @ .., BlockContent::Paragraph(last)] => {
                let last = paragraph_from_content(last, &mut self.next_id);
                let len = last.len();
                (
                    middle,
                    Paragraph {
                        alignment: last.alignment,
                        inlines: normalize_inlines(last.inlines.into_iter().chain(right).collect()),
                    },
                    len,
                )
            }
            _ => (
                rest,
                Paragraph {
                    alignment: old.alignment,
                    inlines: right,
                },
                0,
            ),
        };
        let mut inserted = vec![BlockTree::paragraph(
            pos.paragraph,
            Paragraph {
                alignment: old.alignment,
                inlines: head,
            },
        )];
        let mut created = Vec::new();
        for block in middle {
            let tree = BlockTree::from_content(block, &mut self.next_id);
            tree.collect_paragraphs(&mut created);
            inserted.push(tree);
        }
        let tail = self.alloc();
        created.push(tail);
        inserted.push(BlockTree::paragraph(tail, tail_content));
        let splice = Splice {
            container,
            index,
            removed: vec![BlockTree::paragraph(pos.paragraph, old)],
            inserted,
        };
        self.commit(
            ChangeKind::Structural,
            vec![splice],
            PositionMapping::single(MapStep::Reflow {
                from: pos,
                to: Position::new(tail, tail_offset),
                inclusive: true,
                created,
            }),
        )
    }

    /// Remove a whole block (paragraph or table). A container's last block cannot be removed.
    pub fn remove_block(&mut self, block: NodeId) -> Result<Edit, DocumentError> {
        let (container, index) = self.container_index(block)?;
        if self.blocks(container).map_or(0, <[NodeId]>::len) < 2 {
            return Err(DocumentError::InvalidRange {
                reason: "cannot remove the only block of a container",
            });
        }
        let tree = self
            .extract(block)
            .ok_or(DocumentError::InvalidPosition { node: block })?;
        let mut vanished = Vec::new();
        tree.collect_paragraphs(&mut vanished);
        let order = self.paragraphs_in_order();
        let first = order.iter().position(|p| vanished.contains(p));
        let after = first
            .map(|i| i + vanished.len())
            .and_then(|i| order.get(i).copied());
        let fallback = match (after, first.and_then(|i| i.checked_sub(1)).and_then(|i| order.get(i))) {
            (Some(next), _) => Position::new(next, 0),
            (None, Some(prev)) => Position::new(*prev, self.paragraph_len(*prev)?),
            (None, None) => {
                return Err(DocumentError::InvalidRange {
                    reason: "no paragraph would remain",
                })
            }
        };
        let splice = Splice {
            container,
            index,
            removed: vec![tree],
            inserted: Vec::new(),
        };
        self.commit(
            ChangeKind::Structural,
            vec![splice],
            PositionMapping::single(MapStep::Collapse {
                start: fallback,
                end: fallback,
                removed: vanished,
            }),
        )
    }

    /// Change a paragraph's alignment.
    pub fn set_alignment(&mut self, paragraph: NodeId, alignment: Alignment) -> Result<Edit, DocumentError> {
        let (container, index) = self.container_index(paragraph)?;
        let old = self.paragraph_ref(paragraph)?.clone();
        let new = Paragraph {
            alignment,
            inlines: old.inlines.clone(),
        };
        let splices = if new == old {
            Vec::new()
        } else {
            vec![Self::replace_paragraph(container, index, paragraph, old, new)]
        };
        self.commit(ChangeKind::Format, splices, PositionMapping::identity())
    }

    // ----- content views -----

    /// Id-free content of the whole document.
    pub fn content(&self) -> Vec<BlockContent> {
        self.body
            .iter()
            .filter_map(|id| self.block_content(*id))
            .collect()
    }

    /// Id-free content of one block.
    pub fn content_of(&self, block: NodeId) -> Option<BlockContent> {
        self.block_content(block)
    }

    /// Id-free copy of a range, as pasted content would need it.
    ///
    /// Ranges whose ends share a container keep whole blocks between them; otherwise the
    /// paragraphs between the ends are copied in reading order.
    pub fn fragment(&self, range: TextRange) -> Result<Vec<BlockContent>, DocumentError> {
        let range = self.normalize_range(range)?;
        let (start, end) = (range.start, range.end);
        let first = self.paragraph_ref(start.paragraph)?;
        if start.paragraph == end.paragraph {
            return Ok(vec![BlockContent::Paragraph(
                first.slice_content(start.offset, end.offset),
            )]);
        }
        let last = self.paragraph_ref(end.paragraph)?;
        let head = BlockContent::Paragraph(first.slice_content(start.offset, first.len()));
        let tail = BlockContent::Paragraph(last.slice_content(0, end.offset));
        let (c1, i1) = self.container_index(start.paragraph)?;
        let (c2, i2) = self.container_index(end.paragraph)?;
        let mut out = vec![head];
        if c1 == c2 {
            if let Some(blocks) = self.blocks(c1) {
                out.extend(blocks[i1 + 1..i2].iter().filter_map(|id| self.block_content(*id)));
            }
        } else {
            let order = self.paragraphs_in_order();
            let from = order.iter().position(|p| *p == start.paragraph).unwrap_or(0);
            let to = order.iter().position(|p| *p == end.paragraph).unwrap_or(from);
            for id in order.iter().take(to).skip(from + 1) {
                if let Some(p) = self.paragraph(*id) {
                    out.push(BlockContent::Paragraph(p.to_content()));
                }
            }
        }
        out.push(tail);
        Ok(out)
    }

    /// Plain text: paragraphs separated by newlines, table cells by tabs.
    pub fn plain_text(&self) -> String {
        self.content()
            .iter()
            .map(BlockContent::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Immutable text snapshot for background consumers.
    pub fn snapshot(&self) -> TextSnapshot {
        let paragraphs = self
            .paragraphs_in_order()
            .into_iter()
            .filter_map(|id| self.paragraph(id).map(|p| (id, p.text())))
            .collect();
        TextSnapshot::from_paragraphs(self.generation, paragraphs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn first(doc: &Document) -> NodeId {
        doc.body()[0]
    }

    #[test]
    fn test_new_document_has_one_empty_paragraph() {
        let doc = Document::new();
        assert_eq!(doc.body().len(), 1);
        assert_eq!(doc.paragraph_len(first(&doc)).unwrap(), 0);
        assert_eq!(doc.generation(), 0);
    }

    #[test]
    fn test_insert_and_delete_text() {
        let mut doc = Document::new();
        let p = first(&doc);
        doc.insert_text(Position::new(p, 0), "Hello world").unwrap();
        doc.delete_range(TextRange::in_paragraph(p, 5, 11)).unwrap();
        assert_eq!(doc.paragraph_text(p).unwrap(), "Hello");
        assert_eq!(doc.generation(), 2);
    }

    #[test]
    fn test_insert_rejects_newlines_and_bad_offsets() {
        let mut doc = Document::new();
        let p = first(&doc);
        assert!(matches!(
            doc.insert_text(Position::new(p, 0), "a\nb"),
            Err(DocumentError::InvalidText { .. })
        ));
        assert_eq!(
            doc.insert_text(Position::new(p, 3), "x"),
            Err(DocumentError::OutOfRange { offset: 3, len: 0 })
        );
        assert_eq!(doc.generation(), 0);
    }

    #[test]
    fn test_format_splits_runs_and_renormalizes() {
        let mut doc = Document::new();
        let p = first(&doc);
        doc.insert_text(Position::new(p, 0), "abcdef").unwrap();
        doc.apply_format(TextRange::in_paragraph(p, 2, 4), &FormatDelta::bold())
            .unwrap();
        assert_eq!(doc.paragraph(p).unwrap().inlines.len(), 3);
        doc.clear_format(TextRange::in_paragraph(p, 0, 6), &FormatDelta::bold())
            .unwrap();
        assert_eq!(doc.paragraph(p).unwrap().inlines.len(), 1);
    }

    #[test]
    fn test_unchanged_format_keeps_generation() {
        let mut doc = Document::new();
        let p = first(&doc);
        doc.insert_text(Position::new(p, 0), "abcdef").unwrap();
        doc.apply_format(TextRange::in_paragraph(p, 0, 6), &FormatDelta::bold())
            .unwrap();
        let generation = doc.generation();
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        doc.subscribe(move |_| {
            if let Ok(mut n) = counter.lock() {
                *n += 1;
            }
        });

        let edit = doc
            .apply_format(TextRange::in_paragraph(p, 1, 3), &FormatDelta::bold())
            .unwrap();
        assert!(edit.is_noop());
        let edit = doc.set_alignment(p, Alignment::Left).unwrap();
        assert!(edit.is_noop());
        assert_eq!(doc.generation(), generation);
        assert_eq!(*seen.lock().unwrap(), 0);

        doc.set_alignment(p, Alignment::Center).unwrap();
        assert_eq!(doc.generation(), generation + 1);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_resolve_position() {
        let mut doc = Document::new();
        let p = first(&doc);
        doc.insert_text(Position::new(p, 0), "abcd").unwrap();
        doc.apply_format(TextRange::in_paragraph(p, 2, 4), &FormatDelta::italic())
            .unwrap();
        let second = doc.paragraph(p).unwrap().inlines[1].id();
        let resolved = doc.resolve(Position::new(p, 3)).unwrap();
        assert_eq!(resolved.inline, Some(second));
        assert_eq!(resolved.inline_offset, 1);
    }

    #[test]
    fn test_split_and_merge_restore_text() {
        let mut doc = Document::new();
        let p = first(&doc);
        doc.insert_text(Position::new(p, 0), "onetwo").unwrap();
        let split = doc.split_paragraph(Position::new(p, 3)).unwrap();
        let q = doc.body()[1];
        assert_eq!(split.mapping().map(Position::new(p, 5)), Position::new(q, 2));
        doc.merge_paragraphs(p, q).unwrap();
        assert_eq!(doc.body().len(), 1);
        assert_eq!(doc.paragraph_text(p).unwrap(), "onetwo");
    }

    #[test]
    fn test_revert_restores_ids() {
        let mut doc = Document::new();
        let p = first(&doc);
        doc.insert_text(Position::new(p, 0), "abc").unwrap();
        let ids_before: Vec<NodeId> = doc.paragraph(p).unwrap().inlines.iter().map(Inline::id).collect();
        let edit = doc.apply_format(TextRange::in_paragraph(p, 1, 2), &FormatDelta::bold()).unwrap();
        doc.revert(&edit).unwrap();
        let ids_after: Vec<NodeId> = doc.paragraph(p).unwrap().inlines.iter().map(Inline::id).collect();
        assert_eq!(ids_before, ids_after);
        doc.reapply(&edit).unwrap();
        assert_eq!(doc.paragraph(p).unwrap().inlines.len(), 3);
    }

    #[test]
    fn test_table_nesting_bound() {
        let mut doc = Document::new();
        let p = first(&doc);
        doc.insert_table(Position::new(p, 0), 1, 1).unwrap();
        let table = doc.body()[1];
        let cell = doc.table(table).unwrap().rows[0][0];
        let inner_p = doc.cell(cell).unwrap().blocks[0];
        doc.insert_table(Position::new(inner_p, 0), 1, 1).unwrap();
        let inner_table = doc.cell(cell).unwrap().blocks[1];
        let inner_cell = doc.table(inner_table).unwrap().rows[0][0];
        assert_eq!(doc.table_depth(Container::Cell(inner_cell)), 2);
        let deepest = doc.cell(inner_cell).unwrap().blocks[0];
        let generation = doc.generation();
        assert_eq!(
            doc.insert_table(Position::new(deepest, 0), 1, 1),
            Err(DocumentError::UnsupportedNesting { depth: 3, max: 2 })
        );
        assert_eq!(doc.generation(), generation);
        assert_eq!(doc.top_level_ancestor(deepest), Some(table));
    }

    #[test]
    fn test_delete_across_containers_fails() {
        let mut doc = Document::new();
        let p = first(&doc);
        doc.insert_text(Position::new(p, 0), "ab").unwrap();
        doc.insert_table(Position::new(p, 1), 1, 1).unwrap();
        let cell = doc.table(doc.body()[1]).unwrap().rows[0][0];
        let inner = doc.cell(cell).unwrap().blocks[0];
        assert!(matches!(
            doc.delete_range(TextRange::new(Position::new(p, 0), Position::new(inner, 0))),
            Err(DocumentError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_delete_across_blocks_removes_table() {
        let mut doc = Document::new();
        let p = first(&doc);
        doc.insert_text(Position::new(p, 0), "headtail").unwrap();
        doc.insert_table(Position::new(p, 4), 2, 2).unwrap();
        let tail = doc.body()[2];
        doc.delete_range(TextRange::new(Position::new(p, 4), Position::new(tail, 0)))
            .unwrap();
        assert_eq!(doc.body().len(), 1);
        assert_eq!(doc.paragraph_text(p).unwrap(), "headtail");
    }

    #[test]
    fn test_observers_see_changes_in_order() {
        let mut doc = Document::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = doc.subscribe(move |change| sink.lock().unwrap().push((change.kind, change.generation)));
        let p = first(&doc);
        doc.insert_text(Position::new(p, 0), "x").unwrap();
        doc.split_paragraph(Position::new(p, 1)).unwrap();
        assert!(doc.unsubscribe(sub));
        doc.insert_text(Position::new(p, 0), "y").unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(ChangeKind::Insert, 1), (ChangeKind::Structural, 2)]
        );
    }

    #[test]
    fn test_compare_orders_cells_after_preceding_paragraph() {
        let mut doc = Document::new();
        let p = first(&doc);
        doc.insert_text(Position::new(p, 0), "ab").unwrap();
        doc.insert_table(Position::new(p, 2), 1, 2).unwrap();
        let table = doc.table(doc.body()[1]).unwrap();
        let c0 = doc.cell(table.rows[0][0]).unwrap().blocks[0];
        let c1 = doc.cell(table.rows[0][1]).unwrap().blocks[0];
        let tail = doc.body()[2];
        let cmp = |a, b| doc.compare(Position::new(a, 0), Position::new(b, 0)).unwrap();
        assert_eq!(cmp(p, c0), Ordering::Less);
        assert_eq!(cmp(c1, c0), Ordering::Greater);
        assert_eq!(cmp(tail, c1), Ordering::Greater);
    }
}
