//! Table layout: column sizing, recursive cell layout, row heights.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::document::{Document, Inline, NodeId, Node};

use super::metrics::Metrics;
use super::paragraph::layout_paragraph;
use super::{BlockLayout, PlacedBlock, Rect};

/// How column widths are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSizing {
    /// Every column gets the same width.
    Equal,
    /// Columns are sized from their content's minimum and preferred widths.
    #[default]
    Content,
}

/// A laid-out cell. `rect` is relative to the table origin.
#[derive(Debug, Clone, PartialEq)]
pub struct CellLayout {
    /// Cell node id.
    pub cell: NodeId,
    /// Cell box, padding included.
    pub rect: Rect,
    /// Cell blocks; `y` is relative to the cell's content origin.
    pub blocks: Vec<PlacedBlock>,
}

/// A laid-out row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    /// Top edge relative to the table.
    pub y: f32,
    /// Height of the tallest cell.
    pub height: f32,
    /// Cells left to right.
    pub cells: Vec<CellLayout>,
}

/// A laid-out table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    /// Column widths.
    pub columns: Vec<f32>,
    /// Rows top to bottom.
    pub rows: Vec<RowLayout>,
    /// Total width.
    pub width: f32,
    /// Total height.
    pub height: f32,
}

/// Settings shared by the recursive block layout.
pub(crate) struct BlockContext<'m, 'a> {
    pub metrics: &'m mut Metrics<'a>,
    pub line_spacing: f32,
    pub block_spacing: f32,
    pub cell_padding: f32,
    pub sizing: TableSizing,
}

/// Lay out any block at `width`.
pub(crate) fn layout_block(doc: &Document, id: NodeId, width: f32, ctx: &mut BlockContext<'_, '_>) -> Option<BlockLayout> {
    match doc.node(id)? {
        Node::Paragraph(p) => Some(BlockLayout::Paragraph(layout_paragraph(
            p,
            width,
            ctx.line_spacing,
            ctx.metrics,
        ))),
        Node::Table(_) => layout_table(doc, id, width, ctx).map(BlockLayout::Table),
        Node::Cell(_) => None,
    }
}

/// Stack blocks vertically with `block_spacing` between them.
pub(crate) fn layout_blocks(
    doc: &Document,
    ids: &[NodeId],
    width: f32,
    ctx: &mut BlockContext<'_, '_>,
) -> (Vec<PlacedBlock>, f32) {
    let mut placed = Vec::with_capacity(ids.len());
    let mut y = 0.0;
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            y += ctx.block_spacing;
        }
        if let Some(layout) = layout_block(doc, *id, width, ctx) {
            let height = layout.height();
            placed.push(PlacedBlock { id: *id, y, layout });
            y += height;
        }
    }
    (placed, y)
}

fn layout_table(doc: &Document, id: NodeId, width: f32, ctx: &mut BlockContext<'_, '_>) -> Option<TableLayout> {
    let table = doc.table(id)?;
    let columns = column_widths(doc, &table.rows, width, ctx);
    let padding = ctx.cell_padding;
    let mut rows = Vec::with_capacity(table.rows.len());
    let mut y = 0.0;
    for row in &table.rows {
        let mut cells = Vec::with_capacity(row.len());
        let mut x = 0.0;
        let mut height: f32 = 0.0;
        for (cell_id, column) in row.iter().zip(columns.iter()) {
            let inner = (column - 2.0 * padding).max(1.0);
            let blocks = doc.cell(*cell_id).map(|c| c.blocks.as_slice()).unwrap_or(&[]);
            let (placed, content_height) = layout_blocks(doc, blocks, inner, ctx);
            height = height.max(content_height + 2.0 * padding);
            cells.push(CellLayout {
                cell: *cell_id,
                rect: Rect::new(x, y, *column, 0.0),
                blocks: placed,
            });
            x += column;
        }
        for cell in &mut cells {
            cell.rect.height = height;
        }
        rows.push(RowLayout { y, height, cells });
        y += height;
    }
    Some(TableLayout {
        width: columns.iter().sum(),
        columns,
        rows,
        height: y,
    })
}

fn column_widths(doc: &Document, rows: &[Vec<NodeId>], width: f32, ctx: &mut BlockContext<'_, '_>) -> Vec<f32> {
    let count = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let equal = vec![width / count as f32; count];
    if ctx.sizing == TableSizing::Equal {
        return equal;
    }
    let pad = 2.0 * ctx.cell_padding;
    let mut mins = vec![pad; count];
    let mut prefs = vec![pad; count];
    for row in rows {
        for (c, cell) in row.iter().enumerate() {
            let (min, pref) = cell_widths(doc, *cell, ctx);
            mins[c] = mins[c].max(min + pad);
            prefs[c] = prefs[c].max(pref + pad);
        }
    }
    let total_min: f32 = mins.iter().sum();
    let total_pref: f32 = prefs.iter().sum();
    if total_pref <= 0.0 {
        return equal;
    }
    if total_pref <= width {
        prefs
            .iter()
            .map(|p| p + (width - total_pref) * p / total_pref)
            .collect()
    } else if total_min <= width {
        let flex = total_pref - total_min;
        mins.iter()
            .zip(prefs.iter())
            .map(|(m, p)| {
                if flex > 0.0 {
                    m + (width - total_min) * (p - m) / flex
                } else {
                    *m
                }
            })
            .collect()
    } else {
        mins.iter().map(|m| m * width / total_min).collect()
    }
}

/// (minimum, preferred) content width of a cell.
fn cell_widths(doc: &Document, cell: NodeId, ctx: &mut BlockContext<'_, '_>) -> (f32, f32) {
    let Some(cell) = doc.cell(cell) else {
        return (0.0, 0.0);
    };
    cell.blocks
        .iter()
        .map(|block| block_widths(doc, *block, ctx))
        .fold((0.0, 0.0), |(a, b), (min, pref)| (f32::max(a, min), f32::max(b, pref)))
}

fn block_widths(doc: &Document, block: NodeId, ctx: &mut BlockContext<'_, '_>) -> (f32, f32) {
    match doc.node(block) {
        Some(Node::Paragraph(p)) => {
            let mut min: f32 = 0.0;
            let mut pref = 0.0;
            for inline in &p.inlines {
                match inline {
                    Inline::Run(run) => {
                        for word in run.text.split_word_bounds() {
                            let w = ctx.metrics.text(word, &run.format).width;
                            pref += w;
                            if !word.chars().all(char::is_whitespace) {
                                min = min.max(w);
                            }
                        }
                    }
                    Inline::Element(element) => {
                        let w = ctx.metrics.element(&element.kind, &element.payload).width;
                        pref += w;
                        min = min.max(w);
                    }
                }
            }
            (min, pref)
        }
        Some(Node::Table(table)) => {
            let pad = 2.0 * ctx.cell_padding;
            let count = table.column_count();
            let mut mins = vec![pad; count];
            let mut prefs = vec![pad; count];
            for row in &table.rows {
                for (c, cell) in row.iter().enumerate() {
                    let (min, pref) = cell_widths(doc, *cell, ctx);
                    mins[c] = mins[c].max(min + pad);
                    prefs[c] = prefs[c].max(pref + pad);
                }
            }
            (mins.iter().sum(), prefs.iter().sum())
        }
        _ => (0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::metrics::{FallbackMetrics, MonospaceMeasurer};
    use crate::markup::parse;

    fn table_layout(markup: &str, width: f32, sizing: TableSizing) -> TableLayout {
        let doc = parse(markup).unwrap();
        let measurer = MonospaceMeasurer::default();
        let mut metrics = Metrics::new(&measurer, FallbackMetrics::default());
        let mut ctx = BlockContext {
            metrics: &mut metrics,
            line_spacing: 1.0,
            block_spacing: 0.0,
            cell_padding: 4.0,
            sizing,
        };
        let id = doc.body()[0];
        match layout_block(&doc, id, width, &mut ctx) {
            Some(BlockLayout::Table(t)) => t,
            other => panic!("expected a table layout, got {other:?}"),
        }
    }

    #[test]
    fn test_equal_columns() {
        let t = table_layout("<table><tr><td>a</td><td>bbbbbbbb</td></tr></table>", 200.0, TableSizing::Equal);
        assert_eq!(t.columns, vec![100.0, 100.0]);
        assert_eq!(t.rows[0].cells[1].rect.x, 100.0);
    }

    #[test]
    fn test_content_columns_follow_preferred_widths() {
        // Preferred widths: 8 + 8 padding and 64 + 8 padding.
        let t = table_layout("<table><tr><td>a</td><td>bbbbbbbb</td></tr></table>", 176.0, TableSizing::Content);
        assert_eq!(t.columns, vec![32.0, 144.0]);
    }

    #[test]
    fn test_row_height_is_tallest_cell() {
        let t = table_layout(
            "<table><tr><td><p>one</p><p>two</p></td><td>x</td></tr><tr><td>y</td><td>z</td></tr></table>",
            200.0,
            TableSizing::Equal,
        );
        // Two lines of 16px plus 8px padding.
        assert_eq!(t.rows[0].height, 40.0);
        assert_eq!(t.rows[0].cells[1].rect.height, 40.0);
        assert_eq!(t.rows[1].y, 40.0);
        assert_eq!(t.height, 64.0);
    }
}
