use std::sync::Arc;

use folio_core::markup::{parse, serialize};
use folio_core::{
    Action, CaretMove, Document, EditingController, EditorConfig, EditorSession, FormatDelta,
    LayoutConfig, LayoutEngine, LayoutParams, ManualClock, MonospaceMeasurer, Point, Position,
    Selection, TextRange, UndoConfig, ViewMode,
};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn session_with_clock(doc: Document) -> (EditorSession, ManualClock) {
    let clock = ManualClock::new();
    let session = EditorSession::with_clock(
        doc,
        Arc::new(MonospaceMeasurer::default()),
        EditorConfig::default(),
        Arc::new(clock.clone()),
    );
    (session, clock)
}

fn random_caret(rng: &mut StdRng, doc: &Document) -> Position {
    let paragraphs = doc.paragraphs_in_order();
    let p = paragraphs[rng.gen_range(0..paragraphs.len())];
    let len = doc.paragraph_len(p).unwrap();
    Position::new(p, rng.gen_range(0..=len))
}

#[test]
fn test_random_edits_then_undos_restore_markup() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut doc = parse("<p>It was a <b>dark</b> and stormy night.</p><p align=\"center\">Chapter One</p>").unwrap();
    let before = serialize(&doc);
    let clock = ManualClock::new();
    let mut editor = EditingController::with_clock(&doc, &UndoConfig::default(), Arc::new(clock.clone()));

    for _ in 0..200 {
        let caret = random_caret(&mut rng, &doc);
        editor.set_selection(&doc, 0, Selection::caret(caret)).unwrap();
        clock.advance(rng.gen_range(0..2000));
        // Commands the document rejects leave no trace, so their errors are not interesting.
        let _ = match rng.gen_range(0..7) {
            0 | 1 => editor.type_text(&mut doc, 0, ["a", "xyz", " ", "é"][rng.gen_range(0..4)]),
            2 => editor.delete_backward(&mut doc, 0),
            3 => editor.delete_forward(&mut doc, 0),
            4 => editor.insert_paragraph_break(&mut doc, 0),
            5 => {
                let len = doc.paragraph_len(caret.paragraph).unwrap();
                let end = rng.gen_range(caret.offset..=len);
                editor
                    .set_selection(&doc, 0, Selection::new(caret, Position::new(caret.paragraph, end)))
                    .unwrap();
                editor.toggle_format(&mut doc, 0, FormatDelta::italic())
            }
            _ => editor.insert_table(&mut doc, 0, 1, 2),
        };
    }

    assert!(editor.undo_depth() > 0);
    for _ in 0..editor.undo_depth() {
        editor.undo(&mut doc).unwrap();
    }
    assert_eq!(serialize(&doc), before);
}

#[test]
fn test_every_caret_rect_hits_back_to_its_position() {
    let doc = parse(
        "<p>Plain <b>bold</b> and <obj kind=\"image\">fig.png</obj> inline</p>\
         <p align=\"center\">Center me please</p>\
         <p align=\"right\">right</p>\
         <p></p>",
    )
    .unwrap();
    let config = LayoutConfig {
        viewport_height: 1000.0,
        ..LayoutConfig::default()
    };
    let engine = LayoutEngine::new(
        &doc,
        Arc::new(MonospaceMeasurer::default()),
        config,
        LayoutParams::continuous(120.0),
    );
    for p in doc.paragraphs_in_order() {
        for offset in 0..=doc.paragraph_len(p).unwrap() {
            let pos = Position::new(p, offset);
            let rect = engine.caret_rect(&doc, pos).unwrap();
            let hit = engine.hit_test(Point::new(rect.x + 0.5, rect.y + rect.height / 2.0));
            assert_eq!(hit, Some(pos), "offset {offset} of {p:?}");
        }
    }
}

#[test]
fn test_toggle_on_then_off_restores_runs() {
    let mut doc = parse("<p>a<i>bc</i>d<b>ef</b><font size=\"18\">gh</font></p>").unwrap();
    let before = doc.content();
    let p = doc.body()[0];
    let mut editor = EditingController::new(&doc, &UndoConfig::default());
    editor
        .set_selection(&doc, 0, Selection::new(Position::new(p, 1), Position::new(p, 7)))
        .unwrap();
    editor.toggle_format(&mut doc, 0, FormatDelta::underline()).unwrap();
    assert_ne!(doc.content(), before);
    editor.toggle_format(&mut doc, 0, FormatDelta::underline()).unwrap();
    assert_eq!(doc.content(), before);
}

#[test]
fn test_live_layout_is_bounded_on_a_hundred_thousand_words() {
    let paragraph = "the quick brown fox jumps over the lazy dog again and again until the evening light fades away";
    let words_per_paragraph = paragraph.split_whitespace().count();
    let count = 100_000 / words_per_paragraph + 1;
    let text = vec![paragraph; count].join("\n");
    let small_text = vec![paragraph; 50].join("\n");

    let measurer = Arc::new(MonospaceMeasurer::default());
    let config = LayoutConfig::default();
    let big_doc = Document::from_plain_text(&text);
    let small_doc = Document::from_plain_text(&small_text);
    assert!(big_doc.plain_text().split_whitespace().count() >= 100_000);

    let mut big = LayoutEngine::new(&big_doc, measurer.clone(), config.clone(), LayoutParams::continuous(800.0));
    let small = LayoutEngine::new(&small_doc, measurer, config.clone(), LayoutParams::continuous(800.0));
    assert_eq!(big.live_block_count(), small.live_block_count());
    assert_eq!(big.live_box_count(), small.live_box_count());

    // One 16px line per paragraph plus 8px spacing: at most 600 / 24 + 1 blocks are visible.
    let bound = 600 / 24 + 1 + 2 * config.lookahead_blocks + 1;
    for fraction in [0.25, 0.5, 0.999] {
        big.reset_stats();
        let top = big.total_height() * fraction;
        big.set_viewport(&big_doc, top, 600.0);
        assert!(big.live_block_count() <= bound, "{} live blocks", big.live_block_count());
        // Estimated heights can widen the first pass before measurements narrow it.
        assert!(big.stats().blocks_laid_out <= 2 * bound as u64);
        assert!(big.live_box_count() <= small.live_box_count() * 2);
        assert!(!big.visible_boxes().is_empty());
    }
}

#[test]
fn test_bold_hello_serializes_with_mark() {
    let mut doc = Document::from_plain_text("Hello world");
    let p = doc.body()[0];
    let mut editor = EditingController::new(&doc, &UndoConfig::default());
    editor
        .set_selection(&doc, 0, Selection::new(Position::new(p, 0), Position::new(p, 5)))
        .unwrap();
    editor.toggle_format(&mut doc, 0, FormatDelta::bold()).unwrap();
    assert_eq!(serialize(&doc), "<doc>\n<p><b>Hello</b> world</p>\n</doc>\n");
}

#[test]
fn test_append_then_undo_restores_hello() {
    let (mut session, _) = session_with_clock(Document::from_plain_text("Hello"));
    session
        .execute(Action::MoveCaret {
            movement: CaretMove::DocumentEnd,
            extend: false,
        })
        .unwrap();
    session.execute(Action::InsertText(" world".into())).unwrap();
    assert_eq!(session.document().plain_text(), "Hello world");
    session.execute(Action::Undo).unwrap();
    assert_eq!(session.document().plain_text(), "Hello");
}

#[test]
fn test_table_survives_codec_round_trip() {
    let (mut session, clock) = session_with_clock(Document::from_plain_text("Intro"));
    session
        .execute(Action::MoveCaret {
            movement: CaretMove::DocumentEnd,
            extend: false,
        })
        .unwrap();
    session.execute(Action::InsertTable { rows: 2, cols: 2 }).unwrap();

    let table_id = *session
        .document()
        .body()
        .iter()
        .find(|id| session.document().table(**id).is_some())
        .unwrap();
    let cells: Vec<_> = session.document().table(table_id).unwrap().rows.concat();
    assert_eq!(cells.len(), 4);
    for (i, cell) in cells.iter().enumerate() {
        let paragraph = session.document().cell(*cell).unwrap().blocks[0];
        session
            .execute(Action::Select(Selection::caret(Position::new(paragraph, 0))))
            .unwrap();
        session.execute(Action::InsertText(format!("cell {i}"))).unwrap();
        clock.advance(5_000);
    }

    let text = session.to_markup();
    let reparsed = parse(&text).unwrap();
    assert_eq!(&reparsed, session.document());
    let table = reparsed
        .body()
        .iter()
        .find_map(|id| reparsed.table(*id))
        .unwrap();
    assert_eq!(table.rows.len(), 2);
    assert!(table.rows.iter().all(|row| row.len() == 2));
    let texts: Vec<String> = table
        .rows
        .concat()
        .iter()
        .map(|cell| reparsed.paragraph_text(reparsed.cell(*cell).unwrap().blocks[0]).unwrap())
        .collect();
    assert_eq!(texts, vec!["cell 0", "cell 1", "cell 2", "cell 3"]);
}

#[test]
fn test_view_mode_switches_leave_document_alone() {
    let (mut session, _) = session_with_clock(parse("<p>One <i>two</i></p><p>three</p>").unwrap());
    let p = session.document().body()[1];
    let held = Selection::new(Position::new(p, 1), Position::new(p, 4));
    session.execute(Action::Select(held)).unwrap();
    let hint = session
        .mark_questionable(TextRange::in_paragraph(p, 0, 5), "check")
        .unwrap();
    let before = session.to_markup();

    for mode in [ViewMode::Page, ViewMode::Continuous] {
        session.execute(Action::SwitchViewMode(mode)).unwrap();
    }

    assert_eq!(session.to_markup(), before);
    assert_eq!(session.selection(), held);
    let ranges = session.questionable_ranges();
    assert_eq!(ranges.len(), 1);
    assert_eq!((ranges[0].id, ranges[0].range), (hint, TextRange::in_paragraph(p, 0, 5)));
    assert!(!session.is_modified());
}

#[test]
fn test_typing_coalesces_only_within_window() {
    let (mut session, clock) = session_with_clock(Document::new());
    for ch in ["a", "b", "c"] {
        session.execute(Action::InsertText(ch.into())).unwrap();
        clock.advance(300);
    }
    assert_eq!(session.editor().undo_depth(), 1);
    session.execute(Action::Undo).unwrap();
    assert_eq!(session.document().plain_text(), "");

    let (mut session, clock) = session_with_clock(Document::new());
    session.execute(Action::InsertText("a".into())).unwrap();
    clock.advance(1_001);
    session.execute(Action::InsertText("b".into())).unwrap();
    assert_eq!(session.editor().undo_depth(), 2);
    session.execute(Action::Undo).unwrap();
    assert_eq!(session.document().plain_text(), "a");
}
