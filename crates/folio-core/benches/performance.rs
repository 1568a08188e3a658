use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use folio_core::markup::{parse, serialize};
use folio_core::{
    Action, Document, EditorConfig, EditorSession, LayoutConfig, LayoutEngine,
    LayoutParams, MonospaceMeasurer, Position, Selection,
};

fn manuscript(paragraphs: usize) -> String {
    let mut out = String::with_capacity(paragraphs * 120);
    for i in 0..paragraphs {
        out.push_str(&format!(
            "{i:06} It was the best of times, it was the worst of times, it was the age of wisdom.\n"
        ));
    }
    out.pop();
    out
}

fn bench_markup_round_trip(c: &mut Criterion) {
    let doc = Document::from_plain_text(&manuscript(10_000));
    let text = serialize(&doc);
    c.bench_function("markup/parse_10k_paragraphs", |b| {
        b.iter(|| black_box(parse(black_box(&text)).unwrap().body().len()))
    });
    c.bench_function("markup/serialize_10k_paragraphs", |b| {
        b.iter(|| black_box(serialize(black_box(&doc)).len()))
    });
}

fn bench_typing_in_middle(c: &mut Criterion) {
    let text = manuscript(10_000);
    c.bench_function("typing_middle/100_keystrokes", |b| {
        b.iter_batched(
            || {
                let mut session = EditorSession::new(
                    Document::from_plain_text(&text),
                    Arc::new(MonospaceMeasurer::default()),
                    EditorConfig::default(),
                );
                let middle = session.document().body()[5_000];
                session
                    .execute(Action::Select(Selection::caret(Position::new(middle, 10))))
                    .unwrap();
                session
            },
            |mut session| {
                for _ in 0..100 {
                    session.execute(Action::InsertText("x".to_string())).unwrap();
                }
                black_box(session.generation());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_virtual_scroll(c: &mut Criterion) {
    let doc = Document::from_plain_text(&manuscript(20_000));
    let mut engine = LayoutEngine::new(
        &doc,
        Arc::new(MonospaceMeasurer::default()),
        LayoutConfig::default(),
        LayoutParams::continuous(800.0),
    );
    let total = engine.total_height();
    let mut step = 0usize;
    c.bench_function("layout/jump_scroll_20k_paragraphs", |b| {
        b.iter(|| {
            step = (step + 7919) % 1000;
            engine.set_viewport(&doc, total * step as f32 / 1000.0, 600.0);
            black_box(engine.visible_boxes().len());
        })
    });
}

criterion_group!(
    benches,
    bench_markup_round_trip,
    bench_typing_in_middle,
    bench_virtual_scroll
);
criterion_main!(benches);
