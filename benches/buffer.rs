//! Buffer and input handler benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use vtcore::buffer::{AttributeData, BufferLine, CellData, CircularList};
use vtcore::InputHandler;

fn bench_print(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer");

    let text = "Hello, World! ".repeat(200);
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("print_chars", |b| {
        b.iter(|| {
            let mut handler = InputHandler::new(80, 24, 0).ok()?;
            handler.parse_str(black_box(&text)).ok();
            Some(black_box(handler.buffer().x))
        })
    });

    group.finish();
}

fn bench_scroll(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer");

    let lines: String = (0..1000)
        .map(|i| format!("Line {}: Some text content here\r\n", i))
        .collect();

    group.bench_function("scroll_into_scrollback", |b| {
        b.iter(|| {
            let mut handler = InputHandler::new(80, 24, 500).ok()?;
            handler.parse_str(black_box(&lines)).ok();
            Some(black_box(handler.buffer().ybase))
        })
    });

    group.bench_function("scroll_region", |b| {
        let input = format!("\x1b[5;20r{}", lines);
        b.iter(|| {
            let mut handler = InputHandler::new(80, 24, 500).ok()?;
            handler.parse_str(black_box(&input)).ok();
            Some(black_box(handler.buffer().ybase))
        })
    });

    group.finish();
}

fn bench_sgr(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer");

    let input = "\x1b[1;38;2;10;20;30;48;5;100mX\x1b[0m\x1b[4:3;58:5:9mY\x1b[m".repeat(200);

    group.bench_function("sgr_apply", |b| {
        b.iter(|| {
            let mut handler = InputHandler::new(80, 24, 0).ok()?;
            handler.parse_str(black_box(&input)).ok();
            Some(black_box(handler.buffer().cur_attr.fg))
        })
    });

    group.finish();
}

fn bench_line_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer");

    let fill = CellData::from_char("x", None, 0);
    let blank = CellData::whitespace(AttributeData::default());

    group.bench_function("line_insert_delete", |b| {
        b.iter(|| {
            let mut line = BufferLine::new(200, Some(&fill), false);
            for pos in 0..50 {
                line.insert_cells(pos, 3, &blank);
                line.delete_cells(pos, 2, &blank);
            }
            black_box(line.translate_to_string(true, 0, None, None))
        })
    });

    group.bench_function("circular_list_push", |b| {
        b.iter(|| {
            let mut list = CircularList::new(1000);
            for i in 0..5000usize {
                list.push(i);
            }
            black_box(list.len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_print, bench_scroll, bench_sgr, bench_line_ops);

criterion_main!(benches);
