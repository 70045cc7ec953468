use block_scraper::document::{MemoryDocument, Rect};
use block_scraper::{sanitize_filename, validate_url, BlockExtractor, PageRequest};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use tokio::runtime::Runtime;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

/// A landing page with `sections` sections, each holding a few components
/// that repeat styles, and every other section sharing a group.
fn landing_page(sections: usize) -> MemoryDocument {
    let mut doc = MemoryDocument::new();
    let root = doc.root();

    for i in 0..sections {
        let group = format!("group-{}", i / 2);
        let section = doc.append_element(
            root,
            "section",
            &[("style", "margin: 0; -block-section: 1"), ("data-group", group.as_str())],
        );
        doc.set_rect(section, Rect::new(0.0, 600.0 * i as f64, 1500.0, 600.0));

        for j in 0..6 {
            let style = format!("card-{}", j % 3);
            let component = doc.append_element(
                section,
                "div",
                &[("style", "-block-component: 1"), ("data-style", style.as_str())],
            );
            doc.append_text(component, &format!("Section {} item {}", i, j));
            doc.set_rect(component, Rect::new(250.0 * j as f64, 600.0 * i as f64, 250.0, 200.0));
        }

        let code = doc.append_element(section, "pre", &[("class", "code-edit")]);
        doc.append_text(code, "\n    npm install\n  ");
    }

    doc
}

fn benchmark_extraction(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let extractor = BlockExtractor::default();

    let mut group = c.benchmark_group("extraction");
    configure_fast_group(&mut group);

    for sections in [4, 32, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(sections), &sections, |b, &sections| {
            b.iter_batched(
                || landing_page(sections),
                |mut doc| {
                    let blocks = rt.block_on(extractor.extract(&mut doc)).unwrap();
                    black_box(blocks);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn benchmark_report_assembly(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut doc = landing_page(32);
    let blocks = rt.block_on(BlockExtractor::default().extract(&mut doc)).unwrap();
    let image = vec![0u8; 512 * 1024];

    let mut group = c.benchmark_group("report");
    configure_fast_group(&mut group);

    group.bench_function("assemble_and_serialize", |b| {
        b.iter(|| {
            let report = blocks.clone().into_report(&image);
            black_box(serde_json::to_string(&report).unwrap());
        });
    });

    group.finish();
}

fn benchmark_request_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("request");
    configure_fast_group(&mut group);

    let body = r#"{"url": "https://example.com", "options": {"width": "1280", "height": 720, "fullPage": "false", "wait": 250}}"#;

    group.bench_function("parse", |b| {
        b.iter(|| {
            let request: PageRequest = serde_json::from_str(black_box(body)).unwrap();
            black_box(request.source().unwrap());
        });
    });

    group.finish();
}

fn benchmark_utilities(c: &mut Criterion) {
    let mut group = c.benchmark_group("utilities");
    configure_fast_group(&mut group);

    group.bench_function("validate_url", |b| {
        b.iter(|| {
            for url in ["https://example.com", "http://example.com/path", "invalid-url"] {
                let _ = black_box(validate_url(url));
            }
        });
    });

    group.bench_function("sanitize_filename", |b| {
        b.iter(|| black_box(sanitize_filename("example.com/docs:intro?.png")));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_extraction,
    benchmark_report_assembly,
    benchmark_request_parsing,
    benchmark_utilities
);
criterion_main!(benches);
