use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pixelgrade_core::content::evaluate_content;
use pixelgrade_core::model::CodeTriple;
use pixelgrade_core::semantic::RoleCatalogue;
use pixelgrade_core::similarity::{levenshtein, similarity};

const CARD_HTML: &str = r#"
<div class="card">
  <img class="product-image" src="/img/headphones.png" alt="Wireless Headphones">
  <h1 class="title">Wireless Headphones</h1>
  <p class="description">Noise cancelling over-ear headphones with a long battery life.</p>
  <span class="price">$99.99</span>
  <button class="btn">Add to cart</button>
</div>"#;

const CARD_CSS: &str = ".card { padding: 16px; border-radius: 8px; box-shadow: 0 1px 4px #0003; }";

fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");

    group.bench_function("levenshtein/short", |b| {
        b.iter(|| levenshtein(black_box("wireless headphones"), black_box("wireles headphone")))
    });

    let long_a = "noise cancelling over-ear headphones with a long battery life ".repeat(4);
    let long_b = "noise-cancelling on-ear headphones with long lasting battery ".repeat(4);
    group.bench_function("similarity/long", |b| {
        b.iter(|| similarity(black_box(&long_a), black_box(&long_b)))
    });

    group.finish();
}

fn bench_stages(c: &mut Criterion) {
    let expected = CodeTriple::new(CARD_HTML, CARD_CSS, "");
    let candidate = CodeTriple::new(
        CARD_HTML.replace(r#"<span class="price">$99.99</span>"#, "<b>$89.99</b>"),
        CARD_CSS,
        "",
    );
    let catalogue = RoleCatalogue::builtin().unwrap();

    let mut group = c.benchmark_group("stages");

    group.bench_function("content", |b| {
        b.iter(|| evaluate_content(black_box(&candidate), black_box(&expected)))
    });

    group.bench_function("structure", |b| {
        b.iter(|| catalogue.evaluate(black_box(&candidate), black_box(&expected), 70))
    });

    group.finish();
}

criterion_group!(benches, bench_similarity, bench_stages);
criterion_main!(benches);
