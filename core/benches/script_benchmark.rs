/// Parser and segmenter benchmarks using Criterion
///
/// Run with: cargo bench --bench script_benchmark
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use plastic_core::script::{parse_lines, segments};

fn make_script(turns: usize) -> String {
    let mut script = String::from("stage directions before the first speaker\n");
    for i in 0..turns {
        let speaker = if i % 2 == 0 { "[HELIO]" } else { "[LUNA]" };
        script.push_str(speaker);
        script.push('\n');
        script.push_str("Lovely weather for mannequins. {pause 0.5} Don't you think?\n");
        script.push_str("I certainly do.\n\n");
    }
    script
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_lines");
    for turns in [10, 100, 1_000].iter() {
        let script = make_script(*turns);
        group.throughput(Throughput::Bytes(script.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(turns), &script, |b, s| {
            b.iter(|| parse_lines(black_box(s)))
        });
    }
    group.finish();
}

fn bench_segments(c: &mut Criterion) {
    let plain = "Good evening, and welcome to the window display.\n";
    let paced = "Good evening. {pause 1} And welcome. {pause 0.5s} To the window {display}.\n";
    c.bench_function("segments_plain", |b| b.iter(|| segments(black_box(plain))));
    c.bench_function("segments_paced", |b| b.iter(|| segments(black_box(paced))));
}

criterion_group!(benches, bench_parse, bench_segments);
criterion_main!(benches);
