//! Throughput benchmarks

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use hil_harness::core::collector::{LineAssembler, ResponseWindow};
use hil_harness::core::verify::{evaluate, Expectation, Template, Tolerance};
use tokio_util::codec::Decoder;

fn register_dump(count: u16) -> Vec<String> {
    let mut lines = vec![
        "=== READING HOLDING REGISTERS ===".to_string(),
        format!("Address 0 to {}:", count - 1),
    ];
    lines.extend((0..count).map(|addr| format!("Reg[{addr}]: {}", u32::from(addr) * 7)));
    lines
}

fn assembler_benchmark(c: &mut Criterion) {
    let wire: Vec<u8> = register_dump(256)
        .iter()
        .flat_map(|l| format!("{l}\r\n").into_bytes())
        .collect();

    let mut group = c.benchmark_group("collector");
    group.throughput(Throughput::Bytes(wire.len() as u64));

    group.bench_function("assemble_lines", |b| {
        b.iter(|| {
            let mut assembler = LineAssembler::default();
            let mut buf = BytesMut::from(black_box(&wire[..]));
            let mut n = 0;
            while let Ok(Some(line)) = assembler.decode(&mut buf) {
                n += line.len();
            }
            black_box(n)
        })
    });

    group.finish();
}

fn verify_benchmark(c: &mut Criterion) {
    let window = ResponseWindow::from_text(register_dump(256));

    let mut group = c.benchmark_group("verify");

    group.bench_function("register_template", |b| {
        let template = Template::register(200);
        b.iter(|| black_box(template.extract(black_box(&window))))
    });

    group.bench_function("custom_template", |b| {
        let template = Template::custom("reg200", r"Reg\[200\]:\s*(?P<value>-?\d+)");
        b.iter(|| black_box(template.extract(black_box(&window))))
    });

    group.bench_function("numeric_expectation", |b| {
        let check = Expectation::numeric(Template::register(100), 700.0, Tolerance::Percentage(0.05));
        b.iter(|| black_box(evaluate(black_box(&window), &check)))
    });

    group.bench_function("line_with_all", |b| {
        let check = Expectation::line_with_all(["Reg[255]", "1785"]);
        b.iter(|| black_box(evaluate(black_box(&window), &check)))
    });

    group.finish();
}

criterion_group!(benches, assembler_benchmark, verify_benchmark);
criterion_main!(benches);
