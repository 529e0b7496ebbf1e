//! Benchmarks for the per-tick hot path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use outrig::message::wire;
use outrig::process::{resolve, MockProcess};
use outrig::transform::{CompiledExpr, FormatSpec, TransformPipeline};
use outrig::types::{AddressKind, OutputDescriptor, ResolvedSample, Value, ValueKind};

/// A process with one readable region and a value at every slot
fn seeded_process(slots: u64) -> MockProcess {
    let mut process = MockProcess::new("bench.exe");
    process.add_region(0x1000, (slots as usize) * 8 + 64);
    for i in 0..slots {
        process.write_value(0x1000 + i * 8, (i * 3) as u32);
    }
    process
}

fn direct_descriptor(index: u64) -> OutputDescriptor {
    OutputDescriptor::new(
        format!("out{index}"),
        AddressKind::Absolute {
            address: 0x1000 + index * 8,
        },
        ValueKind::U32,
    )
}

fn bench_direct_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("direct_resolution");

    group.throughput(Throughput::Elements(1));
    group.bench_function("read_u32", |b| {
        let mut process = seeded_process(1);
        let descriptor = direct_descriptor(0);
        b.iter(|| black_box(resolve(&mut process, &descriptor, 8)));
    });

    for size in [16, 64, 256].iter() {
        let descriptors: Vec<OutputDescriptor> =
            (0..*size as u64).map(direct_descriptor).collect();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(
            BenchmarkId::new("read_batch", size),
            &descriptors,
            |b, descriptors| {
                let mut process = seeded_process(256);
                b.iter(|| {
                    for descriptor in descriptors {
                        black_box(resolve(&mut process, descriptor, 8));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_pointer_chain_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("pointer_chain_resolution");

    for depth in [1usize, 2, 4].iter() {
        // One hop node per chain step, value at the last stop
        let mut process = MockProcess::new("bench.exe");
        process.add_region(0x1000, 0x10000);
        let mut addr = 0x1000u64;
        for step in 0..*depth {
            let next = 0x2000 + step as u64 * 0x1000;
            process.write_value(addr, next);
            addr = next + 0x10;
        }
        process.write_value(addr, 777u32);

        let descriptor = OutputDescriptor::new(
            "chained",
            AddressKind::Absolute { address: 0x1000 },
            ValueKind::U32,
        )
        .with_pointer_chain(vec![0x10; *depth]);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("depth", depth),
            &descriptor,
            |b, descriptor| {
                b.iter(|| black_box(resolve(&mut process, descriptor, 8)));
            },
        );
    }

    group.finish();
}

fn bench_expression_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("expression_eval");

    let cases = [
        ("scale", "value * 2"),
        ("gauge", "clamp(value / 255 * 100, 0, 100)"),
        ("threshold", "value > 128"),
        ("nested", "max(min(round(value / 3), 200), sqrt(value))"),
    ];

    for (name, source) in cases.iter() {
        let expr = CompiledExpr::compile(source).expect("bench expression compiles");
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("eval", name), &expr, |b, expr| {
            let mut x = 0.0f64;
            b.iter(|| {
                x += 1.0;
                black_box(expr.eval(black_box(x)))
            });
        });
    }

    group.bench_function("compile", |b| {
        b.iter(|| black_box(CompiledExpr::compile("clamp(value / 255 * 100, 0, 100)")));
    });

    group.finish();
}

fn bench_format_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_rendering");

    let cases = [("decimal", "000"), ("template", "Speed: {value} km/h")];

    for (name, pattern) in cases.iter() {
        let spec = FormatSpec::compile(pattern).expect("bench format compiles");
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("format", name), &spec, |b, spec| {
            let value = Value::Number(87.0);
            b.iter(|| black_box(spec.format(black_box(&value))));
        });
    }

    group.finish();
}

fn bench_transform_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform_pipeline");

    for size in [16, 64, 256].iter() {
        let descriptors: Vec<OutputDescriptor> = (0..*size as u64)
            .map(|i| {
                direct_descriptor(i)
                    .with_transform("value * 2 + 1")
                    .with_format("Out: {value}")
            })
            .collect();
        let mut pipeline = TransformPipeline::new();
        pipeline.load_outputs(&descriptors);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(
            BenchmarkId::new("apply", size),
            &descriptors,
            |b, descriptors| {
                b.iter(|| {
                    for descriptor in descriptors {
                        let sample =
                            ResolvedSample::ok(&descriptor.label, Value::Number(128.0));
                        black_box(pipeline.apply(descriptor, &sample));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_wire_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_parsing");

    group.throughput(Throughput::Elements(1));
    group.bench_function("kv_value_line", |b| {
        b.iter(|| black_box(wire::parse_kv_line(black_box("lamp0=255"))));
    });
    group.bench_function("kv_text_line", |b| {
        b.iter(|| black_box(wire::parse_kv_line(black_box("__GAME_NAME__=daytona"))));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_direct_resolution,
    bench_pointer_chain_resolution,
    bench_expression_eval,
    bench_format_rendering,
    bench_transform_pipeline,
    bench_wire_parsing,
);

criterion_main!(benches);
