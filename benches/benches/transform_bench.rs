//! # Transform Benchmarks
//!
//! Measures a single class pass (plain and Kotlin classes) and a full
//! in-memory archive rewrite.
//!
//! Run: `cargo bench --bench transform_bench`

use std::io::{Cursor, Write};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fence_core::classfile::access;
use fence_core::{rewrite_archive, ClassFileBuilder, ClassMetadataBuilder, Pass, TransformPlan};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MESSAGE: &str = "benchmark";

fn java_class(methods: usize) -> Vec<u8> {
    let mut builder = ClassFileBuilder::new("com/example/Api").field(access::PRIVATE, "state", "I");
    for i in 0..methods {
        builder = builder.method(access::PUBLIC, &format!("call{}", i), "(Ljava/lang/String;I)V");
    }
    builder.build().unwrap().to_bytes()
}

fn kotlin_class() -> Vec<u8> {
    let metadata = ClassMetadataBuilder::new("com/example/Service")
        .function("start", Some("()V"))
        .internal_function("compute", Some("()I"))
        .property("count", "I", Some(("getCount", "()I")))
        .constructor("()V")
        .build();
    ClassFileBuilder::new("com/example/Service")
        .field(access::PRIVATE, "count", "I")
        .method(access::PUBLIC, "<init>", "()V")
        .method(access::PUBLIC | access::FINAL, "start", "()V")
        .method(access::PUBLIC | access::FINAL, "compute$main", "()I")
        .method(access::PUBLIC | access::FINAL, "getCount", "()I")
        .metadata(metadata)
        .build()
        .unwrap()
        .to_bytes()
}

fn bench_class_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("class_pass");
    let rules = Pass::parse("class com.example.Api { public void call*(...); }", MESSAGE).unwrap().rules;

    for methods in [4, 32, 256] {
        let bytes = java_class(methods);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("java_methods", methods), &bytes, |b, bytes| {
            b.iter(|| black_box(fence_core::transform_class(bytes, &rules).unwrap()))
        });
    }

    let untouched = Pass::parse("class org.other.**", MESSAGE).unwrap().rules;
    let bytes = java_class(32);
    group.bench_function("unmatched", |b| {
        b.iter(|| black_box(fence_core::transform_class(&bytes, &untouched).unwrap()))
    });

    let kotlin = kotlin_class();
    let rules = Pass::parse("class com.example.Service { private int count; *** compute$main(); }", MESSAGE)
        .unwrap()
        .rules;
    group.bench_function("kotlin_metadata", |b| {
        b.iter(|| black_box(fence_core::transform_class(&kotlin, &rules).unwrap()))
    });
    group.finish();
}

fn bench_archive(c: &mut Criterion) {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let class = java_class(16);
    for i in 0..100 {
        writer.start_file(format!("com/example/gen/C{}.class", i), SimpleFileOptions::default()).unwrap();
        writer.write_all(&class).unwrap();
        writer.start_file(format!("com/example/gen/r{}.txt", i), SimpleFileOptions::default()).unwrap();
        writer.write_all(b"resource").unwrap();
    }
    let archive = writer.finish().unwrap().into_inner();

    let mut group = c.benchmark_group("archive");
    group.throughput(Throughput::Bytes(archive.len() as u64));
    for (name, pattern) in [("copy_only", "class org.other.**"), ("all_classes", "class **")] {
        let plan = TransformPlan::from_patterns(&[pattern], MESSAGE).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| {
                let (output, report) =
                    rewrite_archive(Cursor::new(archive.as_slice()), Cursor::new(Vec::new()), &plan).unwrap();
                black_box((output, report))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_class_pass, bench_archive);
criterion_main!(benches);
