//! # Pattern Benchmarks
//!
//! Measures keep-pattern parsing and name/descriptor matching.
//!
//! Run: `cargo bench --bench matcher_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fence_core::keep::MemberKind;
use fence_core::matcher::NamePattern;
use fence_core::parse;

const PATTERNS: &[(&str, &str)] = &[
    ("class", "class com.example.**"),
    ("members", "class com.example.Api { public void *(); !private int count; }"),
    (
        "mixed",
        "public !final class com.example.*, !com.example.internal.** extends com.example.Base {\n\
         <init>(...);\n\
         public *** get*(java.lang.String, int[], ...);\n\
         static final % *;\n\
         }",
    ),
];

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for (name, pattern) in PATTERNS {
        group.bench_with_input(BenchmarkId::from_parameter(name), pattern, |b, pattern| {
            b.iter(|| black_box(parse(pattern).unwrap()))
        });
    }
    group.finish();
}

fn bench_class_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("class_names");
    let names = [
        "com/example/Api",
        "com/example/internal/deep/nested/Helper",
        "org/other/Thing",
        "com/example/Api$Companion",
    ];
    for pattern in ["com.example.*", "com.example.**", "com.*.A?i", "**"] {
        let compiled = NamePattern::class_name(pattern);
        group.bench_function(pattern, |b| {
            b.iter(|| {
                for name in &names {
                    black_box(compiled.matches(name));
                }
            })
        });
    }
    group.finish();
}

fn bench_members(c: &mut Criterion) {
    let spec = &parse(PATTERNS[2].1).unwrap()[0];
    let members = [
        (MemberKind::Method, "<init>", "()V", 0x0001),
        (MemberKind::Method, "getName", "(Ljava/lang/String;[I)Ljava/lang/String;", 0x0001),
        (MemberKind::Method, "getName", "(Ljava/lang/String;[IJD)V", 0x0001),
        (MemberKind::Field, "MAX", "I", 0x0019),
        (MemberKind::Field, "name", "Ljava/lang/String;", 0x0002),
    ];
    c.bench_function("match_members", |b| {
        b.iter(|| {
            for (kind, name, descriptor, flags) in &members {
                black_box(spec.matches_member(*kind, name, descriptor, *flags));
            }
        })
    });
}

criterion_group!(benches, bench_parse, bench_class_names, bench_members);
criterion_main!(benches);
