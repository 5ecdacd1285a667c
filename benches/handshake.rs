// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Benchmarks for the cycle-loop and comparator hot paths.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use heddle::difftest::{compare, Difftest};
use heddle::mem::PhysMem;
use heddle::profile::CoreProfile;
use heddle::scripted::{ScriptOp, ScriptedCore, ScriptedRef};
use heddle::session::Session;
use heddle::state::CpuContext;

fn scripted_session(n: usize, with_ref: bool) -> Session<ScriptedCore> {
    let profile = CoreProfile::default();
    let reset_vector = profile.reset_vector;
    let mut script = vec![ScriptOp::RegWrite { rd: 5, value: 42 }; n];
    script.push(ScriptOp::Break);
    let core = ScriptedCore::new(script, &profile);
    let mut s = Session::new(core, profile, vec![0u8; 16]).unwrap();
    if with_ref {
        let timeline: Vec<CpuContext> = (1..=n)
            .map(|i| {
                let mut c = CpuContext::default();
                c.pc = reset_vector + 4 * i as u32;
                c.gpr[5] = 42;
                c.csr.mstatus = 0x1800;
                c
            })
            .collect();
        s.attach_difftest(Difftest::new(Box::new(ScriptedRef::new(timeline))));
    }
    s.start();
    s
}

fn run_to_end(mut s: Session<ScriptedCore>) -> u64 {
    while !s.step_instruction().is_terminal() {}
    s.instret()
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");

    for n in [16usize, 64, 256] {
        group.bench_with_input(BenchmarkId::new("scripted_run", n), &n, |b, &n| {
            b.iter_batched(
                || scripted_session(n, false),
                |s| black_box(run_to_end(s)),
                BatchSize::SmallInput,
            );
        });
    }

    group.bench_with_input(
        BenchmarkId::new("scripted_run_difftest", 64),
        &64usize,
        |b, &n| {
            b.iter_batched(
                || scripted_session(n, true),
                |s| black_box(run_to_end(s)),
                BatchSize::SmallInput,
            );
        },
    );

    group.finish();
}

fn bench_mem(c: &mut Criterion) {
    let mut group = c.benchmark_group("mem");

    group.bench_function("masked_writes", |b| {
        let mut m = PhysMem::new(0x2000_0000, 4096);
        let mut i = 0u32;
        b.iter(|| {
            let addr = 0x2000_0000 + (i % 1024) * 4;
            let mask = ((i % 15) + 1) as u8;
            m.write_bytes(black_box(addr), black_box(0xA5A5_5A5A), mask);
            i = i.wrapping_add(1);
        });
    });

    group.bench_function("read_word", |b| {
        let mut m = PhysMem::new(0x2000_0000, 4096);
        for w in 0..1024u32 {
            m.write_bytes(0x2000_0000 + w * 4, w.wrapping_mul(0x9E37_79B9), 0b1111);
        }
        let mut i = 0u32;
        b.iter(|| {
            let addr = 0x2000_0000 + (i % 1024) * 4;
            i = i.wrapping_add(1);
            black_box(m.read_word(black_box(addr)))
        });
    });

    group.finish();
}

fn bench_compare(c: &mut Criterion) {
    c.bench_function("compare_contexts", |b| {
        let mut a = CpuContext::default();
        for i in 0..32 {
            a.gpr[i] = (i as u32) * 0x1111;
        }
        a.pc = 0x2000_0040;
        a.csr.mstatus = 0x1800;
        let d = a;
        b.iter(|| black_box(compare(black_box(&a), black_box(&d))));
    });
}

criterion_group!(benches, bench_step, bench_mem, bench_compare);
criterion_main!(benches);
