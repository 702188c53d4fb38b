//! Benchmarks for factorization caching.
//!
//! Compares a full factorization, a numeric refactorization on the same
//! structure, and a solve against existing factors.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use switchyard_solver::{DenseLu, LinearSolver, SparseLu};

/// Grid-like MNA matrix: tridiagonal plus a long-range coupling per row.
fn grid(size: usize, g: f64) -> CscMatrix<f64> {
    let stride = (size as f64).sqrt() as usize;
    let mut coo = CooMatrix::new(size, size);
    for i in 0..size {
        coo.push(i, i, 4.0 * g + 0.01);
        for j in [i + 1, i + stride] {
            if j < size && j != i {
                coo.push(i, j, -g);
                coo.push(j, i, -g);
            }
        }
    }
    CscMatrix::from(&coo)
}

fn dense() -> Box<dyn LinearSolver> {
    Box::new(DenseLu::new())
}

fn sparse() -> Box<dyn LinearSolver> {
    Box::new(SparseLu::new())
}

type Make = fn() -> Box<dyn LinearSolver>;

fn backends() -> [(&'static str, Make); 2] {
    [("dense", dense as Make), ("sparse", sparse as Make)]
}

fn bench_factorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("factorize");
    for size in [50, 200, 400] {
        let a = grid(size, 1.0);
        for (name, make) in backends() {
            group.bench_with_input(BenchmarkId::new(name, size), &a, |bencher, a| {
                let mut backend = make();
                bencher.iter(|| backend.factorize(black_box(a)).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_refactorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("refactorize");
    for size in [50, 200, 400] {
        let a = grid(size, 1.0);
        let a2 = grid(size, 1.5);
        for (name, make) in backends() {
            group.bench_with_input(BenchmarkId::new(name, size), &a2, |bencher, a2| {
                let mut backend = make();
                backend.factorize(&a).unwrap();
                bencher.iter(|| backend.refactorize(black_box(a2)).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve");
    for size in [50, 200, 400] {
        let a = grid(size, 1.0);
        let b = DVector::from_fn(size, |i, _| (i % 7) as f64);
        for (name, make) in backends() {
            group.bench_with_input(BenchmarkId::new(name, size), &b, |bencher, b| {
                let mut backend = make();
                backend.factorize(&a).unwrap();
                bencher.iter(|| backend.solve(black_box(b)).unwrap());
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_factorize, bench_refactorize, bench_solve);
criterion_main!(benches);
