//! Criterion benchmarks for the sparse coder and controller.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use sparse_td::prelude::*;

fn make_coder(num_visible: usize, num_hidden: usize, seed: u64) -> SparseCoder {
    let mut rng = Prng::new(seed);
    match SparseCoder::create_random(num_visible, num_hidden, &mut rng) {
        Ok(coder) => coder,
        Err(e) => panic!("failed to build bench coder: {e}"),
    }
}

fn make_input(num_visible: usize, seed: u64) -> Vec<f32> {
    let mut rng = Prng::new(seed);
    (0..num_visible).map(|_| rng.uniform(0.0, 1.0)).collect()
}

/// Benchmark step() with varying hidden layer sizes.
fn bench_step_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("coder_step_size");
    let rates = LearningRates::default();

    for hidden in [32, 64, 128, 256, 512].iter() {
        let visible = 64;
        group.throughput(Throughput::Elements(*hidden as u64));

        group.bench_with_input(BenchmarkId::new("scalar", hidden), hidden, |b, &hidden| {
            let mut coder = make_coder(visible, hidden, 42);
            let input = make_input(visible, 7);

            b.iter(|| black_box(coder.step(black_box(&input), &rates).unwrap_or(0.0)));
        });
    }

    group.finish();
}

/// Benchmark the individual passes at a fixed size.
fn bench_passes(c: &mut Criterion) {
    let mut group = c.benchmark_group("coder_pass");
    let rates = LearningRates::default();
    let (visible, hidden) = (64, 256);
    let input = make_input(visible, 7);

    group.bench_function("activate_256", |b| {
        let mut coder = make_coder(visible, hidden, 42);
        let _ = coder.set_input(&input);
        b.iter(|| {
            coder.activate();
            black_box(coder.hidden_units()[0].state)
        });
    });

    group.bench_function("activate_reconstruct_learn_256", |b| {
        let mut coder = make_coder(visible, hidden, 42);
        b.iter(|| {
            let _ = coder.set_input(&input);
            coder.activate();
            let _ = coder.reconstruct();
            let _ = coder.learn(&rates);
            black_box(coder.bias(0))
        });
    });

    group.finish();
}

/// Benchmark step() comparing execution tiers at a fixed size.
fn bench_step_tiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("coder_step_tier");
    let rates = LearningRates::default();
    let (visible, hidden) = (64, 512);
    let input = make_input(visible, 7);
    group.throughput(Throughput::Elements(hidden as u64));

    group.bench_function("scalar_512", |b| {
        let mut coder = make_coder(visible, hidden, 42).with_execution_tier(ExecutionTier::Scalar);
        b.iter(|| black_box(coder.step(&input, &rates).unwrap_or(0.0)));
    });

    // Parallel (falls back to scalar if feature not enabled)
    group.bench_function("parallel_512", |b| {
        let mut coder =
            make_coder(visible, hidden, 42).with_execution_tier(ExecutionTier::Parallel);
        b.iter(|| black_box(coder.step(&input, &rates).unwrap_or(0.0)));
    });

    group.finish();
}

/// Benchmark one controller tick over the reference region.
fn bench_controller_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller_step");
    let params = ControllerParams::default();

    for width in [3usize, 16, 64].iter() {
        group.bench_with_input(BenchmarkId::new("linear", width), width, |b, &width| {
            let mut rng = Prng::new(42);
            let topology = RegionTopology::with_input(width, 1);
            let mut ctl: Controller<LinearRegion> =
                match Controller::create_random(&topology, &ParameterRanges::default(), &mut rng) {
                    Ok(ctl) => ctl,
                    Err(e) => panic!("failed to build bench controller: {e}"),
                };
            let input = make_input(width, 7);
            let mut mask = vec![false; width];
            mask[width - 1] = true;
            let mut action = vec![0.0f32; width];

            b.iter(|| {
                let report = ctl.step(0.1, &input, &mask, &mut action, &params, &mut rng);
                black_box(report.map(|r| r.td_error).unwrap_or(0.0))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_step_sizes,
    bench_passes,
    bench_step_tiers,
    bench_controller_step
);
criterion_main!(benches);
