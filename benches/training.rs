use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ispc_reduce::config::TrainerConfig;
use ispc_reduce::records::{FeatureSet, INPUT_FEATURES, META_COLUMNS, RecordTable, TARGETS};
use ispc_reduce::ridge::fit_ridge;
use ispc_reduce::trainer::Trainer;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_design(rows: usize, cols: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED_F64 + rows as u64);
    let x = Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-1.0..1.0));
    let y = Array1::from_shape_fn(rows, |i| x.row(i).sum() + rng.gen_range(-0.1..0.1));
    (x, y)
}

fn random_table(rows: usize) -> RecordTable {
    let mut rng = ChaCha8Rng::seed_from_u64(rows as u64);
    let mut table = RecordTable::new(rows);
    for name in INPUT_FEATURES.iter().chain(TARGETS.iter()) {
        let column = (0..rows).map(|_| rng.gen_range(0.0..10.0)).collect();
        table = table.with_numeric(name, column).expect("column length");
    }
    for name in META_COLUMNS {
        table = table
            .with_meta(name, vec!["0-10".to_string(); rows])
            .expect("column length");
    }
    table
}

fn benchmark_ridge(c: &mut Criterion) {
    let mut group = c.benchmark_group("ridge_fit");
    for rows in [50_usize, 200, 1000] {
        let (x, y) = random_design(rows, INPUT_FEATURES.len());
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("alpha_1", rows), &(x, y), |b, (x, y)| {
            b.iter(|| {
                let fit = fit_ridge(black_box(x.view()), black_box(y.view()), 1.0);
                black_box(fit.is_ok());
            });
        });
    }
    group.finish();
}

fn benchmark_target(c: &mut Criterion) {
    let trainer =
        Trainer::new(FeatureSet::ispc(), TrainerConfig::default()).expect("default config");
    let mut group = c.benchmark_group("train_target");
    for rows in [40_usize, 400] {
        let table = random_table(rows);
        group.bench_with_input(BenchmarkId::new("dmp", rows), &table, |b, table| {
            b.iter(|| {
                let outcome = trainer.train_target(black_box(table), "dmp");
                black_box(outcome.is_ok());
            });
        });
    }
    group.finish();
}

criterion_group!(training, benchmark_ridge, benchmark_target);
criterion_main!(training);
