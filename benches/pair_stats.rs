use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ldscan::kernel::{accumulate_pair_stats, accumulate_scalar, r2_from_sums};
use ldscan::types::GenotypeCode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_codes(len: usize, seed: u64) -> Vec<GenotypeCode> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            // ~5% missing, the rest uniform over the dosage codes.
            if rng.gen_ratio(1, 20) {
                GenotypeCode::MISSING
            } else {
                GenotypeCode(rng.gen_range(0..=2))
            }
        })
        .collect()
}

fn benchmark_pair_stats(c: &mut Criterion) {
    let sizes = [32_usize, 512, 4096, 65536];
    let pairs: Vec<_> = sizes
        .iter()
        .map(|&len| {
            (
                len,
                random_codes(len, 0xACC0 + len as u64),
                random_codes(len, 0xACC1 + len as u64),
            )
        })
        .collect();

    let mut group = c.benchmark_group("pair_stats");
    for (len, a, b) in pairs.iter() {
        group.throughput(Throughput::Elements(*len as u64));

        group.bench_with_input(BenchmarkId::new("scalar", len), &(a, b), |bench, (a, b)| {
            bench.iter(|| {
                let sums = accumulate_scalar(black_box(a), black_box(b));
                black_box(r2_from_sums(&sums));
            });
        });

        group.bench_with_input(
            BenchmarkId::new("dispatched", len),
            &(a, b),
            |bench, (a, b)| {
                bench.iter(|| {
                    let sums = accumulate_pair_stats(black_box(a), black_box(b));
                    black_box(r2_from_sums(&sums));
                });
            },
        );
    }
    group.finish();
}

criterion_group!(pair_stats, benchmark_pair_stats);
criterion_main!(pair_stats);
