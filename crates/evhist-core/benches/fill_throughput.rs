//! Hot-path throughput: fill/flush cycles with the compensated and the
//! naive accumulator, plus the miss-heavy worst case.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use evhist_core::{FillBuffer, NaiveAccumulator, NullSink, TwoSumAccumulator};

const N_BINS: usize = 4096;
const FILLS_PER_EVENT: usize = 64;
const EVENTS: usize = 256;

/// Pre-baked (gid, weight) samples so the generator is out of the loop.
fn samples(hot_bins: usize) -> Vec<(u32, f64)> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    (0..EVENTS * FILLS_PER_EVENT)
        .map(|_| {
            (
                rng.gen_range(0..hot_bins as u32),
                rng.gen_range(-10.0_f64..10.0),
            )
        })
        .collect()
}

fn bench_accumulators(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_flush");
    group.throughput(Throughput::Elements((EVENTS * FILLS_PER_EVENT) as u64));

    // Few hot bins: almost every fill is a hit.
    for hot_bins in [8_usize, 512] {
        let data = samples(hot_bins);

        group.bench_with_input(
            BenchmarkId::new("two_sum", hot_bins),
            &data,
            |b, data| {
                let mut buf =
                    FillBuffer::<f64, u32, TwoSumAccumulator<f64>>::new(N_BINS, FILLS_PER_EVENT)
                        .expect("buffer");
                let mut sink = NullSink::<f64>::default();
                b.iter(|| {
                    for event in data.chunks(FILLS_PER_EVENT) {
                        for &(gid, w) in event {
                            buf.fill(black_box(gid), black_box(w)).expect("fill");
                        }
                        buf.flush(&mut sink);
                    }
                    black_box(sink.checksum)
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("naive", hot_bins),
            &data,
            |b, data| {
                let mut buf =
                    FillBuffer::<f64, u32, NaiveAccumulator<f64>>::new(N_BINS, FILLS_PER_EVENT)
                        .expect("buffer");
                let mut sink = NullSink::<f64>::default();
                b.iter(|| {
                    for event in data.chunks(FILLS_PER_EVENT) {
                        for &(gid, w) in event {
                            buf.fill(black_box(gid), black_box(w)).expect("fill");
                        }
                        buf.flush(&mut sink);
                    }
                    black_box(sink.checksum)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_accumulators);
criterion_main!(benches);
